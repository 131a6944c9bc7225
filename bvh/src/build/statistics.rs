use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Why a range became a leaf.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LeafReason {
    UnderThreshold,
    MaxDepth,
    CheaperNotToSplit,
    ArbitrarySplit,
}

/// Aggregate counters of a build. Every task collects its own copy which
/// is summed once all tasks are done.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatistics {
    pub num_maxdepth_leaves: u64,
    pub num_under_thresh_leaves: u64,
    pub num_cheaper_nosplit_leaves: u64,
    pub num_arbitrary_split_leaves: u64,
    pub num_leaves: u64,
    pub max_objects_per_leaf: u64,
    pub leaf_depth_sum: u64,
    pub max_leaf_depth: u32,
    pub num_interior_nodes: u64,
    pub num_chunks: u64,
}

impl BuildStatistics {
    pub fn record_leaf(&mut self, reason: LeafReason, depth: u32, num_objects: usize) {
        match reason {
            LeafReason::UnderThreshold => self.num_under_thresh_leaves += 1,
            LeafReason::MaxDepth => self.num_maxdepth_leaves += 1,
            LeafReason::CheaperNotToSplit => self.num_cheaper_nosplit_leaves += 1,
            LeafReason::ArbitrarySplit => self.num_arbitrary_split_leaves += 1,
        }
        self.num_leaves += 1;
        self.max_objects_per_leaf = self.max_objects_per_leaf.max(num_objects as u64);
        self.leaf_depth_sum += depth as u64;
        self.max_leaf_depth = self.max_leaf_depth.max(depth);
    }

    pub fn record_interior(&mut self) {
        self.num_interior_nodes += 1;
    }

    pub fn accumulate(&mut self, other: &BuildStatistics) {
        self.num_maxdepth_leaves += other.num_maxdepth_leaves;
        self.num_under_thresh_leaves += other.num_under_thresh_leaves;
        self.num_cheaper_nosplit_leaves += other.num_cheaper_nosplit_leaves;
        self.num_arbitrary_split_leaves += other.num_arbitrary_split_leaves;
        self.num_leaves += other.num_leaves;
        self.max_objects_per_leaf = self.max_objects_per_leaf.max(other.max_objects_per_leaf);
        self.leaf_depth_sum += other.leaf_depth_sum;
        self.max_leaf_depth = self.max_leaf_depth.max(other.max_leaf_depth);
        self.num_interior_nodes += other.num_interior_nodes;
        self.num_chunks += other.num_chunks;
    }

    pub fn num_nodes(&self) -> u64 {
        self.num_leaves + self.num_interior_nodes
    }

    pub fn average_leaf_depth(&self) -> f64 {
        if self.num_leaves == 0 {
            0.0
        } else {
            self.leaf_depth_sum as f64 / self.num_leaves as f64
        }
    }

    pub fn average_objects_per_leaf(&self, num_objects: usize) -> f64 {
        if self.num_leaves == 0 {
            0.0
        } else {
            num_objects as f64 / self.num_leaves as f64
        }
    }
}

impl Display for BuildStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "interior nodes:             {}", self.num_interior_nodes)?;
        writeln!(f, "leaves:                     {}", self.num_leaves)?;
        writeln!(f, "  under threshold:          {}", self.num_under_thresh_leaves)?;
        writeln!(f, "  max depth:                {}", self.num_maxdepth_leaves)?;
        writeln!(f, "  cheaper not to split:     {}", self.num_cheaper_nosplit_leaves)?;
        writeln!(f, "  arbitrary split:          {}", self.num_arbitrary_split_leaves)?;
        writeln!(f, "max objects per leaf:       {}", self.max_objects_per_leaf)?;
        writeln!(f, "average leaf depth:         {:.2}", self.average_leaf_depth())?;
        writeln!(f, "max leaf depth:             {}", self.max_leaf_depth)?;
        write!(f, "chunks:                     {}", self.num_chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_sums_and_maxes() {
        let mut a = BuildStatistics::default();
        a.record_leaf(LeafReason::UnderThreshold, 3, 2);
        a.record_interior();

        let mut b = BuildStatistics::default();
        b.record_leaf(LeafReason::ArbitrarySplit, 7, 5);
        b.record_leaf(LeafReason::MaxDepth, 1, 1);

        a.accumulate(&b);
        assert_eq!(a.num_leaves, 3);
        assert_eq!(a.num_under_thresh_leaves, 1);
        assert_eq!(a.num_arbitrary_split_leaves, 1);
        assert_eq!(a.num_maxdepth_leaves, 1);
        assert_eq!(a.num_interior_nodes, 1);
        assert_eq!(a.leaf_depth_sum, 11);
        assert_eq!(a.max_leaf_depth, 7);
        assert_eq!(a.max_objects_per_leaf, 5);
        assert_eq!(a.num_nodes(), 4);
        assert!((a.average_leaf_depth() - 11.0 / 3.0).abs() < 1e-9);
    }
}

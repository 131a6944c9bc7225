use serde::{Deserialize, Serialize};

use crate::{BuildError, Result};

/// Recursion stops unconditionally at this depth.
pub const MAX_DEPTH: u32 = 60;

/// How split candidates are searched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Exact prefix/suffix sweep over pre-sorted per-axis object arrays.
    Exact,
    /// Fixed bucket count per axis.
    Binning,
    /// Binning when the input holds at least `binning_threshold` objects,
    /// exact otherwise.
    Auto,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Auto
    }
}

impl std::str::FromStr for SplitStrategy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" | "sorted" => Ok(SplitStrategy::Exact),
            "binning" | "binned" => Ok(SplitStrategy::Binning),
            "auto" => Ok(SplitStrategy::Auto),
            other => Err(BuildError::InvalidSettings(format!(
                "unknown split strategy '{}'",
                other
            ))),
        }
    }
}

/// Strategy after `Auto` has been resolved for a concrete input size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ResolvedStrategy {
    Exact,
    Binning,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Ranges with at most this many objects always become leaves.
    pub leaf_object_threshold: usize,
    /// Ranges larger than this are split even when a leaf would be cheaper.
    pub max_objects_per_leaf: usize,
    /// Cost of one object intersection, relative to a traversal step of 1.0.
    pub intersection_cost: f32,
    pub strategy: SplitStrategy,
    pub binning_threshold: usize,
    /// The right child gets its own task when both children hold at least
    /// this many objects.
    pub new_task_threshold: usize,
    /// Exact strategy: ranges at least this large search and partition the
    /// three axes on the nested pool.
    pub axis_parallel_threshold: usize,
    /// Binning strategy: ranges at least this large are binned on the
    /// nested pool.
    pub parallel_binning_threshold: usize,
    /// Binning strategy: ranges at least this large are partitioned with a
    /// parallel count and place pass into the second buffer.
    pub parallel_partition_threshold: usize,
    /// Size of the nested pool used for large ranges. Zero disables it.
    pub nested_worker_threads: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            leaf_object_threshold: 4,
            max_objects_per_leaf: 8,
            intersection_cost: 1.0,
            strategy: SplitStrategy::Auto,
            binning_threshold: 1 << 20,
            new_task_threshold: 512,
            axis_parallel_threshold: 1 << 20,
            parallel_binning_threshold: 1 << 16,
            parallel_partition_threshold: 1 << 19,
            nested_worker_threads: 3,
        }
    }
}

impl BuildSettings {
    pub fn new(
        leaf_object_threshold: usize,
        max_objects_per_leaf: usize,
        intersection_cost: f32,
    ) -> Self {
        Self {
            leaf_object_threshold,
            max_objects_per_leaf,
            intersection_cost,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.leaf_object_threshold < 1 {
            return Err(BuildError::InvalidSettings(
                "leaf_object_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_objects_per_leaf < self.leaf_object_threshold {
            return Err(BuildError::InvalidSettings(format!(
                "max_objects_per_leaf ({}) must be >= leaf_object_threshold ({})",
                self.max_objects_per_leaf, self.leaf_object_threshold
            )));
        }
        if !(self.intersection_cost.is_finite() && self.intersection_cost > 0.0) {
            return Err(BuildError::InvalidSettings(format!(
                "intersection_cost must be a positive finite number, got {}",
                self.intersection_cost
            )));
        }
        if self.new_task_threshold < 1 {
            return Err(BuildError::InvalidSettings(
                "new_task_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn resolve_strategy(&self, num_objects: usize) -> ResolvedStrategy {
        match self.strategy {
            SplitStrategy::Exact => ResolvedStrategy::Exact,
            SplitStrategy::Binning => ResolvedStrategy::Binning,
            SplitStrategy::Auto if num_objects >= self.binning_threshold => {
                ResolvedStrategy::Binning
            }
            SplitStrategy::Auto => ResolvedStrategy::Exact,
        }
    }

    /// Whether a range of `num_objects` benefits from the nested pool.
    pub(crate) fn wants_nested_pool(&self, strategy: ResolvedStrategy, num_objects: usize) -> bool {
        if self.nested_worker_threads == 0 {
            return false;
        }
        match strategy {
            ResolvedStrategy::Exact => num_objects >= self.axis_parallel_threshold,
            ResolvedStrategy::Binning => {
                num_objects >= self.parallel_binning_threshold.min(self.parallel_partition_threshold)
            }
        }
    }
}

use sah_utils::{NeverCancel, TaskManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bvh_node::*;
use crate::{Aabb, BuildError, BuildOutcome, BuildSettings, BvhResult, Result, TopDownBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub prim_indices: Vec<u32>,
}

impl Bvh {
    pub fn empty() -> Bvh {
        Bvh {
            nodes: vec![BvhNode::leaf(Aabb::EMPTY, 0, 0, 0)],
            prim_indices: Vec::new(),
        }
    }

    pub fn prim_count(&self) -> usize {
        self.prim_indices.len()
    }

    /// Builds with default settings on a fresh task manager sized to the
    /// machine.
    pub fn construct(aabbs: &[Aabb]) -> Result<Self> {
        Self::construct_with(aabbs, BuildSettings::default())
    }

    pub fn construct_with(aabbs: &[Aabb], settings: BuildSettings) -> Result<Self> {
        let mut builder = TopDownBuilder::new(settings)?;
        let scheduler = Arc::new(TaskManager::default());

        match builder.build(aabbs, &scheduler, NeverCancel)? {
            BuildOutcome::Complete(result) => Ok(result.into()),
            BuildOutcome::Cancelled => Err(BuildError::Internal(
                "build without cancellation check was cancelled".to_string(),
            )),
        }
    }

    pub fn root_bounds(&self) -> Aabb {
        self.nodes.first().map(|n| n.bounds).unwrap_or(Aabb::EMPTY)
    }

    pub fn leaves(&self) -> impl Iterator<Item = &BvhNode> + '_ {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Original object indices referenced by a leaf.
    pub fn leaf_objects(&self, node: &BvhNode) -> &[u32] {
        match node.objects() {
            Some(range) => &self.prim_indices[range],
            None => &[],
        }
    }

    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn sah_cost(&self, intersection_cost: f32) -> f32 {
        sah_cost(&self.nodes, intersection_cost)
    }
}

impl From<BvhResult> for Bvh {
    fn from(result: BvhResult) -> Self {
        Bvh {
            nodes: result.nodes,
            prim_indices: result.prim_indices,
        }
    }
}

pub mod settings;
pub mod statistics;
pub mod top_down_builder;

pub(crate) mod binning;
pub(crate) mod chunk;
pub(crate) mod cost;
pub(crate) mod exact_search;
pub(crate) mod object;

pub use cost::SahCost;
pub use settings::*;
pub use statistics::*;
pub use top_down_builder::*;

use crate::BvhNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BvhResult {
    pub nodes: Vec<BvhNode>,
    pub prim_indices: Vec<u32>,
}

/// Terminal state of a build. Cancellation is an outcome, not an error.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Complete(BvhResult),
    Cancelled,
}

impl BuildOutcome {
    pub fn is_cancelled(&self) -> bool {
        match self {
            BuildOutcome::Cancelled => true,
            BuildOutcome::Complete(_) => false,
        }
    }

    pub fn into_result(self) -> Option<BvhResult> {
        match self {
            BuildOutcome::Complete(result) => Some(result),
            BuildOutcome::Cancelled => None,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::Aabb;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Indices of both children in the node array.
    Interior { left: u32, right: u32 },
    /// Half open range into the object index permutation.
    Leaf { begin: u32, end: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub kind: NodeKind,
    pub depth: u32,
}

impl Display for BvhNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            NodeKind::Interior { left, right } => {
                write!(f, "interior {} -> ({}, {})", self.bounds, left, right)
            }
            NodeKind::Leaf { begin, end } => {
                write!(f, "leaf {} [{}, {})", self.bounds, begin, end)
            }
        }
    }
}

impl BvhNode {
    pub fn leaf(bounds: Aabb, begin: u32, end: u32, depth: u32) -> BvhNode {
        BvhNode {
            bounds,
            kind: NodeKind::Leaf { begin, end },
            depth,
        }
    }

    pub fn interior(bounds: Aabb, left: u32, right: u32, depth: u32) -> BvhNode {
        BvhNode {
            bounds,
            kind: NodeKind::Interior { left, right },
            depth,
        }
    }

    pub fn is_leaf(&self) -> bool {
        match self.kind {
            NodeKind::Leaf { .. } => true,
            NodeKind::Interior { .. } => false,
        }
    }

    pub fn get_count(&self) -> usize {
        match self.kind {
            NodeKind::Leaf { begin, end } => (end - begin) as usize,
            NodeKind::Interior { .. } => 0,
        }
    }

    pub fn children(&self) -> Option<(usize, usize)> {
        match self.kind {
            NodeKind::Interior { left, right } => Some((left as usize, right as usize)),
            NodeKind::Leaf { .. } => None,
        }
    }

    pub fn objects(&self) -> Option<std::ops::Range<usize>> {
        match self.kind {
            NodeKind::Leaf { begin, end } => Some(begin as usize..end as usize),
            NodeKind::Interior { .. } => None,
        }
    }
}

/// Expected cost of a tree under the surface area heuristic, relative to
/// the root: every interior node costs one traversal step weighted by its
/// area, every leaf costs `intersection_cost` per object weighted by its
/// area.
pub fn sah_cost(nodes: &[BvhNode], intersection_cost: f32) -> f32 {
    let root_area = match nodes.first() {
        Some(root) => root.bounds.surface_area(),
        None => return 0.0,
    };
    if root_area <= 0.0 {
        return nodes
            .iter()
            .map(|n| match n.kind {
                NodeKind::Interior { .. } => 1.0,
                NodeKind::Leaf { begin, end } => intersection_cost * (end - begin) as f32,
            })
            .sum();
    }

    nodes
        .iter()
        .map(|n| {
            let weight = n.bounds.surface_area() / root_area;
            match n.kind {
                NodeKind::Interior { .. } => weight,
                NodeKind::Leaf { begin, end } => {
                    weight * intersection_cost * (end - begin) as f32
                }
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn sah_cost_of_single_split() {
        let left = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        let right = Aabb::from_min_max(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let root = left.union_of(&right);
        let nodes = vec![
            BvhNode::interior(root, 1, 2, 0),
            BvhNode::leaf(left, 0, 2, 1),
            BvhNode::leaf(right, 2, 3, 1),
        ];

        // root 10, children 6 each
        let expected = 1.0 + 0.6 * 2.0 + 0.6 * 1.0;
        assert!((sah_cost(&nodes, 1.0) - expected).abs() < 1e-5);
        assert_eq!(sah_cost(&[], 1.0), 0.0);
    }
}

#![allow(dead_code)]

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sah_bvh::{Aabb, BuildOutcome, BvhNode, BvhResult, NodeKind};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}

/// Small random boxes scattered through a cube of side `extent`.
pub fn random_aabbs(rng: &mut SmallRng, n: usize, extent: f32) -> Vec<Aabb> {
    (0..n)
        .map(|_| {
            let p = Vec3::new(
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
            );
            let size = Vec3::new(
                rng.gen_range(0.01..1.0),
                rng.gen_range(0.01..1.0),
                rng.gen_range(0.01..1.0),
            );
            Aabb::from_min_max(p, p + size)
        })
        .collect()
}

/// Boxes grouped around a few cluster centres.
pub fn clustered_aabbs(rng: &mut SmallRng, n: usize, clusters: usize) -> Vec<Aabb> {
    let centres: Vec<Vec3> = (0..clusters.max(1))
        .map(|_| Vec3::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)))
        .collect();

    (0..n)
        .map(|i| {
            let c = centres[i % centres.len()];
            let p = c + Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            Aabb::from_min_max(p, p + Vec3::splat(0.1))
        })
        .collect()
}

pub fn identical_aabbs(n: usize) -> Vec<Aabb> {
    vec![Aabb::from_min_max(Vec3::new(1.0, 2.0, 3.0), Vec3::new(2.0, 3.0, 4.0)); n]
}

pub fn shuffled(rng: &mut SmallRng, aabbs: &[Aabb]) -> Vec<Aabb> {
    let mut v = aabbs.to_vec();
    v.shuffle(rng);
    v
}

pub fn unwrap_complete(outcome: BuildOutcome) -> BvhResult {
    match outcome {
        BuildOutcome::Complete(result) => result,
        BuildOutcome::Cancelled => panic!("expected a complete build"),
    }
}

/// Structural checks that hold for every tree over `aabbs`:
/// the permutation covers every object once, leaves tile `[0, N)` in
/// traversal order, children are in bounds and every node appears once.
pub fn check_structure(aabbs: &[Aabb], result: &BvhResult) {
    let n = aabbs.len();
    let nodes = &result.nodes;
    assert!(!nodes.is_empty(), "tree has no root");

    let mut seen = vec![false; n];
    for &i in result.prim_indices.iter() {
        let i = i as usize;
        assert!(i < n, "object index {} out of range", i);
        assert!(!seen[i], "object index {} appears twice", i);
        seen[i] = true;
    }
    assert_eq!(result.prim_indices.len(), n);

    let mut visited = vec![false; nodes.len()];
    let mut next_object = 0usize;
    let mut stack = vec![0usize];
    while let Some(index) = stack.pop() {
        assert!(index < nodes.len(), "child index {} out of range", index);
        assert!(!visited[index], "node {} reachable twice", index);
        visited[index] = true;

        match nodes[index].kind {
            NodeKind::Interior { left, right } => {
                assert!((left as usize) < nodes.len());
                assert!((right as usize) < nodes.len());
                stack.push(right as usize);
                stack.push(left as usize);
            }
            NodeKind::Leaf { begin, end } => {
                assert_eq!(begin as usize, next_object, "leaves do not tile the object range");
                assert!(begin <= end);
                next_object = end as usize;
            }
        }
    }
    assert_eq!(next_object, n, "leaves do not cover every object");
    assert!(visited.iter().all(|&v| v), "unreachable nodes in the tree");
}

/// Interior nodes contain their children, leaves contain their objects.
pub fn check_bounds(aabbs: &[Aabb], result: &BvhResult) {
    for node in result.nodes.iter() {
        match node.kind {
            NodeKind::Interior { left, right } => {
                let children = result.nodes[left as usize]
                    .bounds
                    .union_of(&result.nodes[right as usize].bounds);
                assert!(node.bounds.contains(&children), "interior {} does not contain its children", node);
            }
            NodeKind::Leaf { begin, end } => {
                for &i in &result.prim_indices[begin as usize..end as usize] {
                    assert!(
                        node.bounds.contains(&aabbs[i as usize]),
                        "leaf {} does not contain object {}",
                        node,
                        i
                    );
                }
            }
        }
    }
}

pub fn check_valid(aabbs: &[Aabb], result: &BvhResult) {
    check_structure(aabbs, result);
    check_bounds(aabbs, result);
}

pub fn leaves(result: &BvhResult) -> Vec<&BvhNode> {
    result.nodes.iter().filter(|n| n.is_leaf()).collect()
}

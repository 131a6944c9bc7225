mod support;

use glam::Vec3;
use sah_bvh::*;
use sah_utils::{NeverCancel, TaskManager};
use std::sync::Arc;
use support::*;

fn build_with(aabbs: &[Aabb], settings: BuildSettings, threads: usize) -> (BvhResult, BuildStatistics) {
    let mut builder = TopDownBuilder::new(settings).unwrap();
    let scheduler = Arc::new(TaskManager::new(threads));
    let result = unwrap_complete(builder.build(aabbs, &scheduler, NeverCancel).unwrap());
    (result, *builder.statistics())
}

fn strategies() -> Vec<BuildSettings> {
    vec![
        BuildSettings::default().with_strategy(SplitStrategy::Exact),
        BuildSettings::default().with_strategy(SplitStrategy::Binning),
    ]
}

#[test]
fn test_empty_input() {
    init_logging();
    for settings in strategies() {
        let (result, stats) = build_with(&[], settings, 2);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].kind, NodeKind::Leaf { begin: 0, end: 0 });
        assert!(result.prim_indices.is_empty());
        assert_eq!(stats.num_under_thresh_leaves, 1);
        assert_eq!(stats.num_leaves, 1);
    }
}

#[test]
fn test_single_object() {
    let aabb = Aabb::from_min_max(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 0.5, 3.0));
    for settings in strategies() {
        let (result, _) = build_with(&[aabb], settings, 2);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].kind, NodeKind::Leaf { begin: 0, end: 1 });
        assert_eq!(result.nodes[0].bounds, aabb);
        assert_eq!(result.prim_indices, vec![0]);
    }
}

#[test]
fn test_small_random_inputs() {
    init_logging();
    let mut rng = rng(1);
    for settings in strategies() {
        for n in 1..64 {
            let aabbs = random_aabbs(&mut rng, n, 10.0);
            let settings = BuildSettings {
                leaf_object_threshold: 1,
                max_objects_per_leaf: 16,
                ..settings
            };
            let (result, stats) = build_with(&aabbs, settings, 3);

            check_valid(&aabbs, &result);
            assert!(stats.max_objects_per_leaf <= 16 || stats.num_maxdepth_leaves > 0);
            assert_eq!(result.nodes.len() as u64, stats.num_nodes());
        }
    }
}

#[test]
fn test_large_random_input_both_strategies() {
    init_logging();
    let mut rng = rng(7);
    let aabbs = random_aabbs(&mut rng, 20_000, 1000.0);

    for settings in strategies() {
        let (result, stats) = build_with(&aabbs, settings, 4);
        check_valid(&aabbs, &result);

        assert!(stats.num_chunks > 1, "large build should spawn tasks");
        assert_eq!(stats.num_leaves, stats.num_interior_nodes + 1);
        assert!(stats.max_leaf_depth < MAX_DEPTH + 20);
        assert!(sah_cost(&result.nodes, settings.intersection_cost).is_finite());
    }
}

#[test]
fn test_exact_is_not_worse_than_binning() {
    let mut rng = rng(11);
    let aabbs = clustered_aabbs(&mut rng, 5000, 12);

    let exact = BuildSettings::default().with_strategy(SplitStrategy::Exact);
    let binning = BuildSettings::default().with_strategy(SplitStrategy::Binning);
    let (exact_result, _) = build_with(&aabbs, exact, 2);
    let (binning_result, _) = build_with(&aabbs, binning, 2);

    check_valid(&aabbs, &exact_result);
    check_valid(&aabbs, &binning_result);

    let exact_cost = sah_cost(&exact_result.nodes, 1.0);
    let binning_cost = sah_cost(&binning_result.nodes, 1.0);
    assert!(exact_cost <= binning_cost * 1.25, "exact {} binning {}", exact_cost, binning_cost);
}

#[test]
fn test_leaf_size_limits() {
    let mut rng = rng(3);
    let aabbs = random_aabbs(&mut rng, 3000, 50.0);
    let settings = BuildSettings::new(2, 4, 1.0).with_strategy(SplitStrategy::Exact);
    let (result, stats) = build_with(&aabbs, settings, 2);

    check_valid(&aabbs, &result);
    for leaf in leaves(&result) {
        assert!(leaf.get_count() <= 4);
    }
    assert!(stats.max_objects_per_leaf <= 4);
}

#[test]
fn test_reordering_stability_inline() {
    let mut rng = rng(5);
    let aabbs = random_aabbs(&mut rng, 4000, 100.0);
    let reordered = shuffled(&mut rng, &aabbs);

    for settings in strategies() {
        let (a, stats_a) = build_with(&aabbs, settings, 0);
        let (b, stats_b) = build_with(&reordered, settings, 0);
        check_valid(&aabbs, &a);
        check_valid(&reordered, &b);

        assert_eq!(stats_a.num_leaves, stats_b.num_leaves);
        assert_eq!(stats_a.leaf_depth_sum, stats_b.leaf_depth_sum);
        assert_eq!(stats_a.max_leaf_depth, stats_b.max_leaf_depth);
        assert_eq!(a.nodes.len(), b.nodes.len());
    }
}

#[test]
fn test_inline_and_threaded_agree() {
    let mut rng = rng(9);
    let aabbs = random_aabbs(&mut rng, 6000, 200.0);
    let settings = BuildSettings {
        new_task_threshold: 128,
        ..BuildSettings::default()
    };

    let (inline, inline_stats) = build_with(&aabbs, settings, 0);
    let (threaded, threaded_stats) = build_with(&aabbs, settings, 4);
    check_valid(&aabbs, &threaded);

    assert_eq!(inline.prim_indices.len(), threaded.prim_indices.len());
    assert_eq!(inline_stats.num_leaves, threaded_stats.num_leaves);
    assert_eq!(inline_stats.num_interior_nodes, threaded_stats.num_interior_nodes);
    assert_eq!(inline_stats.leaf_depth_sum, threaded_stats.leaf_depth_sum);
}

#[test]
fn test_builder_reuse() {
    let mut rng = rng(13);
    let mut builder = TopDownBuilder::new(BuildSettings::default()).unwrap();
    let scheduler = Arc::new(TaskManager::new(2));

    let first = random_aabbs(&mut rng, 500, 10.0);
    let second = random_aabbs(&mut rng, 50, 10.0);

    let a = unwrap_complete(builder.build(&first, &scheduler, NeverCancel).unwrap());
    check_valid(&first, &a);
    let b = unwrap_complete(builder.build(&second, &scheduler, NeverCancel).unwrap());
    check_valid(&second, &b);
    assert_eq!(builder.statistics().num_nodes(), b.nodes.len() as u64);
    assert_eq!(builder.root_bounds(), b.nodes[0].bounds);
}

#[test]
fn test_invalid_settings() {
    assert!(matches!(
        TopDownBuilder::new(BuildSettings::new(0, 4, 1.0)),
        Err(BuildError::InvalidSettings(_))
    ));
    assert!(matches!(
        TopDownBuilder::new(BuildSettings::new(8, 4, 1.0)),
        Err(BuildError::InvalidSettings(_))
    ));
    assert!(matches!(
        TopDownBuilder::new(BuildSettings::new(4, 8, 0.0)),
        Err(BuildError::InvalidSettings(_))
    ));
}

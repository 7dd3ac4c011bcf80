//! Comprehensive property-based tests for pre-commit hook
//!
//! Covers the engine's invariants with proptest, sized to run quickly as a
//! quality gate:
//!
//! 1. Adjacency symmetry for arbitrary position sets
//! 2. Null distribution length == n_permutations + 1
//! 3. Corrected p-values always in (0, 1]
//! 4. Seeded runs are fully deterministic across worker counts
//! 5. TFCE enhancement non-negative, zero where the statistic is zero
//! 6. Label shuffles preserve group sizes
//! 7. Bounds-checked containers never panic

use proptest::prelude::*;

use barajar::{
    AdjacencyGraph, Clusterer, GroupAssignment, IndependentTTest, MassAggregation, Observation,
    PermutationConfig, PermutationEngine, SignificanceAggregator, SignificanceDetail, Tail,
    TfceParams, TimeChannelMap,
};

fn engine_config(threshold: Option<f32>, n_permutations: usize, seed: u64) -> PermutationConfig {
    PermutationConfig {
        threshold,
        tfce: TfceParams::new(0.2, 0.2),
        n_permutations,
        seed: Some(seed),
        workers: Some(2),
        ..PermutationConfig::default()
    }
}

/// Build `n_obs` observations of the given shape from a flat value pool,
/// cycling through the pool so groups have nonzero variance.
fn observations(n_obs: usize, n_times: usize, n_channels: usize, pool: &[f32]) -> Vec<Observation> {
    (0..n_obs)
        .map(|i| {
            let data: Vec<f32> = (0..n_times * n_channels)
                .map(|j| pool[(i * 31 + j * 7) % pool.len()] + (i % 3) as f32 * 0.1)
                .collect();
            TimeChannelMap::from_vec(n_times, n_channels, data).unwrap()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_position_adjacency_is_symmetric(
        coords in prop::collection::vec((-5.0f32..5.0, -5.0f32..5.0, -5.0f32..5.0), 2..12),
        radius in 0.1f32..8.0,
    ) {
        let names: Vec<String> = (0..coords.len()).map(|i| format!("s{i}")).collect();
        let positions: Vec<[f32; 3]> = coords.iter().map(|&(x, y, z)| [x, y, z]).collect();
        let graph = AdjacencyGraph::from_positions(&names, &positions, radius).unwrap();

        for a in 0..graph.n_channels() {
            for b in 0..graph.n_channels() {
                prop_assert_eq!(graph.are_adjacent(a, b), graph.are_adjacent(b, a));
            }
            prop_assert!(!graph.are_adjacent(a, a));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn prop_null_distribution_has_n_plus_one_draws(
        n_permutations in 1usize..25,
        seed in any::<u64>(),
        pool in prop::collection::vec(-3.0f32..3.0, 8..20),
    ) {
        let obs = observations(8, 3, 2, &pool);
        let assignment = GroupAssignment::from_group_sizes(&[4, 4]).unwrap();
        let graph = AdjacencyGraph::complete(2);
        let statistic = IndependentTTest::welch();
        let run = PermutationEngine::new(
            &obs,
            assignment,
            &statistic,
            &graph,
            engine_config(Some(1.5), n_permutations, seed),
        )
        .unwrap()
        .run()
        .unwrap();

        prop_assert_eq!(run.null_distribution.len(), n_permutations + 1);
        prop_assert!(run.completed);
    }

    #[test]
    fn prop_p_values_in_unit_interval_never_zero(
        seed in any::<u64>(),
        use_tfce in any::<bool>(),
        pool in prop::collection::vec(-4.0f32..4.0, 8..20),
    ) {
        let obs = observations(10, 3, 2, &pool);
        let assignment = GroupAssignment::from_group_sizes(&[5, 5]).unwrap();
        let graph = AdjacencyGraph::complete(2);
        let statistic = IndependentTTest::welch();
        let threshold = if use_tfce { None } else { Some(1.0) };
        let run = PermutationEngine::new(
            &obs,
            assignment,
            &statistic,
            &graph,
            engine_config(threshold, 12, seed),
        )
        .unwrap()
        .run()
        .unwrap();
        let report = SignificanceAggregator::new(0.05).unwrap().aggregate(&run).unwrap();

        match &report.detail {
            SignificanceDetail::Clusters(clusters) => {
                for cluster in clusters {
                    prop_assert!(cluster.p_value > 0.0);
                    prop_assert!(cluster.p_value <= 1.0);
                }
            }
            SignificanceDetail::PointPValues(p_map) => {
                for &p in p_map.values() {
                    prop_assert!(p > 0.0);
                    prop_assert!(p <= 1.0);
                }
            }
        }
    }

    #[test]
    fn prop_seeded_runs_are_deterministic(
        seed in any::<u64>(),
        pool in prop::collection::vec(-2.0f32..2.0, 8..16),
    ) {
        let obs = observations(8, 2, 2, &pool);
        let graph = AdjacencyGraph::complete(2);
        let statistic = IndependentTTest::welch();

        let run = |workers: usize| {
            let assignment = GroupAssignment::from_group_sizes(&[4, 4]).unwrap();
            let mut config = engine_config(Some(1.0), 10, seed);
            config.workers = Some(workers);
            PermutationEngine::new(&obs, assignment, &statistic, &graph, config)
                .unwrap()
                .run()
                .unwrap()
        };

        let first = run(1);
        let second = run(3);
        prop_assert_eq!(first.null_distribution, second.null_distribution);
        prop_assert_eq!(first.observed_stats, second.observed_stats);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_tfce_nonnegative_and_zero_preserving(
        values in prop::collection::vec(-5.0f32..5.0, 12),
        zero_idx in 0usize..12,
    ) {
        let mut values = values;
        values[zero_idx] = 0.0;
        let stats = TimeChannelMap::from_vec(4, 3, values).unwrap();
        let graph = AdjacencyGraph::complete(3);
        let enhancement = Clusterer::new(&graph)
            .enhance(&stats, &TfceParams::new(0.2, 0.2), Tail::TwoSided)
            .unwrap();

        for (t, c, v) in enhancement.iter_points() {
            prop_assert!(v >= 0.0);
            if stats.get(t, c).unwrap() == 0.0 {
                prop_assert_eq!(v, 0.0);
            }
        }
    }

    #[test]
    fn prop_cluster_mass_equals_sum_of_members(
        values in prop::collection::vec(-6.0f32..6.0, 12),
        threshold in 0.5f32..3.0,
    ) {
        let stats = TimeChannelMap::from_vec(4, 3, values).unwrap();
        let graph = AdjacencyGraph::ring(3);
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, threshold, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap();

        for cluster in &clusters {
            let sum: f32 = cluster
                .points
                .iter()
                .map(|&(t, c)| stats.get(t, c).unwrap())
                .sum();
            prop_assert!((cluster.mass - sum).abs() < 1e-4);
            // A sign family never mixes polarities.
            let all_pos = cluster.points.iter().all(|&(t, c)| stats.get(t, c).unwrap() > 0.0);
            let all_neg = cluster.points.iter().all(|&(t, c)| stats.get(t, c).unwrap() < 0.0);
            prop_assert!(all_pos || all_neg);
        }
    }

    #[test]
    fn prop_group_sizes_survive_any_labels(
        sizes in prop::collection::vec(1usize..6, 1..4),
    ) {
        let assignment = GroupAssignment::from_group_sizes(&sizes).unwrap();
        prop_assert_eq!(assignment.group_sizes(), sizes.clone());
        prop_assert_eq!(assignment.labels().len(), sizes.iter().sum::<usize>());
        prop_assert_eq!(assignment.n_groups(), sizes.len());
    }

    #[test]
    fn prop_bounds_checked_access_never_panics(
        n_times in 0usize..6,
        n_channels in 0usize..6,
        t in 0usize..10,
        c in 0usize..10,
    ) {
        let map = TimeChannelMap::zeros(n_times, n_channels);
        let result = map.get(t, c);
        prop_assert_eq!(result.is_ok(), t < n_times && c < n_channels);
    }
}

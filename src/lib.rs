//! Barajar - spatio-temporal cluster-based permutation testing
//!
//! Mass-univariate statistical inference over (samples × time × channels)
//! data with multiple-comparisons correction via cluster-based permutation
//! testing, including threshold-free cluster enhancement (TFCE).
//!
//! The pipeline: an [`adjacency::AdjacencyGraph`] and a
//! [`statistic::StatisticFn`] are built once and injected into the
//! [`clusterer::Clusterer`]; the [`permutation::PermutationEngine`] drives
//! the (reshuffle -> statistic -> cluster) loop to build an empirical null
//! distribution of maximum scores, and the
//! [`significance::SignificanceAggregator`] turns observed scores into
//! corrected p-values and a boolean decision mask.
//!
//! This is a computational library boundary only: data loading, trial
//! filtering and visualization live outside.

pub mod adjacency;
pub mod array;
pub mod clusterer;
pub mod error;
pub mod permutation;
pub mod significance;
pub mod statistic;

pub use adjacency::{AdjacencyGraph, ChannelMatching};
pub use array::{Observation, TimeChannelMap};
pub use clusterer::{Cluster, Clusterer, MassAggregation, Polarity, Tail, TfceParams};
pub use error::{ClusterStatsError, Result};
pub use permutation::{
    CancelToken, GroupAssignment, ObservedScores, PermutationConfig, PermutationEngine,
    PermutationRun,
};
pub use significance::{
    ClusterSignificance, SignificanceAggregator, SignificanceDetail, SignificanceMask,
    SignificanceReport,
};
pub use statistic::{FOneWay, IndependentTTest, OneSampleTTest, StatisticFn, Variance};

/// One-call spatio-temporal cluster test over two or more groups.
///
/// Uses the one-way F-statistic for two or more groups (the original
/// pipeline's default) and the one-sample t-statistic with sign-flip
/// resampling for a single group. For finer control - a different
/// statistic, cancellation, inspecting the run before aggregation - build a
/// [`PermutationEngine`] directly.
pub fn spatio_temporal_cluster_test(
    groups: &[Vec<Observation>],
    graph: &AdjacencyGraph,
    config: PermutationConfig,
) -> Result<SignificanceReport> {
    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let assignment = GroupAssignment::from_group_sizes(&sizes)?;
    let pooled: Vec<Observation> = groups.iter().flatten().cloned().collect();
    let aggregator = SignificanceAggregator::new(config.alpha)?;

    let run = if groups.len() == 1 {
        let statistic = OneSampleTTest;
        PermutationEngine::new(&pooled, assignment, &statistic, graph, config)?.run()?
    } else {
        let statistic = FOneWay;
        PermutationEngine::new(&pooled, assignment, &statistic, graph, config)?.run()?
    };
    aggregator.aggregate(&run)
}

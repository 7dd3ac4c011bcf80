//! Spatio-temporal clustering and threshold-free cluster enhancement
//!
//! Points live on the combined time × channel graph: sample i is implicitly
//! adjacent to samples i-1 and i+1 on the same channel, and to the same
//! sample on every spatially neighboring channel. Two modes:
//!
//! 1. **Threshold mode** - connected-component labeling of points whose
//!    statistic exceeds a fixed cluster-forming threshold, sign-aware so
//!    positive and negative excursions form separate cluster families.
//! 2. **TFCE mode** - threshold-free cluster enhancement: integrate
//!    `extent^E * height^H` over a ladder of thresholds so no single
//!    arbitrary cutoff is needed.
//!
//! Component traversal uses an explicit worklist, never recursion, so stack
//! depth stays bounded for large time × channel graphs. Clusters are
//! enumerated in canonical order (ascending time-sample, then ascending
//! channel index) for reproducibility.
//!
//! # References
//!
//! Smith & Nichols (2009). "Threshold-free cluster enhancement: addressing
//! problems of smoothing, threshold dependence, and localisation in cluster
//! inference". NeuroImage 44, 83-98.

use crate::adjacency::AdjacencyGraph;
use crate::array::TimeChannelMap;
use crate::error::{ClusterStatsError, Result};
use serde::Serialize;

/// Test tail convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Tail {
    /// Only negative excursions form clusters.
    Negative,
    /// Both polarities form clusters (separate families).
    #[default]
    TwoSided,
    /// Only positive excursions form clusters.
    Positive,
}

/// Sign family a cluster belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Polarity {
    Positive,
    Negative,
}

/// How a cluster's scalar mass is aggregated from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MassAggregation {
    /// Sum of the signed member statistics.
    #[default]
    SumStat,
    /// Number of member points.
    MemberCount,
}

/// TFCE integration parameters. `start`/`step` define the threshold ladder;
/// `e` and `h` are the extent and height exponents (Smith & Nichols 2009
/// defaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TfceParams {
    pub start: f32,
    pub step: f32,
    pub e: f32,
    pub h: f32,
}

impl Default for TfceParams {
    fn default() -> Self {
        Self {
            start: 0.0,
            step: 0.2,
            e: 0.5,
            h: 2.0,
        }
    }
}

impl TfceParams {
    pub fn new(start: f32, step: f32) -> Self {
        Self {
            start,
            step,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.step <= 0.0 || !self.step.is_finite() {
            return Err(ClusterStatsError::NonPositiveTfceStep { step: self.step });
        }
        if self.start < 0.0 || !self.start.is_finite() {
            return Err(ClusterStatsError::NegativeTfceStart { start: self.start });
        }
        Ok(())
    }
}

/// A maximal connected set of suprathreshold points with its scalar mass.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    /// Member points in canonical order (ascending time, then channel).
    pub points: Vec<(usize, usize)>,
    /// Aggregated mass (signed for `SumStat`, count for `MemberCount`).
    pub mass: f32,
    pub polarity: Polarity,
}

impl Cluster {
    /// Magnitude used when ranking against the null distribution.
    pub fn score(&self) -> f32 {
        self.mass.abs()
    }
}

/// Connected-component labeler and TFCE enhancer over a fixed channel
/// adjacency graph.
#[derive(Debug, Clone, Copy)]
pub struct Clusterer<'g> {
    graph: &'g AdjacencyGraph,
}

impl<'g> Clusterer<'g> {
    pub fn new(graph: &'g AdjacencyGraph) -> Self {
        Self { graph }
    }

    /// Threshold mode: label sign-aware connected components of points whose
    /// statistic magnitude exceeds `threshold`, restricted to the families
    /// the tail admits.
    pub fn label_clusters(
        &self,
        stats: &TimeChannelMap,
        threshold: f32,
        tail: Tail,
        mass: MassAggregation,
    ) -> Result<Vec<Cluster>> {
        self.check_channels(stats)?;
        let threshold = threshold.abs();

        let mut clusters = Vec::new();
        for component in self.components(stats, |v| Self::family_of(v, threshold, tail)) {
            let polarity = Self::family_of(stats.at(component[0].0, component[0].1), threshold, tail)
                .unwrap_or(Polarity::Positive);
            let mass_value = match mass {
                MassAggregation::SumStat => component.iter().map(|&(t, c)| stats.at(t, c)).sum(),
                MassAggregation::MemberCount => component.len() as f32,
            };
            clusters.push(Cluster {
                points: component,
                mass: mass_value,
                polarity,
            });
        }
        Ok(clusters)
    }

    /// TFCE mode: integrate cluster extent and height over the threshold
    /// ladder `start, start+step, ...` up to the maximum statistic magnitude
    /// the tail admits. The returned map holds non-negative enhancement
    /// magnitudes and is zero wherever the statistic is zero.
    pub fn enhance(
        &self,
        stats: &TimeChannelMap,
        params: &TfceParams,
        tail: Tail,
    ) -> Result<TimeChannelMap> {
        self.check_channels(stats)?;
        params.validate()?;

        let max_height = match tail {
            Tail::TwoSided => stats.max_abs(),
            Tail::Positive => stats.values().iter().fold(0.0_f32, |m, &v| m.max(v)),
            Tail::Negative => stats.values().iter().fold(0.0_f32, |m, &v| m.max(-v)),
        };

        let (n_times, n_channels) = stats.shape();
        let mut enhancement = TimeChannelMap::zeros(n_times, n_channels);
        if max_height <= 0.0 {
            return Ok(enhancement);
        }

        // Rungs are derived from an integer index rather than accumulated by
        // repeated addition: once `height` outgrows `step * 2^23` an f32
        // addition of `step` is absorbed and would never advance the loop.
        let n_rungs = (((max_height - params.start) / params.step).floor() as u64)
            .saturating_add(1);
        for i in 0..n_rungs {
            let height = params.start + i as f32 * params.step;
            if height > max_height {
                break;
            }
            // Zero height admits every nonzero point but contributes zero
            // mass, so the rung is skipped.
            if height <= 0.0 {
                continue;
            }
            for component in self.components(stats, |v| Self::family_of(v, height, tail)) {
                let increment =
                    (component.len() as f32).powf(params.e) * height.powf(params.h) * params.step;
                for (t, c) in component {
                    *enhancement.at_mut(t, c) += increment;
                }
            }
        }
        Ok(enhancement)
    }

    /// Which sign family (if any) a statistic value belongs to at the given
    /// cluster-forming height, under the given tail.
    fn family_of(value: f32, height: f32, tail: Tail) -> Option<Polarity> {
        match tail {
            Tail::Positive if value > height => Some(Polarity::Positive),
            Tail::Negative if value < -height => Some(Polarity::Negative),
            Tail::TwoSided if value > height => Some(Polarity::Positive),
            Tail::TwoSided if value < -height => Some(Polarity::Negative),
            _ => None,
        }
    }

    /// Connected components of points for which `family` is `Some`, where
    /// edges only join points of the same family. Components come out in
    /// canonical order of their first (seed) point, members sorted in
    /// canonical order.
    fn components<F>(&self, stats: &TimeChannelMap, family: F) -> Vec<Vec<(usize, usize)>>
    where
        F: Fn(f32) -> Option<Polarity>,
    {
        let (n_times, n_channels) = stats.shape();
        let mut visited = vec![false; n_times * n_channels];
        let mut out = Vec::new();
        let mut worklist: Vec<(usize, usize)> = Vec::new();

        for seed_t in 0..n_times {
            for seed_c in 0..n_channels {
                let idx = seed_t * n_channels + seed_c;
                if visited[idx] {
                    continue;
                }
                let seed_family = match family(stats.at(seed_t, seed_c)) {
                    Some(p) => p,
                    None => continue,
                };

                visited[idx] = true;
                worklist.push((seed_t, seed_c));
                let mut members = Vec::new();

                while let Some((t, c)) = worklist.pop() {
                    members.push((t, c));

                    let mut try_visit = |nt: usize, nc: usize,
                                         visited: &mut Vec<bool>,
                                         worklist: &mut Vec<(usize, usize)>| {
                        let nidx = nt * n_channels + nc;
                        if !visited[nidx] && family(stats.at(nt, nc)) == Some(seed_family) {
                            visited[nidx] = true;
                            worklist.push((nt, nc));
                        }
                    };

                    if t > 0 {
                        try_visit(t - 1, c, &mut visited, &mut worklist);
                    }
                    if t + 1 < n_times {
                        try_visit(t + 1, c, &mut visited, &mut worklist);
                    }
                    for &nc in self.graph.neighbors(c) {
                        if nc < n_channels {
                            try_visit(t, nc, &mut visited, &mut worklist);
                        }
                    }
                }

                members.sort_unstable();
                out.push(members);
            }
        }
        out
    }

    fn check_channels(&self, stats: &TimeChannelMap) -> Result<()> {
        if stats.n_channels() != self.graph.n_channels() {
            return Err(ClusterStatsError::ChannelCountMismatch {
                graph: self.graph.n_channels(),
                data: stats.n_channels(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(n_times: usize, n_channels: usize, values: Vec<f32>) -> TimeChannelMap {
        TimeChannelMap::from_vec(n_times, n_channels, values).unwrap()
    }

    #[test]
    fn test_single_cluster_spans_time_and_channels() {
        // Two adjacent channels hot over two adjacent samples.
        let graph = AdjacencyGraph::complete(3);
        let stats = map(
            3,
            3,
            vec![
                0.0, 0.0, 0.0, //
                3.0, 3.0, 0.0, //
                3.0, 0.0, 0.0,
            ],
        );
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, 2.0, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].points, vec![(1, 0), (1, 1), (2, 0)]);
        assert_eq!(clusters[0].mass, 9.0);
        assert_eq!(clusters[0].polarity, Polarity::Positive);
    }

    #[test]
    fn test_isolated_channels_do_not_merge() {
        // No channel edges: same-sample hot points on different channels
        // stay separate clusters.
        let graph = AdjacencyGraph::isolated(2);
        let stats = map(1, 2, vec![3.0, 3.0]);
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, 2.0, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_opposite_signs_form_separate_families() {
        let graph = AdjacencyGraph::complete(2);
        let stats = map(2, 2, vec![3.0, 3.0, -3.0, -3.0]);
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, 2.0, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].polarity, Polarity::Positive);
        assert_eq!(clusters[0].mass, 6.0);
        assert_eq!(clusters[1].polarity, Polarity::Negative);
        assert_eq!(clusters[1].mass, -6.0);
        assert_eq!(clusters[1].score(), 6.0);
    }

    #[test]
    fn test_one_tailed_drops_other_family() {
        let graph = AdjacencyGraph::complete(2);
        let stats = map(1, 2, vec![3.0, -3.0]);
        let clusterer = Clusterer::new(&graph);

        let pos = clusterer
            .label_clusters(&stats, 2.0, Tail::Positive, MassAggregation::SumStat)
            .unwrap();
        assert_eq!(pos.len(), 1);
        assert_eq!(pos[0].polarity, Polarity::Positive);

        let neg = clusterer
            .label_clusters(&stats, 2.0, Tail::Negative, MassAggregation::SumStat)
            .unwrap();
        assert_eq!(neg.len(), 1);
        assert_eq!(neg[0].polarity, Polarity::Negative);
    }

    #[test]
    fn test_member_count_mass() {
        let graph = AdjacencyGraph::complete(2);
        let stats = map(1, 2, vec![5.0, 5.0]);
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, 2.0, Tail::TwoSided, MassAggregation::MemberCount)
            .unwrap();
        assert_eq!(clusters[0].mass, 2.0);
    }

    #[test]
    fn test_cluster_enumeration_is_canonical() {
        let graph = AdjacencyGraph::isolated(3);
        let stats = map(2, 3, vec![0.0, 3.0, 0.0, 3.0, 0.0, 3.0]);
        let clusters = Clusterer::new(&graph)
            .label_clusters(&stats, 2.0, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap();
        let firsts: Vec<_> = clusters.iter().map(|c| c.points[0]).collect();
        assert_eq!(firsts, vec![(0, 1), (1, 0), (1, 2)]);
    }

    #[test]
    fn test_channel_count_mismatch_rejected() {
        let graph = AdjacencyGraph::complete(4);
        let stats = map(1, 2, vec![0.0, 0.0]);
        let err = Clusterer::new(&graph)
            .label_clusters(&stats, 1.0, Tail::TwoSided, MassAggregation::SumStat)
            .unwrap_err();
        assert_eq!(
            err,
            ClusterStatsError::ChannelCountMismatch { graph: 4, data: 2 }
        );
    }

    #[test]
    fn test_tfce_zero_where_stat_zero() {
        let graph = AdjacencyGraph::complete(2);
        let stats = map(2, 2, vec![0.0, 2.0, 0.0, 2.0]);
        let enhancement = Clusterer::new(&graph)
            .enhance(&stats, &TfceParams::new(0.2, 0.2), Tail::TwoSided)
            .unwrap();

        assert_eq!(enhancement.get(0, 0).unwrap(), 0.0);
        assert_eq!(enhancement.get(1, 0).unwrap(), 0.0);
        assert!(enhancement.get(0, 1).unwrap() > 0.0);
        assert!(enhancement.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_tfce_monotone_in_own_statistic() {
        let graph = AdjacencyGraph::complete(2);
        let base = map(1, 2, vec![1.0, 2.0]);
        let raised = map(1, 2, vec![1.0, 3.0]);
        let clusterer = Clusterer::new(&graph);
        let params = TfceParams::new(0.2, 0.2);

        let e_base = clusterer.enhance(&base, &params, Tail::TwoSided).unwrap();
        let e_raised = clusterer.enhance(&raised, &params, Tail::TwoSided).unwrap();
        assert!(e_raised.get(0, 1).unwrap() >= e_base.get(0, 1).unwrap());
    }

    #[test]
    fn test_tfce_enhances_negative_excursions_two_tailed() {
        let graph = AdjacencyGraph::complete(2);
        let stats = map(1, 2, vec![-2.0, 0.0]);
        let enhancement = Clusterer::new(&graph)
            .enhance(&stats, &TfceParams::new(0.2, 0.2), Tail::TwoSided)
            .unwrap();
        assert!(enhancement.get(0, 0).unwrap() > 0.0);
        assert_eq!(enhancement.get(0, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_tfce_rejects_bad_params() {
        let graph = AdjacencyGraph::complete(1);
        let stats = map(1, 1, vec![1.0]);
        let clusterer = Clusterer::new(&graph);

        let err = clusterer
            .enhance(&stats, &TfceParams::new(0.2, 0.0), Tail::TwoSided)
            .unwrap_err();
        assert_eq!(err, ClusterStatsError::NonPositiveTfceStep { step: 0.0 });

        let err = clusterer
            .enhance(&stats, &TfceParams::new(-0.5, 0.2), Tail::TwoSided)
            .unwrap_err();
        assert_eq!(err, ClusterStatsError::NegativeTfceStart { start: -0.5 });
    }

    #[test]
    fn test_tfce_bigger_extent_bigger_enhancement() {
        // A wide plateau outranks a lone spike of the same height.
        let graph = AdjacencyGraph::complete(1);
        let wide = map(5, 1, vec![2.0, 2.0, 2.0, 2.0, 2.0]);
        let lone = map(5, 1, vec![0.0, 0.0, 2.0, 0.0, 0.0]);
        let clusterer = Clusterer::new(&graph);
        let params = TfceParams::new(0.2, 0.2);

        let e_wide = clusterer.enhance(&wide, &params, Tail::TwoSided).unwrap();
        let e_lone = clusterer.enhance(&lone, &params, Tail::TwoSided).unwrap();
        assert!(e_wide.get(2, 0).unwrap() > e_lone.get(2, 0).unwrap());
    }

    #[test]
    fn test_tfce_terminates_on_huge_statistic() {
        // At heights this large an f32 addition of `step` is absorbed
        // (7_999_999.0 + 0.2 == 7_999_999.0), so rung heights must be derived
        // from an index, not accumulated, or the ladder never advances.
        let graph = AdjacencyGraph::complete(1);
        let stats = map(1, 1, vec![8.0e6]);
        let enhancement = Clusterer::new(&graph)
            .enhance(&stats, &TfceParams::new(7_999_999.0, 0.2), Tail::TwoSided)
            .unwrap();
        let e = enhancement.get(0, 0).unwrap();
        assert!(e.is_finite());
        assert!(e > 0.0);
    }
}

//! Permutation engine: label reshuffling and null distribution accumulation
//!
//! Drives the (reshuffle -> statistic -> cluster) loop that builds the
//! empirical null distribution of maximum cluster mass (threshold mode) or
//! maximum TFCE enhancement (threshold-free mode).
//!
//! Iteration 0 is always the observed (identity) assignment, so the null
//! distribution has `n_permutations + 1` entries and no corrected p-value
//! can be exactly zero. Each iteration derives its own sub-seed from the
//! master seed through a splitmix64 mixer, so iterations are independently
//! reproducible and run in parallel without contention on a shared
//! generator. Workers push `(iteration, score)` pairs through a crossbeam
//! channel; the gathered scores are re-ordered by iteration index so the
//! recorded sequence is identical whatever the completion order.
//!
//! Cancellation is cooperative: workers check a shared token between
//! iterations and an aborted run returns the partial null distribution with
//! `completed = false` rather than an error.

use crate::adjacency::AdjacencyGraph;
use crate::array::{validate_group_shapes, Observation, TimeChannelMap};
use crate::clusterer::{Cluster, Clusterer, MassAggregation, Tail, TfceParams};
use crate::error::{ClusterStatsError, Result};
use crate::statistic::StatisticFn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Configuration surface of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct PermutationConfig {
    /// Cluster-forming threshold; `None` selects TFCE mode.
    pub threshold: Option<f32>,
    /// TFCE parameters, used when `threshold` is `None`.
    pub tfce: TfceParams,
    pub n_permutations: usize,
    /// Significance level for the aggregator's mask.
    pub alpha: f32,
    /// Master seed; `None` draws one from the OS and records it on the run.
    pub seed: Option<u64>,
    pub tail: Tail,
    pub mass: MassAggregation,
    /// Worker thread count; `None` uses available parallelism.
    pub workers: Option<usize>,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            threshold: None,
            tfce: TfceParams::default(),
            n_permutations: 1000,
            alpha: 0.05,
            seed: None,
            tail: Tail::TwoSided,
            mass: MassAggregation::SumStat,
            workers: None,
        }
    }
}

impl PermutationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_permutations == 0 {
            return Err(ClusterStatsError::ZeroPermutations);
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ClusterStatsError::InvalidAlpha { alpha: self.alpha });
        }
        if self.threshold.is_none() {
            self.tfce.validate()?;
        }
        Ok(())
    }
}

/// Mapping from observation index to group label. Replaced wholesale on
/// each permutation draw, never mutated mid-iteration.
#[derive(Debug, Clone)]
pub struct GroupAssignment {
    labels: Vec<usize>,
    n_groups: usize,
}

impl GroupAssignment {
    /// Build from per-observation labels `0..n_groups`. Every group must
    /// have at least one member.
    pub fn new(labels: Vec<usize>) -> Result<Self> {
        let n_groups = labels.iter().max().map_or(0, |&m| m + 1);
        if n_groups == 0 {
            return Err(ClusterStatsError::EmptyGroup { group: 0 });
        }
        for g in 0..n_groups {
            if !labels.contains(&g) {
                return Err(ClusterStatsError::EmptyGroup { group: g });
            }
        }
        Ok(Self { labels, n_groups })
    }

    /// Build the identity assignment for contiguous groups of the given
    /// sizes: `sizes[0]` observations labeled 0, then `sizes[1]` labeled 1,
    /// and so on.
    pub fn from_group_sizes(sizes: &[usize]) -> Result<Self> {
        let mut labels = Vec::with_capacity(sizes.iter().sum());
        for (g, &n) in sizes.iter().enumerate() {
            if n == 0 {
                return Err(ClusterStatsError::EmptyGroup { group: g });
            }
            labels.extend(std::iter::repeat(g).take(n));
        }
        Self::new(labels)
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_groups];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }
}

/// Shared cancellation flag, checked by workers between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Observed-assignment scores handed to the significance aggregator.
#[derive(Debug, Clone, Serialize)]
pub enum ObservedScores {
    /// Threshold mode: the observed cluster set.
    Clusters(Vec<Cluster>),
    /// TFCE mode: the observed enhancement map.
    Enhancement(TimeChannelMap),
}

/// Output of a permutation run.
#[derive(Debug, Clone, Serialize)]
pub struct PermutationRun {
    /// Statistic map for the true grouping.
    pub observed_stats: TimeChannelMap,
    pub observed: ObservedScores,
    /// Maximum score per iteration; entry 0 is the observed assignment.
    pub null_distribution: Vec<f32>,
    /// Master seed the run used (recorded even when drawn from the OS).
    pub seed: u64,
    /// False when the run was cancelled before all permutations finished.
    pub completed: bool,
    pub config: PermutationConfig,
}

/// Orchestrates the permutation loop over read-only pooled observations.
#[derive(Debug)]
pub struct PermutationEngine<'a, S: StatisticFn> {
    observations: &'a [Observation],
    assignment: GroupAssignment,
    statistic: &'a S,
    graph: &'a AdjacencyGraph,
    config: PermutationConfig,
}

impl<'a, S: StatisticFn> PermutationEngine<'a, S> {
    /// Validate configuration and inputs up front; all caller-misuse errors
    /// surface here rather than mid-loop.
    pub fn new(
        observations: &'a [Observation],
        assignment: GroupAssignment,
        statistic: &'a S,
        graph: &'a AdjacencyGraph,
        config: PermutationConfig,
    ) -> Result<Self> {
        config.validate()?;
        if assignment.labels().len() != observations.len() {
            return Err(ClusterStatsError::AssignmentLengthMismatch {
                observations: observations.len(),
                labels: assignment.labels().len(),
            });
        }
        if let Some(required) = statistic.group_arity() {
            if assignment.n_groups() != required {
                return Err(ClusterStatsError::GroupArityMismatch {
                    required,
                    actual: assignment.n_groups(),
                });
            }
        }

        let groups = split_groups(observations, assignment.labels(), assignment.n_groups());
        let (_, n_channels) = validate_group_shapes(&groups)?;
        if n_channels != graph.n_channels() {
            return Err(ClusterStatsError::ChannelCountMismatch {
                graph: graph.n_channels(),
                data: n_channels,
            });
        }

        Ok(Self {
            observations,
            assignment,
            statistic,
            graph,
            config,
        })
    }

    /// Run the full permutation loop.
    pub fn run(&self) -> Result<PermutationRun> {
        self.run_cancellable(&CancelToken::new())
    }

    /// Run with a cancellation token. An aborted run returns the partial
    /// null distribution with `completed = false`; the distribution is
    /// always internally consistent (prefix-ordered by iteration index).
    pub fn run_cancellable(&self, cancel: &CancelToken) -> Result<PermutationRun> {
        let seed = match self.config.seed {
            Some(s) => s,
            None => rand::thread_rng().gen(),
        };
        let n_permutations = self.config.n_permutations;
        let workers = self
            .config
            .workers
            .unwrap_or_else(|| {
                thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            })
            .clamp(1, n_permutations);

        tracing::debug!(
            n_permutations,
            workers,
            seed,
            tfce = self.config.threshold.is_none(),
            "starting permutation run"
        );

        // Iteration 0: the observed (identity) assignment.
        let groups = split_groups(
            self.observations,
            self.assignment.labels(),
            self.assignment.n_groups(),
        );
        let observed_stats = self.statistic.evaluate(&groups)?;
        let clusterer = Clusterer::new(self.graph);
        let (observed, observed_score) = match self.config.threshold {
            Some(threshold) => {
                let clusters = clusterer.label_clusters(
                    &observed_stats,
                    threshold,
                    self.config.tail,
                    self.config.mass,
                )?;
                let score = max_cluster_score(&clusters);
                (ObservedScores::Clusters(clusters), score)
            }
            None => {
                let enhancement =
                    clusterer.enhance(&observed_stats, &self.config.tfce, self.config.tail)?;
                let score = enhancement.max_value();
                (ObservedScores::Enhancement(enhancement), score)
            }
        };

        let next_iteration = AtomicUsize::new(1);
        let (tx, rx) = crossbeam::channel::unbounded::<(usize, Result<f32>)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next_iteration = &next_iteration;
                let cancel = cancel.clone();
                scope.spawn(move || {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let i = next_iteration.fetch_add(1, Ordering::Relaxed);
                        if i > n_permutations {
                            break;
                        }
                        let score = self.score_iteration(derive_seed(seed, i as u64));
                        let failed = score.is_err();
                        if tx.send((i, score)).is_err() || failed {
                            break;
                        }
                    }
                });
            }
            drop(tx);
        });

        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(n_permutations);
        for (i, score) in rx.iter() {
            scored.push((i, score?));
        }
        scored.sort_unstable_by_key(|&(i, _)| i);

        let completed = scored.len() == n_permutations;
        if !completed {
            tracing::warn!(
                gathered = scored.len(),
                requested = n_permutations,
                "permutation run cancelled; returning partial null distribution"
            );
        }

        let mut null_distribution = Vec::with_capacity(scored.len() + 1);
        null_distribution.push(observed_score);
        null_distribution.extend(scored.into_iter().map(|(_, s)| s));

        tracing::debug!(
            draws = null_distribution.len(),
            observed_score,
            "permutation run finished"
        );

        Ok(PermutationRun {
            observed_stats,
            observed,
            null_distribution,
            seed,
            completed,
            config: self.config.clone(),
        })
    }

    /// One null-distribution draw: reshuffle, recompute the statistic map,
    /// cluster or enhance, extract the maximum score.
    fn score_iteration(&self, sub_seed: u64) -> Result<f32> {
        let mut rng = StdRng::seed_from_u64(sub_seed);

        let stats = if self.assignment.n_groups() == 1 {
            // Single-group designs resample by random sign-flips.
            let flipped: Vec<Observation> = self
                .observations
                .iter()
                .map(|obs| {
                    if rng.gen::<bool>() {
                        obs.negated()
                    } else {
                        obs.clone()
                    }
                })
                .collect();
            let groups: Vec<Vec<&Observation>> = vec![flipped.iter().collect()];
            self.statistic.evaluate(&groups)?
        } else {
            // Relabel without replacement: shuffling the label vector keeps
            // every per-group count fixed.
            let mut labels = self.assignment.labels().to_vec();
            labels.shuffle(&mut rng);
            let groups = split_groups(self.observations, &labels, self.assignment.n_groups());
            self.statistic.evaluate(&groups)?
        };

        let clusterer = Clusterer::new(self.graph);
        match self.config.threshold {
            Some(threshold) => {
                let clusters =
                    clusterer.label_clusters(&stats, threshold, self.config.tail, self.config.mass)?;
                Ok(max_cluster_score(&clusters))
            }
            None => Ok(clusterer
                .enhance(&stats, &self.config.tfce, self.config.tail)?
                .max_value()),
        }
    }
}

/// Partition pooled observations into per-group reference lists.
fn split_groups<'o>(
    observations: &'o [Observation],
    labels: &[usize],
    n_groups: usize,
) -> Vec<Vec<&'o Observation>> {
    let mut groups: Vec<Vec<&Observation>> = vec![Vec::new(); n_groups];
    for (obs, &label) in observations.iter().zip(labels.iter()) {
        groups[label].push(obs);
    }
    groups
}

/// Maximum comparable cluster magnitude; 0.0 when no cluster formed.
fn max_cluster_score(clusters: &[Cluster]) -> f32 {
    clusters.iter().map(Cluster::score).fold(0.0, f32::max)
}

/// splitmix64 finalizer, mixing the master seed with the iteration index so
/// each iteration owns an independent, well-separated RNG stream.
fn derive_seed(master: u64, iteration: u64) -> u64 {
    let mut z = master ^ iteration.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

//! Significance aggregation: corrected p-values and the decision mask
//!
//! Compares observed cluster masses (threshold mode) or per-point TFCE
//! enhancement scores against the null distribution of per-iteration maxima.
//! The p-value is the inclusive rank of the observed score:
//!
//! ```text
//! p = #{ null scores >= observed } / n_draws
//! ```
//!
//! The observed assignment is draw 0 of the null distribution, so the count
//! is at least 1 and no p-value is exactly zero. Comparing against the
//! per-iteration *maximum* is what corrects for testing thousands of
//! (time, channel) points simultaneously.

use crate::array::TimeChannelMap;
use crate::clusterer::Polarity;
use crate::error::{ClusterStatsError, Result};
use crate::permutation::{ObservedScores, PermutationRun};
use serde::Serialize;

/// Boolean per-point decision mask of shape (time, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignificanceMask {
    n_times: usize,
    n_channels: usize,
    data: Vec<bool>,
}

impl SignificanceMask {
    fn falses(n_times: usize, n_channels: usize) -> Self {
        Self {
            n_times,
            n_channels,
            data: vec![false; n_times * n_channels],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_times, self.n_channels)
    }

    pub fn get(&self, time: usize, channel: usize) -> Result<bool> {
        if time >= self.n_times || channel >= self.n_channels {
            return Err(ClusterStatsError::PointOutOfBounds {
                time,
                channel,
                shape: self.shape(),
            });
        }
        Ok(self.data[time * self.n_channels + channel])
    }

    fn set(&mut self, time: usize, channel: usize) {
        self.data[time * self.n_channels + channel] = true;
    }

    /// Number of significant points.
    pub fn n_significant(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|&b| b)
    }

    pub fn values(&self) -> &[bool] {
        &self.data
    }
}

/// One observed cluster with its corrected p-value.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSignificance {
    pub points: Vec<(usize, usize)>,
    pub mass: f32,
    pub polarity: Polarity,
    pub p_value: f32,
    pub significant: bool,
}

/// Mode-specific detail: per-cluster p-values or a per-point p-value map.
#[derive(Debug, Clone, Serialize)]
pub enum SignificanceDetail {
    Clusters(Vec<ClusterSignificance>),
    /// p-value per (time, channel) point, TFCE mode.
    PointPValues(TimeChannelMap),
}

/// Final output of the engine: decision mask, observed statistics, p-values
/// and run metadata. Consumed as data by downstream visualization.
#[derive(Debug, Clone, Serialize)]
pub struct SignificanceReport {
    pub mask: SignificanceMask,
    pub observed_stats: TimeChannelMap,
    pub detail: SignificanceDetail,
    pub alpha: f32,
    /// Null distribution length the p-values were computed against.
    pub n_draws: usize,
    pub seed: u64,
    /// False when the run was cancelled; p-value resolution is degraded but
    /// the report is still valid.
    pub completed: bool,
}

/// Ranks observed scores within the null distribution.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceAggregator {
    alpha: f32,
}

impl SignificanceAggregator {
    pub fn new(alpha: f32) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ClusterStatsError::InvalidAlpha { alpha });
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Aggregate a permutation run into corrected p-values and the decision
    /// mask. Fails if the null distribution is empty.
    pub fn aggregate(&self, run: &PermutationRun) -> Result<SignificanceReport> {
        if run.null_distribution.is_empty() {
            return Err(ClusterStatsError::EmptyNullDistribution);
        }
        let (n_times, n_channels) = run.observed_stats.shape();
        let mut mask = SignificanceMask::falses(n_times, n_channels);

        let detail = match &run.observed {
            ObservedScores::Clusters(clusters) => {
                let mut out = Vec::with_capacity(clusters.len());
                for cluster in clusters {
                    let p_value = p_value(cluster.score(), &run.null_distribution);
                    // Strict comparison: p == alpha is not significant.
                    let significant = p_value < self.alpha;
                    if significant {
                        for &(t, c) in &cluster.points {
                            mask.set(t, c);
                        }
                    }
                    out.push(ClusterSignificance {
                        points: cluster.points.clone(),
                        mass: cluster.mass,
                        polarity: cluster.polarity,
                        p_value,
                        significant,
                    });
                }
                SignificanceDetail::Clusters(out)
            }
            ObservedScores::Enhancement(enhancement) => {
                let mut p_map = TimeChannelMap::zeros(n_times, n_channels);
                for (t, c, score) in enhancement.iter_points() {
                    let p = p_value(score, &run.null_distribution);
                    *p_map.at_mut(t, c) = p;
                    if p < self.alpha {
                        mask.set(t, c);
                    }
                }
                SignificanceDetail::PointPValues(p_map)
            }
        };

        Ok(SignificanceReport {
            mask,
            observed_stats: run.observed_stats.clone(),
            detail,
            alpha: self.alpha,
            n_draws: run.null_distribution.len(),
            seed: run.seed,
            completed: run.completed,
        })
    }
}

/// Inclusive-rank p-value of a score within the null distribution.
fn p_value(score: f32, null: &[f32]) -> f32 {
    let n_ge = null.iter().filter(|&&s| s >= score).count();
    n_ge as f32 / null.len() as f32
}

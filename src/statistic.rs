//! Pointwise test statistics over observation groups
//!
//! A statistic function maps two or more groups of observations (identical
//! (time, channel) shape) to one statistic value per point. Implementations
//! must be deterministic: the permutation engine recomputes the map once per
//! iteration and the null distribution is only valid when the group
//! relabeling is the sole source of randomness.
//!
//! Per-cell reductions (mean, stddev) run through Trueno vectors, SIMD-
//! accelerated where the target supports it.

use crate::array::{validate_group_shapes, Observation, TimeChannelMap};
use crate::error::{ClusterStatsError, Result};
use trueno::Vector;

/// Pointwise statistic over an arity-agnostic list of observation groups.
pub trait StatisticFn: Send + Sync {
    /// Number of groups this statistic expects, or `None` for any k >= 2.
    fn group_arity(&self) -> Option<usize>;

    /// Compute the statistic map for the given groups. Groups must be
    /// non-empty and share one (time, channel) shape.
    fn evaluate(&self, groups: &[Vec<&Observation>]) -> Result<TimeChannelMap>;
}

/// Variance model for the independent two-sample t-statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variance {
    /// Welch's t: no equal-variance assumption, per-group variance terms.
    #[default]
    Welch,
    /// Pooled variance under the equal-variance assumption.
    Pooled,
}

/// Independent two-sample t-statistic, computed pointwise. Unequal group
/// sizes are supported; zero-variance cells produce 0.0 rather than NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndependentTTest {
    pub variance: Variance,
}

impl IndependentTTest {
    pub fn welch() -> Self {
        Self {
            variance: Variance::Welch,
        }
    }

    pub fn pooled() -> Self {
        Self {
            variance: Variance::Pooled,
        }
    }
}

impl StatisticFn for IndependentTTest {
    fn group_arity(&self) -> Option<usize> {
        Some(2)
    }

    fn evaluate(&self, groups: &[Vec<&Observation>]) -> Result<TimeChannelMap> {
        let (n_times, n_channels) = check_arity(self.group_arity(), groups)?;
        let (n1, n2) = (groups[0].len(), groups[1].len());

        let mut out = TimeChannelMap::zeros(n_times, n_channels);
        let mut buf1 = vec![0.0_f32; n1];
        let mut buf2 = vec![0.0_f32; n2];

        for t in 0..n_times {
            for c in 0..n_channels {
                gather_cell(&groups[0], t, c, &mut buf1);
                gather_cell(&groups[1], t, c, &mut buf2);

                let (m1, v1) = cell_mean_variance(&buf1);
                let (m2, v2) = cell_mean_variance(&buf2);

                let denom = match self.variance {
                    Variance::Welch => (v1 / n1 as f32 + v2 / n2 as f32).sqrt(),
                    Variance::Pooled => {
                        let df = (n1 + n2).saturating_sub(2);
                        if df == 0 {
                            0.0
                        } else {
                            let sp2 =
                                ((n1 - 1) as f32 * v1 + (n2 - 1) as f32 * v2) / df as f32;
                            (sp2 * (1.0 / n1 as f32 + 1.0 / n2 as f32)).sqrt()
                        }
                    }
                };

                let t_val = if denom > 0.0 { (m1 - m2) / denom } else { 0.0 };
                *out.at_mut(t, c) = t_val;
            }
        }
        Ok(out)
    }
}

/// One-sample t-statistic against a zero population mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneSampleTTest;

impl StatisticFn for OneSampleTTest {
    fn group_arity(&self) -> Option<usize> {
        Some(1)
    }

    fn evaluate(&self, groups: &[Vec<&Observation>]) -> Result<TimeChannelMap> {
        let (n_times, n_channels) = check_arity(self.group_arity(), groups)?;
        let n = groups[0].len();

        let mut out = TimeChannelMap::zeros(n_times, n_channels);
        let mut buf = vec![0.0_f32; n];

        for t in 0..n_times {
            for c in 0..n_channels {
                gather_cell(&groups[0], t, c, &mut buf);
                let (mean, var) = cell_mean_variance(&buf);
                let se = (var / n as f32).sqrt();
                *out.at_mut(t, c) = if se > 0.0 { mean / se } else { 0.0 };
            }
        }
        Ok(out)
    }
}

/// One-way ANOVA F-statistic for k >= 2 groups, computed pointwise. This is
/// the default statistic of the original spatio-temporal cluster test
/// pipeline; for two groups it equals the squared pooled t-statistic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FOneWay;

impl StatisticFn for FOneWay {
    fn group_arity(&self) -> Option<usize> {
        None
    }

    fn evaluate(&self, groups: &[Vec<&Observation>]) -> Result<TimeChannelMap> {
        let (n_times, n_channels) = check_arity(self.group_arity(), groups)?;
        let k = groups.len();
        let n_total: usize = groups.iter().map(Vec::len).sum();

        let mut out = TimeChannelMap::zeros(n_times, n_channels);
        let mut bufs: Vec<Vec<f32>> = groups.iter().map(|g| vec![0.0; g.len()]).collect();

        for t in 0..n_times {
            for c in 0..n_channels {
                let mut grand_sum = 0.0_f32;
                let mut stats = Vec::with_capacity(k);
                for (g, group) in groups.iter().enumerate() {
                    gather_cell(group, t, c, &mut bufs[g]);
                    let (mean, var) = cell_mean_variance(&bufs[g]);
                    grand_sum += mean * group.len() as f32;
                    stats.push((group.len() as f32, mean, var));
                }
                let grand_mean = grand_sum / n_total as f32;

                let ss_between: f32 = stats
                    .iter()
                    .map(|(n, m, _)| n * (m - grand_mean) * (m - grand_mean))
                    .sum();
                let ss_within: f32 = stats.iter().map(|(n, _, v)| (n - 1.0) * v).sum();

                let df_between = (k - 1) as f32;
                let df_within = (n_total - k) as f32;

                let f = if df_between > 0.0 && df_within > 0.0 && ss_within > 0.0 {
                    (ss_between / df_between) / (ss_within / df_within)
                } else {
                    0.0
                };
                *out.at_mut(t, c) = f;
            }
        }
        Ok(out)
    }
}

/// Collect one (time, channel) cell's value from every observation in a
/// group into a reusable buffer.
#[inline]
fn gather_cell(group: &[&Observation], t: usize, c: usize, buf: &mut [f32]) {
    for (slot, obs) in buf.iter_mut().zip(group.iter()) {
        *slot = obs.at(t, c);
    }
}

/// Mean and sample variance of a cell buffer via Trueno reductions. A
/// single-element buffer has undefined sample variance and yields 0.0.
fn cell_mean_variance(buf: &[f32]) -> (f32, f32) {
    if buf.len() < 2 {
        return (buf.first().copied().unwrap_or(0.0), 0.0);
    }
    let v = Vector::from_slice(buf);
    let mean = v.mean().unwrap_or(0.0);
    let stddev = v.stddev().unwrap_or(0.0);
    (mean, stddev * stddev)
}

fn check_arity(arity: Option<usize>, groups: &[Vec<&Observation>]) -> Result<(usize, usize)> {
    match arity {
        Some(required) if groups.len() != required => {
            return Err(ClusterStatsError::GroupArityMismatch {
                required,
                actual: groups.len(),
            })
        }
        None if groups.len() < 2 => {
            return Err(ClusterStatsError::GroupArityMismatch {
                required: 2,
                actual: groups.len(),
            })
        }
        _ => {}
    }
    validate_group_shapes(groups)
}

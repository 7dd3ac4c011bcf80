//! Fixed-shape dense (time × channel) containers
//!
//! All per-point data in the engine (observations, statistic maps, TFCE
//! enhancement maps) lives in `TimeChannelMap`: a dense row-major array with
//! an explicit `(n_times, n_channels)` shape and bounds-checked access.
//! Shape mismatches surface as immediate validation errors instead of silent
//! broadcasting.

use crate::error::{ClusterStatsError, Result};
use serde::Serialize;

/// Dense real-valued array indexed by (time-sample, channel), row-major in
/// time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeChannelMap {
    n_times: usize,
    n_channels: usize,
    data: Vec<f32>,
}

/// One trial/subject's measurement. Immutable once collected.
pub type Observation = TimeChannelMap;

impl TimeChannelMap {
    /// Create a zero-filled map of the given shape.
    pub fn zeros(n_times: usize, n_channels: usize) -> Self {
        Self {
            n_times,
            n_channels,
            data: vec![0.0; n_times * n_channels],
        }
    }

    /// Create a map from row-major data (time-sample major, channel minor).
    ///
    /// Fails with a validation error if `data.len() != n_times * n_channels`.
    pub fn from_vec(n_times: usize, n_channels: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != n_times * n_channels {
            return Err(ClusterStatsError::DataLengthMismatch {
                shape: (n_times, n_channels),
                len: data.len(),
            });
        }
        Ok(Self {
            n_times,
            n_channels,
            data,
        })
    }

    pub fn n_times(&self) -> usize {
        self.n_times
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_times, self.n_channels)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bounds-checked read.
    pub fn get(&self, time: usize, channel: usize) -> Result<f32> {
        self.index_of(time, channel).map(|i| self.data[i])
    }

    /// Bounds-checked write.
    pub fn set(&mut self, time: usize, channel: usize, value: f32) -> Result<()> {
        let i = self.index_of(time, channel)?;
        self.data[i] = value;
        Ok(())
    }

    /// Unchecked-in-release read for the hot clustering loops. Callers index
    /// with coordinates already validated against this map's shape.
    #[inline]
    pub(crate) fn at(&self, time: usize, channel: usize) -> f32 {
        debug_assert!(time < self.n_times && channel < self.n_channels);
        self.data[time * self.n_channels + channel]
    }

    #[inline]
    pub(crate) fn at_mut(&mut self, time: usize, channel: usize) -> &mut f32 {
        debug_assert!(time < self.n_times && channel < self.n_channels);
        &mut self.data[time * self.n_channels + channel]
    }

    /// Flat row-major view of the data.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Largest absolute value in the map (0.0 for an empty map).
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0_f32, |m, v| m.max(v.abs()))
    }

    /// Largest value in the map (0.0 for an empty map).
    pub fn max_value(&self) -> f32 {
        self.data.iter().fold(f32::MIN, |m, v| m.max(*v)).max(0.0)
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    /// Iterate points in canonical order: ascending time-sample, then
    /// ascending channel index.
    pub fn iter_points(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        let n_channels = self.n_channels;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i / n_channels, i % n_channels, v))
    }

    /// Copy with every value negated. Used by sign-flip resampling.
    pub fn negated(&self) -> Self {
        Self {
            n_times: self.n_times,
            n_channels: self.n_channels,
            data: self.data.iter().map(|v| -v).collect(),
        }
    }

    fn index_of(&self, time: usize, channel: usize) -> Result<usize> {
        if time >= self.n_times || channel >= self.n_channels {
            return Err(ClusterStatsError::PointOutOfBounds {
                time,
                channel,
                shape: self.shape(),
            });
        }
        Ok(time * self.n_channels + channel)
    }
}

/// Validate that every observation in every group shares `expected` shape
/// and that no group is empty.
pub fn validate_group_shapes(groups: &[Vec<&Observation>]) -> Result<(usize, usize)> {
    let first = groups
        .iter()
        .flat_map(|g| g.iter())
        .next()
        .ok_or(ClusterStatsError::EmptyGroup { group: 0 })?;
    let expected = first.shape();

    for (g, group) in groups.iter().enumerate() {
        if group.is_empty() {
            return Err(ClusterStatsError::EmptyGroup { group: g });
        }
        for obs in group {
            if obs.shape() != expected {
                return Err(ClusterStatsError::ShapeMismatch {
                    expected,
                    actual: obs.shape(),
                });
            }
        }
    }
    Ok(expected)
}

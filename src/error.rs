//! Error taxonomy for the permutation testing engine
//!
//! Two fatal categories: configuration errors (caller passed an invalid
//! criterion or parameter, detected at construction) and validation errors
//! (data handed to the engine is malformed, detected at entry). Neither is
//! retried. User-requested cancellation is not an error: an aborted run
//! returns partial results with `completed = false` on the run record.

use thiserror::Error;

/// Errors for cluster permutation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterStatsError {
    // --- Configuration errors ---
    #[error("unknown channel '{name}' in adjacency criterion (strict matching)")]
    UnknownChannel { name: String },

    #[error("duplicate channel name '{name}'")]
    DuplicateChannel { name: String },

    #[error("TFCE step must be positive, got {step}")]
    NonPositiveTfceStep { step: f32 },

    #[error("TFCE start must be non-negative, got {start}")]
    NegativeTfceStart { start: f32 },

    #[error("alpha must lie in (0, 1), got {alpha}")]
    InvalidAlpha { alpha: f32 },

    #[error("n_permutations must be positive")]
    ZeroPermutations,

    #[error("channel count mismatch: positions for {positions} channels, names for {names}")]
    PositionCountMismatch { names: usize, positions: usize },

    #[error("adjacency radius must be finite and non-negative, got {radius}")]
    InvalidRadius { radius: f32 },

    // --- Validation errors ---
    #[error("group {group} contains no observations")]
    EmptyGroup { group: usize },

    #[error("statistic requires {required} groups, got {actual}")]
    GroupArityMismatch { required: usize, actual: usize },

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("data has {data} channels but adjacency graph covers {graph}")]
    ChannelCountMismatch { graph: usize, data: usize },

    #[error("assignment labels {labels} observations but {observations} were supplied")]
    AssignmentLengthMismatch { observations: usize, labels: usize },

    #[error("map data length {len} does not match shape {shape:?}")]
    DataLengthMismatch { shape: (usize, usize), len: usize },

    #[error("point ({time}, {channel}) out of bounds for shape {shape:?}")]
    PointOutOfBounds {
        time: usize,
        channel: usize,
        shape: (usize, usize),
    },

    #[error("null distribution is empty; run the permutation engine first")]
    EmptyNullDistribution,
}

impl ClusterStatsError {
    /// True for errors caused by an invalid configuration (as opposed to
    /// malformed input data).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownChannel { .. }
                | Self::DuplicateChannel { .. }
                | Self::NonPositiveTfceStep { .. }
                | Self::NegativeTfceStart { .. }
                | Self::InvalidAlpha { .. }
                | Self::ZeroPermutations
                | Self::PositionCountMismatch { .. }
                | Self::InvalidRadius { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClusterStatsError>;

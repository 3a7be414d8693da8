//! Error types for the kinematics engine.

use thiserror::Error;

/// Faults raised by chain construction, kinematics queries and the solver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    /// Malformed DH table or bounds.
    #[error("invalid chain definition: {0}")]
    Construction(String),

    /// A 1-based joint index or a frame index fell outside the chain.
    #[error("index {index} out of range (valid: {min}..={max})")]
    Index { index: usize, min: usize, max: usize },

    /// Frame range given with `start > end`.
    #[error("invalid frame range: start {start} is after end {end}")]
    Range { start: usize, end: usize },

    /// A vector argument has the wrong length.
    #[error("{what} dimension mismatch: expected {expected}, got {actual}")]
    Dimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The least-squares routine stopped without meeting its tolerances.
    /// `error` is the unscaled residual norm at the returned point.
    #[error("solver failed to converge after {iterations} iterations (residual norm = {error})")]
    Convergence { iterations: usize, error: f64 },

    /// A joint value is NaN or infinite.
    #[error("joint {joint} value {value} is not finite")]
    NonFinite { joint: usize, value: f64 },

    /// The starting vector lies outside the supplied joint bounds.
    #[error("joint {joint} start value {value} violates bounds [{lower}, {upper}]")]
    BoundViolation {
        joint: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// Solver settings that cannot drive an iteration.
    #[error("invalid solver settings: {0}")]
    InvalidSettings(String),
}

impl KinematicsError {
    pub fn construction(msg: impl Into<String>) -> Self {
        Self::Construction(msg.into())
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }

    pub(crate) fn dimension(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::Dimension {
            what,
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, KinematicsError>;

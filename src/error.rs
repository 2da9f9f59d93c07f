//! Error taxonomy. Only [`RallyError::Fatal`] is meant to ever abort a
//! run; every other variant is recovered locally by the stage that raised it
//! and surfaced as a [`crate::metadata::ProcessingStats`] counter instead.

use thiserror::Error;

use crate::time::Time;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RallyError {
    #[error("detector produced an invalid detection: {reason}")]
    InvalidDetection { reason: String },

    #[error("frame timestamp {got:?} is not strictly after previous {previous:?}")]
    NonMonotonicTime { previous: Time, got: Time },

    #[error("scene discontinuity: dt={dt} exceeds max_dt={max_dt}")]
    SceneDiscontinuity { dt: f64, max_dt: f64 },

    #[error("physics fit matrix is singular")]
    FitDegenerate,

    #[error("run was cancelled")]
    Cancelled,

    #[error("invariant violation: {0}")]
    Fatal(String),
}

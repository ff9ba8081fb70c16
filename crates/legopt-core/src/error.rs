//! Error types for the core crate

use thiserror::Error;

/// Errors raised by the robot and hybrid bookkeeping modules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A discrete event was pushed or moved to a time that breaks the
    /// strictly increasing ordering of event times.
    #[error("event time {time} must lie strictly between {lower} and {upper}")]
    EventTimeNotIncreasing { time: f64, lower: f64, upper: f64 },

    /// The pre-event contact status does not match the last contact phase.
    #[error("event pre-contact status does not match the last contact phase")]
    EventStatusMismatch,

    /// The two contact statuses produce no impulse and no lift.
    #[error("contact statuses are identical, no discrete event between them")]
    NoDiscreteEvent,

    /// Pop on a sequence with a single phase.
    #[error("contact sequence has no discrete event to remove")]
    EmptySequence,

    #[error("{kind} index {index} out of range (length {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("contact count mismatch: expected {expected}, got {got}")]
    ContactCountMismatch { expected: usize, got: usize },

    /// Rejected parameter value (non-positive horizon, friction coefficient, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result alias for the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

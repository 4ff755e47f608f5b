//! Error types for the browser agent core

use crate::action::ActionKind;
use thiserror::Error;

/// Failure to map a model coordinate onto the live viewport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    /// The axis has no usable extent
    #[error("axis extent must be positive, got {0}")]
    EmptyAxis(u32),

    /// The value is not a finite number
    #[error("coordinate {0} is not a finite number")]
    NotFinite(f64),

    /// The mapped pixel does not lie inside `[0, extent)`
    #[error("coordinate {value} maps to pixel {pixel}, outside [0, {extent})")]
    OutOfBounds { value: f64, pixel: i64, extent: u32 },

    /// The value lies outside the declared source scale
    #[error("coordinate {value} is outside the declared 0-{scale} scale")]
    OutsideScale { value: f64, scale: u32 },
}

/// Bad or missing action arguments. Raised before any remote call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    /// Action the arguments were meant for
    pub kind: ActionKind,
    /// Human readable reason
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ActionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn coordinate(kind: ActionKind, err: CoordinateError) -> Self {
        Self::new(kind, err.to_string())
    }
}

/// The model response could not be turned into an action batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Nothing in the text looked like JSON
    #[error("no JSON object or array found in model response")]
    NoJson,

    /// Every structured attempt failed; carries the last decoder message
    #[error("model response is not valid JSON after repair: {0}")]
    Malformed(String),

    /// JSON decoded but did not have the batch shape
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Failure of a remote browser-control primitive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// Network hiccup, timeout, 5xx, navigation error. Safe to retry.
    #[error("{0}")]
    Transient(String),

    /// Session is gone or the caller is not authenticated. Never retried.
    #[error("session invalid: {0}")]
    SessionInvalid(String),
}

impl ControlError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControlError::SessionInvalid(_))
    }
}

/// Error that terminates a loop and poisons the owning session.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fatal execution error: {message}")]
pub struct FatalExecutionError {
    pub message: String,
}

impl FatalExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ControlError> for FatalExecutionError {
    fn from(err: ControlError) -> Self {
        Self::new(err.to_string())
    }
}

/// Vision sub-query service failure.
#[derive(Debug, Error)]
pub enum VisionError {
    /// No vision service was configured for this loop
    #[error("no vision service configured")]
    Unavailable,

    /// The service answered with something unusable
    #[error("vision service returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Remote session pool failure.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to acquire session: {0}")]
    Acquire(String),

    #[error("failed to release session {session_id}: {message}")]
    Release { session_id: String, message: String },
}

/// Outcome of running work on a pooled session that did not produce a value.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Fatal(#[from] FatalExecutionError),

    #[error("task timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task cancelled")]
    Cancelled,
}

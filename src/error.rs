//! Error type shared by every module of the crate.

use thiserror::Error;

/// Errors surfaced to callers.
///
/// Runtime conditions (degenerate boxes, missing detections, capacity limits)
/// are not errors; only programmer and configuration mistakes end up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A depth-extraction method name that is not `center`, `median` or `min`.
    #[error("unknown depth extraction method: {0}")]
    UnknownDepthMethod(String),

    /// A backend name that is not `auto`, `native` or `portable`.
    #[error("unknown acceleration backend: {0}")]
    UnknownBackend(String),

    /// An array handed to the acceleration bridge has the wrong shape.
    #[error("invalid array shape: expected {expected}, got {got:?}")]
    InvalidShape {
        expected: &'static str,
        got: Vec<usize>,
    },

    /// A tracker configuration value is out of range.
    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

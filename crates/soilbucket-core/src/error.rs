//! Error types for setup, configuration and backend failures.
//!
//! Every variant is fatal for the run that raised it. Missing parameter
//! lookups are deliberately not represented here: they default to 0.0.

use thiserror::Error;

/// Errors that can abort a water-balance run.
#[derive(Error, Debug)]
pub enum WaterBalanceError {
    /// Backend identifier not in the closed set.
    #[error("unrecognized backend '{0}', expected 'host' or 'device'")]
    UnknownBackend(String),

    /// Invalid run configuration (work-group size, thread count, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected backend cannot be brought up on this machine or build.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Forcing arrays failed validation.
    #[error("invalid forcing: {0}")]
    InvalidForcing(String),

    /// Two grids (or a grid and its data) disagree in size.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// A category index has no slot in a parameter table.
    #[error("index {index} out of range for {table} ({len} entries)")]
    IndexOutOfRange {
        table: &'static str,
        index: u32,
        len: usize,
    },

    /// Mapping codes are not strictly ascending.
    #[error("malformed mapping: {0}")]
    MalformedMapping(String),

    /// Device-side failure during dispatch or readback.
    #[error("device error: {0}")]
    Device(String),
}

impl WaterBalanceError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a backend-unavailable error.
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors raised while validating configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnknownBackend(_) | Self::InvalidConfig(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WaterBalanceError>;

//! Error types for capacity validation.

use thiserror::Error;

/// Errors raised when a capacity tuple is not acceptable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CapacityError {
    /// A capacity fraction is outside `[0, 1]`.
    #[error("capacity demand is not in the [0,1] range: {value} (label '{label}')")]
    OutOfRange { label: String, value: f32 },

    /// A capacity fraction is NaN or infinite.
    #[error("capacity for label '{label}' is not a finite number")]
    NotFinite { label: String },
}

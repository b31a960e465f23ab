//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A queue path contains an empty segment (`root..a`, `.root`).
    #[error("queue path '{path}' contains an empty segment")]
    EmptySegment { path: String },

    /// A queue path segment contains a character that is not allowed.
    #[error("invalid queue name '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: &'static str },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error concerns the shape of a queue path.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            IdError::EmptySegment { .. } | IdError::InvalidSegment { .. }
        )
    }
}

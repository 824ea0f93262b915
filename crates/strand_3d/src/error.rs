//! Error types for strand_3d

use thiserror::Error;

/// Errors raised by engine constructors and property setters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A constructor received an argument of the wrong shape
    #[error("{constructor}: argument {index} must be {expected}")]
    InvalidArgument {
        constructor: String,
        index: usize,
        expected: &'static str,
    },

    /// A child-list operation was rejected
    #[error("cannot add {child} to {parent}: {reason}")]
    InvalidChild {
        parent: String,
        child: String,
        reason: &'static str,
    },

    /// A setter could not accept the value
    #[error("{target} setter rejected {value}: {reason}")]
    InvalidValue {
        target: &'static str,
        value: String,
        reason: &'static str,
    },

    /// A colour string that is neither hex nor a known name
    #[error("unknown colour: {0}")]
    UnknownColor(String),
}

/// Result type for strand_3d operations
pub type Result<T> = std::result::Result<T, EngineError>;

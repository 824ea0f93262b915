//! Error types for the reconciler

use strand_3d::EngineError;
use thiserror::Error;

use crate::loader::LoadError;

/// Errors surfaced by the reconciler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FiberError {
    /// A hook was used outside of a mounted root
    #[error("{hook} must be called inside a Strand root")]
    MissingContext { hook: &'static str },

    /// No constructor is registered under this element name
    #[error("unknown element: {0}")]
    UnknownElement(String),

    /// The engine constructor rejected its arguments
    #[error("failed to construct <{element}>: {source}")]
    Construction {
        element: String,
        #[source]
        source: EngineError,
    },

    /// A property write could not be applied
    #[error("cannot apply prop {key:?} to {object}: {reason}")]
    Prop {
        key: String,
        object: String,
        reason: String,
    },

    /// An asset load failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Invalid root configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The instance was unmounted
    #[error("instance is no longer mounted")]
    Unmounted,
}

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, FiberError>;

impl FiberError {
    pub(crate) fn prop(key: &str, object: &strand_3d::ObjectRef, reason: impl ToString) -> Self {
        FiberError::Prop {
            key: key.to_string(),
            object: object.to_string(),
            reason: reason.to_string(),
        }
    }
}

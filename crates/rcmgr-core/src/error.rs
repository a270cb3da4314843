use thiserror::Error;

use crate::types::Resource;

/// Canonical result for the resource manager.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("resource limit exceeded in scope '{scope}': {resource} (requested {requested}, used {used}, limit {limit})")]
    LimitExceeded {
        scope: String,
        resource: Resource,
        requested: i64,
        used: i64,
        limit: i64,
    },

    #[error("scope '{scope}' is closed")]
    ScopeClosed { scope: String },

    #[error("resource manager is closed")]
    ManagerClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Error::LimitExceeded { .. })
    }

    /// True for both a closed scope and a closed manager.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ScopeClosed { .. } | Error::ManagerClosed)
    }

    /// The exhausted dimension, if this is a limit error.
    pub fn resource(&self) -> Option<Resource> {
        match self {
            Error::LimitExceeded { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

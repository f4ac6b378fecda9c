//! Engine and runtime error types.

use std::{fmt, time::Duration};

use invitrack_core::CommunityId;
use thiserror::Error;

use crate::{platform::FetchError, storage::StorageError};

/// Why an event was dropped.
///
/// Every variant is local to one event. The ledger is left as it was before
/// the failing step; reconciliation repairs any drift later.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A platform read failed.
    #[error("fetch failed for community {community}: {source}")]
    Fetch {
        /// Community being read
        community: CommunityId,
        /// Platform error
        #[source]
        source: FetchError,
    },

    /// A platform read did not complete in time.
    #[error("fetch for community {community} timed out after {timeout:?}")]
    FetchTimeout {
        /// Community being read
        community: CommunityId,
        /// Configured fetch timeout
        timeout: Duration,
    },

    /// A ledger transaction failed and was not committed.
    #[error("ledger error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that stop the runtime or the operator tool.
#[derive(Debug)]
pub enum RuntimeError {
    /// Invalid configuration or input file.
    ///
    /// Fatal at startup. Fix the configuration and restart.
    Config(String),

    /// The ledger could not be opened or read.
    Storage(StorageError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<StorageError> for RuntimeError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::Fetch {
            community: CommunityId(5),
            source: FetchError::Unavailable("502".to_string()),
        };
        assert_eq!(err.to_string(), "fetch failed for community 5: platform unavailable: 502");

        let err = EngineError::FetchTimeout {
            community: CommunityId(5),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "fetch for community 5 timed out after 10s");
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::Config("reconcile interval must be non-zero".to_string());
        assert_eq!(err.to_string(), "configuration error: reconcile interval must be non-zero");

        let err = RuntimeError::from(StorageError::Poisoned);
        assert!(err.to_string().starts_with("storage error: "));
    }
}

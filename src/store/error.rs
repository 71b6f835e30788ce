//! Store error types.

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors from store operations.
///
/// Every operation produces a `StoreResult` internally; `SyncStore::settle`
/// turns it into each public method's contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    #[error("Not authorized to modify place {0}")]
    NotAuthorized(String),

    /// The user signed out or changed while a request was in flight.
    #[error("Session changed before the request completed")]
    SessionChanged,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Failed to encode document: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encode(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

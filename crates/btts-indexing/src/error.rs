//! Error types for the indexing pipeline.

use btts_search::SearchError;
use btts_storage::StorageError;
use thiserror::Error;

use crate::platform::PlatformError;

/// Errors that can occur while ingesting, reconciling or importing.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Metadata store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Index backend failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Platform call failed
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// An outbound call or iteration exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Work was cancelled at a batch boundary
    #[error("Cancelled")]
    Cancelled,

    /// The platform gap is too large to replay; a full resync is needed
    #[error("Difference too long, resync required from pts {pts}")]
    ResyncRequired { pts: i64 },

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IndexingError {
    /// Whether the next scheduled iteration may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexingError::Timeout(_) => true,
            IndexingError::Platform(e) => e.is_transient(),
            IndexingError::Search(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

impl From<IndexingError> for btts_types::BttsError {
    fn from(err: IndexingError) -> Self {
        match err {
            IndexingError::Storage(e) => e.into(),
            IndexingError::Search(e) => e.into(),
            IndexingError::Platform(PlatformError::NotFound(what)) => {
                btts_types::BttsError::NotFound(what)
            }
            other if other.is_transient() => btts_types::BttsError::Transient(other.to_string()),
            other => btts_types::BttsError::Fatal(other.to_string()),
        }
    }
}

//! Search error types.

use thiserror::Error;

/// Errors that can occur during index and search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error talking to the external search service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The external service answered with an error status
    #[error("Search service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// An asynchronous task on the external service failed
    #[error("Task {task_uid} failed: {code}: {message}")]
    TaskFailed {
        task_uid: u64,
        code: String,
        message: String,
    },

    /// Waiting for an external task exceeded the deadline
    #[error("Timed out waiting for task {0}")]
    TaskTimeout(u64),

    /// Invalid search request or document batch
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Index is locked (another process has it open) or a lock was poisoned
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(String),
}

impl SearchError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            SearchError::TaskTimeout(_) | SearchError::IndexLocked(_) | SearchError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(err: tokio::task::JoinError) -> Self {
        SearchError::Join(err.to_string())
    }
}

impl From<SearchError> for btts_types::BttsError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidRequest(msg) => btts_types::BttsError::Validation(msg),
            SearchError::IndexNotFound(what) => btts_types::BttsError::NotFound(what),
            SearchError::SchemaMismatch(_) => btts_types::BttsError::Fatal(err.to_string()),
            other if other.is_transient() => btts_types::BttsError::Transient(other.to_string()),
            other => btts_types::BttsError::Fatal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let err = SearchError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());

        let err = SearchError::Status {
            status: 400,
            body: "bad filter".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_into_btts_error() {
        let err: btts_types::BttsError = SearchError::InvalidRequest("limit".into()).into();
        assert!(matches!(err, btts_types::BttsError::Validation(_)));

        let err: btts_types::BttsError = SearchError::TaskTimeout(3).into();
        assert!(err.is_transient());
    }
}

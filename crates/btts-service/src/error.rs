//! Error types for the service layer and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use btts_indexing::IndexingError;
use btts_search::SearchError;
use btts_storage::StorageError;

/// Errors returned by [`SearchService`](crate::SearchService) and the HTTP
/// handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed request
    #[error("{0}")]
    BadRequest(String),

    /// Missing or unknown bearer key
    #[error("Unauthorized")]
    Unauthorized,

    /// Key is valid but may not read the requested chats
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Search(SearchError::InvalidRequest(_))
            | ServiceError::Search(SearchError::QueryParse(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Search(SearchError::IndexNotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Search(_) | ServiceError::Storage(_) | ServiceError::Indexing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

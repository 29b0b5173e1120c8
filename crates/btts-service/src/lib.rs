//! Search service and HTTP API for btts.
//!
//! Provides:
//! - [`SearchService`]: validated single and multi-chat search over the
//!   index backend, plus cached pagination
//! - [`ResultCache`]: TTL cache of search requests keyed by short random ids
//! - [`router`] / [`run_server_with_shutdown`]: the axum HTTP surface with
//!   bearer-key access control

pub mod auth;
pub mod cache;
pub mod error;
pub mod http;
pub mod search_service;

pub use auth::{Access, Authenticator};
pub use cache::ResultCache;
pub use error::ServiceError;
pub use http::{router, run_server_with_shutdown, AppState};
pub use search_service::SearchService;

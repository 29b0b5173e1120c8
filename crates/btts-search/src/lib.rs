//! # btts-search
//!
//! Per-chat full-text indices for btts.
//!
//! Two interchangeable backends implement [`IndexBackend`]:
//! - [`EmbeddedBackend`]: a Tantivy index per chat on local disk
//! - [`ExternalBackend`]: a Meilisearch-compatible HTTP service, either one
//!   index per chat or a single shared index with Cantor-paired keys
//!
//! Both return hits ordered newest first and format them with the same
//! snippet extractor, so callers cannot tell them apart.

pub mod backend;
pub mod cantor;
pub mod embedded;
pub mod error;
pub mod external;
pub mod factory;
pub mod index;
pub mod schema;
pub mod snippet;
pub mod types;

pub use backend::{prepare_batch, IndexBackend};
pub use cantor::{pair, pair_ids, unpair};
pub use embedded::{EmbeddedBackend, EmbeddedConfig};
pub use error::SearchError;
pub use external::{ExternalBackend, ExternalConfig};
pub use factory::backend_from_settings;
pub use index::{ChatIndex, ChatQuery};
pub use schema::{build_document_schema, DocumentSchema};
pub use snippet::{snippet, EMPTY_MESSAGE, SNIPPET_MAX_CHARS};
pub use types::{
    merge_responses, Formatted, SearchHit, SearchRequest, SearchResponse, DEFAULT_LIMIT, MAX_LIMIT,
    MAX_OFFSET,
};

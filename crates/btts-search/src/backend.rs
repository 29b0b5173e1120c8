//! Backend abstraction over the index engines.

use std::collections::HashMap;

use async_trait::async_trait;

use btts_types::Document;

use crate::error::SearchError;
use crate::types::{SearchRequest, SearchResponse};

/// Attributes a backend must allow filtering on.
pub const FILTERABLE_ATTRIBUTES: &[&str] = &["chat_id", "user_id", "type", "timestamp"];

/// Attributes a backend must allow sorting on.
pub const SORTABLE_ATTRIBUTES: &[&str] = &["timestamp", "id", "chat_id"];

/// Attributes matched by the full-text query.
pub const SEARCHABLE_ATTRIBUTES: &[&str] = &["message"];

/// Per-chat document index.
///
/// Every operation is idempotent where the semantics allow: creating an
/// existing index, deleting a missing index or unknown ids all succeed.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Create the chat's index with its attribute settings.
    async fn create_index(&self, chat_id: i64) -> Result<(), SearchError>;

    /// Drop the chat's index and every document in it.
    async fn delete_index(&self, chat_id: i64) -> Result<(), SearchError>;

    /// Upsert documents by id. The last occurrence of a duplicated id wins.
    ///
    /// Returns the number of documents written.
    async fn add_documents(&self, chat_id: i64, docs: Vec<Document>)
        -> Result<usize, SearchError>;

    /// Remove documents by id; unknown ids are ignored.
    async fn delete_documents(&self, chat_id: i64, ids: &[i64]) -> Result<(), SearchError>;

    /// Fetch the subset of `ids` that exists, in request order.
    async fn get_documents(&self, chat_id: i64, ids: &[i64]) -> Result<Vec<Document>, SearchError>;

    /// Run a validated search request.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;

    /// Release handles. The backend must not be used afterwards.
    async fn close(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Normalize a batch before writing: force `chat_id`, keep the last
/// occurrence of each id, and preserve the order of those survivors.
pub fn prepare_batch(chat_id: i64, docs: Vec<Document>) -> Vec<Document> {
    let mut last_seen: HashMap<i64, usize> = HashMap::with_capacity(docs.len());
    for (i, doc) in docs.iter().enumerate() {
        last_seen.insert(doc.id, i);
    }
    docs.into_iter()
        .enumerate()
        .filter(|(i, doc)| last_seen.get(&doc.id) == Some(i))
        .map(|(_, doc)| doc.in_chat(chat_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use btts_types::MessageType;

    #[test]
    fn test_prepare_batch_keeps_last_duplicate() {
        let docs = vec![
            Document::new(1, 7, MessageType::Text, "first", 1),
            Document::new(2, 7, MessageType::Text, "other", 2),
            Document::new(1, 7, MessageType::Text, "second", 3).in_chat(999),
        ];
        let batch = prepare_batch(100, docs);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, 2);
        assert_eq!(batch[1].message, "second");
        assert!(batch.iter().all(|d| d.chat_id == 100));
    }

    #[test]
    fn test_prepare_batch_empty() {
        assert!(prepare_batch(1, Vec::new()).is_empty());
    }
}

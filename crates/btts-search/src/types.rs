//! Search request/response contract shared by every backend.

use serde::{Deserialize, Serialize};

use btts_types::{Document, MessageType, SearchFilter};

use crate::error::SearchError;
use crate::snippet::snippet;

/// Limit applied when the caller does not give one.
pub const DEFAULT_LIMIT: usize = 10;

/// Largest page a single request may ask for.
pub const MAX_LIMIT: usize = 100;

/// Deepest offset a request may start from.
pub const MAX_OFFSET: usize = 1000;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// A search over one chat (`chat_id`) or several (`chat_ids`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub user_filters: Vec<i64>,
    #[serde(default)]
    pub type_filters: Vec<MessageType>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            chat_id: None,
            chat_ids: Vec::new(),
            query: String::new(),
            user_filters: Vec::new(),
            type_filters: Vec::new(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchRequest {
    /// Single-chat request.
    pub fn chat(chat_id: i64, query: impl Into<String>) -> Self {
        Self {
            chat_id: Some(chat_id),
            query: query.into(),
            ..Default::default()
        }
    }

    /// Multi-chat request.
    pub fn chats(chat_ids: Vec<i64>, query: impl Into<String>) -> Self {
        Self {
            chat_ids,
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_users(mut self, users: Vec<i64>) -> Self {
        self.user_filters = users;
        self
    }

    pub fn with_types(mut self, types: Vec<MessageType>) -> Self {
        self.type_filters = types;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Check the request and clamp its limit.
    ///
    /// Exactly one of `chat_id` and `chat_ids` must be given. A zero limit
    /// means the default; anything above [`MAX_LIMIT`] is capped. Offsets
    /// past [`MAX_OFFSET`] are rejected.
    pub fn validate(mut self) -> Result<Self, SearchError> {
        match (self.chat_id, self.chat_ids.is_empty()) {
            (Some(_), false) => {
                return Err(SearchError::InvalidRequest(
                    "chat_id and chat_ids are mutually exclusive".to_string(),
                ))
            }
            (None, true) => {
                return Err(SearchError::InvalidRequest(
                    "one of chat_id or chat_ids is required".to_string(),
                ))
            }
            _ => {}
        }
        if self.offset > MAX_OFFSET {
            return Err(SearchError::InvalidRequest(format!(
                "offset {} exceeds the maximum of {}",
                self.offset, MAX_OFFSET
            )));
        }
        if self.limit == 0 {
            self.limit = DEFAULT_LIMIT;
        }
        self.limit = self.limit.min(MAX_LIMIT);
        Ok(self)
    }

    /// Chats this request covers, in request order without duplicates.
    pub fn target_chats(&self) -> Vec<i64> {
        match self.chat_id {
            Some(id) => vec![id],
            None => {
                let mut seen = std::collections::HashSet::new();
                self.chat_ids
                    .iter()
                    .copied()
                    .filter(|id| seen.insert(*id))
                    .collect()
            }
        }
    }

    pub fn is_multi(&self) -> bool {
        self.chat_id.is_none()
    }

    /// Filter over users and types (chat selection is positional).
    pub fn filter(&self) -> SearchFilter {
        SearchFilter::new()
            .with_users(self.user_filters.clone())
            .with_types(self.type_filters.clone())
    }

    /// Per-chat request used when fanning a multi-chat search out.
    ///
    /// Each chat is asked for `offset + limit` hits from the top so the
    /// merged page can be cut afterwards.
    pub fn for_chat(&self, chat_id: i64) -> SearchRequest {
        SearchRequest {
            chat_id: Some(chat_id),
            chat_ids: Vec::new(),
            query: self.query.clone(),
            user_filters: self.user_filters.clone(),
            type_filters: self.type_filters.clone(),
            offset: 0,
            limit: self.offset.saturating_add(self.limit),
        }
    }
}

/// Display form of a hit: every value stringified, message snippeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formatted {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub user_id: String,
    pub chat_id: String,
    pub timestamp: String,
}

/// A document plus its formatted view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: Document,
    #[serde(rename = "_formatted")]
    pub formatted: Formatted,
}

impl SearchHit {
    pub fn new(document: Document, query: &str) -> Self {
        let formatted = Formatted {
            id: document.id.to_string(),
            kind: document.kind.code().to_string(),
            message: snippet(&document.message, query),
            user_id: document.user_id.to_string(),
            chat_id: document.chat_id.to_string(),
            timestamp: document.timestamp.to_string(),
        };
        Self {
            document,
            formatted,
        }
    }

    /// Ordering key: newest first, higher id first on ties.
    fn sort_key(&self) -> (std::cmp::Reverse<i64>, std::cmp::Reverse<i64>, i64) {
        (
            std::cmp::Reverse(self.document.timestamp),
            std::cmp::Reverse(self.document.id),
            self.document.chat_id,
        )
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub estimated_total_hits: usize,
    pub processing_time_ms: u64,
    pub offset: usize,
    pub limit: usize,
}

impl SearchResponse {
    pub fn empty(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..Default::default()
        }
    }
}

/// Merge per-chat responses into one page.
///
/// Hits are sorted by `(timestamp desc, id desc)` and cut to
/// `[offset, offset + limit)`; totals and processing times are summed.
pub fn merge_responses(responses: Vec<SearchResponse>, offset: usize, limit: usize) -> SearchResponse {
    let mut merged = SearchResponse::empty(offset, limit);
    let mut hits = Vec::new();
    for response in responses {
        merged.estimated_total_hits += response.estimated_total_hits;
        merged.processing_time_ms += response.processing_time_ms;
        hits.extend(response.hits);
    }
    hits.sort_by_key(|h| h.sort_key());
    merged.hits = hits.into_iter().skip(offset).take(limit).collect();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chat_id: i64, id: i64, timestamp: i64) -> SearchHit {
        SearchHit::new(
            Document::new(id, 7, MessageType::Text, "m", timestamp).in_chat(chat_id),
            "",
        )
    }

    #[test]
    fn test_validate_modes() {
        assert!(SearchRequest::chat(1, "q").validate().is_ok());
        assert!(SearchRequest::chats(vec![1, 2], "q").validate().is_ok());
        assert!(SearchRequest::default().validate().is_err());

        let mut both = SearchRequest::chat(1, "q");
        both.chat_ids = vec![2];
        assert!(matches!(
            both.validate(),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_clamps_limit() {
        let req = SearchRequest::chat(1, "").with_page(0, 0).validate().unwrap();
        assert_eq!(req.limit, DEFAULT_LIMIT);
        let req = SearchRequest::chat(1, "")
            .with_page(0, 5000)
            .validate()
            .unwrap();
        assert_eq!(req.limit, MAX_LIMIT);
    }

    #[test]
    fn test_validate_rejects_deep_offsets() {
        assert!(SearchRequest::chat(1, "")
            .with_page(MAX_OFFSET, 10)
            .validate()
            .is_ok());
        for offset in [MAX_OFFSET + 1, 1 << 40, usize::MAX - 5] {
            assert!(matches!(
                SearchRequest::chat(1, "").with_page(offset, 10).validate(),
                Err(SearchError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_for_chat_saturates() {
        let req = SearchRequest::chats(vec![1, 2], "x").with_page(usize::MAX - 5, 10);
        assert_eq!(req.for_chat(1).limit, usize::MAX);
    }

    #[test]
    fn test_for_chat_widens_page() {
        let req = SearchRequest::chats(vec![1, 2], "x").with_page(20, 10);
        let per_chat = req.for_chat(2);
        assert_eq!(per_chat.chat_id, Some(2));
        assert_eq!(per_chat.offset, 0);
        assert_eq!(per_chat.limit, 30);
    }

    #[test]
    fn test_target_chats_dedupes() {
        let req = SearchRequest::chats(vec![3, 1, 3], "");
        assert_eq!(req.target_chats(), vec![3, 1]);
    }

    #[test]
    fn test_hit_json_shape() {
        let json = serde_json::to_value(hit(100, 1, 50)).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["chat_id"], 100);
        assert_eq!(json["type"], 0);
        assert_eq!(json["_formatted"]["id"], "1");
        assert_eq!(json["_formatted"]["timestamp"], "50");
    }

    #[test]
    fn test_merge_orders_and_pages() {
        let a = SearchResponse {
            hits: vec![hit(10, 3, 3), hit(10, 2, 2), hit(10, 1, 1)],
            estimated_total_hits: 3,
            processing_time_ms: 1,
            ..Default::default()
        };
        let b = SearchResponse {
            hits: vec![hit(20, 3, 6), hit(20, 2, 5), hit(20, 1, 4)],
            estimated_total_hits: 3,
            processing_time_ms: 2,
            ..Default::default()
        };

        let merged = merge_responses(vec![a, b], 1, 3);
        let ts: Vec<i64> = merged.hits.iter().map(|h| h.document.timestamp).collect();
        assert_eq!(ts, vec![5, 4, 3]);
        assert_eq!(merged.estimated_total_hits, 6);
        assert_eq!(merged.processing_time_ms, 3);
        assert_eq!(merged.offset, 1);
        assert_eq!(merged.limit, 3);
    }

    #[test]
    fn test_merge_breaks_ties_by_id() {
        let a = SearchResponse {
            hits: vec![hit(10, 1, 5)],
            ..Default::default()
        };
        let b = SearchResponse {
            hits: vec![hit(20, 9, 5)],
            ..Default::default()
        };
        let merged = merge_responses(vec![a, b], 0, 10);
        assert_eq!(merged.hits[0].document.id, 9);
    }
}

//! Search over indexed chats.

use std::sync::Arc;

use tracing::debug;

use btts_indexing::WatchedChats;
use btts_search::{IndexBackend, SearchRequest, SearchResponse};
use btts_types::{IndexChat, SearchFilter};

use crate::cache::ResultCache;
use crate::error::ServiceError;

/// Wires the chat registry, the index backend and the result cache.
pub struct SearchService {
    watched: Arc<WatchedChats>,
    backend: Arc<dyn IndexBackend>,
    cache: Arc<ResultCache>,
}

impl SearchService {
    pub fn new(
        watched: Arc<WatchedChats>,
        backend: Arc<dyn IndexBackend>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            watched,
            backend,
            cache,
        }
    }

    pub fn watched(&self) -> &Arc<WatchedChats> {
        &self.watched
    }

    pub fn backend(&self) -> &Arc<dyn IndexBackend> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Validate and run a request.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ServiceError> {
        let request = request.validate()?;
        let started = std::time::Instant::now();
        let mut response = self.backend.search(&request).await?;
        response.processing_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            chats = request.target_chats().len(),
            hits = response.hits.len(),
            total = response.estimated_total_hits,
            "Search served"
        );
        Ok(response)
    }

    /// Search every watched chat.
    pub async fn search_all_watched(
        &self,
        query: &str,
        filter: &SearchFilter,
        offset: usize,
        limit: usize,
    ) -> Result<SearchResponse, ServiceError> {
        let chat_ids = self.watched.watched_ids();
        if chat_ids.is_empty() {
            return Ok(SearchResponse::empty(offset, limit));
        }
        let request = SearchRequest::chats(chat_ids, query)
            .with_users(filter.user_ids.clone())
            .with_types(filter.types.clone())
            .with_page(offset, limit);
        self.search(request).await
    }

    /// Run a request and keep it in the cache for later pages.
    ///
    /// Returns the cache key with the first page.
    pub async fn search_paged(
        &self,
        request: SearchRequest,
    ) -> Result<(String, SearchResponse), ServiceError> {
        let request = request.validate()?;
        let response = self.search(request.clone()).await?;
        let key = self.cache.insert(request);
        Ok((key, response))
    }

    /// Re-run a cached request at a new offset.
    pub async fn page(&self, key: &str, offset: usize) -> Result<SearchResponse, ServiceError> {
        let request = self
            .cache
            .get(key)
            .ok_or_else(|| ServiceError::NotFound(format!("Search {} expired", key)))?;
        self.search(SearchRequest { offset, ..request }).await
    }

    pub fn get_chat(&self, chat_id: i64) -> Result<IndexChat, ServiceError> {
        self.watched
            .get(chat_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Chat {} is not indexed", chat_id)))
    }

    /// Every indexed chat, ordered by id.
    pub fn list_indexed(&self) -> Vec<IndexChat> {
        self.watched.all()
    }
}

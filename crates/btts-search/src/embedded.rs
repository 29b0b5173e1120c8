//! Embedded backend: one Tantivy index per chat under a root directory.
//!
//! Handles are opened lazily and cached. The handle map sits behind a
//! `RwLock`; opening takes the write lock and re-checks the map so a chat is
//! never opened twice. Index work runs on the blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use btts_types::Document;

use crate::backend::{prepare_batch, IndexBackend};
use crate::error::SearchError;
use crate::index::{index_path, ChatIndex, ChatQuery, DEFAULT_WRITER_MEMORY_MB};
use crate::types::{merge_responses, SearchHit, SearchRequest, SearchResponse};

/// Embedded backend configuration
#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    /// Directory holding one sub-directory per chat
    pub root: PathBuf,
    /// Memory budget per chat writer in MB
    pub writer_memory_mb: usize,
}

impl EmbeddedConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

struct Inner {
    config: EmbeddedConfig,
    handles: RwLock<HashMap<i64, Arc<ChatIndex>>>,
}

impl Inner {
    fn cached(&self, chat_id: i64) -> Result<Option<Arc<ChatIndex>>, SearchError> {
        let handles = self
            .handles
            .read()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        Ok(handles.get(&chat_id).cloned())
    }

    /// Handle for the chat, creating the index when `create` is set.
    fn handle(&self, chat_id: i64, create: bool) -> Result<Option<Arc<ChatIndex>>, SearchError> {
        if let Some(handle) = self.cached(chat_id)? {
            return Ok(Some(handle));
        }

        let mut handles = self
            .handles
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        if let Some(handle) = handles.get(&chat_id) {
            return Ok(Some(handle.clone()));
        }

        let root = &self.config.root;
        let memory = self.config.writer_memory_mb;
        let opened = if create {
            Some(ChatIndex::open_or_create(root, chat_id, memory)?)
        } else {
            ChatIndex::open_existing(root, chat_id, memory)?
        };

        Ok(opened.map(|index| {
            let handle = Arc::new(index);
            handles.insert(chat_id, handle.clone());
            handle
        }))
    }

    fn evict(&self, chat_id: i64) -> Result<Option<Arc<ChatIndex>>, SearchError> {
        let mut handles = self
            .handles
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        Ok(handles.remove(&chat_id))
    }

    fn search_chat(&self, request: &SearchRequest, chat_id: i64) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let Some(handle) = self.handle(chat_id, false)? else {
            return Ok(SearchResponse::empty(request.offset, request.limit));
        };

        let query = ChatQuery {
            query: request.query.clone(),
            user_ids: request.user_filters.clone(),
            type_codes: request.type_filters.iter().map(|t| t.code()).collect(),
            offset: request.offset,
            limit: request.limit,
        };
        let (total, docs) = handle.search(&query)?;

        Ok(SearchResponse {
            hits: docs
                .into_iter()
                .map(|doc| SearchHit::new(doc, &request.query))
                .collect(),
            estimated_total_hits: total,
            processing_time_ms: started.elapsed().as_millis() as u64,
            offset: request.offset,
            limit: request.limit,
        })
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let chats = request.target_chats();
        if !request.is_multi() {
            return self.search_chat(request, chats[0]);
        }

        let mut responses = Vec::with_capacity(chats.len());
        for chat_id in chats {
            responses.push(self.search_chat(&request.for_chat(chat_id), chat_id)?);
        }
        Ok(merge_responses(responses, request.offset, request.limit))
    }
}

/// Tantivy-backed [`IndexBackend`].
#[derive(Clone)]
pub struct EmbeddedBackend {
    inner: Arc<Inner>,
}

impl EmbeddedBackend {
    pub fn new(config: EmbeddedConfig) -> Result<Self, SearchError> {
        std::fs::create_dir_all(&config.root)?;
        info!(root = ?config.root, "Embedded index backend ready");
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                handles: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.config.root
    }

    /// Number of cached handles
    pub fn open_handles(&self) -> usize {
        self.inner.handles.read().map(|h| h.len()).unwrap_or(0)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SearchError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, SearchError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner)).await?
    }
}

#[async_trait]
impl IndexBackend for EmbeddedBackend {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn create_index(&self, chat_id: i64) -> Result<(), SearchError> {
        self.blocking(move |inner| inner.handle(chat_id, true).map(|_| ()))
            .await
    }

    async fn delete_index(&self, chat_id: i64) -> Result<(), SearchError> {
        self.blocking(move |inner| {
            let evicted = inner.evict(chat_id)?;
            drop(evicted);
            let path = index_path(&inner.config.root, chat_id);
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
                info!(chat_id, "Deleted index");
            } else {
                debug!(chat_id, "Index already absent");
            }
            Ok(())
        })
        .await
    }

    async fn add_documents(&self, chat_id: i64, docs: Vec<Document>) -> Result<usize, SearchError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let batch = prepare_batch(chat_id, docs);
        self.blocking(move |inner| {
            let handle = inner
                .handle(chat_id, true)?
                .ok_or_else(|| SearchError::IndexNotFound(chat_id.to_string()))?;
            handle.upsert(&batch)
        })
        .await
    }

    async fn delete_documents(&self, chat_id: i64, ids: &[i64]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.blocking(move |inner| match inner.handle(chat_id, false)? {
            Some(handle) => handle.delete(&ids),
            None => Ok(()),
        })
        .await
    }

    async fn get_documents(&self, chat_id: i64, ids: &[i64]) -> Result<Vec<Document>, SearchError> {
        let ids = ids.to_vec();
        self.blocking(move |inner| match inner.handle(chat_id, false)? {
            Some(handle) => handle.get(&ids),
            None => Ok(Vec::new()),
        })
        .await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let request = request.clone().validate()?;
        self.blocking(move |inner| inner.search(&request)).await
    }

    async fn close(&self) -> Result<(), SearchError> {
        let mut handles = self
            .inner
            .handles
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        let count = handles.len();
        handles.clear();
        info!(count, "Closed embedded index handles");
        Ok(())
    }
}

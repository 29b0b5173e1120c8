//! External backend talking to a Meilisearch-compatible HTTP service.
//!
//! Two layouts are supported:
//! - per chat: one index `btts_{chat_id}` keyed by message id
//! - single: one shared index `btts` keyed by `pair(chat_id, message_id)`
//!   with `message_id` and `chat_id` stored beside the key
//!
//! Writes are asynchronous on the service side; every write waits for its
//! task to settle before returning.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use btts_types::{filter_expression, Document, IndexLayout, MessageType};

use crate::backend::{
    prepare_batch, IndexBackend, FILTERABLE_ATTRIBUTES, SEARCHABLE_ATTRIBUTES, SORTABLE_ATTRIBUTES,
};
use crate::cantor::pair_ids;
use crate::error::SearchError;
use crate::types::{merge_responses, SearchHit, SearchRequest, SearchResponse};

/// Name of the shared index in the single layout.
pub const SINGLE_INDEX_UID: &str = "btts";

/// Prefix of per-chat index names.
pub const INDEX_PREFIX: &str = "btts_";

const TASK_INDEX_EXISTS: &str = "index_already_exists";
const TASK_INDEX_NOT_FOUND: &str = "index_not_found";

/// Configuration for the external backend.
#[derive(Debug, Clone)]
pub struct ExternalConfig {
    /// Service base URL (e.g., "http://127.0.0.1:7700")
    pub base_url: String,

    /// Bearer key, if the service requires one
    pub api_key: Option<SecretString>,

    pub layout: IndexLayout,

    /// Per-request timeout
    pub timeout: Duration,

    /// Retries for transient failures
    pub max_retries: u32,

    /// First retry delay
    pub retry_interval: Duration,

    /// How often to poll a pending task
    pub task_poll_interval: Duration,

    /// Give up waiting for a task after this long
    pub task_timeout: Duration,
}

impl ExternalConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            layout: IndexLayout::PerChat,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_interval: Duration::from_millis(500),
            task_poll_interval: Duration::from_millis(50),
            task_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_layout(mut self, layout: IndexLayout) -> Self {
        self.layout = layout;
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_uid: u64,
}

#[derive(Deserialize)]
struct TaskState {
    status: String,
    #[serde(default)]
    error: Option<TaskErrorBody>,
}

#[derive(Deserialize)]
struct TaskErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    q: &'a str,
    offset: usize,
    limit: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    filter: String,
    sort: [&'static str; 2],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Value>,
    #[serde(default)]
    estimated_total_hits: usize,
    #[serde(default)]
    processing_time_ms: u64,
}

#[derive(Deserialize)]
struct FetchResult {
    #[serde(default)]
    results: Vec<Value>,
}

/// Stored form in the single layout.
#[derive(Debug, Serialize, Deserialize)]
struct PairedDocument {
    id: u64,
    message_id: i64,
    chat_id: i64,
    user_id: i64,
    #[serde(rename = "type")]
    kind: MessageType,
    message: String,
    timestamp: i64,
}

impl PairedDocument {
    fn from_document(doc: Document) -> Result<Self, SearchError> {
        Ok(Self {
            id: pair_ids(doc.chat_id, doc.id)?,
            message_id: doc.id,
            chat_id: doc.chat_id,
            user_id: doc.user_id,
            kind: doc.kind,
            message: doc.message,
            timestamp: doc.timestamp,
        })
    }

    fn into_document(self) -> Document {
        Document {
            id: self.message_id,
            chat_id: self.chat_id,
            user_id: self.user_id,
            kind: self.kind,
            message: self.message,
            timestamp: self.timestamp,
        }
    }
}

fn is_not_found(err: &SearchError) -> bool {
    match err {
        SearchError::Status { status, .. } => *status == 404,
        SearchError::TaskFailed { code, .. } => code == TASK_INDEX_NOT_FOUND,
        _ => false,
    }
}

fn id_list(ids: impl IntoIterator<Item = String>) -> String {
    ids.into_iter().collect::<Vec<_>>().join(", ")
}

/// HTTP-backed [`IndexBackend`].
pub struct ExternalBackend {
    client: Client,
    config: ExternalConfig,
    /// Indexes this process has created and configured
    configured: RwLock<HashSet<String>>,
}

impl ExternalBackend {
    pub fn new(config: ExternalConfig) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        info!(url = %config.base_url, layout = ?config.layout, "External index backend ready");
        Ok(Self {
            client,
            config,
            configured: RwLock::new(HashSet::new()),
        })
    }

    pub fn layout(&self) -> IndexLayout {
        self.config.layout
    }

    /// Index name holding the chat's documents.
    pub fn index_uid(&self, chat_id: i64) -> String {
        match self.config.layout {
            IndexLayout::PerChat => format!("{}{}", INDEX_PREFIX, chat_id),
            IndexLayout::Single => SINGLE_INDEX_UID.to_string(),
        }
    }

    fn is_configured(&self, uid: &str) -> bool {
        self.configured
            .read()
            .map(|set| set.contains(uid))
            .unwrap_or(false)
    }

    fn mark_configured(&self, uid: &str, configured: bool) {
        if let Ok(mut set) = self.configured.write() {
            if configured {
                set.insert(uid.to_string());
            } else {
                set.remove(uid);
            }
        }
    }

    /// Call the service with retry on transient failures.
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, SearchError> {
        let mut backoff = ExponentialBackoff {
            current_interval: self.config.retry_interval,
            initial_interval: self.config.retry_interval,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, %method, path, "Calling search service");

            match self.call_once(method.clone(), path, body).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_transient() {
                        return Err(e);
                    }
                    if attempts > self.config.max_retries {
                        error!(error = %e, path, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Search service call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn call_once(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, SearchError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Submit a write and wait until the service has applied it.
    async fn submit(&self, method: Method, path: &str, body: Option<&Value>) -> Result<(), SearchError> {
        let response = self.call(method, path, body).await?;
        let task: TaskRef = serde_json::from_value(response)?;
        self.wait_for_task(task.task_uid).await
    }

    async fn wait_for_task(&self, task_uid: u64) -> Result<(), SearchError> {
        let started = Instant::now();
        let path = format!("/tasks/{}", task_uid);

        loop {
            let state: TaskState = serde_json::from_value(self.call(Method::GET, &path, None).await?)?;
            match state.status.as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" => {
                    let (code, message) = state
                        .error
                        .map(|e| (e.code, e.message))
                        .unwrap_or_else(|| (state.status.clone(), String::new()));
                    return Err(SearchError::TaskFailed {
                        task_uid,
                        code,
                        message,
                    });
                }
                _ => {}
            }

            if started.elapsed() >= self.config.task_timeout {
                return Err(SearchError::TaskTimeout(task_uid));
            }
            tokio::time::sleep(self.config.task_poll_interval).await;
        }
    }

    /// Create the index and apply its attribute settings once per process.
    async fn ensure_index(&self, uid: &str) -> Result<(), SearchError> {
        if self.is_configured(uid) {
            return Ok(());
        }

        let create = json!({ "uid": uid, "primaryKey": "id" });
        match self.submit(Method::POST, "/indexes", Some(&create)).await {
            Ok(()) => info!(index = uid, "Created index"),
            Err(SearchError::TaskFailed { code, .. }) if code == TASK_INDEX_EXISTS => {
                debug!(index = uid, "Index already exists");
            }
            Err(e) => return Err(e),
        }

        let mut filterable: Vec<&str> = FILTERABLE_ATTRIBUTES.to_vec();
        let mut sortable: Vec<&str> = SORTABLE_ATTRIBUTES.to_vec();
        filterable.push("id");
        if self.config.layout == IndexLayout::Single {
            filterable.push("message_id");
            sortable.push("message_id");
        }
        let settings = json!({
            "filterableAttributes": filterable,
            "sortableAttributes": sortable,
            "searchableAttributes": SEARCHABLE_ATTRIBUTES,
        });
        self.submit(Method::PATCH, &format!("/indexes/{}/settings", uid), Some(&settings))
            .await?;

        self.mark_configured(uid, true);
        Ok(())
    }

    fn encode(&self, doc: Document) -> Result<Value, SearchError> {
        match self.config.layout {
            IndexLayout::PerChat => Ok(serde_json::to_value(doc)?),
            IndexLayout::Single => Ok(serde_json::to_value(PairedDocument::from_document(doc)?)?),
        }
    }

    fn decode(&self, value: Value) -> Result<Document, SearchError> {
        match self.config.layout {
            IndexLayout::PerChat => Ok(serde_json::from_value(value)?),
            IndexLayout::Single => {
                Ok(serde_json::from_value::<PairedDocument>(value)?.into_document())
            }
        }
    }

    fn sort(&self) -> [&'static str; 2] {
        match self.config.layout {
            IndexLayout::PerChat => ["timestamp:desc", "id:desc"],
            IndexLayout::Single => ["timestamp:desc", "message_id:desc"],
        }
    }

    async fn search_index(
        &self,
        uid: &str,
        request: &SearchRequest,
        filter: String,
    ) -> Result<SearchResponse, SearchError> {
        let body = serde_json::to_value(SearchBody {
            q: &request.query,
            offset: request.offset,
            limit: request.limit,
            filter,
            sort: self.sort(),
        })?;

        let result = match self
            .call(Method::POST, &format!("/indexes/{}/search", uid), Some(&body))
            .await
        {
            Ok(value) => serde_json::from_value::<SearchResult>(value)?,
            Err(e) if is_not_found(&e) => {
                debug!(index = uid, "Search on missing index");
                return Ok(SearchResponse::empty(request.offset, request.limit));
            }
            Err(e) => return Err(e),
        };

        let hits = result
            .hits
            .into_iter()
            .map(|value| Ok(SearchHit::new(self.decode(value)?, &request.query)))
            .collect::<Result<Vec<_>, SearchError>>()?;

        Ok(SearchResponse {
            hits,
            estimated_total_hits: result.estimated_total_hits,
            processing_time_ms: result.processing_time_ms,
            offset: request.offset,
            limit: request.limit,
        })
    }
}

#[async_trait]
impl IndexBackend for ExternalBackend {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn create_index(&self, chat_id: i64) -> Result<(), SearchError> {
        self.ensure_index(&self.index_uid(chat_id)).await
    }

    async fn delete_index(&self, chat_id: i64) -> Result<(), SearchError> {
        let uid = self.index_uid(chat_id);
        let result = match self.config.layout {
            IndexLayout::PerChat => {
                self.mark_configured(&uid, false);
                self.submit(Method::DELETE, &format!("/indexes/{}", uid), None)
                    .await
            }
            IndexLayout::Single => {
                let body = json!({ "filter": filter_expression(&[chat_id], &[], &[]) });
                self.submit(
                    Method::POST,
                    &format!("/indexes/{}/documents/delete", uid),
                    Some(&body),
                )
                .await
            }
        };

        match result {
            Ok(()) => {
                info!(chat_id, index = %uid, "Deleted index");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(chat_id, index = %uid, "Index already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn add_documents(&self, chat_id: i64, docs: Vec<Document>) -> Result<usize, SearchError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let uid = self.index_uid(chat_id);
        self.ensure_index(&uid).await?;

        let batch = prepare_batch(chat_id, docs);
        let count = batch.len();
        let encoded = batch
            .into_iter()
            .map(|doc| self.encode(doc))
            .collect::<Result<Vec<_>, _>>()?;

        self.submit(
            Method::POST,
            &format!("/indexes/{}/documents", uid),
            Some(&Value::Array(encoded)),
        )
        .await?;
        debug!(chat_id, count, "Indexed documents");
        Ok(count)
    }

    async fn delete_documents(&self, chat_id: i64, ids: &[i64]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<Value> = match self.config.layout {
            IndexLayout::PerChat => ids.iter().map(|id| json!(id)).collect(),
            IndexLayout::Single => ids
                .iter()
                .map(|id| pair_ids(chat_id, *id).map(|key| json!(key)))
                .collect::<Result<_, _>>()?,
        };

        let uid = self.index_uid(chat_id);
        match self
            .submit(
                Method::POST,
                &format!("/indexes/{}/documents/delete-batch", uid),
                Some(&Value::Array(keys)),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_documents(&self, chat_id: i64, ids: &[i64]) -> Result<Vec<Document>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = match self.config.layout {
            IndexLayout::PerChat => {
                format!("id IN [{}]", id_list(ids.iter().map(|id| id.to_string())))
            }
            IndexLayout::Single => format!(
                "chat_id = {} AND message_id IN [{}]",
                chat_id,
                id_list(ids.iter().map(|id| id.to_string()))
            ),
        };
        let body = json!({ "filter": filter, "limit": ids.len() });

        let uid = self.index_uid(chat_id);
        let fetched: FetchResult = match self
            .call(
                Method::POST,
                &format!("/indexes/{}/documents/fetch", uid),
                Some(&body),
            )
            .await
        {
            Ok(value) => serde_json::from_value(value)?,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut by_id: HashMap<i64, Document> = HashMap::with_capacity(fetched.results.len());
        for value in fetched.results {
            let doc = self.decode(value)?;
            by_id.insert(doc.id, doc);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let request = request.clone().validate()?;
        let started = Instant::now();
        let chats = request.target_chats();

        let mut response = match self.config.layout {
            IndexLayout::Single => {
                let filter = request.filter().with_chats(chats).expression();
                self.search_index(SINGLE_INDEX_UID, &request, filter).await?
            }
            IndexLayout::PerChat if !request.is_multi() => {
                let uid = self.index_uid(chats[0]);
                self.search_index(&uid, &request, request.filter().expression())
                    .await?
            }
            IndexLayout::PerChat => {
                let mut responses = Vec::with_capacity(chats.len());
                for chat_id in chats {
                    let per_chat = request.for_chat(chat_id);
                    let uid = self.index_uid(chat_id);
                    responses.push(
                        self.search_index(&uid, &per_chat, per_chat.filter().expression())
                            .await?,
                    );
                }
                merge_responses(responses, request.offset, request.limit)
            }
        };

        if response.processing_time_ms == 0 {
            response.processing_time_ms = started.elapsed().as_millis() as u64;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ExternalConfig {
        let mut config = ExternalConfig::new(server.uri());
        config.retry_interval = Duration::from_millis(5);
        config.task_poll_interval = Duration::from_millis(5);
        config.task_timeout = Duration::from_secs(2);
        config
    }

    async fn mount_task(server: &MockServer, uid: u64, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/tasks/{}", uid)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "uid": uid, "status": status })),
            )
            .mount(server)
            .await;
    }

    async fn mount_settings(server: &MockServer, uid: &str, task: u64) {
        Mock::given(method("PATCH"))
            .and(path(format!("/indexes/{}/settings", uid)))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": task })))
            .mount(server)
            .await;
        mount_task(server, task, "succeeded").await;
    }

    fn stored(id: i64, chat_id: i64, message: &str, ts: i64) -> Value {
        json!({
            "id": id, "chat_id": chat_id, "user_id": 7, "type": 0,
            "message": message, "timestamp": ts
        })
    }

    #[tokio::test]
    async fn test_create_index_configures_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({ "uid": "btts_100", "primaryKey": "id" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 1 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_task(&server, 1, "succeeded").await;
        mount_settings(&server, "btts_100", 2).await;

        let backend = ExternalBackend::new(config(&server).with_api_key("secret")).unwrap();
        backend.create_index(100).await.unwrap();
        // Second call is served from the configured set.
        backend.create_index(100).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_index_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 1 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": 1,
                "status": "failed",
                "error": { "code": "index_already_exists", "message": "exists" }
            })))
            .mount(&server)
            .await;
        mount_settings(&server, "btts_5", 2).await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        backend.create_index(5).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_task_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_5/documents/delete-batch"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 9 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": 9,
                "status": "failed",
                "error": { "code": "invalid_document_id", "message": "bad id" }
            })))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let err = backend.delete_documents(5, &[1]).await.unwrap_err();
        assert!(matches!(err, SearchError::TaskFailed { task_uid: 9, .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_index_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/indexes/btts_42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "index_not_found"
            })))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        backend.delete_index(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_1/search"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [stored(1, 1, "hello", 5)],
                "estimatedTotalHits": 1,
                "processingTimeMs": 2
            })))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let response = backend.search(&SearchRequest::chat(1, "hello")).await.unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.processing_time_ms, 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_1/search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let err = backend.search(&SearchRequest::chat(1, "")).await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_search_sends_filter_and_sort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_100/search"))
            .and(body_partial_json(json!({
                "q": "hello",
                "limit": 10,
                "filter": "user_id = 7 AND type IN [0, 1]",
                "sort": ["timestamp:desc", "id:desc"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [stored(1, 100, "hello world", 1)],
                "estimatedTotalHits": 1,
                "processingTimeMs": 1
            })))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let request = SearchRequest::chat(100, "hello")
            .with_users(vec![7])
            .with_types(vec![MessageType::Text, MessageType::Photo]);
        let response = backend.search(&request).await.unwrap();
        assert_eq!(response.hits[0].document.id, 1);
        assert_eq!(response.hits[0].formatted.message, "hello world");
        assert_eq!(response.estimated_total_hits, 1);
    }

    #[tokio::test]
    async fn test_search_missing_index_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_3/search"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let response = backend.search(&SearchRequest::chat(3, "x")).await.unwrap();
        assert!(response.hits.is_empty());
    }

    #[tokio::test]
    async fn test_multi_chat_fan_out_merges() {
        let server = MockServer::start().await;
        for (chat, ts) in [(10, [3, 1]), (20, [4, 2])] {
            Mock::given(method("POST"))
                .and(path(format!("/indexes/btts_{}/search", chat)))
                .and(body_partial_json(json!({ "offset": 0, "limit": 3 })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "hits": [stored(ts[0], chat, "m", ts[0]), stored(ts[1], chat, "m", ts[1])],
                    "estimatedTotalHits": 2
                })))
                .mount(&server)
                .await;
        }

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let request = SearchRequest::chats(vec![10, 20], "").with_page(1, 2);
        let response = backend.search(&request).await.unwrap();
        let ts: Vec<i64> = response.hits.iter().map(|h| h.document.timestamp).collect();
        assert_eq!(ts, vec![3, 2]);
        assert_eq!(response.estimated_total_hits, 4);
    }

    #[tokio::test]
    async fn test_get_documents_in_request_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts_100/documents/fetch"))
            .and(body_partial_json(json!({ "filter": "id IN [2, 9, 1]" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [stored(1, 100, "a", 1), stored(2, 100, "b", 2)]
            })))
            .mount(&server)
            .await;

        let backend = ExternalBackend::new(config(&server)).unwrap();
        let docs = backend.get_documents(100, &[2, 9, 1]).await.unwrap();
        let ids: Vec<i64> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_single_layout_pairs_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 1 })))
            .mount(&server)
            .await;
        mount_task(&server, 1, "succeeded").await;
        mount_settings(&server, SINGLE_INDEX_UID, 2).await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts/documents"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 3 })))
            .mount(&server)
            .await;
        mount_task(&server, 3, "succeeded").await;

        let backend =
            ExternalBackend::new(config(&server).with_layout(IndexLayout::Single)).unwrap();
        let doc = Document::new(2, 7, MessageType::Text, "hi", 1);
        assert_eq!(backend.add_documents(1, vec![doc]).await.unwrap(), 1);

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.url.path() == "/indexes/btts/documents")
            .unwrap();
        let body: Value = serde_json::from_slice(&upload.body).unwrap();
        assert_eq!(body[0]["id"], pair_ids(1, 2).unwrap());
        assert_eq!(body[0]["message_id"], 2);
        assert_eq!(body[0]["chat_id"], 1);
    }

    #[tokio::test]
    async fn test_single_layout_search_filters_chats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/btts/search"))
            .and(body_partial_json(json!({
                "filter": "chat_id IN [1, 2]",
                "sort": ["timestamp:desc", "message_id:desc"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{
                    "id": pair_ids(2, 5).unwrap(), "message_id": 5, "chat_id": 2,
                    "user_id": 7, "type": 0, "message": "x", "timestamp": 3
                }],
                "estimatedTotalHits": 1
            })))
            .mount(&server)
            .await;

        let backend =
            ExternalBackend::new(config(&server).with_layout(IndexLayout::Single)).unwrap();
        let response = backend
            .search(&SearchRequest::chats(vec![1, 2], ""))
            .await
            .unwrap();
        assert_eq!(response.hits[0].document.id, 5);
        assert_eq!(response.hits[0].document.chat_id, 2);
    }

    #[test]
    fn test_single_layout_rejects_negative_ids() {
        let doc = Document::new(2, 7, MessageType::Text, "hi", 1).in_chat(-100);
        assert!(PairedDocument::from_document(doc).is_err());
    }
}

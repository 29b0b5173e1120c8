//! HTTP search API.
//!
//! Every route except `/health` requires `Authorization: Bearer <key>`.
//! Errors are returned as `{"error": "..."}` with a matching status code.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use btts_search::{SearchRequest, SearchResponse, DEFAULT_LIMIT};
use btts_types::MessageType;

use crate::auth::{Access, Authenticator};
use crate::error::ServiceError;
use crate::search_service::SearchService;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
    pub auth: Arc<Authenticator>,
}

impl AppState {
    pub fn new(service: Arc<SearchService>, auth: Arc<Authenticator>) -> Self {
        Self { service, auth }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Access {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.auth.authenticate(&parts.headers)
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Query string of `GET /index/{chat_id}/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Comma-separated user ids
    #[serde(default)]
    pub users: Option<String>,
    /// Comma-separated type names or codes
    #[serde(default)]
    pub types: Option<String>,
}

/// Body of `POST /index/{chat_id}/search`.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub users: Vec<i64>,
    #[serde(default)]
    pub types: Vec<MessageType>,
}

/// Body of `POST /index/multi-search`. No chat ids means every watched chat.
#[derive(Debug, Deserialize)]
pub struct MultiSearchBody {
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(flatten)]
    pub search: SearchBody,
}

fn parse_csv<T: std::str::FromStr>(field: &str, raw: Option<&str>) -> Result<Vec<T>, ServiceError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| ServiceError::BadRequest(format!("invalid {} value {:?}: {}", field, s, e)))
        })
        .collect()
}

impl SearchParams {
    fn into_body(self) -> Result<SearchBody, ServiceError> {
        Ok(SearchBody {
            users: parse_csv("users", self.users.as_deref())?,
            types: parse_csv("types", self.types.as_deref())?,
            query: self.q,
            offset: self.offset,
            limit: self.limit,
        })
    }
}

impl SearchBody {
    fn into_request(self, chat_ids: Vec<i64>) -> SearchRequest {
        let request = match chat_ids.as_slice() {
            [single] => SearchRequest::chat(*single, self.query),
            _ => SearchRequest::chats(chat_ids, self.query),
        };
        request
            .with_users(self.users)
            .with_types(self.types)
            .with_page(self.offset, self.limit)
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_indexed(
    access: Access,
    State(state): State<AppState>,
) -> Result<Json<Value>, ServiceError> {
    let chats: Vec<_> = state
        .service
        .list_indexed()
        .into_iter()
        .filter(|c| access.allows(c.chat_id))
        .collect();
    if chats.is_empty() {
        return Err(ServiceError::NotFound("No indexed chats".to_string()));
    }
    Ok(Json(json!({ "status": "ok", "chats": chats })))
}

fn chat_path(path: Result<Path<i64>, PathRejection>) -> Result<i64, ServiceError> {
    path.map(|Path(id)| id)
        .map_err(|e| ServiceError::BadRequest(e.body_text()))
}

async fn get_index(
    access: Access,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ServiceError> {
    let chat_id = chat_path(path)?;
    access.restrict(&[chat_id])?;
    let chat = state.service.get_chat(chat_id)?;
    Ok(Json(json!({ "status": "ok", "index": chat })))
}

/// Search responses are wrapped as `{status, results}`.
fn results(response: SearchResponse) -> Json<Value> {
    Json(json!({ "status": "ok", "results": response }))
}

async fn search_chat(
    access: &Access,
    state: &AppState,
    chat_id: i64,
    body: SearchBody,
) -> Result<Json<Value>, ServiceError> {
    access.restrict(&[chat_id])?;
    state.service.get_chat(chat_id)?;
    let response = state.service.search(body.into_request(vec![chat_id])).await?;
    Ok(results(response))
}

async fn search_get(
    access: Access,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Value>, ServiceError> {
    let chat_id = chat_path(path)?;
    let Query(params) = params.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    search_chat(&access, &state, chat_id, params.into_body()?).await
}

async fn search_post(
    access: Access,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let chat_id = chat_path(path)?;
    let Json(body) = body.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    search_chat(&access, &state, chat_id, body).await
}

async fn multi_search(
    access: Access,
    State(state): State<AppState>,
    body: Result<Json<MultiSearchBody>, JsonRejection>,
) -> Result<Json<Value>, ServiceError> {
    let Json(body) = body.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let requested = if body.chat_ids.is_empty() {
        state.service.watched().watched_ids()
    } else {
        body.chat_ids
    };
    if requested.is_empty() {
        return Ok(results(SearchResponse::empty(
            body.search.offset,
            body.search.limit,
        )));
    }
    let chat_ids = access.restrict(&requested)?;
    let request = body.search.into_request(Vec::new());
    let request = SearchRequest {
        chat_id: None,
        chat_ids,
        ..request
    };
    Ok(results(state.service.search(request).await?))
}

/// Build the router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/indexed", get(list_indexed))
        .route("/index/multi-search", post(multi_search))
        .route("/index/:chat_id", get(get_index))
        .route("/index/:chat_id/search", get(search_get).post(search_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn run_server_with_shutdown<F>(
    addr: SocketAddr,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server shutdown complete");
    Ok(())
}

//! Bearer-key access control.

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use btts_storage::Storage;
use btts_types::ApiKey;

use crate::error::ServiceError;

/// What an authenticated caller may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Settings master key or a stored master key
    Unrestricted,
    /// Stored key limited to its chats
    Scoped(ApiKey),
}

impl Access {
    pub fn allows(&self, chat_id: i64) -> bool {
        match self {
            Access::Unrestricted => true,
            Access::Scoped(key) => key.allows(chat_id),
        }
    }

    /// Requested chats this caller may read. An empty result is forbidden.
    pub fn restrict(&self, requested: &[i64]) -> Result<Vec<i64>, ServiceError> {
        let allowed = match self {
            Access::Unrestricted => requested.to_vec(),
            Access::Scoped(key) => key.intersect(requested),
        };
        if allowed.is_empty() {
            return Err(ServiceError::Forbidden(
                "key may not read any of the requested chats".to_string(),
            ));
        }
        Ok(allowed)
    }
}

/// Resolves bearer keys against the settings master key and the key store.
pub struct Authenticator {
    storage: Arc<Storage>,
    master_key: Option<SecretString>,
}

impl Authenticator {
    pub fn new(storage: Arc<Storage>, master_key: Option<String>) -> Self {
        Self {
            storage,
            master_key: master_key
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        }
    }

    fn is_master(&self, token: &str) -> bool {
        self.master_key
            .as_ref()
            .is_some_and(|key| constant_time_eq(key.expose_secret(), token))
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Access, ServiceError> {
        let token = bearer_token(headers).ok_or(ServiceError::Unauthorized)?;
        if self.is_master(token) {
            return Ok(Access::Unrestricted);
        }
        match self.storage.get_api_key(token)? {
            Some(key) if key.master => Ok(Access::Unrestricted),
            Some(key) => {
                debug!(name = %key.name, chats = key.chats.len(), "Scoped key");
                Ok(Access::Scoped(key))
            }
            None => Err(ServiceError::Unauthorized),
        }
    }
}

/// Compares every byte of the common prefix regardless of where they differ.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let diff = a
        .bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0 && a.len() == b.len()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

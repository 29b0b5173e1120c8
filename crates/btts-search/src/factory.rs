//! Backend selection from settings.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use btts_types::{EngineKind, Settings};

use crate::backend::IndexBackend;
use crate::embedded::{EmbeddedBackend, EmbeddedConfig};
use crate::error::SearchError;
use crate::external::{ExternalBackend, ExternalConfig};

/// Build the single active backend named by `engine.kind`.
pub fn backend_from_settings(settings: &Settings) -> Result<Arc<dyn IndexBackend>, SearchError> {
    let engine = &settings.engine;
    let backend: Arc<dyn IndexBackend> = match engine.kind {
        EngineKind::Embedded => {
            let config = EmbeddedConfig::new(settings.expanded_index_root())
                .with_memory_mb(engine.writer_memory_mb);
            Arc::new(EmbeddedBackend::new(config)?)
        }
        EngineKind::External => {
            let url = engine.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                SearchError::InvalidRequest("engine.url is required for the external engine".into())
            })?;
            let mut config = ExternalConfig::new(url).with_layout(engine.index_layout);
            if let Some(key) = engine.api_key.as_deref().filter(|k| !k.is_empty()) {
                config = config.with_api_key(key);
            }
            config.timeout = Duration::from_secs(engine.timeout_secs);
            config.max_retries = engine.max_retries;
            Arc::new(ExternalBackend::new(config)?)
        }
    };
    info!(backend = backend.name(), "Selected index backend");
    Ok(backend)
}

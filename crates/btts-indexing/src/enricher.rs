//! Pluggable content enrichment (OCR, transcription).

use async_trait::async_trait;

use btts_types::Message;

/// Supplies extra searchable text for a message.
///
/// Returned text is appended to the extracted text. Chats flagged `no_ocr`
/// are never enriched.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, message: &Message) -> Option<String>;
}

/// Enricher that adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, _message: &Message) -> Option<String> {
        None
    }
}

//! Message to document conversion.

use tracing::debug;

use btts_types::{extract_text, Document, Media, Message, Peer};

/// Converts platform messages into documents.
///
/// Never fails: unsupported media yields no text and therefore no document.
/// The returned document's `chat_id` is left unset; the backend stamps it.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    self_id: i64,
}

impl Extractor {
    pub fn new(self_id: i64) -> Self {
        Self { self_id }
    }

    pub fn self_id(&self) -> i64 {
        self.self_id
    }

    /// Author of a message, or 0 when it cannot be attributed.
    ///
    /// - user peer: self when outbound, else the peer user
    /// - channel peer: the channel for posts, self when outbound, else `from_id`
    /// - basic group: self when outbound, else `from_id`
    ///
    /// A group message without `from_id` is an anonymous admin speaking as
    /// the chat, so the chat itself is the author.
    pub fn author_of(&self, message: &Message) -> i64 {
        match message.peer {
            Peer::User(user_id) => {
                if message.out {
                    self.self_id
                } else {
                    user_id
                }
            }
            Peer::Channel(channel_id) if message.post => channel_id,
            Peer::Channel(chat_id) | Peer::Chat(chat_id) => {
                if message.out {
                    self.self_id
                } else {
                    message.from_id.map_or(chat_id, |from| from.id())
                }
            }
        }
    }

    /// Build the document for a message.
    pub fn extract(&self, message: &Message) -> Option<Document> {
        self.extract_with(message, "")
    }

    /// Build the document, appending enrichment text to the extracted text.
    ///
    /// Stickers stay dropped even when enrichment produced text for them.
    pub fn extract_with(&self, message: &Message, extra: &str) -> Option<Document> {
        if message.media.as_ref().is_some_and(Media::is_sticker) {
            debug!(chat_id = message.chat_id(), id = message.id, "Dropping sticker");
            return None;
        }
        let user_id = self.author_of(message);
        if user_id == 0 {
            debug!(chat_id = message.chat_id(), id = message.id, "Dropping unattributed message");
            return None;
        }

        let (mut text, kind) = extract_text(message.media.as_ref(), &message.message);
        let extra = extra.trim();
        if !extra.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(extra);
        }
        if text.is_empty() {
            return None;
        }

        Some(Document::new(message.id, user_id, kind, text, message.date))
    }

    /// Documents for a batch, dropping messages without text.
    pub fn extract_all<'a>(&self, messages: impl IntoIterator<Item = &'a Message>) -> Vec<Document> {
        messages.into_iter().filter_map(|m| self.extract(m)).collect()
    }
}

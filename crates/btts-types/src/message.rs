//! Platform message model.
//!
//! A transport-neutral rendition of the messages, peers and entities the
//! platform client hands to the indexing pipeline. Media is a tagged enum so
//! the extractor can match it exhaustively.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::STICKER_FILE_NAMES;

/// Conversation partner a message belongs to (or was sent by).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Peer {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl Peer {
    /// Raw identifier of the peer.
    pub fn id(&self) -> i64 {
        match self {
            Peer::User(id) | Peer::Chat(id) | Peer::Channel(id) => *id,
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, Peer::Channel(_))
    }
}

/// Attribute attached to a document media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentAttribute {
    Filename { name: String },
    Audio { title: Option<String>, voice: bool },
    Video,
    Sticker,
    HasStickers,
}

/// Media payload of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Media {
    Photo,
    Document { attributes: Vec<DocumentAttribute> },
    Poll { question: String, answers: Vec<String> },
    /// `available` is false for deleted or skipped story variants.
    Story { available: bool, caption: Option<String> },
    Other,
}

impl DocumentAttribute {
    /// Marks the document as a sticker, by flag or by well-known file name.
    pub fn marks_sticker(&self) -> bool {
        match self {
            DocumentAttribute::Sticker | DocumentAttribute::HasStickers => true,
            DocumentAttribute::Filename { name } => STICKER_FILE_NAMES.contains(&name.as_str()),
            DocumentAttribute::Audio { .. } | DocumentAttribute::Video => false,
        }
    }
}

impl Media {
    /// Stickers are never indexed, whatever text is attached to them.
    pub fn is_sticker(&self) -> bool {
        match self {
            Media::Document { attributes } => attributes.iter().any(DocumentAttribute::marks_sticker),
            _ => false,
        }
    }
}

/// A message as delivered by history fetches, differences or live updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub peer: Peer,
    #[serde(default)]
    pub from_id: Option<Peer>,
    #[serde(default)]
    pub out: bool,
    /// Channel post (authored by the channel itself)
    #[serde(default)]
    pub post: bool,
    /// Unix seconds
    pub date: i64,
    /// Text body or media caption
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub media: Option<Media>,
}

impl Message {
    /// Plain text message.
    pub fn text(id: i64, peer: Peer, date: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            peer,
            from_id: None,
            out: false,
            post: false,
            date,
            message: text.into(),
            media: None,
        }
    }

    pub fn with_from(mut self, from: Peer) -> Self {
        self.from_id = Some(from);
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = Some(media);
        self
    }

    pub fn outgoing(mut self) -> Self {
        self.out = true;
        self
    }

    pub fn as_post(mut self) -> Self {
        self.post = true;
        self
    }

    /// Chat the message belongs to.
    pub fn chat_id(&self) -> i64 {
        self.peer.id()
    }
}

/// User entity attached to updates and history pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Kind of a group/channel entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEntityKind {
    /// Basic group
    Group,
    /// Broadcast channel
    Channel,
    /// Supergroup backed by a channel
    Megagroup,
}

/// Group or channel entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntity {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    pub kind: ChatEntityKind,
}

/// Entities referenced by a batch of messages or updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub users: HashMap<i64, UserEntity>,
    #[serde(default)]
    pub chats: HashMap<i64, ChatEntity>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserEntity) -> Self {
        self.users.insert(user.id, user);
        self
    }

    pub fn with_chat(mut self, chat: ChatEntity) -> Self {
        self.chats.insert(chat.id, chat);
        self
    }

    pub fn user(&self, id: i64) -> Option<&UserEntity> {
        self.users.get(&id)
    }

    pub fn chat(&self, id: i64) -> Option<&ChatEntity> {
        self.chats.get(&id)
    }

    /// Merge another entity set into this one, newer values winning.
    pub fn extend(&mut self, other: Entities) {
        self.users.extend(other.users);
        self.chats.extend(other.chats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id() {
        assert_eq!(Peer::User(7).id(), 7);
        assert_eq!(Peer::Channel(500).id(), 500);
        assert!(Peer::Channel(1).is_channel());
        assert!(!Peer::Chat(1).is_channel());
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::text(1, Peer::Channel(500), 10, "hi")
            .with_from(Peer::User(7))
            .outgoing();
        assert_eq!(msg.chat_id(), 500);
        assert_eq!(msg.from_id, Some(Peer::User(7)));
        assert!(msg.out);
        assert!(!msg.post);
    }

    #[test]
    fn test_media_json_shape() {
        let media = Media::Poll {
            question: "lunch?".to_string(),
            answers: vec!["yes".to_string()],
        };
        let json = serde_json::to_string(&media).unwrap();
        assert!(json.contains("\"kind\":\"poll\""));
        let decoded: Media = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, media);
    }

    #[test]
    fn test_entities_extend() {
        let mut a = Entities::new().with_user(UserEntity {
            id: 1,
            first_name: "Old".into(),
            ..Default::default()
        });
        let b = Entities::new().with_user(UserEntity {
            id: 1,
            first_name: "New".into(),
            ..Default::default()
        });
        a.extend(b);
        assert_eq!(a.user(1).unwrap().first_name, "New");
    }
}

//! Metadata records kept beside the index: chats, users, API keys, sub-bots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::message::{ChatEntity, ChatEntityKind, UserEntity};

/// Kind of an indexed chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    #[default]
    Private,
    Group,
    Channel,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
        }
    }
}

impl From<ChatEntityKind> for ChatType {
    fn from(kind: ChatEntityKind) -> Self {
        match kind {
            ChatEntityKind::Group | ChatEntityKind::Megagroup => ChatType::Group,
            ChatEntityKind::Channel => ChatType::Channel,
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(ChatType::Private),
            "group" => Ok(ChatType::Group),
            "channel" => Ok(ChatType::Channel),
            other => Err(format!("unknown chat type: {}", other)),
        }
    }
}

/// A chat whose messages are indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChat {
    pub chat_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type", default)]
    pub chat_type: ChatType,
    /// Gates live ingestion
    #[serde(default)]
    pub watching: bool,
    /// Suppresses tombstone application
    #[serde(default)]
    pub no_delete: bool,
    /// Skips the enrichment hook
    #[serde(default)]
    pub no_ocr: bool,
    #[serde(default)]
    pub public: bool,
    /// Channel-local update sequence
    #[serde(default)]
    pub pts: i64,
}

impl IndexChat {
    /// New chat record, watching by default.
    pub fn new(chat_id: i64, title: impl Into<String>, chat_type: ChatType) -> Self {
        Self {
            chat_id,
            title: title.into(),
            username: None,
            chat_type,
            watching: true,
            no_delete: false,
            no_ocr: false,
            public: false,
            pts: 0,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Refresh title, username and type from a group/channel entity.
    ///
    /// Returns true if anything changed.
    pub fn refresh_from_chat(&mut self, entity: &ChatEntity) -> bool {
        let chat_type = ChatType::from(entity.kind);
        let changed = self.title != entity.title
            || self.username != entity.username
            || self.chat_type != chat_type;
        self.title = entity.title.clone();
        self.username = entity.username.clone();
        self.chat_type = chat_type;
        changed
    }

    /// Refresh from the user entity of a private chat.
    pub fn refresh_from_user(&mut self, entity: &UserEntity) -> bool {
        let title = display_name(&entity.first_name, &entity.last_name);
        let changed = self.title != title
            || self.username != entity.username
            || self.chat_type != ChatType::Private;
        self.title = title;
        self.username = entity.username.clone();
        self.chat_type = ChatType::Private;
        changed
    }
}

/// Cached profile of a message author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: i64,
    /// Chat the author was last seen in
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserInfo {
    pub fn from_user(entity: &UserEntity, chat_id: i64) -> Self {
        Self {
            user_id: entity.id,
            chat_id: Some(chat_id),
            username: entity.username.clone(),
            first_name: entity.first_name.clone(),
            last_name: entity.last_name.clone(),
        }
    }

    /// Author record for a channel or group speaking as itself.
    pub fn from_chat(entity: &ChatEntity, chat_id: i64) -> Self {
        Self {
            user_id: entity.id,
            chat_id: Some(chat_id),
            username: entity.username.clone(),
            first_name: entity.title.clone(),
            last_name: String::new(),
        }
    }

    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name)
    }
}

fn display_name(first: &str, last: &str) -> String {
    match (first.is_empty(), last.is_empty()) {
        (false, false) => format!("{} {}", first, last),
        (false, true) => first.to_string(),
        (true, false) => last.to_string(),
        (true, true) => String::new(),
    }
}

/// Bearer key for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    /// Master keys ignore `chats`
    #[serde(default)]
    pub master: bool,
    /// Chats a scoped key may query
    #[serde(default)]
    pub chats: Vec<i64>,
}

impl ApiKey {
    pub fn master(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            master: true,
            chats: Vec::new(),
        }
    }

    pub fn scoped(key: impl Into<String>, name: impl Into<String>, chats: Vec<i64>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            master: false,
            chats,
        }
    }

    pub fn allows(&self, chat_id: i64) -> bool {
        self.master || self.chats.contains(&chat_id)
    }

    /// Restrict requested chats to those this key may read.
    pub fn intersect(&self, requested: &[i64]) -> Vec<i64> {
        requested
            .iter()
            .copied()
            .filter(|id| self.allows(*id))
            .collect()
    }
}

/// Auxiliary bot allowed to query a subset of chats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBot {
    pub bot_id: i64,
    pub token: String,
    #[serde(default)]
    pub chats: Vec<i64>,
}

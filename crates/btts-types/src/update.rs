//! Updates and gap-recovery payloads delivered by the platform client.

use serde::{Deserialize, Serialize};

use crate::message::{Entities, Message, Peer};
use crate::state::UpdatesState;

/// A single live update.
///
/// `pts` is account-wide for private/group updates and channel-local for
/// channel-scoped ones (see [`Update::channel_id`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Update {
    NewMessage {
        message: Message,
        #[serde(default)]
        pts: Option<i64>,
    },
    EditMessage {
        message: Message,
        #[serde(default)]
        pts: Option<i64>,
    },
    /// Deletes in private chats and basic groups (ids are account-wide)
    DeleteMessages {
        ids: Vec<i64>,
        #[serde(default)]
        pts: Option<i64>,
    },
    DeleteChannelMessages {
        channel_id: i64,
        ids: Vec<i64>,
        #[serde(default)]
        pts: Option<i64>,
    },
    /// The channel's update gap is too large; a channel difference is needed
    ChannelTooLong {
        channel_id: i64,
        #[serde(default)]
        pts: Option<i64>,
    },
    Other {
        #[serde(default)]
        pts: Option<i64>,
    },
}

impl Update {
    pub fn pts(&self) -> Option<i64> {
        match self {
            Update::NewMessage { pts, .. }
            | Update::EditMessage { pts, .. }
            | Update::DeleteMessages { pts, .. }
            | Update::DeleteChannelMessages { pts, .. }
            | Update::ChannelTooLong { pts, .. }
            | Update::Other { pts } => *pts,
        }
    }

    /// Channel whose local pts sequence this update belongs to.
    pub fn channel_id(&self) -> Option<i64> {
        match self {
            Update::NewMessage { message, .. } | Update::EditMessage { message, .. } => {
                match message.peer {
                    Peer::Channel(id) => Some(id),
                    _ => None,
                }
            }
            Update::DeleteChannelMessages { channel_id, .. }
            | Update::ChannelTooLong { channel_id, .. } => Some(*channel_id),
            Update::DeleteMessages { .. } | Update::Other { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Update::NewMessage { message, .. } | Update::EditMessage { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Result of `getDifference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Difference {
    Empty {
        date: i64,
        seq: i64,
    },
    Difference {
        new_messages: Vec<Message>,
        other_updates: Vec<Update>,
        #[serde(default)]
        entities: Entities,
        new_state: UpdatesState,
    },
    Slice {
        new_messages: Vec<Message>,
        other_updates: Vec<Update>,
        #[serde(default)]
        entities: Entities,
        intermediate_state: UpdatesState,
    },
    TooLong {
        pts: i64,
    },
}

/// Result of `getChannelDifference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelDifference {
    Empty {
        pts: i64,
    },
    Difference {
        pts: i64,
        new_messages: Vec<Message>,
        other_updates: Vec<Update>,
        #[serde(default)]
        entities: Entities,
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// Gap too large; `messages` holds the latest slice of history
    TooLong {
        pts: i64,
        #[serde(default)]
        messages: Vec<Message>,
        #[serde(default)]
        entities: Entities,
    },
}

/// Inclusive message-id interval for takeout-style iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRange {
    pub min_id: i64,
    pub max_id: i64,
}

impl MessageRange {
    pub fn new(min_id: i64, max_id: i64) -> Self {
        Self { min_id, max_id }
    }

    pub fn contains(&self, id: i64) -> bool {
        (self.min_id..=self.max_id).contains(&id)
    }
}

/// One page of chat history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub entities: Entities,
    /// Total messages in the chat as reported by the platform
    #[serde(default)]
    pub count: i64,
}

/// A conversation listed in the account's dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub peer: Peer,
    /// Newest message id in the dialog
    #[serde(default)]
    pub top_message: i64,
}

/// One page of dialogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogsPage {
    pub dialogs: Vec<Dialog>,
    #[serde(default)]
    pub entities: Entities,
}

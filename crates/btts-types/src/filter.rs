//! Filter grammar shared by both index backends.
//!
//! ```text
//! expr  := [chat] ["AND" user] ["AND" type]
//! chat  := "chat_id = N" | "chat_id IN [N, N, ...]"
//! ```
//!
//! The external backend receives the rendered expression verbatim; the
//! embedded backend translates the structured [`SearchFilter`] into range
//! queries instead of parsing the string back.

use serde::{Deserialize, Serialize};

use crate::document::MessageType;

/// Structured filter over the filterable document attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(default)]
    pub user_ids: Vec<i64>,
    #[serde(default)]
    pub types: Vec<MessageType>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(mut self, chat_ids: impl Into<Vec<i64>>) -> Self {
        self.chat_ids = chat_ids.into();
        self
    }

    pub fn with_users(mut self, user_ids: impl Into<Vec<i64>>) -> Self {
        self.user_ids = user_ids.into();
        self
    }

    pub fn with_types(mut self, types: impl Into<Vec<MessageType>>) -> Self {
        self.types = types.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.chat_ids.is_empty() && self.user_ids.is_empty() && self.types.is_empty()
    }

    /// Render as a filter expression.
    pub fn expression(&self) -> String {
        let types: Vec<i64> = self.types.iter().map(|t| t.code()).collect();
        filter_expression(&self.chat_ids, &self.user_ids, &types)
    }
}

/// Compose the filter clause for chat, user and type selections.
///
/// Singletons render with `=`, longer lists with `IN [..]`; empty inputs
/// contribute nothing and an all-empty filter yields an empty string.
pub fn filter_expression(chat_ids: &[i64], user_ids: &[i64], types: &[i64]) -> String {
    [
        clause("chat_id", chat_ids),
        clause("user_id", user_ids),
        clause("type", types),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" AND ")
}

fn clause(field: &str, values: &[i64]) -> Option<String> {
    match values {
        [] => None,
        [single] => Some(format!("{} = {}", field, single)),
        many => {
            let list: Vec<String> = many.iter().map(|v| v.to_string()).collect();
            Some(format!("{} IN [{}]", field, list.join(", ")))
        }
    }
}

//! The search document: the only record the index stores.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::{DocumentAttribute, Media};

/// File names the platform uses for sticker documents.
pub const STICKER_FILE_NAMES: &[&str] = &[
    "sticker.webp",
    "sticker.webm",
    "sticker.tgs",
    "AnimatedSticker.tgs",
];

/// Dominant media kind of an indexed message.
///
/// Serialized as its integer code so both backends can filter numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum MessageType {
    #[default]
    Text,
    Photo,
    Video,
    Document,
    Voice,
    Audio,
    Poll,
    Story,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Text,
        MessageType::Photo,
        MessageType::Video,
        MessageType::Document,
        MessageType::Voice,
        MessageType::Audio,
        MessageType::Poll,
        MessageType::Story,
    ];

    pub fn code(self) -> i64 {
        match self {
            MessageType::Text => 0,
            MessageType::Photo => 1,
            MessageType::Video => 2,
            MessageType::Document => 3,
            MessageType::Voice => 4,
            MessageType::Audio => 5,
            MessageType::Poll => 6,
            MessageType::Story => 7,
        }
    }

    /// Parse from an integer code, returning None for unknown codes.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Photo => "photo",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Voice => "voice",
            MessageType::Audio => "audio",
            MessageType::Poll => "poll",
            MessageType::Story => "story",
        }
    }
}

impl From<MessageType> for i64 {
    fn from(t: MessageType) -> Self {
        t.code()
    }
}

impl TryFrom<i64> for MessageType {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown message type code: {}", code))
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    /// Accepts either the numeric code or the lowercase name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Self::try_from(code);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {}", s))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indexed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Message id, primary key within a chat index
    pub id: i64,
    /// Owning chat; assigned by the ingestor or backend, never the extractor
    #[serde(default)]
    pub chat_id: i64,
    /// Author attribution
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Full text; the only searchable attribute
    pub message: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl Document {
    pub fn new(
        id: i64,
        user_id: i64,
        kind: MessageType,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            chat_id: 0,
            user_id,
            kind,
            message: message.into(),
            timestamp,
        }
    }

    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Whether the document satisfies the storage invariants.
    pub fn is_indexable(&self) -> bool {
        self.user_id != 0 && !self.message.is_empty()
    }
}

/// Extract searchable text and the dominant type from a message's media and caption.
///
/// Pure function. Sticker documents yield empty text so the caller drops them.
/// The media text and caption are joined with a single space when both exist.
pub fn extract_text(media: Option<&Media>, caption: &str) -> (String, MessageType) {
    let (media_text, kind) = match media {
        None => (String::new(), MessageType::Text),
        Some(Media::Photo) => (String::new(), MessageType::Photo),
        Some(media @ Media::Document { .. }) if media.is_sticker() => {
            return (String::new(), MessageType::Document)
        }
        Some(Media::Document { attributes }) => document_text(attributes),
        Some(Media::Poll { question, answers }) => {
            let mut text = question.clone();
            for answer in answers {
                text.push(' ');
                text.push_str(answer);
            }
            (text, MessageType::Poll)
        }
        Some(Media::Story {
            available: true,
            caption: story_caption,
        }) => (story_caption.clone().unwrap_or_default(), MessageType::Story),
        Some(Media::Story {
            available: false, ..
        })
        | Some(Media::Other) => (String::new(), MessageType::Text),
    };

    (join_text(media_text, caption), kind)
}

/// Text and type for a non-sticker document media.
fn document_text(attributes: &[DocumentAttribute]) -> (String, MessageType) {
    let mut parts: Vec<&str> = Vec::new();
    let mut audio: Option<MessageType> = None;
    let mut video = false;

    for attribute in attributes {
        match attribute {
            DocumentAttribute::Sticker | DocumentAttribute::HasStickers => {}
            DocumentAttribute::Filename { name } => parts.push(name),
            DocumentAttribute::Audio { title, voice } => {
                if let Some(title) = title.as_deref().filter(|t| !t.is_empty()) {
                    parts.push(title);
                }
                audio = Some(if *voice {
                    MessageType::Voice
                } else {
                    MessageType::Audio
                });
            }
            DocumentAttribute::Video => video = true,
        }
    }

    let kind = match (audio, video) {
        (Some(kind), _) => kind,
        (None, true) => MessageType::Video,
        (None, false) => MessageType::Document,
    };

    (parts.join(" "), kind)
}

fn join_text(media_text: String, caption: &str) -> String {
    match (media_text.is_empty(), caption.is_empty()) {
        (true, _) => caption.to_string(),
        (false, true) => media_text,
        (false, false) => format!("{} {}", media_text, caption),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_media(attributes: Vec<DocumentAttribute>) -> Media {
        Media::Document { attributes }
    }

    #[test]
    fn test_message_type_codes() {
        assert_eq!(MessageType::Text.code(), 0);
        assert_eq!(MessageType::Story.code(), 7);
        assert_eq!(MessageType::from_code(5), Some(MessageType::Audio));
        assert_eq!(MessageType::from_code(8), None);
        assert_eq!("poll".parse::<MessageType>().unwrap(), MessageType::Poll);
        assert_eq!("3".parse::<MessageType>().unwrap(), MessageType::Document);
        assert!("gif".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_document_json_uses_numeric_type() {
        let doc = Document::new(1, 7, MessageType::Photo, "cat", 100).in_chat(10);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["chat_id"], 10);
        let decoded: Document = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            extract_text(None, "hello"),
            ("hello".to_string(), MessageType::Text)
        );
    }

    #[test]
    fn test_photo_with_caption() {
        let (text, kind) = extract_text(Some(&Media::Photo), "sunset");
        assert_eq!(text, "sunset");
        assert_eq!(kind, MessageType::Photo);

        let (text, _) = extract_text(Some(&Media::Photo), "");
        assert!(text.is_empty());
    }

    #[test]
    fn test_sticker_dropped() {
        let media = doc_media(vec![DocumentAttribute::HasStickers]);
        assert!(extract_text(Some(&media), "").0.is_empty());

        let media = doc_media(vec![DocumentAttribute::Filename {
            name: "AnimatedSticker.tgs".into(),
        }]);
        assert!(extract_text(Some(&media), "caption ignored").0.is_empty());
    }

    #[test]
    fn test_document_types() {
        let media = doc_media(vec![DocumentAttribute::Filename {
            name: "report.pdf".into(),
        }]);
        assert_eq!(
            extract_text(Some(&media), "q3"),
            ("report.pdf q3".to_string(), MessageType::Document)
        );

        let media = doc_media(vec![
            DocumentAttribute::Filename {
                name: "song.mp3".into(),
            },
            DocumentAttribute::Audio {
                title: Some("Blue".into()),
                voice: false,
            },
        ]);
        assert_eq!(
            extract_text(Some(&media), ""),
            ("song.mp3 Blue".to_string(), MessageType::Audio)
        );

        let media = doc_media(vec![
            DocumentAttribute::Filename {
                name: "clip.mp4".into(),
            },
            DocumentAttribute::Video,
        ]);
        assert_eq!(extract_text(Some(&media), "").1, MessageType::Video);

        let media = doc_media(vec![DocumentAttribute::Audio {
            title: None,
            voice: true,
        }]);
        assert_eq!(
            extract_text(Some(&media), "memo"),
            ("memo".to_string(), MessageType::Voice)
        );
    }

    #[test]
    fn test_audio_beats_video() {
        let media = doc_media(vec![
            DocumentAttribute::Video,
            DocumentAttribute::Audio {
                title: Some("track".into()),
                voice: false,
            },
        ]);
        assert_eq!(extract_text(Some(&media), "").1, MessageType::Audio);
    }

    #[test]
    fn test_poll() {
        let media = Media::Poll {
            question: "Lunch?".into(),
            answers: vec!["pizza".into(), "sushi".into()],
        };
        assert_eq!(
            extract_text(Some(&media), ""),
            ("Lunch? pizza sushi".to_string(), MessageType::Poll)
        );
    }

    #[test]
    fn test_story_variants() {
        let media = Media::Story {
            available: true,
            caption: Some("at the beach".into()),
        };
        assert_eq!(
            extract_text(Some(&media), ""),
            ("at the beach".to_string(), MessageType::Story)
        );

        let media = Media::Story {
            available: false,
            caption: None,
        };
        assert_eq!(
            extract_text(Some(&media), ""),
            (String::new(), MessageType::Text)
        );
    }

    #[test]
    fn test_other_media_keeps_caption() {
        assert_eq!(
            extract_text(Some(&Media::Other), "geo"),
            ("geo".to_string(), MessageType::Text)
        );
    }

    #[test]
    fn test_is_indexable() {
        assert!(Document::new(1, 7, MessageType::Text, "x", 0).is_indexable());
        assert!(!Document::new(1, 0, MessageType::Text, "x", 0).is_indexable());
        assert!(!Document::new(1, 7, MessageType::Text, "", 0).is_indexable());
    }
}

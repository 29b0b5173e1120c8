//! Tantivy schema for message documents.
//!
//! The schema is explicit: only `message` is tokenized, every numeric
//! attribute is an i64 fast field, and `_id` carries the stringified
//! message id as the primary key used for upserts and deletes.

use tantivy::schema::{Field, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::TantivyDocument;

use btts_types::{Document, MessageType};

use crate::SearchError;

/// Field names
pub const FIELD_PRIMARY_KEY: &str = "_id";
pub const FIELD_ID: &str = "id";
pub const FIELD_CHAT_ID: &str = "chat_id";
pub const FIELD_USER_ID: &str = "user_id";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    schema: Schema,
    /// Stringified message id (STRING | STORED)
    pub primary_key: Field,
    pub id: Field,
    pub chat_id: Field,
    pub user_id: Field,
    /// Message type code
    pub kind: Field,
    /// Searchable text (TEXT | STORED)
    pub message: Field,
    pub timestamp: Field,
}

impl DocumentSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a DocumentSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
        };

        Ok(Self {
            primary_key: field(FIELD_PRIMARY_KEY)?,
            id: field(FIELD_ID)?,
            chat_id: field(FIELD_CHAT_ID)?,
            user_id: field(FIELD_USER_ID)?,
            kind: field(FIELD_TYPE)?,
            message: field(FIELD_MESSAGE)?,
            timestamp: field(FIELD_TIMESTAMP)?,
            schema,
        })
    }

    /// Convert a document into its Tantivy form.
    pub fn to_tantivy(&self, doc: &Document) -> TantivyDocument {
        let mut out = TantivyDocument::default();
        out.add_text(self.primary_key, doc.id.to_string());
        out.add_i64(self.id, doc.id);
        out.add_i64(self.chat_id, doc.chat_id);
        out.add_i64(self.user_id, doc.user_id);
        out.add_i64(self.kind, doc.kind.code());
        out.add_text(self.message, &doc.message);
        out.add_i64(self.timestamp, doc.timestamp);
        out
    }

    /// Read a stored document back.
    pub fn from_tantivy(&self, doc: &TantivyDocument) -> Result<Document, SearchError> {
        let int = |field: Field, name: &str| {
            doc.get_first(field)
                .and_then(|v| v.as_i64())
                .ok_or_else(|| SearchError::SchemaMismatch(format!("stored {} missing", name)))
        };
        let code = int(self.kind, FIELD_TYPE)?;
        let kind = MessageType::from_code(code)
            .ok_or_else(|| SearchError::SchemaMismatch(format!("unknown type code {}", code)))?;

        Ok(Document {
            id: int(self.id, FIELD_ID)?,
            chat_id: int(self.chat_id, FIELD_CHAT_ID)?,
            user_id: int(self.user_id, FIELD_USER_ID)?,
            kind,
            message: doc
                .get_first(self.message)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            timestamp: int(self.timestamp, FIELD_TIMESTAMP)?,
        })
    }
}

/// Build the message document schema.
pub fn build_document_schema() -> DocumentSchema {
    let mut schema_builder = Schema::builder();

    let primary_key = schema_builder.add_text_field(FIELD_PRIMARY_KEY, STRING | STORED);
    let id = schema_builder.add_i64_field(FIELD_ID, INDEXED | STORED | FAST);
    let chat_id = schema_builder.add_i64_field(FIELD_CHAT_ID, INDEXED | STORED | FAST);
    let user_id = schema_builder.add_i64_field(FIELD_USER_ID, INDEXED | STORED | FAST);
    let kind = schema_builder.add_i64_field(FIELD_TYPE, INDEXED | STORED | FAST);
    let message = schema_builder.add_text_field(FIELD_MESSAGE, TEXT | STORED);
    let timestamp = schema_builder.add_i64_field(FIELD_TIMESTAMP, INDEXED | STORED | FAST);

    DocumentSchema {
        schema: schema_builder.build(),
        primary_key,
        id,
        chat_id,
        user_id,
        kind,
        message,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema() {
        let schema = build_document_schema();
        for name in [
            FIELD_PRIMARY_KEY,
            FIELD_ID,
            FIELD_CHAT_ID,
            FIELD_USER_ID,
            FIELD_TYPE,
            FIELD_MESSAGE,
            FIELD_TIMESTAMP,
        ] {
            assert!(schema.schema().get_field(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_from_schema() {
        let original = build_document_schema();
        let rebuilt = DocumentSchema::from_schema(original.schema().clone()).unwrap();
        assert_eq!(rebuilt.message, original.message);
        assert_eq!(rebuilt.timestamp, original.timestamp);
    }

    #[test]
    fn test_document_conversion() {
        let schema = build_document_schema();
        let doc = Document::new(42, 7, MessageType::Poll, "Lunch? pizza", 1000).in_chat(500);
        let converted = schema.from_tantivy(&schema.to_tantivy(&doc)).unwrap();
        assert_eq!(converted, doc);
    }
}

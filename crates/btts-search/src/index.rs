//! Tantivy index for a single chat.
//!
//! Each chat owns an on-disk index under `<root>/<chat_id>/`. The writer is
//! kept for the lifetime of the handle behind a mutex; the reader uses a
//! manual reload policy and is reloaded after every commit so writes are
//! visible to the next search.

use std::ops::Bound::Included;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{DocId, Index, IndexReader, IndexWriter, ReloadPolicy, SegmentReader, Term};
use tracing::{debug, info, warn};

use btts_types::Document;

use crate::error::SearchError;
use crate::schema::{build_document_schema, DocumentSchema, FIELD_ID, FIELD_TIMESTAMP};
use crate::types::{MAX_LIMIT, MAX_OFFSET};

/// Default memory budget for IndexWriter (50MB)
pub const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Parameters of a single-chat search.
#[derive(Debug, Clone, Default)]
pub struct ChatQuery {
    pub query: String,
    pub user_ids: Vec<i64>,
    pub type_codes: Vec<i64>,
    pub offset: usize,
    pub limit: usize,
}

/// Open index handle for one chat.
pub struct ChatIndex {
    chat_id: i64,
    path: PathBuf,
    index: Index,
    schema: DocumentSchema,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    query_parser: QueryParser,
}

impl ChatIndex {
    /// Open the chat's index or create it.
    pub fn open_or_create(root: &Path, chat_id: i64, writer_memory_mb: usize) -> Result<Self, SearchError> {
        let path = index_path(root, chat_id);
        let index = if path.join("meta.json").exists() {
            debug!(chat_id, path = ?path, "Opening existing index");
            Index::open_in_dir(&path)?
        } else {
            info!(chat_id, path = ?path, "Creating new index");
            std::fs::create_dir_all(&path)?;
            Index::create_in_dir(&path, build_document_schema().schema().clone())?
        };
        Self::from_index(chat_id, path, index, writer_memory_mb)
    }

    /// Open an existing index; None if the chat was never indexed.
    pub fn open_existing(root: &Path, chat_id: i64, writer_memory_mb: usize) -> Result<Option<Self>, SearchError> {
        let path = index_path(root, chat_id);
        if !path.join("meta.json").exists() {
            return Ok(None);
        }
        let index = Index::open_in_dir(&path)?;
        Self::from_index(chat_id, path, index, writer_memory_mb).map(Some)
    }

    fn from_index(chat_id: i64, path: PathBuf, index: Index, writer_memory_mb: usize) -> Result<Self, SearchError> {
        let schema = DocumentSchema::from_schema(index.schema())?;
        let writer = index.writer_with_num_threads(1, writer_memory_mb * 1024 * 1024)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        let mut query_parser = QueryParser::for_index(&index, vec![schema.message]);
        query_parser.set_conjunction_by_default();

        Ok(Self {
            chat_id,
            path,
            index,
            schema,
            reader,
            writer: Mutex::new(writer),
            query_parser,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Upsert a prepared batch and commit it as one unit.
    pub fn upsert(&self, docs: &[Document]) -> Result<usize, SearchError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;

        for doc in docs {
            writer.delete_term(self.primary_key_term(doc.id));
            if let Err(e) = writer.add_document(self.schema.to_tantivy(doc)) {
                warn!(chat_id = self.chat_id, error = %e, "Batch failed, rolling back");
                writer.rollback()?;
                return Err(e.into());
            }
        }
        writer.commit()?;
        self.reader.reload()?;

        debug!(chat_id = self.chat_id, count = docs.len(), "Committed documents");
        Ok(docs.len())
    }

    /// Delete by id and commit. Unknown ids are no-ops.
    pub fn delete(&self, ids: &[i64]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        for id in ids {
            writer.delete_term(self.primary_key_term(*id));
        }
        writer.commit()?;
        self.reader.reload()?;

        debug!(chat_id = self.chat_id, count = ids.len(), "Deleted documents");
        Ok(())
    }

    /// Fetch stored documents by id, in request order.
    pub fn get(&self, ids: &[i64]) -> Result<Vec<Document>, SearchError> {
        let searcher = self.reader.searcher();
        let mut found = Vec::new();
        for id in ids {
            let query = TermQuery::new(self.primary_key_term(*id), IndexRecordOption::Basic);
            let top = searcher.search(&query, &TopDocs::with_limit(1))?;
            if let Some((_, address)) = top.first() {
                let doc: tantivy::TantivyDocument = searcher.doc(*address)?;
                found.push(self.schema.from_tantivy(&doc)?);
            }
        }
        Ok(found)
    }

    /// Number of live documents
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Filtered search sorted by `(timestamp desc, id desc)`.
    ///
    /// Returns the exact match count and the requested page.
    pub fn search(&self, request: &ChatQuery) -> Result<(usize, Vec<Document>), SearchError> {
        if request.offset.saturating_add(request.limit) > MAX_OFFSET + MAX_LIMIT {
            return Err(SearchError::InvalidRequest(format!(
                "page out of range (offset {}, limit {})",
                request.offset, request.limit
            )));
        }
        let query = self.build_query(request);
        let searcher = self.reader.searcher();

        if request.limit == 0 {
            let total = searcher.search(&query, &Count)?;
            return Ok((total, Vec::new()));
        }

        let top_docs = TopDocs::with_limit(request.limit)
            .and_offset(request.offset)
            .custom_score(|segment_reader: &SegmentReader| {
                let fast_fields = segment_reader.fast_fields();
                let timestamps = fast_fields.i64(FIELD_TIMESTAMP).ok();
                let ids = fast_fields.i64(FIELD_ID).ok();
                move |doc: DocId| {
                    let timestamp = timestamps
                        .as_ref()
                        .and_then(|c| c.first(doc))
                        .unwrap_or(0);
                    let id = ids.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                    (timestamp, id)
                }
            });

        let (total, hits) = searcher.search(&query, &(Count, top_docs))?;

        let mut docs = Vec::with_capacity(hits.len());
        for (_, address) in hits {
            let doc: tantivy::TantivyDocument = searcher.doc(address)?;
            docs.push(self.schema.from_tantivy(&doc)?);
        }
        Ok((total, docs))
    }

    /// Conjunction of text match and user/type disjunctions.
    fn build_query(&self, request: &ChatQuery) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let text = request.query.trim();
        if !text.is_empty() {
            let (parsed, errors) = self.query_parser.parse_query_lenient(text);
            if !errors.is_empty() {
                debug!(chat_id = self.chat_id, query = text, errors = errors.len(), "Lenient query parse");
            }
            clauses.push((Occur::Must, parsed));
        }
        if let Some(users) = any_of(self.schema.user_id, &request.user_ids) {
            clauses.push((Occur::Must, users));
        }
        if let Some(types) = any_of(self.schema.kind, &request.type_codes) {
            clauses.push((Occur::Must, types));
        }

        match clauses.len() {
            0 => Box::new(AllQuery),
            1 => clauses.remove(0).1,
            _ => Box::new(BooleanQuery::new(clauses)),
        }
    }

    fn primary_key_term(&self, id: i64) -> Term {
        Term::from_field_text(self.schema.primary_key, &id.to_string())
    }
}

/// Disjunction of single-value inclusive ranges over an i64 field.
fn any_of(field: tantivy::schema::Field, values: &[i64]) -> Option<Box<dyn Query>> {
    if values.is_empty() {
        return None;
    }
    let ranges: Vec<(Occur, Box<dyn Query>)> = values
        .iter()
        .map(|v| {
            let range = RangeQuery::new(
                Included(Term::from_field_i64(field, *v)),
                Included(Term::from_field_i64(field, *v)),
            );
            (Occur::Should, Box::new(range) as Box<dyn Query>)
        })
        .collect();
    Some(Box::new(BooleanQuery::new(ranges)))
}

/// Directory of a chat's index
pub fn index_path(root: &Path, chat_id: i64) -> PathBuf {
    root.join(chat_id.to_string())
}

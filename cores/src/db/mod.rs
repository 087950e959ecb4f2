//! The document database seam.
//!
//! [`DocumentDatabase`] is the client surface the library needs from a
//! CouchDB-style server. Transport is the implementor's business; errors
//! must be mapped onto [`CoresError::NotFound`](crate::CoresError::NotFound)
//! for missing documents and [`CoresError::Conflict`](crate::CoresError::Conflict)
//! for stale revisions so the sync and CRUD logic can tell them apart.

pub mod memory;

use crate::document::Document;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::{CallCounts, Emitter, MapFn, MemoryDatabase};

/// Client operations against one database.
pub trait DocumentDatabase: Send + Sync {
    /// Fetch a document by id.
    fn get(&self, id: &str) -> Result<Document>;

    /// Create or update a document. An `_id` in the body names the
    /// document; a `_rev` in the body must match the stored revision.
    fn insert(&self, doc: &Document) -> Result<DocumentRevision>;

    /// Delete a document at the given revision.
    fn destroy(&self, id: &str, rev: &str) -> Result<DocumentRevision>;

    /// Query `_design/<design>/_view/<view>`.
    fn view(&self, design: &str, view: &str, params: &ViewParams) -> Result<ViewResult>;

    /// Bulk get by keys (`_all_docs` with `include_docs`).
    fn fetch(&self, keys: &[String]) -> Result<Vec<FetchRow>>;

    /// Write many documents in one request. Per-document failures are
    /// reported in the results rather than as an error.
    fn bulk(&self, docs: &[Document]) -> Result<Vec<BulkResult>>;

    /// Fresh ids from the server.
    fn uuids(&self, count: usize) -> Result<Vec<String>>;

    fn info(&self) -> Result<DatabaseInfo>;
}

/// The `{id, rev}` pair returned by writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRevision {
    pub id: String,
    pub rev: String,
}

/// Query parameters for a view request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startkey: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endkey: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub include_docs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<bool>,
}

impl ViewParams {
    pub fn new() -> Self {
        ViewParams::default()
    }

    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_range(mut self, startkey: Value, endkey: Value) -> Self {
        self.startkey = Some(startkey);
        self.endkey = Some(endkey);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn with_include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }
}

/// One row of a view response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: Value,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// A view response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    #[serde(default)]
    pub total_rows: usize,
    #[serde(default)]
    pub offset: usize,
    pub rows: Vec<ViewRow>,
}

impl ViewResult {
    /// Documents included in the rows (requires `include_docs`).
    pub fn docs(&self) -> impl Iterator<Item = &Document> {
        self.rows.iter().filter_map(|row| row.doc.as_ref())
    }

    pub fn into_docs(self) -> Vec<Document> {
        self.rows.into_iter().filter_map(|row| row.doc).collect()
    }
}

/// One row of a bulk fetch; `error` is set for keys the database lacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRow {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one document in a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    pub doc_count: usize,
    pub update_seq: u64,
}

use super::{
    BulkResult, DatabaseInfo, DocumentDatabase, DocumentRevision, FetchRow, ViewParams, ViewResult,
    ViewRow,
};
use crate::document::Document;
use crate::error::{CoresError, NotFoundKind, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-process stand-in for a view's map function.
pub type MapFn = Arc<dyn Fn(&Document, &mut Emitter) + Send + Sync>;

/// Collects the rows a map function emits for one document.
#[derive(Debug, Default)]
pub struct Emitter {
    rows: Vec<(Value, Value)>,
}

impl Emitter {
    pub fn emit(&mut self, key: Value, value: Value) {
        self.rows.push((key, value));
    }
}

/// Number of requests of each kind a [`MemoryDatabase`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub inserts: usize,
    pub destroys: usize,
    pub views: usize,
    pub fetches: usize,
    pub bulks: usize,
}

impl CallCounts {
    /// Requests that modify the database.
    pub fn writes(&self) -> usize {
        self.inserts + self.destroys + self.bulks
    }

    /// All requests.
    pub fn total(&self) -> usize {
        self.gets + self.inserts + self.destroys + self.views + self.fetches + self.bulks
    }
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    inserts: AtomicUsize,
    destroys: AtomicUsize,
    views: AtomicUsize,
    fetches: AtomicUsize,
    bulks: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Document>,
    map_fns: HashMap<(String, String), MapFn>,
    update_seq: u64,
}

/// A thread-safe in-memory database with CouchDB revision semantics.
///
/// Writes to an existing document must carry its current `_rev`,
/// otherwise they fail with a conflict. Views are answered by map
/// functions registered with [`MemoryDatabase::register_map`] for
/// views that exist in the stored design document.
pub struct MemoryDatabase {
    name: String,
    inner: Mutex<Inner>,
    counters: Counters,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryDatabase {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
            counters: Counters::default(),
        }
    }

    /// Register the function that answers `_design/<design>/_view/<view>`.
    pub fn register_map<F>(&self, design: &str, view: &str, map: F) -> Result<()>
    where
        F: Fn(&Document, &mut Emitter) + Send + Sync + 'static,
    {
        let mut inner = self.lock()?;
        inner
            .map_fns
            .insert((design.to_string(), view.to_string()), Arc::new(map));
        Ok(())
    }

    /// Snapshot of the request counters.
    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            gets: c.gets.load(AtomicOrdering::SeqCst),
            inserts: c.inserts.load(AtomicOrdering::SeqCst),
            destroys: c.destroys.load(AtomicOrdering::SeqCst),
            views: c.views.load(AtomicOrdering::SeqCst),
            fetches: c.fetches.load(AtomicOrdering::SeqCst),
            bulks: c.bulks.load(AtomicOrdering::SeqCst),
        }
    }

    /// Number of stored documents, design documents included.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.docs.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CoresError::Database(format!("Database '{}' lock poisoned", self.name)))
    }
}

impl Inner {
    fn write(&mut self, doc: &Document) -> Result<DocumentRevision> {
        let id = match doc.id() {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };

        let current = self.docs.get(&id).and_then(|d| d.rev().map(str::to_string));
        if current.as_deref() != doc.rev() {
            return Err(CoresError::Conflict {
                id,
                reason: "Document update conflict.".to_string(),
            });
        }

        let rev = next_rev(current.as_deref());
        let mut stored = doc.clone();
        stored.set_id(id.clone());
        stored.set_rev(rev.clone());
        self.docs.insert(id.clone(), stored);
        self.update_seq += 1;

        Ok(DocumentRevision { id, rev })
    }
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

impl DocumentDatabase for MemoryDatabase {
    fn get(&self, id: &str) -> Result<Document> {
        self.counters.gets.fetch_add(1, AtomicOrdering::SeqCst);
        let inner = self.lock()?;
        inner
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| CoresError::not_found(NotFoundKind::Document, id))
    }

    fn insert(&self, doc: &Document) -> Result<DocumentRevision> {
        self.counters.inserts.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.lock()?;
        inner.write(doc)
    }

    fn destroy(&self, id: &str, rev: &str) -> Result<DocumentRevision> {
        self.counters.destroys.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.lock()?;
        let current = match inner.docs.get(id) {
            Some(doc) => doc.rev().map(str::to_string),
            None => return Err(CoresError::not_found(NotFoundKind::Document, id)),
        };
        if current.as_deref() != Some(rev) {
            return Err(CoresError::Conflict {
                id: id.to_string(),
                reason: "Document update conflict.".to_string(),
            });
        }
        inner.docs.remove(id);
        inner.update_seq += 1;
        Ok(DocumentRevision {
            id: id.to_string(),
            rev: next_rev(Some(rev)),
        })
    }

    fn view(&self, design: &str, view: &str, params: &ViewParams) -> Result<ViewResult> {
        self.counters.views.fetch_add(1, AtomicOrdering::SeqCst);
        let inner = self.lock()?;

        let design_id = format!("_design/{design}");
        let design_doc = inner
            .docs
            .get(&design_id)
            .ok_or_else(|| CoresError::not_found(NotFoundKind::Document, design_id.clone()))?;
        let declared = design_doc
            .get("views")
            .and_then(|v| v.get(view))
            .is_some();
        if !declared {
            return Err(CoresError::not_found(
                NotFoundKind::View,
                format!("{design_id}/_view/{view}"),
            ));
        }

        let map = inner
            .map_fns
            .get(&(design.to_string(), view.to_string()))
            .ok_or_else(|| {
                CoresError::Database(format!(
                    "No map function registered for {design_id}/_view/{view}"
                ))
            })?;

        let mut rows = Vec::new();
        for (id, doc) in inner.docs.iter().filter(|(_, d)| !d.is_design()) {
            let mut emitter = Emitter::default();
            map(doc, &mut emitter);
            for (key, value) in emitter.rows {
                rows.push(ViewRow {
                    id: Some(id.clone()),
                    key,
                    value,
                    doc: None,
                });
            }
        }
        let total_rows = rows.len();

        rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
        if params.descending {
            rows.reverse();
        }
        let rows = filter_rows(rows, params);

        let skip = params.skip.unwrap_or(0);
        let limit = params.limit.unwrap_or(usize::MAX);
        let rows = rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|mut row| {
                if params.include_docs {
                    row.doc = row.id.as_ref().and_then(|id| inner.docs.get(id).cloned());
                }
                row
            })
            .collect();

        Ok(ViewResult {
            total_rows,
            offset: skip,
            rows,
        })
    }

    fn fetch(&self, keys: &[String]) -> Result<Vec<FetchRow>> {
        self.counters.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        let inner = self.lock()?;
        Ok(keys
            .iter()
            .map(|key| match inner.docs.get(key) {
                Some(doc) => FetchRow {
                    key: key.clone(),
                    id: Some(key.clone()),
                    doc: Some(doc.clone()),
                    error: None,
                },
                None => FetchRow {
                    key: key.clone(),
                    id: None,
                    doc: None,
                    error: Some("not_found".to_string()),
                },
            })
            .collect())
    }

    fn bulk(&self, docs: &[Document]) -> Result<Vec<BulkResult>> {
        self.counters.bulks.fetch_add(1, AtomicOrdering::SeqCst);
        let mut inner = self.lock()?;
        Ok(docs
            .iter()
            .map(|doc| match inner.write(doc) {
                Ok(written) => BulkResult {
                    id: written.id,
                    rev: Some(written.rev),
                    error: None,
                    reason: None,
                },
                Err(e) => BulkResult {
                    id: doc.id().unwrap_or_default().to_string(),
                    rev: None,
                    error: Some(if e.is_conflict() { "conflict" } else { "error" }.to_string()),
                    reason: Some(e.to_string()),
                },
            })
            .collect())
    }

    fn uuids(&self, count: usize) -> Result<Vec<String>> {
        Ok((0..count)
            .map(|_| Uuid::new_v4().simple().to_string())
            .collect())
    }

    fn info(&self) -> Result<DatabaseInfo> {
        let inner = self.lock()?;
        Ok(DatabaseInfo {
            db_name: self.name.clone(),
            doc_count: inner.docs.len(),
            update_seq: inner.update_seq,
        })
    }
}

/// Apply key, keys and range filters to rows already in output order.
fn filter_rows(rows: Vec<ViewRow>, params: &ViewParams) -> Vec<ViewRow> {
    if let Some(keys) = &params.keys {
        // Rows come back grouped in the order the keys were given
        return keys
            .iter()
            .flat_map(|k| rows.iter().filter(move |r| collate(&r.key, k) == Ordering::Equal))
            .cloned()
            .collect();
    }

    let (low, high) = if params.descending {
        (params.endkey.as_ref(), params.startkey.as_ref())
    } else {
        (params.startkey.as_ref(), params.endkey.as_ref())
    };

    rows.into_iter()
        .filter(|row| {
            if let Some(key) = &params.key {
                return collate(&row.key, key) == Ordering::Equal;
            }
            low.map_or(true, |l| collate(&row.key, l) != Ordering::Less)
                && high.map_or(true, |h| collate(&row.key, h) != Ordering::Greater)
        })
        .collect()
}

/// Simplified CouchDB collation: null < booleans < numbers < strings <
/// arrays < objects.
pub(crate) fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                let ord = collate(xa, ya);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
                let ord = xk.cmp(yk).then_with(|| collate(xv, yv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn db_with_articles() -> MemoryDatabase {
        let db = MemoryDatabase::new("test");
        db.insert(&doc(json!({
            "_id": "_design/article",
            "views": { "by_title": { "map": "function(doc) { emit(doc.title, null); }" } }
        })))
        .unwrap();
        for (id, title) in [("a", "Cherry"), ("b", "Apple"), ("c", "Banana")] {
            db.insert(&doc(json!({ "_id": id, "type_": "Article", "title": title })))
                .unwrap();
        }
        db.register_map("article", "by_title", |doc, emit| {
            if let Some(title) = doc.get("title") {
                emit.emit(title.clone(), Value::Null);
            }
        })
        .unwrap();
        db
    }

    fn keys(result: &ViewResult) -> Vec<Value> {
        result.rows.iter().map(|r| r.key.clone()).collect()
    }

    #[test]
    fn test_insert_assigns_id_and_rev() {
        let db = MemoryDatabase::new("test");
        let written = db.insert(&doc(json!({ "a": 1 }))).unwrap();
        assert!(written.rev.starts_with("1-"));

        let stored = db.get(&written.id).unwrap();
        assert_eq!(stored.id(), Some(written.id.as_str()));
        assert_eq!(stored.rev(), Some(written.rev.as_str()));
    }

    #[test]
    fn test_update_requires_current_rev() {
        let db = MemoryDatabase::new("test");
        let first = db.insert(&doc(json!({ "_id": "x" }))).unwrap();

        // no rev for an existing doc
        let err = db.insert(&doc(json!({ "_id": "x" }))).unwrap_err();
        assert!(err.is_conflict());

        let second = db
            .insert(&doc(json!({ "_id": "x", "_rev": first.rev })))
            .unwrap();
        assert!(second.rev.starts_with("2-"));

        // stale rev
        let err = db
            .insert(&doc(json!({ "_id": "x", "_rev": first.rev })))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_rev_for_missing_doc_conflicts() {
        let db = MemoryDatabase::new("test");
        let err = db
            .insert(&doc(json!({ "_id": "x", "_rev": "1-abc" })))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_destroy() {
        let db = MemoryDatabase::new("test");
        let written = db.insert(&doc(json!({ "_id": "x" }))).unwrap();

        assert!(db.destroy("x", "1-stale").unwrap_err().is_conflict());
        assert!(db.destroy("nope", "1-abc").unwrap_err().is_not_found());

        db.destroy("x", &written.rev).unwrap();
        assert!(db.get("x").unwrap_err().is_not_found());
        assert_eq!(db.calls().destroys, 3);
    }

    #[test]
    fn test_view_sorted_by_key() {
        let db = db_with_articles();
        let result = db.view("article", "by_title", &ViewParams::new()).unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(keys(&result), vec![json!("Apple"), json!("Banana"), json!("Cherry")]);
        assert!(result.rows.iter().all(|r| r.doc.is_none()));
    }

    #[test]
    fn test_view_params() {
        let db = db_with_articles();

        let result = db
            .view("article", "by_title", &ViewParams::new().with_descending(true).with_limit(2))
            .unwrap();
        assert_eq!(keys(&result), vec![json!("Cherry"), json!("Banana")]);

        let result = db
            .view(
                "article",
                "by_title",
                &ViewParams::new().with_range(json!("B"), json!("C")),
            )
            .unwrap();
        assert_eq!(keys(&result), vec![json!("Banana")]);

        let result = db
            .view(
                "article",
                "by_title",
                &ViewParams::new().with_key(json!("Apple")).with_include_docs(true),
            )
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].doc.as_ref().unwrap().id(), Some("b"));

        let result = db
            .view(
                "article",
                "by_title",
                &ViewParams::new().with_keys(vec![json!("Cherry"), json!("Apple")]),
            )
            .unwrap();
        assert_eq!(keys(&result), vec![json!("Cherry"), json!("Apple")]);

        let result = db
            .view(
                "article",
                "by_title",
                &ViewParams::new().with_skip(1).with_include_docs(true),
            )
            .unwrap();
        assert_eq!(result.offset, 1);
        assert_eq!(result.total_rows, 3);
        let ids: Vec<&str> = result.docs().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_view_errors() {
        let db = db_with_articles();
        let err = db.view("nope", "by_title", &ViewParams::new()).unwrap_err();
        assert!(err.is_not_found());
        let err = db.view("article", "nope", &ViewParams::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_fetch_reports_missing() {
        let db = db_with_articles();
        let rows = db.fetch(&["a".to_string(), "zzz".to_string()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].doc.as_ref().unwrap().get("title"), Some(&json!("Cherry")));
        assert_eq!(rows[1].error.as_deref(), Some("not_found"));
    }

    #[test]
    fn test_bulk_reports_per_doc_conflicts() {
        let db = db_with_articles();
        let current = db.get("a").unwrap();
        let results = db
            .bulk(&[current, doc(json!({ "_id": "b", "_rev": "1-stale" }))])
            .unwrap();
        assert!(results[0].is_ok());
        assert_eq!(results[1].error.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_info_and_uuids() {
        let db = db_with_articles();
        let info = db.info().unwrap();
        assert_eq!(info.db_name, "test");
        assert_eq!(info.doc_count, 4);
        assert_eq!(info.update_seq, 4);

        let ids = db.uuids(3).unwrap();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_collation_order() {
        let mut values = vec![json!("a"), json!([1]), json!(2), json!(null), json!(true), json!({})];
        values.sort_by(collate);
        assert_eq!(
            values,
            vec![json!(null), json!(true), json!(2), json!("a"), json!([1]), json!({})]
        );
    }
}

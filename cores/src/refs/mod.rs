//! Reference resolution.
//!
//! A reference is a nested object carrying the referenced document's id
//! in an `id_` field, e.g. `{"author": {"id_": "user-1"}}`. Resolving it
//! merges the referenced document's fields into that object. An object
//! that already has an `_id` counts as resolved.

use crate::db::DocumentDatabase;
use crate::document::{Document, ID_FIELD};
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Field holding the referenced document's id.
pub const REF_FIELD: &str = "id_";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// An unresolved reference found while walking a document.
#[derive(Debug)]
struct Placeholder {
    doc: usize,
    path: Vec<Segment>,
    id: String,
}

/// Resolve the references in `docs` in place.
///
/// Each round collects the unresolved references of all documents and
/// issues a single batch fetch for the ids not fetched yet. With `deep`
/// set, rounds repeat until no reference is left; otherwise only the
/// references present in `docs` as given are resolved. Ids the database
/// does not have, and references to a document enclosing the reference,
/// stay unresolved.
pub fn fetch_refs(db: &dyn DocumentDatabase, docs: &mut [Document], deep: bool) -> Result<()> {
    let mut fetched: HashMap<String, Document> = HashMap::new();
    let mut missing: HashSet<String> = HashSet::new();

    loop {
        let placeholders = collect(docs, &missing);
        if placeholders.is_empty() {
            break;
        }

        let mut wanted: Vec<String> = Vec::new();
        for placeholder in &placeholders {
            if !fetched.contains_key(&placeholder.id) && !wanted.contains(&placeholder.id) {
                wanted.push(placeholder.id.clone());
            }
        }
        if !wanted.is_empty() {
            log::debug!("Fetching {} referenced documents", wanted.len());
            for row in db.fetch(&wanted)? {
                match row.doc {
                    Some(mut doc) if row.error.is_none() => {
                        // A merged reference must count as resolved next round
                        if doc.id().is_none() {
                            doc.set_id(row.key.clone());
                        }
                        fetched.insert(row.key, doc);
                    }
                    _ => {
                        log::warn!("Skipping reference to missing document {}", row.key);
                        missing.insert(row.key);
                    }
                }
            }
            for id in wanted {
                if !fetched.contains_key(&id) {
                    missing.insert(id);
                }
            }
        }

        let mut merged = 0;
        for placeholder in &placeholders {
            let Some(source) = fetched.get(&placeholder.id) else {
                continue;
            };
            if let Some(target) = locate(docs[placeholder.doc].fields_mut(), &placeholder.path) {
                for (key, value) in source.fields() {
                    target.insert(key.clone(), value.clone());
                }
                merged += 1;
            }
        }

        if !deep || merged == 0 {
            break;
        }
    }

    Ok(())
}

fn collect(docs: &[Document], skip: &HashSet<String>) -> Vec<Placeholder> {
    let mut out = Vec::new();
    for (index, doc) in docs.iter().enumerate() {
        let mut ancestors: Vec<String> = doc.id().map(str::to_string).into_iter().collect();
        let mut path = Vec::new();
        for (key, value) in doc.fields() {
            path.push(Segment::Key(key.clone()));
            walk(value, index, &mut path, &mut ancestors, skip, &mut out);
            path.pop();
        }
    }
    out
}

fn walk(
    value: &Value,
    doc: usize,
    path: &mut Vec<Segment>,
    ancestors: &mut Vec<String>,
    skip: &HashSet<String>,
    out: &mut Vec<Placeholder>,
) {
    match value {
        Value::Object(map) => {
            let own_id = map.get(ID_FIELD).and_then(Value::as_str);
            if own_id.is_none() {
                if let Some(Value::String(id)) = map.get(REF_FIELD) {
                    if !skip.contains(id) && !ancestors.contains(id) {
                        out.push(Placeholder {
                            doc,
                            path: path.clone(),
                            id: id.clone(),
                        });
                    }
                    return;
                }
            }

            if let Some(id) = own_id {
                ancestors.push(id.to_string());
            }
            for (key, child) in map {
                path.push(Segment::Key(key.clone()));
                walk(child, doc, path, ancestors, skip, out);
                path.pop();
            }
            if own_id.is_some() {
                ancestors.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(Segment::Index(i));
                walk(child, doc, path, ancestors, skip, out);
                path.pop();
            }
        }
        _ => {}
    }
}

fn locate<'v>(fields: &'v mut Map<String, Value>, path: &[Segment]) -> Option<&'v mut Map<String, Value>> {
    let (first, rest) = path.split_first()?;
    let mut current = match first {
        Segment::Key(key) => fields.get_mut(key)?,
        Segment::Index(_) => return None,
    };
    for segment in rest {
        current = match segment {
            Segment::Key(key) => current.get_mut(key.as_str())?,
            Segment::Index(i) => current.get_mut(*i)?,
        };
    }
    current.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        BulkResult, DatabaseInfo, DocumentRevision, FetchRow, MemoryDatabase, ViewParams,
        ViewResult,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new("refs");
        for value in [
            json!({ "_id": "ann", "name": "Ann", "team": { "id_": "red" } }),
            json!({ "_id": "bob", "name": "Bob", "team": { "id_": "red" } }),
            json!({ "_id": "red", "name": "Red team" }),
            json!({ "_id": "ping", "other": { "id_": "pong" } }),
            json!({ "_id": "pong", "other": { "id_": "ping" } }),
        ] {
            db.insert(&doc(value)).unwrap();
        }
        db
    }

    #[test]
    fn test_one_level() {
        let db = seeded();
        let mut docs = vec![doc(json!({
            "_id": "post-1",
            "author": { "id_": "ann" },
            "reviewers": [{ "id_": "bob" }, { "id_": "ann" }]
        }))];

        fetch_refs(&db, &mut docs, false).unwrap();

        let author = docs[0].get("author").unwrap();
        assert_eq!(author["name"], json!("Ann"));
        assert_eq!(author["id_"], json!("ann"));
        assert_eq!(author["team"], json!({ "id_": "red" }));
        assert_eq!(docs[0].get("reviewers").unwrap()[0]["name"], json!("Bob"));
        assert_eq!(docs[0].get("reviewers").unwrap()[1]["name"], json!("Ann"));
        assert_eq!(db.calls().fetches, 1);
    }

    #[test]
    fn test_deep_resolves_transitively() {
        let db = seeded();
        let mut docs = vec![
            doc(json!({ "_id": "post-1", "author": { "id_": "ann" } })),
            doc(json!({ "_id": "post-2", "author": { "id_": "bob" } })),
        ];

        fetch_refs(&db, &mut docs, true).unwrap();

        assert_eq!(docs[0].get("author").unwrap()["team"]["name"], json!("Red team"));
        assert_eq!(docs[1].get("author").unwrap()["team"]["name"], json!("Red team"));
        // One fetch per level
        assert_eq!(db.calls().fetches, 2);
    }

    #[test]
    fn test_cycle_stops_at_enclosing_document() {
        let db = seeded();
        let mut docs = vec![doc(json!({ "_id": "ping", "other": { "id_": "pong" } }))];

        fetch_refs(&db, &mut docs, true).unwrap();

        let other = docs[0].get("other").unwrap();
        assert_eq!(other["_id"], json!("pong"));
        assert_eq!(other["other"], json!({ "id_": "ping" }));
    }

    /// Serves batch fetches with the `_id` stripped from every document.
    struct Anonymous(MemoryDatabase);

    impl DocumentDatabase for Anonymous {
        fn get(&self, id: &str) -> Result<Document> {
            self.0.get(id)
        }
        fn insert(&self, doc: &Document) -> Result<DocumentRevision> {
            self.0.insert(doc)
        }
        fn destroy(&self, id: &str, rev: &str) -> Result<DocumentRevision> {
            self.0.destroy(id, rev)
        }
        fn view(&self, design: &str, view: &str, params: &ViewParams) -> Result<ViewResult> {
            self.0.view(design, view, params)
        }
        fn fetch(&self, keys: &[String]) -> Result<Vec<FetchRow>> {
            let mut rows = self.0.fetch(keys)?;
            for doc in rows.iter_mut().filter_map(|row| row.doc.as_mut()) {
                doc.remove(ID_FIELD);
            }
            Ok(rows)
        }
        fn bulk(&self, docs: &[Document]) -> Result<Vec<BulkResult>> {
            self.0.bulk(docs)
        }
        fn uuids(&self, count: usize) -> Result<Vec<String>> {
            self.0.uuids(count)
        }
        fn info(&self) -> Result<DatabaseInfo> {
            self.0.info()
        }
    }

    #[test]
    fn test_deep_terminates_when_fetched_docs_lack_id() {
        let db = Anonymous(seeded());
        let mut docs = vec![doc(json!({ "_id": "post-1", "author": { "id_": "ann" } }))];

        fetch_refs(&db, &mut docs, true).unwrap();

        let author = docs[0].get("author").unwrap();
        assert_eq!(author["_id"], json!("ann"));
        assert_eq!(author["team"]["_id"], json!("red"));
        assert_eq!(author["team"]["name"], json!("Red team"));
        assert_eq!(db.0.calls().fetches, 2);
    }

    #[test]
    fn test_missing_ids_stay_placeholders() {
        let db = seeded();
        let mut docs = vec![doc(json!({ "author": { "id_": "nobody" } }))];
        fetch_refs(&db, &mut docs, true).unwrap();
        assert_eq!(docs[0].get("author"), Some(&json!({ "id_": "nobody" })));
        assert_eq!(db.calls().fetches, 1);
    }

    #[test]
    fn test_no_refs_no_fetch() {
        let db = seeded();
        let mut docs = vec![doc(json!({ "title": "x", "author": { "_id": "ann", "id_": "ann" } }))];
        fetch_refs(&db, &mut docs, true).unwrap();
        assert_eq!(db.calls().fetches, 0);
    }
}

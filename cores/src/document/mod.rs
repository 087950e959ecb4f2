// Document model - a JSON object with the `_id` / `_rev` conventions

use crate::error::{CoresError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field holding the document id.
pub const ID_FIELD: &str = "_id";
/// Reserved field holding the revision token.
pub const REV_FIELD: &str = "_rev";

/// A database document: a plain JSON object with reserved `_id`, `_rev`
/// and a type discriminator field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Document(Map::new())
    }

    /// Wrap a JSON value. Anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(CoresError::InvalidDocument(format!(
                "Document must be a JSON object, got {}",
                crate::validation::type_name(&other)
            ))),
        }
    }

    /// Serialize any value into a document.
    pub fn from_serializable<T: Serialize>(data: &T) -> Result<Self> {
        Document::from_value(serde_json::to_value(data)?)
    }

    /// Deserialize the document into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn rev(&self) -> Option<&str> {
        self.0.get(REV_FIELD).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.0.insert(REV_FIELD.to_string(), Value::String(rev.into()));
    }

    pub fn remove_rev(&mut self) -> Option<Value> {
        self.0.remove(REV_FIELD)
    }

    /// The discriminator, if present and a string.
    pub fn doc_type(&self, type_field: &str) -> Option<&str> {
        self.0.get(type_field).and_then(Value::as_str)
    }

    pub fn set_type(&mut self, type_field: &str, name: &str) {
        self.0
            .insert(type_field.to_string(), Value::String(name.to_string()));
    }

    pub fn is_design(&self) -> bool {
        self.id().map_or(false, |id| id.starts_with("_design/"))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Copy every field of `other` over this document.
    pub fn merge(&mut self, other: &Map<String, Value>) {
        for (k, v) in other {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Document(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

use crate::config::CoresConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Definition of a single layout: its document schema and design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignConfig>,
}

/// The caller-supplied part of a design document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shows: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists: Option<Map<String, Value>>,
}

impl DesignConfig {
    pub fn with_view(mut self, name: impl Into<String>, view: ViewConfig) -> Self {
        self.views.insert(name.into(), view);
        self
    }
}

/// A view as stored in a design document: map source plus optional reduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl ViewConfig {
    pub fn map(source: impl Into<String>) -> Self {
        ViewConfig {
            map: source.into(),
            reduce: None,
        }
    }

    pub fn with_reduce(mut self, source: impl Into<String>) -> Self {
        self.reduce = Some(source.into());
        self
    }
}

/// Contents of a layout definitions file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutDefinitions {
    pub config: CoresConfig,
    pub layouts: BTreeMap<String, LayoutConfig>,
}

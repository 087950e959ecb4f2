use crate::db::DocumentDatabase;
use crate::document::Document;
use crate::error::{CoresError, Result};
use crate::schema::{DesignConfig, ViewConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name of the view every layout gets for listing its documents.
pub const ALL_VIEW: &str = "all";

const DESIGN_PREFIX: &str = "_design/";

/// A design document as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shows: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lists: Option<Map<String, Value>>,
}

fn default_language() -> String {
    "javascript".to_string()
}

/// Result of a design sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { rev: String },
    Updated { previous_rev: String, rev: String },
}

impl SyncOutcome {
    /// The revision now stored in the database.
    pub fn rev(&self) -> &str {
        match self {
            SyncOutcome::Created { rev } | SyncOutcome::Updated { rev, .. } => rev,
        }
    }
}

impl DesignDocument {
    /// Build the design for a layout: the caller's views plus an `all`
    /// view selecting documents of this layout, unless one was given.
    pub fn for_layout(layout: &str, design: Option<&DesignConfig>, type_field: &str) -> Self {
        let mut views = design.map(|d| d.views.clone()).unwrap_or_default();
        views
            .entry(ALL_VIEW.to_string())
            .or_insert_with(|| ViewConfig::map(all_view_map(layout, type_field)));

        DesignDocument {
            id: design_id(&design_name(layout)),
            rev: None,
            language: default_language(),
            views,
            shows: design.and_then(|d| d.shows.clone()),
            lists: design.and_then(|d| d.lists.clone()),
        }
    }

    /// The design name, without the `_design/` prefix.
    pub fn name(&self) -> &str {
        self.id.strip_prefix(DESIGN_PREFIX).unwrap_or(&self.id)
    }

    pub fn has_view(&self, view: &str) -> bool {
        self.views.contains_key(view)
    }

    pub fn to_document(&self) -> Result<Document> {
        Document::from_serializable(self)
    }
}

/// Design names are the lowercased layout name.
pub fn design_name(layout: &str) -> String {
    layout.to_lowercase()
}

/// `_design/<name>`
pub fn design_id(name: &str) -> String {
    format!("{DESIGN_PREFIX}{name}")
}

/// `_design/<name>/_view/<view>`
pub fn view_path(design: &str, view: &str) -> String {
    format!("{DESIGN_PREFIX}{design}/_view/{view}")
}

/// Map function source selecting every document of a layout.
pub fn all_view_map(layout: &str, type_field: &str) -> String {
    // JSON string quoting is valid JavaScript string quoting
    let field = Value::String(type_field.to_string());
    let quoted = Value::String(layout.to_string());
    format!("function(doc) {{ if (doc[{field}] === {quoted}) {{ emit(doc._id, null); }} }}")
}

/// Upload a design document: create it when the database has none,
/// otherwise update it carrying the current revision forward.
///
/// Only a not-found fetch means "create"; every other fetch error is
/// returned as is. A concurrent writer that got in between the fetch and
/// the insert makes the insert fail with a conflict, which is also
/// returned as is.
pub fn sync(db: &dyn DocumentDatabase, design: &DesignDocument) -> Result<SyncOutcome> {
    let mut upload = design.clone();

    let previous_rev = match db.get(&design.id) {
        Ok(current) => match current.rev() {
            Some(rev) => Some(rev.to_string()),
            None => {
                return Err(CoresError::Database(format!(
                    "Stored design '{}' has no revision",
                    design.id
                )))
            }
        },
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    upload.rev = previous_rev.clone();

    log::debug!(
        "Syncing design {} ({})",
        design.id,
        if previous_rev.is_some() { "update" } else { "create" }
    );
    let written = db.insert(&upload.to_document()?)?;

    Ok(match previous_rev {
        Some(previous_rev) => {
            log::info!("Updated design {} to {}", design.id, written.rev);
            SyncOutcome::Updated {
                previous_rev,
                rev: written.rev,
            }
        }
        None => {
            log::info!("Created design {} at {}", design.id, written.rev);
            SyncOutcome::Created { rev: written.rev }
        }
    })
}

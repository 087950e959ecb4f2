use super::check::{check_design, check_schema};
use super::types::{LayoutConfig, LayoutDefinitions};
use crate::config::CoresConfig;
use crate::error::{CoresError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct RawDefinitions {
    #[serde(default)]
    config: CoresConfig,
    #[serde(default)]
    layouts: BTreeMap<String, Value>,
}

/// Parse a layout definitions document (YAML or JSON).
///
/// Every layout is checked before it is deserialized, so malformed
/// schemas and designs surface as configuration errors listing each
/// problem rather than as a bare parse error.
pub fn parse_layouts_str(content: &str) -> Result<LayoutDefinitions> {
    let raw: RawDefinitions = serde_yaml::from_str(content)?;
    let mut layouts = BTreeMap::new();
    for (name, value) in raw.layouts {
        let layout = layout_from_value(&name, value)?;
        layouts.insert(name, layout);
    }
    Ok(LayoutDefinitions {
        config: raw.config,
        layouts,
    })
}

/// Check and convert one raw layout definition.
pub fn layout_from_value(name: &str, value: Value) -> Result<LayoutConfig> {
    let mut violations = Vec::new();
    match value.as_object() {
        Some(obj) => {
            if let Some(schema) = obj.get("schema") {
                violations.extend(check_schema(schema));
            }
            if let Some(design) = obj.get("design") {
                violations.extend(check_design(design));
            }
        }
        None if value.is_null() => return Ok(LayoutConfig::default()),
        None => {
            return Err(CoresError::config(format!(
                "Layout '{name}' definition must be a mapping"
            )))
        }
    }
    if !violations.is_empty() {
        return Err(CoresError::Configuration {
            message: format!("Layout '{name}' definition does not validate"),
            violations,
        });
    }
    Ok(serde_json::from_value(value)?)
}

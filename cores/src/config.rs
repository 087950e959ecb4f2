use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Runtime options for a [`Cores`](crate::Cores) instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoresConfig {
    /// Name of the document field holding the layout name.
    #[serde(default = "default_type_field")]
    pub type_field: String,
    /// Follow `$ref` schemas into other layouts during validation.
    #[serde(default)]
    pub validate_refs: bool,
    /// Re-fetch a document before destroying it to confirm its type.
    #[serde(default = "default_true")]
    pub confirm_type_on_destroy: bool,
}

fn default_type_field() -> String {
    "type_".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CoresConfig {
    fn default() -> Self {
        CoresConfig {
            type_field: default_type_field(),
            validate_refs: false,
            confirm_type_on_destroy: true,
        }
    }
}

impl CoresConfig {
    /// Parse a config from YAML (JSON is accepted as well).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: CoresConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn with_type_field(mut self, field: impl Into<String>) -> Self {
        self.type_field = field.into();
        self
    }

    pub fn with_validate_refs(mut self, validate_refs: bool) -> Self {
        self.validate_refs = validate_refs;
        self
    }

    pub fn with_confirm_type_on_destroy(mut self, confirm: bool) -> Self {
        self.confirm_type_on_destroy = confirm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_mapping() {
        let config = CoresConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, CoresConfig::default());
        assert_eq!(config.type_field, "type_");
        assert!(config.confirm_type_on_destroy);
    }

    #[test]
    fn test_partial_yaml() {
        let config = CoresConfig::from_yaml_str("type_field: type\nvalidate_refs: true").unwrap();
        assert_eq!(config.type_field, "type");
        assert!(config.validate_refs);
        assert!(config.confirm_type_on_destroy);
    }
}

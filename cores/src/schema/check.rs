use super::types::LayoutConfig;
use crate::error::{CoresError, Result};
use crate::validation::{type_name, Violation};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn name_pattern() -> &'static std::result::Result<Regex, regex::Error> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$"))
}

/// Layout names become design document ids, so they are restricted to
/// characters that need no escaping in a database path.
pub fn check_layout_name(name: &str) -> Vec<Violation> {
    match name_pattern() {
        Ok(pattern) if pattern.is_match(name) => Vec::new(),
        Ok(_) => vec![Violation::new(
            "",
            format!("Layout name '{name}' must start with a letter and contain only letters, digits, '_' or '-'"),
        )],
        Err(e) => vec![Violation::new("", format!("Invalid layout name pattern: {e}"))],
    }
}

/// Check that a layout schema is shaped like a document schema.
pub fn check_schema(schema: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    let obj = match schema.as_object() {
        Some(o) => o,
        None => {
            violations.push(Violation::new(
                "/schema",
                format!("Schema must be an object, got {}", type_name(schema)),
            ));
            return violations;
        }
    };

    expect_string(obj.get("title"), "/schema/title", &mut violations);
    expect_string(obj.get("description"), "/schema/description", &mut violations);

    if let Some(t) = obj.get("type") {
        if t.as_str() != Some("object") {
            violations.push(Violation::new(
                "/schema/type",
                format!("Document schema type must be \"object\", got {t}"),
            ));
        }
    }

    match obj.get("properties") {
        None => {}
        Some(Value::Object(properties)) => {
            for (name, prop) in properties {
                if !prop.is_object() {
                    violations.push(Violation::new(
                        format!("/schema/properties/{name}"),
                        format!("Property schema must be an object, got {}", type_name(prop)),
                    ));
                }
            }
        }
        Some(other) => violations.push(Violation::new(
            "/schema/properties",
            format!("Expected object, got {}", type_name(other)),
        )),
    }

    match obj.get("required") {
        None => {}
        Some(Value::Array(names)) => {
            if names.iter().any(|n| !n.is_string()) {
                violations.push(Violation::new(
                    "/schema/required",
                    "Required must list property names as strings",
                ));
            }
        }
        Some(other) => violations.push(Violation::new(
            "/schema/required",
            format!("Expected array, got {}", type_name(other)),
        )),
    }

    expect_object(obj.get("definitions"), "/schema/definitions", &mut violations);

    if let Some(additional) = obj.get("additionalProperties") {
        if !additional.is_boolean() && !additional.is_object() {
            violations.push(Violation::new(
                "/schema/additionalProperties",
                format!("Expected boolean or object, got {}", type_name(additional)),
            ));
        }
    }

    violations
}

/// Check that a design is shaped like a CouchDB design document body.
pub fn check_design(design: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    let obj = match design.as_object() {
        Some(o) => o,
        None => {
            violations.push(Violation::new(
                "/design",
                format!("Design must be an object, got {}", type_name(design)),
            ));
            return violations;
        }
    };

    expect_string(obj.get("title"), "/design/title", &mut violations);
    expect_string(obj.get("description"), "/design/description", &mut violations);
    expect_object(obj.get("shows"), "/design/shows", &mut violations);
    expect_object(obj.get("lists"), "/design/lists", &mut violations);

    match obj.get("views") {
        None => {}
        Some(Value::Object(views)) => {
            for (name, view) in views {
                let path = format!("/design/views/{name}");
                match view.get("map") {
                    Some(Value::String(src)) if !src.trim().is_empty() => {}
                    Some(Value::String(_)) => {
                        violations.push(Violation::new(format!("{path}/map"), "Map function is empty"))
                    }
                    Some(other) => violations.push(Violation::new(
                        format!("{path}/map"),
                        format!("Map function must be a string, got {}", type_name(other)),
                    )),
                    None => violations.push(Violation::new(path.clone(), "View has no map function")),
                }
                expect_string(view.get("reduce"), &format!("{path}/reduce"), &mut violations);
            }
        }
        Some(other) => violations.push(Violation::new(
            "/design/views",
            format!("Expected object, got {}", type_name(other)),
        )),
    }

    violations
}

/// Check a typed layout definition before it is registered.
pub fn check_layout(name: &str, config: &LayoutConfig) -> Result<()> {
    let mut violations = check_layout_name(name);
    if let Some(schema) = &config.schema {
        violations.extend(check_schema(schema));
    }
    if let Some(design) = &config.design {
        violations.extend(check_design(&serde_json::to_value(design)?));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CoresError::Configuration {
            message: format!("Layout '{name}' definition does not validate"),
            violations,
        })
    }
}

fn expect_string(value: Option<&Value>, path: &str, violations: &mut Vec<Violation>) {
    if let Some(v) = value {
        if !v.is_string() {
            violations.push(Violation::new(path, format!("Expected string, got {}", type_name(v))));
        }
    }
}

fn expect_object(value: Option<&Value>, path: &str, violations: &mut Vec<Violation>) {
    if let Some(v) = value {
        if !v.is_object() {
            violations.push(Violation::new(path, format!("Expected object, got {}", type_name(v))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_layouts_str, DesignConfig, ViewConfig};
    use serde_json::json;

    #[test]
    fn test_layout_names() {
        assert!(check_layout_name("Article").is_empty());
        assert!(check_layout_name("blog-post_2").is_empty());
        assert!(!check_layout_name("").is_empty());
        assert!(!check_layout_name("a/b").is_empty());
        assert!(!check_layout_name("2fast").is_empty());
    }

    #[test]
    fn test_valid_schema() {
        let schema = json!({
            "title": "Article",
            "type": "object",
            "properties": { "title": { "type": "string" } },
            "required": ["title"]
        });
        assert!(check_schema(&schema).is_empty());
    }

    #[test]
    fn test_property_must_be_schema() {
        let violations = check_schema(&json!({ "properties": { "type": "boolean" } }));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "/schema/properties/type");
    }

    #[test]
    fn test_bad_schema_shapes() {
        assert_eq!(check_schema(&json!("nope")).len(), 1);
        let violations = check_schema(&json!({
            "title": 5,
            "type": "array",
            "required": "title",
            "additionalProperties": "no"
        }));
        assert_eq!(violations.len(), 4, "Violations: {violations:?}");
    }

    #[test]
    fn test_design_views_must_be_object() {
        let violations = check_design(&json!({ "views": "" }));
        assert_eq!(violations, vec![Violation::new("/design/views", "Expected object, got string")]);
    }

    #[test]
    fn test_design_view_needs_map() {
        let violations = check_design(&json!({
            "views": {
                "titles": { "reduce": "_count" },
                "empty": { "map": "  " },
                "ok": { "map": "function(doc) { emit(doc.title); }" }
            }
        }));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_check_typed_layout() {
        let config = LayoutConfig {
            schema: Some(json!({ "properties": {} })),
            design: Some(DesignConfig::default().with_view("titles", ViewConfig::map(""))),
        };
        let err = check_layout("Article", &config).unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(check_layout("Article", &LayoutConfig::default()).is_ok());
    }

    #[test]
    fn test_parse_definitions() {
        let defs = parse_layouts_str(
            r#"
config:
  type_field: type
layouts:
  Article:
    schema:
      properties:
        title: { type: string }
      required: [title]
    design:
      views:
        titles:
          map: "function(doc) { emit(doc.title, null); }"
  Comment:
"#,
        )
        .unwrap();
        assert_eq!(defs.config.type_field, "type");
        assert_eq!(defs.layouts.len(), 2);
        let article = &defs.layouts["Article"];
        assert!(article.design.as_ref().unwrap().views.contains_key("titles"));
        assert_eq!(defs.layouts["Comment"], LayoutConfig::default());
    }

    #[test]
    fn test_parse_reports_violations() {
        let err = parse_layouts_str(
            r#"
layouts:
  Article:
    schema:
      properties:
        type: boolean
    design:
      views: ""
"#,
        )
        .unwrap_err();
        assert_eq!(err.violations().len(), 2);
    }
}

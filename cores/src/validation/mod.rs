use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Recursive `$ref` chains deeper than this are reported instead of followed.
const MAX_REF_DEPTH: usize = 32;

/// A single schema violation found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer to the offending value ("" is the document root)
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Looks up named schemas for `$ref` resolution.
pub trait SchemaResolver {
    fn resolve(&self, name: &str) -> Option<&Value>;
}

impl SchemaResolver for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// No named schemas; every `$ref` that is not a local definition fails.
pub struct NoSchemas;

impl SchemaResolver for NoSchemas {
    fn resolve(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// Everything a validator needs besides the schema and the document.
pub struct ValidationContext<'a> {
    pub resolver: &'a dyn SchemaResolver,
    /// When false, subschemas given as `$ref` are not checked.
    pub validate_refs: bool,
    /// Document field holding the layout name; exempt from `additionalProperties`.
    pub type_field: &'a str,
}

impl<'a> ValidationContext<'a> {
    pub fn new(resolver: &'a dyn SchemaResolver, validate_refs: bool, type_field: &'a str) -> Self {
        ValidationContext {
            resolver,
            validate_refs,
            type_field,
        }
    }
}

/// Validates documents against layout schemas.
///
/// This is the seam for plugging in a full JSON-schema implementation;
/// [`JsonSchemaValidator`] covers the subset layouts use in practice.
pub trait SchemaValidator: Send + Sync {
    /// Return every violation of `schema` found in `doc`. Empty means valid.
    fn validate(&self, schema: &Value, doc: &Value, ctx: &ValidationContext<'_>) -> Vec<Violation>;
}

/// Built-in validator for a JSON-schema subset: `type`, `enum`, `properties`,
/// `required`, `additionalProperties`, `items`, `minItems`/`maxItems`,
/// `minLength`/`maxLength`, `pattern`, `minimum`/`maximum` and `$ref`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, doc: &Value, ctx: &ValidationContext<'_>) -> Vec<Violation> {
        let mut walker = Walker {
            root: schema,
            ctx,
            violations: Vec::new(),
        };
        walker.check(schema, doc, "", 0);
        walker.violations
    }
}

struct Walker<'a> {
    root: &'a Value,
    ctx: &'a ValidationContext<'a>,
    violations: Vec<Violation>,
}

impl<'a> Walker<'a> {
    fn push(&mut self, path: &str, message: String) {
        self.violations.push(Violation::new(path, message));
    }

    fn check(&mut self, schema: &Value, value: &Value, path: &str, depth: usize) {
        let schema = match schema.as_object() {
            Some(s) => s,
            // `true`, `{}` and anything non-object accept every value
            None => return,
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if !self.ctx.validate_refs {
                return;
            }
            if depth >= MAX_REF_DEPTH {
                self.push(path, format!("Reference '{reference}' nests too deeply"));
                return;
            }
            match self.lookup_ref(reference) {
                Some(target) => self.check(target, value, path, depth + 1),
                None => self.push(path, format!("Unresolvable reference '{reference}'")),
            }
            return;
        }

        if let Some(expected) = schema.get("type") {
            if !matches_type(expected, value) {
                self.push(
                    path,
                    format!("Expected {}, got {}", describe_type(expected), type_name(value)),
                );
                return;
            }
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                self.push(path, format!("Value {value} is not one of {}", Value::Array(allowed.clone())));
            }
        }

        match value {
            Value::Object(map) => self.check_object(schema, map, path, depth),
            Value::Array(items) => self.check_array(schema, items, path, depth),
            Value::String(s) => self.check_string(schema, s, path),
            Value::Number(n) => {
                if let Some(x) = n.as_f64() {
                    self.check_number(schema, x, path);
                }
            }
            _ => {}
        }
    }

    fn check_object(&mut self, schema: &Map<String, Value>, map: &Map<String, Value>, path: &str, depth: usize) {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if map.get(name).map_or(true, Value::is_null) {
                    self.push(&child_path(path, name), "Required property is missing".to_string());
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        if let Some(properties) = properties {
            for (name, prop_schema) in properties {
                if let Some(prop_value) = map.get(name) {
                    if !prop_value.is_null() {
                        self.check(prop_schema, prop_value, &child_path(path, name), depth);
                    }
                }
            }
        }

        let additional = match schema.get("additionalProperties") {
            Some(a) => a,
            None => return,
        };
        for (name, prop_value) in map {
            if properties.map_or(false, |p| p.contains_key(name)) {
                continue;
            }
            // Reserved and type fields are owned by the database and the layout
            if path.is_empty() && (name.starts_with('_') || name == self.ctx.type_field) {
                continue;
            }
            match additional {
                Value::Bool(false) => {
                    self.push(&child_path(path, name), "Additional property is not allowed".to_string());
                }
                Value::Object(_) => self.check(additional, prop_value, &child_path(path, name), depth),
                _ => {}
            }
        }
    }

    fn check_array(&mut self, schema: &Map<String, Value>, items: &[Value], path: &str, depth: usize) {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                self.push(path, format!("Expected at least {min} items, got {}", items.len()));
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                self.push(path, format!("Expected at most {max} items, got {}", items.len()));
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                self.check(item_schema, item, &child_path(path, &i.to_string()), depth);
            }
        }
    }

    fn check_string(&mut self, schema: &Map<String, Value>, s: &str, path: &str) {
        let len = s.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if len < min {
                self.push(path, format!("String is shorter than {min} characters"));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                self.push(path, format!("String is longer than {max} characters"));
            }
        }
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(s) {
                        self.push(path, format!("String does not match pattern '{pattern}'"));
                    }
                }
                Err(e) => self.push(path, format!("Invalid pattern '{pattern}': {e}")),
            }
        }
    }

    fn check_number(&mut self, schema: &Map<String, Value>, x: f64, path: &str) {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if x < min {
                self.push(path, format!("Value {x} is less than minimum {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if x > max {
                self.push(path, format!("Value {x} is greater than maximum {max}"));
            }
        }
    }

    /// Resolve `#/definitions/<name>` against the root schema first, then
    /// any bare or prefixed name against the registered layouts.
    fn lookup_ref(&self, reference: &str) -> Option<&'a Value> {
        let name = reference
            .strip_prefix("#/definitions/")
            .unwrap_or(reference);
        let root: &'a Value = self.root;
        let resolver: &'a dyn SchemaResolver = self.ctx.resolver;
        root.get("definitions")
            .and_then(|d| d.get(name))
            .or_else(|| resolver.resolve(name))
    }
}

fn child_path(path: &str, key: &str) -> String {
    format!("{path}/{}", key.replace('~', "~0").replace('/', "~1"))
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.fract() == 0.0),
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "any" => true,
        _ => false,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Default values declared on the top-level `properties` of a schema.
pub fn schema_defaults(schema: &Value) -> Map<String, Value> {
    let mut defaults = Map::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            if let Some(default) = prop.get("default") {
                defaults.insert(name.clone(), default.clone());
            }
        }
    }
    defaults
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_schema() -> Value {
        json!({
            "title": "Article",
            "type": "object",
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "author": { "type": "string" },
                "rating": { "type": "integer", "minimum": 0, "maximum": 5 },
                "status": { "type": "string", "enum": ["draft", "published"], "default": "draft" },
                "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 3 },
                "slug": { "type": "string", "pattern": "^[a-z0-9-]+$" },
                "image": { "$ref": "Image" }
            },
            "required": ["title", "author"],
            "additionalProperties": false
        })
    }

    fn run(schema: &Value, doc: &Value, validate_refs: bool, schemas: &HashMap<String, Value>) -> Vec<Violation> {
        let ctx = ValidationContext::new(schemas, validate_refs, "type_");
        JsonSchemaValidator.validate(schema, doc, &ctx)
    }

    fn check(doc: Value) -> Vec<Violation> {
        run(&article_schema(), &doc, false, &HashMap::new())
    }

    #[test]
    fn test_valid_article() {
        let violations = check(json!({
            "_id": "a1",
            "_rev": "1-abc",
            "type_": "Article",
            "title": "Hello",
            "author": "ann",
            "rating": 4,
            "tags": ["x", "y"]
        }));
        assert!(violations.is_empty(), "Violations: {violations:?}");
    }

    #[test]
    fn test_missing_required() {
        let violations = check(json!({ "type_": "Article", "title": "Hello" }));
        assert_eq!(violations, vec![Violation::new("/author", "Required property is missing")]);
    }

    #[test]
    fn test_wrong_types_are_reported_with_paths() {
        let violations = check(json!({
            "title": "Hello",
            "author": 42,
            "tags": ["ok", 7]
        }));
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"/author"));
        assert!(paths.contains(&"/tags/1"));
    }

    #[test]
    fn test_enum_and_ranges() {
        let violations = check(json!({
            "title": "",
            "author": "ann",
            "rating": 9,
            "status": "archived",
            "tags": ["a", "b", "c", "d"]
        }));
        assert_eq!(violations.len(), 4, "Violations: {violations:?}");
        assert!(violations.iter().any(|v| v.path == "/status"));
        assert!(violations.iter().any(|v| v.path == "/rating"));
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let violations = check(json!({ "title": "t", "author": "a", "rating": 2.5 }));
        assert!(violations.iter().any(|v| v.path == "/rating" && v.message.contains("integer")));
    }

    #[test]
    fn test_pattern() {
        let violations = check(json!({ "title": "t", "author": "a", "slug": "Not A Slug" }));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("pattern"));
    }

    #[test]
    fn test_additional_properties_skip_reserved_fields() {
        let violations = check(json!({
            "_id": "x",
            "_attachments": {},
            "type_": "Article",
            "title": "t",
            "author": "a",
            "extra": true
        }));
        assert_eq!(violations, vec![Violation::new("/extra", "Additional property is not allowed")]);
    }

    #[test]
    fn test_refs_skipped_unless_enabled() {
        let mut schemas = HashMap::new();
        schemas.insert(
            "Image".to_string(),
            json!({ "type": "object", "required": ["url"] }),
        );
        let doc = json!({ "title": "t", "author": "a", "image": { "id_": "img1" } });

        assert!(run(&article_schema(), &doc, false, &schemas).is_empty());

        let violations = run(&article_schema(), &doc, true, &schemas);
        assert_eq!(violations, vec![Violation::new("/image/url", "Required property is missing")]);
    }

    #[test]
    fn test_unresolvable_ref() {
        let doc = json!({ "title": "t", "author": "a", "image": {} });
        let ctx = ValidationContext::new(&NoSchemas, true, "type_");
        let violations = JsonSchemaValidator.validate(&article_schema(), &doc, &ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "/image");
        assert!(violations[0].message.contains("Unresolvable"));
    }

    #[test]
    fn test_local_definitions() {
        let schema = json!({
            "definitions": { "point": { "type": "object", "required": ["x", "y"] } },
            "properties": { "origin": { "$ref": "#/definitions/point" } }
        });
        let violations = run(&schema, &json!({ "origin": { "x": 1 } }), true, &HashMap::new());
        assert_eq!(violations, vec![Violation::new("/origin/y", "Required property is missing")]);
    }

    #[test]
    fn test_recursive_ref_terminates() {
        let schema = json!({
            "definitions": { "loop": { "$ref": "#/definitions/loop" } },
            "properties": { "a": { "$ref": "#/definitions/loop" } }
        });
        let violations = run(&schema, &json!({ "a": 1 }), true, &HashMap::new());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("too deeply"));
    }

    #[test]
    fn test_schema_defaults() {
        let defaults = schema_defaults(&article_schema());
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults["status"], json!("draft"));
    }
}

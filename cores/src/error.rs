use crate::validation::Violation;
use std::fmt;
use thiserror::Error;

/// What a `NotFound` error failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Layout,
    View,
    Document,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Layout => write!(f, "Layout"),
            NotFoundKind::View => write!(f, "View"),
            NotFoundKind::Document => write!(f, "Document"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoresError {
    #[error("Validation failed for '{layout}': {}", join_violations(.violations))]
    SchemaValidation {
        layout: String,
        violations: Vec<Violation>,
    },

    #[error("Doc type does not match layout type: {found} != {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: NotFoundKind, name: String },

    #[error("Document update conflict on '{id}': {reason}")]
    Conflict { id: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoresError {
    pub(crate) fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        CoresError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        CoresError::Configuration {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// HTTP-like status code for this error, for callers that forward
    /// errors to web clients.
    pub fn status_code(&self) -> u16 {
        match self {
            CoresError::SchemaValidation { .. }
            | CoresError::TypeMismatch { .. }
            | CoresError::InvalidDocument(_) => 400,
            CoresError::NotFound { .. } => 404,
            CoresError::Conflict { .. } => 409,
            CoresError::Configuration { .. }
            | CoresError::Database(_)
            | CoresError::Json(_)
            | CoresError::Yaml(_) => 500,
        }
    }

    /// Schema violations carried by validation and configuration errors.
    pub fn violations(&self) -> &[Violation] {
        match self {
            CoresError::SchemaValidation { violations, .. }
            | CoresError::Configuration { violations, .. } => violations,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoresError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoresError::Conflict { .. })
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CoresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = CoresError::not_found(NotFoundKind::View, "titles");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "View not found: titles");

        let err = CoresError::Conflict {
            id: "_design/article".into(),
            reason: "Document update conflict.".into(),
        };
        assert_eq!(err.status_code(), 409);
        assert!(err.is_conflict());
    }

    #[test]
    fn test_validation_message_lists_violations() {
        let err = CoresError::SchemaValidation {
            layout: "Article".into(),
            violations: vec![
                Violation::new("/title", "Required property is missing"),
                Violation::new("/tags", "Expected array, got string"),
            ],
        };
        assert_eq!(err.violations().len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("/title"));
        assert!(msg.contains("/tags"));
    }
}

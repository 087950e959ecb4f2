use crate::config::CoresConfig;
use crate::db::{BulkResult, DocumentRevision, ViewParams, ViewResult};
use crate::design::{self, DesignDocument, SyncOutcome, ALL_VIEW};
use crate::document::Document;
use crate::error::{CoresError, NotFoundKind, Result};
use crate::hooks::{LayoutHooks, NoHooks};
use crate::schema::{check_layout, DesignConfig, LayoutConfig};
use crate::store::Cores;
use crate::validation::{schema_defaults, ValidationContext};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Post-processing applied to a view's result before it reaches the caller.
pub type ViewTransform = Arc<dyn Fn(ViewResult) -> Result<ViewResult> + Send + Sync>;

/// A registered document type: schema, design document, hooks and view
/// transforms. Immutable once registered.
pub struct Layout {
    name: String,
    schema: Value,
    design: DesignDocument,
    hooks: Arc<dyn LayoutHooks>,
    transforms: HashMap<String, ViewTransform>,
}

impl Layout {
    pub fn builder(name: impl Into<String>) -> LayoutBuilder {
        LayoutBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn design(&self) -> &DesignDocument {
        &self.design
    }

    pub(crate) fn hooks(&self) -> &dyn LayoutHooks {
        self.hooks.as_ref()
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("name", &self.name)
            .field("design", &self.design.id)
            .field("views", &self.design.views.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects a layout definition before registration.
pub struct LayoutBuilder {
    name: String,
    config: LayoutConfig,
    hooks: Option<Arc<dyn LayoutHooks>>,
    transforms: HashMap<String, ViewTransform>,
}

impl LayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        LayoutBuilder {
            name: name.into(),
            config: LayoutConfig::default(),
            hooks: None,
            transforms: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Use a parsed definition's schema and design.
    pub fn config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.config.schema = Some(schema);
        self
    }

    pub fn design(mut self, design: DesignConfig) -> Self {
        self.config.design = Some(design);
        self
    }

    pub fn hooks<H: LayoutHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Post-process every result of `view`.
    pub fn transform<F>(mut self, view: impl Into<String>, transform: F) -> Self
    where
        F: Fn(ViewResult) -> Result<ViewResult> + Send + Sync + 'static,
    {
        self.transforms.insert(view.into(), Arc::new(transform));
        self
    }

    pub(crate) fn build(self, config: &CoresConfig) -> Result<Layout> {
        check_layout(&self.name, &self.config)?;

        let design = DesignDocument::for_layout(
            &self.name,
            self.config.design.as_ref(),
            &config.type_field,
        );
        let mut unknown: Vec<&str> = self
            .transforms
            .keys()
            .filter(|view| !design.has_view(view))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(CoresError::config(format!(
                "Layout '{}' has transforms for unknown views: {}",
                self.name,
                unknown.join(", ")
            )));
        }

        Ok(Layout {
            schema: self
                .config
                .schema
                .unwrap_or_else(|| json!({ "type": "object" })),
            design,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
            transforms: self.transforms,
            name: self.name,
        })
    }
}

/// Human-readable rendering of a discriminator for error messages.
pub(crate) fn describe_type(value: Option<&Value>) -> String {
    match value {
        None => "(none)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A handle to a registered layout within a [`Cores`] instance.
/// Provides the document lifecycle operations for that layout.
pub struct LayoutHandle<'a> {
    cores: &'a Cores,
    layout: &'a Layout,
}

impl fmt::Debug for LayoutHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LayoutHandle").field(&self.layout.name).finish()
    }
}

impl<'a> LayoutHandle<'a> {
    pub(crate) fn new(cores: &'a Cores, layout: &'a Layout) -> Self {
        LayoutHandle { cores, layout }
    }

    pub fn name(&self) -> &'a str {
        &self.layout.name
    }

    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    pub fn design(&self) -> &'a DesignDocument {
        &self.layout.design
    }

    fn type_field(&self) -> &'a str {
        &self.cores.config().type_field
    }

    /// A document whose discriminator is set must name this layout; with
    /// `required`, it must also be present.
    fn check_type(&self, doc: &Document, required: bool) -> Result<()> {
        match doc.get(self.type_field()) {
            None if !required => Ok(()),
            Some(Value::String(t)) if t == self.name() => Ok(()),
            other => Err(CoresError::TypeMismatch {
                expected: self.name().to_string(),
                found: describe_type(other),
            }),
        }
    }

    /// Build a new document: schema defaults with `data` merged over
    /// them, tagged with this layout. Nothing is written.
    pub fn create(&self, data: Value) -> Result<Document> {
        let data = match data {
            Value::Null => Document::new(),
            other => Document::from_value(other)?,
        };
        let mut doc = Document::from(schema_defaults(&self.layout.schema));
        doc.merge(data.fields());
        doc.set_type(self.type_field(), self.name());
        self.layout.hooks.create(&mut doc)?;
        Ok(doc)
    }

    /// Check the type tag and validate against the layout schema.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        self.check_type(doc, true)?;

        let schemas = self.cores.schemas();
        let config = self.cores.config();
        let ctx = ValidationContext::new(&schemas, config.validate_refs, &config.type_field);
        let violations = self
            .cores
            .validator()
            .validate(&self.layout.schema, &doc.to_value(), &ctx);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoresError::SchemaValidation {
                layout: self.name().to_string(),
                violations,
            })
        }
    }

    /// Validate and write a document, updating its `_id` and `_rev`.
    ///
    /// A document already tagged with another layout is rejected before
    /// anything else happens; an untagged one is tagged with this layout.
    pub fn save(&self, doc: &mut Document) -> Result<DocumentRevision> {
        self.check_type(doc, false)?;
        doc.set_type(self.type_field(), self.name());
        self.layout.hooks.save(doc)?;
        self.validate(doc)?;

        let written = self.cores.db().insert(doc)?;
        doc.set_id(written.id.clone());
        doc.set_rev(written.rev.clone());
        log::debug!("Saved {} {} at {}", self.name(), written.id, written.rev);
        Ok(written)
    }

    /// Load a document of this layout by id.
    pub fn load(&self, id: &str) -> Result<Document> {
        let mut doc = self.cores.db().get(id)?;
        self.check_type(&doc, true)?;
        self.layout.hooks.load(&mut doc)?;
        Ok(doc)
    }

    /// Delete a document. Both `_id` and `_rev` are required. With
    /// `confirm_type_on_destroy`, the stored document's type is checked
    /// first; otherwise the given document must carry the type tag.
    pub fn destroy(&self, doc: &Document) -> Result<()> {
        self.check_type(doc, false)?;
        let (id, rev) = match (doc.id(), doc.rev()) {
            (Some(id), Some(rev)) => (id, rev),
            _ => {
                return Err(CoresError::InvalidDocument(
                    "Destroy needs an id and rev".to_string(),
                ))
            }
        };

        if self.cores.config().confirm_type_on_destroy {
            let stored = self.cores.db().get(id)?;
            self.check_type(&stored, true)?;
        } else {
            self.check_type(doc, true)?;
        }

        self.layout.hooks.destroy(doc)?;
        self.cores.db().destroy(id, rev)?;
        log::debug!("Destroyed {} {}", self.name(), id);
        Ok(())
    }

    fn query(&self, view: &str, params: &ViewParams) -> Result<ViewResult> {
        let design = &self.layout.design;
        if !design.has_view(view) {
            return Err(CoresError::not_found(
                NotFoundKind::View,
                design::view_path(design.name(), view),
            ));
        }
        log::debug!("Querying {}", design::view_path(design.name(), view));
        self.cores.db().view(design.name(), view, params)
    }

    /// Query one of the layout's views, applying its transform if any.
    pub fn view(&self, view: &str, params: &ViewParams) -> Result<ViewResult> {
        let result = self.query(view, params)?;
        match self.layout.transforms.get(view) {
            Some(transform) => transform(result),
            None => Ok(result),
        }
    }

    /// Every document of this layout, through the `all` view.
    pub fn all(&self) -> Result<Vec<Document>> {
        let result = self.view(ALL_VIEW, &ViewParams::new().with_include_docs(true))?;
        Ok(result.into_docs())
    }

    /// Rewrite the documents of a view in one bulk request.
    ///
    /// `f` receives each row's document and returns its replacement,
    /// which must keep `_id`, `_rev` and this layout's type and must
    /// validate. Defaults to the `all` view with `include_docs`. This
    /// touches every selected document, so the database will reindex
    /// its views for all of them.
    pub fn map<F>(
        &self,
        view: Option<&str>,
        params: Option<ViewParams>,
        mut f: F,
    ) -> Result<Vec<BulkResult>>
    where
        F: FnMut(Document) -> Result<Document>,
    {
        let view = view.unwrap_or(ALL_VIEW);
        let params = params.unwrap_or_else(|| ViewParams::new().with_include_docs(true));
        let result = self.query(view, &params)?;

        let mut docs = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let doc = row.doc.ok_or_else(|| {
                CoresError::InvalidDocument("Map needs view rows with include_docs".to_string())
            })?;
            let mapped = f(doc)?;
            if mapped.id().is_none() {
                return Err(CoresError::InvalidDocument(
                    "Map function result must have an _id".to_string(),
                ));
            }
            if mapped.rev().is_none() {
                return Err(CoresError::InvalidDocument(
                    "Map function result must have a _rev".to_string(),
                ));
            }
            if mapped.doc_type(self.type_field()) != Some(self.name()) {
                return Err(CoresError::InvalidDocument(
                    "Map function result must have correct type".to_string(),
                ));
            }
            self.validate(&mapped)?;
            docs.push(mapped);
        }

        if docs.is_empty() {
            return Ok(Vec::new());
        }
        self.cores.db().bulk(&docs)
    }

    /// Upload this layout's design document.
    pub fn sync(&self) -> Result<SyncOutcome> {
        design::sync(self.cores.db(), &self.layout.design)
    }
}

use crate::config::CoresConfig;
use crate::db::{DatabaseInfo, DocumentDatabase, DocumentRevision, FetchRow, ViewParams, ViewResult};
use crate::design::{design_id, design_name, SyncOutcome};
use crate::document::Document;
use crate::error::{CoresError, NotFoundKind, Result};
use crate::layout::{describe_type, Layout, LayoutBuilder, LayoutHandle};
use crate::refs;
use crate::schema::{LayoutConfig, LayoutDefinitions};
use crate::validation::{JsonSchemaValidator, SchemaResolver, SchemaValidator};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// The main entry point.
/// Holds the database client and the registry of layouts, and provides
/// layout handles for document operations.
pub struct Cores {
    db: Arc<dyn DocumentDatabase>,
    config: CoresConfig,
    validator: Arc<dyn SchemaValidator>,
    layouts: HashMap<String, Layout>,
}

/// Resolves `$ref` names against the schemas of registered layouts.
pub(crate) struct LayoutSchemas<'a>(&'a HashMap<String, Layout>);

impl SchemaResolver for LayoutSchemas<'_> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(Layout::schema)
    }
}

impl fmt::Debug for Cores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cores")
            .field("config", &self.config)
            .field("layouts", &self.layout_names())
            .finish()
    }
}

impl Cores {
    pub fn new(db: Arc<dyn DocumentDatabase>) -> Self {
        Cores::with_config(db, CoresConfig::default())
    }

    pub fn with_config(db: Arc<dyn DocumentDatabase>, config: CoresConfig) -> Self {
        Cores {
            db,
            config,
            validator: Arc::new(JsonSchemaValidator),
            layouts: HashMap::new(),
        }
    }

    /// Build an instance from parsed definitions, registering every layout
    /// and syncing its design.
    pub fn open(db: Arc<dyn DocumentDatabase>, definitions: LayoutDefinitions) -> Result<Self> {
        let mut cores = Cores::with_config(db, definitions.config);
        cores.create_layouts(definitions.layouts)?;
        Ok(cores)
    }

    /// Replace the schema validator.
    pub fn with_validator<V: SchemaValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(&self) -> &CoresConfig {
        &self.config
    }

    pub fn db(&self) -> &dyn DocumentDatabase {
        self.db.as_ref()
    }

    pub(crate) fn validator(&self) -> &dyn SchemaValidator {
        self.validator.as_ref()
    }

    pub(crate) fn schemas(&self) -> LayoutSchemas<'_> {
        LayoutSchemas(&self.layouts)
    }

    /// Registered layout names, sorted.
    pub fn layout_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layouts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get a handle to a registered layout.
    pub fn layout(&self, name: &str) -> Result<LayoutHandle<'_>> {
        self.layouts
            .get(name)
            .map(|layout| LayoutHandle::new(self, layout))
            .ok_or_else(|| CoresError::not_found(NotFoundKind::Layout, name))
    }

    fn prepare(&self, builder: LayoutBuilder) -> Result<Layout> {
        if self.layouts.contains_key(builder.name()) {
            return Err(CoresError::config(format!(
                "Layout '{}' is already registered",
                builder.name()
            )));
        }
        let design = design_name(builder.name());
        if let Some(taken) = self.layouts.keys().find(|name| design_name(name) == design) {
            return Err(CoresError::config(format!(
                "Layout '{}' would share design '{}' with layout '{taken}'",
                builder.name(),
                design_id(&design)
            )));
        }
        builder.build(&self.config)
    }

    /// Register a layout without touching the database.
    pub fn register_layout(&mut self, builder: LayoutBuilder) -> Result<LayoutHandle<'_>> {
        let layout = self.prepare(builder)?;
        let name = layout.name().to_string();
        log::info!("Registered layout {name}");
        self.layouts.insert(name.clone(), layout);
        self.layout(&name)
    }

    /// Register a layout and sync its design document. The layout is only
    /// registered if the sync succeeds.
    pub fn create_layout(&mut self, builder: LayoutBuilder) -> Result<SyncOutcome> {
        let layout = self.prepare(builder)?;
        let outcome = crate::design::sync(self.db(), layout.design())?;
        log::info!("Registered layout {}", layout.name());
        self.layouts.insert(layout.name().to_string(), layout);
        Ok(outcome)
    }

    /// Register and sync every definition, in name order. Stops at the
    /// first error; layouts created before it stay registered.
    pub fn create_layouts(
        &mut self,
        definitions: BTreeMap<String, LayoutConfig>,
    ) -> Result<Vec<(String, SyncOutcome)>> {
        let mut outcomes = Vec::with_capacity(definitions.len());
        for (name, config) in definitions {
            let outcome = self.create_layout(LayoutBuilder::new(name.clone()).config(config))?;
            outcomes.push((name, outcome));
        }
        Ok(outcomes)
    }

    /// Sync the design of every registered layout, in name order.
    pub fn sync_all(&self) -> Result<Vec<(String, SyncOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.layouts.len());
        for name in self.layout_names() {
            let outcome = self.layout(name)?.sync()?;
            outcomes.push((name.to_string(), outcome));
        }
        Ok(outcomes)
    }

    // ── Model API: dispatch by discriminator ────────────────────────

    /// The string discriminator of a document.
    fn discriminator<'d>(&self, doc: &'d Document) -> Result<&'d str> {
        match doc.get(&self.config.type_field) {
            Some(Value::String(name)) => Ok(name),
            other => Err(CoresError::TypeMismatch {
                expected: format!("a layout name in '{}'", self.config.type_field),
                found: describe_type(other),
            }),
        }
    }

    fn handle_for(&self, doc: &Document) -> Result<LayoutHandle<'_>> {
        let name = self.discriminator(doc)?;
        self.layout(name)
    }

    pub fn create(&self, layout: &str, data: Value) -> Result<Document> {
        self.layout(layout)?.create(data)
    }

    /// Validate a document against the schema of the layout it names.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        self.handle_for(doc)?.validate(doc)
    }

    pub fn save(&self, doc: &mut Document) -> Result<DocumentRevision> {
        let handle = self.handle_for(doc)?;
        handle.save(doc)
    }

    /// Load any typed document. The `load` hook runs when its layout is
    /// registered here.
    pub fn load(&self, id: &str) -> Result<Document> {
        let mut doc = self.db.get(id)?;
        let name = self.discriminator(&doc)?.to_string();
        if let Some(layout) = self.layouts.get(&name) {
            layout.hooks().load(&mut doc)?;
        }
        Ok(doc)
    }

    pub fn destroy(&self, doc: &Document) -> Result<()> {
        self.handle_for(doc)?.destroy(doc)
    }

    pub fn view(&self, layout: &str, view: &str, params: &ViewParams) -> Result<ViewResult> {
        self.layout(layout)?.view(view, params)
    }

    // ── Database passthroughs ───────────────────────────────────────

    pub fn fetch(&self, keys: &[String]) -> Result<Vec<FetchRow>> {
        self.db.fetch(keys)
    }

    pub fn fetch_refs(&self, docs: &mut [Document], deep: bool) -> Result<()> {
        refs::fetch_refs(self.db(), docs, deep)
    }

    pub fn fetch_refs_one(&self, doc: &mut Document, deep: bool) -> Result<()> {
        refs::fetch_refs(self.db(), std::slice::from_mut(doc), deep)
    }

    pub fn uuids(&self, count: usize) -> Result<Vec<String>> {
        self.db.uuids(count)
    }

    pub fn info(&self) -> Result<DatabaseInfo> {
        self.db.info()
    }
}

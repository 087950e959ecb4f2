pub mod config;
pub mod db;
pub mod design;
pub mod document;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod refs;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::CoresConfig;
pub use db::{DocumentDatabase, MemoryDatabase, ViewParams, ViewResult};
pub use design::{DesignDocument, SyncOutcome};
pub use document::Document;
pub use error::{CoresError, NotFoundKind, Result};
pub use hooks::LayoutHooks;
pub use layout::{Layout, LayoutBuilder, LayoutHandle};
pub use schema::LayoutDefinitions;
pub use store::Cores;
pub use validation::Violation;

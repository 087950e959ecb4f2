use crate::document::Document;
use crate::error::Result;

/// Lifecycle callbacks attached to a layout.
///
/// Every method defaults to a no-op. `create`, `save` and `load` may
/// rewrite the document; an error from any hook aborts the operation
/// before the database is touched (for `load`, before the document is
/// handed to the caller).
pub trait LayoutHooks: Send + Sync {
    /// Runs on a freshly created document, after defaults and the type tag.
    fn create(&self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Runs before validation on every save.
    fn save(&self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Runs on every loaded document.
    fn load(&self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Runs before the delete request.
    fn destroy(&self, _doc: &Document) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl LayoutHooks for NoHooks {}

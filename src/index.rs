//! Ordered element index for the active navigation mode.

use crate::browser::{BrowserDriver, ElementHandle, ElementQuery, PageHandle};
use crate::errors::ReaderResult;
use crate::state::NavigationMode;

/// The ordered list of elements the cursor walks, recomputed per action so
/// it always reflects the live document.
#[derive(Clone, Debug)]
pub struct ElementIndex {
    handles: Vec<ElementHandle>,
}

/// Map the session mode to a driver query.
pub fn query_for(mode: NavigationMode, heading_level: Option<u8>) -> ElementQuery {
    match mode {
        NavigationMode::All => ElementQuery::Focusable,
        NavigationMode::Headings => ElementQuery::Headings {
            level: heading_level,
        },
        NavigationMode::Landmarks => ElementQuery::Landmarks,
    }
}

impl ElementIndex {
    /// Query the population for `mode` in document order. Empty is a valid
    /// outcome; callers check length before indexing.
    pub async fn compute(
        driver: &dyn BrowserDriver,
        page: PageHandle,
        mode: NavigationMode,
        heading_level: Option<u8>,
    ) -> ReaderResult<Self> {
        let handles = driver.query(page, query_for(mode, heading_level)).await?;
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ElementHandle> {
        self.handles.get(index).copied()
    }

    /// Largest valid cursor position for `index`, for re-clamping a stale
    /// cursor after the page changed under it. Only meaningful when
    /// non-empty.
    pub fn clamp(&self, index: usize) -> usize {
        index.min(self.handles.len().saturating_sub(1))
    }
}

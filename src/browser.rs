//! Browser driver capability seam.
//!
//! The core consumes a small async interface: navigate, query elements by
//! population, snapshot one element, read visible text, click, scroll. A
//! production driver (CDP, WebDriver) implements [`BrowserDriver`] out of
//! tree; the bundled [`StaticBrowser`] serves tests and the demo REPL.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::errors::{ReaderError, ReaderResult};

/// Opaque handle to an open page. Valid until the next navigation or close.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageHandle(pub u64);

/// Opaque handle to a live element. Valid only until the next navigation or
/// DOM mutation; never cached across turns except as the short-lived
/// last-element reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ElementHandle(pub u64);

/// Element populations the core navigates over.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElementQuery {
    /// Links with href, enabled form controls, explicit tabindex, and
    /// interactive ARIA roles.
    Focusable,
    /// h1..h6, optionally a single level.
    Headings { level: Option<u8> },
    /// ARIA landmark roles and HTML5 sectioning tags.
    Landmarks,
}

/// Accessibility-relevant attributes of one element, captured at query time.
#[derive(Clone, Debug, Default)]
pub struct ElementSnapshot {
    pub tag: String,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    pub input_type: Option<String>,
    pub value: Option<String>,
    pub text: String,
    pub href: Option<String>,
    pub heading_level: Option<u8>,
    pub required: bool,
    pub disabled: bool,
    pub expanded: Option<bool>,
    pub checked: Option<bool>,
    pub described_by: Option<String>,
    pub aria_hidden: bool,
}

/// The external browser capability the core calls, never implements.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open `url`, bounded by `timeout`. Returns a fresh page handle; prior
    /// handles from this driver are invalidated.
    async fn navigate(&self, url: &Url, timeout: Duration) -> ReaderResult<PageHandle>;

    /// All elements matching `query` in document order, excluding anything
    /// marked `aria-hidden`. An empty result is a valid outcome.
    async fn query(&self, page: PageHandle, query: ElementQuery)
        -> ReaderResult<Vec<ElementHandle>>;

    async fn snapshot(&self, element: ElementHandle) -> ReaderResult<ElementSnapshot>;

    /// Visible text blocks in document order, excluding aria-hidden subtrees.
    async fn visible_text(&self, page: PageHandle) -> ReaderResult<Vec<String>>;

    async fn click(&self, element: ElementHandle) -> ReaderResult<()>;

    async fn scroll_into_view(&self, element: ElementHandle) -> ReaderResult<()>;

    async fn title(&self, page: PageHandle) -> ReaderResult<String>;

    async fn close(&self) -> ReaderResult<()>;
}

/// One element of a static fixture page.
#[derive(Clone, Debug)]
pub struct StaticElement {
    pub snapshot: ElementSnapshot,
    pub focusable: bool,
    pub landmark: bool,
}

impl StaticElement {
    pub fn link(text: &str, href: &str) -> Self {
        Self {
            snapshot: ElementSnapshot {
                tag: "a".into(),
                text: text.into(),
                href: Some(href.into()),
                ..Default::default()
            },
            focusable: true,
            landmark: false,
        }
    }

    pub fn button(text: &str) -> Self {
        Self {
            snapshot: ElementSnapshot {
                tag: "button".into(),
                text: text.into(),
                ..Default::default()
            },
            focusable: true,
            landmark: false,
        }
    }

    pub fn input(input_type: &str, aria_label: &str) -> Self {
        Self {
            snapshot: ElementSnapshot {
                tag: "input".into(),
                input_type: Some(input_type.into()),
                aria_label: Some(aria_label.into()),
                ..Default::default()
            },
            focusable: true,
            landmark: false,
        }
    }

    pub fn heading(level: u8, text: &str) -> Self {
        Self {
            snapshot: ElementSnapshot {
                tag: format!("h{level}"),
                heading_level: Some(level),
                text: text.into(),
                ..Default::default()
            },
            focusable: false,
            landmark: false,
        }
    }

    /// A heading that links somewhere, as article headlines usually do.
    pub fn headline(level: u8, text: &str, href: &str) -> Self {
        let mut element = Self::heading(level, text);
        element.snapshot.href = Some(href.into());
        element
    }

    pub fn landmark(role: &str, tag: &str, text: &str) -> Self {
        Self {
            snapshot: ElementSnapshot {
                tag: tag.into(),
                role: Some(role.into()),
                text: text.into(),
                ..Default::default()
            },
            focusable: false,
            landmark: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.snapshot.aria_hidden = true;
        self
    }
}

/// One fixture page served by [`StaticBrowser`].
#[derive(Clone, Debug, Default)]
pub struct StaticPage {
    pub host: String,
    pub title: String,
    pub elements: Vec<StaticElement>,
    pub text_blocks: Vec<String>,
}

impl StaticPage {
    pub fn new(host: &str, title: &str) -> Self {
        Self {
            host: host.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_element(mut self, element: StaticElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_text(mut self, block: &str) -> Self {
        self.text_blocks.push(block.into());
        self
    }
}

/// Offline in-memory driver. Pages are registered by host name; navigation
/// to an unknown host fails the way a DNS error would.
pub struct StaticBrowser {
    pages: Vec<StaticPage>,
    open: Mutex<Option<usize>>,
    clicked: Mutex<Vec<ElementHandle>>,
}

impl StaticBrowser {
    pub fn new(pages: Vec<StaticPage>) -> Self {
        Self {
            pages,
            open: Mutex::new(None),
            clicked: Mutex::new(Vec::new()),
        }
    }

    /// A small demo site for the REPL and tests.
    pub fn with_sample_site() -> Self {
        let home = StaticPage::new("example.com", "Example Domain")
            .with_element(StaticElement::landmark("banner", "header", "Example Domain"))
            .with_element(StaticElement::heading(1, "Example Domain"))
            .with_element(StaticElement::landmark(
                "main",
                "main",
                "This domain is for use in illustrative examples in documents.",
            ))
            .with_element(StaticElement::headline(
                2,
                "Reserved domains and how they keep documentation honest",
                "https://example.com/reserved",
            ))
            .with_element(StaticElement::link("More information", "https://example.com/more"))
            .with_element(StaticElement::button("Subscribe"))
            .with_element(StaticElement::input("email", "Email address"))
            .with_element(StaticElement::landmark("contentinfo", "footer", "About this site"))
            .with_text("This domain is for use in illustrative examples in documents.")
            .with_text("You may use this domain in literature without prior coordination.");
        Self::new(vec![home])
    }

    /// Handles retired by dropping the page index; all handles from a
    /// previous navigation stop resolving.
    fn encode(page: usize, element: usize) -> ElementHandle {
        ElementHandle(((page as u64) << 32) | element as u64)
    }

    fn decode(&self, handle: ElementHandle) -> ReaderResult<&StaticElement> {
        let page = (handle.0 >> 32) as usize;
        let index = (handle.0 & 0xffff_ffff) as usize;
        let open = *self.open.lock();
        if open != Some(page) {
            return Err(ReaderError::Browser("stale element handle".into()));
        }
        self.pages
            .get(page)
            .and_then(|p| p.elements.get(index))
            .ok_or_else(|| ReaderError::Browser("unknown element handle".into()))
    }

    fn open_page(&self, handle: PageHandle) -> ReaderResult<&StaticPage> {
        let index = handle.0 as usize;
        if *self.open.lock() != Some(index) {
            return Err(ReaderError::Browser("stale page handle".into()));
        }
        self.pages
            .get(index)
            .ok_or_else(|| ReaderError::Browser("unknown page handle".into()))
    }

    /// Elements clicked so far, for assertions.
    pub fn clicked(&self) -> Vec<ElementHandle> {
        self.clicked.lock().clone()
    }

    fn matches(element: &StaticElement, query: ElementQuery) -> bool {
        if element.snapshot.aria_hidden {
            return false;
        }
        match query {
            ElementQuery::Focusable => element.focusable && !element.snapshot.disabled,
            ElementQuery::Headings { level } => match element.snapshot.heading_level {
                Some(l) => level.map_or(true, |wanted| l == wanted),
                None => false,
            },
            ElementQuery::Landmarks => element.landmark,
        }
    }
}

#[async_trait]
impl BrowserDriver for StaticBrowser {
    async fn navigate(&self, url: &Url, _timeout: Duration) -> ReaderResult<PageHandle> {
        let host = url.host_str().unwrap_or_default();
        let index = self
            .pages
            .iter()
            .position(|p| p.host == host)
            .ok_or_else(|| ReaderError::Navigation {
                url: url.to_string(),
                cause: "host not reachable".into(),
            })?;
        *self.open.lock() = Some(index);
        Ok(PageHandle(index as u64))
    }

    async fn query(
        &self,
        page: PageHandle,
        query: ElementQuery,
    ) -> ReaderResult<Vec<ElementHandle>> {
        let fixture = self.open_page(page)?;
        Ok(fixture
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| Self::matches(e, query))
            .map(|(i, _)| Self::encode(page.0 as usize, i))
            .collect())
    }

    async fn snapshot(&self, element: ElementHandle) -> ReaderResult<ElementSnapshot> {
        Ok(self.decode(element)?.snapshot.clone())
    }

    async fn visible_text(&self, page: PageHandle) -> ReaderResult<Vec<String>> {
        Ok(self.open_page(page)?.text_blocks.clone())
    }

    async fn click(&self, element: ElementHandle) -> ReaderResult<()> {
        self.decode(element)?;
        self.clicked.lock().push(element);
        Ok(())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> ReaderResult<()> {
        self.decode(element)?;
        Ok(())
    }

    async fn title(&self, page: PageHandle) -> ReaderResult<String> {
        Ok(self.open_page(page)?.title.clone())
    }

    async fn close(&self) -> ReaderResult<()> {
        *self.open.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> StaticBrowser {
        StaticBrowser::with_sample_site()
    }

    #[tokio::test]
    async fn navigation_to_unknown_host_fails() {
        let b = browser();
        let url = Url::parse("https://nowhere.invalid").unwrap();
        let err = b.navigate(&url, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ReaderError::Navigation { .. }));
    }

    #[tokio::test]
    async fn focusable_query_excludes_headings_and_landmarks() {
        let b = browser();
        let url = Url::parse("https://example.com").unwrap();
        let page = b.navigate(&url, Duration::from_secs(1)).await.unwrap();
        let focusable = b.query(page, ElementQuery::Focusable).await.unwrap();
        assert_eq!(focusable.len(), 3);
        let snap = b.snapshot(focusable[0]).await.unwrap();
        assert_eq!(snap.tag, "a");
    }

    #[tokio::test]
    async fn heading_query_filters_by_level() {
        let b = browser();
        let url = Url::parse("https://example.com").unwrap();
        let page = b.navigate(&url, Duration::from_secs(1)).await.unwrap();
        let all = b
            .query(page, ElementQuery::Headings { level: None })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let h1 = b
            .query(page, ElementQuery::Headings { level: Some(1) })
            .await
            .unwrap();
        assert_eq!(h1.len(), 1);
    }

    #[tokio::test]
    async fn hidden_elements_are_excluded() {
        let page = StaticPage::new("a.test", "A")
            .with_element(StaticElement::button("visible"))
            .with_element(StaticElement::button("invisible").hidden());
        let b = StaticBrowser::new(vec![page]);
        let url = Url::parse("https://a.test").unwrap();
        let handle = b.navigate(&url, Duration::from_secs(1)).await.unwrap();
        let found = b.query(handle, ElementQuery::Focusable).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn handles_go_stale_after_close() {
        let b = browser();
        let url = Url::parse("https://example.com").unwrap();
        let page = b.navigate(&url, Duration::from_secs(1)).await.unwrap();
        let elements = b.query(page, ElementQuery::Focusable).await.unwrap();
        b.close().await.unwrap();
        assert!(b.snapshot(elements[0]).await.is_err());
        assert!(b.title(page).await.is_err());
    }
}

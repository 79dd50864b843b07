//! Session navigation state.
//!
//! `NavigationState` is the single mutable object a reader session owns. It
//! is written only by the executor between or after steps; handlers read it
//! and return [`StateUpdates`] describing the writes they want applied.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::{ElementHandle, PageHandle};
use crate::errors::{ReaderError, ReaderResult};

/// Which element population the cursor walks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum NavigationMode {
    #[default]
    All,
    Headings,
    Landmarks,
}

impl NavigationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMode::All => "all elements",
            NavigationMode::Headings => "headings",
            NavigationMode::Landmarks => "landmarks",
        }
    }
}

/// One cached headline, produced by `list_headlines` and consumed by
/// `goto_headline`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Headline {
    pub index: usize,
    pub text: String,
    pub href: Option<String>,
}

/// Cheap structural summary of the current page. Presence of a context
/// lowers the classification confidence threshold.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageContext {
    pub title: String,
    pub page_type: String,
    pub heading_count: usize,
    pub landmark_count: usize,
    pub interactive_count: usize,
}

/// Append-only record of one executed action, kept for failure diagnosis.
#[derive(Clone, Debug)]
pub struct ExecutionRecord {
    pub action: String,
    pub outcome: String,
    pub succeeded: bool,
    pub at: DateTime<Utc>,
}

/// The mutable backbone of a reader session.
#[derive(Debug)]
pub struct NavigationState {
    pub current_url: Option<Url>,
    pub page: Option<PageHandle>,
    pub mode: NavigationMode,
    pub heading_level: Option<u8>,
    /// 0-based cursor into the active element index. Only meaningful when
    /// that index is non-empty.
    pub cursor_index: usize,
    /// Short-lived handle to the most recently focused element. Valid only
    /// until the next navigation.
    pub last_element: Option<ElementHandle>,
    /// Consecutive failures at the current task.
    pub attempts: u32,
    pub headlines: Vec<Headline>,
    pub page_context: Option<PageContext>,
    history: VecDeque<ExecutionRecord>,
    history_cap: usize,
}

impl NavigationState {
    pub fn new(history_cap: usize) -> Self {
        Self {
            current_url: None,
            page: None,
            mode: NavigationMode::All,
            heading_level: None,
            cursor_index: 0,
            last_element: None,
            attempts: 0,
            headlines: Vec::new(),
            page_context: None,
            history: VecDeque::new(),
            history_cap,
        }
    }

    /// Append one execution record, evicting the oldest past the cap.
    pub fn record(&mut self, action: &str, outcome: &str, succeeded: bool) {
        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(ExecutionRecord {
            action: action.to_string(),
            outcome: outcome.to_string(),
            succeeded,
            at: Utc::now(),
        });
    }

    /// The most recent `n` records, oldest first.
    pub fn recent_history(&self, n: usize) -> impl Iterator<Item = &ExecutionRecord> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Reset everything back to the pre-navigation initial values. History
    /// is dropped too; the session is as if freshly created.
    pub fn reset(&mut self) {
        let cap = self.history_cap;
        *self = NavigationState::new(cap);
    }
}

/// Mutable `NavigationState` fields a handler may write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateField {
    CurrentUrl,
    Page,
    Mode,
    HeadingLevel,
    CursorIndex,
    LastElement,
    Headlines,
    PageContext,
}

/// Writes a handler wants applied to `NavigationState`.
///
/// Handlers never mutate the state directly. The executor applies updates
/// after a single task, or merges sibling updates after a parallel group;
/// merging fails when two siblings wrote the same field, which the planner's
/// disjointness rule is supposed to make impossible.
#[derive(Clone, Debug, Default)]
pub struct StateUpdates {
    pub current_url: Option<Url>,
    pub page: Option<PageHandle>,
    pub mode: Option<NavigationMode>,
    pub heading_level: Option<Option<u8>>,
    pub cursor_index: Option<usize>,
    pub last_element: Option<Option<ElementHandle>>,
    pub headlines: Option<Vec<Headline>>,
    pub page_context: Option<Option<PageContext>>,
}

impl StateUpdates {
    /// The full reset every successful navigation applies.
    pub fn for_navigation(url: Url, page: PageHandle) -> Self {
        Self {
            current_url: Some(url),
            page: Some(page),
            mode: Some(NavigationMode::All),
            heading_level: Some(None),
            cursor_index: Some(0),
            last_element: Some(None),
            headlines: Some(Vec::new()),
            page_context: Some(None),
        }
    }

    /// Fields this update set writes.
    pub fn fields(&self) -> Vec<StateField> {
        let mut out = Vec::new();
        if self.current_url.is_some() {
            out.push(StateField::CurrentUrl);
        }
        if self.page.is_some() {
            out.push(StateField::Page);
        }
        if self.mode.is_some() {
            out.push(StateField::Mode);
        }
        if self.heading_level.is_some() {
            out.push(StateField::HeadingLevel);
        }
        if self.cursor_index.is_some() {
            out.push(StateField::CursorIndex);
        }
        if self.last_element.is_some() {
            out.push(StateField::LastElement);
        }
        if self.headlines.is_some() {
            out.push(StateField::Headlines);
        }
        if self.page_context.is_some() {
            out.push(StateField::PageContext);
        }
        out
    }

    /// Merge sibling updates from one parallel group. Overlapping writes are
    /// an invariant violation, not a race to arbitrate.
    pub fn merge(mut self, other: StateUpdates) -> ReaderResult<StateUpdates> {
        let mine = self.fields();
        if let Some(clash) = other.fields().iter().find(|f| mine.contains(f)) {
            return Err(ReaderError::Planning(format!(
                "parallel tasks wrote the same state field: {clash:?}"
            )));
        }
        if other.current_url.is_some() {
            self.current_url = other.current_url;
        }
        if other.page.is_some() {
            self.page = other.page;
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.heading_level.is_some() {
            self.heading_level = other.heading_level;
        }
        if other.cursor_index.is_some() {
            self.cursor_index = other.cursor_index;
        }
        if other.last_element.is_some() {
            self.last_element = other.last_element;
        }
        if other.headlines.is_some() {
            self.headlines = other.headlines;
        }
        if other.page_context.is_some() {
            self.page_context = other.page_context;
        }
        Ok(self)
    }

    pub fn apply(self, state: &mut NavigationState) {
        if let Some(url) = self.current_url {
            state.current_url = Some(url);
        }
        if let Some(page) = self.page {
            state.page = Some(page);
        }
        if let Some(mode) = self.mode {
            state.mode = mode;
        }
        if let Some(level) = self.heading_level {
            state.heading_level = level;
        }
        if let Some(index) = self.cursor_index {
            state.cursor_index = index;
        }
        if let Some(element) = self.last_element {
            state.last_element = element;
        }
        if let Some(headlines) = self.headlines {
            state.headlines = headlines;
        }
        if let Some(context) = self.page_context {
            state.page_context = context;
        }
    }
}

//! Action handlers and their registry.
//!
//! Every user-facing action from the vocabulary maps to one handler. The
//! registry is an explicit table built once at startup; there is no dynamic
//! registration. Handlers read `NavigationState` and return the writes they
//! want applied, they never mutate shared state themselves.

pub mod interaction;
pub mod landmarks;
pub mod navigation;
pub mod reading;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{BrowserDriver, PageHandle};
use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::intent::Action;
use crate::state::{NavigationState, StateField, StateUpdates};

/// What a planned task executes: a vocabulary action, or the internal page
/// analysis that refreshes the session's page context.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskKind {
    Act(Action),
    PageAnalysis,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Act(action) => action.as_str(),
            TaskKind::PageAnalysis => "page_analysis",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler may read while running.
pub struct ActionContext<'a> {
    pub state: &'a NavigationState,
    pub payload: Option<&'a str>,
    pub driver: &'a dyn BrowserDriver,
    pub config: &'a ReaderConfig,
}

impl ActionContext<'_> {
    /// The open page, or the guidance error for actions that need one.
    pub fn page(&self) -> ReaderResult<PageHandle> {
        self.state.page.ok_or(ReaderError::NoPageOpen)
    }

    pub fn payload_text(&self) -> Option<&str> {
        self.payload.map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Result of one handler run: a spoken message, structured output for the
/// tool surface, and the state writes to apply.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub message: String,
    pub output: Value,
    pub updates: StateUpdates,
}

impl ActionOutcome {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
            output: Value::Null,
            updates: StateUpdates::default(),
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_updates(mut self, updates: StateUpdates) -> Self {
        self.updates = updates;
        self
    }
}

/// One executable action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Whether this handler may share a parallel group with others.
    fn can_parallel(&self) -> bool {
        false
    }

    /// State fields this handler may write. The planner uses this for its
    /// static disjointness check on parallel groups.
    fn writes(&self) -> &'static [StateField] {
        &[]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome>;
}

/// Explicit action-name to handler table.
pub struct ActionRegistry {
    handlers: HashMap<TaskKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// The full standard table. The vocabulary enum is the single source of
    /// truth; a missing entry here fails the registry's own tests.
    pub fn standard() -> Self {
        let mut handlers: HashMap<TaskKind, Arc<dyn ActionHandler>> = HashMap::new();
        handlers.insert(
            TaskKind::Act(Action::Navigate),
            Arc::new(navigation::NavigateHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::NextElement),
            Arc::new(navigation::NextElementHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::PreviousElement),
            Arc::new(navigation::PreviousElementHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ReadCurrent),
            Arc::new(reading::ReadCurrentHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ListHeadings),
            Arc::new(reading::ListHeadingsHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ListHeadlines),
            Arc::new(reading::ListHeadlinesHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::GotoHeadline),
            Arc::new(reading::GotoHeadlineHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::FindText),
            Arc::new(reading::FindTextHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ReadSection),
            Arc::new(reading::ReadSectionHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::NavigateLandmarks),
            Arc::new(landmarks::NavigateLandmarksHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::NavigateHeadings),
            Arc::new(landmarks::NavigateHeadingsHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ChangeHeadingLevel),
            Arc::new(landmarks::ChangeHeadingLevelHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::GotoLandmark),
            Arc::new(landmarks::GotoLandmarkHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ListLandmarks),
            Arc::new(landmarks::ListLandmarksHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::ClickElement),
            Arc::new(interaction::ClickElementHandler),
        );
        handlers.insert(
            TaskKind::Act(Action::CheckElement),
            Arc::new(interaction::CheckElementHandler),
        );
        handlers.insert(TaskKind::PageAnalysis, Arc::new(navigation::PageAnalysisHandler));
        Self { handlers }
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vocabulary_action_has_a_handler() {
        let registry = ActionRegistry::standard();
        for action in Action::ALL {
            assert!(
                registry.get(TaskKind::Act(action)).is_some(),
                "missing handler for {action}"
            );
        }
        assert!(registry.get(TaskKind::PageAnalysis).is_some());
    }

    #[test]
    fn parallel_handlers_declare_their_writes() {
        let registry = ActionRegistry::standard();
        let analysis = registry.get(TaskKind::PageAnalysis).unwrap();
        assert!(analysis.can_parallel());
        assert_eq!(analysis.writes(), &[StateField::PageContext]);
    }
}

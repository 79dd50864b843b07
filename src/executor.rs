//! Plan execution against the action registry.
//!
//! The executor is the sole writer of `NavigationState`. Parallel groups fan
//! out and always await every sibling; their state updates merge atomically
//! after the join, and an overlapping write is an invariant violation that
//! fails the whole turn.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};
use webreader_core_types::TaskId;

use crate::actions::{ActionContext, ActionOutcome, ActionRegistry};
use crate::browser::BrowserDriver;
use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::planner::{PlanStep, Task, TurnPlan};
use crate::state::{NavigationState, StateUpdates};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Pending,
    Succeeded,
    /// Failed locally but converted to user guidance; no retry.
    Recovered,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TaskStatus {
    pub state: TaskState,
    pub error: Option<String>,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self {
            state: TaskState::Pending,
            error: None,
        }
    }
}

/// Outcome of one plan step.
#[derive(Debug, Default)]
pub struct StepResult {
    pub messages: Vec<String>,
    pub outputs: Vec<(TaskId, Value)>,
    /// First systemic failure in the step, if any.
    pub failure: Option<(TaskId, ReaderError)>,
}

impl StepResult {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    driver: Arc<dyn BrowserDriver>,
    config: Arc<ReaderConfig>,
}

impl ActionExecutor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        driver: Arc<dyn BrowserDriver>,
        config: Arc<ReaderConfig>,
    ) -> Self {
        Self {
            registry,
            driver,
            config,
        }
    }

    /// Execute one plan step, applying state updates and recording statuses.
    pub async fn execute_step(
        &self,
        plan: &TurnPlan,
        step: &PlanStep,
        state: &mut NavigationState,
        status: &mut HashMap<TaskId, TaskStatus>,
    ) -> ReaderResult<StepResult> {
        match step {
            PlanStep::Single(id) => {
                let task = self.task(plan, id)?;
                let outcome = self.run_task(task, state).await;
                let mut result = StepResult::default();
                let mut updates = StateUpdates::default();
                self.settle(task, outcome, state, status, &mut result, &mut updates);
                updates.apply(state);
                Ok(result)
            }
            PlanStep::Parallel(ids) => {
                let tasks: Vec<&Task> = ids
                    .iter()
                    .map(|id| self.task(plan, id))
                    .collect::<ReaderResult<_>>()?;
                let shared: &NavigationState = state;
                let outcomes = join_all(
                    tasks
                        .iter()
                        .map(|task| async move { self.run_task(task, shared).await }),
                )
                .await;

                let mut result = StepResult::default();
                let mut merged = StateUpdates::default();
                for (task, outcome) in tasks.into_iter().zip(outcomes) {
                    self.settle(task, outcome, state, status, &mut result, &mut merged);
                }
                merged.apply(state);
                Ok(result)
            }
        }
    }

    fn task<'p>(&self, plan: &'p TurnPlan, id: &TaskId) -> ReaderResult<&'p Task> {
        plan.task(id)
            .ok_or_else(|| ReaderError::Planning(format!("plan references unknown task {id}")))
    }

    async fn run_task(
        &self,
        task: &Task,
        state: &NavigationState,
    ) -> ReaderResult<ActionOutcome> {
        let handler = self
            .registry
            .get(task.kind)
            .ok_or_else(|| ReaderError::Planning(format!("no handler for {}", task.kind)))?;
        debug!(task = %task.id, kind = %task.kind, "executing task");
        handler
            .run(ActionContext {
                state,
                payload: task.payload.as_deref(),
                driver: self.driver.as_ref(),
                config: self.config.as_ref(),
            })
            .await
    }

    /// Fold one task outcome into the step result. Updates are collected
    /// rather than applied so parallel siblings merge first. A merge
    /// conflict is a planning bug and fails the turn.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        task: &Task,
        outcome: ReaderResult<ActionOutcome>,
        state: &mut NavigationState,
        status: &mut HashMap<TaskId, TaskStatus>,
        result: &mut StepResult,
        merged: &mut StateUpdates,
    ) {
        let entry = status.entry(task.id.clone()).or_default();
        match outcome {
            Ok(outcome) => {
                state.record(task.kind.as_str(), &outcome.message, true);
                entry.state = TaskState::Succeeded;
                if !outcome.message.is_empty() {
                    result.messages.push(outcome.message);
                }
                if !outcome.output.is_null() {
                    result.outputs.push((task.id.clone(), outcome.output));
                }
                match std::mem::take(merged).merge(outcome.updates) {
                    Ok(combined) => *merged = combined,
                    Err(conflict) => {
                        entry.state = TaskState::Failed;
                        entry.error = Some(conflict.to_string());
                        result.failure = result
                            .failure
                            .take()
                            .or(Some((task.id.clone(), conflict)));
                    }
                }
            }
            Err(error) if error.is_recoverable() => {
                let message = error.user_message();
                state.record(task.kind.as_str(), &message, false);
                entry.state = TaskState::Recovered;
                entry.error = Some(error.to_string());
                result.messages.push(message);
            }
            Err(error) => {
                warn!(task = %task.id, kind = %task.kind, %error, "task failed");
                state.record(task.kind.as_str(), &error.to_string(), false);
                entry.state = TaskState::Failed;
                entry.error = Some(error.to_string());
                result.failure = result.failure.take().or(Some((task.id.clone(), error)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StaticBrowser;
    use crate::intent::{Action, ClassifiedIntent};
    use crate::planner::TaskPlanner;
    use std::time::Duration;
    use url::Url;

    fn harness() -> (ActionExecutor, TaskPlanner, Arc<StaticBrowser>) {
        let registry = Arc::new(ActionRegistry::standard());
        let driver = Arc::new(StaticBrowser::with_sample_site());
        let executor = ActionExecutor::new(
            registry.clone(),
            driver.clone(),
            Arc::new(ReaderConfig::default()),
        );
        (executor, TaskPlanner::new(registry), driver)
    }

    fn intent(action: Action, context: Option<&str>) -> ClassifiedIntent {
        ClassifiedIntent {
            action,
            confidence: 0.9,
            context: context.map(str::to_string),
            next_action: None,
            next_context: None,
        }
    }

    async fn open(driver: &StaticBrowser, state: &mut NavigationState) {
        let url = Url::parse("https://example.com").unwrap();
        let page = driver.navigate(&url, Duration::from_secs(1)).await.unwrap();
        state.current_url = Some(url);
        state.page = Some(page);
    }

    #[tokio::test]
    async fn single_step_applies_updates_and_history() {
        let (executor, planner, _) = harness();
        let mut state = NavigationState::new(50);
        let plan = planner
            .plan(&intent(Action::Navigate, Some("example.com")), &state)
            .unwrap();
        let mut status = HashMap::new();
        let result = executor
            .execute_step(&plan, &plan.steps[0], &mut state, &mut status)
            .await
            .unwrap();
        assert!(!result.failed());
        assert!(state.current_url.is_some());
        assert_eq!(state.history_len(), 1);
        assert_eq!(
            status[&TaskId::named("primary")].state,
            TaskState::Succeeded
        );
    }

    #[tokio::test]
    async fn parallel_group_merges_sibling_updates() {
        let (executor, planner, driver) = harness();
        let mut state = NavigationState::new(50);
        open(&driver, &mut state).await;
        let plan = planner
            .plan(&intent(Action::ListHeadlines, None), &state)
            .unwrap();
        assert!(matches!(plan.steps[0], PlanStep::Parallel(_)));
        let mut status = HashMap::new();
        let result = executor
            .execute_step(&plan, &plan.steps[0], &mut state, &mut status)
            .await
            .unwrap();
        assert!(!result.failed());
        // Primary wrote the headline cache, the analysis sibling wrote the
        // page context; both landed.
        assert!(!state.headlines.is_empty());
        assert!(state.page_context.is_some());
        assert_eq!(result.messages.len(), 1, "analysis stays silent");
    }

    #[tokio::test]
    async fn recoverable_errors_become_messages() {
        let (executor, planner, _) = harness();
        let mut state = NavigationState::new(50);
        let plan = planner
            .plan(&intent(Action::NextElement, None), &state)
            .unwrap();
        let mut status = HashMap::new();
        let result = executor
            .execute_step(&plan, &plan.steps[0], &mut state, &mut status)
            .await
            .unwrap();
        assert!(!result.failed());
        assert!(result.messages[0].contains("No page is open yet"));
        assert_eq!(
            status[&TaskId::named("primary")].state,
            TaskState::Recovered
        );
    }

    #[tokio::test]
    async fn systemic_failure_is_reported_not_applied() {
        let (executor, planner, driver) = harness();
        let mut state = NavigationState::new(50);
        open(&driver, &mut state).await;
        let plan = planner
            .plan(&intent(Action::ClickElement, Some("log out")), &state)
            .unwrap();
        let mut status = HashMap::new();
        let result = executor
            .execute_step(&plan, &plan.steps[0], &mut state, &mut status)
            .await
            .unwrap();
        let (id, error) = result.failure.as_ref().unwrap();
        assert_eq!(*id, TaskId::named("primary"));
        assert!(matches!(error, ReaderError::ElementNotFound(_)));
        assert_eq!(status[&TaskId::named("primary")].state, TaskState::Failed);
        assert!(state.last_element.is_none());
    }
}

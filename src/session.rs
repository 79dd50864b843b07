//! Per-turn orchestration.
//!
//! A session owns the navigation state and the injected capabilities, and
//! processes one user turn at a time: classify, gate, plan, execute, and on
//! repeated failure reflect. Every turn ends with exactly one spoken
//! response; the turn never ends silently.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use webreader_core_types::{SessionId, TaskId};

use crate::actions::{ActionRegistry, TaskKind};
use crate::browser::BrowserDriver;
use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::executor::{ActionExecutor, TaskStatus};
use crate::intent::{ClassificationOutcome, ClassifiedIntent, IntentClassifier};
use crate::llm::LlmClient;
use crate::planner::TaskPlanner;
use crate::reflection::{
    RecoveryStrategy, ReflectionEngine, TurnPhase, CLARIFICATION_FALLBACK,
};
use crate::speech::{SpeakOptions, SpeechSink};
use crate::state::NavigationState;

const GENERIC_FAILURE: &str =
    "Sorry, I couldn't complete that request. Please try something else.";

/// Reflection invocations allowed within one turn before giving up. Keeps a
/// model that keeps answering "retry" from looping forever.
const MAX_REFLECTIONS_PER_TURN: u32 = 3;

enum TurnFlow {
    Continue,
    Terminated,
}

pub struct ReaderSession {
    id: SessionId,
    state: NavigationState,
    classifier: IntentClassifier,
    planner: TaskPlanner,
    executor: ActionExecutor,
    reflection: ReflectionEngine,
    driver: Arc<dyn BrowserDriver>,
    speech: Arc<dyn SpeechSink>,
    config: Arc<ReaderConfig>,
    last_action: Option<TaskKind>,
}

impl ReaderSession {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        llm: Arc<dyn LlmClient>,
        speech: Arc<dyn SpeechSink>,
        config: Arc<ReaderConfig>,
    ) -> Self {
        let registry = Arc::new(ActionRegistry::standard());
        Self {
            id: SessionId::new(),
            state: NavigationState::new(config.history_cap),
            classifier: IntentClassifier::new(llm.clone(), config.clone()),
            planner: TaskPlanner::new(registry.clone()),
            executor: ActionExecutor::new(registry, driver.clone(), config.clone()),
            reflection: ReflectionEngine::new(llm, config.clone()),
            driver,
            speech,
            config,
            last_action: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    /// Process one user command and return the spoken response.
    #[instrument(skip(self, input), fields(session = %self.id))]
    pub async fn handle_command(&mut self, input: &str) -> String {
        let message = match self.run_turn(input).await {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, code = e.code().as_str(), "turn failed");
                GENERIC_FAILURE.to_string()
            }
        };
        if let Err(e) = self.speech.speak(&message, SpeakOptions::default()).await {
            warn!(error = %e, "speech sink failed");
        }
        message
    }

    /// Interrupt speech immediately. In-flight browser actions run to
    /// completion on their own schedule.
    pub fn stop_speaking(&self) {
        self.speech.stop();
    }

    /// Close the browser and reset all session state.
    pub async fn cleanup(&mut self) -> ReaderResult<()> {
        self.driver.close().await?;
        self.state.reset();
        self.last_action = None;
        Ok(())
    }

    async fn run_turn(&mut self, input: &str) -> ReaderResult<String> {
        let mut queue: VecDeque<String> = VecDeque::from([input.to_string()]);
        let mut messages: Vec<String> = Vec::new();

        while let Some(command) = queue.pop_front() {
            let outcome = match self
                .classifier
                .classify(&command, self.state.page_context.as_ref())
                .await
            {
                Ok(outcome) => outcome,
                Err(ReaderError::MalformedResponse(e)) => {
                    warn!(error = %e, "classification unusable, asking for clarification");
                    messages.push(CLARIFICATION_FALLBACK.to_string());
                    break;
                }
                Err(other) => return Err(other),
            };
            let intent = match outcome {
                ClassificationOutcome::Intent(intent) => intent,
                ClassificationOutcome::LowConfidence {
                    confidence,
                    threshold,
                } => {
                    info!(confidence, threshold, "below confidence gate");
                    messages.push(CLARIFICATION_FALLBACK.to_string());
                    break;
                }
                ClassificationOutcome::InvalidAction { name } => {
                    info!(action = %name, "action outside vocabulary");
                    messages.push(CLARIFICATION_FALLBACK.to_string());
                    break;
                }
            };

            // Attempts survive clarifications but reset when the user moves
            // on to a different action.
            let kind = TaskKind::Act(intent.action);
            if self.last_action != Some(kind) {
                self.state.attempts = 0;
                self.last_action = Some(kind);
            }

            match self.run_plan(intent, &mut messages, &mut queue).await? {
                TurnFlow::Continue => {}
                TurnFlow::Terminated => break,
            }
        }

        if messages.is_empty() {
            messages.push(GENERIC_FAILURE.to_string());
        }
        Ok(messages.join("\n"))
    }

    async fn run_plan(
        &mut self,
        intent: ClassifiedIntent,
        messages: &mut Vec<String>,
        queue: &mut VecDeque<String>,
    ) -> ReaderResult<TurnFlow> {
        let mut plan = self.planner.plan(&intent, &self.state)?;
        let mut status: HashMap<TaskId, TaskStatus> = HashMap::new();
        let mut reflections = 0u32;
        let mut step_index = 0;

        while step_index < plan.steps.len() {
            let step = plan.steps[step_index].clone();
            let result = self
                .executor
                .execute_step(&plan, &step, &mut self.state, &mut status)
                .await?;
            messages.extend(result.messages);

            let Some((task_id, error)) = result.failure else {
                self.state.attempts = 0;
                step_index += 1;
                continue;
            };

            self.state.attempts += 1;
            if self.state.attempts <= self.config.max_attempts_before_reflection {
                debug!(attempts = self.state.attempts, "plain retry");
                continue;
            }

            reflections += 1;
            if reflections > MAX_REFLECTIONS_PER_TURN {
                warn!("reflection budget exhausted");
                messages.push(GENERIC_FAILURE.to_string());
                return Ok(TurnFlow::Terminated);
            }

            debug!(
                phase = ?TurnPhase::Reflecting,
                attempts = self.state.attempts,
                "escalating to reflection"
            );
            let action_name = plan
                .task(&task_id)
                .map(|t| t.kind.as_str())
                .unwrap_or("unknown");
            let strategy = self
                .reflection
                .reflect(action_name, &error, &self.state)
                .await;

            match strategy {
                RecoveryStrategy::Retry => {
                    debug!(phase = ?TurnPhase::Executing, "retrying after reflection");
                    self.state.attempts = 0;
                }
                RecoveryStrategy::Alternative { action, context } => {
                    debug!(phase = ?TurnPhase::Executing, alternative = %action, "switching action");
                    self.state.attempts = 0;
                    self.last_action = Some(TaskKind::Act(action));
                    plan = self.planner.plan_single(TaskKind::Act(action), context)?;
                    status.clear();
                    step_index = 0;
                }
                RecoveryStrategy::Decompose { sub_tasks } => {
                    debug!(phase = ?TurnPhase::Planning, sub_tasks = sub_tasks.len(), "decomposing turn");
                    self.state.attempts = 0;
                    queue.clear();
                    queue.extend(sub_tasks);
                    return Ok(TurnFlow::Continue);
                }
                RecoveryStrategy::Clarify { question } => {
                    // Attempts are deliberately not reset; a clarification is
                    // not a fresh start.
                    debug!(phase = ?TurnPhase::Terminated, "asking for clarification");
                    messages.push(question);
                    return Ok(TurnFlow::Terminated);
                }
                RecoveryStrategy::Abort => {
                    debug!(phase = ?TurnPhase::Terminated, "aborting turn");
                    messages.push(GENERIC_FAILURE.to_string());
                    return Ok(TurnFlow::Terminated);
                }
            }
        }
        Ok(TurnFlow::Continue)
    }
}

//! Failure reflection and recovery strategy selection.
//!
//! After repeated failures the session asks the model, in a diagnostic
//! prompt, what to do next. The reply is validated hard: an alternative
//! needs confidence above the configured bar and a known action name, a
//! decomposition needs sub-tasks, and anything unrecognized degrades to
//! abort rather than guessing.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::intent::{extract_json_object, Action};
use crate::llm::LlmClient;
use crate::state::NavigationState;

/// Where the turn's state machine currently is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TurnPhase {
    Executing,
    Reflecting,
    Planning,
    Terminated,
}

/// What to do about a repeatedly failing action.
#[derive(Clone, Debug, PartialEq)]
pub enum RecoveryStrategy {
    /// Try the same action again with a fresh attempt counter.
    Retry,
    /// Switch to a different action.
    Alternative {
        action: Action,
        context: Option<String>,
    },
    /// End the turn with a question for the user.
    Clarify { question: String },
    /// Replace the plan with a queue of simpler commands.
    Decompose { sub_tasks: Vec<String> },
    /// Give up on this turn.
    Abort,
}

pub const CLARIFICATION_FALLBACK: &str =
    "I'm not sure what action you want to take. Could you rephrase your request?";

#[derive(Debug, Deserialize)]
pub struct RawReflection {
    #[serde(default)]
    pub analysis: Option<String>,
    pub strategy: String,
    #[serde(default)]
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub suggested_context: Option<String>,
    #[serde(default)]
    pub sub_tasks: Vec<String>,
    #[serde(default)]
    pub clarification_needed: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

pub fn parse_reflection_response(raw: &str) -> ReaderResult<RawReflection> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(&json).map_err(|e| ReaderError::MalformedResponse(e.to_string()))
}

pub struct ReflectionEngine {
    llm: Arc<dyn LlmClient>,
    config: Arc<ReaderConfig>,
}

impl ReflectionEngine {
    pub fn new(llm: Arc<dyn LlmClient>, config: Arc<ReaderConfig>) -> Self {
        Self { llm, config }
    }

    /// Diagnose a repeated failure and pick a strategy. Model trouble here
    /// degrades to `Abort`; a broken recovery path must not recurse.
    pub async fn reflect(
        &self,
        action: &str,
        error: &ReaderError,
        state: &NavigationState,
    ) -> RecoveryStrategy {
        let prompt = self.build_prompt(action, error, state);
        let raw = match self.llm.invoke(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%e, "reflection call failed, aborting turn");
                return RecoveryStrategy::Abort;
            }
        };
        let parsed = match parse_reflection_response(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(%e, "reflection response unparseable, aborting turn");
                return RecoveryStrategy::Abort;
            }
        };
        let strategy = self.validate(parsed);
        info!(?strategy, action, "reflection chose recovery strategy");
        strategy
    }

    fn validate(&self, raw: RawReflection) -> RecoveryStrategy {
        match raw.strategy.trim().to_lowercase().as_str() {
            "retry" => RecoveryStrategy::Retry,
            "alternative" => {
                if raw.confidence <= self.config.alternative_confidence_threshold {
                    return RecoveryStrategy::Abort;
                }
                match raw.suggested_action.as_deref().and_then(Action::parse) {
                    Some(action) => RecoveryStrategy::Alternative {
                        action,
                        context: raw.suggested_context,
                    },
                    None => RecoveryStrategy::Abort,
                }
            }
            "clarify" => RecoveryStrategy::Clarify {
                question: raw
                    .clarification_needed
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or_else(|| CLARIFICATION_FALLBACK.to_string()),
            },
            "decompose" => {
                let sub_tasks: Vec<String> = raw
                    .sub_tasks
                    .into_iter()
                    .filter(|t| !t.trim().is_empty())
                    .collect();
                if sub_tasks.is_empty() {
                    RecoveryStrategy::Abort
                } else {
                    RecoveryStrategy::Decompose { sub_tasks }
                }
            }
            _ => RecoveryStrategy::Abort,
        }
    }

    fn build_prompt(&self, action: &str, error: &ReaderError, state: &NavigationState) -> String {
        let mut history = String::new();
        for record in state.recent_history(5) {
            let mark = if record.succeeded { "ok" } else { "failed" };
            history.push_str(&format!("- {} [{mark}]: {}\n", record.action, record.outcome));
        }
        if history.is_empty() {
            history.push_str("- (no prior actions)\n");
        }
        let page = state
            .current_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "You are diagnosing a failed screen reader action.\n\
             Failed action: {action}\n\
             Error: {error}\n\
             Current page: {page}\n\
             Recent actions:\n{history}\n\
             Choose a recovery strategy and reply with ONLY a JSON object:\n\
             {{\"analysis\": \"<what went wrong>\", \"strategy\": \"retry|alternative|clarify|decompose|abort\", \
             \"suggested_action\": \"<action name if strategy is alternative>\", \
             \"suggested_context\": \"<argument for the suggested action>\", \
             \"sub_tasks\": [\"<simpler commands if strategy is decompose>\"], \
             \"clarification_needed\": \"<question if strategy is clarify>\", \
             \"confidence\": <0.0-1.0>}}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn engine(llm: MockLlm) -> ReflectionEngine {
        ReflectionEngine::new(Arc::new(llm), Arc::new(ReaderConfig::default()))
    }

    fn state() -> NavigationState {
        NavigationState::new(50)
    }

    async fn reflect(llm: MockLlm) -> RecoveryStrategy {
        engine(llm)
            .reflect(
                "click_element",
                &ReaderError::ElementNotFound("login".into()),
                &state(),
            )
            .await
    }

    #[tokio::test]
    async fn retry_strategy_passes_through() {
        let llm = MockLlm::scripted([r#"{"strategy": "retry", "confidence": 0.8}"#]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Retry);
    }

    #[tokio::test]
    async fn confident_alternative_is_accepted() {
        let llm = MockLlm::scripted([
            r#"{"strategy": "alternative", "suggested_action": "find_text",
                "suggested_context": "login", "confidence": 0.85}"#,
        ]);
        assert_eq!(
            reflect(llm).await,
            RecoveryStrategy::Alternative {
                action: Action::FindText,
                context: Some("login".into()),
            }
        );
    }

    #[tokio::test]
    async fn timid_alternative_degrades_to_abort() {
        let llm = MockLlm::scripted([
            r#"{"strategy": "alternative", "suggested_action": "find_text", "confidence": 0.5}"#,
        ]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Abort);
    }

    #[tokio::test]
    async fn alternative_with_unknown_action_aborts() {
        let llm = MockLlm::scripted([
            r#"{"strategy": "alternative", "suggested_action": "teleport", "confidence": 0.95}"#,
        ]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Abort);
    }

    #[tokio::test]
    async fn clarify_uses_the_model_question_or_fallback() {
        let llm = MockLlm::scripted([
            r#"{"strategy": "clarify", "clarification_needed": "Which login button?"}"#,
        ]);
        assert_eq!(
            reflect(llm).await,
            RecoveryStrategy::Clarify {
                question: "Which login button?".into()
            }
        );

        let llm = MockLlm::scripted([r#"{"strategy": "clarify"}"#]);
        assert_eq!(
            reflect(llm).await,
            RecoveryStrategy::Clarify {
                question: CLARIFICATION_FALLBACK.into()
            }
        );
    }

    #[tokio::test]
    async fn decompose_requires_sub_tasks() {
        let llm = MockLlm::scripted([
            r#"{"strategy": "decompose", "sub_tasks": ["list landmarks", "go to main"]}"#,
        ]);
        assert_eq!(
            reflect(llm).await,
            RecoveryStrategy::Decompose {
                sub_tasks: vec!["list landmarks".into(), "go to main".into()]
            }
        );

        let llm = MockLlm::scripted([r#"{"strategy": "decompose", "sub_tasks": []}"#]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Abort);
    }

    #[tokio::test]
    async fn garbage_reflection_aborts_instead_of_recursing() {
        let llm = MockLlm::scripted(["total nonsense"]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Abort);

        let llm = MockLlm::scripted([r#"{"strategy": "improvise"}"#]);
        assert_eq!(reflect(llm).await, RecoveryStrategy::Abort);
    }
}

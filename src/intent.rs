//! Natural-language intent classification.
//!
//! Builds the classifier prompt, extracts JSON from a possibly messy model
//! response, validates the action against the fixed vocabulary, and applies
//! the confidence gate. Low confidence and unknown actions are outcomes, not
//! errors: they route to user clarification and never reach the planner.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::llm::LlmClient;
use crate::state::PageContext;

/// The closed action vocabulary. Membership is validated here; nothing else
/// in the system ever sees an action outside this set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Action {
    Navigate,
    ReadCurrent,
    NextElement,
    PreviousElement,
    ListHeadings,
    ListHeadlines,
    GotoHeadline,
    FindText,
    NavigateLandmarks,
    NavigateHeadings,
    ChangeHeadingLevel,
    ClickElement,
    CheckElement,
    GotoLandmark,
    ListLandmarks,
    ReadSection,
}

impl Action {
    pub const ALL: [Action; 16] = [
        Action::Navigate,
        Action::ReadCurrent,
        Action::NextElement,
        Action::PreviousElement,
        Action::ListHeadings,
        Action::ListHeadlines,
        Action::GotoHeadline,
        Action::FindText,
        Action::NavigateLandmarks,
        Action::NavigateHeadings,
        Action::ChangeHeadingLevel,
        Action::ClickElement,
        Action::CheckElement,
        Action::GotoLandmark,
        Action::ListLandmarks,
        Action::ReadSection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::ReadCurrent => "read_current",
            Action::NextElement => "next_element",
            Action::PreviousElement => "previous_element",
            Action::ListHeadings => "list_headings",
            Action::ListHeadlines => "list_headlines",
            Action::GotoHeadline => "goto_headline",
            Action::FindText => "find_text",
            Action::NavigateLandmarks => "navigate_landmarks",
            Action::NavigateHeadings => "navigate_headings",
            Action::ChangeHeadingLevel => "change_heading_level",
            Action::ClickElement => "click_element",
            Action::CheckElement => "check_element",
            Action::GotoLandmark => "goto_landmark",
            Action::ListLandmarks => "list_landmarks",
            Action::ReadSection => "read_section",
        }
    }

    /// Parse an action name, accepting the short aliases models tend to
    /// emit despite instructions.
    pub fn parse(name: &str) -> Option<Action> {
        let name = name.trim().to_ascii_lowercase();
        let canonical = Action::ALL.iter().find(|a| a.as_str() == name);
        if let Some(action) = canonical {
            return Some(*action);
        }
        match name.as_str() {
            "read" => Some(Action::ReadCurrent),
            "next" => Some(Action::NextElement),
            "previous" | "prev" => Some(Action::PreviousElement),
            "find" => Some(Action::FindText),
            "click" => Some(Action::ClickElement),
            "check" => Some(Action::CheckElement),
            "goto" => Some(Action::GotoLandmark),
            "headings" => Some(Action::ListHeadings),
            "landmarks" => Some(Action::ListLandmarks),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated classification ready for planning.
#[derive(Clone, Debug)]
pub struct ClassifiedIntent {
    pub action: Action,
    pub confidence: f64,
    pub context: Option<String>,
    pub next_action: Option<Action>,
    pub next_context: Option<String>,
}

/// What classification produced. Only `Intent` proceeds to the planner.
#[derive(Clone, Debug)]
pub enum ClassificationOutcome {
    Intent(ClassifiedIntent),
    LowConfidence { confidence: f64, threshold: f64 },
    InvalidAction { name: String },
}

/// The classifier JSON shape before vocabulary validation.
#[derive(Debug, Deserialize)]
pub struct RawIntent {
    pub action: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default)]
    pub next_context: Option<String>,
}

/// Best-effort extraction of a JSON object from raw model text: strip code
/// fences, normalize smart quotes, trim to the outermost braces.
pub(crate) fn extract_json_object(raw: &str) -> ReaderResult<String> {
    let mut cleaned = raw
        .replace("```json", "")
        .replace("```", "")
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            cleaned = cleaned[s..=e].to_string();
            Ok(cleaned)
        }
        _ => Err(ReaderError::MalformedResponse(
            "no JSON object found in model response".into(),
        )),
    }
}

/// Parse a raw classifier response into a [`RawIntent`].
pub fn parse_classifier_response(raw: &str) -> ReaderResult<RawIntent> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(&json).map_err(|e| ReaderError::MalformedResponse(e.to_string()))
}

/// Wraps the LLM with prompt construction, parsing, and the confidence gate.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    config: Arc<ReaderConfig>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, config: Arc<ReaderConfig>) -> Self {
        Self { llm, config }
    }

    /// Classify one user message. Fails with `Classification` when the model
    /// call itself fails, or `MalformedResponse` when no valid JSON can be
    /// extracted even after one repair retry.
    pub async fn classify(
        &self,
        user_message: &str,
        page_context: Option<&PageContext>,
    ) -> ReaderResult<ClassificationOutcome> {
        let prompt = build_classifier_prompt(user_message, page_context);
        let raw = self.llm.invoke(&prompt).await?;

        let parsed = match parse_classifier_response(&raw) {
            Ok(intent) => intent,
            Err(first) => {
                warn!(error = %first, "classifier response unparseable, retrying once");
                let retry_prompt = format!(
                    "{prompt}\n\nYour previous reply could not be parsed. \
                     Respond with ONLY the JSON object, no prose, no code fences."
                );
                let raw = self.llm.invoke(&retry_prompt).await?;
                parse_classifier_response(&raw)?
            }
        };

        let threshold = self.config.confidence_threshold(page_context.is_some());
        let action = match Action::parse(&parsed.action) {
            Some(action) => action,
            None => {
                debug!(action = %parsed.action, "unknown action name");
                return Ok(ClassificationOutcome::InvalidAction {
                    name: parsed.action,
                });
            }
        };
        if parsed.confidence < threshold {
            debug!(
                confidence = parsed.confidence,
                threshold, "classification below confidence gate"
            );
            return Ok(ClassificationOutcome::LowConfidence {
                confidence: parsed.confidence,
                threshold,
            });
        }

        let next_action = match parsed.next_action.as_deref() {
            Some(name) => {
                let chained = Action::parse(name);
                if chained.is_none() {
                    warn!(next_action = name, "dropping unknown chained action");
                }
                chained
            }
            None => None,
        };

        Ok(ClassificationOutcome::Intent(ClassifiedIntent {
            action,
            confidence: parsed.confidence,
            context: parsed.context.filter(|c| !c.trim().is_empty()),
            next_action,
            next_context: parsed.next_context.filter(|c| !c.trim().is_empty()),
        }))
    }
}

fn build_classifier_prompt(user_message: &str, page_context: Option<&PageContext>) -> String {
    let mut prompt = String::from(
        "You are the intent classifier for a voice-driven web screen reader.\n\
         Map the user's request to exactly one action from this list:\n\
         - navigate: open a website (\"go to example.com\")\n\
         - read_current: describe the element under the cursor (\"where am I\")\n\
         - next_element: move to the next element (\"next\")\n\
         - previous_element: move to the previous element (\"go back one\")\n\
         - list_headings: list the page headings (\"what are the headings\")\n\
         - list_headlines: list news headlines (\"read me the headlines\")\n\
         - goto_headline: open a numbered headline (\"go to headline 3\")\n\
         - find_text: search visible text (\"find pricing\")\n\
         - navigate_landmarks: browse by landmarks (\"navigate by landmarks\")\n\
         - navigate_headings: browse by headings, optional level (\"browse h2 headings\")\n\
         - change_heading_level: shift heading level up or down (\"go up a level\")\n\
         - click_element: click a named element (\"click the login button\")\n\
         - check_element: describe the last found element (\"what is that\")\n\
         - goto_landmark: jump to a named landmark (\"go to the navigation\")\n\
         - list_landmarks: list page landmarks (\"what sections are there\")\n\
         - read_section: read the current section's text (\"read this section\")\n\n",
    );
    if let Some(ctx) = page_context {
        prompt.push_str(&format!(
            "Current page: \"{}\" ({}; {} headings, {} landmarks, {} interactive elements).\n\n",
            ctx.title, ctx.page_type, ctx.heading_count, ctx.landmark_count, ctx.interactive_count
        ));
    }
    prompt.push_str(&format!(
        "User request: \"{user_message}\"\n\n\
         Reply with ONLY a JSON object:\n\
         {{\"action\": \"<name>\", \"confidence\": <0.0-1.0>, \"context\": \"<argument such as \
         a url, search text, or element name>\", \"next_action\": \"<optional chained action>\", \
         \"next_context\": \"<optional argument for the chained action>\"}}\n\
         Omit next_action unless the request clearly asks for two steps."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn classifier(llm: MockLlm) -> IntentClassifier {
        IntentClassifier::new(Arc::new(llm), Arc::new(ReaderConfig::default()))
    }

    fn page_context() -> PageContext {
        PageContext {
            title: "Example".into(),
            page_type: "article".into(),
            heading_count: 4,
            landmark_count: 2,
            interactive_count: 12,
        }
    }

    #[test]
    fn parses_clean_json() {
        let raw = r#"{"action": "navigate", "confidence": 0.9, "context": "example.com"}"#;
        let intent = parse_classifier_response(raw).unwrap();
        assert_eq!(intent.action, "navigate");
        assert_eq!(intent.confidence, 0.9);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"action\": \"find_text\", \"confidence\": 0.8, \"context\": \"pricing\"}\n```";
        let intent = parse_classifier_response(raw).unwrap();
        assert_eq!(intent.action, "find_text");
    }

    #[test]
    fn normalizes_smart_quotes() {
        let raw = "{\u{201c}action\u{201d}: \u{201c}next_element\u{201d}, \u{201c}confidence\u{201d}: 0.85}";
        let intent = parse_classifier_response(raw).unwrap();
        assert_eq!(intent.action, "next_element");
    }

    #[test]
    fn trims_surrounding_prose() {
        let raw = "Sure, here is the classification:\n{\"action\": \"list_headings\", \"confidence\": 0.95}\nHope that helps!";
        let intent = parse_classifier_response(raw).unwrap();
        assert_eq!(intent.action, "list_headings");
    }

    #[test]
    fn rejects_text_with_no_object() {
        assert!(matches!(
            parse_classifier_response("I cannot help with that."),
            Err(ReaderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_braces_with_invalid_body() {
        assert!(parse_classifier_response("{action: navigate oops").is_err());
    }

    #[test]
    fn action_aliases_resolve() {
        assert_eq!(Action::parse("next"), Some(Action::NextElement));
        assert_eq!(Action::parse("PREV"), Some(Action::PreviousElement));
        assert_eq!(Action::parse(" click_element "), Some(Action::ClickElement));
        assert_eq!(Action::parse("teleport"), None);
    }

    #[tokio::test]
    async fn low_confidence_never_becomes_an_intent() {
        let llm = MockLlm::scripted(
            [r#"{"action": "navigate", "confidence": 0.5, "context": "example.com"}"#],
        );
        let outcome = classifier(llm).classify("go somewhere?", None).await.unwrap();
        assert!(matches!(
            outcome,
            ClassificationOutcome::LowConfidence { threshold, .. } if threshold == 0.7
        ));
    }

    #[tokio::test]
    async fn page_context_lowers_the_gate() {
        let llm = MockLlm::scripted(
            [r#"{"action": "list_headings", "confidence": 0.65}"#],
        );
        let ctx = page_context();
        let outcome = classifier(llm).classify("headings", Some(&ctx)).await.unwrap();
        assert!(matches!(outcome, ClassificationOutcome::Intent(_)));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid_not_defaulted() {
        let llm = MockLlm::scripted(
            [r#"{"action": "teleport", "confidence": 0.99}"#],
        );
        let outcome = classifier(llm).classify("beam me up", None).await.unwrap();
        assert!(matches!(
            outcome,
            ClassificationOutcome::InvalidAction { name } if name == "teleport"
        ));
    }

    #[tokio::test]
    async fn malformed_response_retries_once_then_fails() {
        let llm = MockLlm::scripted(["not json", "still not json"]);
        let err = classifier(llm).classify("next", None).await.unwrap_err();
        assert!(matches!(err, ReaderError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn repair_retry_can_succeed() {
        let llm = MockLlm::scripted([
            "garbage",
            r#"{"action": "next_element", "confidence": 0.9}"#,
        ]);
        let outcome = classifier(llm).classify("next", None).await.unwrap();
        assert!(matches!(outcome, ClassificationOutcome::Intent(_)));
    }

    #[tokio::test]
    async fn compound_intent_carries_chained_action() {
        let llm = MockLlm::scripted([
            r#"{"action": "navigate", "confidence": 0.92, "context": "nytimes.com",
                "next_action": "list_headlines"}"#,
        ]);
        let outcome = classifier(llm).classify("go to nytimes and read headlines", None)
            .await
            .unwrap();
        match outcome {
            ClassificationOutcome::Intent(intent) => {
                assert_eq!(intent.action, Action::Navigate);
                assert_eq!(intent.next_action, Some(Action::ListHeadlines));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

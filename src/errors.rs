//! Unified error taxonomy for the reader core.
//!
//! Every failure that can cross a component boundary is a `ReaderError`.
//! Errors carry a machine-readable [`ErrorCode`] so the tool surface can
//! return structured failures instead of raw exceptions.

use thiserror::Error;

/// Machine-readable error codes exposed on the tool surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    NoPageOpen,
    NavigationFailed,
    ElementNotFound,
    InvalidMode,
    ClassificationFailed,
    MalformedResponse,
    PlanningFailed,
    BrowserFailure,
    ConfigInvalid,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoPageOpen => "NO_PAGE_OPEN",
            ErrorCode::NavigationFailed => "NAVIGATION_FAILED",
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::InvalidMode => "INVALID_MODE",
            ErrorCode::ClassificationFailed => "CLASSIFICATION_FAILED",
            ErrorCode::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorCode::PlanningFailed => "PLANNING_FAILED",
            ErrorCode::BrowserFailure => "BROWSER_FAILURE",
            ErrorCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

/// Errors emitted by the reader core.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// An action that requires an open page ran before any navigation.
    #[error("no page is open; navigate to a website first")]
    NoPageOpen,

    /// DNS, timeout, or HTTP failure while navigating.
    #[error("failed to navigate to {url}: {cause}")]
    Navigation { url: String, cause: String },

    /// No matching strategy could resolve a lookup/click target.
    #[error("could not find element matching '{0}'")]
    ElementNotFound(String),

    /// The action requires a navigation mode the session is not in.
    #[error("{0}")]
    InvalidMode(String),

    /// The intent classifier backend call itself failed.
    #[error("intent classification failed: {0}")]
    Classification(String),

    /// No valid JSON object could be extracted from the model response.
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Cyclic or unsatisfiable task dependency graph. Should be unreachable
    /// given the planner's construction rules; treated as a bug signal.
    #[error("planning failed: {0}")]
    Planning(String),

    /// Failure reported by the browser driver outside of navigation.
    #[error("browser driver error: {0}")]
    Browser(String),

    /// Unreadable or out-of-range configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ReaderError::NoPageOpen => ErrorCode::NoPageOpen,
            ReaderError::Navigation { .. } => ErrorCode::NavigationFailed,
            ReaderError::ElementNotFound(_) => ErrorCode::ElementNotFound,
            ReaderError::InvalidMode(_) => ErrorCode::InvalidMode,
            ReaderError::Classification(_) => ErrorCode::ClassificationFailed,
            ReaderError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            ReaderError::Planning(_) => ErrorCode::PlanningFailed,
            ReaderError::Browser(_) => ErrorCode::BrowserFailure,
            ReaderError::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Handler-local errors that convert to user guidance at the point of
    /// detection and never enter the retry/reflection path.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReaderError::NoPageOpen | ReaderError::InvalidMode(_))
    }

    /// Message suitable for speaking back to the user.
    pub fn user_message(&self) -> String {
        match self {
            ReaderError::NoPageOpen => {
                "No page is open yet. Say something like 'go to example.com' first.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result alias used throughout the library.
pub type ReaderResult<T> = Result<T, ReaderError>;

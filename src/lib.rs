//! Natural-language screen reader agent for the web.
//!
//! A session takes free-text commands ("go to example.com", "list the
//! headings", "click the login button"), classifies them with a language
//! model into a fixed action vocabulary, executes the action against an
//! injected browser driver, and speaks the result through an injected
//! speech sink.
//!
//! The capability seams ([`browser::BrowserDriver`], [`llm::LlmClient`],
//! [`speech::SpeechSink`]) are plain async traits; the shipped
//! [`browser::StaticBrowser`] and [`llm::MockLlm`] fakes make the whole
//! pipeline testable without a browser or a model.

pub mod actions;
pub mod browser;
pub mod config;
pub mod describe;
pub mod errors;
pub mod executor;
pub mod index;
pub mod intent;
pub mod llm;
pub mod planner;
pub mod reflection;
pub mod session;
pub mod speech;
pub mod state;

pub use config::ReaderConfig;
pub use errors::{ErrorCode, ReaderError, ReaderResult};
pub use session::ReaderSession;

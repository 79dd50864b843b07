//! Language model capability seam.
//!
//! The core owns prompts and parsing; this module only moves text to a
//! model and back. `OllamaClient` talks to a local Ollama endpoint;
//! `MockLlm` is a scripted stand-in shipped for tests and downstream users.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::errors::{ReaderError, ReaderResult};

/// Raw text in, raw text out. Parsing and validation happen in the caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> ReaderResult<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> ReaderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ReaderError::Classification(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn invoke(&self, prompt: &str) -> ReaderResult<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.0 },
        };
        debug!(model = %self.model, prompt_chars = prompt.len(), "llm request");
        let response = self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| ReaderError::Classification(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ReaderError::Classification(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ReaderError::Classification(format!("bad response body: {e}")))?;
        Ok(body.response)
    }
}

/// Scripted model returning canned responses in order. Records every prompt
/// it receives so tests can assert on prompt construction.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(&self, prompt: &str) -> ReaderResult<String> {
        self.prompts.lock().push(prompt.to_string());
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| ReaderError::Classification("mock script exhausted".into()))
    }
}

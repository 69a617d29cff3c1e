//! Classifier client for the external model-completion service
//!
//! Invokes an Ollama-compatible chat endpoint once per email with a strict
//! structured-output contract: the model is instructed to emit JSON with
//! exactly two fields, a one-sentence summary and a stock-discussion flag.
//! Any network, status, or parse failure is reported as a single
//! classification error with no partial result; retries are the runner's
//! responsibility.

use crate::error::{MailbenchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The classifier's structured verdict for one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    /// One-sentence summary of the email's subject matter
    pub summary: String,

    /// Whether the email is discussing stocks, tickers, or prices
    pub is_discussing_stocks: bool,
}

/// Classification seam used by the benchmark runner
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one email body under the given system prompt
    async fn classify(&self, system_prompt: &str, body: &str) -> Result<Verdict>;

    /// Model identifier recorded on benchmark rows
    fn model(&self) -> &str;
}

/// Configuration for the Ollama classifier client
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the Ollama server (e.g. "http://localhost:11434")
    pub base_url: String,

    /// Model to use
    pub model: String,
}

/// Classifier backed by an Ollama chat endpoint
pub struct OllamaClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

/// Ollama chat API request format
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    format: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Ollama chat API response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// JSON schema the service is instructed to conform to
fn verdict_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "is_discussing_stocks": { "type": "boolean" }
        },
        "required": ["summary", "is_discussing_stocks"]
    })
}

impl OllamaClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Probe the service root; used by the status command
    pub async fn is_healthy(&self) -> bool {
        match self.client.get(&self.config.base_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    async fn classify(&self, system_prompt: &str, body: &str) -> Result<Verdict> {
        debug!("Calling classifier model {}", self.config.model);

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: format!("Analyze the following email: `{}`", body),
                },
            ],
            stream: false,
            format: verdict_schema(),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| MailbenchError::Classification(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailbenchError::Classification(format!(
                "service returned status {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| MailbenchError::Classification(format!("malformed response: {}", e)))?;

        parse_verdict(&chat.message.content)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Validate the model's output against the exact two-field shape
fn parse_verdict(content: &str) -> Result<Verdict> {
    serde_json::from_str(content)
        .map_err(|e| MailbenchError::Classification(format!("non-conforming verdict: {}", e)))
}

//! Model provider clients.
//!
//! The controller talks to models only through [`ModelProvider`], so tests can substitute a
//! scripted implementation. [`HttpProvider`] speaks the three supported vendor APIs over
//! blocking HTTP.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::io::config::ProviderKind;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// One model invocation.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    /// Fully rendered conversation text.
    pub prompt: &'a str,
    pub model: &'a str,
    pub credential: &'a str,
    /// Upper bound on the whole HTTP exchange.
    pub timeout: Duration,
}

/// Text-in/text-out model boundary.
pub trait ModelProvider {
    fn name(&self) -> &str;

    /// Return the model's raw reply text.
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String>;
}

/// Blocking HTTP client for OpenAI, Anthropic, and Google.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    kind: ProviderKind,
    endpoint: String,
}

impl HttpProvider {
    pub fn new(kind: ProviderKind) -> Self {
        let endpoint = match kind {
            ProviderKind::Openai => "https://api.openai.com/v1/chat/completions",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1/messages",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta/models",
        };
        Self {
            kind,
            endpoint: endpoint.to_string(),
        }
    }

    /// Override the API endpoint (for proxies and gateways).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self, model: &str) -> String {
        match self.kind {
            ProviderKind::Google => format!(
                "{}/{model}:generateContent",
                self.endpoint.trim_end_matches('/')
            ),
            _ => self.endpoint.clone(),
        }
    }
}

impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    #[instrument(skip_all, fields(provider = self.kind.as_str(), model = request.model))]
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request.timeout)
            .build()
            .context("build http client")?;

        let body = request_body(self.kind, request.model, request.prompt);
        let builder = client.post(self.url(request.model)).json(&body);
        let builder = match self.kind {
            ProviderKind::Openai => builder.bearer_auth(request.credential),
            ProviderKind::Anthropic => builder
                .header("x-api-key", request.credential)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Google => builder.header("x-goog-api-key", request.credential),
        };

        debug!("sending model request");
        let response = builder
            .send()
            .with_context(|| format!("{} request failed", self.kind.as_str()))?;
        let status = response.status();
        let text = response.text().context("read response body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "{} returned error {}: {}",
                self.kind.as_str(),
                status.as_u16(),
                text.trim()
            ));
        }

        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("parse {} response", self.kind.as_str()))?;
        extract_text(self.kind, &value)
    }
}

/// JSON request body for `kind`.
pub fn request_body(kind: ProviderKind, model: &str, prompt: &str) -> Value {
    match kind {
        ProviderKind::Openai => json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        }),
        ProviderKind::Anthropic => json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        }),
        ProviderKind::Google => json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        }),
    }
}

/// Pull the reply text out of a vendor response.
pub fn extract_text(kind: ProviderKind, response: &Value) -> Result<String> {
    let text = match kind {
        ProviderKind::Openai => response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        ProviderKind::Anthropic => join_parts(response.get("content"), "text"),
        ProviderKind::Google => {
            join_parts(response.pointer("/candidates/0/content/parts"), "text")
        }
    };
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| anyhow!("{} response contained no text", kind.as_str()))
}

fn join_parts(parts: Option<&Value>, field: &str) -> Option<String> {
    let parts = parts?.as_array()?;
    let joined: String = parts
        .iter()
        .filter_map(|part| part.get(field).and_then(Value::as_str))
        .collect();
    Some(joined)
}

//! OpenAI-compatible chat completions client.
//!
//! Implements the core [`LanguageModel`] trait over
//! `POST {base_url}/chat/completions`. Any provider speaking the OpenAI
//! wire format works (set `OPENAI_BASE_URL`).
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `OPENAI_API_KEY` | Bearer token; required for any model call |
//! | `OPENAI_BASE_URL` | API root, default `https://api.openai.com/v1` |
//! | `OPENAI_EXTRA_HEADERS` | JSON object of extra request headers |
//!
//! Unlike the services' validation errors, transport failures are returned
//! as-is: there is no retry or backoff.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use subtitle_tutor_core::model::{Completion, Credentials, InvokeOptions, LanguageModel, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const EXTRA_HEADERS_ENV: &str = "OPENAI_EXTRA_HEADERS";

/// Read credentials from the process environment.
pub fn credentials_from_env() -> Credentials {
    credentials_from_lookup(|name| std::env::var(name).ok())
}

/// Build credentials from an arbitrary variable lookup.
///
/// Blank values count as unset. An `OPENAI_EXTRA_HEADERS` value that is not
/// a JSON object of strings is ignored with a warning.
pub fn credentials_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Credentials {
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let extra_headers = match non_blank(EXTRA_HEADERS_ENV) {
        Some(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
            Ok(headers) => headers,
            Err(e) => {
                warn!(error = %e, "ignoring {EXTRA_HEADERS_ENV}: expected a JSON object of strings");
                BTreeMap::new()
            }
        },
        None => BTreeMap::new(),
    };

    Credentials {
        api_key: non_blank(API_KEY_ENV),
        base_url: non_blank(BASE_URL_ENV),
        extra_headers,
    }
}

/// Chat completions client for one set of credentials.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    extra_headers: BTreeMap<String, String>,
}

impl OpenAIChatModel {
    /// Create a client; `timeout` bounds each request end to end.
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base = credentials
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            api_key: credentials.api_key.clone(),
            endpoint: format!("{base}/chat/completions"),
            extra_headers: credentials.extra_headers.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn invoke(&self, prompt: &str, options: &InvokeOptions) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{API_KEY_ENV} not set"))?;

        let mut body = json!({
            "model": options.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(endpoint = %self.endpoint, model = %options.model, "sending chat completion");
        let response = request
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: Value = response
            .json()
            .await
            .context("OpenAI response was not valid JSON")?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` and `usage` from a response body.
///
/// A null or missing content yields empty text; the caller decides whether
/// that is an error.
fn parse_chat_response(json: &Value) -> Result<Completion> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices array"))?;
    let first = choices
        .first()
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: empty choices array"))?;

    let text = match first.pointer("/message/content") {
        Some(Value::String(s)) => s.clone(),
        // Content-part arrays: concatenate the text parts.
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    let usage = json.get("usage").map(|u| {
        let field = |name: &str| u.get(name).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Usage {
            prompt_tokens: field("prompt_tokens"),
            completion_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
        }
    });

    Ok(Completion { text, usage })
}

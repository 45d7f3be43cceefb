//! OpenAI-compatible chat completions adapter.
//!
//! Works against any `/chat/completions` endpoint (hosted providers, local
//! llama.cpp / vLLM servers, or a gateway proxy).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{Completion, ReasoningAdapter, ReasoningError, ReasoningRequest, ReasoningResult};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Chat completions client
pub struct OpenAiCompatibleAdapter {
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> ReasoningResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            default_model: default_model.into(),
            timeout,
            client,
        })
    }

    fn request_body(&self, request: &ReasoningRequest) -> Value {
        let model = request
            .options
            .model
            .as_deref()
            .unwrap_or(&self.default_model);

        let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );

        json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.options.max_output_tokens,
            "temperature": 0.3
        })
    }
}

/// Extract content and usage from a chat completions response body.
pub fn parse_chat_response(body: &Value, fallback_model: &str) -> ReasoningResult<Completion> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ReasoningError::Parse("response has no choices[0].message.content".into()))?
        .to_string();

    Ok(Completion {
        content,
        model: body["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
    })
}

#[async_trait]
impl ReasoningAdapter for OpenAiCompatibleAdapter {
    async fn invoke(&self, request: ReasoningRequest) -> ReasoningResult<Completion> {
        let body = self.request_body(&request);
        let model = body["model"].as_str().unwrap_or_default().to_string();
        debug!(
            activity = %request.activity,
            correlation = request.options.correlation.as_deref().unwrap_or(""),
            model = %model,
            messages = request.messages.len(),
            "Invoking reasoning service"
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Timeout(self.timeout)
            } else {
                ReasoningError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ReasoningError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::Parse(e.to_string()))?;
        parse_chat_response(&json, &model)
    }
}

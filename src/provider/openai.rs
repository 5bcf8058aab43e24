// src/provider/openai.rs — OpenAI Chat Completions provider

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider, TokenUsage};
use crate::infra::errors::ParleyError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.into())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
        })
    }
}

/// Pull the reply text and token counts out of a completion body.
fn parse_completion(resp: &serde_json::Value) -> Result<ChatResponse, ParleyError> {
    let content = resp["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ParleyError::api("openai", "Response has no message content"))?
        .to_string();

    let usage = resp["usage"].is_object().then(|| TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0),
    });

    Ok(ChatResponse { content, usage })
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ParleyError> {
        let body = Self::request_body(&request);
        tracing::debug!(model = %request.model, "POST {}/chat/completions", self.base_url);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::api("openai", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ParleyError::api(
                "openai",
                format!("HTTP {}: {}", status, error_body),
            ));
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ParleyError::api("openai", format!("Failed to parse response: {}", e)))?;

        parse_completion(&resp)
    }
}

//! OpenAI-compatible chat completion transport
//!
//! Sends the prompt as a system and a user message with a JSON response
//! format, then decodes the first choice's content as JSON.

mod models;
pub use models::*;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::client::{ModelTransport, RawResponse};
use crate::config::TransportConfig;
use crate::error::{ErrorContext, PipelineError, Result};
use crate::prompt::Prompt;
use crate::services::common::{build_http_client, parse_error_response, record_request_metrics, UserAgent};
use crate::types::ModelIdentity;
use crate::util::truncate_string;

const CHAT_ENDPOINT: &str = "chat/completions";

/// Transport for `/chat/completions` on an OpenAI-compatible service
pub struct OpenAITransport {
    http_client: Client,
    config: TransportConfig,
}

impl OpenAITransport {
    /// Create a transport from configuration
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http_client = build_http_client(
            Some(UserAgent {
                extra: Some("openai-transport".to_string()),
                ..UserAgent::default()
            }),
            config.request_timeout,
        )?;
        Ok(Self { http_client, config })
    }

    /// Configuration in use
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn endpoint_url(&self) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), CHAT_ENDPOINT)
    }

    /// Build the request body for a prompt
    pub fn build_request(&self, model: &ModelIdentity, prompt: &Prompt) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.id.clone(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            temperature: Some(self.config.temperature),
            response_format: Some(ResponseFormat::json_object()),
            max_tokens: None,
        }
    }
}

/// Extract the JSON payload from a completion
pub fn decode_completion(response: ChatCompletionResponse) -> Result<RawResponse> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| PipelineError::schema_invalid("completion has no message content"))?;

    let payload: Value = serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
        PipelineError::schema_invalid(format!(
            "completion content is not JSON ({}): {}",
            e,
            truncate_string(&content, 120)
        ))
    })?;

    Ok(RawResponse {
        payload,
        usage: response.usage,
    })
}

/// Remove a surrounding Markdown code fence, which some models add despite instructions
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[async_trait]
impl ModelTransport for OpenAITransport {
    async fn call(&self, model: &ModelIdentity, prompt: &Prompt) -> Result<RawResponse> {
        let url = self.endpoint_url();
        debug!("Sending request to {}: POST {}", model.id, url);

        let mut builder = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(model, prompt));
        if let Some(ref org) = self.config.org_id {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder.send().await.map_err(|e| {
            PipelineError::from(e).with_context(ErrorContext::for_model(&model.id).endpoint(CHAT_ENDPOINT))
        })?;

        let status = response.status();
        record_request_metrics(&model.id, status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(&model.id, CHAT_ENDPOINT, response).await);
        }

        let completion = response.json::<ChatCompletionResponse>().await?;
        decode_completion(completion)
    }
}

//! Error mapping for the generative service
//!
//! Converts HTTP error responses into the call taxonomy used by the
//! client and orchestrator.

use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, PipelineError};
use crate::util::truncate_string;

/// Longest body excerpt kept in an error message
const MAX_BODY_EXCERPT: usize = 100;

/// Map a status code and message to a classified error
pub fn classify_status(status: StatusCode, message: impl Into<String>) -> PipelineError {
    let message = message.into();
    match status.as_u16() {
        429 => PipelineError::rate_limit(message),
        408 | 504 => PipelineError::timeout(message),
        401 | 403 => PipelineError::authentication(message),
        500..=599 => PipelineError::network(message),
        400..=499 => PipelineError::rejected(message),
        _ => PipelineError::network(message),
    }
}

/// Map an OpenAI-style error body to a PipelineError
pub fn map_openai_error(status: StatusCode, json: &Value, context: &mut ErrorContext) -> PipelineError {
    let error = json.get("error");

    if let Some(error_type) = error.and_then(|e| e.get("type")).and_then(|t| t.as_str()) {
        context.add("error_type", error_type);
    }
    if let Some(code) = error.and_then(|e| e.get("code")).and_then(|c| c.as_str()) {
        context.add("error_code", code);
    }

    let message = error
        .and_then(|e| e.get("message"))
        .or_else(|| json.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown service error");

    classify_status(status, message)
}

/// Map an HTTP error response to a PipelineError
pub fn map_http_error(status: StatusCode, body: &str, mut context: ErrorContext) -> PipelineError {
    context.status_code = Some(status.as_u16());

    let error = match serde_json::from_str::<Value>(body) {
        Ok(json) => map_openai_error(status, &json, &mut context),
        Err(_) if body.trim().is_empty() => classify_status(status, status.to_string()),
        Err(_) => classify_status(
            status,
            format!("{}: {}", status, truncate_string(body.trim(), MAX_BODY_EXCERPT)),
        ),
    };

    error.with_context(context)
}

/// Determine if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: StatusCode) -> bool {
    classify_status(status, String::new()).is_retryable()
}

//! Shared HTTP plumbing for transports

use std::fmt;
use std::time::Duration;

use reqwest::{header, Client};

use crate::error::mapping::map_http_error;
use crate::error::{ErrorContext, PipelineError, Result};

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "event-pipeline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;
        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Build an HTTP client with a user agent, gzip and a request timeout
pub fn build_http_client(user_agent: Option<UserAgent>, timeout: Duration) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    let ua = user_agent.unwrap_or_default().to_string();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&ua)
            .map_err(|e| PipelineError::configuration(format!("Invalid user agent: {}", e)))?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()
        .map_err(|e| PipelineError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-success response into a classified error
pub async fn parse_error_response(model_id: &str, endpoint: &str, response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let context = ErrorContext::for_model(model_id).endpoint(endpoint);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("Failed to read error response: {}", e),
    };

    map_http_error(status, &body, context)
}

/// Count a finished request by model and status
pub fn record_request_metrics(model_id: &str, status: u16) {
    metrics::increment_counter!(
        "event_pipeline_requests_total",
        "model" => model_id.to_string(),
        "status" => status.to_string()
    );
}

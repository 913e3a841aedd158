//! Local validation of structured model output
//!
//! The schema is never sent to the service. It only decides whether a
//! response has the expected shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// Fields extracted into every [`GeneratedEvent`]
const EVENT_FIELDS: [&str; 2] = ["text", "domain"];

/// One event as returned by a model, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEvent {
    /// Hint text
    pub text: String,

    /// Topical domain
    pub domain: String,
}

/// A well-formed batch of generated events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Events in the order the model produced them
    pub events: Vec<GeneratedEvent>,

    /// Token usage reported by the service, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

/// Expected shape of a generation response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    /// Name of the array holding the events
    pub events_field: String,

    /// String fields every event must carry besides `text` and `domain`
    pub required_fields: Vec<String>,

    /// Fewest events a response may hold
    pub min_events: usize,

    /// Most events a response may hold
    pub max_events: usize,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            events_field: "events".to_string(),
            required_fields: Vec::new(),
            min_events: 1,
            max_events: 50,
        }
    }
}

impl ResponseSchema {
    /// Check a decoded payload and extract its events.
    ///
    /// `envelope_usage` is used when the payload itself carries no `usage`.
    pub fn parse(&self, payload: &Value, envelope_usage: Option<&Value>) -> Result<EventBatch> {
        let object = payload
            .as_object()
            .ok_or_else(|| PipelineError::schema_invalid("response is not a JSON object"))?;

        let items = object
            .get(&self.events_field)
            .ok_or_else(|| {
                PipelineError::schema_invalid(format!("missing '{}' field", self.events_field))
            })?
            .as_array()
            .ok_or_else(|| {
                PipelineError::schema_invalid(format!("'{}' is not an array", self.events_field))
            })?;

        if items.len() < self.min_events || items.len() > self.max_events {
            return Err(PipelineError::schema_invalid(format!(
                "expected {}-{} events, got {}",
                self.min_events,
                self.max_events,
                items.len()
            )));
        }

        let mut events = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let fields = item.as_object().ok_or_else(|| {
                PipelineError::schema_invalid(format!("event {} is not an object", index))
            })?;
            let required = EVENT_FIELDS
                .iter()
                .copied()
                .chain(self.required_fields.iter().map(String::as_str));
            for field in required {
                match fields.get(field).and_then(Value::as_str) {
                    Some(value) if !value.trim().is_empty() => {}
                    _ => {
                        return Err(PipelineError::schema_invalid(format!(
                            "event {} has no usable '{}'",
                            index, field
                        )))
                    }
                }
            }
            events.push(GeneratedEvent {
                text: string_field(fields, "text"),
                domain: string_field(fields, "domain"),
            });
        }

        let usage = object
            .get("usage")
            .filter(|usage| usage.is_object())
            .or(envelope_usage)
            .cloned();

        Ok(EventBatch { events, usage })
    }
}

fn string_field(fields: &serde_json::Map<String, Value>, name: &str) -> String {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

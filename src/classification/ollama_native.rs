use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::rule_based::RuleBasedMethod;
use super::schema::SchemaRegistry;
use super::{ClassificationMethod, ClassificationResult, InputType, Method};
use crate::context::ProcessingContext;
use crate::error::{Error, Result};
use crate::provider::handler::PromptHandler;
use crate::provider::Request;

#[derive(Debug, Deserialize)]
struct NativeClassification {
    #[serde(rename = "type")]
    input_type: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Structured-output classification via a local model's native JSON-schema
/// constraint (`format` field on `/api/generate`). Wired through [`PromptHandler`]
/// rather than talking to reqwest directly so retry/fallback policy applies
/// uniformly.
pub struct OllamaNativeMethod {
    handler: Arc<PromptHandler>,
    registry: Arc<SchemaRegistry>,
    rule_based: Arc<RuleBasedMethod>,
}

impl OllamaNativeMethod {
    pub fn new(handler: Arc<PromptHandler>, registry: Arc<SchemaRegistry>, rule_based: Arc<RuleBasedMethod>) -> Self {
        Self { handler, registry, rule_based }
    }
}

#[async_trait]
impl ClassificationMethod for OllamaNativeMethod {
    async fn classify(&self, input: &str, context: &ProcessingContext) -> Result<ClassificationResult> {
        // Short-circuit obvious commands to avoid a network round-trip.
        let quick = self.rule_based.classify(input, context).await?;
        if quick.input_type == InputType::Command && quick.confidence >= 1.0 {
            return Ok(quick);
        }

        let entry = self.registry.get("standard")?;
        let prompt = format!(
            "Classify the following user input as one of command, prompt, or workflow. \
             Respond with the requested JSON schema only.\n\nInput: {input}"
        );
        let request = Request { prompt, response_schema: Some(entry.schema.clone()), ..Default::default() };

        let started = std::time::Instant::now();
        let response = self.handler.complete_request(&request, Some("local")).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let _ = self.registry.track_usage("standard", latency_ms, false, false);
                return Err(e);
            }
        };

        let parsed: NativeClassification = match serde_json::from_str(&response.content) {
            Ok(p) => p,
            Err(e) => {
                let _ = self.registry.track_usage("standard", latency_ms, false, false);
                return Err(Error::validation("INVALID_JSON", format!("could not parse native classification: {e}")));
            }
        };

        let input_type = match parse_input_type(&parsed.input_type) {
            Ok(t) => t,
            Err(e) => {
                let _ = self.registry.track_usage("standard", latency_ms, false, true);
                return Err(e);
            }
        };
        let _ = self.registry.track_usage("standard", latency_ms, true, true);
        Ok(ClassificationResult::new(input_type, parsed.confidence, Method::OllamaNative, parsed.reasoning))
    }

    fn expected_accuracy(&self) -> f64 {
        0.85
    }

    fn average_latency_ms(&self) -> f64 {
        250.0
    }

    fn method_name(&self) -> Method {
        Method::OllamaNative
    }
}

pub(crate) fn parse_input_type(s: &str) -> Result<InputType> {
    match s {
        "command" => Ok(InputType::Command),
        "prompt" => Ok(InputType::Prompt),
        "workflow" => Ok(InputType::Workflow),
        other => Err(Error::validation("SCHEMA_VIOLATION", format!("unexpected type `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(parse_input_type("command").unwrap(), InputType::Command);
        assert_eq!(parse_input_type("workflow").unwrap(), InputType::Workflow);
        assert!(parse_input_type("nonsense").is_err());
    }
}

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
struct FunctionCallClassification {
    #[serde(rename = "type")]
    input_type: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    indicators: Vec<String>,
}

/// Structured-output classification via an OpenAI-compatible function-calling
/// endpoint (messages array, generation knobs handled inside [`PromptHandler`]).
pub struct FunctionCallingMethod {
    handler: Arc<PromptHandler>,
    registry: Arc<SchemaRegistry>,
    rule_based: Arc<RuleBasedMethod>,
}

impl FunctionCallingMethod {
    pub fn new(handler: Arc<PromptHandler>, registry: Arc<SchemaRegistry>, rule_based: Arc<RuleBasedMethod>) -> Self {
        Self { handler, registry, rule_based }
    }
}

#[async_trait]
impl ClassificationMethod for FunctionCallingMethod {
    async fn classify(&self, input: &str, context: &ProcessingContext) -> Result<ClassificationResult> {
        let quick = self.rule_based.classify(input, context).await?;
        if quick.input_type == InputType::Command && quick.confidence >= 1.0 {
            return Ok(quick);
        }

        let entry = self.registry.get("detailed")?;
        let prompt = format!(
            "Classify the following user input as one of command, prompt, or workflow, \
             calling the provided function with your answer.\n\nInput: {input}"
        );
        let request = Request { prompt, response_schema: Some(entry.schema.clone()), ..Default::default() };

        let started = std::time::Instant::now();
        let response = self.handler.complete_request(&request, Some("remote")).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let _ = self.registry.track_usage("detailed", latency_ms, false, false);
                return Err(e);
            }
        };

        let parsed: FunctionCallClassification = match serde_json::from_str(&response.content) {
            Ok(p) => p,
            Err(e) => {
                let _ = self.registry.track_usage("detailed", latency_ms, false, false);
                return Err(Error::validation("INVALID_JSON", format!("could not parse function-call arguments: {e}")));
            }
        };

        let input_type = match super::ollama_native::parse_input_type(&parsed.input_type) {
            Ok(t) => t,
            Err(e) => {
                let _ = self.registry.track_usage("detailed", latency_ms, false, true);
                return Err(e);
            }
        };
        let _ = self.registry.track_usage("detailed", latency_ms, true, true);
        let mut result = ClassificationResult::new(input_type, parsed.confidence, Method::LangchainFunctionCalling, parsed.reasoning);
        if !parsed.indicators.is_empty() {
            result = result.with_extracted("indicators", serde_json::json!(parsed.indicators));
        }
        Ok(result)
    }

    fn expected_accuracy(&self) -> f64 {
        0.88
    }

    fn average_latency_ms(&self) -> f64 {
        320.0
    }

    fn method_name(&self) -> Method {
        Method::LangchainFunctionCalling
    }
}

pub mod ensemble;
pub mod function_calling;
pub mod hybrid;
pub mod ollama_native;
pub mod rule_based;
pub mod schema;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ProcessingContext;
use crate::error::{Error, Result};
use crate::provider::handler::PromptHandler;

pub use schema::SchemaRegistry;

/// The three things a single utterance can turn out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Command,
    Prompt,
    Workflow,
}

/// Which [`ClassificationMethod`] produced a [`ClassificationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    RuleBased,
    OllamaNative,
    LangchainFunctionCalling,
    Hybrid,
    Ensemble,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::RuleBased => "rule-based",
            Method::OllamaNative => "ollama-native",
            Method::LangchainFunctionCalling => "langchain-function-calling",
            Method::Hybrid => "hybrid",
            Method::Ensemble => "ensemble",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub confidence: f64,
    pub method: Method,
    pub reasoning: String,
    #[serde(default)]
    pub extracted_data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ClassificationResult {
    pub fn new(input_type: InputType, confidence: f64, method: Method, reasoning: impl Into<String>) -> Self {
        Self {
            input_type,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            reasoning: reasoning.into(),
            extracted_data: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_extracted(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extracted_data.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Options a caller can pass to [`Classifier::classify`].
#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    pub method: Option<Method>,
}

/// Uniform interface every classification method implements. Object-safe so the
/// dispatcher can hold a method table of `Box<dyn ClassificationMethod>`.
#[async_trait]
pub trait ClassificationMethod: Send + Sync {
    async fn classify(&self, input: &str, context: &ProcessingContext) -> Result<ClassificationResult>;
    fn is_available(&self) -> bool {
        true
    }
    fn expected_accuracy(&self) -> f64;
    fn average_latency_ms(&self) -> f64;
    fn method_name(&self) -> Method;
}

const MAX_INPUT_LEN: usize = 8192;

#[derive(Debug, Clone, Default)]
pub struct ClassifierStats {
    pub total_classifications: u64,
    pub total_processing_time_ms: f64,
    pub total_confidence: f64,
    pub type_distribution: HashMap<String, u64>,
    pub method_usage: HashMap<String, u64>,
}

impl ClassifierStats {
    pub fn average_confidence(&self) -> f64 {
        if self.total_classifications == 0 {
            0.0
        } else {
            self.total_confidence / self.total_classifications as f64
        }
    }
}

/// Dispatches classification requests to the configured method, with a one-shot
/// fallback on failure and running statistics.
pub struct Classifier {
    methods: HashMap<Method, Box<dyn ClassificationMethod>>,
    default_method: Method,
    fallback_method: Option<Method>,
    command_prefix: String,
    stats: Mutex<ClassifierStats>,
}

pub struct ClassifierConfig {
    pub default_method: Method,
    pub fallback_method: Option<Method>,
    pub command_prefix: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_method: Method::RuleBased,
            fallback_method: Some(Method::RuleBased),
            command_prefix: "/".to_string(),
        }
    }
}

impl Classifier {
    /// Builds the full method table (rule-based always available; the LLM-backed
    /// methods share the given handler; hybrid/ensemble wrap the others).
    pub fn new(config: ClassifierConfig, handler: std::sync::Arc<PromptHandler>, registry: std::sync::Arc<SchemaRegistry>) -> Self {
        let mut methods: HashMap<Method, Box<dyn ClassificationMethod>> = HashMap::new();
        let rule = std::sync::Arc::new(rule_based::RuleBasedMethod::new(config.command_prefix.clone()));
        methods.insert(Method::RuleBased, Box::new(rule_based::RuleBasedMethod::new(config.command_prefix.clone())));
        methods.insert(
            Method::OllamaNative,
            Box::new(ollama_native::OllamaNativeMethod::new(handler.clone(), registry.clone(), rule.clone())),
        );
        methods.insert(
            Method::LangchainFunctionCalling,
            Box::new(function_calling::FunctionCallingMethod::new(handler.clone(), registry.clone(), rule.clone())),
        );
        methods.insert(
            Method::Hybrid,
            Box::new(hybrid::HybridMethod::new(
                rule.clone(),
                std::sync::Arc::new(ollama_native::OllamaNativeMethod::new(handler.clone(), registry.clone(), rule.clone())),
                0.8,
            )),
        );
        methods.insert(
            Method::Ensemble,
            Box::new(ensemble::EnsembleMethod::new(
                vec![
                    Box::new(rule_based::RuleBasedMethod::new(config.command_prefix.clone())),
                    Box::new(ollama_native::OllamaNativeMethod::new(handler.clone(), registry.clone(), rule.clone())),
                    Box::new(function_calling::FunctionCallingMethod::new(handler, registry, rule)),
                ],
                0.6,
            )),
        );

        Self {
            methods,
            default_method: config.default_method,
            fallback_method: config.fallback_method,
            command_prefix: config.command_prefix,
            stats: Mutex::new(ClassifierStats::default()),
        }
    }

    pub async fn classify(
        &self,
        input: &str,
        context: &ProcessingContext,
        options: ClassifyOptions,
    ) -> Result<ClassificationResult> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("INVALID_INPUT", "input must not be empty"));
        }
        if input.len() > MAX_INPUT_LEN {
            return Err(Error::validation("INPUT_TOO_LONG", format!("input exceeds {MAX_INPUT_LEN} bytes")));
        }

        let method = options.method.unwrap_or(self.default_method);
        let start = Instant::now();
        let result = self.run_method(method, input, context).await;

        let result = match result {
            Ok(r) => Ok(r),
            Err(primary_err) => match self.fallback_method {
                Some(fallback) if fallback != method => {
                    match self.run_method(fallback, input, context).await {
                        Ok(mut r) => {
                            r.confidence = (r.confidence - 0.2).max(0.1);
                            r.reasoning = format!("[fallback after {} failed: {}] {}", method.name(), primary_err.message, r.reasoning);
                            Ok(r)
                        }
                        Err(_) => Ok(self.safe_default(input)),
                    }
                }
                _ => Ok(self.safe_default(input)),
            },
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Ok(r) = &result {
            let mut stats = self.stats.lock().unwrap();
            stats.total_classifications += 1;
            stats.total_processing_time_ms += elapsed_ms;
            stats.total_confidence += r.confidence;
            *stats.type_distribution.entry(format!("{:?}", r.input_type)).or_insert(0) += 1;
            *stats.method_usage.entry(r.method.name().to_string()).or_insert(0) += 1;
        }

        result
    }

    async fn run_method(&self, method: Method, input: &str, context: &ProcessingContext) -> Result<ClassificationResult> {
        let m = self
            .methods
            .get(&method)
            .ok_or_else(|| Error::business("METHOD_UNAVAILABLE", format!("no method `{}` configured", method.name())))?;
        if !m.is_available() {
            return Err(Error::business("METHOD_UNAVAILABLE", format!("method `{}` is unavailable", method.name())));
        }
        m.classify(input, context).await
    }

    fn safe_default(&self, input: &str) -> ClassificationResult {
        let input_type = if input.trim_start().starts_with(self.command_prefix.as_str()) {
            InputType::Command
        } else {
            InputType::Prompt
        };
        ClassificationResult::new(input_type, 0.1, Method::RuleBased, "all configured methods failed; safe default")
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap() = ClassifierStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_average_confidence_handles_zero() {
        let stats = ClassifierStats::default();
        assert_eq!(stats.average_confidence(), 0.0);
    }

    #[test]
    fn stats_average_confidence_computes() {
        let mut stats = ClassifierStats::default();
        stats.total_classifications = 2;
        stats.total_confidence = 1.5;
        assert_eq!(stats.average_confidence(), 0.75);
    }
}

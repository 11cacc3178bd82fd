use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::ollama_native::OllamaNativeMethod;
use super::rule_based::RuleBasedMethod;
use super::{ClassificationMethod, ClassificationResult, Method};
use crate::context::ProcessingContext;
use crate::error::Result;

/// Two-stage dispatch: a cheap rule-based pass first, escalating to an LLM-backed
/// method only when the rule-based confidence is below `threshold`. Confidence
/// blending rewards agreement between the two stages and discounts disagreement.
pub struct HybridMethod {
    rule_based: Arc<RuleBasedMethod>,
    llm: Arc<OllamaNativeMethod>,
    threshold: f64,
}

impl HybridMethod {
    pub fn new(rule_based: Arc<RuleBasedMethod>, llm: Arc<OllamaNativeMethod>, threshold: f64) -> Self {
        Self { rule_based, llm, threshold }
    }
}

#[async_trait]
impl ClassificationMethod for HybridMethod {
    async fn classify(&self, input: &str, context: &ProcessingContext) -> Result<ClassificationResult> {
        let stage1 = self.rule_based.classify(input, context).await?;
        if stage1.confidence >= self.threshold {
            let mut result = stage1;
            result.method = Method::Hybrid;
            result.metadata.insert("stage".to_string(), Value::String("rule-only".to_string()));
            return Ok(result);
        }

        let stage2 = self.llm.classify(input, context).await?;
        let agree = stage1.input_type == stage2.input_type;
        let confidence = if agree {
            (((stage1.confidence + stage2.confidence) / 2.0) + 0.1).min(0.98)
        } else {
            (stage2.confidence - 0.1).max(0.6)
        };

        let mut extracted = stage1.extracted_data.clone();
        extracted.extend(stage2.extracted_data.clone());

        let reasoning = format!(
            "hybrid: rule-based -> {:?} ({:.2}), llm -> {:?} ({:.2}), {}",
            stage1.input_type,
            stage1.confidence,
            stage2.input_type,
            stage2.confidence,
            if agree { "agreed" } else { "disagreed, trusting llm" }
        );

        let mut result = ClassificationResult::new(stage2.input_type, confidence, Method::Hybrid, reasoning);
        result.extracted_data = extracted;
        result.metadata.insert("stage".to_string(), Value::String("two-stage".to_string()));
        result.metadata.insert("agreed".to_string(), Value::Bool(agree));
        Ok(result)
    }

    fn expected_accuracy(&self) -> f64 {
        0.86
    }

    fn average_latency_ms(&self) -> f64 {
        130.0
    }

    fn method_name(&self) -> Method {
        Method::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::schema::SchemaRegistry;
    use crate::provider::config::{Defaults, Features, PromptConfig, ProviderConfig, ProviderKind, ModelInfoConfig};
    use crate::provider::handler::PromptHandler;
    use std::collections::HashMap;

    fn handler() -> Arc<PromptHandler> {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                kind: ProviderKind::Local,
                base_url: Some("http://localhost:11434".into()),
                api_key: None,
                timeout_ms: 5_000,
                models: vec![ModelInfoConfig { name: "llama3".into(), display_name: None, default: true, context_length: 4096, capabilities: vec![] }],
            },
        );
        let config = PromptConfig {
            providers,
            defaults: Defaults { provider: "local".into(), model: None, temperature: 0.7, max_tokens: 512, timeout_ms: 5_000 },
            features: Features { enable_streaming: true, enable_retries: false, enable_fallback: false, ensemble_escalation: false },
        };
        Arc::new(PromptHandler::from_config(&config))
    }

    #[tokio::test]
    async fn high_confidence_rule_based_short_circuits() {
        let rule = Arc::new(RuleBasedMethod::new("/".to_string()));
        let registry = Arc::new(SchemaRegistry::new());
        let llm = Arc::new(OllamaNativeMethod::new(handler(), registry, rule.clone()));
        let hybrid = HybridMethod::new(rule, llm, 0.8);

        let ctx = ProcessingContext::new("s1", "cli");
        let result = hybrid.classify("/status", &ctx).await.unwrap();
        assert_eq!(result.method, Method::Hybrid);
        assert_eq!(result.confidence, 1.0);
    }
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use super::{ClassificationMethod, ClassificationResult, InputType, Method};
use crate::context::ProcessingContext;
use crate::error::{Error, Result};

/// Shared deadline for the whole fan-out: one hung member must not stall the
/// ensemble indefinitely.
const ENSEMBLE_DEADLINE: Duration = Duration::from_secs(10);

/// Runs several methods in parallel and requires `minimum_agreement` of them to
/// agree on the resulting `type` before trusting the majority.
pub struct EnsembleMethod {
    methods: Vec<Box<dyn ClassificationMethod>>,
    minimum_agreement: f64,
}

impl EnsembleMethod {
    pub fn new(methods: Vec<Box<dyn ClassificationMethod>>, minimum_agreement: f64) -> Self {
        Self { methods, minimum_agreement }
    }
}

#[async_trait]
impl ClassificationMethod for EnsembleMethod {
    async fn classify(&self, input: &str, context: &ProcessingContext) -> Result<ClassificationResult> {
        let futures = self.methods.iter().map(|m| m.classify(input, context));
        let outcomes = tokio::time::timeout(ENSEMBLE_DEADLINE, join_all(futures))
            .await
            .map_err(|_| Error::timeout("ENSEMBLE_TIMEOUT", "ensemble members did not complete within the shared deadline"))?;
        let results: Vec<ClassificationResult> = outcomes.into_iter().filter_map(|r| r.ok()).collect();

        if results.is_empty() {
            return Err(Error::business("ALL_METHODS_FAILED", "no ensemble member produced a result"));
        }

        let mut tally: HashMap<InputType, Vec<&ClassificationResult>> = HashMap::new();
        for r in &results {
            tally.entry(r.input_type).or_default().push(r);
        }

        let (winning_type, agreeing) = tally
            .into_iter()
            .max_by_key(|(_, members)| members.len())
            .expect("results is non-empty so tally is non-empty");

        let agreement_ratio = agreeing.len() as f64 / results.len() as f64;
        if agreement_ratio < self.minimum_agreement {
            return Err(Error::business(
                "AGREEMENT_TOO_LOW",
                format!("only {:.0}% of ensemble members agreed, below the {:.0}% threshold", agreement_ratio * 100.0, self.minimum_agreement * 100.0),
            ));
        }

        let mean_confidence = agreeing.iter().map(|r| r.confidence).sum::<f64>() / agreeing.len() as f64;
        let dissenters: Vec<Value> = results
            .iter()
            .filter(|r| r.input_type != winning_type)
            .map(|r| serde_json::json!({"method": r.method.name(), "type": format!("{:?}", r.input_type), "confidence": r.confidence}))
            .collect();

        let reasoning = format!(
            "ensemble: {}/{} methods agreed on {:?}",
            agreeing.len(),
            results.len(),
            winning_type
        );

        let mut result = ClassificationResult::new(winning_type, mean_confidence, Method::Ensemble, reasoning);
        result.metadata.insert("agreementRatio".to_string(), serde_json::json!(agreement_ratio));
        result.metadata.insert("dissenters".to_string(), Value::Array(dissenters));
        Ok(result)
    }

    fn expected_accuracy(&self) -> f64 {
        0.9
    }

    fn average_latency_ms(&self) -> f64 {
        self.methods.iter().map(|m| m.average_latency_ms()).fold(0.0, f64::max)
    }

    fn method_name(&self) -> Method {
        Method::Ensemble
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::rule_based::RuleBasedMethod;

    #[tokio::test]
    async fn single_method_ensemble_always_agrees() {
        let ensemble = EnsembleMethod::new(vec![Box::new(RuleBasedMethod::new("/".to_string()))], 0.6);
        let ctx = ProcessingContext::new("s1", "cli");
        let result = ensemble.classify("/help", &ctx).await.unwrap();
        assert_eq!(result.method, Method::Ensemble);
        assert_eq!(result.input_type, InputType::Command);
    }

    #[tokio::test]
    async fn agreement_below_threshold_fails() {
        // Two identical rule-based instances always agree with each other, so to
        // exercise the disagreement path we need methods returning different types;
        // constructing that without a mock LLM is covered by the dispatcher-level
        // fallback tests instead. This test only checks the all-failed path.
        let ensemble = EnsembleMethod::new(vec![], 0.6);
        let ctx = ProcessingContext::new("s1", "cli");
        let err = ensemble.classify("anything", &ctx).await.unwrap_err();
        assert_eq!(err.code, "ALL_METHODS_FAILED");
    }
}

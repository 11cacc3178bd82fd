use async_trait::async_trait;
use serde_json::json;

use super::{ClassificationMethod, ClassificationResult, InputType, Method};
use crate::context::ProcessingContext;
use crate::error::Result;

const GREETINGS: &[&str] = &["hi", "hello", "hey", "thanks", "thank you", "good morning", "good evening"];
const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "can you", "could you", "is it", "does it"];
const ACTION_VERBS: &[&str] = &["create", "build", "implement", "refactor", "migrate", "deploy", "generate", "set up", "configure", "write"];
const MULTI_STEP_MARKERS: &[&str] = &["then", "after that", "next", "first", "finally", "step 1", "and then"];
const FILE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".js", ".ts", ".json", ".toml", ".yaml", ".yml", ".md", ".txt", ".go", ".java", ".c", ".cpp", ".sh", ".hs",
];

/// Deterministic, no-network classifier: a cascade of cheap substring and token
/// checks rather than a model call.
pub struct RuleBasedMethod {
    command_prefix: String,
}

impl RuleBasedMethod {
    pub fn new(command_prefix: String) -> Self {
        Self { command_prefix }
    }

    fn matching(haystack: &str, needles: &'static [&'static str]) -> Vec<&'static str> {
        needles.iter().copied().filter(|n| haystack.contains(n)).collect()
    }

    fn matching_extensions(input: &str) -> Vec<&'static str> {
        FILE_EXTENSIONS.iter().copied().filter(|ext| input.contains(ext)).collect()
    }

    fn has_file_reference(input: &str, extensions: &[&str]) -> bool {
        !extensions.is_empty() || input.contains('/') || input.contains('\\')
    }
}

#[async_trait]
impl ClassificationMethod for RuleBasedMethod {
    async fn classify(&self, input: &str, _context: &ProcessingContext) -> Result<ClassificationResult> {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();

        if trimmed.starts_with(self.command_prefix.as_str()) {
            let rest = &trimmed[self.command_prefix.len()..];
            let mut parts = rest.split_whitespace();
            let command_name = parts.next().unwrap_or("").to_string();
            let args: Vec<&str> = parts.collect();
            return Ok(ClassificationResult::new(InputType::Command, 1.0, Method::RuleBased, "input begins with the configured command prefix")
                .with_extracted("commandName", json!(command_name))
                .with_extracted("args", json!(args)));
        }

        let greeting_hits = Self::matching(&lower, GREETINGS).len();
        let question_hits = Self::matching(&lower, QUESTION_WORDS).len();
        let action_matches = Self::matching(&lower, ACTION_VERBS);
        let multi_step_matches = Self::matching(&lower, MULTI_STEP_MARKERS);
        let extension_matches = Self::matching_extensions(trimmed);
        let has_file_ref = Self::has_file_reference(trimmed, &extension_matches);

        let prompt_signal = greeting_hits + question_hits;
        let workflow_signal = action_matches.len() + multi_step_matches.len() + if has_file_ref { 1 } else { 0 };

        if prompt_signal > 0 && workflow_signal == 0 {
            let confidence = (0.55 + 0.15 * prompt_signal as f64).clamp(0.1, 0.95);
            return Ok(ClassificationResult::new(InputType::Prompt, confidence, Method::RuleBased, "conversational markers dominate, no action/workflow signal"));
        }

        let mut workflow_indicators: Vec<&str> = action_matches.iter().chain(multi_step_matches.iter()).copied().collect();
        if has_file_ref {
            workflow_indicators.extend(extension_matches.iter().copied());
        }

        if workflow_signal >= 2 || (workflow_signal >= 1 && !multi_step_matches.is_empty()) {
            let confidence = (0.5 + 0.12 * workflow_signal as f64).clamp(0.1, 0.95);
            return Ok(
                ClassificationResult::new(InputType::Workflow, confidence, Method::RuleBased, "multiple action/multi-step/file-reference signals")
                    .with_extracted("fileReference", json!(has_file_ref))
                    .with_extracted("workflowIndicators", json!(workflow_indicators)),
            );
        }

        if workflow_signal == 1 {
            return Ok(
                ClassificationResult::new(InputType::Workflow, 0.45, Method::RuleBased, "single action signal, treated as a light workflow")
                    .with_extracted("fileReference", json!(has_file_ref))
                    .with_extracted("workflowIndicators", json!(workflow_indicators)),
            );
        }

        // Ties resolve to prompt.
        Ok(ClassificationResult::new(InputType::Prompt, 0.3, Method::RuleBased, "no decisive signal; defaulting to prompt"))
    }

    fn expected_accuracy(&self) -> f64 {
        0.75
    }

    fn average_latency_ms(&self) -> f64 {
        2.0
    }

    fn method_name(&self) -> Method {
        Method::RuleBased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new("s1", "cli")
    }

    #[tokio::test]
    async fn command_prefix_is_full_confidence() {
        let m = RuleBasedMethod::new("/".to_string());
        let r = m.classify("/status --verbose", &ctx()).await.unwrap();
        assert_eq!(r.input_type, InputType::Command);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.extracted_data.get("commandName").unwrap(), "status");
    }

    #[tokio::test]
    async fn greeting_is_prompt() {
        let m = RuleBasedMethod::new("/".to_string());
        let r = m.classify("hey, thanks for the help", &ctx()).await.unwrap();
        assert_eq!(r.input_type, InputType::Prompt);
    }

    #[tokio::test]
    async fn multi_step_file_reference_is_workflow() {
        let m = RuleBasedMethod::new("/".to_string());
        let r = m
            .classify("first refactor src/main.rs then migrate the config loader", &ctx())
            .await
            .unwrap();
        assert_eq!(r.input_type, InputType::Workflow);
        assert!(r.confidence >= 0.5);
    }

    #[tokio::test]
    async fn write_to_file_is_workflow_with_indicators() {
        let m = RuleBasedMethod::new("/".to_string());
        let r = m
            .classify("write a quicksort in haskell into file foo.hs", &ctx())
            .await
            .unwrap();
        assert_eq!(r.input_type, InputType::Workflow);
        assert!(r.confidence >= 0.6);
        let indicators = r.extracted_data.get("workflowIndicators").unwrap().as_array().unwrap();
        let indicators: Vec<&str> = indicators.iter().map(|v| v.as_str().unwrap()).collect();
        assert!(indicators.contains(&"write"));
        assert!(indicators.contains(&".hs"));
    }

    #[tokio::test]
    async fn ambiguous_input_defaults_to_prompt() {
        let m = RuleBasedMethod::new("/".to_string());
        let r = m.classify("ok", &ctx()).await.unwrap();
        assert_eq!(r.input_type, InputType::Prompt);
        assert!(r.confidence <= 0.3 + f64::EPSILON);
    }
}

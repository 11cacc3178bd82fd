use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Immutable per-request context handed to the classification core. Constructed once
/// by the orchestrator and consumed by exactly one `classify` call.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub session_id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub previous_inputs: Vec<String>,
    pub environment: HashMap<String, String>,
}

/// How many prior inputs are retained in `previous_inputs`.
const HISTORY_WINDOW: usize = 8;

impl ProcessingContext {
    pub fn new(session_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            source: source.into(),
            timestamp: Utc::now(),
            previous_inputs: Vec::new(),
            environment: HashMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Builds a context from a rolling session history, trimming to the trailing window.
    pub fn from_history(session_id: impl Into<String>, source: impl Into<String>, history: &[String]) -> Self {
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        Self {
            previous_inputs: history[start..].to_vec(),
            ..Self::new(session_id, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_is_bounded() {
        let history: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        let ctx = ProcessingContext::from_history("s1", "cli", &history);
        assert_eq!(ctx.previous_inputs.len(), HISTORY_WINDOW);
        assert_eq!(ctx.previous_inputs.first().unwrap(), "12");
        assert_eq!(ctx.previous_inputs.last().unwrap(), "19");
    }

    #[test]
    fn short_history_is_not_padded() {
        let history = vec!["a".to_string(), "b".to_string()];
        let ctx = ProcessingContext::from_history("s1", "cli", &history);
        assert_eq!(ctx.previous_inputs, history);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::ClassificationResult;

/// Priority band a [`Message`] is dequeued under. Strict priority across bands,
/// FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL_DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

/// The common envelope for every message flowing through the [`crate::queue::MessageQueue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub payload: Payload,
}

impl Message {
    pub fn new(priority: Priority, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            priority,
            payload,
        }
    }

    pub fn user_input(input: impl Into<String>, source: impl Into<String>) -> Self {
        let input = input.into();
        Self::new(
            Priority::Normal,
            Payload::UserInput {
                raw: input.clone(),
                input,
                source: source.into(),
            },
        )
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self::new(Priority::Critical, Payload::CancelRequested { reason: reason.into() })
    }

    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::new(Priority::Critical, Payload::Shutdown { reason: reason.into() })
    }
}

/// Per-type payload. Variants beyond the four terminal/producer ones exist to let the
/// orchestrator report progress; exactly one terminal variant (`AgentComplete`,
/// `AgentError`, or `AgentCancelled`) closes out a single `UserInput`'s output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    UserInput {
        input: String,
        raw: String,
        source: String,
    },
    AgentProgress {
        phase: String,
        progress: f64,
        details: String,
    },
    AgentStreamChunk {
        content: String,
        is_complete: bool,
    },
    AgentComplete {
        result: String,
        classification: Option<ClassificationResult>,
    },
    AgentError {
        message: String,
        category: String,
        suggestions: Vec<String>,
    },
    AgentCancelled {
        reason: String,
    },
    CancelRequested {
        reason: String,
    },
    Shutdown {
        reason: String,
    },
}

impl Payload {
    pub fn progress(phase: impl Into<String>, progress: f64, details: impl Into<String>) -> Self {
        Payload::AgentProgress {
            phase: phase.into(),
            progress: progress.clamp(0.0, 1.0),
            details: details.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Payload::AgentComplete { .. } | Payload::AgentError { .. } | Payload::AgentCancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_strict() {
        let mut v = vec![Priority::Low, Priority::Critical, Priority::Normal, Priority::High];
        v.sort();
        assert_eq!(v, vec![Priority::Low, Priority::Normal, Priority::High, Priority::Critical]);
    }

    #[test]
    fn progress_clamps_to_unit_interval() {
        let p = Payload::progress("classify", 1.5, "done");
        match p {
            Payload::AgentProgress { progress, .. } => assert_eq!(progress, 1.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn terminal_variants() {
        assert!(Payload::AgentCancelled { reason: "x".into() }.is_terminal());
        assert!(!Payload::progress("p", 0.1, "").is_terminal());
    }
}

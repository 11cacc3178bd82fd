use std::sync::Arc;

use crate::message::Payload;
use crate::queue::tokio_util_shim::CancellationToken;
use crate::queue::MessageQueue;

/// Drains the output queue and prints to the terminal. Plain-text only; no raw-mode
/// TUI chrome (colors, panes, key bindings) — just enough to close the dataflow loop
/// from input to rendered output.
pub struct Renderer {
    queue: Arc<MessageQueue>,
}

impl Renderer {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }

    /// Runs until the output queue closes.
    pub async fn run(&self) {
        let token = CancellationToken::new();
        loop {
            match self.queue.dequeue(&token).await {
                Ok(message) => self.render(message.payload),
                Err(_) => break,
            }
        }
    }

    fn render(&self, payload: Payload) {
        match payload {
            Payload::AgentProgress { phase, progress, details } => {
                println!("… [{phase}] {:.0}% {details}", progress * 100.0);
            }
            Payload::AgentStreamChunk { content, is_complete } => {
                print!("{content}");
                if is_complete {
                    println!();
                }
            }
            Payload::AgentComplete { result, classification } => {
                if let Some(c) = classification {
                    println!("✔ ({} via {}) {result}", c.input_type_label(), c.method.name());
                } else {
                    println!("✔ {result}");
                }
            }
            Payload::AgentError { message, category, suggestions } => {
                eprintln!("✘ [{category}] {message}");
                for s in suggestions {
                    eprintln!("  - {s}");
                }
            }
            Payload::AgentCancelled { reason } => {
                println!("⨯ cancelled: {reason}");
            }
            other => {
                // UserInput/CancelRequested/Shutdown are input-side messages; the
                // renderer should never see them on a correctly-wired output queue.
                tracing::debug!(?other, "renderer ignoring unexpected input-side message");
            }
        }
    }
}

impl crate::classification::ClassificationResult {
    fn input_type_label(&self) -> &'static str {
        match self.input_type {
            crate::classification::InputType::Command => "command",
            crate::classification::InputType::Prompt => "prompt",
            crate::classification::InputType::Workflow => "workflow",
        }
    }
}

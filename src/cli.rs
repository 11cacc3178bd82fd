use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::message::Message;
use crate::queue::MessageQueue;

/// The CLI producer: reads lines from stdin and enqueues them as `UserInput`, plus
/// interrupt handling that enqueues `CancelRequested`/`Shutdown`. It owns no
/// business logic; every decision about what an input *is* happens downstream in
/// the orchestrator. Reads line-buffered stdin rather than raw-mode terminal input,
/// since rich TUI chrome is out of scope here.
pub struct CliInput {
    queue: Arc<MessageQueue>,
    source: String,
}

impl CliInput {
    pub fn new(queue: Arc<MessageQueue>, source: impl Into<String>) -> Self {
        Self { queue, source: source.into() }
    }

    /// Runs until stdin closes (EOF) or a line equal to `exit`/`quit` is read.
    pub async fn run(&self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed == "exit" || trimmed == "quit" {
                        let _ = self.queue.enqueue(Message::shutdown("user requested exit")).await;
                        break;
                    }
                    let _ = self.queue.enqueue(Message::user_input(trimmed, self.source.clone())).await;
                }
                Ok(None) => {
                    let _ = self.queue.enqueue(Message::shutdown("stdin closed")).await;
                    break;
                }
                Err(_) => {
                    let _ = self.queue.enqueue(Message::shutdown("stdin read error")).await;
                    break;
                }
            }
        }
    }

    /// Enqueues a single one-shot input, for headless `--prompt` invocations.
    pub async fn run_once(&self, input: &str) {
        let _ = self.queue.enqueue(Message::user_input(input, self.source.clone())).await;
        let _ = self.queue.enqueue(Message::shutdown("one-shot input consumed")).await;
    }
}

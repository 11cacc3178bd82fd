use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::classification::{ClassifyOptions, Classifier};
use crate::command::CommandRegistry;
use crate::context::ProcessingContext;
use crate::memory::AppendOnlyLog;
use crate::message::{Message, Payload, Priority};
use crate::provider::handler::PromptHandler;
use crate::queue::tokio_util_shim::CancellationToken;
use crate::queue::MessageQueue;
use crate::workflow::Workflow;

/// The single cooperative consumer over the input queue. Dequeues one message at a
/// time, classifies `UserInput`, dispatches to the command registry, the prompt
/// handler (via the classifier's own provider access for `prompt`-type input), or a
/// workflow, and emits progress/terminal messages to the output queue.
pub struct Orchestrator {
    input: Arc<MessageQueue>,
    output: Arc<MessageQueue>,
    classifier: Arc<Classifier>,
    commands: CommandRegistry,
    handler: Arc<PromptHandler>,
    workflow: Arc<dyn Workflow>,
    memory: AppendOnlyLog,
    session_id: String,
    history: Mutex<Vec<String>>,
    active_cancellation: Mutex<HashMap<String, CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        input: Arc<MessageQueue>,
        output: Arc<MessageQueue>,
        classifier: Arc<Classifier>,
        handler: Arc<PromptHandler>,
        workflow: Arc<dyn Workflow>,
        memory: AppendOnlyLog,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            input,
            output,
            classifier,
            commands: CommandRegistry::new(),
            handler,
            workflow,
            memory,
            session_id: session_id.into(),
            history: Mutex::new(Vec::new()),
            active_cancellation: Mutex::new(HashMap::new()),
        }
    }

    /// Runs until a `Shutdown` message is processed or the input queue closes.
    ///
    /// Each `UserInput` is dispatched onto its own task rather than awaited inline, so
    /// a `CancelRequested`/`Shutdown` dequeued while a request is mid-flight is acted
    /// on immediately instead of waiting for that request to finish.
    pub async fn run(self: Arc<Self>) {
        let shutdown_token = CancellationToken::new();
        let mut in_flight = Vec::new();
        loop {
            let message = match self.input.dequeue(&shutdown_token).await {
                Ok(m) => m,
                Err(err) => {
                    warn!(code = %err.code, "orchestrator stopping: dequeue failed");
                    break;
                }
            };

            match message.payload {
                Payload::UserInput { input, source, .. } => {
                    let request_id = message.id.clone();
                    let this = self.clone();
                    in_flight.push(tokio::spawn(async move {
                        this.handle_user_input(request_id, input, source).await;
                    }));
                    in_flight.retain(|h| !h.is_finished());
                }
                Payload::CancelRequested { reason } => {
                    self.handle_cancel(reason).await;
                }
                Payload::Shutdown { reason } => {
                    info!(%reason, "orchestrator shutting down");
                    self.output.close().await;
                    break;
                }
                other => {
                    warn!(?other, "orchestrator received an output-only message; ignoring");
                }
            }
        }
        for handle in in_flight {
            let _ = handle.await;
        }
    }

    async fn handle_cancel(&self, reason: String) {
        let mut active = self.active_cancellation.lock().await;
        for (_, token) in active.drain() {
            token.cancel();
        }
        drop(active);
        let _ = self
            .output
            .enqueue(Message::new(Priority::Critical, Payload::AgentCancelled { reason }))
            .await;
    }

    /// Races `fut` against `token` being cancelled, so a suspension point inside a
    /// classifier/provider/workflow call can be preempted rather than run to completion.
    async fn race_cancel<T>(
        token: &CancellationToken,
        fut: impl std::future::Future<Output = crate::error::Result<T>>,
    ) -> crate::error::Result<T> {
        tokio::select! {
            result = fut => result,
            _ = token.cancelled() => Err(crate::error::Error::cancelled("request was cancelled")),
        }
    }

    async fn handle_user_input(&self, request_id: String, input: String, source: String) {
        let token = CancellationToken::new();
        self.active_cancellation.lock().await.insert(request_id.clone(), token.clone());

        let history_snapshot = {
            let mut history = self.history.lock().await;
            history.push(input.clone());
            history.clone()
        };
        let context = ProcessingContext::from_history(self.session_id.clone(), source, &history_snapshot);

        let _ = self
            .output
            .enqueue(Message::new(Priority::Normal, Payload::progress("classify", 0.1, "classifying input")))
            .await;

        let classification = match Self::race_cancel(&token, self.classifier.classify(&input, &context, ClassifyOptions::default())).await {
            Ok(c) => c,
            Err(err) => {
                if err.category != crate::error::ErrorCategory::Cancelled {
                    self.emit_error(&err).await;
                }
                self.active_cancellation.lock().await.remove(&request_id);
                return;
            }
        };

        let _ = self
            .output
            .enqueue(Message::new(
                Priority::Normal,
                Payload::progress("dispatch", 0.4, format!("dispatching as {:?} via {}", classification.input_type, classification.method.name())),
            ))
            .await;

        use crate::classification::InputType;
        let outcome = match classification.input_type {
            InputType::Command => self.commands.dispatch_extracted(&classification.extracted_data),
            InputType::Prompt => Self::race_cancel(&token, self.handler.complete(input.clone(), None)).await.map(|r| r.content),
            InputType::Workflow => Self::race_cancel(&token, self.workflow.run(&input)).await,
        };

        match outcome {
            Ok(result) => {
                let _ = self.memory.record(&input, &classification, &result);
                let _ = self
                    .output
                    .enqueue(Message::new(
                        Priority::Normal,
                        Payload::AgentComplete { result, classification: Some(classification) },
                    ))
                    .await;
            }
            Err(err) if err.category == crate::error::ErrorCategory::Cancelled => {
                let _ = self.memory.record(&input, &classification, "cancelled");
            }
            Err(err) => {
                let _ = self.memory.record(&input, &classification, &format!("error: {}", err.message));
                self.emit_error(&err).await;
            }
        }

        self.active_cancellation.lock().await.remove(&request_id);
    }

    async fn emit_error(&self, err: &crate::error::Error) {
        let _ = self
            .output
            .enqueue(Message::new(
                Priority::High,
                Payload::AgentError {
                    message: err.message.clone(),
                    category: err.category.to_string(),
                    suggestions: err.suggestions(),
                },
            ))
            .await;
    }
}

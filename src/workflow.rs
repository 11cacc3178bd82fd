use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::handler::PromptHandler;

/// A multi-step collaborator the `workflow` classification path dispatches to.
/// One illustrative implementation (plan, then summarize) is provided so the
/// dataflow closes end-to-end; a full planning engine is out of scope here.
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn run(&self, input: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

pub struct PlanThenSummarizeWorkflow {
    handler: Arc<PromptHandler>,
}

impl PlanThenSummarizeWorkflow {
    pub fn new(handler: Arc<PromptHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Workflow for PlanThenSummarizeWorkflow {
    async fn run(&self, input: &str) -> Result<String> {
        let plan = self
            .handler
            .complete(format!("Break the following task into a short numbered plan:\n{input}"), None)
            .await?;
        let summary = self
            .handler
            .complete(format!("Summarize this plan in one sentence:\n{}", plan.content), None)
            .await?;
        Ok(format!("plan:\n{}\n\nsummary: {}", plan.content, summary.content))
    }

    fn name(&self) -> &'static str {
        "plan-then-summarize"
    }
}

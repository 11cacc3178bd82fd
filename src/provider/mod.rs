pub mod config;
pub mod handler;
pub mod local;
pub mod remote;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Optional JSON schema the provider should constrain/parse output against.
    /// Used by the native-JSON-schema and function-calling classification methods.
    pub response_schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub is_complete: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub context_length: u32,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub json_schema: bool,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Maps a non-2xx HTTP response to an [`crate::error::Error`]: 5xx is a transient
/// `Network` failure worth retrying, 4xx is a non-transient `Business` failure
/// surfaced immediately (per the provider error taxonomy).
pub(crate) fn http_status_error(status: reqwest::StatusCode, body: &str) -> crate::error::Error {
    if status.is_server_error() {
        crate::error::Error::network("PROVIDER_ERROR", format!("provider returned {status}: {body}")).with_context("status", status.as_str())
    } else {
        crate::error::Error::business("PROVIDER_ERROR", format!("provider returned {status}: {body}")).with_context("status", status.as_str())
    }
}

/// Uniform provider contract: local (e.g. an Ollama-style server) and remote
/// (OpenAI-compatible) backends both implement this so the handler, and the
/// classification methods built on top of it, never branch on backend identity.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response>;
    async fn stream(&self, request: &Request) -> Result<ChunkStream>;
    async fn is_available(&self) -> Result<bool>;
    fn capabilities(&self) -> Capabilities;
    fn models(&self) -> Vec<ModelInfo>;
    fn default_model(&self) -> Option<String> {
        self.models().iter().find(|m| m.is_default).or_else(|| self.models().first()).map(|m| m.name.clone())
    }
}

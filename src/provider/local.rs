use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::provider::config::ProviderConfig;
use crate::provider::{http_status_error, Capabilities, ChunkStream, ModelInfo, Provider, Request, Response, StreamChunk, Usage};

/// A locally-hosted, Ollama-style provider: `POST {base_url}/api/generate`, optional
/// `format` field pinning a JSON schema, newline-delimited-JSON streaming.
///
/// Wire shape: a single POST, a `stream` flag, and either one JSON body or a
/// frame-per-line stream terminated by a `done` marker.
pub struct LocalProvider {
    client: reqwest::Client,
    base_url: String,
    models: Vec<ModelInfo>,
}

impl LocalProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            models: config.models.iter().map(Into::into).collect(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn body(&self, request: &Request, stream: bool) -> Value {
        let model = request.model.clone().or_else(|| self.default_model()).unwrap_or_default();
        let mut body = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": stream,
            "options": {
                "temperature": request.temperature.unwrap_or(0.7),
                "num_predict": request.max_tokens.unwrap_or(2048),
            },
        });
        if let Some(schema) = &request.response_schema {
            body["format"] = schema.clone();
        }
        body
    }
}

#[derive(Debug, serde::Deserialize)]
struct GenerateFrame {
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl Provider for LocalProvider {
    async fn complete(&self, request: &Request) -> Result<Response> {
        let resp = self
            .client
            .post(self.endpoint("/api/generate"))
            .json(&self.body(request, false))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_status_error(status, &text));
        }

        let frame: GenerateFrame = resp.json().await.map_err(Error::from)?;
        Ok(Response {
            content: frame.response,
            usage: Some(Usage {
                prompt_tokens: frame.prompt_eval_count.unwrap_or(0),
                completion_tokens: frame.eval_count.unwrap_or(0),
                total_tokens: frame.prompt_eval_count.unwrap_or(0) + frame.eval_count.unwrap_or(0),
            }),
            model: request.model.clone().or_else(|| self.default_model()).unwrap_or_default(),
            finish_reason: Some(if frame.done { "stop".to_string() } else { "incomplete".to_string() }),
            metadata: Default::default(),
        })
    }

    async fn stream(&self, request: &Request) -> Result<ChunkStream> {
        let resp = self
            .client
            .post(self.endpoint("/api/generate"))
            .json(&self.body(request, true))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_status_error(status, &text));
        }

        let byte_stream = resp.bytes_stream();
        let mapped = byte_stream.scan(String::new(), move |pending, chunk| {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => return futures::future::ready(Some(vec![Err(Error::from(e))])),
            };
            pending.push_str(&String::from_utf8_lossy(&chunk));
            let mut out = Vec::new();
            while let Some(pos) = pending.find('\n') {
                let line = pending[..pos].trim().to_string();
                *pending = pending[pos + 1..].to_string();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<GenerateFrame>(&line) {
                    Ok(frame) => out.push(Ok(StreamChunk {
                        content: frame.response,
                        is_complete: frame.done,
                        metadata: Default::default(),
                    })),
                    Err(e) => out.push(Err(Error::validation("INVALID_JSON", e.to_string()))),
                }
            }
            futures::future::ready(Some(out))
        });

        let flattened = mapped.flat_map(futures::stream::iter);
        Ok(Box::pin(flattened))
    }

    async fn is_available(&self) -> Result<bool> {
        let resp = self.client.get(self.endpoint("/api/tags")).send().await;
        Ok(resp.map(|r| r.status().is_success()).unwrap_or(false))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { streaming: true, function_calling: false, json_schema: true }
    }

    fn models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_schema_when_requested() {
        let provider = LocalProvider {
            client: reqwest::Client::new(),
            base_url: "http://localhost:11434".to_string(),
            models: vec![ModelInfo { name: "llama3".into(), display_name: None, is_default: true, context_length: 4096, capabilities: vec![] }],
        };
        let req = Request { prompt: "classify this".into(), response_schema: Some(json!({"type": "object"})), ..Default::default() };
        let body = provider.body(&req, false);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["format"]["type"], "object");
        assert_eq!(body["stream"], false);
    }
}

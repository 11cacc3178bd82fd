use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::provider::config::ProviderConfig;
use crate::provider::{http_status_error, Capabilities, ChunkStream, ModelInfo, Provider, Request, Response, StreamChunk, Usage};

/// An OpenAI-compatible remote provider: `POST {base_url}/v1/chat/completions`,
/// Bearer auth, optional `tools`/`tool_choice` for function-calling structured
/// output, and SSE (`data: {...}` frames terminated by `data: [DONE]`) streaming.
pub struct RemoteProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    models: Vec<ModelInfo>,
}

impl RemoteProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            models: config.models.iter().map(Into::into).collect(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn body(&self, request: &Request, stream: bool) -> Value {
        let model = request.model.clone().or_else(|| self.default_model()).unwrap_or_default();
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature.unwrap_or(0.7),
            "max_tokens": request.max_tokens.unwrap_or(2048),
            "stream": stream,
        });
        if let Some(schema) = &request.response_schema {
            body["tools"] = json!([{
                "type": "function",
                "function": {
                    "name": "emit_classification",
                    "description": "Return the structured classification result.",
                    "parameters": schema,
                },
            }]);
            body["tool_choice"] = json!({"type": "function", "function": {"name": "emit_classification"}});
        }
        body
    }

    fn request_builder(&self, stream: bool, request: &Request) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(self.endpoint()).json(&self.body(request, stream));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[derive(Debug, serde::Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, serde::Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, serde::Deserialize)]
struct ToolCallFunction {
    arguments: String,
}

#[derive(Debug, serde::Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn extract_content(message: &ChatMessage) -> String {
    if let Some(call) = message.tool_calls.first() {
        return call.function.arguments.clone();
    }
    message.content.clone().unwrap_or_default()
}

#[async_trait]
impl Provider for RemoteProvider {
    async fn complete(&self, request: &Request) -> Result<Response> {
        let resp = self.request_builder(false, request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(http_status_error(status, &text));
        }
        let completion: ChatCompletion = resp.json().await.map_err(Error::from)?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::business("PROVIDER_ERROR", "remote provider returned no choices"))?;
        let content = extract_content(&choice.message);
        Ok(Response {
            content,
            usage: completion.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: completion.model.unwrap_or_else(|| request.model.clone().unwrap_or_default()),
            finish_reason: choice.finish_reason,
            metadata: Default::default(),
        })
    }

    async fn stream(&self, request: &Request) -> Result<ChunkStream> {
        let resp = self.request_builder(true, request).send().await?;
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
            while let Some(pos) = pending.find("\n\n") {
                let frame = pending[..pos].to_string();
                *pending = pending[pos + 2..].to_string();
                let Some(data) = frame.strip_prefix("data: ").or_else(|| frame.strip_prefix("data:")) else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    out.push(Ok(StreamChunk { content: String::new(), is_complete: true, metadata: Default::default() }));
                    continue;
                }
                match serde_json::from_str::<Value>(data) {
                    Ok(v) => {
                        let delta = v["choices"][0]["delta"]["content"].as_str().unwrap_or("").to_string();
                        let finished = v["choices"][0]["finish_reason"].is_string();
                        out.push(Ok(StreamChunk { content: delta, is_complete: finished, metadata: Default::default() }));
                    }
                    Err(e) => out.push(Err(Error::validation("INVALID_JSON", e.to_string()))),
                }
            }
            futures::future::ready(Some(out))
        });

        Ok(Box::pin(mapped.flat_map(futures::stream::iter)))
    }

    async fn is_available(&self) -> Result<bool> {
        let mut builder = self.client.get(format!("{}/v1/models", self.base_url.trim_end_matches('/')));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await;
        Ok(resp.map(|r| r.status().is_success()).unwrap_or(false))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { streaming: true, function_calling: true, json_schema: true }
    }

    fn models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RemoteProvider {
        RemoteProvider {
            client: reqwest::Client::new(),
            base_url: "https://api.example.com".to_string(),
            api_key: Some("sk-test".to_string()),
            models: vec![ModelInfo { name: "gpt-x".into(), display_name: None, is_default: true, context_length: 8192, capabilities: vec![] }],
        }
    }

    #[test]
    fn body_sets_tool_choice_when_schema_present() {
        let req = Request { prompt: "classify".into(), response_schema: Some(json!({"type": "object"})), ..Default::default() };
        let body = provider().body(&req, false);
        assert_eq!(body["tool_choice"]["function"]["name"], "emit_classification");
    }

    #[test]
    fn extract_content_prefers_tool_call_arguments() {
        let message = ChatMessage {
            content: Some("ignored".to_string()),
            tool_calls: vec![ToolCall { function: ToolCallFunction { arguments: "{\"type\":\"prompt\"}".to_string() } }],
        };
        assert_eq!(extract_content(&message), "{\"type\":\"prompt\"}");
    }

    #[test]
    fn extract_content_falls_back_to_plain_content() {
        let message = ChatMessage { content: Some("hello".to_string()), tool_calls: vec![] };
        assert_eq!(extract_content(&message), "hello");
    }
}

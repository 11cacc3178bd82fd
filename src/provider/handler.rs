use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{Error, Result};
use crate::provider::config::{Defaults, Features, PromptConfig, ProviderKind};
use crate::provider::local::LocalProvider;
use crate::provider::remote::RemoteProvider;
use crate::provider::{ChunkStream, ModelInfo, Provider, Request, Response};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);
const AVAILABILITY_CACHE_TTL: Duration = Duration::from_secs(5);

struct AvailabilityCache {
    value: bool,
    checked_at: Instant,
}

/// The part of a [`PromptHandler`] that `reload` swaps out atomically. Providers
/// are rebuilt wholesale from the new config rather than patched in place — a reload
/// is a fresh parse, not a diff.
struct HandlerState {
    providers: HashMap<String, Arc<dyn Provider>>,
    defaults: Defaults,
    features: Features,
    fallback_order: Vec<String>,
}

impl HandlerState {
    fn from_config(config: &PromptConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        let mut fallback_order = Vec::new();
        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match provider_config.kind {
                ProviderKind::Local => Arc::new(LocalProvider::from_config(provider_config)),
                ProviderKind::Remote => Arc::new(RemoteProvider::from_config(provider_config)),
            };
            providers.insert(name.clone(), provider);
            fallback_order.push(name.clone());
        }
        // Try the default provider first when falling back.
        fallback_order.sort_by_key(|n| if n == &config.defaults.provider { 0 } else { 1 });

        Self { providers, defaults: config.defaults.clone(), features: config.features.clone(), fallback_order }
    }
}

/// Resolves provider/model from request options against config defaults, dispatches
/// to the right [`Provider`], and applies retry/fallback policy from `features`.
pub struct PromptHandler {
    state: RwLock<HandlerState>,
    availability_cache: RwLock<HashMap<String, AvailabilityCache>>,
}

impl PromptHandler {
    pub fn from_config(config: &PromptConfig) -> Self {
        Self { state: RwLock::new(HandlerState::from_config(config)), availability_cache: RwLock::new(HashMap::new()) }
    }

    /// Hot-reloads provider wiring and policy from a freshly loaded config. Callers
    /// typically pair this with [`crate::provider::config::load_config`] on a
    /// `SIGHUP`-style trigger or a config-file watch; nothing here watches the
    /// filesystem itself. Existing availability-cache entries are dropped since
    /// they may no longer refer to the same provider identity.
    pub fn reload(&self, config: &PromptConfig) -> Result<()> {
        let new_state = HandlerState::from_config(config);
        *self.state.write().unwrap() = new_state;
        self.availability_cache.write().unwrap().clear();
        Ok(())
    }

    fn resolve_provider_name(&self, requested: Option<&str>) -> Result<String> {
        let state = self.state.read().unwrap();
        let name = requested.unwrap_or(&state.defaults.provider);
        if state.providers.contains_key(name) {
            Ok(name.to_string())
        } else {
            let suggestions: Vec<&str> = state.providers.keys().map(String::as_str).collect();
            Err(Error::business("PROVIDER_NOT_FOUND", format!("no provider named `{name}`; known: {suggestions:?}")))
        }
    }

    fn fill_defaults(&self, mut request: Request) -> Request {
        let state = self.state.read().unwrap();
        if request.model.is_none() {
            request.model = state.defaults.model.clone();
        }
        if request.temperature.is_none() {
            request.temperature = Some(state.defaults.temperature);
        }
        if request.max_tokens.is_none() {
            request.max_tokens = Some(state.defaults.max_tokens);
        }
        if request.timeout_ms.is_none() {
            request.timeout_ms = Some(state.defaults.timeout_ms);
        }
        request
    }

    pub async fn complete(&self, prompt: impl Into<String>, provider: Option<&str>) -> Result<Response> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::validation("INVALID_INPUT", "prompt must not be empty"));
        }
        let request = self.fill_defaults(Request { prompt, ..Default::default() });
        self.complete_request(&request, provider).await
    }

    pub async fn complete_request(&self, request: &Request, provider: Option<&str>) -> Result<Response> {
        let primary = self.resolve_provider_name(provider)?;
        let request = self.fill_defaults(request.clone());
        let enable_fallback = self.state.read().unwrap().features.enable_fallback;
        match self.complete_with_retry(&primary, &request).await {
            Ok(mut resp) => {
                resp.metadata.insert("provider".to_string(), serde_json::json!(primary));
                Ok(resp)
            }
            Err(err) if enable_fallback => self.complete_with_fallback(&primary, &request, err).await,
            Err(err) => Err(err),
        }
    }

    async fn complete_with_fallback(&self, tried: &str, request: &Request, last_err: Error) -> Result<Response> {
        let mut last_err = last_err;
        let fallback_order = self.state.read().unwrap().fallback_order.clone();
        for name in &fallback_order {
            if name == tried {
                continue;
            }
            if !self.is_available_cached(name).await {
                continue;
            }
            match self.complete_with_retry(name, request).await {
                Ok(mut resp) => {
                    resp.metadata.insert("provider".to_string(), serde_json::json!(name));
                    resp.metadata.insert("fallbackFrom".to_string(), serde_json::json!(tried));
                    return Ok(resp);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn complete_with_retry(&self, provider_name: &str, request: &Request) -> Result<Response> {
        let enable_retries = self.state.read().unwrap().features.enable_retries;
        let deadline = Duration::from_millis(request.timeout_ms.unwrap_or(30_000));
        let mut attempt = 0;
        loop {
            attempt += 1;
            let provider = {
                let state = self.state.read().unwrap();
                state.providers.get(provider_name).expect("resolved provider name must exist").clone()
            };
            let outcome = tokio::time::timeout(deadline, provider.complete(request)).await;
            match outcome {
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(err)) if enable_retries && err.category.is_transient() && attempt < MAX_RETRY_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
                    let jittered = backoff.mul_f64(1.0 + jitter_frac);
                    tokio::time::sleep(jittered).await;
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Err(_) if enable_retries && attempt < MAX_RETRY_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
                    let jittered = backoff.mul_f64(1.0 + jitter_frac);
                    tokio::time::sleep(jittered).await;
                    continue;
                }
                Err(_) => {
                    return Err(Error::timeout(
                        "REQUEST_TIMEOUT",
                        format!("request to `{provider_name}` exceeded its {}ms deadline", deadline.as_millis()),
                    ));
                }
            }
        }
    }

    pub async fn stream(&self, request: &Request, provider: Option<&str>) -> Result<ChunkStream> {
        if !self.state.read().unwrap().features.enable_streaming {
            return Err(Error::business("STREAMING_DISABLED", "streaming is disabled in configuration"));
        }
        let name = self.resolve_provider_name(provider)?;
        let request = self.fill_defaults(request.clone());
        let deadline = Duration::from_millis(request.timeout_ms.unwrap_or(30_000));
        let provider = { self.state.read().unwrap().providers.get(&name).expect("resolved name exists").clone() };
        match tokio::time::timeout(deadline, provider.stream(&request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout("REQUEST_TIMEOUT", format!("stream initiation on `{name}` exceeded its {}ms deadline", deadline.as_millis()))),
        }
    }

    pub fn models(&self, provider: Option<&str>) -> Result<Vec<ModelInfo>> {
        let name = self.resolve_provider_name(provider)?;
        let state = self.state.read().unwrap();
        Ok(state.providers.get(&name).expect("resolved name exists").models())
    }

    async fn is_available_cached(&self, name: &str) -> bool {
        {
            let cache = self.availability_cache.read().unwrap();
            if let Some(entry) = cache.get(name) {
                if entry.checked_at.elapsed() < AVAILABILITY_CACHE_TTL {
                    return entry.value;
                }
            }
        }
        let provider = {
            let state = self.state.read().unwrap();
            let Some(provider) = state.providers.get(name) else { return false };
            provider.clone()
        };
        let value = provider.is_available().await.unwrap_or(false);
        self.availability_cache
            .write()
            .unwrap()
            .insert(name.to_string(), AvailabilityCache { value, checked_at: Instant::now() });
        value
    }

    pub async fn is_available(&self, provider: Option<&str>) -> Result<bool> {
        let name = self.resolve_provider_name(provider)?;
        Ok(self.is_available_cached(&name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::config::{ModelInfoConfig, ProviderConfig};
    use std::collections::HashMap as Map;

    fn test_config() -> PromptConfig {
        let mut providers = Map::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                kind: ProviderKind::Local,
                base_url: Some("http://localhost:11434".to_string()),
                api_key: None,
                timeout_ms: 5_000,
                models: vec![ModelInfoConfig { name: "llama3".into(), display_name: None, default: true, context_length: 4096, capabilities: vec![] }],
            },
        );
        PromptConfig {
            providers,
            defaults: Defaults { provider: "local".into(), model: None, temperature: 0.7, max_tokens: 512, timeout_ms: 5_000 },
            features: Features { enable_streaming: true, enable_retries: true, enable_fallback: true, ensemble_escalation: false },
        }
    }

    #[test]
    fn resolve_provider_name_rejects_unknown() {
        let handler = PromptHandler::from_config(&test_config());
        let err = handler.resolve_provider_name(Some("missing")).unwrap_err();
        assert_eq!(err.code, "PROVIDER_NOT_FOUND");
    }

    #[test]
    fn fill_defaults_applies_config_defaults() {
        let handler = PromptHandler::from_config(&test_config());
        let req = handler.fill_defaults(Request { prompt: "hi".into(), ..Default::default() });
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let handler = PromptHandler::from_config(&test_config());
        let err = handler.complete("   ", None).await.unwrap_err();
        assert_eq!(err.code, "INVALID_INPUT");
    }

    #[test]
    fn reload_replaces_provider_wiring() {
        let handler = PromptHandler::from_config(&test_config());
        assert!(handler.resolve_provider_name(Some("remote")).is_err());

        let mut next = test_config();
        next.providers.insert(
            "remote".to_string(),
            ProviderConfig {
                kind: ProviderKind::Remote,
                base_url: Some("https://api.example.com".to_string()),
                api_key: None,
                timeout_ms: 5_000,
                models: vec![ModelInfoConfig { name: "gpt-x".into(), display_name: None, default: true, context_length: 8192, capabilities: vec![] }],
            },
        );
        handler.reload(&next).unwrap();
        assert!(handler.resolve_provider_name(Some("remote")).is_ok());
    }
}

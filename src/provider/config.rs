use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::ModelInfo;

pub const ENV_HOME_DIR: &str = "AGENTCORE_HOME";
pub const DEFAULT_CONFIG_FILENAME: &str = "agentcore.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub models: Vec<ModelInfoConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelInfoConfig {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(rename = "contextLength", default = "default_context_length")]
    pub context_length: u32,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl From<&ModelInfoConfig> for ModelInfo {
    fn from(m: &ModelInfoConfig) -> Self {
        ModelInfo {
            name: m.name.clone(),
            display_name: m.display_name.clone(),
            is_default: m.default,
            context_length: m.context_length,
            capabilities: m.capabilities.clone(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_context_length() -> u32 {
    8192
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    pub provider: String,
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(rename = "maxTokens", default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Features {
    #[serde(rename = "enableStreaming", default = "default_true")]
    pub enable_streaming: bool,
    #[serde(rename = "enableRetries", default = "default_true")]
    pub enable_retries: bool,
    #[serde(rename = "enableFallback", default = "default_true")]
    pub enable_fallback: bool,
    #[serde(rename = "ensembleEscalation", default)]
    pub ensemble_escalation: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub defaults: Defaults,
    #[serde(default)]
    pub features: Features,
}

impl PromptConfig {
    fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::validation("INVALID_CONFIG", "at least one provider must be configured"));
        }
        if !self.providers.contains_key(&self.defaults.provider) {
            return Err(Error::validation(
                "INVALID_CONFIG",
                format!("defaults.provider `{}` is not a configured provider", self.defaults.provider),
            ));
        }
        for (name, provider) in &self.providers {
            if provider.models.is_empty() {
                return Err(Error::validation("INVALID_CONFIG", format!("provider `{name}` has no models")));
            }
            if provider.timeout_ms < 1000 {
                return Err(Error::validation("INVALID_CONFIG", format!("provider `{name}` timeout must be >= 1000ms")));
            }
        }
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(Error::validation("INVALID_CONFIG", "defaults.temperature must be within [0, 2]"));
        }
        if self.defaults.max_tokens == 0 {
            return Err(Error::validation("INVALID_CONFIG", "defaults.maxTokens must be >= 1"));
        }
        if self.defaults.timeout_ms < 1000 {
            return Err(Error::validation("INVALID_CONFIG", "defaults.timeout must be >= 1000ms"));
        }
        Ok(())
    }
}

/// Performs `${NAME}` substitution against the process environment. Undefined
/// variables are an error unless `allow_placeholder` is set, in which case the
/// literal `${NAME}` token is retained.
pub fn interpolate_env(text: &str, allow_placeholder: bool) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = text[i + 2..].find('}') {
                let name = &text[i + 2..i + 2 + end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) if allow_placeholder => out.push_str(&text[i..i + 2 + end + 1]),
                    Err(_) => {
                        return Err(Error::validation("ENV_VAR_MISSING", format!("environment variable `{name}` is not set")));
                    }
                }
                i += 2 + end + 1;
                continue;
            }
        }
        // Push one char at a time, respecting UTF-8 boundaries.
        let ch_len = text[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&text[i..i + ch_len]);
        i += ch_len;
    }
    Ok(out)
}

pub fn config_home_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_HOME_DIR) {
        let p = PathBuf::from(dir);
        if !p.as_os_str().is_empty() {
            return p;
        }
    }
    dirs_home().map(|h| h.join(".agentcore")).unwrap_or_else(|| PathBuf::from(".agentcore"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

pub fn default_config_path() -> PathBuf {
    config_home_dir().join(DEFAULT_CONFIG_FILENAME)
}

/// Loads and validates a [`PromptConfig`] from a TOML document at `path`, applying
/// `${VAR}` interpolation before parsing.
pub fn load_config(path: &Path) -> Result<PromptConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::system("IO_ERROR", format!("reading `{}`: {e}", path.display())))?;
    let interpolated = interpolate_env(&raw, false)?;
    let config: PromptConfig =
        toml::from_str(&interpolated).map_err(|e| Error::validation("INVALID_CONFIG", format!("`{}`: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Caches the path a [`PromptConfig`] was loaded from so it can be re-read later
/// without the caller threading the path through again. `reload_config` re-parses
/// from that cached path and publishes the result; readers of `current()` always
/// see a whole, validated config, never a partially-applied one.
pub struct ConfigHandle {
    path: PathBuf,
    current: std::sync::RwLock<PromptConfig>,
}

impl ConfigHandle {
    pub fn load(path: PathBuf) -> Result<Self> {
        let config = load_config(&path)?;
        Ok(Self { path, current: std::sync::RwLock::new(config) })
    }

    pub fn current(&self) -> PromptConfig {
        self.current.read().unwrap().clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads and re-validates the config from the cached path, swapping it in
    /// only if the new document is valid. Returns the freshly loaded config so the
    /// caller can propagate it to [`crate::provider::handler::PromptHandler::reload`].
    pub fn reload_config(&self) -> Result<PromptConfig> {
        let fresh = load_config(&self.path)?;
        *self.current.write().unwrap() = fresh.clone();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_substitutes_defined_vars() {
        unsafe { std::env::set_var("AGENTCORE_TEST_KEY", "secret123") };
        let out = interpolate_env("key = \"${AGENTCORE_TEST_KEY}\"", false).unwrap();
        assert_eq!(out, "key = \"secret123\"");
        unsafe { std::env::remove_var("AGENTCORE_TEST_KEY") };
    }

    #[test]
    fn interpolate_fails_on_missing_var_by_default() {
        let err = interpolate_env("key = \"${DEFINITELY_NOT_SET_XYZ}\"", false).unwrap_err();
        assert_eq!(err.code, "ENV_VAR_MISSING");
    }

    #[test]
    fn interpolate_keeps_placeholder_when_allowed() {
        let out = interpolate_env("key = \"${DEFINITELY_NOT_SET_XYZ}\"", true).unwrap();
        assert_eq!(out, "key = \"${DEFINITELY_NOT_SET_XYZ}\"");
    }

    #[test]
    fn config_handle_reload_picks_up_file_changes() {
        let path = std::env::temp_dir().join(format!("agentcore-config-test-{}.toml", std::process::id()));
        let initial = r#"
[providers.local]
type = "local"
baseUrl = "http://localhost:11434"

[[providers.local.models]]
name = "llama3"
default = true

[defaults]
provider = "local"
"#;
        std::fs::write(&path, initial).unwrap();
        let handle = ConfigHandle::load(path.clone()).unwrap();
        assert_eq!(handle.current().defaults.temperature, 0.7);

        let updated = initial.replace("provider = \"local\"\n", "provider = \"local\"\ntemperature = 1.2\n");
        std::fs::write(&path, updated).unwrap();
        let reloaded = handle.reload_config().unwrap();
        assert_eq!(reloaded.defaults.temperature, 1.2);
        assert_eq!(handle.current().defaults.temperature, 1.2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn validate_rejects_unknown_default_provider() {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderConfig {
                kind: ProviderKind::Local,
                base_url: Some("http://localhost:11434".into()),
                api_key: None,
                timeout_ms: 30_000,
                models: vec![ModelInfoConfig {
                    name: "llama3".into(),
                    display_name: None,
                    default: true,
                    context_length: 8192,
                    capabilities: vec![],
                }],
            },
        );
        let cfg = PromptConfig {
            providers,
            defaults: Defaults { provider: "remote".into(), model: None, temperature: 0.7, max_tokens: 2048, timeout_ms: 30_000 },
            features: Features::default(),
        };
        assert!(cfg.validate().is_err());
    }
}

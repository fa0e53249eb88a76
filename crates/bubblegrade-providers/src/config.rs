//! Configuration loading and recognizer factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bubblegrade_core::engine::ScanEngineConfig;
use bubblegrade_core::model::SheetLayout;
use bubblegrade_core::traits::SheetRecognizer;

use crate::anthropic::AnthropicRecognizer;
use crate::gemini::GeminiRecognizer;
use crate::mock::MockRecognizer;
use crate::openai::OpenAiRecognizer;

/// Configuration for a single recognition provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    /// Offline recognizer returning a fixed reply; for demos and tests.
    Mock {
        #[serde(default)]
        response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Mock { response } => {
                f.debug_struct("Mock").field("response", response).finish()
            }
        }
    }
}

/// Top-level bubblegrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubblegradeConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used when `--model` names none.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used when `--model` names none.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature (0.0 for repeatable reads).
    #[serde(default)]
    pub default_temperature: f64,
    /// Max tokens for a recognition reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Printed sheet layout used when the key file does not say otherwise.
    #[serde(default)]
    pub layout: SheetLayout,
    /// Ask for mark coordinates by default.
    #[serde(default)]
    pub request_locations: bool,
    /// Max concurrent recognition calls when grading a directory.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Where the active key and saved results live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_parallelism() -> usize {
    2
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".bubblegrade")
}

impl Default for BubblegradeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: 0.0,
            max_tokens: default_max_tokens(),
            layout: SheetLayout::default(),
            request_locations: false,
            parallelism: default_parallelism(),
            data_dir: default_data_dir(),
        }
    }
}

impl BubblegradeConfig {
    /// Split a `provider/model` spec, falling back to the configured defaults.
    ///
    /// A bare model name uses the default provider.
    pub fn resolve_model(&self, spec: Option<&str>) -> (String, String) {
        match spec {
            Some(s) => match s.split_once('/') {
                Some((provider, model)) => (provider.to_string(), model.to_string()),
                None => (self.default_provider.clone(), s.to_string()),
            },
            None => (self.default_provider.clone(), self.default_model.clone()),
        }
    }

    /// Build a recognizer for a configured provider name.
    pub fn recognizer(&self, provider: &str) -> Result<Box<dyn SheetRecognizer>> {
        match self.providers.get(provider) {
            Some(config) => create_recognizer(provider, config),
            None if provider == "mock" => Ok(Box::new(MockRecognizer::new())),
            None => anyhow::bail!(
                "provider '{provider}' is not configured; add [providers.{provider}] to bubblegrade.toml or set BUBBLEGRADE_{}_KEY",
                provider.to_uppercase()
            ),
        }
    }

    /// Scan engine settings for a model and layout.
    pub fn engine_config(&self, model: &str, layout: SheetLayout) -> ScanEngineConfig {
        ScanEngineConfig {
            model: model.to_string(),
            layout,
            request_locations: self.request_locations,
            parallelism: self.parallelism.max(1),
            temperature: self.default_temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `bubblegrade.toml` in the current directory
/// 2. `~/.config/bubblegrade/config.toml`
///
/// Environment variable overrides: `BUBBLEGRADE_GEMINI_KEY`,
/// `BUBBLEGRADE_ANTHROPIC_KEY`, `BUBBLEGRADE_OPENAI_KEY`, `BUBBLEGRADE_DATA_DIR`.
pub fn load_config() -> Result<BubblegradeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BubblegradeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("bubblegrade.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<BubblegradeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => BubblegradeConfig::default(),
    };

    apply_env_overrides(&mut config);

    config
        .layout
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid [layout] in config: {e}"))?;

    // Resolve env vars in all provider configs
    let resolved: HashMap<String, ProviderConfig> = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.providers = resolved;

    Ok(config)
}

fn apply_env_overrides(config: &mut BubblegradeConfig) {
    if let Ok(key) = std::env::var("BUBBLEGRADE_GEMINI_KEY") {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("BUBBLEGRADE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("BUBBLEGRADE_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(dir) = std::env::var("BUBBLEGRADE_DATA_DIR") {
        if !dir.is_empty() {
            config.data_dir = PathBuf::from(dir);
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("bubblegrade"))
}

/// Create a recognizer instance from its configuration.
pub fn create_recognizer(name: &str, config: &ProviderConfig) -> Result<Box<dyn SheetRecognizer>> {
    let require_key = |api_key: &str| -> Result<()> {
        if api_key.trim().is_empty() {
            anyhow::bail!("provider '{name}' has no API key configured");
        }
        Ok(())
    };

    match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            require_key(api_key)?;
            Ok(Box::new(GeminiRecognizer::new(api_key, base_url.clone())))
        }
        ProviderConfig::Anthropic { api_key, base_url } => {
            require_key(api_key)?;
            Ok(Box::new(AnthropicRecognizer::new(api_key, base_url.clone())))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            require_key(api_key)?;
            Ok(Box::new(OpenAiRecognizer::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
            )))
        }
        ProviderConfig::Mock { response } => Ok(Box::new(match response {
            Some(reply) => MockRecognizer::with_fixed_response(reply),
            None => MockRecognizer::new(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_BUBBLEGRADE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_BUBBLEGRADE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_BUBBLEGRADE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_BUBBLEGRADE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = BubblegradeConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.layout.total_questions, 60);
        assert_eq!(config.parallelism, 2);
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "gemini"
default_model = "gemini-2.5-flash"
request_locations = true

[layout]
total_questions = 40
questions_per_column = 10

[providers.gemini]
type = "gemini"
api_key = "g-test"

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.offline]
type = "mock"
response = '{"1": "A"}'
"#;
        let config: BubblegradeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.layout, SheetLayout::new(40, 10));
        assert!(config.request_locations);
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { .. })
        ));
        assert!(config.recognizer("offline").is_ok());
    }

    #[test]
    fn debug_masks_api_key() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn model_spec_resolution() {
        let config = BubblegradeConfig::default();
        assert_eq!(
            config.resolve_model(None),
            ("gemini".to_string(), "gemini-2.5-flash".to_string())
        );
        assert_eq!(
            config.resolve_model(Some("openai/gpt-4o")),
            ("openai".to_string(), "gpt-4o".to_string())
        );
        assert_eq!(
            config.resolve_model(Some("gemini-2.5-pro")),
            ("gemini".to_string(), "gemini-2.5-pro".to_string())
        );
    }

    #[test]
    fn unconfigured_provider_is_an_error() {
        let config = BubblegradeConfig::default();
        let err = config.recognizer("anthropic").err().unwrap();
        assert!(err.to_string().contains("BUBBLEGRADE_ANTHROPIC_KEY"));
        assert!(config.recognizer("mock").is_ok());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let config = ProviderConfig::Anthropic {
            api_key: "  ".into(),
            base_url: None,
        };
        assert!(create_recognizer("anthropic", &config).is_err());
    }

    #[test]
    fn explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}

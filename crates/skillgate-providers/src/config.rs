//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use skillgate_core::engine::EngineConfig;
use skillgate_core::scoring::DEFAULT_PASS_THRESHOLD;
use skillgate_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single text-generation provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
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
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// Top-level skillgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillgateConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used for generation and parsing.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used for generation and parsing.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for question generation.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    /// Generation attempts after the first, per skill.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds; doubles per retry.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max concurrent skill generations within a level.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Per-skill accuracy required to pass a level.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Questions per skill for every level; unset uses 5/5/10.
    #[serde(default)]
    pub questions_per_skill: Option<u32>,
    /// Where assessment checkpoints are stored.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_pass_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./skillgate-checkpoints")
}

impl Default for SkillgateConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            pass_threshold: default_pass_threshold(),
            questions_per_skill: None,
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

impl SkillgateConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            anyhow::bail!(
                "pass_threshold must be between 0 and 1, got {}",
                self.pass_threshold
            );
        }
        if self.parallelism == 0 {
            anyhow::bail!("parallelism must be at least 1");
        }
        if self.questions_per_skill == Some(0) {
            anyhow::bail!("questions_per_skill must be at least 1");
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model: self.default_model.clone(),
            temperature: self.default_temperature,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            parallelism: self.parallelism,
            pass_threshold: self.pass_threshold,
            questions_per_skill: self.questions_per_skill,
            ..Default::default()
        }
    }

    /// Build the configured default provider.
    pub fn build_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let config = self.providers.get(&self.default_provider).with_context(|| {
            format!(
                "provider '{}' is not configured (set [providers.{}] in skillgate.toml \
                 or SKILLGATE_ANTHROPIC_KEY / SKILLGATE_OPENAI_KEY)",
                self.default_provider, self.default_provider
            )
        })?;
        create_provider(config)
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
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `skillgate.toml` in the current directory
/// 2. `~/.config/skillgate/config.toml`
///
/// Environment variable overrides: `SKILLGATE_OPENAI_KEY`, `SKILLGATE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<SkillgateConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SkillgateConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("skillgate.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<SkillgateConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SkillgateConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("SKILLGATE_ANTHROPIC_KEY") {
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

    if let Ok(key) = std::env::var("SKILLGATE_OPENAI_KEY") {
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

    // Resolve env vars in all provider configs
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    config.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("skillgate"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match config {
        ProviderConfig::Anthropic { api_key, base_url } => Ok(Arc::new(AnthropicProvider::new(
            api_key,
            base_url.clone(),
        )?)),
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Arc::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_SKILLGATE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_SKILLGATE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_SKILLGATE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_SKILLGATE_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("no ${closing"), "no ${closing");
        std::env::remove_var("_SKILLGATE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = SkillgateConfig::default();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.max_retries, 3);
        assert!((config.pass_threshold - 0.70).abs() < f64::EPSILON);
        assert!(config.questions_per_skill.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "openai"
default_model = "gpt-4.1"
max_retries = 5
retry_delay_ms = 250
parallelism = 2
pass_threshold = 0.8
questions_per_skill = 3
checkpoint_dir = "/tmp/skillgate"

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"
base_url = "http://localhost:8080"
"#;
        let config: SkillgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert!(matches!(
            config.providers.get("openai"),
            Some(ProviderConfig::OpenAI { base_url: Some(url), .. }) if url == "http://localhost:8080"
        ));

        let engine = config.engine_config();
        assert_eq!(engine.model, "gpt-4.1");
        assert_eq!(engine.max_retries, 5);
        assert_eq!(engine.retry_delay, Duration::from_millis(250));
        assert_eq!(engine.parallelism, 2);
        assert_eq!(engine.questions_per_skill, Some(3));
        assert!(config.build_provider().is_ok());
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Anthropic {
            api_key: "sk-secret".into(),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = SkillgateConfig {
            pass_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SkillgateConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skillgate.toml");
        std::fs::write(
            &path,
            "pass_threshold = 0.75\n[providers.anthropic]\ntype = \"anthropic\"\napi_key = \"k\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert!((config.pass_threshold - 0.75).abs() < f64::EPSILON);
        assert!(config.providers.contains_key("anthropic"));

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn unconfigured_default_provider_is_an_error() {
        let config = SkillgateConfig::default();
        let err = match config.build_provider() {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("provider 'anthropic' is not configured"));
    }
}

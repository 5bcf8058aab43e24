// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::cost::{ModelPricing, PricingTable};
use crate::infra::errors::ParleyError;
use crate::infra::paths;

/// Placeholder shipped in the config template; never a real key.
pub const API_KEY_PLACEHOLDER: &str = "your-openai-api-key-here";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub local: LocalConfig,

    /// Per-model price overrides, USD per million tokens.
    #[serde(default)]
    pub pricing: BTreeMap<String, ModelPricing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub default: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: "gpt-3.5-turbo".into(),
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_yearly_cost: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_yearly_cost: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_exchanges: usize,
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_exchanges: 5,
            max_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_secs: u64,
    pub pool_size: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            pool_size: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub wrap_width: usize,
    pub wrap_indent: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            wrap_width: 80,
            wrap_indent: "  ".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub delay_ms: u64,
    pub responses_path: Option<PathBuf>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1500,
            responses_path: None,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the OpenAI credential: `OPENAI_API_KEY` first, then `models.api_key`.
    pub fn api_key(&self) -> Result<String, ParleyError> {
        let from_env = std::env::var("OPENAI_API_KEY").ok();
        Self::pick_api_key(from_env, self.models.api_key.clone())
    }

    fn pick_api_key(
        from_env: Option<String>,
        from_file: Option<String>,
    ) -> Result<String, ParleyError> {
        [from_env, from_file]
            .into_iter()
            .flatten()
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty() && k != API_KEY_PLACEHOLDER)
            .ok_or_else(|| {
                ParleyError::Config(
                    "no OpenAI API key; set OPENAI_API_KEY or models.api_key".into(),
                )
            })
    }

    /// Built-in prices with any `[pricing.*]` rows layered on top.
    pub fn pricing_table(&self) -> PricingTable {
        PricingTable::builtin().with_overrides(&self.pricing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.models.default, "gpt-3.5-turbo");
        assert!((c.budget.max_yearly_cost - 5.0).abs() < 0.001);
        assert_eq!(c.context.max_exchanges, 5);
        assert_eq!(c.context.max_chars, 10_000);
        assert_eq!(c.request.timeout_secs, 30);
        assert_eq!(c.request.pool_size, 2);
        assert_eq!(c.display.wrap_width, 80);
        assert_eq!(c.display.wrap_indent, "  ");
        assert_eq!(c.local.delay_ms, 1500);
        assert!(c.pricing.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.request.timeout_secs, 30);
        assert_eq!(config.models.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[models]
default = "gpt-4o"
api_key = "sk-test"
base_url = "http://localhost:9999/v1"

[budget]
max_yearly_cost = 12.5

[context]
max_exchanges = 3
max_chars = 4000

[request]
timeout_secs = 10
pool_size = 4

[display]
wrap_width = 60
wrap_indent = "    "

[local]
delay_ms = 0
responses_path = "/etc/parley/responses.toml"

[pricing."gpt-4o"]
input = 5.0
output = 15.0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.models.default, "gpt-4o");
        assert_eq!(config.models.api_key.as_deref(), Some("sk-test"));
        assert!((config.budget.max_yearly_cost - 12.5).abs() < 0.001);
        assert_eq!(config.context.max_exchanges, 3);
        assert_eq!(config.request.pool_size, 4);
        assert_eq!(config.display.wrap_indent, "    ");
        assert_eq!(config.local.delay_ms, 0);
        assert!(config.local.responses_path.is_some());
        assert_eq!(config.pricing["gpt-4o"].input, 5.0);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[models]\ndefault = \"local-llm\"\n").unwrap();
        assert_eq!(config.models.default, "local-llm");
        assert_eq!(config.models.base_url, "https://api.openai.com/v1");
        assert!(config.models.api_key.is_none());
    }

    #[test]
    fn test_pricing_overrides_keep_builtin_rows() {
        let config: Config = toml::from_str(
            r#"
[pricing."gpt-4o"]
input = 5.0
output = 15.0
"#,
        )
        .unwrap();
        let table = config.pricing_table();
        assert_eq!(table.get("gpt-4o").unwrap().input, 5.0);
        assert_eq!(table.get("gpt-3.5-turbo").unwrap().input, 0.5);
    }

    #[test]
    fn test_api_key_env_wins() {
        let key = Config::pick_api_key(Some("sk-env".into()), Some("sk-file".into())).unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn test_api_key_falls_back_to_file() {
        let key = Config::pick_api_key(Some("  ".into()), Some("sk-file".into())).unwrap();
        assert_eq!(key, "sk-file");
    }

    #[test]
    fn test_api_key_placeholder_is_missing() {
        let err = Config::pick_api_key(None, Some(API_KEY_PLACEHOLDER.into())).unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.display.wrap_width, config.display.wrap_width);
        assert!(
            (deserialized.budget.max_yearly_cost - config.budget.max_yearly_cost).abs() < 0.001
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}

//! Runtime configuration: iteration bound, pacing, and the optional LLM endpoint.

use std::fs;
use std::path::Path;

use super::controller::ControllerConfig;
use super::kernel::PropagationConfig;

pub const ENV_MAX_ITERATIONS: &str = "RISK_NEXUS_MAX_ITERATIONS";
pub const ENV_STEP_DELAY_MS: &str = "RISK_NEXUS_STEP_DELAY_MS";
pub const ENV_LLM_MODEL: &str = "RISK_NEXUS_LLM_MODEL";
pub const ENV_LLM_BASE_URL: &str = "RISK_NEXUS_LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "RISK_NEXUS_LLM_API_KEY";
pub const ENV_LLM_TIMEOUT_MS: &str = "RISK_NEXUS_LLM_TIMEOUT_MS";
pub const ENV_LLM_SYSTEM_PROMPT: &str = "RISK_NEXUS_LLM_SYSTEM_PROMPT";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_STEP_DELAY_MS: u64 = 0;
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_LLM_SYSTEM_PROMPT: &str =
    "You are a financial risk analyst covering the AI industry. Answer concisely and factually.";

const UNTIL_STABLE_VALUE: &str = "until_stable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContagionConfig {
    pub propagation: PropagationConfig,
    pub step_delay_ms: u64,
    /// `None` when no model endpoint is configured.
    pub llm: Option<LlmConfig>,
}

impl ContagionConfig {
    pub fn from_default_sources() -> Result<Self, ConfigError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Self::from_env()
    }

    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::ReadConfigFile {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let table = value
            .as_table()
            .ok_or_else(|| ConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: "root is not a TOML table".to_string(),
            })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_env_with<F>(mut getter: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let propagation = match non_empty(&mut getter, ENV_MAX_ITERATIONS) {
            Some(value) => parse_iteration_limit(&value)?,
            None => PropagationConfig::default(),
        };
        let step_delay_ms = match non_empty(&mut getter, ENV_STEP_DELAY_MS) {
            Some(value) => parse_u64(ENV_STEP_DELAY_MS, value)?,
            None => DEFAULT_STEP_DELAY_MS,
        };
        let llm = llm_from_env_with(&mut getter)?;

        Ok(Self {
            propagation,
            step_delay_ms,
            llm,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            propagation: self.propagation.clone(),
            step_delay_ms: self.step_delay_ms,
        }
    }
}

fn llm_from_env_with<F>(getter: &mut F) -> Result<Option<LlmConfig>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let endpoint_keys = [ENV_LLM_MODEL, ENV_LLM_BASE_URL, ENV_LLM_API_KEY];
    if endpoint_keys.iter().all(|key| getter(key).is_none()) {
        return Ok(None);
    }

    let model = required_env(getter, ENV_LLM_MODEL)?;
    let base_url = required_env(getter, ENV_LLM_BASE_URL)?;
    let api_key = required_env(getter, ENV_LLM_API_KEY)?;
    let timeout_ms = match non_empty(getter, ENV_LLM_TIMEOUT_MS) {
        Some(value) => parse_u64(ENV_LLM_TIMEOUT_MS, value)?,
        None => DEFAULT_LLM_TIMEOUT_MS,
    };
    let system_prompt = non_empty(getter, ENV_LLM_SYSTEM_PROMPT)
        .unwrap_or_else(|| DEFAULT_LLM_SYSTEM_PROMPT.to_string());

    Ok(Some(LlmConfig {
        model,
        base_url,
        api_key,
        timeout_ms,
        system_prompt,
    }))
}

/// `0` and `until_stable` select the unbounded run; any other integer is the cap.
fn parse_iteration_limit(value: &str) -> Result<PropagationConfig, ConfigError> {
    if value.trim().eq_ignore_ascii_case(UNTIL_STABLE_VALUE) {
        return Ok(PropagationConfig::until_stable());
    }
    let limit = value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidNumber {
            key: ENV_MAX_ITERATIONS,
            value: value.to_string(),
        })?;
    if limit == 0 {
        Ok(PropagationConfig::until_stable())
    } else {
        Ok(PropagationConfig::capped(limit))
    }
}

fn parse_u64(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber { key, value })
}

fn non_empty<F>(getter: &mut F, key: &str) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    getter(key).filter(|value| !value.trim().is_empty())
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

fn required_env<F>(getter: &mut F, key: &'static str) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = getter(key).ok_or(ConfigError::MissingEnv { key })?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyEnv { key });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing config value: {key}")]
    MissingEnv { key: &'static str },
    #[error("empty config value: {key}")]
    EmptyEnv { key: &'static str },
    #[error("invalid number for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("read config file failed ({path}): {message}")]
    ReadConfigFile { path: String, message: String },
    #[error("parse config file failed ({path}): {message}")]
    ParseConfigFile { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contagion::kernel::IterationLimit;
    use std::collections::BTreeMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = ContagionConfig::from_env_with(|_| None).unwrap();
        assert_eq!(config, ContagionConfig::default());
        assert_eq!(
            config.propagation.iteration_limit,
            IterationLimit::Capped(3)
        );
        assert!(config.llm.is_none());
    }

    #[test]
    fn iteration_limit_accepts_until_stable_and_zero() {
        for raw in ["until_stable", "UNTIL_STABLE", "0"] {
            let vars = vars(&[(ENV_MAX_ITERATIONS, raw)]);
            let config = ContagionConfig::from_env_with(|key| vars.get(key).cloned()).unwrap();
            assert_eq!(
                config.propagation.iteration_limit,
                IterationLimit::UntilStable
            );
        }

        let vars = vars(&[(ENV_MAX_ITERATIONS, "7"), (ENV_STEP_DELAY_MS, "250")]);
        let config = ContagionConfig::from_env_with(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.propagation.iteration_limit, IterationLimit::Capped(7));
        assert_eq!(config.step_delay_ms, 250);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let vars = vars(&[(ENV_STEP_DELAY_MS, "soon")]);
        let err = ContagionConfig::from_env_with(|key| vars.get(key).cloned()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: ENV_STEP_DELAY_MS,
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn partial_llm_settings_are_an_error() {
        let vars = vars(&[(ENV_LLM_MODEL, "gpt-4o-mini")]);
        let err = ContagionConfig::from_env_with(|key| vars.get(key).cloned()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnv {
                key: ENV_LLM_BASE_URL
            }
        );
    }

    #[test]
    fn llm_settings_use_default_prompt_and_timeout() {
        let vars = vars(&[
            (ENV_LLM_MODEL, "gpt-4o-mini"),
            (ENV_LLM_BASE_URL, "https://api.example.com/v1"),
            (ENV_LLM_API_KEY, "secret"),
        ]);
        let config = ContagionConfig::from_env_with(|key| vars.get(key).cloned()).unwrap();
        let llm = config.llm.expect("llm configured");
        assert_eq!(llm.timeout_ms, DEFAULT_LLM_TIMEOUT_MS);
        assert_eq!(llm.system_prompt, DEFAULT_LLM_SYSTEM_PROMPT);
    }

    #[test]
    fn reads_from_config_file() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("risk-nexus-config-{unique}.toml"));
        let content = r#"
RISK_NEXUS_MAX_ITERATIONS = 5
RISK_NEXUS_STEP_DELAY_MS = 120
RISK_NEXUS_LLM_MODEL = "gpt-4o-mini"
RISK_NEXUS_LLM_BASE_URL = "https://api.example.com/v1"
RISK_NEXUS_LLM_API_KEY = "secret"
RISK_NEXUS_LLM_TIMEOUT_MS = 4567
"#;
        std::fs::write(&path, content).unwrap();

        let config = ContagionConfig::from_config_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.propagation.iteration_limit, IterationLimit::Capped(5));
        assert_eq!(config.step_delay_ms, 120);
        assert_eq!(config.controller_config().step_delay_ms, 120);
        let llm = config.llm.as_ref().expect("llm configured");
        assert_eq!(llm.model, "gpt-4o-mini");
        assert_eq!(llm.timeout_ms, 4567);
    }
}

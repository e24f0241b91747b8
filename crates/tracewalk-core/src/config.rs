use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TracewalkError};

/// Top-level tracewalk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub oracles: OracleModels,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Which collaborator a model is being resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleKind {
    Decision,
    Execution,
    Evaluation,
    Matcher,
}

impl OracleKind {
    pub fn name(self) -> &'static str {
        match self {
            OracleKind::Decision => "decision",
            OracleKind::Execution => "execution",
            OracleKind::Evaluation => "evaluation",
            OracleKind::Matcher => "matcher",
        }
    }
}

/// Per-oracle model overrides. Unset entries use `[model]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleModels {
    #[serde(default)]
    pub decision: Option<ModelConfig>,
    #[serde(default)]
    pub execution: Option<ModelConfig>,
    #[serde(default)]
    pub evaluation: Option<ModelConfig>,
    #[serde(default)]
    pub matcher: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Attempts per step before giving up (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause between a failed attempt and its retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Upper bound on a single oracle call (0 = no timeout).
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            oracle_timeout_secs: default_oracle_timeout(),
        }
    }
}

impl ExecutorConfig {
    pub fn attempt_limit(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn oracle_timeout(&self) -> Option<Duration> {
        (self.oracle_timeout_secs > 0).then(|| Duration::from_secs(self.oracle_timeout_secs))
    }
}

fn default_max_attempts() -> u32 { 5 }
fn default_retry_backoff() -> u64 { 2000 }
fn default_oracle_timeout() -> u64 { 120 }

/// Reserved start/end nodes seeded into every graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_start_id")]
    pub start_id: i64,
    #[serde(default = "default_start_content")]
    pub start_content: String,
    #[serde(default = "default_end_id")]
    pub end_id: i64,
    #[serde(default = "default_end_content")]
    pub end_content: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            start_id: default_start_id(),
            start_content: default_start_content(),
            end_id: default_end_id(),
            end_content: default_end_content(),
        }
    }
}

fn default_start_id() -> i64 { 0 }
fn default_start_content() -> String { "Start Node".to_string() }
fn default_end_id() -> i64 { -1 }
fn default_end_content() -> String { "End Node".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TracewalkError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| TracewalkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.graph.start_id == self.graph.end_id {
            return Err(TracewalkError::Config(format!(
                "graph.start_id and graph.end_id must differ (both are {})",
                self.graph.start_id
            )));
        }
        Ok(())
    }

    /// Model used by the given oracle.
    pub fn model_for(&self, kind: OracleKind) -> &ModelConfig {
        let override_model = match kind {
            OracleKind::Decision => &self.oracles.decision,
            OracleKind::Execution => &self.oracles.execution,
            OracleKind::Evaluation => &self.oracles.evaluation,
            OracleKind::Matcher => &self.oracles.matcher,
        };
        override_model.as_ref().unwrap_or(&self.model)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => result.push_str(&val),
                    // Unset variables stay verbatim
                    Err(_) => result.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TRACEWALK_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TRACEWALK_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TRACEWALK_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TRACEWALK_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TRACEWALK_VAR}\"");
    }

    #[test]
    fn test_expand_env_vars_unterminated() {
        assert_eq!(expand_env_vars("a ${OPEN"), "a ${OPEN");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"
"#,
        )
        .unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.max_tokens, 1024);
        assert_eq!(config.executor.max_attempts, 5);
        assert_eq!(config.executor.retry_backoff_ms, 2000);
        assert_eq!(config.executor.oracle_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.graph.start_id, 0);
        assert_eq!(config.graph.end_id, -1);
        assert_eq!(config.graph.end_content, "End Node");
    }

    #[test]
    fn test_zero_means_unbounded() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"

[executor]
max_attempts = 0
oracle_timeout_secs = 0
"#,
        )
        .unwrap();
        assert_eq!(config.executor.attempt_limit(), None);
        assert_eq!(config.executor.oracle_timeout(), None);
    }

    #[test]
    fn test_oracle_override_falls_back_to_model() {
        let config = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"

[oracles.evaluation]
model_id = "gpt-4o-mini"
"#,
        )
        .unwrap();
        assert_eq!(config.model_for(OracleKind::Evaluation).model_id, "gpt-4o-mini");
        assert_eq!(config.model_for(OracleKind::Decision).model_id, "gpt-4o");
        assert_eq!(config.model_for(OracleKind::Matcher).model_id, "gpt-4o");
    }

    #[test]
    fn test_reserved_ids_must_differ() {
        let err = AppConfig::parse(
            r#"
[model]
model_id = "gpt-4o"

[graph]
start_id = 7
end_id = 7
"#,
        )
        .unwrap_err();
        assert!(matches!(err, TracewalkError::Config(_)));
    }
}

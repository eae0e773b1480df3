//! Agent configuration stored under `.agent/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::io::paths::write_atomic;

/// Agent configuration (TOML).
///
/// Missing fields default to values that work against a local bridge and an
/// OpenAI-compatible completion server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Stop after this many episodes without a win. Unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_episodes: Option<u32>,

    pub environment: EnvironmentConfig,
    pub oracle: OracleConfig,
    pub planner: PlannerConfig,
    pub repair: RepairConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Base URL of the game bridge.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3002".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Wire format spoken by the completion endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    /// `POST {api_url}/chat/completions` with `messages`.
    Openai,
    /// `POST {api_url}/messages` with a top-level `system` field.
    Anthropic,
    /// `POST {api_url}/completion` with a single `prompt`.
    Completion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    pub api_url: String,
    pub api_format: ApiFormat,
    pub model: String,
    /// Name of the environment variable holding the API key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Minimum spacing between consecutive requests.
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub inference_temperature: f32,
    pub synthesis_temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080/v1".to_string(),
            api_format: ApiFormat::Openai,
            model: "local".to_string(),
            api_key_env: None,
            max_attempts: 5,
            retry_backoff_ms: 2_000,
            min_interval_ms: 0,
            timeout_secs: 300,
            max_tokens: 4_096,
            inference_temperature: 0.3,
            synthesis_temperature: 0.2,
        }
    }
}

/// Search strategy used each episode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Bfs,
    Iw,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub algorithm: Algorithm,
    pub max_depth: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Bfs,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    /// Contrastive debug rounds allowed per belief before giving up.
    pub max_debug_attempts: u32,
    /// Fault-driven resynthesis rounds allowed for a single transition.
    pub max_resynthesis_attempts: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_debug_attempts: 5,
            max_resynthesis_attempts: 64,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_episodes == Some(0) {
            return Err(anyhow!("max_episodes must be > 0 when set"));
        }
        if self.environment.base_url.trim().is_empty() {
            return Err(anyhow!("environment.base_url must be non-empty"));
        }
        if self.environment.timeout_secs == 0 {
            return Err(anyhow!("environment.timeout_secs must be > 0"));
        }
        if self.oracle.api_url.trim().is_empty() {
            return Err(anyhow!("oracle.api_url must be non-empty"));
        }
        if self.oracle.max_attempts == 0 {
            return Err(anyhow!("oracle.max_attempts must be > 0"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.max_tokens == 0 {
            return Err(anyhow!("oracle.max_tokens must be > 0"));
        }
        for (name, value) in [
            ("inference_temperature", self.oracle.inference_temperature),
            ("synthesis_temperature", self.oracle.synthesis_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("oracle.{name} must be within 0.0..=2.0"));
            }
        }
        if self.planner.max_depth == 0 {
            return Err(anyhow!("planner.max_depth must be > 0"));
        }
        if self.repair.max_resynthesis_attempts == 0 {
            return Err(anyhow!("repair.max_resynthesis_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = AgentConfig {
            max_episodes: Some(3),
            planner: PlannerConfig {
                algorithm: Algorithm::Iw,
                max_depth: 14,
            },
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[repair]\nmax_debug_attempts = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.repair.max_debug_attempts, 2);
        assert_eq!(cfg.repair.max_resynthesis_attempts, 64);
        assert_eq!(cfg.planner, PlannerConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let cfg = AgentConfig {
            max_episodes: Some(0),
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = AgentConfig::default();
        cfg.oracle.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AgentConfig::default();
        cfg.oracle.synthesis_temperature = 3.5;
        assert!(cfg.validate().is_err());
    }
}

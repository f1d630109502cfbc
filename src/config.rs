use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// How raw events collapse into mining steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Key events carry their class name instead of the raw key code.
    pub generalize_keys: bool,
    /// Clipboard events drop the content-type guess.
    pub generalize_clipboard: bool,
    /// When off, steps never carry context.
    pub include_context: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            generalize_keys: true,
            generalize_clipboard: true,
            include_context: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DividerConfig {
    /// Idle gap that closes a session.
    pub timeout_secs: u64,
    pub split_on_app_change: bool,
    /// Sessions shorter than this are dropped.
    pub min_events: usize,
}

impl Default for DividerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            split_on_app_change: true,
            min_events: 3,
        }
    }
}

impl DividerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::bound("divider.timeout_secs", "must be greater than zero"));
        }
        if self.min_events == 0 {
            return Err(ConfigError::bound("divider.min_events", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub min_support: usize,
    pub min_pattern_length: usize,
    pub max_pattern_length: usize,
    /// Chunks used by the parallel miner.
    pub worker_count: usize,
    pub normalizer: NormalizerConfig,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            min_support: 2,
            min_pattern_length: 2,
            max_pattern_length: 10,
            worker_count: 1,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl MinerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_support == 0 {
            return Err(ConfigError::bound("miner.min_support", "must be at least 1"));
        }
        if self.min_pattern_length == 0 {
            return Err(ConfigError::bound("miner.min_pattern_length", "must be at least 1"));
        }
        if self.max_pattern_length < self.min_pattern_length {
            return Err(ConfigError::bound(
                "miner.max_pattern_length",
                format!(
                    "{} is below min_pattern_length {}",
                    self.max_pattern_length, self.min_pattern_length
                ),
            ));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::bound("miner.worker_count", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Period of the scheduling loop.
    pub interval_secs: u64,
    /// Runs with fewer events are skipped.
    pub min_events_for_analysis: usize,
    pub enable_ai_scoring: bool,
    pub scoring_timeout_secs: u64,
    /// Fan mining out over `miner.worker_count` tasks.
    pub parallel_mining: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            min_events_for_analysis: 10,
            enable_ai_scoring: false,
            scoring_timeout_secs: 120,
            parallel_mining: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_secs(self.scoring_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::bound("orchestrator.interval_secs", "must be greater than zero"));
        }
        if self.scoring_timeout_secs == 0 {
            return Err(ConfigError::bound(
                "orchestrator.scoring_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Top-level config as read from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub divider: DividerConfig,
    pub miner: MinerConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AnalyzerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.divider.validate()?;
        self.miner.validate()?;
        self.orchestrator.validate()
    }
}

//! Operator configuration file parser (`oaat.toml`).

use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperatorConfig {
    pub statistics: StatisticsConfig,
    pub timers: TimersConfig,
    pub pods: PodsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Maximum number of runtime samples kept per item.
    pub reservoir_capacity: usize,
    /// Standard deviations added to the mean when predicting runtimes.
    pub confidence_factor: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            reservoir_capacity: 100,
            confidence_factor: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimersConfig {
    /// Re-check interval for a group with nothing running.
    pub idle_interval: String,
    /// Re-check interval while a job pod is running.
    pub running_interval: String,
    /// Retry delay after a failed reconciliation.
    pub error_backoff: String,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            idle_interval: "60s".to_string(),
            running_interval: "5m".to_string(),
            error_backoff: "30s".to_string(),
        }
    }
}

impl TimersConfig {
    pub fn idle(&self) -> anyhow::Result<TimeDelta> {
        interval("timers.idle_interval", &self.idle_interval)
    }

    pub fn running(&self) -> anyhow::Result<TimeDelta> {
        interval("timers.running_interval", &self.running_interval)
    }

    pub fn error_backoff(&self) -> anyhow::Result<TimeDelta> {
        interval("timers.error_backoff", &self.error_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PodsConfig {
    /// Delete job pods once their terminal phase has been recorded.
    pub delete_finished: bool,
    /// Value of the `app` label on every job pod.
    pub app_label: String,
}

impl Default for PodsConfig {
    fn default() -> Self {
        Self {
            delete_finished: true,
            app_label: "oaat-operator".to_string(),
        }
    }
}

fn interval(key: &str, value: &str) -> anyhow::Result<TimeDelta> {
    parse_duration(value).ok_or_else(|| anyhow::anyhow!("{key}: not a duration: {value:?}"))
}

impl OperatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OperatorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every interval parses and the statistics settings are usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.timers.idle()?;
        self.timers.running()?;
        self.timers.error_backoff()?;
        if self.statistics.reservoir_capacity == 0 {
            anyhow::bail!("statistics.reservoir_capacity must be at least 1");
        }
        if !self.statistics.confidence_factor.is_finite() || self.statistics.confidence_factor < 0.0
        {
            anyhow::bail!("statistics.confidence_factor must be a non-negative number");
        }
        Ok(())
    }
}

//! Configuration management for Robofleet.
//!
//! Layering: built-in defaults, then an optional TOML file, then
//! `ROBOFLEET_*` environment overrides. The result is validated before use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ROBOFLEET_";

/// Longest accepted staleness window (one year)
pub const MAX_STALE_AFTER_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    pub store: StoreConfig,
    pub health: HealthConfig,
    pub dispatch: DispatchConfig,
    pub simulation: SimulationConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// How long a writer waits for the database lock
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Robots not updated within this window are marked offline
    pub stale_after_secs: u64,
    /// Battery percentage below which a robot counts as low battery
    pub low_battery_threshold: f64,
    /// Period of the scheduled health check
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Period of the scheduled dispatch pass
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Progress points added per simulator step
    pub progress_quantum: f64,
    /// Delay between chained simulator steps
    pub step_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a finished task's result stays pollable
    pub result_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/robofleet.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            low_battery_threshold: 20.0,
            interval_secs: 60,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            progress_quantum: 25.0,
            step_delay_secs: 5,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: 3_600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl HealthConfig {
    /// Staleness window, clamped to [`MAX_STALE_AFTER_SECS`]
    pub fn stale_after(&self) -> chrono::Duration {
        let max = chrono::Duration::days(365);
        i64::try_from(self.stale_after_secs.min(MAX_STALE_AFTER_SECS))
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(max)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl SchedulerConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl FleetConfig {
    /// Read a TOML file; absent sections keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Defaults, optional file, environment overrides, validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROBOFLEET_*` overrides from the process environment
    pub fn from_env_overrides(mut self) -> Result<Self> {
        self.apply_overrides(std::env::vars())?;
        Ok(self)
    }

    /// Apply overrides from an arbitrary key/value source
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "DB_PATH" => self.store.path = PathBuf::from(value),
                "BUSY_TIMEOUT_MS" => self.store.busy_timeout_ms = parse(&key, &value)?,
                "STALE_AFTER_SECS" => self.health.stale_after_secs = parse(&key, &value)?,
                "LOW_BATTERY_THRESHOLD" => {
                    self.health.low_battery_threshold = parse(&key, &value)?
                }
                "HEALTH_INTERVAL_SECS" => self.health.interval_secs = parse(&key, &value)?,
                "DISPATCH_INTERVAL_SECS" => self.dispatch.interval_secs = parse(&key, &value)?,
                "PROGRESS_QUANTUM" => self.simulation.progress_quantum = parse(&key, &value)?,
                "STEP_DELAY_SECS" => self.simulation.step_delay_secs = parse(&key, &value)?,
                "RESULT_TTL_SECS" => self.scheduler.result_ttl_secs = parse(&key, &value)?,
                "LOG_LEVEL" => self.logging.level = value,
                "LOG_JSON" => self.logging.json = parse(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_STALE_AFTER_SECS).contains(&self.health.stale_after_secs) {
            return Err(Error::Config(format!(
                "health.stale_after_secs must be within [1, {MAX_STALE_AFTER_SECS}]"
            )));
        }
        if !(0.0..=100.0).contains(&self.health.low_battery_threshold) {
            return Err(Error::Config(
                "health.low_battery_threshold must be within [0, 100]".into(),
            ));
        }
        if self.health.interval_secs == 0 || self.dispatch.interval_secs == 0 {
            return Err(Error::Config("reconciler intervals must be > 0".into()));
        }
        if !(self.simulation.progress_quantum > 0.0 && self.simulation.progress_quantum <= 100.0) {
            return Err(Error::Config(
                "simulation.progress_quantum must be within (0, 100]".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value}: {e}")))
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DispatchError, Result};

/// Bookkeeping size for jobs that arrive without a declared size.
pub const DEFAULT_JOB_SIZE: u64 = 30;

/// How the pending queue is drained when a server becomes idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainStrategy {
    /// Pop a single request per freed server.
    DrainOne,
    /// Keep popping while requests and idle servers remain.
    #[default]
    DrainAll,
}

impl FromStr for DrainStrategy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain-one" | "one" => Ok(DrainStrategy::DrainOne),
            "drain-all" | "all" => Ok(DrainStrategy::DrainAll),
            other => Err(DispatchError::Config(format!(
                "unknown drain strategy {other:?}, expected drain-one or drain-all"
            ))),
        }
    }
}

impl fmt::Display for DrainStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainStrategy::DrainOne => write!(f, "drain-one"),
            DrainStrategy::DrainAll => write!(f, "drain-all"),
        }
    }
}

/// How completion timings turn into capacity estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityStrategy {
    /// Estimate once from the first known-size completion and never revise.
    #[default]
    FirstSample,
    /// Fold every known-size completion into a cumulative mean.
    RunningAverage,
}

impl FromStr for CapacityStrategy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-sample" | "first" => Ok(CapacityStrategy::FirstSample),
            "running-average" | "average" => Ok(CapacityStrategy::RunningAverage),
            other => Err(DispatchError::Config(format!(
                "unknown capacity strategy {other:?}, expected first-sample or running-average"
            ))),
        }
    }
}

impl fmt::Display for CapacityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityStrategy::FirstSample => write!(f, "first-sample"),
            CapacityStrategy::RunningAverage => write!(f, "running-average"),
        }
    }
}

/// Tunables of the scheduling engine.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Size booked for requests that did not declare one
    pub default_job_size: u64,
    pub drain_strategy: DrainStrategy,
    pub capacity_strategy: CapacityStrategy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_job_size: DEFAULT_JOB_SIZE,
            drain_strategy: DrainStrategy::default(),
            capacity_strategy: CapacityStrategy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_drain_strategy(mut self, strategy: DrainStrategy) -> Self {
        self.drain_strategy = strategy;
        self
    }

    pub fn with_capacity_strategy(mut self, strategy: CapacityStrategy) -> Self {
        self.capacity_strategy = strategy;
        self
    }

    pub fn with_default_job_size(mut self, size: u64) -> Self {
        self.default_job_size = size;
        self
    }
}

/// Process-level configuration: where to connect and how the loop behaves.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Host of the worker-farm endpoint
    pub host: String,
    pub port: u16,
    /// Interval between `printAll` status requests. Disabled when `None`.
    pub status_interval: Option<Duration>,
    pub scheduler: SchedulerConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            status_interval: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// `host:port` of the endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Overlay `DISPATCHER_*` environment variables on top of the defaults.
    pub fn from_env(port: u16) -> Result<Self> {
        Self::from_lookup(port, |key| std::env::var(key).ok())
    }

    /// Same as [`DispatcherConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(port: u16, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(port);

        if let Some(host) = lookup("DISPATCHER_HOST") {
            config.host = host;
        }

        if let Some(size) = lookup("DISPATCHER_DEFAULT_JOB_SIZE") {
            let size: u64 = size.trim().parse().map_err(|_| {
                DispatchError::Config(format!(
                    "DISPATCHER_DEFAULT_JOB_SIZE must be a positive integer, got {size:?}"
                ))
            })?;
            if size == 0 {
                return Err(DispatchError::Config(
                    "DISPATCHER_DEFAULT_JOB_SIZE must be greater than zero".to_string(),
                ));
            }
            config.scheduler.default_job_size = size;
        }

        if let Some(strategy) = lookup("DISPATCHER_DRAIN_STRATEGY") {
            config.scheduler.drain_strategy = strategy.parse()?;
        }

        if let Some(strategy) = lookup("DISPATCHER_CAPACITY_STRATEGY") {
            config.scheduler.capacity_strategy = strategy.parse()?;
        }

        if let Some(ms) = lookup("DISPATCHER_STATUS_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                DispatchError::Config(format!(
                    "DISPATCHER_STATUS_INTERVAL_MS must be an integer (milliseconds), got {ms:?}"
                ))
            })?;
            // 0 disables the status ticker
            config.status_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.default_job_size, 30);
        assert_eq!(cfg.drain_strategy, DrainStrategy::DrainAll);
        assert_eq!(cfg.capacity_strategy, CapacityStrategy::FirstSample);
    }

    #[test]
    fn dispatcher_config_default() {
        let cfg = DispatcherConfig::new(9000);
        assert_eq!(cfg.endpoint(), "127.0.0.1:9000");
        assert!(cfg.status_interval.is_none());
    }

    #[test]
    fn scheduler_config_builders() {
        let cfg = SchedulerConfig::default()
            .with_drain_strategy(DrainStrategy::DrainOne)
            .with_capacity_strategy(CapacityStrategy::RunningAverage)
            .with_default_job_size(64);
        assert_eq!(cfg.drain_strategy, DrainStrategy::DrainOne);
        assert_eq!(cfg.capacity_strategy, CapacityStrategy::RunningAverage);
        assert_eq!(cfg.default_job_size, 64);
    }

    #[test]
    fn strategies_parse_and_display() {
        assert_eq!(
            "drain-one".parse::<DrainStrategy>().unwrap(),
            DrainStrategy::DrainOne
        );
        assert_eq!(
            "ALL".parse::<DrainStrategy>().unwrap(),
            DrainStrategy::DrainAll
        );
        assert_eq!(
            "running-average".parse::<CapacityStrategy>().unwrap(),
            CapacityStrategy::RunningAverage
        );
        assert!("sideways".parse::<DrainStrategy>().is_err());
        assert!("sideways".parse::<CapacityStrategy>().is_err());
        assert_eq!(DrainStrategy::DrainOne.to_string(), "drain-one");
        assert_eq!(CapacityStrategy::FirstSample.to_string(), "first-sample");
    }

    #[test]
    fn from_lookup_without_variables_uses_defaults() {
        let cfg = DispatcherConfig::from_lookup(7000, lookup_from(&[])).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.scheduler.default_job_size, DEFAULT_JOB_SIZE);
        assert!(cfg.status_interval.is_none());
    }

    #[test]
    fn from_lookup_applies_overrides() {
        let cfg = DispatcherConfig::from_lookup(
            7000,
            lookup_from(&[
                ("DISPATCHER_HOST", "10.0.0.5"),
                ("DISPATCHER_DEFAULT_JOB_SIZE", "50"),
                ("DISPATCHER_DRAIN_STRATEGY", "drain-one"),
                ("DISPATCHER_CAPACITY_STRATEGY", "running-average"),
                ("DISPATCHER_STATUS_INTERVAL_MS", "1000"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.endpoint(), "10.0.0.5:7000");
        assert_eq!(cfg.scheduler.default_job_size, 50);
        assert_eq!(cfg.scheduler.drain_strategy, DrainStrategy::DrainOne);
        assert_eq!(
            cfg.scheduler.capacity_strategy,
            CapacityStrategy::RunningAverage
        );
        assert_eq!(cfg.status_interval, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn from_lookup_zero_status_interval_disables_ticker() {
        let cfg = DispatcherConfig::from_lookup(
            7000,
            lookup_from(&[("DISPATCHER_STATUS_INTERVAL_MS", "0")]),
        )
        .unwrap();
        assert!(cfg.status_interval.is_none());
    }

    #[test]
    fn from_lookup_rejects_bad_values() {
        assert!(DispatcherConfig::from_lookup(
            7000,
            lookup_from(&[("DISPATCHER_DEFAULT_JOB_SIZE", "zero")])
        )
        .is_err());
        assert!(DispatcherConfig::from_lookup(
            7000,
            lookup_from(&[("DISPATCHER_DEFAULT_JOB_SIZE", "0")])
        )
        .is_err());
        assert!(DispatcherConfig::from_lookup(
            7000,
            lookup_from(&[("DISPATCHER_STATUS_INTERVAL_MS", "-5")])
        )
        .is_err());
    }
}

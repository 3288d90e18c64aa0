use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rulepool_core::backend::{HttpBackend, MemoryBackend, RetryingBackend};
use rulepool_core::config::{
    DEFAULT_BUS_NAME, DEFAULT_BUS_PREFIX, DEFAULT_MAX_BUSES, DEFAULT_RULE_LIMIT,
};
use rulepool_core::{PoolConfig, SchedulerBackend};
use rulepool_reconcile::{BackoffPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_SWEEP_INTERVAL};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub pool: PoolConfig,
    pub backend: BackendConfig,
    /// `None` disables the background sweep.
    pub sweep_interval: Option<Duration>,
    pub placement_attempts: u32,
}

/// Which scheduling backend the service talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// In-process backend, for development.
    Memory,
    /// Scheduling gateway over HTTP.
    Http { url: String, timeout: Duration },
}

impl BackendConfig {
    /// Build the configured backend.
    pub fn build(&self) -> Result<Arc<dyn SchedulerBackend>> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryBackend::new())),
            Self::Http { url, timeout } => {
                let client = HttpBackend::new(url.clone(), *timeout)
                    .context("failed to build scheduling gateway client")?;
                Ok(Arc::new(RetryingBackend::new(
                    client,
                    BackoffPolicy::default(),
                )))
            }
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_var(&lookup, "RULEPOOL_LISTEN_ADDR", "127.0.0.1:8080")?;

        let log_level = lookup("RULEPOOL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let bus_prefix =
            lookup("RULEPOOL_BUS_PREFIX").unwrap_or_else(|| DEFAULT_BUS_PREFIX.to_string());
        let rule_limit = parse_var(
            &lookup,
            "RULEPOOL_RULE_LIMIT",
            &DEFAULT_RULE_LIMIT.to_string(),
        )?;
        let max_buses = parse_var(&lookup, "RULEPOOL_MAX_BUSES", &DEFAULT_MAX_BUSES.to_string())?;

        // An empty value means the account has no default bus to fill.
        let default_bus = match lookup("RULEPOOL_DEFAULT_BUS") {
            Some(name) if name.is_empty() => None,
            Some(name) => Some(name),
            None => Some(DEFAULT_BUS_NAME.to_string()),
        };

        let pool = PoolConfig::new(bus_prefix, rule_limit)
            .with_max_buses(max_buses)
            .with_default_bus(default_bus);
        pool.validate()?;

        let backend = match lookup("RULEPOOL_BACKEND_URL").filter(|url| !url.is_empty()) {
            Some(url) => {
                let timeout_secs: u64 = parse_var(&lookup, "RULEPOOL_BACKEND_TIMEOUT_SECS", "30")?;
                BackendConfig::Http {
                    url,
                    timeout: Duration::from_secs(timeout_secs),
                }
            }
            None => BackendConfig::Memory,
        };

        let sweep_secs: u64 = parse_var(
            &lookup,
            "RULEPOOL_SWEEP_INTERVAL_SECS",
            &DEFAULT_SWEEP_INTERVAL.as_secs().to_string(),
        )?;
        let sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let placement_attempts: u32 = parse_var(
            &lookup,
            "RULEPOOL_PLACEMENT_ATTEMPTS",
            &DEFAULT_MAX_ATTEMPTS.to_string(),
        )?;
        anyhow::ensure!(
            placement_attempts > 0,
            "RULEPOOL_PLACEMENT_ATTEMPTS must be at least 1"
        );

        Ok(Self {
            listen_addr,
            log_level,
            pool,
            backend,
            sweep_interval,
            placement_attempts,
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.parse()
        .with_context(|| format!("invalid value for {name}: '{raw}'"))
}

//! Vote coordinator configuration.
//!
//! Configuration is loaded from environment variables. Every variable has a
//! default; a value that is present but unparseable is an error.

use crate::actors::coordinator::CoordinatorSettings;
use crate::actors::dispatch::{AsyncDispatchSettings, DispatchStrategy, OverflowPolicy};
use crate::voting::MAX_ROUND_DURATION;
use std::collections::{HashMap, HashSet};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default TCP voting listener address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default option set.
pub const DEFAULT_OPTIONS: &str = "A,B,C";

/// Default decoupled dispatch queue capacity.
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 1000;

/// Default number of dispatch workers.
pub const DEFAULT_DISPATCH_WORKERS: usize = 1;

/// Default per-write deadline for dispatch workers, in milliseconds.
pub const DEFAULT_SINK_WRITE_TIMEOUT_MS: u64 = 5000;

/// Default per-connection outbound queue size.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default auto-started round length in seconds.
pub const DEFAULT_ROUND_DURATION_SECONDS: u64 = 300;

/// Default delay before the round auto-starts, in seconds.
pub const DEFAULT_ROUND_START_DELAY_SECONDS: u64 = 5;

/// Default drain deadline on shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_DRAIN_SECONDS: u64 = 30;

/// Vote coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP voting listener address (default: "0.0.0.0:9000").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8082").
    pub health_bind_address: String,

    /// Valid options, in display order (default: A, B, C).
    pub options: Vec<String>,

    /// Broadcast strategy, assembled from the `VC_DISPATCH_*` variables and
    /// `VC_SINK_WRITE_TIMEOUT_MS`.
    pub dispatch_strategy: DispatchStrategy,

    /// Per-connection outbound queue size (default: 64).
    pub outbound_buffer: usize,

    /// Length of the auto-started round (default: 300s).
    pub round_duration: Duration,

    /// Delay before auto-start; `None` disables auto-start.
    pub round_start_delay: Option<Duration>,

    /// Padding appended to `UPDATE` lines (default: 0).
    pub update_padding_bytes: usize,

    /// Maximum time to drain queued broadcasts on shutdown (default: 30s).
    pub shutdown_drain: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("VC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("VC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let options = parse_options(
            vars.get("VC_OPTIONS")
                .map_or(DEFAULT_OPTIONS, String::as_str),
        )?;

        let dispatch_strategy = parse_strategy(vars)?;

        let outbound_buffer =
            parse_positive(vars, "VC_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;

        let round_duration = Duration::from_secs(parse_or(
            vars,
            "VC_ROUND_DURATION_SECONDS",
            DEFAULT_ROUND_DURATION_SECONDS,
        )?);
        if round_duration.is_zero() || round_duration > MAX_ROUND_DURATION {
            return Err(ConfigError::InvalidValue(format!(
                "VC_ROUND_DURATION_SECONDS must be between 1 and {}",
                MAX_ROUND_DURATION.as_secs()
            )));
        }

        let round_start_delay = match vars.get("VC_ROUND_START_DELAY_SECONDS") {
            None => Some(Duration::from_secs(DEFAULT_ROUND_START_DELAY_SECONDS)),
            Some(raw) if raw.trim().eq_ignore_ascii_case("off") => None,
            Some(_) => Some(Duration::from_secs(parse_or(
                vars,
                "VC_ROUND_START_DELAY_SECONDS",
                DEFAULT_ROUND_START_DELAY_SECONDS,
            )?)),
        };

        let update_padding_bytes = parse_or(vars, "VC_UPDATE_PADDING_BYTES", 0)?;

        let shutdown_drain = Duration::from_secs(parse_or(
            vars,
            "VC_SHUTDOWN_DRAIN_SECONDS",
            DEFAULT_SHUTDOWN_DRAIN_SECONDS,
        )?);

        Ok(Config {
            bind_address,
            health_bind_address,
            options,
            dispatch_strategy,
            outbound_buffer,
            round_duration,
            round_start_delay,
            update_padding_bytes,
            shutdown_drain,
        })
    }

    /// Coordinator constructor options derived from this configuration.
    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::new(self.options.clone(), self.dispatch_strategy)
            .with_update_padding(self.update_padding_bytes)
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{key} has unparseable value {raw:?}"))
        }),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(vars, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{key} must be greater than 0"
        )));
    }
    Ok(value)
}

fn parse_options(raw: &str) -> Result<Vec<String>, ConfigError> {
    let options: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect();

    if options.is_empty() {
        return Err(ConfigError::InvalidValue(
            "VC_OPTIONS must name at least one option".to_string(),
        ));
    }

    let mut seen: HashSet<&String> = HashSet::new();
    if let Some(duplicate) = options.iter().find(|option| !seen.insert(*option)) {
        return Err(ConfigError::InvalidValue(format!(
            "VC_OPTIONS contains duplicate option {duplicate:?}"
        )));
    }

    Ok(options)
}

fn parse_strategy(vars: &HashMap<String, String>) -> Result<DispatchStrategy, ConfigError> {
    let strategy = vars
        .get("VC_DISPATCH_STRATEGY")
        .map_or("async", |s| s.trim());

    match strategy.to_ascii_lowercase().as_str() {
        "locked" => Ok(DispatchStrategy::LockedSync),
        "async" => {
            let overflow = match vars
                .get("VC_DISPATCH_OVERFLOW")
                .map(|s| s.trim().to_ascii_lowercase())
                .as_deref()
            {
                None | Some("block") => OverflowPolicy::Block,
                Some("drop") => OverflowPolicy::DropNewest,
                Some(other) => {
                    return Err(ConfigError::InvalidValue(format!(
                        "VC_DISPATCH_OVERFLOW must be 'block' or 'drop', got {other:?}"
                    )))
                }
            };

            let timeout_ms = parse_or(
                vars,
                "VC_SINK_WRITE_TIMEOUT_MS",
                DEFAULT_SINK_WRITE_TIMEOUT_MS,
            )?;

            Ok(DispatchStrategy::DecoupledAsync(AsyncDispatchSettings {
                queue_capacity: parse_positive(
                    vars,
                    "VC_DISPATCH_QUEUE_CAPACITY",
                    DEFAULT_DISPATCH_QUEUE_CAPACITY,
                )?,
                workers: parse_positive(vars, "VC_DISPATCH_WORKERS", DEFAULT_DISPATCH_WORKERS)?,
                overflow,
                write_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            }))
        }
        other => Err(ConfigError::InvalidValue(format!(
            "VC_DISPATCH_STRATEGY must be 'async' or 'locked', got {other:?}"
        ))),
    }
}

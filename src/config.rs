//! # Controller configuration.
//!
//! Provides [`Config`], the single explicit configuration object of a controller.
//! It is built once at startup and handed to [`ControllerBuilder`](crate::ControllerBuilder);
//! every registration stores an `Arc<Config>` snapshot in the service's metadata.
//!
//! Config is used in two ways:
//! 1. **Controller creation**: `ControllerBuilder::new(config)`
//! 2. **Per-registration overrides**: [`RegisterOptions`](crate::RegisterOptions) applied on top of it
//!
//! ## Sentinel values
//! - `max_polling = None` → poll a pending service for as long as it keeps replying
//!
//! ## Environment
//! [`Config::from_env`] reads:
//! - `FLOWVISOR_DEAD_CLIENT_TIMEOUT_MS` (default: 10000)
//! - `FLOWVISOR_STATUS_INTERVAL_MS` (default: 100)
//! - `FLOWVISOR_MAX_POLLING_MS` (default: unset, unbounded)
//! - `FLOWVISOR_LOG` (default: `info`)

use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::{DEAD_CLIENT_TIMEOUT, STATUS_INTERVAL};

/// Key identifying configurations produced for this controller.
///
/// A [`Config`] carrying any other key is rejected at construction with
/// [`ControllerError::ConfigKeyMismatch`](crate::ControllerError::ConfigKeyMismatch).
pub const CONFIG_KEY: &str = "flowvisor/v1";

const ENV_DEAD_CLIENT_TIMEOUT: &str = "FLOWVISOR_DEAD_CLIENT_TIMEOUT_MS";
const ENV_STATUS_INTERVAL: &str = "FLOWVISOR_STATUS_INTERVAL_MS";
const ENV_MAX_POLLING: &str = "FLOWVISOR_MAX_POLLING_MS";
const ENV_LOG: &str = "FLOWVISOR_LOG";

/// Global configuration of a controller.
///
/// ## Field semantics
/// - `key`: must equal [`CONFIG_KEY`]
/// - `dead_client_timeout`: silence after which a service's bridge gives up (must be > 0)
/// - `status_interval`: delay before each `Status` probe while pending (must be > 0)
/// - `max_polling`: upper bound on polling one message (`None` = unbounded)
/// - `log`: logging collaborator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Configuration key, checked against [`CONFIG_KEY`] by the builder.
    pub key: String,

    /// Maximum silence while awaiting any reply.
    ///
    /// Re-armed for every wait: after forwarding a signal and after every
    /// `Status` probe.
    pub dead_client_timeout: Duration,

    /// Delay between a `Pending` reply and the next `Status` probe.
    pub status_interval: Duration,

    /// Maximum time spent polling a single message.
    ///
    /// - `None` = keep probing for as long as replies keep arriving as `Pending`
    /// - `Some(d)` = abandon the message once `d` has elapsed since the first `Pending`
    pub max_polling: Option<Duration>,

    /// Logging settings.
    pub log: LogConfig,
}

impl Config {
    /// Loads the configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let cfg = Self {
            key: default.key,
            dead_client_timeout: parse_millis_env(ENV_DEAD_CLIENT_TIMEOUT)?
                .unwrap_or(default.dead_client_timeout),
            status_interval: parse_millis_env(ENV_STATUS_INTERVAL)?
                .unwrap_or(default.status_interval),
            max_polling: parse_millis_env(ENV_MAX_POLLING)?.or(default.max_polling),
            log: LogConfig {
                filter: std::env::var(ENV_LOG).unwrap_or(default.log.filter),
                ..default.log
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dead_client_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "dead_client_timeout",
                "must be greater than zero",
            ));
        }
        if self.status_interval.is_zero() {
            return Err(ConfigError::invalid(
                "status_interval",
                "must be greater than zero",
            ));
        }
        if self.status_interval >= self.dead_client_timeout {
            return Err(ConfigError::invalid(
                "status_interval",
                format!(
                    "{:?} must be shorter than dead_client_timeout {:?}",
                    self.status_interval, self.dead_client_timeout
                ),
            ));
        }
        if matches!(self.max_polling, Some(d) if d.is_zero()) {
            return Err(ConfigError::invalid(
                "max_polling",
                "must be greater than zero when set",
            ));
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `key = CONFIG_KEY`
    /// - `dead_client_timeout = 10s`
    /// - `status_interval = 100ms`
    /// - `max_polling = None` (unbounded)
    /// - `log = LogConfig::default()`
    fn default() -> Self {
        Self {
            key: CONFIG_KEY.to_string(),
            dead_client_timeout: DEAD_CLIENT_TIMEOUT,
            status_interval: STATUS_INTERVAL,
            max_polling: None,
            log: LogConfig::default(),
        }
    }
}

/// Settings for the logging collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `flowvisor=debug`.
    pub filter: String,
    /// Destination of formatted records.
    pub target: LogTarget,
    /// Emit ANSI colors.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            target: LogTarget::Stderr,
            ansi: false,
        }
    }
}

/// Where formatted log records go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    Stdout,
}

fn parse_millis_env(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::Env { var, value }),
        Err(_) => Ok(None),
    }
}

//! # Process-wide log output.
//!
//! Installs a `tracing_subscriber` formatter driven by [`LogConfig`]. Library
//! code only emits `tracing` records; binaries call [`init`] once at startup.
//!
//! Requires the `logging` feature.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LogTarget};
use crate::error::ConfigError;

/// Installs the global subscriber.
///
/// Fails if `cfg.filter` does not parse or a global subscriber is already set.
pub fn init(cfg: &LogConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&cfg.filter)
        .map_err(|e| ConfigError::invalid("log.filter", e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let res = match cfg.target {
        LogTarget::Stderr => registry
            .with(fmt::layer().with_ansi(cfg.ansi).with_writer(std::io::stderr))
            .try_init(),
        LogTarget::Stdout => registry
            .with(fmt::layer().with_ansi(cfg.ansi).with_writer(std::io::stdout))
            .try_init(),
    };
    res.map_err(|e| ConfigError::invalid("log", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_rejected() {
        let cfg = LogConfig {
            filter: "flowvisor=loud".into(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init(&cfg),
            Err(ConfigError::Invalid {
                field: "log.filter",
                ..
            })
        ));
    }
}

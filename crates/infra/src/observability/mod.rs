//! Logging setup
//!
//! Installs a `tracing-subscriber` registry: an `EnvFilter` taken from
//! `RUST_LOG` when set, from [`LoggingConfig::level`] otherwise, and either a
//! human-readable or a JSON formatter on stderr.

use clinisync_domain::{CliniSyncError, LoggingConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Install the global subscriber.
///
/// # Errors
/// `Config` for an unparseable level directive, `Internal` when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)).try_init()
    };

    installed.map_err(|e| CliniSyncError::Internal(format!("tracing already initialised: {e}")))?;
    tracing::debug!(level = %config.level, json = config.json, "Tracing initialised");
    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| {
        CliniSyncError::Config(format!("invalid logging.level {:?}: {e}", config.level))
    })
}

/// Subscriber for tests and embedders that manage the global default
/// themselves.
pub fn subscriber(config: &LoggingConfig) -> Result<impl tracing::Subscriber + Send + Sync> {
    let filter = build_filter(config)?;
    Ok(Registry::default().with(filter).with(fmt::layer().with_test_writer()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_builds_a_filter() {
        let config = LoggingConfig { level: "clinisync_core=debug,info".into(), json: false };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn subscriber_can_be_scoped() {
        let subscriber = subscriber(&LoggingConfig::default()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(kind = "invoice", "scoped subscriber receives events");
        });
    }

    #[test]
    fn second_install_is_reported() {
        let config = LoggingConfig::default();
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(first.is_ok() || second.is_err());
        assert!(matches!(second, Err(CliniSyncError::Internal(_))));
    }
}

//! Tracing subscriber bootstrap

use tracing_subscriber::EnvFilter;

use super::config::{ConfigError, LoggingConfig};

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured filter.
///
/// Returns `Ok(false)` when a global subscriber was already installed,
/// which leaves the existing one in place.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.filter)?,
    };

    Ok(tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(config.ansi)
        .with_env_filter(filter)
        .try_init()
        .is_ok())
}

fn filter_from(directives: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(directives).map_err(|e| ConfigError::InvalidFilter {
        filter: directives.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_directives() {
        assert!(matches!(
            filter_from("hydrate=notalevel"),
            Err(ConfigError::InvalidFilter { .. })
        ));
        assert!(filter_from("hydrate=debug,warn").is_ok());
    }

    #[test]
    fn test_init_is_repeatable() {
        let config = LoggingConfig {
            filter: "hydrate=debug".to_string(),
            ansi: false,
        };
        init(&config).unwrap();
        assert!(!init(&config).unwrap());
    }
}

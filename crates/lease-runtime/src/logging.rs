//! Tracing subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Checks that the filter directives parse.
    ///
    /// # Errors
    ///
    /// Returns an error naming the bad directive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(format!("logging.filter: {e}")))
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ConfigError::Invalid(format!("logging.filter: {e}")))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_directive_rejected() {
        let config = LoggingConfig {
            filter: "lease_core=loud".to_string(),
            json: false,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(matches!(init_logging(&config), Err(ConfigError::Logging(_))));
    }
}

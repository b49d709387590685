//! Semantic validation of the loaded configuration.

use super::schema::CortexConfig;
use crate::error::{ConfigError, ConfigResult};

/// Checks constraints the schema cannot express.
pub fn validate_config(config: &CortexConfig) -> ConfigResult<()> {
    if config.identity.name.trim().is_empty() {
        return Err(ConfigError::Invalid("identity.name must not be empty".into()));
    }

    if config.runtime.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("runtime.data_dir must not be empty".into()));
    }

    if config.runtime.shutdown_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "runtime.shutdown_timeout_secs must be positive".into(),
        ));
    }

    for id in config.plugins.keys() {
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "plugins must be keyed by non-empty plugin id".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CortexConfig::default()).is_ok());
    }

    #[test]
    fn zero_shutdown_timeout_is_invalid() {
        let mut config = CortexConfig::default();
        config.runtime.shutdown_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}

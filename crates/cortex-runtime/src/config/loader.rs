//! Configuration file loader.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized};
use tracing::{debug, info};

use super::schema::CortexConfig;
use super::validation::validate_config;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with multi-source search.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn add_search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.add_search_path(cwd)
        } else {
            self
        }
    }

    /// Adds the user config directory (`<config>/cortex/`) to the search
    /// paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.add_search_path(config_dir.join("cortex"))
        } else {
            self
        }
    }

    /// Loads configuration from the first file found, falling back to
    /// defaults (still layered with `CORTEX_*` env overrides).
    pub fn load(&self) -> ConfigResult<CortexConfig> {
        if let Some(path) = self.find_config_file() {
            return self.load_from_file(&path);
        }
        info!("No configuration file found, using defaults");
        self.extract(Figment::from(Serialized::defaults(CortexConfig::default())))
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<CortexConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        self.load_from_str(&content, path.extension().and_then(|e| e.to_str()))
    }

    /// Loads configuration from a string; `extension` picks the format.
    pub fn load_from_str(
        &self,
        content: &str,
        extension: Option<&str>,
    ) -> ConfigResult<CortexConfig> {
        let expanded = expand_env_vars(content);
        let mut figment = Figment::from(Serialized::defaults(CortexConfig::default()));

        match extension {
            #[cfg(feature = "toml-config")]
            Some("toml") => {
                figment = figment.merge(figment::providers::Toml::string(&expanded));
            }
            #[cfg(feature = "yaml-config")]
            _ => {
                figment = figment.merge(figment::providers::Yaml::string(&expanded));
            }
            #[cfg(not(feature = "yaml-config"))]
            other => {
                return Err(ConfigError::ParseError(format!(
                    "no loader for config format {other:?}"
                )));
            }
        }

        self.extract(figment)
    }

    fn extract(&self, figment: Figment) -> ConfigResult<CortexConfig> {
        let config: CortexConfig = figment
            .merge(Env::prefixed("CORTEX_").split("__"))
            .extract()?;
        validate_config(&config)?;
        debug!(plugins = config.plugins.len(), "Configuration loaded");
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        const CONFIG_NAMES: &[&str] = &[
            "cortex.yaml",
            "cortex.yml",
            "cortex.toml",
            ".cortex.yaml",
            ".cortex.yml",
        ];

        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let path = search_path.join(name);
                debug!("Checking for config file: {}", path.display());
                if path.exists() {
                    info!("Found configuration file: {}", path.display());
                    return Some(path);
                }
            }
        }
        None
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_current_dir().with_user_config_dir()
    }
}

/// Expands `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}").unwrap();
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).unwrap().as_str();
        let var_name = cap.get(1).unwrap().as_str();
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = std::env::var(var_name)
            .ok()
            .or_else(|| default_value.map(String::from))
            .unwrap_or_default();
        result = result.replace(full_match, &value);
    }
    result
}

/// Convenience: load with default search paths.
pub fn load_config() -> ConfigResult<CortexConfig> {
    ConfigLoader::default().load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn empty_input_yields_defaults() {
        let loader = ConfigLoader::new();
        let config = loader.load_from_str("", Some("yaml")).unwrap();
        assert_eq!(config.identity.name, "cortex");
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn minimal_yaml_overrides_defaults() {
        let yaml = r#"
logging:
  level: debug
plugins:
  notes:
    index_on_start: true
"#;
        let loader = ConfigLoader::new();
        let config = loader.load_from_str(yaml, Some("yaml")).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.plugins.contains_key("notes"));
    }

    #[test]
    fn env_var_default_value_expansion() {
        let yaml = r#"
identity:
  name: ${CORTEX_TEST_NOT_SET:-fallback-name}
"#;
        let loader = ConfigLoader::new();
        let config = loader.load_from_str(yaml, Some("yaml")).unwrap();
        assert_eq!(config.identity.name, "fallback-name");
    }

    #[test]
    fn empty_plugin_id_is_rejected() {
        let yaml = r#"
plugins:
  "":
    anything: true
"#;
        let loader = ConfigLoader::new();
        assert!(loader.load_from_str(yaml, Some("yaml")).is_err());
    }
}

//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, HalyardError, Result};
use crate::reconciler::ReconciliationMode;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::HalyardConfig;

/// Environment variable overriding `store.path`.
pub const ENV_STORE_PATH: &str = "HALYARD_STORE_PATH";

/// Environment variable overriding `reconcile.mode`.
pub const ENV_MODE: &str = "HALYARD_MODE";

/// Environment variable overriding `reconcile.delete_orphans`.
pub const ENV_DELETE_ORPHANS: &str = "HALYARD_DELETE_ORPHANS";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<HalyardConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(HalyardError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HalyardError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;
        if let Some(base) = path.parent() {
            self.resolve_paths(&mut config, base);
        }
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<HalyardConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(HalyardConfig::default());
        }

        let config: HalyardConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            HalyardError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration: store at {}, mode {}",
            config.store.path, config.reconcile.mode
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `HALYARD_STORE_PATH`, `HALYARD_MODE` and
    /// `HALYARD_DELETE_ORPHANS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// holds an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<HalyardConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an override holds an invalid value.
    pub fn apply_env_overrides(config: &mut HalyardConfig) -> Result<()> {
        Self::apply_overrides(config, |name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    fn apply_overrides(
        config: &mut HalyardConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(path) = lookup(ENV_STORE_PATH) {
            debug!("Overriding store.path from environment");
            config.store.path = path;
        }

        if let Some(mode) = lookup(ENV_MODE) {
            debug!("Overriding reconcile.mode from environment");
            config.reconcile.mode = <ReconciliationMode as clap::ValueEnum>::from_str(&mode, true)
                .map_err(|_| {
                    ConfigError::validation(
                        format!("invalid mode '{mode}', expected create, update, delete or full"),
                        ENV_MODE,
                    )
                })?;
        }

        if let Some(flag) = lookup(ENV_DELETE_ORPHANS) {
            debug!("Overriding reconcile.delete_orphans from environment");
            config.reconcile.delete_orphans = parse_bool(&flag).ok_or_else(|| {
                ConfigError::validation(
                    format!("invalid boolean '{flag}'"),
                    ENV_DELETE_ORPHANS,
                )
            })?;
        }

        Ok(())
    }

    /// Resolves relative paths against the configuration file's directory.
    fn resolve_paths(&self, config: &mut HalyardConfig, config_dir: &Path) {
        let base = self.base_path.as_deref().unwrap_or(config_dir);
        for resource in &mut config.reconcile.resources {
            if resource.is_relative() {
                *resource = base.join(&*resource);
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HalyardError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["halyard.yaml", "halyard.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HalyardError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::MatchingStrategy;
    use std::collections::HashMap;

    #[test]
    fn test_parse_empty_config() {
        let config = ConfigParser::new().parse_yaml("", None).unwrap();
        assert_eq!(config, HalyardConfig::default());
        assert_eq!(config.store.path, ".halyard/resources.json");
        assert_eq!(config.reconcile.mode, ReconciliationMode::Full);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
store:
  path: /var/lib/halyard/catalog.json

reconcile:
  mode: update
  delete_orphans: true
  delete_orphan_entries: true
  matching: any
  selectors:
    - "label:team In (payments)"
  operation_timeout_secs: 30
  kinds: [Topic, Schema]
  resources:
    - resources/
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.store.path, "/var/lib/halyard/catalog.json");
        assert_eq!(config.reconcile.mode, ReconciliationMode::Update);
        assert!(config.reconcile.delete_orphans);
        assert!(config.reconcile.delete_orphan_entries);
        assert_eq!(config.reconcile.matching, MatchingStrategy::Any);
        assert_eq!(config.reconcile.selectors.len(), 1);
        assert_eq!(config.reconcile.operation_timeout_secs, Some(30));
        assert_eq!(config.reconcile.kinds, vec!["Topic", "Schema"]);
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = ConfigParser::new().parse_yaml("reconcile:\n  mode: everything\n", None);
        assert!(matches!(
            result,
            Err(HalyardError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORE_PATH, "/tmp/catalog.json"),
            (ENV_MODE, "Delete"),
            (ENV_DELETE_ORPHANS, "yes"),
        ]);
        let mut config = HalyardConfig::default();
        ConfigParser::apply_overrides(&mut config, |k| env.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(config.store.path, "/tmp/catalog.json");
        assert_eq!(config.reconcile.mode, ReconciliationMode::Delete);
        assert!(config.reconcile.delete_orphans);

        let bad = HashMap::from([(ENV_DELETE_ORPHANS, "maybe")]);
        let result = ConfigParser::apply_overrides(&mut config, |k| bad.get(k).map(ToString::to_string));
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("halyard.yaml"), "").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("halyard.yaml"));
    }

    #[test]
    fn test_relative_resource_paths_are_resolved() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("halyard.yaml");
        std::fs::write(&path, "reconcile:\n  resources: [topics]\n").unwrap();

        let config = ConfigParser::new().load_file(&path).unwrap();
        assert_eq!(config.reconcile.resources, vec![temp.path().join("topics")]);
    }
}

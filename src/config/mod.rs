//! Configuration module for the Halyard reconciliation engine.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `halyard.yaml`
//! - Validation of configuration values
//! - Loading desired resources from YAML files

mod loader;
mod parser;
mod spec;
mod validator;

pub use loader::ResourceLoader;
pub use parser::{
    find_config_file, ConfigParser, DEFAULT_CONFIG_FILES, ENV_DELETE_ORPHANS, ENV_MODE,
    ENV_STORE_PATH,
};
pub use spec::{HalyardConfig, ReconcileConfig, StoreConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};

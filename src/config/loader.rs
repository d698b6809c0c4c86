//! Desired resource loading.
//!
//! Desired resources are written as multi-document YAML, one resource per
//! document:
//!
//! ```yaml
//! kind: Topic
//! metadata:
//!   name: orders
//!   labels:
//!     team: payments
//! spec:
//!   partitions: 6
//!   configs:
//!     retention.ms: "604800000"
//! ---
//! kind: Topic
//! metadata:
//!   name: audit
//! spec:
//!   partitions: 1
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, HalyardError, Result};
use crate::model::Resource;
use crate::planner::SpecChangeFactory;

/// Extensions read when loading a directory.
const RESOURCE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Loads desired resources from files and directories.
#[derive(Debug, Default)]
pub struct ResourceLoader;

impl ResourceLoader {
    /// Creates a loader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads every resource from the given files or directories, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is missing, unreadable or malformed.
    pub fn load_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        for path in paths {
            resources.extend(self.load_path(path.as_ref())?);
        }

        let mut seen = BTreeSet::new();
        for resource in &resources {
            if !seen.insert((resource.kind.as_str(), resource.name())) {
                warn!(
                    "Resource {}/{} is declared more than once, the last declaration wins",
                    resource.kind,
                    resource.name()
                );
            }
        }
        Ok(resources)
    }

    /// Loads a file, or every `.yaml`/`.yml` file of a directory in name
    /// order (not recursive).
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing, unreadable or malformed.
    pub fn load_path(&self, path: &Path) -> Result<Vec<Resource>> {
        if !path.exists() {
            return Err(HalyardError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        if !path.is_dir() {
            return self.load_file(path);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| RESOURCE_EXTENSIONS.contains(&e))
            })
            .collect();
        files.sort();
        debug!("Found {} resource file(s) in {}", files.len(), path.display());

        let mut resources = Vec::new();
        for file in files {
            resources.extend(self.load_file(&file)?);
        }
        Ok(resources)
    }

    /// Loads one file.
    fn load_file(&self, path: &Path) -> Result<Vec<Resource>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HalyardError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;
        let resources = self.parse_documents(&content, Some(path))?;
        info!("Loaded {} resource(s) from {}", resources.len(), path.display());
        Ok(resources)
    }

    /// Parses a multi-document YAML string; empty documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a document is not a valid resource.
    pub fn parse_documents(&self, content: &str, source: Option<&Path>) -> Result<Vec<Resource>> {
        let location = |index: usize| {
            let document = format!("document {}", index + 1);
            Some(source.map_or(document.clone(), |p| format!("{}, {document}", p.display())))
        };

        let mut resources = Vec::new();
        for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let resource = Option::<Resource>::deserialize(document).map_err(|e| {
                HalyardError::Config(ConfigError::ParseError {
                    message: format!("Invalid resource: {e}"),
                    location: location(index),
                })
            })?;
            let Some(resource) = resource else {
                continue;
            };

            if resource.kind.trim().is_empty() || resource.name().trim().is_empty() {
                return Err(HalyardError::Config(ConfigError::ParseError {
                    message: String::from("Resource kind and metadata.name are required"),
                    location: location(index),
                }));
            }
            SpecChangeFactory::check_spec_keys(&resource).map_err(HalyardError::Config)?;
            resources.push(resource);
        }
        Ok(resources)
    }
}

//! Configuration specification types.
//!
//! This module defines the structs that map to the `halyard.yaml` file. Every
//! section and field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::provider::DEFAULT_STORE_PATH;
use crate::reconciler::ReconciliationMode;
use crate::selector::MatchingStrategy;

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HalyardConfig {
    /// Resource store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Reconciliation behaviour.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Resource store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path of the local resource catalog.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Operations a run may apply.
    #[serde(default)]
    pub mode: ReconciliationMode,
    /// Delete observed resources missing from the desired files.
    #[serde(default)]
    pub delete_orphans: bool,
    /// Delete spec entries present only on observed resources.
    #[serde(default)]
    pub delete_orphan_entries: bool,
    /// Selector expressions restricting the reconciled resources.
    #[serde(default)]
    pub selectors: Vec<String>,
    /// How selector expressions combine.
    #[serde(default)]
    pub matching: MatchingStrategy,
    /// Per-change timeout, in seconds.
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
    /// Managed kinds; empty means every kind found in the desired files.
    #[serde(default)]
    pub kinds: Vec<String>,
    /// Desired resource files or directories used when none is given on
    /// the command line.
    #[serde(default)]
    pub resources: Vec<PathBuf>,
}

fn default_store_path() -> String {
    String::from(DEFAULT_STORE_PATH)
}

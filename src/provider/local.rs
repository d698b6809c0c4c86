//! Local file-based resource provider.
//!
//! This module stores resources in a single JSON catalog file, for local
//! development and for exercising reconciliation without a live system.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{HalyardError, ProviderError, Result};
use crate::model::{ChangeError, Operation, Resource, ResourceChange};
use crate::planner::{ChangeHandler, ChangeResponse, ChangeTask};

use super::ResourceCollector;

/// Default catalog path, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = ".halyard/resources.json";

/// On-disk layout of the catalog.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    #[serde(default)]
    resources: Vec<Resource>,
}

/// Local file-based resource store.
#[derive(Debug)]
pub struct LocalResourceStore {
    /// Path to the catalog file.
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl LocalResourceStore {
    /// Creates a store backed by the given catalog file.
    ///
    /// The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path to the catalog file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists every stored resource, ordered by kind then name.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    pub async fn list_all(&self) -> Result<Vec<Resource>> {
        self.load().await
    }

    /// Gets one resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    pub async fn get(&self, kind: &str, name: &str) -> Result<Option<Resource>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.kind == kind && r.metadata.name == name))
    }

    /// Adds a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::AlreadyExists`] if a resource with the same
    /// kind and name is stored, or an I/O error.
    pub async fn create(&self, resource: Resource) -> Result<()> {
        self.modify(|resources| {
            if position(resources, &resource.kind, &resource.metadata.name).is_some() {
                return Err(ProviderError::AlreadyExists {
                    kind: resource.kind.clone(),
                    name: resource.metadata.name.clone(),
                }
                .into());
            }
            resources.push(resource);
            Ok(())
        })
        .await
    }

    /// Applies `update` to a stored resource.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the resource is not stored, or an
    /// I/O error.
    pub async fn update<F>(&self, kind: &str, name: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut Resource) + Send,
    {
        self.modify(|resources| {
            let Some(pos) = position(resources, kind, name) else {
                return Err(not_found(kind, name));
            };
            update(&mut resources[pos]);
            Ok(())
        })
        .await
    }

    /// Removes a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] if the resource is not stored, or an
    /// I/O error.
    pub async fn remove(&self, kind: &str, name: &str) -> Result<()> {
        self.modify(|resources| {
            let Some(pos) = position(resources, kind, name) else {
                return Err(not_found(kind, name));
            };
            resources.remove(pos);
            Ok(())
        })
        .await
    }

    /// Change handlers applying changes to this store, one per mutating
    /// operation.
    ///
    /// Each change runs in its own task, bounded by `timeout` when set.
    #[must_use]
    pub fn handlers(self: &Arc<Self>, timeout: Option<Duration>) -> Vec<Arc<dyn ChangeHandler>> {
        [Operation::Create, Operation::Update, Operation::Delete]
            .into_iter()
            .map(|operation| {
                Arc::new(LocalChangeHandler {
                    store: Arc::clone(self),
                    operation,
                    timeout,
                }) as Arc<dyn ChangeHandler>
            })
            .collect()
    }

    /// Loads, modifies and saves the catalog under the write lock.
    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Resource>) -> Result<()> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut resources = self.load().await?;
        f(&mut resources)?;
        resources.sort_by(|a, b| (&a.kind, &a.metadata.name).cmp(&(&b.kind, &b.metadata.name)));
        self.save(resources).await
    }

    /// Reads the catalog; a missing file is an empty catalog.
    async fn load(&self) -> Result<Vec<Resource>> {
        if !self.path.exists() {
            debug!("Resource catalog does not exist: {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::storage(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        let catalog: Catalog = serde_json::from_str(&content).map_err(|e| {
            ProviderError::corrupted(format!("Failed to parse {}: {e}", self.path.display()))
        })?;

        Ok(catalog.resources)
    }

    /// Writes the catalog through a temporary file and an atomic rename.
    async fn save(&self, resources: Vec<Resource>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                debug!("Creating catalog directory: {}", parent.display());
                fs::create_dir_all(parent).await.map_err(|e| {
                    ProviderError::storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(&Catalog { resources })
            .map_err(|e| ProviderError::serialization(format!("Failed to serialize catalog: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            ProviderError::storage(format!("Failed to create {}: {e}", temp_path.display()))
        })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| ProviderError::storage(format!("Failed to write catalog: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| ProviderError::storage(format!("Failed to sync catalog: {e}")))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ProviderError::storage(format!("Failed to rename catalog: {e}")))?;

        debug!("Resource catalog saved to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl ResourceCollector for LocalResourceStore {
    async fn list(&self, kind: &str) -> Result<Vec<Resource>> {
        let resources: Vec<Resource> = self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();
        debug!("Collected {} {kind} resource(s) from local store", resources.len());
        Ok(resources)
    }

    fn provider_type(&self) -> &'static str {
        "local"
    }
}

fn position(resources: &[Resource], kind: &str, name: &str) -> Option<usize> {
    resources
        .iter()
        .position(|r| r.kind == kind && r.metadata.name == name)
}

fn not_found(kind: &str, name: &str) -> HalyardError {
    ProviderError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
    .into()
}

/// Applies changes of one operation to a [`LocalResourceStore`].
#[derive(Debug)]
pub struct LocalChangeHandler {
    store: Arc<LocalResourceStore>,
    operation: Operation,
    timeout: Option<Duration>,
}

impl LocalChangeHandler {
    /// Writes one change to the store.
    async fn write(store: &LocalResourceStore, change: &ResourceChange) -> Result<()> {
        let kind = change.kind();
        let name = change.name();
        match change.operation() {
            Operation::Create => {
                let mut resource = Resource::new(kind, name);
                resource.metadata.labels.clone_from(&change.metadata.labels);
                resource.metadata.annotations.clone_from(&change.metadata.annotations);
                for state in change.state_changes() {
                    set_entry(&mut resource.spec, state.name(), state.after().cloned());
                }
                info!("Creating {kind}/{name}");
                store.create(resource).await
            }
            Operation::Update => {
                info!("Updating {kind}/{name}");
                store
                    .update(kind, name, |resource| {
                        resource.metadata.labels.clone_from(&change.metadata.labels);
                        resource.metadata.annotations.clone_from(&change.metadata.annotations);
                        // Removals first, so an entry recreated under an emptied
                        // object survives.
                        let (removed, written): (Vec<_>, Vec<_>) = change
                            .state_changes()
                            .iter()
                            .filter(|state| state.operation() != Operation::None)
                            .partition(|state| state.operation() == Operation::Delete);
                        for state in removed.into_iter().chain(written) {
                            set_entry(&mut resource.spec, state.name(), state.after().cloned());
                        }
                    })
                    .await
            }
            Operation::Delete => {
                info!("Deleting {kind}/{name}");
                store.remove(kind, name).await
            }
            Operation::None | Operation::Ignore => Ok(()),
        }
    }
}

impl ChangeHandler for LocalChangeHandler {
    fn name(&self) -> &str {
        match self.operation {
            Operation::Create => "local-create",
            Operation::Update => "local-update",
            Operation::Delete => "local-delete",
            Operation::None | Operation::Ignore => "local",
        }
    }

    fn supported_operations(&self) -> BTreeSet<Operation> {
        BTreeSet::from([self.operation])
    }

    fn apply(&self, changes: Vec<ResourceChange>) -> Vec<ChangeResponse> {
        changes
            .into_iter()
            .map(|change| {
                let store = Arc::clone(&self.store);
                let timeout = self.timeout;
                let task_change = change.clone();
                let task = ChangeTask::spawn(async move {
                    let write = Self::write(&store, &task_change);
                    let outcome = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, write).await {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                return vec![ChangeError::new(format!(
                                    "change did not complete within {}s",
                                    limit.as_secs_f64()
                                ))
                                .with_code("TIMEOUT")];
                            }
                        },
                        None => write.await,
                    };
                    match outcome {
                        Ok(()) => Vec::new(),
                        Err(e) => vec![ChangeError::new(e.to_string()).with_code(error_code(&e))],
                    }
                });
                ChangeResponse::new(change, task)
            })
            .collect()
    }
}

/// Stable code attached to change errors.
const fn error_code(error: &HalyardError) -> &'static str {
    match error {
        HalyardError::Provider(ProviderError::NotFound { .. }) => "NOT_FOUND",
        HalyardError::Provider(ProviderError::AlreadyExists { .. }) => "ALREADY_EXISTS",
        HalyardError::Provider(_) | HalyardError::Io(_) => "STORAGE",
        HalyardError::Config(_) | HalyardError::Selector(_) | HalyardError::Internal(_) => {
            "INTERNAL"
        }
    }
}

/// Writes (or with `None`, removes) a flattened spec entry.
///
/// `configs.retention.ms` addresses key `retention.ms` of the `configs`
/// object; names without a dot address top-level entries.
fn set_entry(spec: &mut Map<String, Value>, name: &str, value: Option<Value>) {
    match name.split_once('.') {
        None => match value {
            Some(value) => {
                spec.insert(name.to_string(), value);
            }
            None => {
                spec.remove(name);
            }
        },
        Some((top, entry)) => match value {
            Some(value) => {
                let slot = spec
                    .entry(top.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(nested) = slot {
                    nested.insert(entry.to_string(), value);
                }
            }
            None => {
                if let Some(Value::Object(nested)) = spec.get_mut(top) {
                    nested.remove(entry);
                    if nested.is_empty() {
                        spec.remove(top);
                    }
                }
            }
        },
    }
}

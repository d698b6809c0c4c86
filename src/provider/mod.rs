//! Resource providers.
//!
//! A provider reads the observed resources of a managed system and applies
//! changes back onto it. The local provider keeps resources in a JSON
//! catalog file and is used by the CLI and the integration tests.

mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Resource;

pub use local::{LocalChangeHandler, LocalResourceStore, DEFAULT_STORE_PATH};

/// Reads the observed resources of one managed system.
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    /// Lists every observed resource of the given kind.
    async fn list(&self, kind: &str) -> Result<Vec<Resource>>;

    /// Gets the provider type name.
    fn provider_type(&self) -> &'static str;
}

impl std::fmt::Debug for dyn ResourceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResourceCollector").field(&self.provider_type()).finish()
    }
}

//! Change computation between observed and desired collections.
//!
//! This module computes the keyed deltas needed to converge the observed
//! items of a managed system to the desired ones.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use tracing::debug;

use crate::model::{DesiredState, Resource, ResourceChange};

use super::factory::{ChangeFactory, SpecChangeFactory};

/// Extracts the diff key of an item.
pub type KeyExtractor<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;

/// Computes [`ResourceChange`]s from observed and desired collections.
pub struct ResourceChangeComputer<T, K> {
    /// Key extractor; keys must be unique within one collection.
    key_of: KeyExtractor<T, K>,
    /// Value-level diff for matched keys.
    factory: Box<dyn ChangeFactory<K, T>>,
}

impl<T, K: Ord + Clone + Debug> ResourceChangeComputer<T, K> {
    /// Creates a computer from a key extractor and a change factory.
    #[must_use]
    pub fn new(
        key_of: impl Fn(&T) -> K + Send + Sync + 'static,
        factory: impl ChangeFactory<K, T> + 'static,
    ) -> Self {
        Self {
            key_of: Box::new(key_of),
            factory: Box::new(factory),
        }
    }

    /// Computes the changes converging `observed` to `desired`.
    ///
    /// Per key:
    /// - desired only: `Create`, unless marked for deletion (then nothing);
    /// - observed only: `Delete` if `delete_orphans`, else nothing;
    /// - both: `Delete` if marked for deletion, else the factory's diff
    ///   (`Update` or `None`).
    ///
    /// Changes are returned in key order.
    #[must_use]
    pub fn compute_changes(
        &self,
        observed: &[T],
        desired: &[DesiredState<T>],
        delete_orphans: bool,
    ) -> Vec<ResourceChange> {
        let observed_by_key = self.index(observed.iter());
        let desired_by_key = self.index_desired(desired);

        let keys: BTreeSet<&K> = observed_by_key.keys().chain(desired_by_key.keys()).collect();

        let mut changes = Vec::with_capacity(keys.len());
        for key in keys {
            let change = match (observed_by_key.get(key), desired_by_key.get(key)) {
                (None, Some(DesiredState::MarkedForDeletion(_))) => {
                    debug!("{key:?} is marked for deletion but does not exist, skipping");
                    None
                }
                (None, Some(DesiredState::Present(after))) => {
                    Some(self.factory.create_for_create(key, after))
                }
                (Some(before), None) if delete_orphans => {
                    debug!("{key:?} is an orphan, deleting");
                    Some(self.factory.create_for_delete(key, before))
                }
                (Some(_), None) => {
                    debug!("{key:?} is an orphan, leaving it untouched");
                    None
                }
                (Some(before), Some(DesiredState::MarkedForDeletion(_))) => {
                    Some(self.factory.create_for_delete(key, before))
                }
                (Some(before), Some(DesiredState::Present(after))) => {
                    Some(self.factory.create_for_update(key, before, after))
                }
                (None, None) => None,
            };
            changes.extend(change);
        }

        debug!(
            "Computed {} change(s) from {} observed and {} desired item(s)",
            changes.len(),
            observed.len(),
            desired.len()
        );
        changes
    }

    /// Indexes observed items by key.
    fn index<'a>(&self, items: impl Iterator<Item = &'a T>) -> BTreeMap<K, &'a T>
    where
        T: 'a,
    {
        let mut by_key = BTreeMap::new();
        for item in items {
            let key = (self.key_of)(item);
            if by_key.insert(key.clone(), item).is_some() {
                debug!("Duplicate key {key:?} in observed items, keeping the last one");
            }
        }
        by_key
    }

    /// Indexes desired items by key.
    fn index_desired<'a>(&self, items: &'a [DesiredState<T>]) -> BTreeMap<K, &'a DesiredState<T>> {
        let mut by_key = BTreeMap::new();
        for item in items {
            let key = (self.key_of)(item.item());
            if by_key.insert(key.clone(), item).is_some() {
                debug!("Duplicate key {key:?} in desired items, keeping the last one");
            }
        }
        by_key
    }
}

impl ResourceChangeComputer<Resource, String> {
    /// Computer keyed by resource name, diffing specs entry by entry.
    #[must_use]
    pub fn for_resources(factory: SpecChangeFactory) -> Self {
        Self::new(|r: &Resource| r.metadata.name.clone(), factory)
    }
}

impl<T, K> std::fmt::Debug for ResourceChangeComputer<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceChangeComputer").finish_non_exhaustive()
    }
}

//! Stale-set reconciliation.
//!
//! Deletion is decided over local identifiers, never primary keys: an entity
//! whose key representation changed between passes keeps its local id and
//! therefore survives.

use std::collections::HashSet;

use tracing::debug;

use crate::entity::LocalId;
use crate::storage::{ObjectStore, StoreError};

/// `before − after`, in `before` order, without duplicates.
#[must_use]
pub fn stale_ids(before: &[LocalId], after: &[LocalId]) -> Vec<LocalId> {
    let keep: HashSet<LocalId> = after.iter().copied().collect();
    let mut seen = HashSet::with_capacity(before.len());
    before
        .iter()
        .copied()
        .filter(|id| !keep.contains(id) && seen.insert(*id))
        .collect()
}

/// Applies stale-set deletions to a store.
pub struct Reconciler<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Deletes every entity in `before` that is absent from `after` and
    /// returns the identifiers removed.
    ///
    /// An empty `after` deletes all of `before`. Identifiers already gone
    /// from the store are skipped and not reported.
    ///
    /// # Errors
    /// Any store error aborts the pass; deletions already applied stay in the
    /// pending transaction.
    pub fn reconcile(
        &self,
        before: &[LocalId],
        after: &[LocalId],
    ) -> Result<Vec<LocalId>, StoreError> {
        let mut deleted = Vec::new();
        for id in stale_ids(before, after) {
            if self.store.find_by_id(id)?.is_none() {
                continue;
            }
            self.store.delete(id)?;
            deleted.push(id);
        }
        debug!(
            before = before.len(),
            after = after.len(),
            deleted = deleted.len(),
            "reconciled stale entities"
        );
        Ok(deleted)
    }
}

//! Persistence adapters for the repository contracts in
//! [`crate::workflows::buying::repository`].

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::hash::Hash;

use crate::workflows::buying::domain::TransactionId;
use crate::workflows::buying::repository::RepositoryError;
use crate::workflows::buying::transaction::BuyingTransaction;
use crate::workflows::property::{Property, PropertyId};

/// Records saved through [`compare_and_swap`].
pub(crate) trait Revisioned: Clone {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> &Self::Key;
    fn revision(&self) -> u64;
    fn bump_revision(&mut self);
}

impl Revisioned for BuyingTransaction {
    type Key = TransactionId;

    fn key(&self) -> &TransactionId {
        &self.id
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

impl Revisioned for Property {
    type Key = PropertyId;

    fn key(&self) -> &PropertyId {
        &self.id
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

/// Revision-checked replace shared by every adapter.
pub(crate) fn compare_and_swap<R: Revisioned>(
    records: &mut HashMap<R::Key, R>,
    mut record: R,
) -> Result<R, RepositoryError> {
    let stored = records
        .get(record.key())
        .ok_or(RepositoryError::NotFound)?;
    if stored.revision() != record.revision() {
        return Err(RepositoryError::RevisionConflict {
            expected: record.revision(),
            actual: stored.revision(),
        });
    }

    record.bump_revision();
    records.insert(record.key().clone(), record.clone());
    Ok(record)
}

pub(crate) fn insert_new<K, V>(
    records: &mut HashMap<K, V>,
    key: K,
    value: V,
) -> Result<V, RepositoryError>
where
    K: Eq + Hash,
    V: Clone,
{
    if records.contains_key(&key) {
        return Err(RepositoryError::AlreadyExists);
    }
    records.insert(key, value.clone());
    Ok(value)
}

pub(crate) fn replace_existing<K, V>(
    records: &mut HashMap<K, V>,
    key: K,
    value: V,
) -> Result<(), RepositoryError>
where
    K: Eq + Hash,
{
    match records.get_mut(&key) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(RepositoryError::NotFound),
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{compare_and_swap, insert_new, replace_existing};
use crate::workflows::buying::domain::TransactionId;
use crate::workflows::buying::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use crate::workflows::buying::transaction::BuyingTransaction;
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{Property, PropertyId};

/// Process-local store backing all three repositories. Clones share the same maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    transactions: Arc<Mutex<HashMap<TransactionId, BuyingTransaction>>>,
    documents: Arc<Mutex<HashMap<DocumentId, Document>>>,
    properties: Arc<Mutex<HashMap<PropertyId, Property>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
}

impl TransactionRepository for MemoryStore {
    fn insert(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        let mut guard = lock(&self.transactions)?;
        insert_new(&mut *guard, record.id.clone(), record)
    }

    fn fetch(&self, id: &TransactionId) -> Result<Option<BuyingTransaction>, RepositoryError> {
        let guard = lock(&self.transactions)?;
        Ok(guard.get(id).cloned())
    }

    fn save(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        let mut guard = lock(&self.transactions)?;
        compare_and_swap(&mut *guard, record)
    }

    fn list(&self) -> Result<Vec<BuyingTransaction>, RepositoryError> {
        let guard = lock(&self.transactions)?;
        let mut records: Vec<BuyingTransaction> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

impl DocumentRepository for MemoryStore {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut guard = lock(&self.documents)?;
        insert_new(&mut *guard, document.id.clone(), document)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let guard = lock(&self.documents)?;
        Ok(guard.get(id).cloned())
    }

    fn save(&self, document: Document) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.documents)?;
        replace_existing(&mut *guard, document.id.clone(), document)
    }
}

impl PropertyRepository for MemoryStore {
    fn insert(&self, property: Property) -> Result<Property, RepositoryError> {
        let mut guard = lock(&self.properties)?;
        insert_new(&mut *guard, property.id.clone(), property)
    }

    fn fetch(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let guard = lock(&self.properties)?;
        Ok(guard.get(id).cloned())
    }

    fn save(&self, property: Property) -> Result<Property, RepositoryError> {
        let mut guard = lock(&self.properties)?;
        compare_and_swap(&mut *guard, property)
    }

    fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        let guard = lock(&self.properties)?;
        let mut properties: Vec<Property> = guard.values().cloned().collect();
        properties.sort_by(|a, b| a.posted_at.cmp(&b.posted_at));
        Ok(properties)
    }
}

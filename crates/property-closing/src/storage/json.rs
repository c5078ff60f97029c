use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{compare_and_swap, insert_new, replace_existing};
use crate::workflows::buying::domain::TransactionId;
use crate::workflows::buying::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use crate::workflows::buying::transaction::BuyingTransaction;
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{Property, PropertyId};

const TRANSACTIONS_FILE: &str = "buying_transactions.json";
const DOCUMENTS_FILE: &str = "documents.json";
const PROPERTIES_FILE: &str = "properties.json";

/// Flat JSON files in a data directory, one object per entity kind keyed by id.
///
/// Every write rewrites the whole file through a temporary file and a rename, and a process
/// wide lock serializes read-modify-write cycles. Cross-process writers are caught by the
/// transaction revision check.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("json store lock poisoned".to_string()))
    }

    fn read<K, V>(&self, file: &str) -> Result<HashMap<K, V>, RepositoryError>
    where
        K: Eq + Hash + DeserializeOwned,
        V: DeserializeOwned,
    {
        let path = self.root.join(file);
        match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write<K, V>(&self, file: &str, records: &HashMap<K, V>) -> Result<(), RepositoryError>
    where
        K: Eq + Hash + Serialize,
        V: Serialize,
    {
        let path = self.root.join(file);
        let staging = self.root.join(format!("{file}.tmp"));
        let payload = serde_json::to_vec_pretty(records)?;
        fs::write(&staging, payload)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn modify<K, V, T, F>(&self, file: &str, change: F) -> Result<T, RepositoryError>
    where
        K: Eq + Hash + Serialize + DeserializeOwned,
        V: Serialize + DeserializeOwned,
        F: FnOnce(&mut HashMap<K, V>) -> Result<T, RepositoryError>,
    {
        let _guard = self.guard()?;
        let mut records = self.read(file)?;
        let outcome = change(&mut records)?;
        self.write(file, &records)?;
        Ok(outcome)
    }
}

impl TransactionRepository for JsonFileStore {
    fn insert(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        self.modify(TRANSACTIONS_FILE, |records| {
            insert_new(records, record.id.clone(), record)
        })
    }

    fn fetch(&self, id: &TransactionId) -> Result<Option<BuyingTransaction>, RepositoryError> {
        let _guard = self.guard()?;
        let mut records: HashMap<TransactionId, BuyingTransaction> =
            self.read(TRANSACTIONS_FILE)?;
        Ok(records.remove(id))
    }

    fn save(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        self.modify(TRANSACTIONS_FILE, |records| compare_and_swap(records, record))
    }

    fn list(&self) -> Result<Vec<BuyingTransaction>, RepositoryError> {
        let _guard = self.guard()?;
        let records: HashMap<TransactionId, BuyingTransaction> = self.read(TRANSACTIONS_FILE)?;
        let mut records: Vec<BuyingTransaction> = records.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

impl DocumentRepository for JsonFileStore {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        self.modify(DOCUMENTS_FILE, |records| {
            insert_new(records, document.id.clone(), document)
        })
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let _guard = self.guard()?;
        let mut records: HashMap<DocumentId, Document> = self.read(DOCUMENTS_FILE)?;
        Ok(records.remove(id))
    }

    fn save(&self, document: Document) -> Result<(), RepositoryError> {
        self.modify(DOCUMENTS_FILE, |records| {
            replace_existing(records, document.id.clone(), document)
        })
    }
}

impl PropertyRepository for JsonFileStore {
    fn insert(&self, property: Property) -> Result<Property, RepositoryError> {
        self.modify(PROPERTIES_FILE, |records| {
            insert_new(records, property.id.clone(), property)
        })
    }

    fn fetch(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let _guard = self.guard()?;
        let mut records: HashMap<PropertyId, Property> = self.read(PROPERTIES_FILE)?;
        Ok(records.remove(id))
    }

    fn save(&self, property: Property) -> Result<Property, RepositoryError> {
        self.modify(PROPERTIES_FILE, |records| compare_and_swap(records, property))
    }

    fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        let _guard = self.guard()?;
        let records: HashMap<PropertyId, Property> = self.read(PROPERTIES_FILE)?;
        let mut properties: Vec<Property> = records.into_values().collect();
        properties.sort_by(|a, b| a.posted_at.cmp(&b.posted_at));
        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::context::{ActionContext, Actor, UserId};
    use chrono::{TimeZone, Utc};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "property-closing-{name}-{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn transaction() -> BuyingTransaction {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        BuyingTransaction::open(
            TransactionId::new("txn-json"),
            UserId::new("agent-1"),
            UserId::new("buyer-1"),
            PropertyId::new("prop-1"),
            None,
            &ActionContext::new(Actor::buyer("buyer-1"), now),
        )
    }

    #[test]
    fn transactions_survive_reopening_the_store() {
        let dir = scratch_dir("reopen");
        {
            let store = JsonFileStore::open(&dir).expect("store opens");
            let stored = TransactionRepository::insert(&store, transaction()).expect("insert");
            TransactionRepository::save(&store, stored).expect("save");
        }

        let store = JsonFileStore::open(&dir).expect("store reopens");
        let fetched = TransactionRepository::fetch(&store, &TransactionId::new("txn-json"))
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.revision, 1);
        assert_eq!(fetched.notes.len(), 1);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn stale_save_is_rejected_on_disk() {
        let dir = scratch_dir("stale");
        let store = JsonFileStore::open(&dir).expect("store opens");
        let stored = TransactionRepository::insert(&store, transaction()).expect("insert");
        TransactionRepository::save(&store, stored.clone()).expect("first save");

        assert!(matches!(
            TransactionRepository::save(&store, stored),
            Err(RepositoryError::RevisionConflict { .. })
        ));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_file_is_reported_as_corrupt() {
        let dir = scratch_dir("corrupt");
        fs::write(dir.join(TRANSACTIONS_FILE), b"{ not json").expect("seed file");
        let store = JsonFileStore::open(&dir).expect("store opens");

        assert!(matches!(
            TransactionRepository::list(&store),
            Err(RepositoryError::Corrupt(_))
        ));

        fs::remove_dir_all(dir).ok();
    }
}

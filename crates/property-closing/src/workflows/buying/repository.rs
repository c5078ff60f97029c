use super::domain::TransactionId;
use super::transaction::BuyingTransaction;
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{Property, PropertyId};

/// Storage contract for buying transactions.
///
/// `save` is a compare-and-swap on `revision`: the record must carry the revision it was
/// loaded with, and the stored copy comes back with the revision incremented. A writer holding
/// a stale copy gets [`RepositoryError::RevisionConflict`] and must reload before retrying.
pub trait TransactionRepository: Send + Sync {
    fn insert(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError>;
    fn fetch(&self, id: &TransactionId) -> Result<Option<BuyingTransaction>, RepositoryError>;
    fn save(&self, record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError>;
    fn list(&self) -> Result<Vec<BuyingTransaction>, RepositoryError>;
}

/// Document registry. Documents are only ever inserted or updated in place.
pub trait DocumentRepository: Send + Sync {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError>;
    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    fn save(&self, document: Document) -> Result<(), RepositoryError>;
}

/// Property listings. `save` follows the same revision check as
/// [`TransactionRepository::save`], so two requests racing to reserve the same listing cannot
/// both win.
pub trait PropertyRepository: Send + Sync {
    fn insert(&self, property: Property) -> Result<Property, RepositoryError>;
    fn fetch(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    fn save(&self, property: Property) -> Result<Property, RepositoryError>;
    fn list(&self) -> Result<Vec<Property>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently (expected revision {expected}, found {actual})")]
    RevisionConflict { expected: u64, actual: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored record is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl RepositoryError {
    /// Conflicts and outages may succeed when retried with a fresh copy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RevisionConflict { .. } | Self::Unavailable(_) | Self::Io(_)
        )
    }
}

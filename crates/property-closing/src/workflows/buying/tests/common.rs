use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::storage::MemoryStore;
use crate::workflows::buying::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use crate::workflows::buying::{
    buying_router, BuyingDocumentType, BuyingService, BuyingTransaction, ReservationRequest,
    TransactionId,
};
use crate::workflows::context::{ActionContext, Actor, ActorRole, FixedClock, SequentialIds, UserId};
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{MandatoryDocument, Property, PropertyId, PropertyListing};

pub(super) const AGENT: &str = "agent-7";
pub(super) const BUYER: &str = "buyer-42";
pub(super) const NOTARY: &str = "notary-3";
pub(super) const PROPERTY: &str = "prop-rue-verte";

pub(super) type MemoryService = BuyingService<MemoryStore, MemoryStore, MemoryStore>;

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn agent() -> Actor {
    Actor::agent(AGENT)
}

pub(super) fn buyer() -> Actor {
    Actor::buyer(BUYER)
}

pub(super) fn notary() -> Actor {
    Actor::notary(NOTARY)
}

pub(super) fn ctx(actor: Actor) -> ActionContext {
    ActionContext::new(actor, start())
}

pub(super) fn ctx_at(actor: Actor, minutes: i64) -> ActionContext {
    ActionContext::new(actor, start() + Duration::minutes(minutes))
}

pub(super) fn fresh_transaction() -> BuyingTransaction {
    BuyingTransaction::open(
        TransactionId::new("txn-000001"),
        UserId::new(AGENT),
        UserId::new(BUYER),
        PropertyId::new(PROPERTY),
        Some(32_500_000),
        &ctx(buyer()),
    )
}

pub(super) fn uploaded_document(id: &str, by: &Actor) -> Document {
    Document::uploaded(
        DocumentId::new(id),
        "scan.pdf",
        format!("buying_documents/{id}.pdf"),
        by.id.clone(),
        start(),
    )
}

/// Transaction holding the generated reservation agreement, as a reservation leaves it.
pub(super) fn reserved_transaction() -> BuyingTransaction {
    let mut transaction = fresh_transaction();
    let agreement = Document::generated(
        DocumentId::new("doc-agreement"),
        "Reservation Agreement",
        "buying_documents/doc-agreement.pdf",
        UserId::system(),
        start(),
    );
    transaction
        .upload_document(
            BuyingDocumentType::ReservationAgreement,
            &agreement,
            &ActionContext::system(start()),
        )
        .expect("system uploads the reservation agreement");
    transaction
}

/// Reservation signed by both parties, leaving the transaction in financial verification.
pub(super) fn financial_verification_transaction() -> BuyingTransaction {
    let mut transaction = reserved_transaction();
    for actor in [buyer(), agent()] {
        transaction
            .sign_document(BuyingDocumentType::ReservationAgreement, &ctx(actor))
            .expect("reservation signature");
    }
    assert!(transaction.check_and_advance_phase(&ctx(agent())));
    transaction
}

/// Upload, validate, and collect every signature for a document type.
pub(super) fn complete_document(
    transaction: &mut BuyingTransaction,
    doc_type: BuyingDocumentType,
    uploader: Actor,
) {
    let document = uploaded_document(&format!("doc-{}", doc_type.key()), &uploader);
    transaction
        .upload_document(doc_type, &document, &ctx(uploader))
        .expect("upload");
    transaction
        .validate_document(doc_type, true, "", &ctx(notary()))
        .expect("validation");
    for role in doc_type.config().required_signers {
        let actor = match role {
            ActorRole::Agent => agent(),
            ActorRole::Buyer => buyer(),
            ActorRole::Notary => notary(),
            ActorRole::System => Actor::system(),
        };
        transaction
            .sign_document(doc_type, &ctx(actor))
            .expect("signature");
    }
}

/// Listing as the agent posts it: no documents filed, no notary attached.
pub(super) fn bare_listing() -> Property {
    Property::new(
        PropertyId::new(PROPERTY),
        UserId::new(AGENT),
        PropertyListing {
            title: "Three-room flat near the canal".to_string(),
            description: "Renovated, south facing, with cellar".to_string(),
            dimension: "74 m2".to_string(),
            price: 32_500_000,
            address: "12 rue Verte".to_string(),
            city: "Lyon".to_string(),
            postal_code: "69001".to_string(),
            country: "France".to_string(),
            number_of_rooms: Some(3),
        },
        start() - Duration::days(20),
    )
}

pub(super) fn listing_document_id(slot: MandatoryDocument) -> DocumentId {
    DocumentId::new(format!("doc-listing-{}", slot.key()))
}

/// Mandatory documents for the listing, each already approved by the notary.
pub(super) fn listing_documents() -> Vec<Document> {
    MandatoryDocument::ordered()
        .into_iter()
        .map(|slot| {
            let mut document = Document::uploaded(
                listing_document_id(slot),
                format!("{}.pdf", slot.key()),
                format!("property_documents/{}.pdf", slot.key()),
                UserId::new(AGENT),
                start() - Duration::days(20),
            );
            document.validate(UserId::new(NOTARY), start() - Duration::days(10));
            document
        })
        .collect()
}

/// Listing with every mandatory slot filled and the notary attached; reservable once
/// [`listing_documents`] are in the registry.
pub(super) fn listing_property() -> Property {
    let mut property = bare_listing();
    for slot in MandatoryDocument::ordered() {
        property.fill_mandatory_slot(slot, listing_document_id(slot), start() - Duration::days(20));
    }
    property.attach_notary(UserId::new(NOTARY));
    property.validated_at = Some(start() - Duration::days(10));
    property
}

pub(super) fn seed_listing(store: &MemoryStore, property: Property) {
    for document in listing_documents() {
        DocumentRepository::insert(store, document).expect("seed listing document");
    }
    PropertyRepository::insert(store, property).expect("seed property");
}

pub(super) fn build_service() -> (MemoryService, Arc<MemoryStore>, Arc<FixedClock>) {
    build_service_with(listing_property())
}

pub(super) fn build_service_with(
    property: Property,
) -> (MemoryService, Arc<MemoryStore>, Arc<FixedClock>) {
    let store = Arc::new(MemoryStore::default());
    seed_listing(store.as_ref(), property);
    let clock = Arc::new(FixedClock::new(start()));
    let service = BuyingService::with_runtime(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        Arc::new(SequentialIds::default()),
    );
    (service, store, clock)
}

pub(super) fn reservation_request() -> ReservationRequest {
    ReservationRequest {
        property_id: PropertyId::new(PROPERTY),
        buyer_id: UserId::new(BUYER),
        final_price: None,
    }
}

pub(super) fn reserved_service() -> (
    MemoryService,
    Arc<MemoryStore>,
    Arc<FixedClock>,
    TransactionId,
) {
    let (service, store, clock) = build_service();
    let transaction = service
        .reserve_property(reservation_request(), buyer())
        .expect("reservation succeeds");
    (service, store, clock, transaction.id)
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    buying_router(Arc::new(service))
}

/// Store whose backend is down.
pub(super) struct UnavailableStore;

impl TransactionRepository for UnavailableStore {
    fn insert(&self, _record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &TransactionId) -> Result<Option<BuyingTransaction>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _record: BuyingTransaction) -> Result<BuyingTransaction, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<BuyingTransaction>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl DocumentRepository for UnavailableStore {
    fn insert(&self, _document: Document) -> Result<Document, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _document: Document) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl PropertyRepository for UnavailableStore {
    fn insert(&self, _property: Property) -> Result<Property, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _property: Property) -> Result<Property, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Property store whose reads always return the listing as it was before any write, so every
/// caller acts on the same copy, as two overlapping requests would.
pub(super) struct SnapshotProperties {
    pub store: Arc<MemoryStore>,
    pub snapshot: Property,
}

impl PropertyRepository for SnapshotProperties {
    fn insert(&self, property: Property) -> Result<Property, RepositoryError> {
        PropertyRepository::insert(self.store.as_ref(), property)
    }

    fn fetch(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        Ok((&self.snapshot.id == id).then(|| self.snapshot.clone()))
    }

    fn save(&self, property: Property) -> Result<Property, RepositoryError> {
        PropertyRepository::save(self.store.as_ref(), property)
    }

    fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        PropertyRepository::list(self.store.as_ref())
    }
}

/// Document registry whose updates fail while `failing` is set.
pub(super) struct FlakyDocuments {
    pub store: Arc<MemoryStore>,
    pub failing: AtomicBool,
}

impl FlakyDocuments {
    pub(super) fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            failing: AtomicBool::new(false),
        }
    }

    pub(super) fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DocumentRepository for FlakyDocuments {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        DocumentRepository::insert(self.store.as_ref(), document)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        DocumentRepository::fetch(self.store.as_ref(), id)
    }

    fn save(&self, document: Document) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("registry timeout".to_string()));
        }
        DocumentRepository::save(self.store.as_ref(), document)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

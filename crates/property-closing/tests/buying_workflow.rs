use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use property_closing::storage::{JsonFileStore, MemoryStore};
use property_closing::workflows::buying::{
    BuyingDocumentType, BuyingService, DocumentRepository, PropertyRepository,
    ReservationRequest, TransactionId, TransactionRepository, TransactionStatus, UploadRequest,
    ValidationDecision, WorkflowPhase,
};
use property_closing::workflows::{
    Actor, FixedClock, MandatoryDocument, Property, PropertyId, PropertyListing, PropertyStatus,
    SequentialIds, UserId,
};

fn opening_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn listing() -> Property {
    Property::new(
        PropertyId::new("prop-orchard"),
        UserId::new("agent-1"),
        PropertyListing {
            title: "Orchard house".to_string(),
            description: "Detached house with fruit trees".to_string(),
            dimension: "140 m2".to_string(),
            price: 48_000_000,
            address: "3 chemin des Pommiers".to_string(),
            city: "Annecy".to_string(),
            postal_code: "74000".to_string(),
            country: "France".to_string(),
            number_of_rooms: Some(5),
        },
        opening_day() - Duration::days(45),
    )
}

fn upload(name: &str) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        storage_locator: format!("buying_documents/{name}"),
    }
}

fn approve() -> ValidationDecision {
    ValidationDecision {
        approve: true,
        notes: String::new(),
    }
}

/// Agent files the legal documents, the notary attaches and signs them off.
fn prepare_listing<T, D, P>(service: &BuyingService<T, D, P>)
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let property_id = PropertyId::new("prop-orchard");
    let agent = Actor::agent("agent-1");
    let notary = Actor::notary("notary-1");

    for slot in MandatoryDocument::ordered() {
        service
            .upload_mandatory_document(
                &property_id,
                slot,
                upload(&format!("{}.pdf", slot.key())),
                "",
                agent.clone(),
            )
            .expect("mandatory upload");
    }
    service
        .attach_notary(&property_id, notary.clone())
        .expect("notary attaches");
    for slot in MandatoryDocument::ordered() {
        service
            .validate_property_document(&property_id, slot, approve(), notary.clone())
            .expect("listing validation");
    }
    assert!(service.property_review(&property_id).expect("review").reservable);
}

/// Drive a purchase from reservation to completion through the service only.
fn run_purchase<T, D, P>(service: &BuyingService<T, D, P>, clock: &FixedClock) -> TransactionId
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let agent = Actor::agent("agent-1");
    let buyer = Actor::buyer("buyer-1");
    let notary = Actor::notary("notary-1");

    prepare_listing(service);
    let transaction = service
        .reserve_property(
            ReservationRequest {
                property_id: PropertyId::new("prop-orchard"),
                buyer_id: UserId::new("buyer-1"),
                final_price: Some(47_000_000),
            },
            buyer.clone(),
        )
        .expect("reservation");
    let id = transaction.id;

    use BuyingDocumentType::*;

    for actor in [buyer.clone(), agent.clone()] {
        service
            .sign_document(&id, ReservationAgreement, actor)
            .expect("reservation signature");
    }
    assert_eq!(
        service.transaction(&id).expect("load").current_phase,
        WorkflowPhase::FinancialVerification
    );

    clock.advance(Duration::days(4));
    service
        .upload_document(&id, ProofOfFunds, upload("funds.pdf"), buyer.clone())
        .expect("funds upload");
    service
        .validate_document(&id, ProofOfFunds, approve(), notary.clone())
        .expect("funds validation");
    let report = service
        .sign_document(&id, ProofOfFunds, buyer.clone())
        .expect("funds signature");
    assert!(report.phase_advanced);

    clock.advance(Duration::days(10));
    service
        .upload_document(&id, PreliminaryContract, upload("compromis.pdf"), notary.clone())
        .expect("preliminary upload");
    service
        .validate_document(&id, PreliminaryContract, approve(), notary.clone())
        .expect("preliminary validation");
    service
        .upload_document(&id, DepositPaymentProof, upload("deposit.pdf"), buyer.clone())
        .expect("deposit upload");
    service
        .validate_document(&id, DepositPaymentProof, approve(), agent.clone())
        .expect("deposit validation");
    for actor in [buyer.clone(), agent.clone(), notary.clone()] {
        service
            .sign_document(&id, PreliminaryContract, actor)
            .expect("preliminary signature");
    }
    assert_eq!(
        service.transaction(&id).expect("load").current_phase,
        WorkflowPhase::FinalContract
    );

    clock.advance(Duration::days(60));
    service
        .upload_document(&id, FinalPaymentProof, upload("transfer.pdf"), buyer.clone())
        .expect("payment upload");
    service
        .validate_document(&id, FinalPaymentProof, approve(), notary.clone())
        .expect("payment validation");
    service
        .upload_document(&id, FinalPurchaseContract, upload("acte.pdf"), notary.clone())
        .expect("final contract upload");
    service
        .validate_document(&id, FinalPurchaseContract, approve(), notary.clone())
        .expect("final contract validation");
    for actor in [buyer, agent, notary.clone()] {
        service
            .sign_document(&id, FinalPurchaseContract, actor)
            .expect("final signature");
    }

    for status in [
        TransactionStatus::UnderReview,
        TransactionStatus::Approved,
        TransactionStatus::Completed,
    ] {
        service
            .update_status(&id, status, "", notary.clone())
            .expect("status change");
    }

    id
}

#[test]
fn purchase_runs_to_completion_in_memory() {
    let store = Arc::new(MemoryStore::default());
    PropertyRepository::insert(store.as_ref(), listing()).expect("seed property");
    let clock = Arc::new(FixedClock::new(opening_day()));
    let service = BuyingService::with_runtime(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        Arc::new(SequentialIds::default()),
    );

    let id = run_purchase(&service, &clock);

    let transaction = service.transaction(&id).expect("load");
    assert_eq!(transaction.current_phase, WorkflowPhase::Completion);
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(
        transaction.transaction_date,
        Some(opening_day() + Duration::days(74))
    );
    assert_eq!(transaction.final_price, Some(47_000_000));

    let progress = service.progress(&id).expect("progress");
    assert_eq!(progress.phase_position, progress.phase_count);
    assert_eq!(progress.validated_documents, progress.total_documents);

    let property = PropertyRepository::fetch(store.as_ref(), &PropertyId::new("prop-orchard"))
        .expect("fetch")
        .expect("present");
    assert_eq!(property.status, PropertyStatus::Sold);
}

#[test]
fn purchase_state_survives_on_disk() {
    let dir = std::env::temp_dir().join(format!(
        "property-closing-it-{}",
        uuid::Uuid::new_v4()
    ));
    let clock = Arc::new(FixedClock::new(opening_day()));

    let id = {
        let store = Arc::new(JsonFileStore::open(&dir).expect("open store"));
        PropertyRepository::insert(store.as_ref(), listing()).expect("seed property");
        let service = BuyingService::with_runtime(
            store.clone(),
            store.clone(),
            store,
            clock.clone(),
            Arc::new(SequentialIds::default()),
        );
        run_purchase(&service, &clock)
    };

    let reopened = Arc::new(JsonFileStore::open(&dir).expect("reopen store"));
    let service = BuyingService::new(reopened.clone(), reopened.clone(), reopened);
    let transaction = service.transaction(&id).expect("load after reopen");
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.current_phase, WorkflowPhase::Completion);
    assert!(transaction.is_document_fully_signed(BuyingDocumentType::FinalPurchaseContract));

    std::fs::remove_dir_all(dir).ok();
}

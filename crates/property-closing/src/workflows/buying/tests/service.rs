use super::common::*;
use chrono::Duration;
use std::sync::Arc;

use crate::storage::MemoryStore;
use crate::workflows::buying::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use crate::workflows::buying::{
    BuyingDocumentType, BuyingService, BuyingServiceError, MeetingRequest, MeetingStatus,
    MeetingType, NoteType, ReservationRequest, TransactionId, TransactionStatus, UploadRequest,
    ValidationDecision, WorkflowPhase,
};
use crate::workflows::context::{Actor, ActorRole, FixedClock, SequentialIds, UserId};
use crate::workflows::documents::DocumentId;
use crate::workflows::property::{AdditionalCategory, MandatoryDocument, PropertyId, PropertyStatus};
use crate::workflows::rejection::WorkflowRejection;

fn upload(name: &str) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        storage_locator: format!("buying_documents/{name}"),
    }
}

fn decision(approve: bool, notes: &str) -> ValidationDecision {
    ValidationDecision {
        approve,
        notes: notes.to_string(),
    }
}

fn expect_rejection<V: std::fmt::Debug>(
    result: Result<V, BuyingServiceError>,
    expected: WorkflowRejection,
) {
    match result {
        Err(BuyingServiceError::Rejected(rejection)) => assert_eq!(rejection, expected),
        other => panic!("expected {expected:?}, got {other:?}"),
    }
}

#[test]
fn reservation_opens_transaction_with_signable_agreement() {
    let (service, store, _clock) = build_service();

    let transaction = service
        .reserve_property(reservation_request(), buyer())
        .expect("reservation succeeds");

    assert_eq!(transaction.id, TransactionId::new("txn-000001"));
    assert_eq!(transaction.agent_id, UserId::new(AGENT));
    assert_eq!(transaction.final_price, Some(32_500_000));
    assert_eq!(transaction.current_phase, WorkflowPhase::Reservation);
    assert!(transaction.is_validated(BuyingDocumentType::ReservationAgreement));

    let document = DocumentRepository::fetch(store.as_ref(), &DocumentId::new("doc-000002"))
        .expect("fetch")
        .expect("agreement registered");
    assert!(document.is_validated());
    assert_eq!(document.validated_by(), Some(&UserId::system()));

    let property = PropertyRepository::fetch(store.as_ref(), &PropertyId::new(PROPERTY))
        .expect("fetch")
        .expect("property present");
    assert!(property.reserved);
    assert_eq!(property.reserved_by, Some(UserId::new(BUYER)));
    assert_eq!(property.status, PropertyStatus::Reserved);

    let eligibility = service
        .can_sign(
            &transaction.id,
            BuyingDocumentType::ReservationAgreement,
            &buyer(),
        )
        .expect("eligibility");
    assert!(eligibility.eligible);
}

#[test]
fn second_reservation_of_the_same_property_is_rejected() {
    let (service, _store, _clock, _) = reserved_service();

    match service.reserve_property(reservation_request(), buyer()) {
        Err(BuyingServiceError::Rejected(WorkflowRejection::PropertyAlreadyReserved)) => {}
        other => panic!("expected property already reserved, got {other:?}"),
    }
}

#[test]
fn reserving_an_unknown_property_is_not_found() {
    let (service, _store, _clock) = build_service();
    let mut request = reservation_request();
    request.property_id = PropertyId::new("prop-missing");

    let error = service
        .reserve_property(request, buyer())
        .expect_err("unknown property");
    assert!(error.is_not_found());
}

#[test]
fn buyer_cannot_reserve_on_behalf_of_someone_else() {
    let (service, _store, _clock) = build_service();

    match service.reserve_property(reservation_request(), Actor::buyer("buyer-other")) {
        Err(BuyingServiceError::Rejected(WorkflowRejection::NotAParty)) => {}
        other => panic!("expected not a party, got {other:?}"),
    }
}

#[test]
fn signing_the_reservation_advances_and_persists() {
    let (service, store, _clock, id) = reserved_service();
    let doc_type = BuyingDocumentType::ReservationAgreement;

    let report = service
        .sign_document(&id, doc_type, buyer())
        .expect("buyer signs");
    assert!(!report.phase_advanced);

    let report = service
        .sign_document(&id, doc_type, agent())
        .expect("agent signs");
    assert!(report.receipt.fully_signed);
    assert!(report.phase_advanced);
    assert_eq!(
        report.transaction.current_phase,
        WorkflowPhase::FinancialVerification
    );

    let stored = TransactionRepository::fetch(store.as_ref(), &id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.current_phase, WorkflowPhase::FinancialVerification);
    assert_eq!(stored.revision, report.transaction.revision);
}

#[test]
fn validation_is_mirrored_onto_the_document_registry() {
    let (service, store, clock, id) = reserved_service();
    for actor in [buyer(), agent()] {
        service
            .sign_document(&id, BuyingDocumentType::ReservationAgreement, actor)
            .expect("reservation signature");
    }

    let doc_type = BuyingDocumentType::ProofOfFunds;
    let transaction = service
        .upload_document(&id, doc_type, upload("funds.pdf"), buyer())
        .expect("upload");
    let document_id = transaction
        .document_id(doc_type)
        .cloned()
        .expect("slot filled");

    clock.advance(Duration::hours(3));
    let report = service
        .validate_document(
            &id,
            doc_type,
            ValidationDecision {
                approve: true,
                notes: "Balance covers the price".to_string(),
            },
            notary(),
        )
        .expect("notary validates");
    assert_eq!(
        report.outcome.status_changed_to,
        Some(TransactionStatus::DocumentsPending)
    );
    assert!(!report.phase_advanced);
    assert!(report.registry_synced);

    let document = DocumentRepository::fetch(store.as_ref(), &document_id)
        .expect("fetch")
        .expect("document present");
    assert_eq!(document.validated_by(), Some(&UserId::new(NOTARY)));
    assert_eq!(document.validated_at(), Some(start() + Duration::hours(3)));

    service
        .validate_document(
            &id,
            doc_type,
            ValidationDecision {
                approve: false,
                notes: "Wrong account holder".to_string(),
            },
            notary(),
        )
        .expect("notary rejects");
    let document = DocumentRepository::fetch(store.as_ref(), &document_id)
        .expect("fetch")
        .expect("document present");
    assert!(!document.is_validated());
}

#[test]
fn replacement_upload_links_to_the_superseded_document() {
    let (service, store, _clock, id) = reserved_service();
    let doc_type = BuyingDocumentType::MortgagePreapproval;

    let first = service
        .upload_document(&id, doc_type, upload("preapproval.pdf"), buyer())
        .expect("upload");
    let first_id = first.document_id(doc_type).cloned().expect("first id");

    let second = service
        .upload_document(&id, doc_type, upload("preapproval-v2.pdf"), buyer())
        .expect("replacement");
    let second_id = second.document_id(doc_type).cloned().expect("second id");
    assert_ne!(first_id, second_id);

    let document = DocumentRepository::fetch(store.as_ref(), &second_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(document.supersedes, Some(first_id.clone()));
    assert!(DocumentRepository::fetch(store.as_ref(), &first_id)
        .expect("fetch")
        .is_some());
}

#[test]
fn outsiders_cannot_act_on_the_transaction() {
    let (service, _store, _clock, id) = reserved_service();
    let outsider = Actor::buyer("buyer-other");

    match service.sign_document(&id, BuyingDocumentType::ReservationAgreement, outsider.clone()) {
        Err(BuyingServiceError::Rejected(WorkflowRejection::NotAParty)) => {}
        other => panic!("expected not a party, got {other:?}"),
    }

    let eligibility = service
        .can_sign(&id, BuyingDocumentType::ReservationAgreement, &outsider)
        .expect("eligibility");
    assert!(!eligibility.eligible);
    assert_eq!(
        eligibility.reason.as_deref(),
        Some("not a party to this transaction")
    );
}

#[test]
fn stale_writer_receives_revision_conflict() {
    let (service, store, _clock, id) = reserved_service();
    let stale = TransactionRepository::fetch(store.as_ref(), &id)
        .expect("fetch")
        .expect("present");

    service
        .add_note(&id, "Buyer asked about parking", NoteType::General, buyer())
        .expect("note");

    match TransactionRepository::save(store.as_ref(), stale) {
        Err(error @ RepositoryError::RevisionConflict { .. }) => assert!(error.is_retryable()),
        other => panic!("expected revision conflict, got {other:?}"),
    }
}

#[test]
fn cancelling_releases_the_property() {
    let (service, store, _clock, id) = reserved_service();

    let transaction = service
        .update_status(&id, TransactionStatus::Cancelled, "Financing fell through", agent())
        .expect("cancel");
    assert!(transaction.is_closed());

    let property = PropertyRepository::fetch(store.as_ref(), &PropertyId::new(PROPERTY))
        .expect("fetch")
        .expect("present");
    assert!(!property.reserved);
    assert_eq!(property.status, PropertyStatus::Active);

    match service.add_note(&id, "too late", NoteType::General, agent()) {
        Err(BuyingServiceError::Rejected(WorkflowRejection::TransactionClosed { .. })) => {}
        other => panic!("expected closed transaction, got {other:?}"),
    }
}

#[test]
fn meetings_round_trip_through_the_service() {
    let (service, _store, clock, id) = reserved_service();

    let meeting = service
        .schedule_meeting(
            &id,
            MeetingRequest {
                meeting_type: MeetingType::ContractDiscussion,
                scheduled_for: start() + Duration::days(3),
                participants: vec![UserId::new(BUYER), UserId::new(NOTARY)],
                location: "Notary office".to_string(),
                agenda: "Walk through the preliminary contract".to_string(),
            },
            notary(),
        )
        .expect("schedule");
    assert_eq!(meeting.status, MeetingStatus::Scheduled);

    let progress = service.progress(&id).expect("progress");
    assert_eq!(progress.active_meetings, 1);

    clock.advance(Duration::days(3) + Duration::hours(1));
    let completed = service
        .complete_meeting(&id, &meeting.id, "Agreed on the deposit", notary())
        .expect("complete");
    assert_eq!(completed.status, MeetingStatus::Completed);
    assert_eq!(completed.notes, "Agreed on the deposit");
}

#[test]
fn explicit_advance_reports_what_is_missing() {
    let (service, _store, _clock, id) = reserved_service();

    let advance = service.advance_phase(&id, agent()).expect("advance call");
    assert!(!advance.advanced);
    assert_eq!(advance.phase, WorkflowPhase::Reservation);
    assert_eq!(advance.readiness.unsigned_documents.len(), 1);
}

#[test]
fn listing_filters_by_party() {
    let (service, _store, _clock, id) = reserved_service();

    let mine = service
        .transactions_for_user(&UserId::new(BUYER), ActorRole::Buyer)
        .expect("list");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, id);

    let notary_queue = service
        .transactions_for_user(&UserId::new(NOTARY), ActorRole::Notary)
        .expect("list");
    assert!(notary_queue.is_empty());
}

#[test]
fn repository_outage_surfaces_as_repository_error() {
    let store = Arc::new(UnavailableStore);
    let service = BuyingService::new(store.clone(), store.clone(), store);

    match service.transaction(&TransactionId::new("txn-000001")) {
        Err(BuyingServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable repository, got {other:?}"),
    }
}

#[test]
fn unknown_transaction_is_not_found() {
    let (service, _store, _clock) = build_service();

    match service.progress(&TransactionId::new("txn-missing")) {
        Err(BuyingServiceError::TransactionNotFound(id)) => assert_eq!(id.as_str(), "txn-missing"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn overlapping_reservations_cannot_both_win() {
    let store = Arc::new(MemoryStore::default());
    seed_listing(store.as_ref(), listing_property());
    let snapshot = PropertyRepository::fetch(store.as_ref(), &PropertyId::new(PROPERTY))
        .expect("fetch")
        .expect("property present");
    let properties = Arc::new(SnapshotProperties {
        store: store.clone(),
        snapshot,
    });
    let service = BuyingService::with_runtime(
        store.clone(),
        store.clone(),
        properties,
        Arc::new(FixedClock::new(start())),
        Arc::new(SequentialIds::default()),
    );

    let first = service
        .reserve_property(reservation_request(), buyer())
        .expect("first reservation wins");

    let rival = ReservationRequest {
        property_id: PropertyId::new(PROPERTY),
        buyer_id: UserId::new("buyer-77"),
        final_price: None,
    };
    match service.reserve_property(rival, Actor::buyer("buyer-77")) {
        Err(BuyingServiceError::Repository(RepositoryError::RevisionConflict {
            expected,
            actual,
        })) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected revision conflict, got {other:?}"),
    }

    let transactions = TransactionRepository::list(store.as_ref()).expect("list");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].id, first.id);
    assert!(
        DocumentRepository::fetch(store.as_ref(), &DocumentId::new("doc-000004"))
            .expect("fetch")
            .is_none(),
        "losing reservation must not register an agreement"
    );

    let property = PropertyRepository::fetch(store.as_ref(), &PropertyId::new(PROPERTY))
        .expect("fetch")
        .expect("present");
    assert_eq!(property.reserved_by, Some(UserId::new(BUYER)));
    assert_eq!(property.revision, 1);
}

#[test]
fn withdrawn_or_sold_listings_cannot_be_reserved() {
    for status in [PropertyStatus::Withdrawn, PropertyStatus::Sold] {
        let mut property = listing_property();
        property.status = status;
        let (service, store, _clock) = build_service_with(property);

        expect_rejection(
            service.reserve_property(reservation_request(), buyer()),
            WorkflowRejection::PropertyNotAvailable,
        );
        assert!(TransactionRepository::list(store.as_ref())
            .expect("list")
            .is_empty());
    }
}

#[test]
fn listing_without_a_notary_cannot_be_reserved() {
    let mut property = listing_property();
    property.notary_attached = None;
    let (service, _store, _clock) = build_service_with(property);

    expect_rejection(
        service.reserve_property(reservation_request(), buyer()),
        WorkflowRejection::NotaryNotAttached,
    );
}

#[test]
fn listing_with_an_unvalidated_document_cannot_be_reserved() {
    let (service, store, _clock) = build_service();
    let permit_id = listing_document_id(MandatoryDocument::BuildingPermit);
    let mut permit = DocumentRepository::fetch(store.as_ref(), &permit_id)
        .expect("fetch")
        .expect("present");
    permit.revoke();
    DocumentRepository::save(store.as_ref(), permit).expect("save");

    expect_rejection(
        service.reserve_property(reservation_request(), buyer()),
        WorkflowRejection::PropertyNotValidated,
    );

    let property = PropertyRepository::fetch(store.as_ref(), &PropertyId::new(PROPERTY))
        .expect("fetch")
        .expect("present");
    assert!(!property.reserved);
    assert_eq!(property.revision, 0);
}

#[test]
fn agent_and_notary_prepare_a_listing_until_it_is_reservable() {
    let (service, _store, clock) = build_service_with(bare_listing());
    let property_id = PropertyId::new(PROPERTY);

    let review = service.property_review(&property_id).expect("review");
    assert_eq!(review.validated_documents, 0);
    assert_eq!(review.total_documents, 3);
    assert!(!review.reservable);

    for slot in MandatoryDocument::ordered() {
        service
            .upload_mandatory_document(
                &property_id,
                slot,
                upload(&format!("{}.pdf", slot.key())),
                "",
                agent(),
            )
            .expect("agent files document");
    }
    expect_rejection(
        service.upload_mandatory_document(
            &property_id,
            MandatoryDocument::TitleDeed,
            upload("deed.pdf"),
            "",
            buyer(),
        ),
        WorkflowRejection::NotAParty,
    );
    expect_rejection(
        service.reserve_property(reservation_request(), buyer()),
        WorkflowRejection::NotaryNotAttached,
    );

    expect_rejection(
        service.attach_notary(&property_id, agent()),
        WorkflowRejection::NotAuthorizedToValidate,
    );
    let property = service
        .attach_notary(&property_id, notary())
        .expect("notary attaches");
    assert_eq!(property.notary_attached, Some(UserId::new(NOTARY)));

    expect_rejection(
        service.validate_property_document(
            &property_id,
            MandatoryDocument::TitleDeed,
            decision(true, ""),
            Actor::notary("notary-other"),
        ),
        WorkflowRejection::NotAParty,
    );
    for slot in [MandatoryDocument::TitleDeed, MandatoryDocument::LandRegistryExtract] {
        service
            .validate_property_document(&property_id, slot, decision(true, ""), notary())
            .expect("notary approves");
    }
    expect_rejection(
        service.reserve_property(reservation_request(), buyer()),
        WorkflowRejection::PropertyNotValidated,
    );

    let before = service
        .property_review(&property_id)
        .expect("review")
        .property;
    let original_permit = before.mandatory_documents[&MandatoryDocument::BuildingPermit]
        .clone()
        .expect("permit filed");
    let replaced = service
        .upload_mandatory_document(
            &property_id,
            MandatoryDocument::BuildingPermit,
            upload("permit-v2.pdf"),
            "Permit amended after extension",
            agent(),
        )
        .expect("agent replaces permit");
    let new_permit = replaced.mandatory_documents[&MandatoryDocument::BuildingPermit]
        .clone()
        .expect("permit filed");
    assert_ne!(new_permit, original_permit);
    assert_eq!(
        service.document(&new_permit).expect("registered").supersedes,
        Some(original_permit)
    );
    assert_eq!(
        replaced.agent_notes.last().map(|note| note.note.as_str()),
        Some("Replaced Building Permit: Permit amended after extension")
    );

    clock.advance(Duration::hours(2));
    let review = service
        .validate_property_document(
            &property_id,
            MandatoryDocument::BuildingPermit,
            decision(true, "Matches the cadastre"),
            notary(),
        )
        .expect("notary approves permit");
    assert!(review.fully_validated);
    assert!(review.reservable);
    assert_eq!(
        review.property.validated_at,
        Some(start() + Duration::hours(2))
    );

    let with_plan = service
        .add_additional_document(
            &property_id,
            AdditionalCategory::FloorPlans,
            upload("ground-floor.pdf"),
            "Ground floor",
            agent(),
        )
        .expect("additional document");
    assert_eq!(with_plan.additional_documents[&AdditionalCategory::FloorPlans].len(), 1);

    let noted = service
        .add_agent_note(&property_id, "Keys are with the concierge", "viewing", agent())
        .expect("agent note");
    assert_eq!(
        noted.agent_notes.last().map(|note| note.context.as_str()),
        Some("viewing")
    );

    let review = service.property_review(&property_id).expect("review");
    assert_eq!(
        review.additional_document_counts[&AdditionalCategory::FloorPlans],
        1
    );
    assert!(!review.recent_activity.is_empty());

    service
        .reserve_property(reservation_request(), buyer())
        .expect("reservation succeeds");
}

#[test]
fn rejecting_a_listing_document_clears_validation() {
    let (service, _store, _clock) = build_service();
    let property_id = PropertyId::new(PROPERTY);

    let review = service
        .validate_property_document(
            &property_id,
            MandatoryDocument::TitleDeed,
            decision(false, "Owner name does not match"),
            notary(),
        )
        .expect("notary rejects");
    assert!(!review.fully_validated);
    assert!(!review.reservable);
    assert_eq!(review.validated_documents, 2);
    assert_eq!(review.property.validated_at, None);

    expect_rejection(
        service.reserve_property(reservation_request(), buyer()),
        WorkflowRejection::PropertyNotValidated,
    );
}

#[test]
fn empty_mandatory_slot_cannot_be_validated() {
    let mut property = bare_listing();
    property.attach_notary(UserId::new(NOTARY));
    let (service, _store, _clock) = build_service_with(property);

    expect_rejection(
        service.validate_property_document(
            &PropertyId::new(PROPERTY),
            MandatoryDocument::TitleDeed,
            decision(true, ""),
            notary(),
        ),
        WorkflowRejection::MandatoryDocumentMissing,
    );
}

#[test]
fn registry_failure_keeps_the_decision_and_can_be_repaired() {
    let store = Arc::new(MemoryStore::default());
    seed_listing(store.as_ref(), listing_property());
    let documents = Arc::new(FlakyDocuments::new(store.clone()));
    let service = BuyingService::with_runtime(
        store.clone(),
        documents.clone(),
        store.clone(),
        Arc::new(FixedClock::new(start())),
        Arc::new(SequentialIds::default()),
    );

    let id = service
        .reserve_property(reservation_request(), buyer())
        .expect("reservation")
        .id;
    for actor in [buyer(), agent()] {
        service
            .sign_document(&id, BuyingDocumentType::ReservationAgreement, actor)
            .expect("reservation signature");
    }
    let doc_type = BuyingDocumentType::ProofOfFunds;
    let document_id = service
        .upload_document(&id, doc_type, upload("funds.pdf"), buyer())
        .expect("upload")
        .document_id(doc_type)
        .cloned()
        .expect("slot filled");

    documents.fail_saves(true);
    let report = service
        .validate_document(&id, doc_type, decision(true, ""), notary())
        .expect("decision is kept on the transaction");
    assert!(!report.registry_synced);
    assert!(report.transaction.is_validated(doc_type));
    let stored = TransactionRepository::fetch(store.as_ref(), &id)
        .expect("fetch")
        .expect("present");
    assert!(stored.is_validated(doc_type));
    assert!(!service.document(&document_id).expect("present").is_validated());

    match service.sync_document_registry(&id, doc_type, notary()) {
        Err(BuyingServiceError::Repository(error)) => assert!(error.is_retryable()),
        other => panic!("expected repository error, got {other:?}"),
    }

    documents.fail_saves(false);
    let document = service
        .sync_document_registry(&id, doc_type, notary())
        .expect("registry repaired");
    assert_eq!(document.validated_by(), Some(&UserId::new(NOTARY)));
    assert_eq!(document.validated_at(), Some(start()));
    assert!(service.document(&document_id).expect("present").is_validated());
}

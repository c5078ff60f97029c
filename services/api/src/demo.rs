use crate::infra::{seed_listing, SAMPLE_AGENT, SAMPLE_NOTARY, SAMPLE_PROPERTY};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use property_closing::error::AppError;
use property_closing::storage::MemoryStore;
use property_closing::workflows::buying::{
    BuyingDocumentType, BuyingService, MeetingRequest, MeetingType, NoteType, PropertyRepository,
    ReservationRequest, TransactionId, TransactionStatus, UploadRequest, ValidationDecision,
};
use property_closing::workflows::{Actor, Clock, FixedClock, PropertyId, SequentialIds, UserId};
use std::sync::Arc;

const DEMO_BUYER: &str = "buyer-sample";

type DemoService = BuyingService<MemoryStore, MemoryStore, MemoryStore>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reservation timestamp (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_timestamp)]
    pub(crate) start: Option<DateTime<Utc>>,
    /// Cancel the purchase once financing is verified instead of closing it.
    #[arg(long)]
    pub(crate) cancel: bool,
    /// Print the final transaction record as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

struct Cast {
    agent: Actor,
    buyer: Actor,
    notary: Actor,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        cancel,
        json,
    } = args;

    let start = start.unwrap_or_else(Utc::now);
    let store = Arc::new(MemoryStore::default());
    seed_listing(store.as_ref(), start)?;
    let clock = Arc::new(FixedClock::new(start));
    let service = BuyingService::with_runtime(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        Arc::new(SequentialIds::default()),
    );
    let cast = Cast {
        agent: Actor::agent(SAMPLE_AGENT),
        buyer: Actor::buyer(DEMO_BUYER),
        notary: Actor::notary(SAMPLE_NOTARY),
    };

    println!("Property buying workflow demo");
    println!("Started {}", start.format("%Y-%m-%d %H:%M UTC"));

    let review = service.property_review(&PropertyId::new(SAMPLE_PROPERTY))?;
    println!(
        "Listing {}: {}/{} legal documents validated, notary {}, reservable: {}",
        review.property.id,
        review.validated_documents,
        review.total_documents,
        SAMPLE_NOTARY,
        review.reservable
    );

    let transaction = service.reserve_property(
        ReservationRequest {
            property_id: PropertyId::new(SAMPLE_PROPERTY),
            buyer_id: UserId::new(DEMO_BUYER),
            final_price: None,
        },
        cast.buyer.clone(),
    )?;
    let id = transaction.id.clone();
    println!(
        "\nReserved {} for {} -> transaction {}",
        SAMPLE_PROPERTY, DEMO_BUYER, id
    );
    render_progress(&service, &id)?;

    for actor in [cast.buyer.clone(), cast.agent.clone()] {
        sign(&service, &id, BuyingDocumentType::ReservationAgreement, actor)?;
    }
    render_progress(&service, &id)?;

    clock.advance(Duration::days(3));
    submit(&service, &id, BuyingDocumentType::ProofOfFunds, "bank-statement.pdf", &cast.buyer)?;
    validate(&service, &id, BuyingDocumentType::ProofOfFunds, &cast.notary)?;
    sign(&service, &id, BuyingDocumentType::ProofOfFunds, cast.buyer.clone())?;
    render_progress(&service, &id)?;

    if cancel {
        clock.advance(Duration::days(2));
        let transaction = service.update_status(
            &id,
            TransactionStatus::Cancelled,
            "Buyer withdrew after the survey",
            cast.agent.clone(),
        )?;
        println!("\nTransaction cancelled -> status {}", transaction.status);
        render_property(store.as_ref())?;
        return finish(&service, &id, json);
    }

    clock.advance(Duration::days(2));
    let meeting = service.schedule_meeting(
        &id,
        MeetingRequest {
            meeting_type: MeetingType::ContractDiscussion,
            scheduled_for: clock.now() + Duration::days(5),
            participants: vec![UserId::new(DEMO_BUYER), UserId::new(SAMPLE_AGENT)],
            location: "Notary office".to_string(),
            agenda: "Review the preliminary contract".to_string(),
        },
        cast.notary.clone(),
    )?;
    println!(
        "\nScheduled {} on {}",
        meeting.meeting_type.label(),
        meeting.scheduled_for.format("%Y-%m-%d %H:%M")
    );

    clock.advance(Duration::days(5));
    service.complete_meeting(&id, &meeting.id, "Parties agreed on the deposit", cast.notary.clone())?;
    submit(&service, &id, BuyingDocumentType::PreliminaryContract, "compromis.pdf", &cast.notary)?;
    validate(&service, &id, BuyingDocumentType::PreliminaryContract, &cast.notary)?;
    submit(&service, &id, BuyingDocumentType::DepositPaymentProof, "deposit.pdf", &cast.buyer)?;
    validate(&service, &id, BuyingDocumentType::DepositPaymentProof, &cast.agent)?;
    for actor in [cast.buyer.clone(), cast.agent.clone(), cast.notary.clone()] {
        sign(&service, &id, BuyingDocumentType::PreliminaryContract, actor)?;
    }
    render_progress(&service, &id)?;

    clock.advance(Duration::days(60));
    service.add_note(
        &id,
        "Loan offer received, final deed booked",
        NoteType::General,
        cast.buyer.clone(),
    )?;
    submit(&service, &id, BuyingDocumentType::FinalPaymentProof, "transfer.pdf", &cast.buyer)?;
    validate(&service, &id, BuyingDocumentType::FinalPaymentProof, &cast.notary)?;
    submit(&service, &id, BuyingDocumentType::FinalPurchaseContract, "acte.pdf", &cast.notary)?;
    validate(&service, &id, BuyingDocumentType::FinalPurchaseContract, &cast.notary)?;
    for actor in [cast.buyer.clone(), cast.agent.clone(), cast.notary.clone()] {
        sign(&service, &id, BuyingDocumentType::FinalPurchaseContract, actor)?;
    }

    for status in [
        TransactionStatus::UnderReview,
        TransactionStatus::Approved,
        TransactionStatus::Completed,
    ] {
        let transaction = service.update_status(&id, status, "", cast.notary.clone())?;
        println!("- status -> {}", transaction.status);
    }
    render_progress(&service, &id)?;
    render_property(store.as_ref())?;

    finish(&service, &id, json)
}

fn submit(
    service: &DemoService,
    id: &TransactionId,
    doc_type: BuyingDocumentType,
    name: &str,
    actor: &Actor,
) -> Result<(), AppError> {
    service.upload_document(
        id,
        doc_type,
        UploadRequest {
            name: name.to_string(),
            storage_locator: format!("buying_documents/{id}/{name}"),
        },
        actor.clone(),
    )?;
    println!("- {} uploaded {}", actor.role, doc_type.config().name);
    Ok(())
}

fn validate(
    service: &DemoService,
    id: &TransactionId,
    doc_type: BuyingDocumentType,
    actor: &Actor,
) -> Result<(), AppError> {
    let report = service.validate_document(
        id,
        doc_type,
        ValidationDecision {
            approve: true,
            notes: String::new(),
        },
        actor.clone(),
    )?;
    println!("- {} validated {}", actor.role, doc_type.config().name);
    if let Some(status) = report.outcome.status_changed_to {
        println!("  status -> {}", status);
    }
    Ok(())
}

fn sign(
    service: &DemoService,
    id: &TransactionId,
    doc_type: BuyingDocumentType,
    actor: Actor,
) -> Result<(), AppError> {
    let role = actor.role;
    let report = service.sign_document(id, doc_type, actor)?;
    println!(
        "- {} signed {}{}",
        role,
        doc_type.config().name,
        if report.receipt.fully_signed {
            " (fully signed)"
        } else {
            ""
        }
    );
    if report.phase_advanced {
        println!(
            "  phase -> {}",
            report.transaction.current_phase.label()
        );
    }
    Ok(())
}

fn render_progress(service: &DemoService, id: &TransactionId) -> Result<(), AppError> {
    let progress = service.progress(id)?;
    println!(
        "Progress: phase {}/{} {} | {}/{} documents validated ({:.0}%) | status {}",
        progress.phase_position,
        progress.phase_count,
        progress.phase_label,
        progress.validated_documents,
        progress.total_documents,
        progress.progress_percentage,
        progress.status_label
    );
    Ok(())
}

fn render_property(store: &MemoryStore) -> Result<(), AppError> {
    if let Some(property) = PropertyRepository::fetch(store, &PropertyId::new(SAMPLE_PROPERTY))? {
        println!(
            "Property {} is now {:?} (reserved: {})",
            property.id.0, property.status, property.reserved
        );
    }
    Ok(())
}

fn finish(service: &DemoService, id: &TransactionId, json: bool) -> Result<(), AppError> {
    let transaction = service.transaction(id)?;
    println!(
        "\nAudit trail: {} notes, {} meetings, revision {}",
        transaction.notes.len(),
        transaction.meetings.len(),
        transaction.revision
    );
    if json {
        match serde_json::to_string_pretty(&transaction) {
            Ok(payload) => println!("{}", payload),
            Err(err) => println!("Transaction payload unavailable: {}", err),
        }
    }
    Ok(())
}

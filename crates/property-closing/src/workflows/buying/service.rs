use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::blueprint::{
    requirements_for_phase, BuyingDocumentType, PhaseBlueprint, PhaseRequirements, WorkflowBlueprint,
    WorkflowPhase,
};
use super::domain::{
    Meeting, MeetingId, MeetingRequest, NoteType, TransactionId, TransactionNote,
    TransactionStatus,
};
use super::progress::{transactions_for_user, BuyingProgress, PhaseOverview};
use super::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use super::transaction::{BuyingTransaction, PhaseReadiness, SignatureReceipt, ValidationOutcome};
use crate::workflows::context::{
    ActionContext, Actor, ActorRole, Clock, IdGenerator, SystemClock, UserId, UuidGenerator,
};
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{Property, PropertyId};
use crate::workflows::rejection::WorkflowRejection;

/// Request to open a purchase on a listed property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub property_id: PropertyId,
    pub buyer_id: UserId,
    #[serde(default)]
    pub final_price: Option<u64>,
}

/// Metadata of a file already placed in document storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub name: String,
    pub storage_locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub approve: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub phase_advanced: bool,
    /// False when the decision is stored on the transaction but the registry write failed;
    /// [`BuyingService::sync_document_registry`] repairs it.
    pub registry_synced: bool,
    pub transaction: BuyingTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningReport {
    pub receipt: SignatureReceipt,
    pub phase_advanced: bool,
    pub transaction: BuyingTransaction,
}

/// Answer to "may this party sign now", with the refusal reason when not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignEligibility {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Result<(), WorkflowRejection>> for SignEligibility {
    fn from(value: Result<(), WorkflowRejection>) -> Self {
        match value {
            Ok(()) => Self {
                eligible: true,
                reason: None,
            },
            Err(rejection) => Self {
                eligible: false,
                reason: Some(rejection.reason()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseAdvance {
    pub advanced: bool,
    pub phase: WorkflowPhase,
    pub readiness: PhaseReadiness,
}

/// Service composing the transaction engine with document and property registries.
///
/// Every mutation is load, apply, save. The save is revision-checked, so two parties racing on
/// the same transaction cannot silently overwrite each other; the loser gets
/// [`RepositoryError::RevisionConflict`] and retries against the fresh record.
pub struct BuyingService<T, D, P> {
    pub(super) transactions: Arc<T>,
    pub(super) documents: Arc<D>,
    pub(super) properties: Arc<P>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
}

impl<T, D, P> BuyingService<T, D, P>
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    pub fn new(transactions: Arc<T>, documents: Arc<D>, properties: Arc<P>) -> Self {
        Self::with_runtime(
            transactions,
            documents,
            properties,
            Arc::new(SystemClock),
            Arc::new(UuidGenerator),
        )
    }

    pub fn with_runtime(
        transactions: Arc<T>,
        documents: Arc<D>,
        properties: Arc<P>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            transactions,
            documents,
            properties,
            clock,
            ids,
        }
    }

    pub(super) fn context(&self, actor: Actor) -> ActionContext {
        ActionContext::new(actor, self.clock.now())
    }

    pub(super) fn load_property(&self, id: &PropertyId) -> Result<Property, BuyingServiceError> {
        self.properties
            .fetch(id)?
            .ok_or_else(|| BuyingServiceError::PropertyNotFound(id.clone()))
    }

    /// Registry documents currently held in the listing's mandatory slots.
    pub(super) fn mandatory_registry(
        &self,
        property: &Property,
    ) -> Result<HashMap<DocumentId, Document>, BuyingServiceError> {
        let mut registry = HashMap::new();
        for document_id in property.mandatory_documents.values().flatten() {
            if let Some(document) = self.documents.fetch(document_id)? {
                registry.insert(document_id.clone(), document);
            }
        }
        Ok(registry)
    }

    fn load(&self, id: &TransactionId) -> Result<BuyingTransaction, BuyingServiceError> {
        self.transactions
            .fetch(id)?
            .ok_or_else(|| BuyingServiceError::TransactionNotFound(id.clone()))
    }

    fn load_for(
        &self,
        id: &TransactionId,
        actor: &Actor,
    ) -> Result<BuyingTransaction, BuyingServiceError> {
        let transaction = self.load(id)?;
        if !transaction.can_user_edit_transaction(&actor.id, actor.role) {
            return Err(WorkflowRejection::NotAParty.into());
        }
        Ok(transaction)
    }

    /// Reserve a property for a buyer and open the transaction. The reservation agreement is
    /// generated by the platform and attached pre-validated, so the parties can sign at once.
    ///
    /// Only an active listing with a notary attached and every mandatory document validated
    /// can be reserved. The reserved listing is saved first: of two overlapping reservations
    /// the second fails that save with a revision conflict and writes nothing else.
    pub fn reserve_property(
        &self,
        request: ReservationRequest,
        actor: Actor,
    ) -> Result<BuyingTransaction, BuyingServiceError> {
        let mut property = self.load_property(&request.property_id)?;

        let allowed = match actor.role {
            ActorRole::Buyer => actor.id == request.buyer_id,
            ActorRole::Agent => actor.id == property.agent_id,
            ActorRole::Notary | ActorRole::System => true,
        };
        if !allowed {
            return Err(WorkflowRejection::NotAParty.into());
        }
        if property.notary_attached.is_none() {
            return Err(WorkflowRejection::NotaryNotAttached.into());
        }
        let registry = self.mandatory_registry(&property)?;
        if !property.is_fully_validated(|id| registry.get(id)) {
            return Err(WorkflowRejection::PropertyNotValidated.into());
        }

        property.reserve(request.buyer_id.clone())?;

        let ctx = self.context(actor);
        let transaction_id = TransactionId::new(self.ids.next_id("txn"));
        let mut transaction = BuyingTransaction::open(
            transaction_id,
            property.agent_id.clone(),
            request.buyer_id,
            property.id.clone(),
            request.final_price.or(Some(property.listing.price)),
            &ctx,
        );

        let doc_type = BuyingDocumentType::ReservationAgreement;
        let document_id = DocumentId::new(self.ids.next_id("doc"));
        let agreement = Document::generated(
            document_id.clone(),
            doc_type.config().name,
            format!("buying_documents/{}/{document_id}.pdf", transaction.id),
            UserId::system(),
            ctx.now,
        );
        transaction.upload_document(doc_type, &agreement, &ActionContext::system(ctx.now))?;

        let property = self.properties.save(property)?;
        let opened = self
            .documents
            .insert(agreement)
            .and_then(|_| self.transactions.insert(transaction));
        let stored = match opened {
            Ok(stored) => stored,
            Err(error) => {
                self.release_reservation(property);
                return Err(error.into());
            }
        };

        info!(
            transaction_id = %stored.id,
            property_id = %stored.property_id,
            buyer_id = %stored.buyer_id,
            "property reserved; buying transaction opened"
        );
        Ok(stored)
    }

    /// Undo a reservation whose transaction could not be stored.
    fn release_reservation(&self, mut property: Property) {
        property.release();
        if let Err(error) = self.properties.save(property) {
            warn!(error = %error, "reserved property could not be released after a failed reservation");
        }
    }

    /// Attach a newly stored file to a document slot. A replacement links back to the document
    /// it supersedes; the old one stays in the registry.
    pub fn upload_document(
        &self,
        transaction_id: &TransactionId,
        doc_type: BuyingDocumentType,
        upload: UploadRequest,
        actor: Actor,
    ) -> Result<BuyingTransaction, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let mut document = Document::uploaded(
            DocumentId::new(self.ids.next_id("doc")),
            upload.name,
            upload.storage_locator,
            ctx.actor.id.clone(),
            ctx.now,
        );
        if let Some(previous) = transaction.document_id(doc_type) {
            document = document.superseding(previous.clone());
        }

        transaction.upload_document(doc_type, &document, &ctx)?;
        let document_id = document.id.clone();
        self.documents.insert(document)?;
        let stored = self.transactions.save(transaction)?;

        info!(
            transaction_id = %stored.id,
            doc_type = %doc_type,
            document_id = %document_id,
            role = %ctx.actor.role,
            "document uploaded"
        );
        Ok(stored)
    }

    /// Record a validation decision, mirror it onto the document registry, and advance the
    /// phase when the decision completes it.
    pub fn validate_document(
        &self,
        transaction_id: &TransactionId,
        doc_type: BuyingDocumentType,
        decision: ValidationDecision,
        actor: Actor,
    ) -> Result<ValidationReport, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let outcome =
            transaction.validate_document(doc_type, decision.approve, &decision.notes, &ctx)?;
        let phase_advanced = transaction.check_and_advance_phase(&ctx);

        let document_id = transaction
            .document_id(doc_type)
            .cloned()
            .ok_or(WorkflowRejection::DocumentNotUploaded)?;
        let mut document = self
            .documents
            .fetch(&document_id)?
            .ok_or_else(|| BuyingServiceError::DocumentNotFound(document_id.clone()))?;

        let stored = self.transactions.save(transaction)?;

        if decision.approve {
            document.validate(ctx.actor.id.clone(), ctx.now);
        } else {
            document.revoke();
        }
        let registry_synced = match self.documents.save(document) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    transaction_id = %stored.id,
                    document_id = %document_id,
                    retryable = error.is_retryable(),
                    error = %error,
                    "validation stored on the transaction but not on the document registry"
                );
                false
            }
        };

        info!(
            transaction_id = %stored.id,
            doc_type = %doc_type,
            approved = decision.approve,
            phase = %stored.current_phase,
            phase_advanced,
            registry_synced,
            "document validation recorded"
        );
        Ok(ValidationReport {
            outcome,
            phase_advanced,
            registry_synced,
            transaction: stored,
        })
    }

    /// Copy the transaction's validation state for a slot onto the registry document. Used
    /// to repair a validation whose registry write failed.
    pub fn sync_document_registry(
        &self,
        transaction_id: &TransactionId,
        doc_type: BuyingDocumentType,
        actor: Actor,
    ) -> Result<Document, BuyingServiceError> {
        let transaction = self.load_for(transaction_id, &actor)?;
        let record = transaction
            .validation(doc_type)
            .ok_or(WorkflowRejection::DocumentNotUploaded)?;
        let mut document = self
            .documents
            .fetch(&record.document_id)?
            .ok_or_else(|| BuyingServiceError::DocumentNotFound(record.document_id.clone()))?;

        match (record.validated, &record.validated_by, record.validated_at) {
            (true, Some(validator), Some(at)) => document.validate(validator.clone(), at),
            _ => document.revoke(),
        }
        self.documents.save(document.clone())?;

        debug!(
            transaction_id = %transaction.id,
            doc_type = %doc_type,
            document_id = %document.id,
            "document registry synced"
        );
        Ok(document)
    }

    pub fn sign_document(
        &self,
        transaction_id: &TransactionId,
        doc_type: BuyingDocumentType,
        actor: Actor,
    ) -> Result<SigningReport, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let receipt = transaction.sign_document(doc_type, &ctx)?;
        let phase_advanced = transaction.check_and_advance_phase(&ctx);
        let stored = self.transactions.save(transaction)?;

        info!(
            transaction_id = %stored.id,
            doc_type = %doc_type,
            role = %ctx.actor.role,
            fully_signed = receipt.fully_signed,
            phase_advanced,
            "document signed"
        );
        Ok(SigningReport {
            receipt,
            phase_advanced,
            transaction: stored,
        })
    }

    /// Read-only signing eligibility. Parties outside the transaction are never eligible.
    pub fn can_sign(
        &self,
        transaction_id: &TransactionId,
        doc_type: BuyingDocumentType,
        actor: &Actor,
    ) -> Result<SignEligibility, BuyingServiceError> {
        let transaction = self.load(transaction_id)?;
        if !transaction.can_user_edit_transaction(&actor.id, actor.role) {
            return Ok(Err::<(), _>(WorkflowRejection::NotAParty).into());
        }
        Ok(transaction.can_user_sign_document(doc_type, actor).into())
    }

    /// Explicit advancement request. Saves only when the phase actually moved.
    pub fn advance_phase(
        &self,
        transaction_id: &TransactionId,
        actor: Actor,
    ) -> Result<PhaseAdvance, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        if !transaction.check_and_advance_phase(&ctx) {
            debug!(
                transaction_id = %transaction.id,
                phase = %transaction.current_phase,
                "phase requirements not met"
            );
            return Ok(PhaseAdvance {
                advanced: false,
                phase: transaction.current_phase,
                readiness: transaction.phase_readiness(),
            });
        }

        let stored = self.transactions.save(transaction)?;
        info!(transaction_id = %stored.id, phase = %stored.current_phase, "phase advanced");
        Ok(PhaseAdvance {
            advanced: true,
            phase: stored.current_phase,
            readiness: stored.phase_readiness(),
        })
    }

    pub fn schedule_meeting(
        &self,
        transaction_id: &TransactionId,
        request: MeetingRequest,
        actor: Actor,
    ) -> Result<Meeting, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let meeting_id = transaction.schedule_meeting(request, &ctx)?;
        let stored = self.transactions.save(transaction)?;
        let meeting = find_meeting(&stored, &meeting_id)?;

        info!(
            transaction_id = %stored.id,
            meeting_id = %meeting.id,
            scheduled_for = %meeting.scheduled_for,
            "meeting scheduled"
        );
        Ok(meeting)
    }

    pub fn complete_meeting(
        &self,
        transaction_id: &TransactionId,
        meeting_id: &MeetingId,
        notes: &str,
        actor: Actor,
    ) -> Result<Meeting, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        transaction.complete_meeting(meeting_id, notes, &ctx)?;
        let stored = self.transactions.save(transaction)?;
        info!(transaction_id = %stored.id, meeting_id = %meeting_id, "meeting completed");
        find_meeting(&stored, meeting_id)
    }

    pub fn cancel_meeting(
        &self,
        transaction_id: &TransactionId,
        meeting_id: &MeetingId,
        notes: &str,
        actor: Actor,
    ) -> Result<Meeting, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        transaction.cancel_meeting(meeting_id, notes, &ctx)?;
        let stored = self.transactions.save(transaction)?;
        info!(transaction_id = %stored.id, meeting_id = %meeting_id, "meeting cancelled");
        find_meeting(&stored, meeting_id)
    }

    /// Move the overall status. Cancelling releases the property back to the market and
    /// completing marks it sold.
    pub fn update_status(
        &self,
        transaction_id: &TransactionId,
        new_status: TransactionStatus,
        notes: &str,
        actor: Actor,
    ) -> Result<BuyingTransaction, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let previous = transaction.status;
        transaction.update_status(new_status, notes, &ctx)?;
        let stored = self.transactions.save(transaction)?;

        if new_status.is_terminal() {
            if let Some(mut property) = self.properties.fetch(&stored.property_id)? {
                match new_status {
                    TransactionStatus::Completed => property.mark_sold(),
                    _ => property.release(),
                }
                self.properties.save(property)?;
            }
        }

        info!(
            transaction_id = %stored.id,
            from = %previous,
            to = %stored.status,
            "transaction status updated"
        );
        Ok(stored)
    }

    pub fn add_note(
        &self,
        transaction_id: &TransactionId,
        text: &str,
        note_type: NoteType,
        actor: Actor,
    ) -> Result<TransactionNote, BuyingServiceError> {
        let mut transaction = self.load_for(transaction_id, &actor)?;
        let ctx = self.context(actor);

        let note_id = transaction.add_note(text, note_type, &ctx)?;
        let stored = self.transactions.save(transaction)?;
        stored
            .notes
            .into_iter()
            .find(|note| note.id == note_id)
            .ok_or_else(|| BuyingServiceError::TransactionNotFound(transaction_id.clone()))
    }

    pub fn progress(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<BuyingProgress, BuyingServiceError> {
        Ok(self.load(transaction_id)?.progress(self.clock.now()))
    }

    pub fn overview(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<PhaseOverview, BuyingServiceError> {
        Ok(self.load(transaction_id)?.phase_overview(self.clock.now()))
    }

    pub fn requirements(&self, phase: WorkflowPhase) -> PhaseRequirements {
        requirements_for_phase(phase)
    }

    /// Every phase in order with its documents and requirements.
    pub fn phases(&self) -> Vec<PhaseBlueprint> {
        WorkflowBlueprint::standard().phases().to_vec()
    }

    pub fn transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<BuyingTransaction, BuyingServiceError> {
        self.load(transaction_id)
    }

    pub fn transactions_for_user(
        &self,
        user_id: &UserId,
        role: ActorRole,
    ) -> Result<Vec<BuyingTransaction>, BuyingServiceError> {
        let all = self.transactions.list()?;
        Ok(transactions_for_user(user_id, role, &all)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn document(&self, document_id: &DocumentId) -> Result<Document, BuyingServiceError> {
        self.documents
            .fetch(document_id)?
            .ok_or_else(|| BuyingServiceError::DocumentNotFound(document_id.clone()))
    }
}

fn find_meeting(
    transaction: &BuyingTransaction,
    meeting_id: &MeetingId,
) -> Result<Meeting, BuyingServiceError> {
    transaction
        .meetings
        .iter()
        .find(|meeting| &meeting.id == meeting_id)
        .cloned()
        .ok_or_else(|| WorkflowRejection::MeetingNotFound(meeting_id.clone()).into())
}

/// Error raised by the buying service.
#[derive(Debug, thiserror::Error)]
pub enum BuyingServiceError {
    #[error(transparent)]
    Rejected(#[from] WorkflowRejection),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
}

impl BuyingServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TransactionNotFound(_) | Self::PropertyNotFound(_) | Self::DocumentNotFound(_)
        )
    }
}

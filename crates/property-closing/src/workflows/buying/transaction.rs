//! The buying transaction record and the state machine operating on it.
//!
//! Every operation here is synchronous and works on an in-memory record. Eligibility is
//! re-derived from the record on each call rather than cached, so a decision made when a page
//! was rendered can never authorize a stale action. Persisting the result is the caller's job.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::blueprint::{requirements_for_phase, BuyingDocumentType, WorkflowPhase};
use super::domain::{
    Meeting, MeetingId, MeetingRequest, MeetingStatus, NoteId, NoteType, Signature,
    TransactionId, TransactionNote, TransactionStatus, ValidationRecord,
};
use crate::workflows::context::{ActionContext, Actor, ActorRole, UserId};
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::PropertyId;
use crate::workflows::rejection::WorkflowRejection;

/// One buyer's attempt to purchase one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyingTransaction {
    pub id: TransactionId,
    pub agent_id: UserId,
    pub buyer_id: UserId,
    pub property_id: PropertyId,
    #[serde(default)]
    pub documents: BTreeMap<BuyingDocumentType, DocumentId>,
    #[serde(default)]
    pub validations: BTreeMap<BuyingDocumentType, ValidationRecord>,
    #[serde(default)]
    pub signatures: BTreeMap<BuyingDocumentType, Vec<Signature>>,
    pub current_phase: WorkflowPhase,
    pub status: TransactionStatus,
    #[serde(default)]
    pub meetings: Vec<Meeting>,
    #[serde(default)]
    pub notes: Vec<TransactionNote>,
    #[serde(default)]
    pub final_price: Option<u64>,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the repository on every successful save.
    #[serde(default)]
    pub revision: u64,
}

/// Result of a validation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub doc_type: BuyingDocumentType,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed_to: Option<TransactionStatus>,
}

/// Confirmation returned to a party that just signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureReceipt {
    pub doc_type: BuyingDocumentType,
    pub signature: Signature,
    pub fully_signed: bool,
    pub message: String,
}

/// Derived signing state of one document slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningStatus {
    pub doc_type: BuyingDocumentType,
    pub required_signers: Vec<ActorRole>,
    pub signed_by: Vec<ActorRole>,
    pub missing_signers: Vec<ActorRole>,
    pub fully_signed: bool,
}

/// What the current phase still lacks before it can advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReadiness {
    pub phase: WorkflowPhase,
    pub missing_documents: Vec<BuyingDocumentType>,
    pub unvalidated_documents: Vec<BuyingDocumentType>,
    pub unsigned_documents: Vec<SigningStatus>,
}

impl PhaseReadiness {
    pub fn is_ready(&self) -> bool {
        !self.phase.is_terminal()
            && self.missing_documents.is_empty()
            && self.unvalidated_documents.is_empty()
            && self.unsigned_documents.is_empty()
    }
}

impl BuyingTransaction {
    /// Open a transaction in the reservation phase. The opening is the first log entry.
    pub fn open(
        id: TransactionId,
        agent_id: UserId,
        buyer_id: UserId,
        property_id: PropertyId,
        final_price: Option<u64>,
        ctx: &ActionContext,
    ) -> Self {
        let mut transaction = Self {
            id,
            agent_id,
            buyer_id,
            property_id,
            documents: BTreeMap::new(),
            validations: BTreeMap::new(),
            signatures: BTreeMap::new(),
            current_phase: WorkflowPhase::Reservation,
            status: TransactionStatus::Pending,
            meetings: Vec::new(),
            notes: Vec::new(),
            final_price,
            transaction_date: None,
            created_at: ctx.now,
            updated_at: ctx.now,
            revision: 0,
        };

        let note = format!(
            "Buying transaction opened for property {}.",
            transaction.property_id
        );
        transaction.record_note(note, NoteType::System, ctx);
        transaction
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_open(&self) -> Result<(), WorkflowRejection> {
        if self.is_closed() {
            return Err(WorkflowRejection::TransactionClosed {
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn document_id(&self, doc_type: BuyingDocumentType) -> Option<&DocumentId> {
        self.documents.get(&doc_type)
    }

    pub fn validation(&self, doc_type: BuyingDocumentType) -> Option<&ValidationRecord> {
        self.validations.get(&doc_type)
    }

    pub fn is_uploaded(&self, doc_type: BuyingDocumentType) -> bool {
        self.documents.contains_key(&doc_type)
    }

    pub fn is_validated(&self, doc_type: BuyingDocumentType) -> bool {
        self.validations
            .get(&doc_type)
            .is_some_and(|record| record.validated)
    }

    pub fn signatures_for(&self, doc_type: BuyingDocumentType) -> &[Signature] {
        self.signatures
            .get(&doc_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the given identity is one of the parties allowed to act on this transaction.
    /// Notaries may act on any transaction; agents and buyers only on their own.
    pub fn can_user_edit_transaction(&self, user_id: &UserId, role: ActorRole) -> bool {
        match role {
            ActorRole::Notary | ActorRole::System => true,
            ActorRole::Agent => &self.agent_id == user_id,
            ActorRole::Buyer => &self.buyer_id == user_id,
        }
    }

    /// Attach a document to its slot, replacing any unsigned predecessor.
    ///
    /// The validation record is reset from the document itself: generated documents arrive
    /// validated, uploads arrive pending.
    pub fn upload_document(
        &mut self,
        doc_type: BuyingDocumentType,
        document: &Document,
        ctx: &ActionContext,
    ) -> Result<(), WorkflowRejection> {
        self.ensure_open()?;

        let config = doc_type.config();
        if !config.can_upload(ctx.actor.role) {
            return Err(WorkflowRejection::NotAuthorizedToUpload);
        }
        if !self.signatures_for(doc_type).is_empty() {
            return Err(WorkflowRejection::DocumentAlreadySigned);
        }

        let replaced = self.documents.insert(doc_type, document.id.clone());
        self.validations.insert(
            doc_type,
            ValidationRecord {
                document_id: document.id.clone(),
                uploaded_by: ctx.actor.id.clone(),
                uploaded_at: ctx.now,
                validated: document.is_validated(),
                validated_by: document.validated_by().cloned(),
                validated_at: document.validated_at(),
                notes: String::new(),
            },
        );

        let verb = if replaced.is_some() {
            "replaced"
        } else {
            "uploaded"
        };
        let mut note = format!("{} {verb} by {}.", config.name, ctx.actor.role);
        if document.is_validated() {
            note.push_str(" Generated document is pre-validated.");
        }
        self.record_note(note, NoteType::Document, ctx);
        Ok(())
    }

    /// Approve or reject the document held in a slot. The latest decision overwrites any
    /// earlier one; a rejection keeps the document in place so it can be replaced.
    pub fn validate_document(
        &mut self,
        doc_type: BuyingDocumentType,
        approve: bool,
        notes: &str,
        ctx: &ActionContext,
    ) -> Result<ValidationOutcome, WorkflowRejection> {
        self.ensure_open()?;

        let config = doc_type.config();
        if !config.can_validate(ctx.actor.role) {
            return Err(WorkflowRejection::NotAuthorizedToValidate);
        }
        let document_id = self
            .documents
            .get(&doc_type)
            .cloned()
            .ok_or(WorkflowRejection::DocumentNotUploaded)?;

        let previous = self.validations.remove(&doc_type);
        let (uploaded_by, uploaded_at) = match previous {
            Some(record) => (record.uploaded_by, record.uploaded_at),
            None => (ctx.actor.id.clone(), ctx.now),
        };
        self.validations.insert(
            doc_type,
            ValidationRecord {
                document_id,
                uploaded_by,
                uploaded_at,
                validated: approve,
                validated_by: Some(ctx.actor.id.clone()),
                validated_at: Some(ctx.now),
                notes: notes.trim().to_string(),
            },
        );

        let verdict = if approve { "approved" } else { "rejected" };
        let mut note = format!("Document {} {verdict}.", config.name);
        if !notes.trim().is_empty() {
            note.push(' ');
            note.push_str(notes.trim());
        }

        let mut status_changed_to = None;
        if approve && self.status == TransactionStatus::Pending {
            let from = self.status;
            self.status = TransactionStatus::DocumentsPending;
            status_changed_to = Some(self.status);
            note.push_str(&format!(
                " Status changed from {from} to {}.",
                TransactionStatus::DocumentsPending
            ));
        }

        self.record_note(note, NoteType::Validation, ctx);
        Ok(ValidationOutcome {
            doc_type,
            approved: approve,
            status_changed_to,
        })
    }

    /// Decide whether `actor` may sign `doc_type` right now. The first failing check wins:
    /// required signer, uploaded, validated, not yet signed by this role.
    pub fn can_user_sign_document(
        &self,
        doc_type: BuyingDocumentType,
        actor: &Actor,
    ) -> Result<(), WorkflowRejection> {
        if !doc_type.config().requires_signature_from(actor.role) {
            return Err(WorkflowRejection::NotRequiredSigner);
        }
        if !self.is_uploaded(doc_type) {
            return Err(WorkflowRejection::DocumentNotUploaded);
        }
        if !self.is_validated(doc_type) {
            return Err(WorkflowRejection::NotValidated);
        }
        if self
            .signatures_for(doc_type)
            .iter()
            .any(|signature| signature.signer_role == actor.role)
        {
            return Err(WorkflowRejection::AlreadySigned);
        }
        Ok(())
    }

    pub fn sign_document(
        &mut self,
        doc_type: BuyingDocumentType,
        ctx: &ActionContext,
    ) -> Result<SignatureReceipt, WorkflowRejection> {
        self.ensure_open()?;
        self.can_user_sign_document(doc_type, &ctx.actor)?;

        let signature = Signature {
            signer_id: ctx.actor.id.clone(),
            signer_role: ctx.actor.role,
            signed_at: ctx.now,
        };
        self.signatures
            .entry(doc_type)
            .or_default()
            .push(signature.clone());

        let name = doc_type.config().name;
        let fully_signed = self.is_document_fully_signed(doc_type);
        let mut note = format!("{name} signed by {}.", ctx.actor.role);
        if fully_signed {
            note.push_str(" All required signatures collected.");
        }
        self.record_note(note, NoteType::Signature, ctx);

        let message = if fully_signed {
            format!("{name} signed; all parties have now signed")
        } else {
            format!("{name} signed")
        };

        Ok(SignatureReceipt {
            doc_type,
            signature,
            fully_signed,
            message,
        })
    }

    /// Exact coverage: the set of signed roles equals the required signer set.
    pub fn is_document_fully_signed(&self, doc_type: BuyingDocumentType) -> bool {
        let required: BTreeSet<ActorRole> =
            doc_type.config().required_signers.iter().copied().collect();
        if required.is_empty() {
            return false;
        }
        let signed: BTreeSet<ActorRole> = self
            .signatures_for(doc_type)
            .iter()
            .map(|signature| signature.signer_role)
            .collect();
        signed == required
    }

    pub fn signing_status(&self, doc_type: BuyingDocumentType) -> SigningStatus {
        let required_signers = doc_type.config().required_signers.to_vec();
        let signed_by: Vec<ActorRole> = self
            .signatures_for(doc_type)
            .iter()
            .map(|signature| signature.signer_role)
            .collect();
        let missing_signers = required_signers
            .iter()
            .copied()
            .filter(|role| !signed_by.contains(role))
            .collect();

        SigningStatus {
            doc_type,
            fully_signed: self.is_document_fully_signed(doc_type),
            required_signers,
            signed_by,
            missing_signers,
        }
    }

    pub fn phase_readiness(&self) -> PhaseReadiness {
        let requirements = requirements_for_phase(self.current_phase);

        let missing_documents = requirements
            .required_documents
            .iter()
            .copied()
            .filter(|doc_type| !self.is_uploaded(*doc_type))
            .collect();
        let unvalidated_documents = requirements
            .required_documents
            .iter()
            .copied()
            .filter(|doc_type| self.is_uploaded(*doc_type) && !self.is_validated(*doc_type))
            .collect();
        let unsigned_documents = requirements
            .required_signatures
            .iter()
            .copied()
            .filter(|doc_type| !self.is_document_fully_signed(*doc_type))
            .map(|doc_type| self.signing_status(doc_type))
            .collect();

        PhaseReadiness {
            phase: self.current_phase,
            missing_documents,
            unvalidated_documents,
            unsigned_documents,
        }
    }

    /// Move to the next phase when the current one is satisfied. Safe to call at any time:
    /// returns `false` without touching the record when requirements are unmet, the phase is
    /// terminal, or the transaction is closed.
    pub fn check_and_advance_phase(&mut self, ctx: &ActionContext) -> bool {
        if self.is_closed() || !self.phase_readiness().is_ready() {
            return false;
        }
        let Some(next) = self.current_phase.next() else {
            return false;
        };

        let completed = self.current_phase;
        self.current_phase = next;
        let note = format!(
            "{} Phase advanced from {} to {}.",
            completed.completion_message(),
            completed.label(),
            next.label()
        );
        self.record_note(note, NoteType::Phase, ctx);
        true
    }

    /// Change the overall status along the allowed transition table.
    pub fn update_status(
        &mut self,
        new_status: TransactionStatus,
        notes: &str,
        ctx: &ActionContext,
    ) -> Result<(), WorkflowRejection> {
        self.ensure_open()?;
        if !self.status.can_transition_to(new_status) {
            tracing::warn!(
                transaction_id = %self.id,
                from = %self.status,
                to = %new_status,
                actor = %ctx.actor.id,
                "rejected invalid status transition"
            );
            return Err(WorkflowRejection::InvalidStatusTransition {
                from: self.status,
                to: new_status,
            });
        }

        let old_status = self.status;
        self.status = new_status;
        if new_status == TransactionStatus::Completed {
            self.transaction_date = Some(ctx.now);
        }

        let note = format!("Status changed from {old_status} to {new_status}. {}", notes.trim());
        self.record_note(note.trim_end().to_string(), NoteType::System, ctx);
        Ok(())
    }

    /// Free-text communication note from one of the parties.
    pub fn add_note(
        &mut self,
        text: &str,
        note_type: NoteType,
        ctx: &ActionContext,
    ) -> Result<NoteId, WorkflowRejection> {
        self.ensure_open()?;
        Ok(self.record_note(text.trim().to_string(), note_type, ctx))
    }

    pub fn schedule_meeting(
        &mut self,
        request: MeetingRequest,
        ctx: &ActionContext,
    ) -> Result<MeetingId, WorkflowRejection> {
        self.ensure_open()?;

        let id = MeetingId(format!("{}-mtg-{:03}", self.id, self.meetings.len() + 1));
        let note = format!(
            "Meeting scheduled: {} on {}",
            request.meeting_type.label(),
            request.scheduled_for.format("%Y-%m-%d %H:%M")
        );
        self.meetings.push(Meeting {
            id: id.clone(),
            meeting_type: request.meeting_type,
            scheduled_for: request.scheduled_for,
            participants: request.participants,
            location: request.location,
            agenda: request.agenda,
            status: MeetingStatus::Scheduled,
            created_by: ctx.actor.id.clone(),
            created_at: ctx.now,
            notes: String::new(),
        });
        self.record_note(note, NoteType::Meeting, ctx);
        Ok(id)
    }

    pub fn complete_meeting(
        &mut self,
        meeting_id: &MeetingId,
        notes: &str,
        ctx: &ActionContext,
    ) -> Result<(), WorkflowRejection> {
        self.close_meeting(meeting_id, MeetingStatus::Completed, notes, ctx)
    }

    pub fn cancel_meeting(
        &mut self,
        meeting_id: &MeetingId,
        notes: &str,
        ctx: &ActionContext,
    ) -> Result<(), WorkflowRejection> {
        self.close_meeting(meeting_id, MeetingStatus::Cancelled, notes, ctx)
    }

    fn close_meeting(
        &mut self,
        meeting_id: &MeetingId,
        status: MeetingStatus,
        notes: &str,
        ctx: &ActionContext,
    ) -> Result<(), WorkflowRejection> {
        self.ensure_open()?;

        let meeting = self
            .meetings
            .iter_mut()
            .find(|meeting| &meeting.id == meeting_id)
            .ok_or_else(|| WorkflowRejection::MeetingNotFound(meeting_id.clone()))?;
        if meeting.status != MeetingStatus::Scheduled {
            return Err(WorkflowRejection::MeetingNotScheduled(meeting_id.clone()));
        }

        meeting.status = status;
        if !notes.trim().is_empty() {
            meeting.notes = notes.trim().to_string();
        }
        let note = format!(
            "Meeting {}: {}",
            status.label().to_ascii_lowercase(),
            meeting.meeting_type.label()
        );
        self.record_note(note, NoteType::Meeting, ctx);
        Ok(())
    }

    /// Earliest scheduled meeting that has not started yet.
    pub fn next_meeting(&self, now: DateTime<Utc>) -> Option<&Meeting> {
        self.meetings
            .iter()
            .filter(|meeting| meeting.status == MeetingStatus::Scheduled)
            .filter(|meeting| meeting.scheduled_for > now)
            .min_by_key(|meeting| meeting.scheduled_for)
    }

    fn record_note(&mut self, note: String, note_type: NoteType, ctx: &ActionContext) -> NoteId {
        let id = NoteId(format!("{}-note-{:04}", self.id, self.notes.len() + 1));
        self.notes.push(TransactionNote {
            id: id.clone(),
            note,
            author_id: ctx.actor.id.clone(),
            note_type,
            at: ctx.now,
        });
        self.updated_at = ctx.now;
        id
    }
}

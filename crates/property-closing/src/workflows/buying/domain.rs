use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::context::{ActorRole, UserId};
use crate::workflows::documents::DocumentId;

/// Identifier wrapper for buying transactions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(pub String);

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub String);

/// Overall status of a buying transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    DocumentsPending,
    UnderReview,
    Approved,
    Completed,
    Cancelled,
    OnHold,
}

impl TransactionStatus {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Pending,
            Self::DocumentsPending,
            Self::UnderReview,
            Self::Approved,
            Self::Completed,
            Self::Cancelled,
            Self::OnHold,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::DocumentsPending => "documents_pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::OnHold => "on_hold",
        }
    }

    pub const fn display_label(self) -> &'static str {
        match self {
            Self::Pending => "Pending - Initial Interest",
            Self::DocumentsPending => "Documents Pending",
            Self::UnderReview => "Under Review",
            Self::Approved => "Approved - Ready to Close",
            Self::Completed => "Transaction Completed",
            Self::Cancelled => "Transaction Cancelled",
            Self::OnHold => "On Hold",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Allowed manual status changes. Terminal states have no exits and a status never
    /// transitions to itself.
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransactionStatus::*;

        match (self, next) {
            (Completed | Cancelled, _) => false,
            (from, to) if from == to => false,
            (_, Cancelled | OnHold) => true,
            (Pending, DocumentsPending | UnderReview) => true,
            (DocumentsPending, Pending | UnderReview) => true,
            (UnderReview, DocumentsPending | Approved) => true,
            (Approved, UnderReview | Completed) => true,
            (OnHold, Pending | DocumentsPending | UnderReview | Approved) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    PropertyViewing,
    ContractDiscussion,
    FinalSigning,
    InspectionMeeting,
    ClosingMeeting,
    GeneralDiscussion,
}

impl Default for MeetingType {
    fn default() -> Self {
        Self::GeneralDiscussion
    }
}

impl MeetingType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PropertyViewing => "Property Viewing",
            Self::ContractDiscussion => "Contract Discussion",
            Self::FinalSigning => "Final Contract Signing",
            Self::InspectionMeeting => "Property Inspection Meeting",
            Self::ClosingMeeting => "Transaction Closing Meeting",
            Self::GeneralDiscussion => "General Discussion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl MeetingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Rescheduled => "Rescheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    General,
    Document,
    Meeting,
    Urgent,
    System,
    Validation,
    Signature,
    Phase,
    InitialOffer,
}

impl Default for NoteType {
    fn default() -> Self {
        Self::General
    }
}

/// One signature on a document slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer_id: UserId,
    pub signer_role: ActorRole,
    pub signed_at: DateTime<Utc>,
}

/// Validation state of the document currently held in a slot. Overwritten, never appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub document_id: DocumentId,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    pub validated: bool,
    pub validated_by: Option<UserId>,
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub meeting_type: MeetingType,
    pub scheduled_for: DateTime<Utc>,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub agenda: String,
    pub status: MeetingStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// Caller supplied details for a new meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    #[serde(default)]
    pub meeting_type: MeetingType,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub agenda: String,
}

/// Entry in the transaction's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionNote {
    pub id: NoteId,
    pub note: String,
    pub author_id: UserId,
    pub note_type: NoteType,
    pub at: DateTime<Utc>,
}

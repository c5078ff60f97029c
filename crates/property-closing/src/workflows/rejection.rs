use super::buying::domain::{MeetingId, TransactionStatus};

/// Expected, user-facing reasons an action was refused. The `Display` text of each variant is
/// the short reason shown to the acting party and is part of the public contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowRejection {
    #[error("transaction is closed")]
    TransactionClosed { status: TransactionStatus },
    #[error("not a required signer")]
    NotRequiredSigner,
    #[error("document not uploaded")]
    DocumentNotUploaded,
    #[error("not validated")]
    NotValidated,
    #[error("already signed")]
    AlreadySigned,
    #[error("not authorized to upload")]
    NotAuthorizedToUpload,
    #[error("not authorized to validate")]
    NotAuthorizedToValidate,
    #[error("document already signed")]
    DocumentAlreadySigned,
    #[error("invalid status transition from {} to {}", from.label(), to.label())]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("meeting not found")]
    MeetingNotFound(MeetingId),
    #[error("meeting is not scheduled")]
    MeetingNotScheduled(MeetingId),
    #[error("property already reserved")]
    PropertyAlreadyReserved,
    #[error("property not available")]
    PropertyNotAvailable,
    #[error("no notary attached to property")]
    NotaryNotAttached,
    #[error("property documents not validated")]
    PropertyNotValidated,
    #[error("mandatory document missing")]
    MandatoryDocumentMissing,
    #[error("not a party to this transaction")]
    NotAParty,
}

impl WorkflowRejection {
    /// The short reason string, identical to `to_string()`.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

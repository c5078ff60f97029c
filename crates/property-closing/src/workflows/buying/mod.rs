//! Buying transaction workflow: phases, document validation, multi-party signing, status,
//! meetings, and the activity log, plus the service and HTTP surface on top of them.

pub mod blueprint;
pub mod domain;
pub mod listing;
pub mod progress;
pub mod repository;
pub mod router;
pub mod service;
pub mod transaction;

#[cfg(test)]
mod tests;

pub use blueprint::{
    requirements_for_phase, BuyingDocumentType, DocumentTypeConfig, PhaseBlueprint,
    PhaseRequirements, WorkflowBlueprint, WorkflowPhase,
};
pub use domain::{
    Meeting, MeetingId, MeetingRequest, MeetingStatus, MeetingType, NoteId, NoteType, Signature,
    TransactionId, TransactionNote, TransactionStatus, ValidationRecord,
};
pub use listing::PropertyReview;
pub use progress::{transactions_for_user, BuyingProgress, PhaseOverview};
pub use repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
pub use router::buying_router;
pub use service::{
    BuyingService, BuyingServiceError, PhaseAdvance, ReservationRequest, SignEligibility,
    SigningReport, UploadRequest, ValidationDecision, ValidationReport,
};
pub use transaction::{
    BuyingTransaction, PhaseReadiness, SignatureReceipt, SigningStatus, ValidationOutcome,
};

//! Static configuration of the buying workflow: the ordered phases and, for every document
//! type, who may upload, validate, and must sign it.
//!
//! Advancement logic in [`super::transaction`] only ever asks this module what a phase needs,
//! so new document types or phases are added here without touching the state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::context::ActorRole;

/// Ordered stages of a purchase. The phase pointer on a transaction only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Reservation,
    FinancialVerification,
    PreliminaryContract,
    FinalContract,
    Completion,
}

impl WorkflowPhase {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Reservation,
            Self::FinancialVerification,
            Self::PreliminaryContract,
            Self::FinalContract,
            Self::Completion,
        ]
    }

    pub const fn order(self) -> usize {
        match self {
            Self::Reservation => 0,
            Self::FinancialVerification => 1,
            Self::PreliminaryContract => 2,
            Self::FinalContract => 3,
            Self::Completion => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Reservation => "Reservation",
            Self::FinancialVerification => "Financial Verification",
            Self::PreliminaryContract => "Preliminary Contract",
            Self::FinalContract => "Final Contract",
            Self::Completion => "Completion",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Reservation => "reservation",
            Self::FinancialVerification => "financial_verification",
            Self::PreliminaryContract => "preliminary_contract",
            Self::FinalContract => "final_contract",
            Self::Completion => "completion",
        }
    }

    /// The following phase, `None` at the terminal phase.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Reservation => Some(Self::FinancialVerification),
            Self::FinancialVerification => Some(Self::PreliminaryContract),
            Self::PreliminaryContract => Some(Self::FinalContract),
            Self::FinalContract => Some(Self::Completion),
            Self::Completion => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Message recorded when this phase's requirements are met.
    pub const fn completion_message(self) -> &'static str {
        match self {
            Self::Reservation => {
                "Reservation confirmed. Buyer may now submit proof of funds for financial verification."
            }
            Self::FinancialVerification => {
                "Financial verification complete. Notary may prepare the preliminary contract."
            }
            Self::PreliminaryContract => {
                "Preliminary contract signed and deposit received. Final contract preparation may begin."
            }
            Self::FinalContract => {
                "Final purchase contract signed and paid. The property sale is complete."
            }
            Self::Completion => "Transaction completed.",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|phase| phase.key() == raw.trim())
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Closed set of document slots on a buying transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyingDocumentType {
    ReservationAgreement,
    ProofOfFunds,
    MortgagePreapproval,
    PreliminaryContract,
    DepositPaymentProof,
    InspectionReport,
    FinalPurchaseContract,
    FinalPaymentProof,
    TransferDeed,
}

impl BuyingDocumentType {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::ReservationAgreement,
            Self::ProofOfFunds,
            Self::MortgagePreapproval,
            Self::PreliminaryContract,
            Self::DepositPaymentProof,
            Self::InspectionReport,
            Self::FinalPurchaseContract,
            Self::FinalPaymentProof,
            Self::TransferDeed,
        ]
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::ReservationAgreement => "reservation_agreement",
            Self::ProofOfFunds => "proof_of_funds",
            Self::MortgagePreapproval => "mortgage_preapproval",
            Self::PreliminaryContract => "preliminary_contract",
            Self::DepositPaymentProof => "deposit_payment_proof",
            Self::InspectionReport => "inspection_report",
            Self::FinalPurchaseContract => "final_purchase_contract",
            Self::FinalPaymentProof => "final_payment_proof",
            Self::TransferDeed => "transfer_deed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|doc_type| doc_type.key() == raw.trim())
    }

    pub const fn config(self) -> DocumentTypeConfig {
        use ActorRole::{Agent, Buyer, Notary, System};

        match self {
            Self::ReservationAgreement => DocumentTypeConfig {
                name: "Reservation Agreement",
                phase: WorkflowPhase::Reservation,
                uploadable_by: &[Agent, Notary, System],
                validatable_by: &[Notary],
                required_signers: &[Buyer, Agent],
            },
            Self::ProofOfFunds => DocumentTypeConfig {
                name: "Proof of Funds",
                phase: WorkflowPhase::FinancialVerification,
                uploadable_by: &[Buyer],
                validatable_by: &[Notary],
                required_signers: &[Buyer],
            },
            Self::MortgagePreapproval => DocumentTypeConfig {
                name: "Mortgage Pre-approval Letter",
                phase: WorkflowPhase::FinancialVerification,
                uploadable_by: &[Buyer],
                validatable_by: &[Notary, Agent],
                required_signers: &[],
            },
            Self::PreliminaryContract => DocumentTypeConfig {
                name: "Preliminary Contract",
                phase: WorkflowPhase::PreliminaryContract,
                uploadable_by: &[Notary, System],
                validatable_by: &[Notary],
                required_signers: &[Buyer, Agent, Notary],
            },
            Self::DepositPaymentProof => DocumentTypeConfig {
                name: "Deposit Payment Proof",
                phase: WorkflowPhase::PreliminaryContract,
                uploadable_by: &[Buyer],
                validatable_by: &[Notary, Agent],
                required_signers: &[],
            },
            Self::InspectionReport => DocumentTypeConfig {
                name: "Property Inspection Report",
                phase: WorkflowPhase::PreliminaryContract,
                uploadable_by: &[Agent],
                validatable_by: &[Notary],
                required_signers: &[],
            },
            Self::FinalPurchaseContract => DocumentTypeConfig {
                name: "Final Purchase Contract",
                phase: WorkflowPhase::FinalContract,
                uploadable_by: &[Notary, System],
                validatable_by: &[Notary],
                required_signers: &[Buyer, Agent, Notary],
            },
            Self::FinalPaymentProof => DocumentTypeConfig {
                name: "Final Payment Proof",
                phase: WorkflowPhase::FinalContract,
                uploadable_by: &[Buyer],
                validatable_by: &[Notary],
                required_signers: &[],
            },
            Self::TransferDeed => DocumentTypeConfig {
                name: "Property Transfer Deed",
                phase: WorkflowPhase::FinalContract,
                uploadable_by: &[Notary],
                validatable_by: &[Notary],
                required_signers: &[Buyer, Notary],
            },
        }
    }
}

impl fmt::Display for BuyingDocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Roles allowed to upload, validate, and required to sign a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTypeConfig {
    pub name: &'static str,
    pub phase: WorkflowPhase,
    pub uploadable_by: &'static [ActorRole],
    pub validatable_by: &'static [ActorRole],
    pub required_signers: &'static [ActorRole],
}

impl DocumentTypeConfig {
    pub fn can_upload(&self, role: ActorRole) -> bool {
        self.uploadable_by.contains(&role)
    }

    pub fn can_validate(&self, role: ActorRole) -> bool {
        self.validatable_by.contains(&role)
    }

    pub fn requires_signature_from(&self, role: ActorRole) -> bool {
        self.required_signers.contains(&role)
    }

    pub fn requires_signatures(&self) -> bool {
        !self.required_signers.is_empty()
    }
}

/// Document types gating advancement out of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRequirements {
    pub phase: WorkflowPhase,
    pub required_documents: Vec<BuyingDocumentType>,
    pub required_signatures: Vec<BuyingDocumentType>,
}

/// Pure lookup of what a phase needs before the transaction may leave it.
pub fn requirements_for_phase(phase: WorkflowPhase) -> PhaseRequirements {
    use BuyingDocumentType::*;

    let (required_documents, required_signatures) = match phase {
        WorkflowPhase::Reservation => (vec![ReservationAgreement], vec![ReservationAgreement]),
        WorkflowPhase::FinancialVerification => (vec![ProofOfFunds], vec![ProofOfFunds]),
        WorkflowPhase::PreliminaryContract => (
            vec![PreliminaryContract, DepositPaymentProof],
            vec![PreliminaryContract],
        ),
        WorkflowPhase::FinalContract => (
            vec![FinalPurchaseContract, FinalPaymentProof],
            vec![FinalPurchaseContract],
        ),
        WorkflowPhase::Completion => (Vec::new(), Vec::new()),
    };

    PhaseRequirements {
        phase,
        required_documents,
        required_signatures,
    }
}

/// The standard buying workflow, grouping document types under the phase they belong to.
#[derive(Debug)]
pub struct WorkflowBlueprint {
    phases: Vec<PhaseBlueprint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseBlueprint {
    pub phase: WorkflowPhase,
    pub label: &'static str,
    pub order: usize,
    pub documents: Vec<BuyingDocumentType>,
    pub requirements: PhaseRequirements,
    pub completion_message: &'static str,
}

impl WorkflowBlueprint {
    pub fn standard() -> Self {
        let phases = WorkflowPhase::ordered()
            .into_iter()
            .map(|phase| PhaseBlueprint {
                phase,
                label: phase.label(),
                order: phase.order(),
                documents: BuyingDocumentType::ordered()
                    .into_iter()
                    .filter(|doc_type| doc_type.config().phase == phase)
                    .collect(),
                requirements: requirements_for_phase(phase),
                completion_message: phase.completion_message(),
            })
            .collect();

        Self { phases }
    }

    pub fn phases(&self) -> &[PhaseBlueprint] {
        &self.phases
    }

    pub fn documents_for_phase(&self, phase: WorkflowPhase) -> &[BuyingDocumentType] {
        self.phases
            .iter()
            .find(|blueprint| blueprint.phase == phase)
            .map(|blueprint| blueprint.documents.as_slice())
            .unwrap_or(&[])
    }
}

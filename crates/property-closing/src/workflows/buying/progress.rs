use chrono::{DateTime, Utc};
use serde::Serialize;

use super::blueprint::{requirements_for_phase, PhaseRequirements, WorkflowPhase};
use super::domain::{MeetingStatus, TransactionId, TransactionStatus};
use super::transaction::{BuyingTransaction, PhaseReadiness};
use crate::workflows::context::{ActorRole, UserId};

/// Aggregate view of how far a transaction has come.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyingProgress {
    pub transaction_id: TransactionId,
    pub total_documents: usize,
    pub validated_documents: usize,
    pub progress_percentage: f32,
    pub status: TransactionStatus,
    pub status_label: &'static str,
    pub phase: WorkflowPhase,
    pub phase_label: &'static str,
    pub phase_position: usize,
    pub phase_count: usize,
    pub scheduled_meetings: usize,
    pub active_meetings: usize,
    pub last_updated: DateTime<Utc>,
}

/// Everything a party needs to render the current phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOverview {
    pub requirements: PhaseRequirements,
    pub readiness: PhaseReadiness,
    pub progress: BuyingProgress,
}

impl BuyingTransaction {
    pub fn progress(&self, now: DateTime<Utc>) -> BuyingProgress {
        let total_documents = self.documents.len();
        let validated_documents = self
            .documents
            .keys()
            .filter(|doc_type| self.is_validated(**doc_type))
            .count();
        let progress_percentage = if total_documents == 0 {
            0.0
        } else {
            validated_documents as f32 / total_documents as f32 * 100.0
        };
        let active_meetings = self
            .meetings
            .iter()
            .filter(|meeting| meeting.status == MeetingStatus::Scheduled)
            .filter(|meeting| meeting.scheduled_for > now)
            .count();

        BuyingProgress {
            transaction_id: self.id.clone(),
            total_documents,
            validated_documents,
            progress_percentage,
            status: self.status,
            status_label: self.status.display_label(),
            phase: self.current_phase,
            phase_label: self.current_phase.label(),
            phase_position: self.current_phase.order() + 1,
            phase_count: WorkflowPhase::ordered().len(),
            scheduled_meetings: self.meetings.len(),
            active_meetings,
            last_updated: self.updated_at,
        }
    }

    pub fn phase_overview(&self, now: DateTime<Utc>) -> PhaseOverview {
        PhaseOverview {
            requirements: requirements_for_phase(self.current_phase),
            readiness: self.phase_readiness(),
            progress: self.progress(now),
        }
    }
}

/// Transactions relevant to a user: agents and buyers see their own, notaries see the ones
/// waiting on document review.
pub fn transactions_for_user<'a, I>(
    user_id: &UserId,
    role: ActorRole,
    transactions: I,
) -> Vec<&'a BuyingTransaction>
where
    I: IntoIterator<Item = &'a BuyingTransaction>,
{
    transactions
        .into_iter()
        .filter(|transaction| match role {
            ActorRole::Agent => &transaction.agent_id == user_id,
            ActorRole::Buyer => &transaction.buyer_id == user_id,
            ActorRole::Notary => matches!(
                transaction.status,
                TransactionStatus::DocumentsPending | TransactionStatus::UnderReview
            ),
            ActorRole::System => true,
        })
        .collect()
}

//! Property listings with their mandatory legal documents, additional document categories,
//! agent notes, and document history.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::UserId;
use super::documents::{Document, DocumentId};
use super::rejection::WorkflowRejection;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub String);

impl PropertyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Legal documents a listing must carry before a notary can sign off on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandatoryDocument {
    TitleDeed,
    LandRegistryExtract,
    BuildingPermit,
}

impl MandatoryDocument {
    pub const fn ordered() -> [Self; 3] {
        [
            Self::TitleDeed,
            Self::LandRegistryExtract,
            Self::BuildingPermit,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::TitleDeed => "Title Deed / Property Ownership Document",
            Self::LandRegistryExtract => "Land Registry Extract",
            Self::BuildingPermit => "Building Permit",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::TitleDeed => "title_deed",
            Self::LandRegistryExtract => "land_registry_extract",
            Self::BuildingPermit => "building_permit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered().into_iter().find(|slot| slot.key() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalCategory {
    SupplementaryDocuments,
    Corrections,
    Clarifications,
    AgentNotes,
    UpdatedPhotos,
    FloorPlans,
    Certificates,
    Correspondence,
    Other,
}

impl AdditionalCategory {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::SupplementaryDocuments,
            Self::Corrections,
            Self::Clarifications,
            Self::AgentNotes,
            Self::UpdatedPhotos,
            Self::FloorPlans,
            Self::Certificates,
            Self::Correspondence,
            Self::Other,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SupplementaryDocuments => "Supplementary Legal Documents",
            Self::Corrections => "Document Corrections/Updates",
            Self::Clarifications => "Clarification Documents",
            Self::AgentNotes => "Agent Notes & Explanations",
            Self::UpdatedPhotos => "Additional/Updated Photos",
            Self::FloorPlans => "Floor Plans & Blueprints",
            Self::Certificates => "Additional Certificates",
            Self::Correspondence => "Email Exchanges & Letters",
            Self::Other => "Other Documents",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::SupplementaryDocuments => "supplementary_documents",
            Self::Corrections => "corrections",
            Self::Clarifications => "clarifications",
            Self::AgentNotes => "agent_notes",
            Self::UpdatedPhotos => "updated_photos",
            Self::FloorPlans => "floor_plans",
            Self::Certificates => "certificates",
            Self::Correspondence => "correspondence",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered().into_iter().find(|category| category.key() == raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Active,
    Reserved,
    Sold,
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentNote {
    pub note: String,
    pub context: String,
    pub agent_id: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DocumentHistoryEntry {
    MandatoryDocumentAdded {
        slot: MandatoryDocument,
        document_id: DocumentId,
        added_by: UserId,
        at: DateTime<Utc>,
    },
    MandatoryDocumentReplaced {
        slot: MandatoryDocument,
        old_document_id: Option<DocumentId>,
        new_document_id: DocumentId,
        added_by: UserId,
        reason: String,
        at: DateTime<Utc>,
    },
    AdditionalDocumentAdded {
        category: AdditionalCategory,
        document_id: DocumentId,
        added_by: UserId,
        note: String,
        at: DateTime<Utc>,
    },
}

impl DocumentHistoryEntry {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::MandatoryDocumentAdded { at, .. }
            | Self::MandatoryDocumentReplaced { at, .. }
            | Self::AdditionalDocumentAdded { at, .. } => *at,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::MandatoryDocumentAdded { .. } => "Mandatory Document Added",
            Self::MandatoryDocumentReplaced { .. } => "Mandatory Document Replaced",
            Self::AdditionalDocumentAdded { .. } => "Additional Document Added",
        }
    }
}

/// Listing details supplied by the agent when creating a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub title: String,
    pub description: String,
    pub dimension: String,
    /// Asking price in euro cents.
    pub price: u64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub number_of_rooms: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub agent_id: UserId,
    pub listing: PropertyListing,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub reserved_by: Option<UserId>,
    #[serde(default)]
    pub attached_notaries: Vec<UserId>,
    #[serde(default)]
    pub notary_attached: Option<UserId>,
    pub status: PropertyStatus,
    pub mandatory_documents: BTreeMap<MandatoryDocument, Option<DocumentId>>,
    pub additional_documents: BTreeMap<AdditionalCategory, Vec<DocumentId>>,
    #[serde(default)]
    pub agent_notes: Vec<AgentNote>,
    #[serde(default)]
    pub document_history: Vec<DocumentHistoryEntry>,
    /// Bumped by the store on every save; a save carrying an older value is refused.
    #[serde(default)]
    pub revision: u64,
}

/// Entry in a property's merged activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyActivity {
    pub at: DateTime<Utc>,
    pub description: String,
}

impl Property {
    /// A new listing with every mandatory slot empty.
    pub fn new(
        id: PropertyId,
        agent_id: UserId,
        listing: PropertyListing,
        posted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            agent_id,
            listing,
            posted_at,
            validated_at: None,
            reserved: false,
            reserved_by: None,
            attached_notaries: Vec::new(),
            notary_attached: None,
            status: PropertyStatus::Active,
            mandatory_documents: MandatoryDocument::ordered()
                .into_iter()
                .map(|slot| (slot, None))
                .collect(),
            additional_documents: AdditionalCategory::ordered()
                .into_iter()
                .map(|category| (category, Vec::new()))
                .collect(),
            agent_notes: Vec::new(),
            document_history: Vec::new(),
            revision: 0,
        }
    }

    pub fn fill_mandatory_slot(
        &mut self,
        slot: MandatoryDocument,
        document_id: DocumentId,
        at: DateTime<Utc>,
    ) {
        self.mandatory_documents
            .insert(slot, Some(document_id.clone()));
        self.document_history
            .push(DocumentHistoryEntry::MandatoryDocumentAdded {
                slot,
                document_id,
                added_by: self.agent_id.clone(),
                at,
            });
    }

    /// Swap the document held in a mandatory slot. The old document stays in the registry;
    /// only the slot pointer moves.
    pub fn replace_mandatory_document(
        &mut self,
        slot: MandatoryDocument,
        new_document_id: DocumentId,
        reason: &str,
        at: DateTime<Utc>,
    ) {
        let old_document_id = self
            .mandatory_documents
            .insert(slot, Some(new_document_id.clone()))
            .flatten();
        self.validated_at = None;
        self.document_history
            .push(DocumentHistoryEntry::MandatoryDocumentReplaced {
                slot,
                old_document_id,
                new_document_id,
                added_by: self.agent_id.clone(),
                reason: reason.trim().to_string(),
                at,
            });

        if !reason.trim().is_empty() {
            let note = format!("Replaced {}: {}", slot.label(), reason.trim());
            self.add_agent_note(&note, "document_replacement", at);
        }
    }

    pub fn add_additional_document(
        &mut self,
        category: AdditionalCategory,
        document_id: DocumentId,
        note: &str,
        at: DateTime<Utc>,
    ) {
        self.additional_documents
            .entry(category)
            .or_default()
            .push(document_id.clone());
        self.document_history
            .push(DocumentHistoryEntry::AdditionalDocumentAdded {
                category,
                document_id,
                added_by: self.agent_id.clone(),
                note: note.trim().to_string(),
                at,
            });
    }

    pub fn add_agent_note(&mut self, note: &str, context: &str, at: DateTime<Utc>) {
        self.agent_notes.push(AgentNote {
            note: note.trim().to_string(),
            context: context.to_string(),
            agent_id: self.agent_id.clone(),
            at,
        });
    }

    pub fn attach_notary(&mut self, notary_id: UserId) {
        if !self.attached_notaries.contains(&notary_id) {
            self.attached_notaries.push(notary_id.clone());
        }
        self.notary_attached = Some(notary_id);
    }

    /// Only an active, unreserved listing can be reserved.
    pub fn reserve(&mut self, buyer_id: UserId) -> Result<(), WorkflowRejection> {
        if self.reserved {
            return Err(WorkflowRejection::PropertyAlreadyReserved);
        }
        if self.status != PropertyStatus::Active {
            return Err(WorkflowRejection::PropertyNotAvailable);
        }
        self.reserved = true;
        self.reserved_by = Some(buyer_id);
        self.status = PropertyStatus::Reserved;
        Ok(())
    }

    /// Return a reserved property to the market, e.g. after a cancelled purchase.
    pub fn release(&mut self) {
        self.reserved = false;
        self.reserved_by = None;
        if self.status == PropertyStatus::Reserved {
            self.status = PropertyStatus::Active;
        }
    }

    pub fn mark_sold(&mut self) {
        self.status = PropertyStatus::Sold;
    }

    /// Stamp the listing as validated the first time every mandatory slot checks out.
    pub fn refresh_validation<'a, F>(&mut self, lookup: F, at: DateTime<Utc>) -> bool
    where
        F: Fn(&DocumentId) -> Option<&'a Document>,
    {
        if self.is_fully_validated(lookup) {
            if self.validated_at.is_none() {
                self.validated_at = Some(at);
            }
            true
        } else {
            self.validated_at = None;
            false
        }
    }

    /// Fully validated iff every mandatory slot holds a validated document. `lookup` resolves
    /// document ids against the registry.
    pub fn is_fully_validated<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&DocumentId) -> Option<&'a Document>,
    {
        self.mandatory_documents.values().all(|slot| {
            slot.as_ref()
                .and_then(&lookup)
                .is_some_and(Document::is_validated)
        })
    }

    /// Validated mandatory slots out of the total number of slots.
    pub fn validation_progress<'a, F>(&self, lookup: F) -> (usize, usize)
    where
        F: Fn(&DocumentId) -> Option<&'a Document>,
    {
        let validated = self
            .mandatory_documents
            .values()
            .filter(|slot| {
                slot.as_ref()
                    .and_then(&lookup)
                    .is_some_and(Document::is_validated)
            })
            .count();
        (validated, self.mandatory_documents.len())
    }

    pub fn additional_document_counts(&self) -> BTreeMap<AdditionalCategory, usize> {
        self.additional_documents
            .iter()
            .map(|(category, documents)| (*category, documents.len()))
            .collect()
    }

    /// Document history and agent notes merged, most recent first.
    pub fn recent_activity(&self, limit: usize) -> Vec<PropertyActivity> {
        let mut activity: Vec<PropertyActivity> = self
            .document_history
            .iter()
            .map(|entry| PropertyActivity {
                at: entry.at(),
                description: entry.description().to_string(),
            })
            .chain(self.agent_notes.iter().map(|note| PropertyActivity {
                at: note.at,
                description: format!("Agent Note: {}", preview(&note.note, 50)),
            }))
            .collect();

        activity.sort_by(|a, b| b.at.cmp(&a.at));
        activity.truncate(limit);
        activity
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

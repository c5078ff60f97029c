//! Listing preparation ahead of a purchase: the agent files the mandatory legal documents and
//! extras, a notary attaches to the listing and validates the mandatory slots.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use super::repository::{DocumentRepository, PropertyRepository, TransactionRepository};
use super::service::{BuyingService, BuyingServiceError, UploadRequest, ValidationDecision};
use crate::workflows::context::{Actor, ActorRole};
use crate::workflows::documents::{Document, DocumentId};
use crate::workflows::property::{
    AdditionalCategory, MandatoryDocument, Property, PropertyActivity, PropertyId, PropertyStatus,
};
use crate::workflows::rejection::WorkflowRejection;

const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Listing as a buyer or notary sees it before reserving or signing off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyReview {
    pub property: Property,
    pub validated_documents: usize,
    pub total_documents: usize,
    pub fully_validated: bool,
    /// Active, unreserved, notary attached and fully validated.
    pub reservable: bool,
    pub additional_document_counts: BTreeMap<AdditionalCategory, usize>,
    pub recent_activity: Vec<PropertyActivity>,
}

fn ensure_listing_agent(property: &Property, actor: &Actor) -> Result<(), WorkflowRejection> {
    if actor.role == ActorRole::Agent && actor.id == property.agent_id {
        Ok(())
    } else {
        Err(WorkflowRejection::NotAParty)
    }
}

impl<T, D, P> BuyingService<T, D, P>
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    pub fn property_review(
        &self,
        property_id: &PropertyId,
    ) -> Result<PropertyReview, BuyingServiceError> {
        let property = self.load_property(property_id)?;
        self.review(property)
    }

    fn review(&self, property: Property) -> Result<PropertyReview, BuyingServiceError> {
        let registry = self.mandatory_registry(&property)?;
        let (validated_documents, total_documents) =
            property.validation_progress(|id| registry.get(id));
        let fully_validated = validated_documents == total_documents;
        let reservable = fully_validated
            && !property.reserved
            && property.status == PropertyStatus::Active
            && property.notary_attached.is_some();

        Ok(PropertyReview {
            validated_documents,
            total_documents,
            fully_validated,
            reservable,
            additional_document_counts: property.additional_document_counts(),
            recent_activity: property.recent_activity(RECENT_ACTIVITY_LIMIT),
            property,
        })
    }

    /// File a mandatory legal document. An occupied slot is replaced, with `reason` kept in
    /// the history and as an agent note; the new document needs validating again.
    pub fn upload_mandatory_document(
        &self,
        property_id: &PropertyId,
        slot: MandatoryDocument,
        upload: UploadRequest,
        reason: &str,
        actor: Actor,
    ) -> Result<Property, BuyingServiceError> {
        let mut property = self.load_property(property_id)?;
        ensure_listing_agent(&property, &actor)?;
        let now = self.clock.now();

        let mut document = Document::uploaded(
            DocumentId::new(self.ids.next_id("doc")),
            upload.name,
            upload.storage_locator,
            actor.id.clone(),
            now,
        );
        let previous = property.mandatory_documents.get(&slot).cloned().flatten();
        match previous {
            Some(previous) => {
                document = document.superseding(previous);
                property.replace_mandatory_document(slot, document.id.clone(), reason, now);
            }
            None => property.fill_mandatory_slot(slot, document.id.clone(), now),
        }

        let document_id = document.id.clone();
        self.documents.insert(document)?;
        let registry = self.mandatory_registry(&property)?;
        property.refresh_validation(|id| registry.get(id), now);
        let stored = self.properties.save(property)?;

        info!(
            property_id = %stored.id,
            slot = slot.key(),
            document_id = %document_id,
            "mandatory document filed"
        );
        Ok(stored)
    }

    pub fn add_additional_document(
        &self,
        property_id: &PropertyId,
        category: AdditionalCategory,
        upload: UploadRequest,
        note: &str,
        actor: Actor,
    ) -> Result<Property, BuyingServiceError> {
        let mut property = self.load_property(property_id)?;
        ensure_listing_agent(&property, &actor)?;
        let now = self.clock.now();

        let document = Document::uploaded(
            DocumentId::new(self.ids.next_id("doc")),
            upload.name,
            upload.storage_locator,
            actor.id.clone(),
            now,
        );
        property.add_additional_document(category, document.id.clone(), note, now);
        self.documents.insert(document)?;
        let stored = self.properties.save(property)?;

        debug!(property_id = %stored.id, category = category.key(), "additional document filed");
        Ok(stored)
    }

    pub fn add_agent_note(
        &self,
        property_id: &PropertyId,
        note: &str,
        context: &str,
        actor: Actor,
    ) -> Result<Property, BuyingServiceError> {
        let mut property = self.load_property(property_id)?;
        ensure_listing_agent(&property, &actor)?;

        property.add_agent_note(note, context, self.clock.now());
        Ok(self.properties.save(property)?)
    }

    /// A notary takes over the listing's legal review.
    pub fn attach_notary(
        &self,
        property_id: &PropertyId,
        actor: Actor,
    ) -> Result<Property, BuyingServiceError> {
        if actor.role != ActorRole::Notary {
            return Err(WorkflowRejection::NotAuthorizedToValidate.into());
        }
        let mut property = self.load_property(property_id)?;

        property.attach_notary(actor.id.clone());
        let stored = self.properties.save(property)?;

        info!(property_id = %stored.id, notary_id = %actor.id, "notary attached to property");
        Ok(stored)
    }

    /// The attached notary approves or rejects the document held in a mandatory slot.
    pub fn validate_property_document(
        &self,
        property_id: &PropertyId,
        slot: MandatoryDocument,
        decision: ValidationDecision,
        actor: Actor,
    ) -> Result<PropertyReview, BuyingServiceError> {
        if actor.role != ActorRole::Notary {
            return Err(WorkflowRejection::NotAuthorizedToValidate.into());
        }
        let mut property = self.load_property(property_id)?;
        match &property.notary_attached {
            None => return Err(WorkflowRejection::NotaryNotAttached.into()),
            Some(notary) if notary != &actor.id => return Err(WorkflowRejection::NotAParty.into()),
            Some(_) => {}
        }

        let document_id = property
            .mandatory_documents
            .get(&slot)
            .cloned()
            .flatten()
            .ok_or(WorkflowRejection::MandatoryDocumentMissing)?;
        let mut document = self
            .documents
            .fetch(&document_id)?
            .ok_or_else(|| BuyingServiceError::DocumentNotFound(document_id.clone()))?;

        let now = self.clock.now();
        if decision.approve {
            document.validate(actor.id.clone(), now);
        } else {
            document.revoke();
        }
        self.documents.save(document)?;

        let registry = self.mandatory_registry(&property)?;
        let fully_validated = property.refresh_validation(|id| registry.get(id), now);
        let stored = self.properties.save(property)?;

        info!(
            property_id = %stored.id,
            slot = slot.key(),
            approved = decision.approve,
            notes = %decision.notes,
            fully_validated,
            "property document reviewed"
        );
        self.review(stored)
    }
}

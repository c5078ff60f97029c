use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::UserId;

/// Identifier wrapper for uploaded or generated documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who validated a document and when. Present only on validated documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentValidation {
    pub validated_by: UserId,
    pub validated_at: DateTime<Utc>,
}

/// An uploaded (or system generated) artifact. Documents are never deleted; a replacement
/// points back at the record it supersedes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub storage_locator: String,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub validation: Option<DocumentValidation>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<DocumentId>,
}

fn visible_by_default() -> bool {
    true
}

impl Document {
    /// A freshly uploaded document awaiting validation.
    pub fn uploaded(
        id: DocumentId,
        name: impl Into<String>,
        storage_locator: impl Into<String>,
        uploaded_by: UserId,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            storage_locator: storage_locator.into(),
            uploaded_by,
            uploaded_at,
            validation: None,
            visible: true,
            supersedes: None,
        }
    }

    /// A document produced by the platform or by a notary, validated at creation.
    pub fn generated(
        id: DocumentId,
        name: impl Into<String>,
        storage_locator: impl Into<String>,
        generated_by: UserId,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut document = Self::uploaded(
            id,
            name,
            storage_locator,
            generated_by.clone(),
            generated_at,
        );
        document.validation = Some(DocumentValidation {
            validated_by: generated_by,
            validated_at: generated_at,
        });
        document
    }

    pub fn superseding(mut self, previous: DocumentId) -> Self {
        self.supersedes = Some(previous);
        self
    }

    pub fn is_validated(&self) -> bool {
        self.validation.is_some()
    }

    pub fn validated_by(&self) -> Option<&UserId> {
        self.validation.as_ref().map(|validation| &validation.validated_by)
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validation
            .as_ref()
            .map(|validation| validation.validated_at)
    }

    pub fn validate(&mut self, validator: UserId, at: DateTime<Utc>) {
        self.validation = Some(DocumentValidation {
            validated_by: validator,
            validated_at: at,
        });
    }

    /// Clears a previous approval, e.g. when a notary rejects the document.
    pub fn revoke(&mut self) {
        self.validation = None;
    }
}

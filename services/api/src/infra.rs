use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use property_closing::workflows::buying::{DocumentRepository, PropertyRepository, RepositoryError};
use property_closing::workflows::{
    Document, DocumentId, MandatoryDocument, Property, PropertyId, PropertyListing, UserId,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) const SAMPLE_PROPERTY: &str = "prop-sample-0001";
pub(crate) const SAMPLE_AGENT: &str = "agent-sample";
pub(crate) const SAMPLE_NOTARY: &str = "notary-sample";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Listing used by the demo and by `serve --seed-listing`: legal documents filed by the agent
/// and approved by the attached notary, so it can be reserved straight away.
pub(crate) fn sample_listing(now: DateTime<Utc>) -> (Property, Vec<Document>) {
    let posted_at = now - Duration::days(30);
    let mut property = Property::new(
        PropertyId::new(SAMPLE_PROPERTY),
        UserId::new(SAMPLE_AGENT),
        PropertyListing {
            title: "Two-bedroom flat with balcony".to_string(),
            description: "Third floor, lift, renovated kitchen, cellar included".to_string(),
            dimension: "68 m2".to_string(),
            price: 29_800_000,
            address: "8 quai des Tanneurs".to_string(),
            city: "Strasbourg".to_string(),
            postal_code: "67000".to_string(),
            country: "France".to_string(),
            number_of_rooms: Some(3),
        },
        posted_at,
    );

    let documents: Vec<Document> = MandatoryDocument::ordered()
        .into_iter()
        .map(|slot| {
            let mut document = Document::uploaded(
                DocumentId::new(format!("doc-sample-{}", slot.key())),
                format!("{}.pdf", slot.key()),
                format!("property_documents/{SAMPLE_PROPERTY}/{}.pdf", slot.key()),
                UserId::new(SAMPLE_AGENT),
                posted_at,
            );
            document.validate(UserId::new(SAMPLE_NOTARY), posted_at + Duration::days(7));
            property.fill_mandatory_slot(slot, document.id.clone(), posted_at);
            document
        })
        .collect();
    property.attach_notary(UserId::new(SAMPLE_NOTARY));
    property.validated_at = Some(posted_at + Duration::days(7));

    (property, documents)
}

/// Insert the sample listing unless it is already stored. Returns whether it was inserted.
pub(crate) fn seed_listing<S>(store: &S, now: DateTime<Utc>) -> Result<bool, RepositoryError>
where
    S: PropertyRepository + DocumentRepository + ?Sized,
{
    if PropertyRepository::fetch(store, &PropertyId::new(SAMPLE_PROPERTY))?.is_some() {
        return Ok(false);
    }
    let (property, documents) = sample_listing(now);
    for document in documents {
        match DocumentRepository::insert(store, document) {
            Ok(_) | Err(RepositoryError::AlreadyExists) => {}
            Err(error) => return Err(error),
        }
    }
    PropertyRepository::insert(store, property)?;
    Ok(true)
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (taken at 09:00 UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as RFC 3339 or YYYY-MM-DD ({err})"))?;
    date.and_hms_opt(9, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("'{raw}' has no valid 09:00 timestamp"))
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::blueprint::{BuyingDocumentType, WorkflowPhase};
use super::domain::{MeetingId, MeetingRequest, NoteType, TransactionId, TransactionStatus};
use super::repository::{
    DocumentRepository, PropertyRepository, RepositoryError, TransactionRepository,
};
use super::service::{
    BuyingService, BuyingServiceError, ReservationRequest, UploadRequest, ValidationDecision,
};
use crate::workflows::context::{Actor, ActorRole};
use crate::workflows::property::{AdditionalCategory, MandatoryDocument, PropertyId};

#[derive(Debug, Deserialize)]
pub(crate) struct ReserveBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub request: ReservationRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub upload: UploadRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub decision: ValidationDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorBody {
    pub actor: Actor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeetingBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub meeting: MeetingRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeetingUpdateBody {
    pub actor: Actor,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    pub actor: Actor,
    pub status: TransactionStatus,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NoteBody {
    pub actor: Actor,
    pub note: String,
    #[serde(default)]
    pub note_type: NoteType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MandatoryUploadBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub upload: UploadRequest,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdditionalUploadBody {
    pub actor: Actor,
    #[serde(flatten)]
    pub upload: UploadRequest,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PropertyNoteBody {
    pub actor: Actor,
    pub note: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorQuery {
    pub user_id: String,
    pub role: ActorRole,
}

impl ActorQuery {
    fn actor(self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

/// Router builder exposing the buying workflow over HTTP.
pub fn buying_router<T, D, P>(service: Arc<BuyingService<T, D, P>>) -> Router
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/buying/transactions",
            post(reserve_handler::<T, D, P>).get(list_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id",
            get(transaction_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/documents/:doc_type",
            post(upload_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/documents/:doc_type/validate",
            post(validate_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/documents/:doc_type/sign",
            post(sign_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/documents/:doc_type/eligibility",
            get(eligibility_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/advance",
            post(advance_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/meetings",
            post(schedule_meeting_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/meetings/:meeting_id/complete",
            post(complete_meeting_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/meetings/:meeting_id/cancel",
            post(cancel_meeting_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/status",
            post(status_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/notes",
            post(note_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/progress",
            get(progress_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/overview",
            get(overview_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/transactions/:transaction_id/documents/:doc_type/registry-sync",
            post(registry_sync_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id",
            get(property_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id/notary",
            post(attach_notary_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id/mandatory/:slot",
            post(mandatory_upload_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id/mandatory/:slot/validate",
            post(mandatory_validate_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id/additional/:category",
            post(additional_upload_handler::<T, D, P>),
        )
        .route(
            "/api/v1/buying/properties/:property_id/notes",
            post(property_note_handler::<T, D, P>),
        )
        .route("/api/v1/buying/phases", get(phases_handler::<T, D, P>))
        .route(
            "/api/v1/buying/phases/:phase/requirements",
            get(requirements_handler::<T, D, P>),
        )
        .with_state(service)
}

fn error_response(error: BuyingServiceError) -> Response {
    let status = match &error {
        BuyingServiceError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BuyingServiceError::TransactionNotFound(_)
        | BuyingServiceError::PropertyNotFound(_)
        | BuyingServiceError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        BuyingServiceError::Repository(RepositoryError::RevisionConflict { .. })
        | BuyingServiceError::Repository(RepositoryError::AlreadyExists) => StatusCode::CONFLICT,
        BuyingServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "buying request failed");
    }

    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn unknown_document_type(raw: &str) -> Response {
    unknown_key("document type", raw)
}

fn unknown_key(kind: &str, raw: &str) -> Response {
    let payload = json!({
        "error": format!("unknown {kind} '{raw}'"),
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

/// Request bodies speak for a person. The system role belongs to the platform's own actions.
fn external(actor: Actor) -> Option<Actor> {
    (actor.role != ActorRole::System).then_some(actor)
}

fn system_actor_refused() -> Response {
    let payload = json!({
        "error": "system role is reserved for the platform",
    });
    (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
}

fn respond<V: serde::Serialize>(
    status: StatusCode,
    result: Result<V, BuyingServiceError>,
) -> Response {
    match result {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reserve_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    axum::Json(body): axum::Json<ReserveBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::CREATED,
        service.reserve_property(body.request, actor),
    )
}

pub(crate) async fn list_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(query.actor()) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.transactions_for_user(&actor.id, actor.role),
    )
}

pub(crate) async fn transaction_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.transaction(&TransactionId::new(transaction_id)),
    )
}

pub(crate) async fn upload_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, doc_type)): Path<(String, String)>,
    axum::Json(body): axum::Json<UploadBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = BuyingDocumentType::parse(&doc_type) else {
        return unknown_document_type(&doc_type);
    };
    respond(
        StatusCode::CREATED,
        service.upload_document(
            &TransactionId::new(transaction_id),
            parsed,
            body.upload,
            actor,
        ),
    )
}

pub(crate) async fn validate_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, doc_type)): Path<(String, String)>,
    axum::Json(body): axum::Json<ValidateBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = BuyingDocumentType::parse(&doc_type) else {
        return unknown_document_type(&doc_type);
    };
    respond(
        StatusCode::OK,
        service.validate_document(
            &TransactionId::new(transaction_id),
            parsed,
            body.decision,
            actor,
        ),
    )
}

pub(crate) async fn sign_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, doc_type)): Path<(String, String)>,
    axum::Json(body): axum::Json<ActorBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = BuyingDocumentType::parse(&doc_type) else {
        return unknown_document_type(&doc_type);
    };
    respond(
        StatusCode::OK,
        service.sign_document(&TransactionId::new(transaction_id), parsed, actor),
    )
}

pub(crate) async fn eligibility_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, doc_type)): Path<(String, String)>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(query.actor()) else {
        return system_actor_refused();
    };
    let Some(parsed) = BuyingDocumentType::parse(&doc_type) else {
        return unknown_document_type(&doc_type);
    };
    respond(
        StatusCode::OK,
        service.can_sign(&TransactionId::new(transaction_id), parsed, &actor),
    )
}

pub(crate) async fn advance_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
    axum::Json(body): axum::Json<ActorBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.advance_phase(&TransactionId::new(transaction_id), actor),
    )
}

pub(crate) async fn schedule_meeting_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
    axum::Json(body): axum::Json<MeetingBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::CREATED,
        service.schedule_meeting(&TransactionId::new(transaction_id), body.meeting, actor),
    )
}

pub(crate) async fn complete_meeting_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, meeting_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<MeetingUpdateBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.complete_meeting(
            &TransactionId::new(transaction_id),
            &MeetingId(meeting_id),
            &body.notes,
            actor,
        ),
    )
}

pub(crate) async fn cancel_meeting_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, meeting_id)): Path<(String, String)>,
    axum::Json(body): axum::Json<MeetingUpdateBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.cancel_meeting(
            &TransactionId::new(transaction_id),
            &MeetingId(meeting_id),
            &body.notes,
            actor,
        ),
    )
}

pub(crate) async fn status_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
    axum::Json(body): axum::Json<StatusBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.update_status(
            &TransactionId::new(transaction_id),
            body.status,
            &body.notes,
            actor,
        ),
    )
}

pub(crate) async fn note_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
    axum::Json(body): axum::Json<NoteBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::CREATED,
        service.add_note(
            &TransactionId::new(transaction_id),
            &body.note,
            body.note_type,
            actor,
        ),
    )
}

pub(crate) async fn progress_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.progress(&TransactionId::new(transaction_id)),
    )
}

pub(crate) async fn overview_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(transaction_id): Path<String>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.overview(&TransactionId::new(transaction_id)),
    )
}

pub(crate) async fn phases_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    (StatusCode::OK, axum::Json(service.phases())).into_response()
}

pub(crate) async fn requirements_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(phase): Path<String>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    match WorkflowPhase::parse(&phase) {
        Some(parsed) => (StatusCode::OK, axum::Json(service.requirements(parsed))).into_response(),
        None => {
            let payload = json!({
                "error": format!("unknown phase '{phase}'"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn registry_sync_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((transaction_id, doc_type)): Path<(String, String)>,
    axum::Json(body): axum::Json<ActorBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = BuyingDocumentType::parse(&doc_type) else {
        return unknown_document_type(&doc_type);
    };
    respond(
        StatusCode::OK,
        service.sync_document_registry(&TransactionId::new(transaction_id), parsed, actor),
    )
}

pub(crate) async fn property_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(property_id): Path<String>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.property_review(&PropertyId::new(property_id)),
    )
}

pub(crate) async fn attach_notary_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(property_id): Path<String>,
    axum::Json(body): axum::Json<ActorBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::OK,
        service.attach_notary(&PropertyId::new(property_id), actor),
    )
}

pub(crate) async fn mandatory_upload_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((property_id, slot)): Path<(String, String)>,
    axum::Json(body): axum::Json<MandatoryUploadBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = MandatoryDocument::parse(&slot) else {
        return unknown_key("mandatory document", &slot);
    };
    respond(
        StatusCode::CREATED,
        service.upload_mandatory_document(
            &PropertyId::new(property_id),
            parsed,
            body.upload,
            &body.reason,
            actor,
        ),
    )
}

pub(crate) async fn mandatory_validate_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((property_id, slot)): Path<(String, String)>,
    axum::Json(body): axum::Json<ValidateBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = MandatoryDocument::parse(&slot) else {
        return unknown_key("mandatory document", &slot);
    };
    respond(
        StatusCode::OK,
        service.validate_property_document(
            &PropertyId::new(property_id),
            parsed,
            body.decision,
            actor,
        ),
    )
}

pub(crate) async fn additional_upload_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path((property_id, category)): Path<(String, String)>,
    axum::Json(body): axum::Json<AdditionalUploadBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    let Some(parsed) = AdditionalCategory::parse(&category) else {
        return unknown_key("document category", &category);
    };
    respond(
        StatusCode::CREATED,
        service.add_additional_document(
            &PropertyId::new(property_id),
            parsed,
            body.upload,
            &body.note,
            actor,
        ),
    )
}

pub(crate) async fn property_note_handler<T, D, P>(
    State(service): State<Arc<BuyingService<T, D, P>>>,
    Path(property_id): Path<String>,
    axum::Json(body): axum::Json<PropertyNoteBody>,
) -> Response
where
    T: TransactionRepository + 'static,
    D: DocumentRepository + 'static,
    P: PropertyRepository + 'static,
{
    let Some(actor) = external(body.actor) else {
        return system_actor_refused();
    };
    respond(
        StatusCode::CREATED,
        service.add_agent_note(&PropertyId::new(property_id), &body.note, &body.context, actor),
    )
}

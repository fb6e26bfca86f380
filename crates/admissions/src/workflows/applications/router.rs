use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::Field, ConnectInfo, DefaultBodyLimit, FromRef, Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::auth::{StaffDirectory, StaffIdentity};
use super::documents::DocumentStore;
use super::domain::{
    ApplicationForm, ApplicationId, IntakeRequest, ListParams, Provenance, ReviewUpdate,
    UploadedDocument,
};
use super::repository::ApplicationRepository;
use super::response::{failure, service_failure, success, validation_failure};
use super::service::{AdmissionsService, ApplicationServiceError};
use super::validation::{FieldViolation, ValidationError};

const SECTIONS: [&str; 3] = ["studentInfo", "contactInfo", "academicInfo"];

/// Shared handler state: the service plus the staff token directory.
pub struct AdmissionsState<R, D> {
    pub service: Arc<AdmissionsService<R, D>>,
    pub staff: Arc<StaffDirectory>,
}

impl<R, D> Clone for AdmissionsState<R, D> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            staff: Arc::clone(&self.staff),
        }
    }
}

impl<R, D> FromRef<AdmissionsState<R, D>> for Arc<StaffDirectory> {
    fn from_ref(state: &AdmissionsState<R, D>) -> Self {
        Arc::clone(&state.staff)
    }
}

/// Router builder exposing public intake and the staff review endpoints.
pub fn application_router<R, D>(
    service: Arc<AdmissionsService<R, D>>,
    staff: Arc<StaffDirectory>,
) -> Router
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let body_limit = service.upload_policy().request_body_limit();

    Router::new()
        .route(
            "/api/applications",
            post(submit_handler::<R, D>).get(list_handler::<R, D>),
        )
        .route(
            "/api/applications/stats/overview",
            get(stats_handler::<R, D>),
        )
        .route("/api/applications/:id", get(detail_handler::<R, D>))
        .route(
            "/api/applications/:id/status",
            patch(review_handler::<R, D>),
        )
        .route(
            "/api/applications/:id/documents/:kind",
            get(document_handler::<R, D>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AdmissionsState { service, staff })
}

/// Run blocking service work off the async executor. The task runs to completion even if the
/// client goes away, so a submission either commits or cleans up after itself.
async fn run_blocking<T, F>(work: F) -> Result<T, ApplicationServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApplicationServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApplicationServiceError::Worker(err.to_string()))?
}

pub(crate) async fn submit_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let IntakeParts {
        form,
        attachments,
        section_errors,
    } = match read_intake_form(multipart).await {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    if !section_errors.is_empty() {
        let field_errors = match state.service.check_intake(form, attachments) {
            Ok(()) => Vec::new(),
            Err(err) => err.violations,
        };
        return validation_failure(&merge_section_errors(section_errors, field_errors));
    }

    let request = IntakeRequest {
        form,
        attachments,
        provenance: provenance(&headers, peer.map(|ConnectInfo(addr)| addr)),
    };

    let service = Arc::clone(&state.service);
    match run_blocking(move || service.submit(request)).await {
        Ok(receipt) => success(
            StatusCode::CREATED,
            "Application submitted successfully",
            serde_json::json!({ "application": receipt }),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn list_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    _staff: StaffIdentity,
    Query(params): Query<ListParams>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let service = Arc::clone(&state.service);
    match run_blocking(move || service.list(params)).await {
        Ok(page) => success(StatusCode::OK, "Applications retrieved successfully", page),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn stats_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    _staff: StaffIdentity,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let service = Arc::clone(&state.service);
    let today = Utc::now().date_naive();
    match run_blocking(move || service.stats(today)).await {
        Ok(stats) => success(StatusCode::OK, "Statistics retrieved successfully", stats),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn detail_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    _staff: StaffIdentity,
    Path(id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let service = Arc::clone(&state.service);
    let id = ApplicationId(id);
    match run_blocking(move || service.get(&id)).await {
        Ok(record) => success(
            StatusCode::OK,
            "Application retrieved successfully",
            serde_json::json!({ "application": record }),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn review_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    staff: StaffIdentity,
    Path(id): Path<String>,
    body: Option<Json<ReviewUpdate>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let Some(Json(update)) = body else {
        return validation_failure(&ValidationError::single(
            "status",
            "Invalid application status",
        ));
    };

    let service = Arc::clone(&state.service);
    let id = ApplicationId(id);
    match run_blocking(move || service.review(&id, update, &staff)).await {
        Ok(record) => success(
            StatusCode::OK,
            "Application status updated successfully",
            serde_json::json!({ "application": record }),
        ),
        Err(err) => service_failure(err),
    }
}

pub(crate) async fn document_handler<R, D>(
    State(state): State<AdmissionsState<R, D>>,
    _staff: StaffIdentity,
    Path((id, kind)): Path<(String, String)>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let service = Arc::clone(&state.service);
    let id = ApplicationId(id);
    let download = match run_blocking(move || service.document(&id, &kind)).await {
        Ok(download) => download,
        Err(err) => return service_failure(err),
    };

    let file_name = download
        .document
        .original_name
        .clone()
        .unwrap_or_else(|| download.document.reference.clone());
    let content_type = HeaderValue::from_str(&download.document.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response()
}

/// Client address from the first `X-Forwarded-For` hop, else the socket peer.
fn provenance(headers: &HeaderMap, peer: Option<SocketAddr>) -> Provenance {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    Provenance {
        ip_address: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Form sections and files read from a multipart submission. Sections that could not be
/// decoded are left empty and reported in `section_errors`.
pub(crate) struct IntakeParts {
    pub(crate) form: ApplicationForm,
    pub(crate) attachments: Vec<UploadedDocument>,
    pub(crate) section_errors: Vec<FieldViolation>,
}

/// Split a multipart body into the three form sections and the uploaded files.
///
/// Sections arrive either as JSON objects (`studentInfo={...}`) or as flat scalar fields
/// (`studentInfo.firstName`, `studentInfo[firstName]`). Flat fields win over the JSON object
/// when both are sent.
pub(crate) async fn read_intake_form(mut multipart: Multipart) -> Result<IntakeParts, Response> {
    let mut sections: BTreeMap<&'static str, Map<String, Value>> = BTreeMap::new();
    let mut scalars: Vec<(&'static str, String, String)> = Vec::new();
    let mut attachments = Vec::new();
    let mut section_errors = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_failure(err.status(), &err.body_text())),
        };
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            if let Some(upload) = read_upload(name, field).await? {
                attachments.push(upload);
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|err| multipart_failure(err.status(), &err.body_text()))?;

        if let Some(section) = SECTIONS.iter().copied().find(|section| *section == name) {
            match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(object) => {
                    sections.entry(section).or_default().extend(object);
                }
                Err(_) => {
                    reject_section(&mut section_errors, section, "Section must be a JSON object")
                }
            }
        } else if let Some((section, key)) = split_scalar_name(&name) {
            scalars.push((section, key.to_string(), text));
        }
    }

    for (section, key, value) in scalars {
        sections
            .entry(section)
            .or_default()
            .insert(key, Value::String(value));
    }

    let form = ApplicationForm {
        student_info: decode_section(&mut sections, "studentInfo", &mut section_errors),
        contact_info: decode_section(&mut sections, "contactInfo", &mut section_errors),
        academic_info: decode_section(&mut sections, "academicInfo", &mut section_errors),
    };

    Ok(IntakeParts {
        form,
        attachments,
        section_errors,
    })
}

fn reject_section(errors: &mut Vec<FieldViolation>, section: &str, message: &str) {
    if !errors.iter().any(|violation| violation.field == section) {
        errors.push(FieldViolation {
            field: section.to_string(),
            message: message.to_string(),
        });
    }
}

/// Decode one section; a section already rejected stays empty.
fn decode_section<T: DeserializeOwned>(
    sections: &mut BTreeMap<&'static str, Map<String, Value>>,
    section: &'static str,
    errors: &mut Vec<FieldViolation>,
) -> Option<T> {
    let fields = sections.remove(section)?;
    if errors.iter().any(|violation| violation.field == section) {
        return None;
    }
    match serde_json::from_value(Value::Object(fields)) {
        Ok(decoded) => Some(decoded),
        Err(_) => {
            reject_section(errors, section, "Section fields must be text values");
            None
        }
    }
}

/// Section errors first, then field errors outside the rejected sections.
fn merge_section_errors(
    section_errors: Vec<FieldViolation>,
    field_errors: Vec<FieldViolation>,
) -> ValidationError {
    let rejected: Vec<String> = section_errors
        .iter()
        .map(|violation| format!("{}.", violation.field))
        .collect();
    let mut violations = section_errors;
    violations.extend(field_errors.into_iter().filter(|violation| {
        !rejected
            .iter()
            .any(|prefix| violation.field.starts_with(prefix.as_str()))
    }));
    ValidationError { violations }
}

async fn read_upload(
    name: String,
    field: Field<'_>,
) -> Result<Option<UploadedDocument>, Response> {
    let file_name = field
        .file_name()
        .map(str::to_string)
        .filter(|value| !value.is_empty());
    let content_type = field.content_type().map(str::to_string);
    let bytes = field
        .bytes()
        .await
        .map_err(|err| multipart_failure(err.status(), &err.body_text()))?;

    // Browsers send an empty part for file inputs left blank.
    if file_name.is_none() && bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(UploadedDocument {
        field_name: name,
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    }))
}

fn split_scalar_name(name: &str) -> Option<(&'static str, &str)> {
    let (section, rest) = name
        .split_once('.')
        .or_else(|| name.split_once('['))?;
    let key = rest.strip_suffix(']').unwrap_or(rest);
    let section = SECTIONS.iter().copied().find(|candidate| *candidate == section)?;
    (!key.is_empty()).then_some((section, key))
}

fn multipart_failure(status: StatusCode, detail: &str) -> Response {
    warn!(%status, detail, "rejected multipart body");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        failure(status, "Request body is too large")
    } else {
        failure(StatusCode::BAD_REQUEST, "Invalid multipart form data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names_accept_dot_and_bracket_forms() {
        assert_eq!(
            split_scalar_name("studentInfo.firstName"),
            Some(("studentInfo", "firstName"))
        );
        assert_eq!(
            split_scalar_name("contactInfo[parentEmail]"),
            Some(("contactInfo", "parentEmail"))
        );
        assert_eq!(split_scalar_name("otherInfo.firstName"), None);
        assert_eq!(split_scalar_name("studentInfo."), None);
        assert_eq!(split_scalar_name("photo"), None);
    }

    #[test]
    fn forwarded_address_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.4"));
        let peer: SocketAddr = "127.0.0.1:9000".parse().expect("addr");

        let forwarded = provenance(&headers, Some(peer));
        assert_eq!(forwarded.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(forwarded.user_agent.as_deref(), Some("curl/8.4"));

        let direct = provenance(&HeaderMap::new(), Some(peer));
        assert_eq!(direct.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(direct.user_agent, None);
        assert_eq!(provenance(&HeaderMap::new(), None), Provenance::default());
    }
}

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef, Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::domain::{MessageForm, MessageId, MessageListParams, MessageUpdate, ReplyForm};
use super::repository::MessageRepository;
use super::service::{MessageService, MessageServiceError};
use crate::workflows::applications::response::{failure, success, validation_failure};
use crate::workflows::applications::{
    RepositoryError, StaffDirectory, StaffIdentity, ValidationError,
};

const MAX_MESSAGE_BODY_BYTES: usize = 64 * 1024;

pub struct MessagesState<R> {
    pub service: Arc<MessageService<R>>,
    pub staff: Arc<StaffDirectory>,
}

impl<R> Clone for MessagesState<R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            staff: Arc::clone(&self.staff),
        }
    }
}

impl<R> FromRef<MessagesState<R>> for Arc<StaffDirectory> {
    fn from_ref(state: &MessagesState<R>) -> Self {
        Arc::clone(&state.staff)
    }
}

/// Public contact form plus the staff inbox endpoints.
pub fn message_router<R>(service: Arc<MessageService<R>>, staff: Arc<StaffDirectory>) -> Router
where
    R: MessageRepository + 'static,
{
    Router::new()
        .route(
            "/api/messages",
            post(create_handler::<R>).get(list_handler::<R>),
        )
        .route("/api/messages/stats/overview", get(stats_handler::<R>))
        .route("/api/messages/:id", get(detail_handler::<R>))
        .route("/api/messages/:id/status", patch(update_handler::<R>))
        .route("/api/messages/:id/reply", post(reply_handler::<R>))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BODY_BYTES))
        .with_state(MessagesState { service, staff })
}

async fn run_blocking<T, F>(work: F) -> Result<T, MessageServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MessageServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| MessageServiceError::Worker(err.to_string()))?
}

fn message_failure(err: MessageServiceError) -> Response {
    match err {
        MessageServiceError::Validation(violations) => validation_failure(&violations),
        MessageServiceError::MessageNotFound(_)
        | MessageServiceError::Repository(RepositoryError::NotFound) => {
            failure(StatusCode::NOT_FOUND, "Message not found")
        }
        other => {
            error!(error = %other, "message request failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error while processing the message",
            )
        }
    }
}

fn missing_body(field: &str, message: &str) -> Response {
    validation_failure(&ValidationError::single(field, message))
}

pub(crate) async fn create_handler<R>(
    State(state): State<MessagesState<R>>,
    body: Option<Json<MessageForm>>,
) -> Response
where
    R: MessageRepository + 'static,
{
    let Some(Json(form)) = body else {
        return missing_body("form", "Please fill all required fields");
    };

    let service = Arc::clone(&state.service);
    match run_blocking(move || service.create(form)).await {
        Ok(record) => success(
            StatusCode::CREATED,
            "Message sent successfully",
            json!({ "message": record }),
        ),
        Err(err) => message_failure(err),
    }
}

pub(crate) async fn list_handler<R>(
    State(state): State<MessagesState<R>>,
    _staff: StaffIdentity,
    Query(params): Query<MessageListParams>,
) -> Response
where
    R: MessageRepository + 'static,
{
    let service = Arc::clone(&state.service);
    match run_blocking(move || service.list(params)).await {
        Ok(page) => success(StatusCode::OK, "Messages retrieved successfully", page),
        Err(err) => message_failure(err),
    }
}

pub(crate) async fn stats_handler<R>(
    State(state): State<MessagesState<R>>,
    _staff: StaffIdentity,
) -> Response
where
    R: MessageRepository + 'static,
{
    let service = Arc::clone(&state.service);
    match run_blocking(move || service.stats()).await {
        Ok(stats) => success(StatusCode::OK, "Statistics retrieved successfully", stats),
        Err(err) => message_failure(err),
    }
}

pub(crate) async fn detail_handler<R>(
    State(state): State<MessagesState<R>>,
    staff: StaffIdentity,
    Path(id): Path<String>,
) -> Response
where
    R: MessageRepository + 'static,
{
    let service = Arc::clone(&state.service);
    let id = MessageId(id);
    match run_blocking(move || service.open(&id, &staff)).await {
        Ok(record) => success(
            StatusCode::OK,
            "Message retrieved successfully",
            json!({ "message": record }),
        ),
        Err(err) => message_failure(err),
    }
}

pub(crate) async fn update_handler<R>(
    State(state): State<MessagesState<R>>,
    staff: StaffIdentity,
    Path(id): Path<String>,
    body: Option<Json<MessageUpdate>>,
) -> Response
where
    R: MessageRepository + 'static,
{
    let Some(Json(update)) = body else {
        return missing_body("status", "Status, priority, or admin notes are required");
    };

    let service = Arc::clone(&state.service);
    let id = MessageId(id);
    match run_blocking(move || service.update(&id, update, &staff)).await {
        Ok(record) => success(
            StatusCode::OK,
            "Message updated successfully",
            json!({ "message": record }),
        ),
        Err(err) => message_failure(err),
    }
}

pub(crate) async fn reply_handler<R>(
    State(state): State<MessagesState<R>>,
    staff: StaffIdentity,
    Path(id): Path<String>,
    body: Option<Json<ReplyForm>>,
) -> Response
where
    R: MessageRepository + 'static,
{
    let Some(Json(reply)) = body else {
        return missing_body("replyMessage", "Reply message is required");
    };

    let service = Arc::clone(&state.service);
    let id = MessageId(id);
    match run_blocking(move || service.reply(&id, reply, &staff)).await {
        Ok(record) => success(
            StatusCode::OK,
            "Reply sent successfully",
            json!({ "message": record }),
        ),
        Err(err) => message_failure(err),
    }
}

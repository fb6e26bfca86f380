use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::applications::{StaffDirectory, StaffIdentity};
use crate::workflows::messages::{
    message_router, InMemoryMessageRepository, MessageForm, MessageService,
};

pub(super) const STAFF_TOKEN: &str = "front-office-token";
pub(super) const STAFF_ID: &str = "front-office";

pub(super) fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 2, 8, 15, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn staff() -> StaffIdentity {
    StaffIdentity::new(STAFF_ID)
}

pub(super) fn message_form(name: &str, inquiry_type: &str) -> MessageForm {
    MessageForm {
        name: Some(name.to_string()),
        email: Some(format!("{}@Example.org", name.to_lowercase().replace(' ', "."))),
        phone: None,
        subject: Some("Admissions question".to_string()),
        message: Some("Is there still space in the primary section for September?".to_string()),
        student_grade: Some("primary".to_string()),
        inquiry_type: Some(inquiry_type.to_string()),
    }
}

pub(super) fn build_service() -> (
    MessageService<InMemoryMessageRepository>,
    Arc<InMemoryMessageRepository>,
) {
    let repository = Arc::new(InMemoryMessageRepository::default());
    (MessageService::new(Arc::clone(&repository)), repository)
}

pub(super) fn router_for(service: MessageService<InMemoryMessageRepository>) -> axum::Router {
    let staff = StaffDirectory::new().with_token(STAFF_ID, STAFF_TOKEN);
    message_router(Arc::new(service), Arc::new(staff))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

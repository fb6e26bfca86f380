use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{
    MessageForm, MessageId, MessageListParams, MessageStatus, MessageUpdate, ReplyForm,
};
use super::repository::{MessagePage, MessageRecord, MessageRepository, MessageStats};
use super::validation::MessageValidator;
use crate::workflows::applications::{RepositoryError, StaffIdentity, ValidationError};

/// Contact-message inbox: public intake plus staff triage.
pub struct MessageService<R> {
    validator: MessageValidator,
    repository: Arc<R>,
}

impl<R> MessageService<R>
where
    R: MessageRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            validator: MessageValidator,
            repository,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn create(&self, form: MessageForm) -> Result<MessageRecord, MessageServiceError> {
        self.create_at(form, Utc::now())
    }

    pub fn create_at(
        &self,
        form: MessageForm,
        at: DateTime<Utc>,
    ) -> Result<MessageRecord, MessageServiceError> {
        let message = self.validator.validate(form)?;
        let record = self.repository.insert(MessageRecord {
            id: MessageId::generate(),
            name: message.name,
            email: message.email,
            phone: message.phone,
            subject: message.subject,
            message: message.message,
            student_grade: message.student_grade,
            inquiry_type: message.inquiry_type,
            status: MessageStatus::New,
            priority: Default::default(),
            admin_notes: String::new(),
            reply_message: None,
            replied_at: None,
            created_at: at,
            updated_at: at,
        })?;

        info!(
            message_id = %record.id,
            inquiry_type = record.inquiry_type.label(),
            "contact message received"
        );
        Ok(record)
    }

    pub fn list(&self, params: MessageListParams) -> Result<MessagePage, MessageServiceError> {
        let query = self.validator.list_query(params)?;
        Ok(self.repository.list(&query)?)
    }

    pub fn stats(&self) -> Result<MessageStats, MessageServiceError> {
        Ok(self.repository.stats()?)
    }

    /// Load a message for staff; a `new` message is marked `read` in the same write.
    pub fn open(
        &self,
        id: &MessageId,
        reader: &StaffIdentity,
    ) -> Result<MessageRecord, MessageServiceError> {
        self.open_at(id, reader, Utc::now())
    }

    pub fn open_at(
        &self,
        id: &MessageId,
        reader: &StaffIdentity,
        at: DateTime<Utc>,
    ) -> Result<MessageRecord, MessageServiceError> {
        let mut marked = false;
        let record = self
            .repository
            .modify(id, |record| marked = record.mark_read(at))
            .map_err(|err| not_found(err, id))?;
        if marked {
            info!(message_id = %id, reader = reader.staff_id(), "message marked read");
        }
        Ok(record)
    }

    pub fn update(
        &self,
        id: &MessageId,
        update: MessageUpdate,
        staff: &StaffIdentity,
    ) -> Result<MessageRecord, MessageServiceError> {
        self.update_at(id, update, staff, Utc::now())
    }

    pub fn update_at(
        &self,
        id: &MessageId,
        update: MessageUpdate,
        staff: &StaffIdentity,
        at: DateTime<Utc>,
    ) -> Result<MessageRecord, MessageServiceError> {
        let update = self.validator.update(update)?;
        let record = self
            .repository
            .modify(id, |record| {
                record.apply_update(update.status, update.priority, update.admin_notes, at)
            })
            .map_err(|err| not_found(err, id))?;

        info!(
            message_id = %record.id,
            status = record.status.label(),
            priority = record.priority.label(),
            staff = staff.staff_id(),
            "message updated"
        );
        Ok(record)
    }

    /// Record a staff reply. Delivery to the sender happens outside this service.
    pub fn reply(
        &self,
        id: &MessageId,
        reply: ReplyForm,
        staff: &StaffIdentity,
    ) -> Result<MessageRecord, MessageServiceError> {
        self.reply_at(id, reply, staff, Utc::now())
    }

    pub fn reply_at(
        &self,
        id: &MessageId,
        reply: ReplyForm,
        staff: &StaffIdentity,
        at: DateTime<Utc>,
    ) -> Result<MessageRecord, MessageServiceError> {
        let reply = self.validator.reply(reply)?;
        let record = self
            .repository
            .modify(id, |record| record.apply_reply(reply, at))
            .map_err(|err| not_found(err, id))?;

        info!(message_id = %record.id, staff = staff.staff_id(), "message replied");
        Ok(record)
    }
}

fn not_found(err: RepositoryError, id: &MessageId) -> MessageServiceError {
    match err {
        RepositoryError::NotFound => MessageServiceError::MessageNotFound(id.clone()),
        other => other.into(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("message {0} not found")]
    MessageNotFound(MessageId),
    #[error("background task failed: {0}")]
    Worker(String),
}

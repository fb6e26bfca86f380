use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{InquiryType, MessageId, MessagePriority, MessageStatus, StudentStage};
use crate::workflows::applications::{RepositoryError, SortOrder};

/// Stored contact message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub student_grade: StudentStage,
    pub inquiry_type: InquiryType,
    pub status: MessageStatus,
    pub priority: MessagePriority,
    #[serde(default)]
    pub admin_notes: String,
    #[serde(default)]
    pub reply_message: Option<String>,
    #[serde(default)]
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// First staff read of a new message. Returns whether anything changed.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != MessageStatus::New {
            return false;
        }
        self.status = MessageStatus::Read;
        self.updated_at = at;
        true
    }

    /// Apply a triage update. `replied_at` is stamped when the status first moves to `replied`.
    pub fn apply_update(
        &mut self,
        status: Option<MessageStatus>,
        priority: Option<MessagePriority>,
        admin_notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        if let Some(status) = status {
            if status == MessageStatus::Replied && self.status != MessageStatus::Replied {
                self.replied_at = Some(at);
            }
            self.status = status;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(admin_notes) = admin_notes {
            self.admin_notes = admin_notes;
        }
        self.updated_at = at;
    }

    pub fn apply_reply(&mut self, reply: String, at: DateTime<Utc>) {
        self.reply_message = Some(reply);
        self.status = MessageStatus::Replied;
        self.replied_at = Some(at);
        self.updated_at = at;
    }
}

/// Storage abstraction for contact messages, mirroring the application store.
pub trait MessageRepository: Send + Sync {
    fn insert(&self, record: MessageRecord) -> Result<MessageRecord, RepositoryError>;
    /// Apply `change` to the stored message and persist it as one step. Changing the id is
    /// rejected with [`RepositoryError::Conflict`].
    fn modify<F>(&self, id: &MessageId, change: F) -> Result<MessageRecord, RepositoryError>
    where
        F: FnOnce(&mut MessageRecord);
    fn fetch(&self, id: &MessageId) -> Result<Option<MessageRecord>, RepositoryError>;
    fn list(&self, query: &MessageQuery) -> Result<MessagePage, RepositoryError>;
    fn stats(&self) -> Result<MessageStats, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl MessageSortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

/// Validated staff list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub status: Option<MessageStatus>,
    pub inquiry_type: Option<InquiryType>,
    pub priority: Option<MessagePriority>,
    pub search: Option<String>,
    pub sort_by: MessageSortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            status: None,
            inquiry_type: None,
            priority: None,
            search: None,
            sort_by: MessageSortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: 10,
        }
    }
}

impl MessageQuery {
    pub fn matches(&self, record: &MessageRecord) -> bool {
        if self.status.is_some_and(|status| status != record.status) {
            return false;
        }
        if self
            .inquiry_type
            .is_some_and(|kind| kind != record.inquiry_type)
        {
            return false;
        }
        if self
            .priority
            .is_some_and(|priority| priority != record.priority)
        {
            return false;
        }

        match self.search.as_deref() {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    record.name.as_str(),
                    record.email.as_str(),
                    record.subject.as_str(),
                    record.message.as_str(),
                ]
                .iter()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
            }
        }
    }

    fn compare(&self, left: &MessageRecord, right: &MessageRecord) -> Ordering {
        let ordering = match self.sort_by {
            MessageSortField::CreatedAt => left.created_at.cmp(&right.created_at),
            MessageSortField::UpdatedAt => left.updated_at.cmp(&right.updated_at),
        }
        .then_with(|| left.id.cmp(&right.id));
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Filter, sort, and cut one page out of `records`.
    pub fn paginate(&self, records: impl IntoIterator<Item = MessageRecord>) -> MessagePage {
        let mut matching: Vec<MessageRecord> =
            records.into_iter().filter(|record| self.matches(record)).collect();
        matching.sort_by(|left, right| self.compare(left, right));

        let total = matching.len() as u64;
        let limit = u64::from(self.limit.max(1));
        let page = u64::from(self.page.max(1));
        let skip = ((page - 1) * limit) as usize;

        let messages = matching
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect();

        MessagePage {
            messages,
            pagination: MessagePagination {
                current_page: page as u32,
                total_pages: total.div_ceil(limit) as u32,
                total_messages: total,
                has_next: page * limit < total,
                has_prev: page > 1,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageRecord>,
    pub pagination: MessagePagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_messages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryTypeCount {
    pub inquiry_type: InquiryType,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityCount {
    pub priority: MessagePriority,
    pub count: u64,
}

/// Dashboard counts for the message inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total: u64,
    pub new: u64,
    pub read: u64,
    pub replied: u64,
    pub archived: u64,
    pub by_type: Vec<InquiryTypeCount>,
    pub by_priority: Vec<PriorityCount>,
}

impl MessageStats {
    pub fn from_counts(
        by_status: &HashMap<MessageStatus, u64>,
        by_type: BTreeMap<InquiryType, u64>,
        by_priority: BTreeMap<MessagePriority, u64>,
    ) -> Self {
        let status = |status: MessageStatus| by_status.get(&status).copied().unwrap_or(0);
        Self {
            total: by_status.values().sum(),
            new: status(MessageStatus::New),
            read: status(MessageStatus::Read),
            replied: status(MessageStatus::Replied),
            archived: status(MessageStatus::Archived),
            by_type: by_type
                .into_iter()
                .map(|(inquiry_type, count)| InquiryTypeCount {
                    inquiry_type,
                    count,
                })
                .collect(),
            by_priority: by_priority
                .into_iter()
                .map(|(priority, count)| PriorityCount { priority, count })
                .collect(),
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MessageRecord>) -> Self {
        let mut by_status = HashMap::new();
        let mut by_type = BTreeMap::new();
        let mut by_priority = BTreeMap::new();
        for record in records {
            *by_status.entry(record.status).or_insert(0) += 1;
            *by_type.entry(record.inquiry_type).or_insert(0) += 1;
            *by_priority.entry(record.priority).or_insert(0) += 1;
        }
        Self::from_counts(&by_status, by_type, by_priority)
    }
}

//! Contact messages sent from the public site, triaged and answered by staff.
//!
//! Storage and auth follow the application workflow: the same repository error type, the same
//! staff bearer tokens, and the same response envelope.

pub mod domain;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    InquiryType, MessageForm, MessageId, MessageListParams, MessagePriority, MessageStatus,
    MessageUpdate, ReplyForm, StudentStage,
};
pub use memory::InMemoryMessageRepository;
pub use repository::{
    InquiryTypeCount, MessagePage, MessagePagination, MessageQuery, MessageRecord,
    MessageRepository, MessageSortField, MessageStats, PriorityCount,
};
pub use router::{message_router, MessagesState};
pub use service::{MessageService, MessageServiceError};
pub use sqlite::SqliteMessageRepository;
pub use validation::{MessageValidator, ValidatedMessage, ValidatedUpdate};

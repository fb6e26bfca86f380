use super::domain::{
    InquiryType, MessageForm, MessageListParams, MessagePriority, MessageStatus, MessageUpdate,
    ReplyForm, StudentStage,
};
use super::repository::{MessageQuery, MessageSortField};
use crate::workflows::applications::validation::{
    is_valid_email, is_valid_phone, non_blank, ValidationError, Violations,
};
use crate::workflows::applications::SortOrder;

const MAX_MESSAGE_CHARS: usize = 5000;
const MAX_NOTES_CHARS: usize = 1000;
const MAX_PAGE_LIMIT: u32 = 100;

/// Contact form fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub student_grade: StudentStage,
    pub inquiry_type: InquiryType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub status: Option<MessageStatus>,
    pub priority: Option<MessagePriority>,
    pub admin_notes: Option<String>,
}

/// Checks visitor messages and staff triage input.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageValidator;

impl MessageValidator {
    pub fn validate(&self, form: MessageForm) -> Result<ValidatedMessage, ValidationError> {
        let mut violations = Violations::default();

        let name = violations.text("name", "Name", form.name, 2, 100);
        let email = match non_blank(form.email) {
            None => {
                violations.push("email", "Email is required");
                None
            }
            Some(email) if !is_valid_email(&email) => {
                violations.push("email", "Please provide a valid email address");
                None
            }
            Some(email) => Some(email.to_lowercase()),
        };
        let phone = match non_blank(form.phone) {
            Some(phone) if !is_valid_phone(&phone) => {
                violations.push("phone", "Please provide a valid phone number");
                None
            }
            phone => phone,
        };
        let subject = violations.text("subject", "Subject", form.subject, 2, 200);
        let message = violations.text("message", "Message", form.message, 1, MAX_MESSAGE_CHARS);
        let student_grade = violations.choice(
            "studentGrade",
            "Invalid student grade",
            form.student_grade,
            StudentStage::parse,
        );
        let inquiry_type = violations.choice(
            "inquiryType",
            "Invalid inquiry type",
            form.inquiry_type,
            InquiryType::parse,
        );

        let validated = match (name, email, subject, message, student_grade, inquiry_type) {
            (
                Some(name),
                Some(email),
                Some(subject),
                Some(message),
                Some(student_grade),
                Some(inquiry_type),
            ) => Some(ValidatedMessage {
                name,
                email,
                phone,
                subject,
                message,
                student_grade,
                inquiry_type,
            }),
            _ => None,
        };
        violations.finish(validated)
    }

    pub fn update(&self, update: MessageUpdate) -> Result<ValidatedUpdate, ValidationError> {
        let mut violations = Violations::default();

        let status = non_blank(update.status).and_then(|raw| {
            violations.choice("status", "Invalid message status", Some(raw), MessageStatus::parse)
        });
        let priority = non_blank(update.priority).and_then(|raw| {
            violations.choice(
                "priority",
                "Invalid message priority",
                Some(raw),
                MessagePriority::parse,
            )
        });
        let admin_notes = update.admin_notes.map(|notes| notes.trim().to_string());
        if admin_notes
            .as_ref()
            .is_some_and(|notes| notes.chars().count() > MAX_NOTES_CHARS)
        {
            violations.push("adminNotes", "Admin notes must not exceed 1000 characters");
        }
        if status.is_none() && priority.is_none() && admin_notes.is_none() {
            violations.push("status", "Status, priority, or admin notes are required");
        }

        violations.finish(Some(ValidatedUpdate {
            status,
            priority,
            admin_notes,
        }))
    }

    pub fn reply(&self, reply: ReplyForm) -> Result<String, ValidationError> {
        let mut violations = Violations::default();
        let reply_message = match non_blank(reply.reply_message) {
            None => {
                violations.push("replyMessage", "Reply message is required");
                None
            }
            Some(text) if text.chars().count() > MAX_MESSAGE_CHARS => {
                violations.push(
                    "replyMessage",
                    "Reply message must not exceed 5000 characters",
                );
                None
            }
            text => text,
        };
        violations.finish(reply_message)
    }

    pub fn list_query(&self, params: MessageListParams) -> Result<MessageQuery, ValidationError> {
        let mut violations = Violations::default();
        let mut query = MessageQuery::default();

        if let Some(page) = non_blank(params.page) {
            match page.parse::<u32>() {
                Ok(page) if page >= 1 => query.page = page,
                _ => violations.push("page", "Page must be a positive integer"),
            }
        }
        if let Some(limit) = non_blank(params.limit) {
            match limit.parse::<u32>() {
                Ok(limit) if (1..=MAX_PAGE_LIMIT).contains(&limit) => query.limit = limit,
                _ => violations.push("limit", "Limit must be between 1 and 100"),
            }
        }
        if let Some(status) = non_blank(params.status).filter(|value| value != "all") {
            query.status = violations.choice(
                "status",
                "Invalid message status",
                Some(status),
                MessageStatus::parse,
            );
        }
        if let Some(kind) = non_blank(params.inquiry_type).filter(|value| value != "all") {
            query.inquiry_type =
                violations.choice("type", "Invalid inquiry type", Some(kind), InquiryType::parse);
        }
        if let Some(priority) = non_blank(params.priority).filter(|value| value != "all") {
            query.priority = violations.choice(
                "priority",
                "Invalid message priority",
                Some(priority),
                MessagePriority::parse,
            );
        }
        query.search = non_blank(params.search);
        if let Some(sort_by) = non_blank(params.sort_by) {
            match MessageSortField::parse(&sort_by) {
                Some(field) => query.sort_by = field,
                None => violations.push("sortBy", "Invalid sort field"),
            }
        }
        if let Some(order) = non_blank(params.sort_order) {
            match order.as_str() {
                "asc" => query.sort_order = SortOrder::Asc,
                "desc" => query.sort_order = SortOrder::Desc,
                _ => violations.push("sortOrder", "Sort order must be asc or desc"),
            }
        }

        violations.finish(Some(query))
    }
}

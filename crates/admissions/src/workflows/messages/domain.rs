use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::applications::domain::parse_label;

/// Opaque storage identifier for a contact message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// School stage the enquiry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStage {
    Preschool,
    Primary,
    Jhs,
    Shs,
    Other,
}

impl StudentStage {
    pub const ALL: [StudentStage; 5] = [
        StudentStage::Preschool,
        StudentStage::Primary,
        StudentStage::Jhs,
        StudentStage::Shs,
        StudentStage::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            StudentStage::Preschool => "preschool",
            StudentStage::Primary => "primary",
            StudentStage::Jhs => "jhs",
            StudentStage::Shs => "shs",
            StudentStage::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryType {
    Admission,
    Information,
    Visit,
    Partnership,
    Other,
}

impl InquiryType {
    pub const ALL: [InquiryType; 5] = [
        InquiryType::Admission,
        InquiryType::Information,
        InquiryType::Visit,
        InquiryType::Partnership,
        InquiryType::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            InquiryType::Admission => "admission",
            InquiryType::Information => "information",
            InquiryType::Visit => "visit",
            InquiryType::Partnership => "partnership",
            InquiryType::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

/// Triage state of a message. New messages become `read` the first time staff open them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    New,
    Read,
    Replied,
    Archived,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 4] = [
        MessageStatus::New,
        MessageStatus::Read,
        MessageStatus::Replied,
        MessageStatus::Archived,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            MessageStatus::New => "new",
            MessageStatus::Read => "read",
            MessageStatus::Replied => "replied",
            MessageStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl MessagePriority {
    pub const ALL: [MessagePriority; 3] = [
        MessagePriority::Low,
        MessagePriority::Medium,
        MessagePriority::High,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Medium => "medium",
            MessagePriority::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

/// Raw contact form as posted by a visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub student_grade: Option<String>,
    pub inquiry_type: Option<String>,
}

/// Staff triage update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageUpdate {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplyForm {
    pub reply_message: Option<String>,
}

/// Raw list parameters from the staff query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub inquiry_type: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

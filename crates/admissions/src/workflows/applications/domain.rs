use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque storage identifier for an application record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn parse_label<T: Copy>(all: &[T], label: fn(T) -> &'static str, raw: &str) -> Option<T> {
    let raw = raw.trim();
    all.iter().copied().find(|candidate| label(*candidate) == raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

/// Grade the student is applying for, from nursery through the final high-school year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeLevel {
    Nursery,
    Primary1,
    Primary2,
    Primary3,
    Primary4,
    Primary5,
    Middle1,
    Middle2,
    Middle3,
    Middle4,
    High1,
    High2,
    High3,
}

impl GradeLevel {
    pub const ALL: [GradeLevel; 13] = [
        GradeLevel::Nursery,
        GradeLevel::Primary1,
        GradeLevel::Primary2,
        GradeLevel::Primary3,
        GradeLevel::Primary4,
        GradeLevel::Primary5,
        GradeLevel::Middle1,
        GradeLevel::Middle2,
        GradeLevel::Middle3,
        GradeLevel::Middle4,
        GradeLevel::High1,
        GradeLevel::High2,
        GradeLevel::High3,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            GradeLevel::Nursery => "nursery",
            GradeLevel::Primary1 => "primary1",
            GradeLevel::Primary2 => "primary2",
            GradeLevel::Primary3 => "primary3",
            GradeLevel::Primary4 => "primary4",
            GradeLevel::Primary5 => "primary5",
            GradeLevel::Middle1 => "middle1",
            GradeLevel::Middle2 => "middle2",
            GradeLevel::Middle3 => "middle3",
            GradeLevel::Middle4 => "middle4",
            GradeLevel::High1 => "high1",
            GradeLevel::High2 => "high2",
            GradeLevel::High3 => "high3",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageProficiency {
    Beginner,
    Intermediate,
    Advanced,
    Fluent,
}

impl LanguageProficiency {
    pub const ALL: [LanguageProficiency; 4] = [
        LanguageProficiency::Beginner,
        LanguageProficiency::Intermediate,
        LanguageProficiency::Advanced,
        LanguageProficiency::Fluent,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LanguageProficiency::Beginner => "beginner",
            LanguageProficiency::Intermediate => "intermediate",
            LanguageProficiency::Advanced => "advanced",
            LanguageProficiency::Fluent => "fluent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

/// High level status tracked throughout the admissions review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    WaitingList,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::WaitingList,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::WaitingList => "waiting_list",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::label, raw)
    }
}

/// Supporting documents an applicant may attach, at most one file per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    BirthCertificate,
    PreviousReports,
    Photo,
    VaccinationCertificate,
    TransferCertificate,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::BirthCertificate,
        DocumentKind::PreviousReports,
        DocumentKind::Photo,
        DocumentKind::VaccinationCertificate,
        DocumentKind::TransferCertificate,
    ];

    /// Multipart field name and JSON key for the document kind.
    pub const fn field_name(self) -> &'static str {
        match self {
            DocumentKind::BirthCertificate => "birthCertificate",
            DocumentKind::PreviousReports => "previousReports",
            DocumentKind::Photo => "photo",
            DocumentKind::VaccinationCertificate => "vaccinationCertificate",
            DocumentKind::TransferCertificate => "transferCertificate",
        }
    }

    pub fn from_field(raw: &str) -> Option<Self> {
        parse_label(&Self::ALL, Self::field_name, raw)
    }

    /// Only photos are restricted to image formats.
    pub const fn images_only(self) -> bool {
        matches!(self, DocumentKind::Photo)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Student section exactly as submitted; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentInfoForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfoForm {
    pub parent_name: Option<String>,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcademicInfoForm {
    pub grade_level: Option<String>,
    pub previous_school: Option<String>,
    pub language_proficiency: Option<String>,
    pub special_needs: Option<String>,
}

/// Unvalidated public submission sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationForm {
    pub student_info: Option<StudentInfoForm>,
    pub contact_info: Option<ContactInfoForm>,
    pub academic_info: Option<AcademicInfoForm>,
}

/// File received with a submission, keyed by the multipart field it arrived under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Origin details captured for audit on every submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Everything the intake service needs to create an application.
#[derive(Debug, Clone, Default)]
pub struct IntakeRequest {
    pub form: ApplicationForm,
    pub attachments: Vec<UploadedDocument>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub nationality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicInfo {
    pub grade_level: GradeLevel,
    pub previous_school: String,
    pub language_proficiency: LanguageProficiency,
    #[serde(default)]
    pub special_needs: String,
}

/// Staff-supplied review payload; values are checked before they touch a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Raw list parameters from the staff query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub grade_level: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

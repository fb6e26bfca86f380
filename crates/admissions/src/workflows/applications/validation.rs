use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Serialize;

use super::documents::{format_file_size, is_document_file, is_image_file};
use super::domain::{
    AcademicInfo, AcademicInfoForm, ApplicationForm, ApplicationStatus, ContactInfo,
    ContactInfoForm, DocumentKind, Gender, GradeLevel, LanguageProficiency, ListParams,
    ReviewUpdate, StudentInfo, StudentInfoForm, UploadedDocument,
};
use super::repository::{ApplicationQuery, SortField, SortOrder};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const MAX_NOTES_CHARS: usize = 1000;
const MAX_SPECIAL_NEEDS_CHARS: usize = 500;
const MAX_PAGE_LIMIT: u32 = 100;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Every problem found in a request, reported together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed for {} field(s)", .violations.len())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|violation| violation.field.as_str())
            .collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.field == field)
    }
}

#[derive(Default)]
pub(crate) struct Violations(Vec<FieldViolation>);

impl Violations {
    pub(crate) fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Trimmed text whose character count lies within `min..=max`.
    pub(crate) fn text(
        &mut self,
        field: &str,
        label: &str,
        value: Option<String>,
        min: usize,
        max: usize,
    ) -> Option<String> {
        let Some(value) = non_blank(value) else {
            self.push(field, format!("{label} is required"));
            return None;
        };
        let length = value.chars().count();
        if length < min || length > max {
            self.push(
                field,
                format!("{label} must be between {min} and {max} characters"),
            );
            return None;
        }
        Some(value)
    }

    pub(crate) fn choice<T>(
        &mut self,
        field: &str,
        message: &str,
        value: Option<String>,
        parse: fn(&str) -> Option<T>,
    ) -> Option<T> {
        let parsed = value.as_deref().and_then(parse);
        if parsed.is_none() {
            self.push(field, message);
        }
        parsed
    }

    pub(crate) fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(value) if self.0.is_empty() => Ok(value),
            _ => Err(ValidationError { violations: self.0 }),
        }
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone pattern"))
}

pub fn is_valid_email(raw: &str) -> bool {
    email_pattern().is_match(raw.trim())
}

/// Accepts an optional leading `+` and 7 to 15 digits once separators are removed.
pub fn is_valid_phone(raw: &str) -> bool {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    phone_pattern().is_match(&compact)
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp and keeps only the calendar date.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|value| value.date_naive())
        })
}

/// Limits applied to uploaded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Largest request body worth reading: every document at its cap plus room for the form.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(DocumentKind::ALL.len())
            .saturating_add(1024 * 1024)
    }
}

/// Typed application sections that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedApplication {
    pub student_info: StudentInfo,
    pub contact_info: ContactInfo,
    pub academic_info: AcademicInfo,
}

/// Validated sections plus the attachments to stage, each bound to its document kind.
#[derive(Debug, Clone)]
pub struct ValidatedIntake {
    pub application: ValidatedApplication,
    pub attachments: Vec<(DocumentKind, UploadedDocument)>,
}

/// Checks public submissions and staff input before anything is persisted.
#[derive(Debug, Clone, Default)]
pub struct IntakeValidator {
    policy: UploadPolicy,
}

impl IntakeValidator {
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate every section field and every attachment; all violations are returned at once.
    pub fn validate(
        &self,
        form: ApplicationForm,
        attachments: Vec<UploadedDocument>,
        today: NaiveDate,
    ) -> Result<ValidatedIntake, ValidationError> {
        let mut violations = Violations::default();

        let student_info = student_info(
            form.student_info.unwrap_or_default(),
            today,
            &mut violations,
        );
        let contact_info = contact_info(form.contact_info.unwrap_or_default(), &mut violations);
        let academic_info =
            academic_info(form.academic_info.unwrap_or_default(), &mut violations);
        let attachments = self.attachments(attachments, &mut violations);

        let intake = match (student_info, contact_info, academic_info) {
            (Some(student_info), Some(contact_info), Some(academic_info)) => {
                Some(ValidatedIntake {
                    application: ValidatedApplication {
                        student_info,
                        contact_info,
                        academic_info,
                    },
                    attachments,
                })
            }
            _ => None,
        };

        violations.finish(intake)
    }

    fn attachments(
        &self,
        uploads: Vec<UploadedDocument>,
        violations: &mut Violations,
    ) -> Vec<(DocumentKind, UploadedDocument)> {
        let mut seen = BTreeSet::new();
        let mut accepted = Vec::new();

        for upload in uploads {
            let field = format!("documents.{}", upload.field_name);
            let Some(kind) = DocumentKind::from_field(&upload.field_name) else {
                violations.push(field, "Unexpected file field");
                continue;
            };
            if !seen.insert(kind) {
                violations.push(field, "Only one file may be uploaded per document type");
                continue;
            }
            if upload.bytes.is_empty() {
                violations.push(field, "Uploaded file is empty");
                continue;
            }
            if upload.bytes.len() > self.policy.max_file_bytes {
                violations.push(
                    field,
                    format!(
                        "File exceeds the {} upload limit",
                        format_file_size(self.policy.max_file_bytes as u64)
                    ),
                );
                continue;
            }

            let name = upload.file_name.as_deref().unwrap_or_default();
            let allowed = if kind.images_only() {
                is_image_file(name)
            } else {
                is_image_file(name) || is_document_file(name)
            };
            if !allowed {
                let message = if kind.images_only() {
                    "Only image files (jpg, jpeg, png, gif, bmp, webp) are allowed"
                } else {
                    "Only image or document files (pdf, doc, docx, txt, rtf) are allowed"
                };
                violations.push(field, message);
                continue;
            }

            accepted.push((kind, upload));
        }

        accepted
    }

    /// Validate a staff review update into a status and optional notes.
    pub fn review(
        &self,
        update: ReviewUpdate,
    ) -> Result<(ApplicationStatus, Option<String>), ValidationError> {
        let mut violations = Violations::default();
        let status = violations.choice(
            "status",
            "Invalid application status",
            update.status,
            ApplicationStatus::parse,
        );

        let notes = update.notes.map(|notes| notes.trim().to_string());
        if notes
            .as_deref()
            .is_some_and(|notes| notes.chars().count() > MAX_NOTES_CHARS)
        {
            violations.push("notes", "Notes must not exceed 1000 characters");
        }

        violations.finish(status.map(|status| (status, notes)))
    }

    /// Validate list parameters; `all` disables the status and grade filters.
    pub fn list_query(&self, params: ListParams) -> Result<ApplicationQuery, ValidationError> {
        let mut violations = Violations::default();
        let mut query = ApplicationQuery::default();

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
                "Invalid application status",
                Some(status),
                ApplicationStatus::parse,
            );
        }
        if let Some(grade) = non_blank(params.grade_level).filter(|value| value != "all") {
            query.grade_level = violations.choice(
                "gradeLevel",
                "Invalid grade level",
                Some(grade),
                GradeLevel::parse,
            );
        }
        query.search = non_blank(params.search);
        if let Some(sort_by) = non_blank(params.sort_by) {
            match SortField::parse(&sort_by) {
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

fn student_info(
    form: StudentInfoForm,
    today: NaiveDate,
    violations: &mut Violations,
) -> Option<StudentInfo> {
    let first_name = violations.text(
        "studentInfo.firstName",
        "First name",
        form.first_name,
        2,
        50,
    );
    let last_name = violations.text("studentInfo.lastName", "Last name", form.last_name, 2, 50);

    let birth_date = match non_blank(form.birth_date).as_deref().map(parse_birth_date) {
        Some(Some(date)) if date > today => {
            violations.push("studentInfo.birthDate", "Birth date cannot be in the future");
            None
        }
        Some(Some(date)) => Some(date),
        _ => {
            violations.push("studentInfo.birthDate", "Please provide a valid birth date");
            None
        }
    };

    let gender = violations.choice(
        "studentInfo.gender",
        "Invalid gender",
        form.gender,
        Gender::parse,
    );
    let nationality = violations.text(
        "studentInfo.nationality",
        "Nationality",
        form.nationality,
        2,
        50,
    );

    Some(StudentInfo {
        first_name: first_name?,
        last_name: last_name?,
        birth_date: birth_date?,
        gender: gender?,
        nationality: nationality?,
    })
}

fn contact_info(form: ContactInfoForm, violations: &mut Violations) -> Option<ContactInfo> {
    let parent_name = violations.text(
        "contactInfo.parentName",
        "Parent name",
        form.parent_name,
        2,
        100,
    );

    let parent_email = match non_blank(form.parent_email) {
        Some(email) if is_valid_email(&email) => Some(email.to_lowercase()),
        _ => {
            violations.push("contactInfo.parentEmail", "Please provide a valid parent email");
            None
        }
    };

    let parent_phone = match non_blank(form.parent_phone) {
        Some(phone) if is_valid_phone(&phone) => Some(phone),
        _ => {
            violations.push(
                "contactInfo.parentPhone",
                "Please provide a valid parent phone number",
            );
            None
        }
    };

    let address = violations.text("contactInfo.address", "Address", form.address, 10, 200);
    let city = violations.text("contactInfo.city", "City", form.city, 2, 50);

    Some(ContactInfo {
        parent_name: parent_name?,
        parent_email: parent_email?,
        parent_phone: parent_phone?,
        address: address?,
        city: city?,
    })
}

fn academic_info(form: AcademicInfoForm, violations: &mut Violations) -> Option<AcademicInfo> {
    let grade_level = violations.choice(
        "academicInfo.gradeLevel",
        "Invalid grade level",
        form.grade_level,
        GradeLevel::parse,
    );
    let previous_school = violations.text(
        "academicInfo.previousSchool",
        "Previous school",
        form.previous_school,
        2,
        100,
    );
    let language_proficiency = violations.choice(
        "academicInfo.languageProficiency",
        "Invalid language proficiency level",
        form.language_proficiency,
        LanguageProficiency::parse,
    );

    let special_needs = form
        .special_needs
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    let special_needs = if special_needs.chars().count() > MAX_SPECIAL_NEEDS_CHARS {
        violations.push(
            "academicInfo.specialNeeds",
            "Special needs description must not exceed 500 characters",
        );
        None
    } else {
        Some(special_needs)
    };

    Some(AcademicInfo {
        grade_level: grade_level?,
        previous_school: previous_school?,
        language_proficiency: language_proficiency?,
        special_needs: special_needs?,
    })
}

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::documents::StoredDocument;
use super::domain::{
    AcademicInfo, ApplicationId, ApplicationStatus, ContactInfo, DocumentKind, GradeLevel,
    Provenance, StudentInfo,
};
use super::sequence::{ApplicationNumber, SequenceCounter};

/// Persisted admission application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub student_info: StudentInfo,
    pub contact_info: ContactInfo,
    pub academic_info: AcademicInfo,
    pub documents: BTreeMap<DocumentKind, StoredDocument>,
    pub status: ApplicationStatus,
    pub notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl ApplicationRecord {
    pub fn receipt(&self) -> SubmissionReceipt {
        SubmissionReceipt {
            id: self.id.clone(),
            application_number: self.application_number,
            status: self.status,
            submitted_at: self.submitted_at,
        }
    }

    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            id: self.id.clone(),
            application_number: self.application_number,
            student_info: self.student_info.clone(),
            contact_info: self.contact_info.clone(),
            academic_info: self.academic_info.clone(),
            status: self.status,
            notes: self.notes.clone(),
            reviewed_by: self.reviewed_by.clone(),
            reviewed_at: self.reviewed_at,
            submitted_at: self.submitted_at,
        }
    }

    /// Apply a staff review. Reviewer and review time are stamped only on the first move away
    /// from `submitted`; later reviews leave them untouched.
    pub fn apply_review(
        &mut self,
        status: ApplicationStatus,
        notes: Option<String>,
        reviewer: &str,
        at: DateTime<Utc>,
    ) {
        if status != ApplicationStatus::Submitted && self.reviewed_at.is_none() {
            self.reviewed_by = Some(reviewer.to_string());
            self.reviewed_at = Some(at);
        }
        self.status = status;
        if let Some(notes) = notes {
            self.notes = Some(notes);
        }
    }
}

/// Confirmation returned to the public submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

/// List view of an application; documents are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub student_info: StudentInfo,
    pub contact_info: ContactInfo,
    pub academic_info: AcademicInfo,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

/// Storage abstraction so the service can run against SQLite or memory.
///
/// Implementations own the application-number counter as well and must reject a second record
/// carrying an already assigned number with [`RepositoryError::DuplicateApplicationNumber`].
pub trait ApplicationRepository: SequenceCounter {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    /// Apply `change` to the stored record and persist it as one step, so concurrent callers
    /// each see the other's write. A change that touches the id or the application number is
    /// rejected with [`RepositoryError::Conflict`] and nothing is stored.
    fn modify<F>(&self, id: &ApplicationId, change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord);
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn delete(&self, id: &ApplicationId) -> Result<bool, RepositoryError>;
    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError>;
    fn stats(&self, year: i32) -> Result<ApplicationStats, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("application number {0} is already assigned")]
    DuplicateApplicationNumber(ApplicationNumber),
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    SubmittedAt,
    ApplicationNumber,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "submittedAt" | "createdAt" => Some(Self::SubmittedAt),
            "applicationNumber" => Some(Self::ApplicationNumber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Validated staff list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationQuery {
    pub status: Option<ApplicationStatus>,
    pub grade_level: Option<GradeLevel>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for ApplicationQuery {
    fn default() -> Self {
        Self {
            status: None,
            grade_level: None,
            search: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: 10,
        }
    }
}

impl ApplicationQuery {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        if self.status.is_some_and(|status| status != record.status) {
            return false;
        }
        if self
            .grade_level
            .is_some_and(|grade| grade != record.academic_info.grade_level)
        {
            return false;
        }

        match self.search.as_deref() {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                let number = record.application_number.to_string();
                [
                    record.student_info.first_name.as_str(),
                    record.student_info.last_name.as_str(),
                    record.contact_info.parent_name.as_str(),
                    record.contact_info.parent_email.as_str(),
                    number.as_str(),
                ]
                .iter()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
            }
        }
    }

    fn compare(&self, left: &ApplicationRecord, right: &ApplicationRecord) -> Ordering {
        let ordering = match self.sort_by {
            SortField::SubmittedAt => left
                .submitted_at
                .cmp(&right.submitted_at)
                .then_with(|| left.application_number.cmp(&right.application_number)),
            SortField::ApplicationNumber => {
                left.application_number.cmp(&right.application_number)
            }
        };
        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    /// Filter, sort, and cut one page out of `records`.
    pub fn paginate(
        &self,
        records: impl IntoIterator<Item = ApplicationRecord>,
    ) -> ApplicationPage {
        let mut matching: Vec<ApplicationRecord> =
            records.into_iter().filter(|record| self.matches(record)).collect();
        matching.sort_by(|left, right| self.compare(left, right));

        let total = matching.len() as u64;
        let limit = u64::from(self.limit.max(1));
        let page = u64::from(self.page.max(1));
        let skip = ((page - 1) * limit) as usize;

        let applications = matching
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|record| record.summary())
            .collect();

        ApplicationPage {
            applications,
            pagination: Pagination {
                current_page: page as u32,
                total_pages: total.div_ceil(limit) as u32,
                total_applications: total,
                has_next: page * limit < total,
                has_prev: page > 1,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPage {
    pub applications: Vec<ApplicationSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_applications: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Dashboard counts for the admissions office.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStats {
    pub total: u64,
    pub submitted: u64,
    pub under_review: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub waiting_list: u64,
    pub by_grade: Vec<GradeCount>,
    pub monthly: Vec<MonthlyCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub grade_level: GradeLevel,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCount {
    pub month: u32,
    pub count: u64,
}

impl ApplicationStats {
    /// Assemble stats from already grouped counts. Grades come out in grade order, months in
    /// calendar order, and empty groups are dropped.
    pub fn from_counts(
        by_status: &HashMap<ApplicationStatus, u64>,
        by_grade: BTreeMap<GradeLevel, u64>,
        by_month: BTreeMap<u32, u64>,
    ) -> Self {
        let count = |status| by_status.get(&status).copied().unwrap_or(0);
        Self {
            total: by_status.values().sum(),
            submitted: count(ApplicationStatus::Submitted),
            under_review: count(ApplicationStatus::UnderReview),
            accepted: count(ApplicationStatus::Accepted),
            rejected: count(ApplicationStatus::Rejected),
            waiting_list: count(ApplicationStatus::WaitingList),
            by_grade: by_grade
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(grade_level, count)| GradeCount { grade_level, count })
                .collect(),
            monthly: by_month
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(month, count)| MonthlyCount { month, count })
                .collect(),
        }
    }

    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ApplicationRecord>,
        year: i32,
    ) -> Self {
        let mut by_status = HashMap::new();
        let mut by_grade = BTreeMap::new();
        let mut by_month = BTreeMap::new();

        for record in records {
            *by_status.entry(record.status).or_insert(0) += 1;
            *by_grade.entry(record.academic_info.grade_level).or_insert(0) += 1;
            if record.submitted_at.year() == year {
                *by_month.entry(record.submitted_at.month()).or_insert(0) += 1;
            }
        }

        Self::from_counts(&by_status, by_grade, by_month)
    }
}

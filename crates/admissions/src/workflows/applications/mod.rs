//! Admission applications: intake with collision-free `APP######` numbering, document staging,
//! staff review, and the read paths behind the admissions dashboard.
//!
//! The service is synchronous; the router runs it on the blocking pool so a submission always
//! finishes (commit or cleanup) even when the client disconnects mid-request.

pub mod auth;
pub mod documents;
pub mod domain;
pub mod memory;
pub mod repository;
pub(crate) mod response;
pub mod router;
pub mod sequence;
pub mod service;
pub mod sqlite;
pub mod validation;

#[cfg(test)]
mod tests;

pub use auth::{StaffDirectory, StaffIdentity};
pub use documents::{
    DocumentStore, DocumentStoreError, LocalDocumentStore, StagedDocuments, StoredDocument,
};
pub use domain::{
    AcademicInfo, AcademicInfoForm, ApplicationForm, ApplicationId, ApplicationStatus,
    ContactInfo, ContactInfoForm, DocumentKind, Gender, GradeLevel, IntakeRequest,
    LanguageProficiency, ListParams, Provenance, ReviewUpdate, StudentInfo, StudentInfoForm,
    UploadedDocument,
};
pub use memory::InMemoryApplicationRepository;
pub use repository::{
    ApplicationPage, ApplicationQuery, ApplicationRecord, ApplicationRepository,
    ApplicationStats, ApplicationSummary, GradeCount, MonthlyCount, Pagination, RepositoryError,
    SortField, SortOrder, SubmissionReceipt,
};
pub use router::{application_router, AdmissionsState};
pub use sequence::{
    AllocationError, ApplicationNumber, SequenceAllocator, SequenceCounter,
    DEFAULT_ALLOCATION_ATTEMPTS, MAX_APPLICATION_SEQUENCE,
};
pub use service::{AdmissionsService, ApplicationServiceError, DocumentDownload};
pub use sqlite::SqliteApplicationRepository;
pub use validation::{
    FieldViolation, IntakeValidator, UploadPolicy, ValidationError, DEFAULT_MAX_UPLOAD_BYTES,
};

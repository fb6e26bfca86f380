use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{info, warn};

use super::auth::StaffIdentity;
use super::documents::{DocumentStore, DocumentStoreError, StagedDocuments, StoredDocument};
use super::domain::{
    ApplicationForm, ApplicationId, ApplicationStatus, DocumentKind, IntakeRequest, ListParams,
    ReviewUpdate, UploadedDocument,
};
use super::repository::{
    ApplicationPage, ApplicationRecord, ApplicationRepository, ApplicationStats, RepositoryError,
    SubmissionReceipt,
};
use super::sequence::{AllocationError, SequenceAllocator, DEFAULT_ALLOCATION_ATTEMPTS};
use super::validation::{IntakeValidator, UploadPolicy, ValidationError};

/// Service composing validation, document staging, number allocation, and persistence.
pub struct AdmissionsService<R, D> {
    validator: Arc<IntakeValidator>,
    repository: Arc<R>,
    documents: Arc<D>,
    allocator: SequenceAllocator<R>,
}

/// Stored document metadata together with the file contents.
#[derive(Debug, Clone)]
pub struct DocumentDownload {
    pub document: StoredDocument,
    pub bytes: Vec<u8>,
}

impl<R, D> AdmissionsService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(repository: Arc<R>, documents: Arc<D>, policy: UploadPolicy) -> Self {
        Self::with_max_allocation_attempts(
            repository,
            documents,
            policy,
            DEFAULT_ALLOCATION_ATTEMPTS,
        )
    }

    pub fn with_max_allocation_attempts(
        repository: Arc<R>,
        documents: Arc<D>,
        policy: UploadPolicy,
        max_attempts: u32,
    ) -> Self {
        let allocator = SequenceAllocator::with_max_attempts(Arc::clone(&repository), max_attempts);
        Self {
            validator: Arc::new(IntakeValidator::new(policy)),
            repository,
            documents,
            allocator,
        }
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        self.validator.policy()
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Run intake validation without staging or storing anything.
    pub fn check_intake(
        &self,
        form: ApplicationForm,
        attachments: Vec<UploadedDocument>,
    ) -> Result<(), ValidationError> {
        self.validator
            .validate(form, attachments, Utc::now().date_naive())
            .map(|_| ())
    }

    /// Submit a public application, stamped with the current time.
    pub fn submit(
        &self,
        request: IntakeRequest,
    ) -> Result<SubmissionReceipt, ApplicationServiceError> {
        self.submit_at(request, Utc::now())
    }

    /// Validate, stage every attachment, then persist under a freshly assigned application
    /// number. Staged files are removed again if anything after staging fails.
    pub fn submit_at(
        &self,
        request: IntakeRequest,
        submitted_at: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, ApplicationServiceError> {
        let IntakeRequest {
            form,
            attachments,
            provenance,
        } = request;

        let intake = self
            .validator
            .validate(form, attachments, submitted_at.date_naive())?;

        let mut staged = StagedDocuments::new(self.documents.as_ref());
        for (kind, upload) in &intake.attachments {
            staged.stage(*kind, upload)?;
        }

        let id = ApplicationId::generate();
        let application = intake.application;
        let documents = staged.documents();

        let record = self.allocator.assign(|application_number| {
            self.repository.insert(ApplicationRecord {
                id: id.clone(),
                application_number,
                student_info: application.student_info.clone(),
                contact_info: application.contact_info.clone(),
                academic_info: application.academic_info.clone(),
                documents: documents.clone(),
                status: ApplicationStatus::Submitted,
                notes: None,
                reviewed_by: None,
                reviewed_at: None,
                submitted_at,
                provenance: provenance.clone(),
            })
        })?;

        let committed = staged.commit();
        info!(
            application_id = %record.id,
            application_number = %record.application_number,
            documents = committed.len(),
            "application submitted"
        );
        Ok(record.receipt())
    }

    /// Apply a staff review to an existing application.
    pub fn review(
        &self,
        id: &ApplicationId,
        update: ReviewUpdate,
        reviewer: &StaffIdentity,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.review_at(id, update, reviewer, Utc::now())
    }

    pub fn review_at(
        &self,
        id: &ApplicationId,
        update: ReviewUpdate,
        reviewer: &StaffIdentity,
        at: DateTime<Utc>,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let (status, notes) = self.validator.review(update)?;
        let record = self
            .repository
            .modify(id, |record| {
                record.apply_review(status, notes, reviewer.staff_id(), at)
            })
            .map_err(|err| match err {
                RepositoryError::NotFound => ApplicationServiceError::ApplicationNotFound(id.clone()),
                other => other.into(),
            })?;

        info!(
            application_id = %record.id,
            status = record.status.label(),
            reviewer = reviewer.staff_id(),
            "application reviewed"
        );
        Ok(record)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| ApplicationServiceError::ApplicationNotFound(id.clone()))
    }

    pub fn list(&self, params: ListParams) -> Result<ApplicationPage, ApplicationServiceError> {
        let query = self.validator.list_query(params)?;
        Ok(self.repository.list(&query)?)
    }

    /// Counts by status and grade, plus monthly submissions for the year of `today`.
    pub fn stats(&self, today: NaiveDate) -> Result<ApplicationStats, ApplicationServiceError> {
        Ok(self.repository.stats(today.year())?)
    }

    /// Load one document of an application. `kind` is the wire name, e.g. `birthCertificate`.
    pub fn document(
        &self,
        id: &ApplicationId,
        kind: &str,
    ) -> Result<DocumentDownload, ApplicationServiceError> {
        let record = self.get(id)?;
        let missing = || ApplicationServiceError::DocumentNotFound {
            id: id.clone(),
            kind: kind.to_string(),
        };

        let document_kind = DocumentKind::from_field(kind).ok_or_else(missing)?;
        let document = record
            .documents
            .get(&document_kind)
            .cloned()
            .ok_or_else(missing)?;

        match self.documents.read(&document.reference) {
            Ok(bytes) => Ok(DocumentDownload { document, bytes }),
            Err(DocumentStoreError::NotFound(reference)) => {
                warn!(
                    application_id = %id,
                    reference = %reference,
                    "document referenced by application is missing from storage"
                );
                Err(missing())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Error raised by the admissions service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Allocation(AllocationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Documents(#[from] DocumentStoreError),
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("document '{kind}' not found for application {id}")]
    DocumentNotFound { id: ApplicationId, kind: String },
    #[error("background task failed: {0}")]
    Worker(String),
}

impl From<AllocationError> for ApplicationServiceError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::Repository(err) => Self::Repository(err),
            other => Self::Allocation(other),
        }
    }
}

impl ApplicationServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ApplicationNotFound(_)
                | Self::DocumentNotFound { .. }
                | Self::Repository(RepositoryError::NotFound)
        )
    }
}

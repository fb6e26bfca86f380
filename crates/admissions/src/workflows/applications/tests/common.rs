use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use crate::workflows::applications::documents::{
    DocumentStore, DocumentStoreError, StoredDocument,
};
use crate::workflows::applications::domain::{
    AcademicInfoForm, ApplicationForm, ApplicationId, ContactInfoForm, DocumentKind,
    IntakeRequest, Provenance, StudentInfoForm, UploadedDocument,
};
use crate::workflows::applications::repository::{
    ApplicationPage, ApplicationQuery, ApplicationRecord, ApplicationRepository, ApplicationStats,
    RepositoryError,
};
use crate::workflows::applications::sequence::SequenceCounter;
use crate::workflows::applications::{
    application_router, AdmissionsService, InMemoryApplicationRepository, LocalDocumentStore,
    StaffDirectory, UploadPolicy,
};

pub(super) const STAFF_TOKEN: &str = "registrar-token";
pub(super) const STAFF_ID: &str = "registrar";

pub(super) type MemoryService =
    AdmissionsService<InMemoryApplicationRepository, LocalDocumentStore>;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date")
}

pub(super) fn submitted_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn student_info() -> StudentInfoForm {
    StudentInfoForm {
        first_name: Some("Layla".to_string()),
        last_name: Some("Haddad".to_string()),
        birth_date: Some("2016-04-12".to_string()),
        gender: Some("female".to_string()),
        nationality: Some("Jordanian".to_string()),
    }
}

pub(super) fn contact_info() -> ContactInfoForm {
    ContactInfoForm {
        parent_name: Some("Omar Haddad".to_string()),
        parent_email: Some("Omar.Haddad@Example.com".to_string()),
        parent_phone: Some("+962 79 555 0142".to_string()),
        address: Some("14 Rainbow Street, Jabal Amman".to_string()),
        city: Some("Amman".to_string()),
    }
}

pub(super) fn academic_info() -> AcademicInfoForm {
    AcademicInfoForm {
        grade_level: Some("primary3".to_string()),
        previous_school: Some("Amman Baccalaureate School".to_string()),
        language_proficiency: Some("intermediate".to_string()),
        special_needs: None,
    }
}

pub(super) fn complete_form() -> ApplicationForm {
    ApplicationForm {
        student_info: Some(student_info()),
        contact_info: Some(contact_info()),
        academic_info: Some(academic_info()),
    }
}

pub(super) fn upload(field: &str, file_name: &str, bytes: &[u8]) -> UploadedDocument {
    UploadedDocument {
        field_name: field.to_string(),
        file_name: Some(file_name.to_string()),
        content_type: None,
        bytes: bytes.to_vec(),
    }
}

pub(super) fn photo() -> UploadedDocument {
    upload("photo", "layla.png", b"\x89PNG fake image bytes")
}

pub(super) fn birth_certificate() -> UploadedDocument {
    upload("birthCertificate", "birth certificate.pdf", b"%PDF-1.7 fake")
}

pub(super) fn intake_request() -> IntakeRequest {
    IntakeRequest {
        form: complete_form(),
        attachments: vec![photo(), birth_certificate()],
        provenance: Provenance {
            ip_address: Some("198.51.100.23".to_string()),
            user_agent: Some("admissions-tests".to_string()),
        },
    }
}

pub(super) fn staff_directory() -> Arc<StaffDirectory> {
    Arc::new(StaffDirectory::new().with_token(STAFF_ID, STAFF_TOKEN))
}

/// Service over the in-memory store with documents written into a fresh temp directory.
pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryApplicationRepository>,
    Arc<LocalDocumentStore>,
    TempDir,
) {
    let uploads = TempDir::new().expect("temp dir");
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let documents = Arc::new(LocalDocumentStore::open(uploads.path()).expect("document store"));
    let service = AdmissionsService::new(
        Arc::clone(&repository),
        Arc::clone(&documents),
        UploadPolicy::default(),
    );
    (service, repository, documents, uploads)
}

pub(super) fn service_with_repository<R>(
    repository: Arc<R>,
) -> (AdmissionsService<R, LocalDocumentStore>, TempDir)
where
    R: ApplicationRepository + 'static,
{
    let uploads = TempDir::new().expect("temp dir");
    let documents = Arc::new(LocalDocumentStore::open(uploads.path()).expect("document store"));
    let service = AdmissionsService::new(repository, documents, UploadPolicy::default());
    (service, uploads)
}

pub(super) fn router_for(service: MemoryService) -> axum::Router {
    application_router(Arc::new(service), staff_directory())
}

pub(super) fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .expect("read upload dir")
        .filter_map(Result::ok)
        .count()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Minimal `multipart/form-data` encoder for router tests.
pub(super) struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub(super) fn new() -> Self {
        Self {
            boundary: "admissions-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub(super) fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub(super) fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub(super) fn json_sections(self, form: &ApplicationForm) -> Self {
        let value = serde_json::to_value(form).expect("form serializes");
        ["studentInfo", "contactInfo", "academicInfo"]
            .into_iter()
            .fold(self, |body, section| match value.get(section) {
                Some(section_value) if !section_value.is_null() => {
                    body.text(section, &section_value.to_string())
                }
                _ => body,
            })
    }

    pub(super) fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub(super) fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), self.body)
    }
}

/// In-memory store whose counter first replays already issued values, as a counter restored from
/// an old backup would.
pub(super) struct StaleCounterRepository {
    pub(super) inner: InMemoryApplicationRepository,
    replay: Mutex<VecDeque<u64>>,
}

impl StaleCounterRepository {
    pub(super) fn new(inner: InMemoryApplicationRepository, replay: Vec<u64>) -> Self {
        Self {
            inner,
            replay: Mutex::new(replay.into()),
        }
    }
}

impl SequenceCounter for StaleCounterRepository {
    fn next_sequence(&self) -> Result<u64, RepositoryError> {
        let replayed = self.replay.lock().expect("replay mutex poisoned").pop_front();
        match replayed {
            Some(value) => Ok(value),
            None => self.inner.next_sequence(),
        }
    }
}

impl ApplicationRepository for StaleCounterRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn modify<F>(&self, id: &ApplicationId, change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        self.inner.modify(id, change)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn delete(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        self.inner.delete(id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        self.inner.list(query)
    }

    fn stats(&self, year: i32) -> Result<ApplicationStats, RepositoryError> {
        self.inner.stats(year)
    }
}

/// Store whose counter works but whose writes always fail.
pub(super) struct UnavailableRepository;

impl SequenceCounter for UnavailableRepository {
    fn next_sequence(&self) -> Result<u64, RepositoryError> {
        Ok(1)
    }
}

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn modify<F>(&self, _id: &ApplicationId, _change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &ApplicationId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn stats(&self, _year: i32) -> Result<ApplicationStats, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// In-memory store that holds every `modify` caller at a barrier until all of them arrived, so
/// the writes race for the record lock.
pub(super) struct GatedRepository {
    pub(super) inner: InMemoryApplicationRepository,
    gate: Barrier,
}

impl GatedRepository {
    pub(super) fn new(inner: InMemoryApplicationRepository, callers: usize) -> Self {
        Self {
            inner,
            gate: Barrier::new(callers),
        }
    }
}

impl SequenceCounter for GatedRepository {
    fn next_sequence(&self) -> Result<u64, RepositoryError> {
        self.inner.next_sequence()
    }
}

impl ApplicationRepository for GatedRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn modify<F>(&self, id: &ApplicationId, change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        self.gate.wait();
        self.inner.modify(id, change)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn delete(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        self.inner.delete(id)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        self.inner.list(query)
    }

    fn stats(&self, year: i32) -> Result<ApplicationStats, RepositoryError> {
        self.inner.stats(year)
    }
}

/// Local store that writes the first document and fails every later write with an I/O error.
pub(super) struct FailingAfterFirstStore {
    pub(super) inner: LocalDocumentStore,
    writes: AtomicUsize,
}

impl FailingAfterFirstStore {
    pub(super) fn new(inner: LocalDocumentStore) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }
}

impl DocumentStore for FailingAfterFirstStore {
    fn store(
        &self,
        kind: DocumentKind,
        upload: &UploadedDocument,
    ) -> Result<StoredDocument, DocumentStoreError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
            return self.inner.store(kind, upload);
        }
        Err(DocumentStoreError::Io {
            reference: kind.field_name().to_string(),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        })
    }

    fn read(&self, reference: &str) -> Result<Vec<u8>, DocumentStoreError> {
        self.inner.read(reference)
    }

    fn exists(&self, reference: &str) -> Result<bool, DocumentStoreError> {
        self.inner.exists(reference)
    }

    fn delete(&self, reference: &str) -> Result<(), DocumentStoreError> {
        self.inner.delete(reference)
    }
}

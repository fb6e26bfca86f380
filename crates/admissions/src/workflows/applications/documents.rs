use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{DocumentKind, UploadedDocument};

/// Reference to an uploaded file that now lives in durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub kind: DocumentKind,
    pub reference: String,
    pub original_name: Option<String>,
    pub content_type: String,
    pub size: u64,
}

/// Durable file storage for application documents.
pub trait DocumentStore: Send + Sync {
    fn store(
        &self,
        kind: DocumentKind,
        upload: &UploadedDocument,
    ) -> Result<StoredDocument, DocumentStoreError>;
    fn read(&self, reference: &str) -> Result<Vec<u8>, DocumentStoreError>;
    fn exists(&self, reference: &str) -> Result<bool, DocumentStoreError>;
    /// Removing a reference that is already gone is not an error.
    fn delete(&self, reference: &str) -> Result<(), DocumentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("invalid document reference '{0}'")]
    InvalidReference(String),
    #[error("document '{0}' not found")]
    NotFound(String),
    #[error("document storage failed for '{reference}': {source}")]
    Io {
        reference: String,
        #[source]
        source: io::Error,
    },
}

/// Documents kept as plain files under one directory.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DocumentStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| DocumentStoreError::Io {
            reference: root.display().to_string(),
            source,
        })?;
        info!(root = %root.display(), "document store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf, DocumentStoreError> {
        let traversal = reference.is_empty()
            || reference.contains("..")
            || reference.contains('/')
            || reference.contains('\\');
        if traversal {
            return Err(DocumentStoreError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(reference))
    }

    fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

impl DocumentStore for LocalDocumentStore {
    fn store(
        &self,
        kind: DocumentKind,
        upload: &UploadedDocument,
    ) -> Result<StoredDocument, DocumentStoreError> {
        let extension = upload
            .file_name
            .as_deref()
            .and_then(file_extension)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let reference = format!(
            "{}-{}{}",
            kind.field_name(),
            uuid::Uuid::new_v4().simple(),
            extension
        );
        let path = self.path_for(&reference)?;

        if let Err(source) = Self::write_new(&path, &upload.bytes) {
            // A partially written file must not outlive the failed write.
            let _ = fs::remove_file(&path);
            return Err(DocumentStoreError::Io { reference, source });
        }

        let content_type = mime_guess::from_path(&reference)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        debug!(%reference, size = upload.bytes.len(), "document written");

        Ok(StoredDocument {
            kind,
            reference,
            original_name: upload.file_name.as_deref().map(sanitize_file_name),
            content_type,
            size: upload.bytes.len() as u64,
        })
    }

    fn read(&self, reference: &str) -> Result<Vec<u8>, DocumentStoreError> {
        let path = self.path_for(reference)?;
        fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => DocumentStoreError::NotFound(reference.to_string()),
            _ => DocumentStoreError::Io {
                reference: reference.to_string(),
                source,
            },
        })
    }

    fn exists(&self, reference: &str) -> Result<bool, DocumentStoreError> {
        let path = self.path_for(reference)?;
        path.try_exists().map_err(|source| DocumentStoreError::Io {
            reference: reference.to_string(),
            source,
        })
    }

    fn delete(&self, reference: &str) -> Result<(), DocumentStoreError> {
        let path = self.path_for(reference)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DocumentStoreError::Io {
                reference: reference.to_string(),
                source,
            }),
        }
    }
}

/// Files written during one submission. Dropping the guard deletes every staged file unless
/// [`StagedDocuments::commit`] handed them over to a stored record first.
pub struct StagedDocuments<'a, D: DocumentStore + ?Sized> {
    store: &'a D,
    staged: Vec<StoredDocument>,
}

impl<'a, D: DocumentStore + ?Sized> StagedDocuments<'a, D> {
    pub fn new(store: &'a D) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    pub fn stage(
        &mut self,
        kind: DocumentKind,
        upload: &UploadedDocument,
    ) -> Result<(), DocumentStoreError> {
        let stored = self.store.store(kind, upload)?;
        self.staged.push(stored);
        Ok(())
    }

    pub fn documents(&self) -> BTreeMap<DocumentKind, StoredDocument> {
        self.staged
            .iter()
            .map(|document| (document.kind, document.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Keep the staged files; the committed record now owns them.
    pub fn commit(mut self) -> Vec<StoredDocument> {
        mem::take(&mut self.staged)
    }
}

impl<D: DocumentStore + ?Sized> Drop for StagedDocuments<'_, D> {
    fn drop(&mut self) {
        for document in self.staged.drain(..) {
            match self.store.delete(&document.reference) {
                Ok(()) => debug!(reference = %document.reference, "staged document removed"),
                Err(err) => warn!(
                    reference = %document.reference,
                    error = %err,
                    "failed to remove staged document"
                ),
            }
        }
    }
}

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];
pub const DOCUMENT_EXTENSIONS: [&str; 5] = ["pdf", "doc", "docx", "txt", "rtf"];

/// Lowercased extension without the dot, if the name has a usable one.
pub fn file_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_file(file_name: &str) -> bool {
    file_extension(file_name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_document_file(file_name: &str) -> bool {
    file_extension(file_name).is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Replace anything outside `[A-Za-z0-9._-]`, collapse underscores, cap at 255 characters.
pub fn sanitize_file_name(file_name: &str) -> String {
    let mut sanitized = String::with_capacity(file_name.len());
    for c in file_name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.chars().take(255).collect()
}

/// Human readable size such as `5 MB` or `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> UploadedDocument {
        UploadedDocument {
            field_name: "photo".to_string(),
            file_name: Some(name.to_string()),
            content_type: Some("image/png".to_string()),
            bytes: b"\x89PNG fake".to_vec(),
        }
    }

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).expect("read dir").count()
    }

    #[test]
    fn store_writes_file_with_generated_reference() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalDocumentStore::open(dir.path()).expect("store opens");

        let stored = store
            .store(DocumentKind::Photo, &upload("My Photo.PNG"))
            .expect("stored");

        assert!(stored.reference.starts_with("photo-"));
        assert!(stored.reference.ends_with(".png"));
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.original_name.as_deref(), Some("My_Photo.PNG"));
        assert!(store.exists(&stored.reference).expect("exists"));
        assert_eq!(
            store.read(&stored.reference).expect("read"),
            b"\x89PNG fake".to_vec()
        );
    }

    #[test]
    fn traversal_references_are_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalDocumentStore::open(dir.path()).expect("store opens");

        for reference in ["../secret", "nested/file.pdf", "", "..\\win.pdf"] {
            assert!(matches!(
                store.read(reference),
                Err(DocumentStoreError::InvalidReference(_))
            ));
        }
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalDocumentStore::open(dir.path()).expect("store opens");
        let stored = store
            .store(DocumentKind::Photo, &upload("a.png"))
            .expect("stored");

        store.delete(&stored.reference).expect("first delete");
        store.delete(&stored.reference).expect("second delete");
        assert!(!store.exists(&stored.reference).expect("exists check"));
        assert!(matches!(
            store.read(&stored.reference),
            Err(DocumentStoreError::NotFound(_))
        ));
    }

    #[test]
    fn dropped_guard_removes_staged_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalDocumentStore::open(dir.path()).expect("store opens");

        {
            let mut staged = StagedDocuments::new(&store);
            staged
                .stage(DocumentKind::Photo, &upload("a.png"))
                .expect("stage photo");
            staged
                .stage(DocumentKind::BirthCertificate, &upload("b.pdf"))
                .expect("stage certificate");
            assert_eq!(staged.len(), 2);
            assert_eq!(files_in(dir.path()), 2);
        }

        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn committed_guard_keeps_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalDocumentStore::open(dir.path()).expect("store opens");

        let mut staged = StagedDocuments::new(&store);
        staged
            .stage(DocumentKind::Photo, &upload("a.png"))
            .expect("stage photo");
        let committed = staged.commit();

        assert_eq!(committed.len(), 1);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[test]
    fn file_helpers_classify_and_format() {
        assert!(is_image_file("portrait.JPEG"));
        assert!(!is_image_file("report.pdf"));
        assert!(is_document_file("report.pdf"));
        assert!(!is_document_file("archive.zip"));
        assert_eq!(file_extension("no_extension"), None);
        assert_eq!(sanitize_file_name("a  b/../c.pdf"), "a_b_.._c.pdf");
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::ApplicationId;
use super::repository::{
    ApplicationPage, ApplicationQuery, ApplicationRecord, ApplicationRepository, ApplicationStats,
    RepositoryError,
};
use super::sequence::SequenceCounter;

/// Process-local store used when no database is configured, and by tests.
#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryApplicationRepository {
    /// Store whose counter resumes after `last_issued`.
    pub fn starting_after(last_issued: u64) -> Self {
        Self {
            records: Arc::default(),
            sequence: Arc::new(AtomicU64::new(last_issued)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ApplicationId, ApplicationRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl SequenceCounter for InMemoryApplicationRepository {
    fn next_sequence(&self) -> Result<u64, RepositoryError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        if guard
            .values()
            .any(|existing| existing.application_number == record.application_number)
        {
            return Err(RepositoryError::DuplicateApplicationNumber(
                record.application_number,
            ));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn modify<F>(&self, id: &ApplicationId, change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        let mut guard = self.lock()?;
        let existing = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let mut record = existing.clone();
        change(&mut record);
        if record.id != existing.id || record.application_number != existing.application_number {
            return Err(RepositoryError::Conflict);
        }
        *existing = record.clone();
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn delete(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        let guard = self.lock()?;
        Ok(query.paginate(guard.values().cloned()))
    }

    fn stats(&self, year: i32) -> Result<ApplicationStats, RepositoryError> {
        let guard = self.lock()?;
        Ok(ApplicationStats::from_records(guard.values(), year))
    }
}

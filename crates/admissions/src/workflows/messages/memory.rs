use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::MessageId;
use super::repository::{MessagePage, MessageQuery, MessageRecord, MessageRepository, MessageStats};
use crate::workflows::applications::RepositoryError;

/// Process-local message store used when no database is configured, and by tests.
#[derive(Default, Clone)]
pub struct InMemoryMessageRepository {
    records: Arc<Mutex<HashMap<MessageId, MessageRecord>>>,
}

impl InMemoryMessageRepository {
    pub fn len(&self) -> usize {
        self.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<MessageId, MessageRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("message store mutex poisoned".to_string()))
    }
}

impl MessageRepository for InMemoryMessageRepository {
    fn insert(&self, record: MessageRecord) -> Result<MessageRecord, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn modify<F>(&self, id: &MessageId, change: F) -> Result<MessageRecord, RepositoryError>
    where
        F: FnOnce(&mut MessageRecord),
    {
        let mut guard = self.lock()?;
        let existing = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let mut record = existing.clone();
        change(&mut record);
        if record.id != existing.id {
            return Err(RepositoryError::Conflict);
        }
        *existing = record.clone();
        Ok(record)
    }

    fn fetch(&self, id: &MessageId) -> Result<Option<MessageRecord>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn list(&self, query: &MessageQuery) -> Result<MessagePage, RepositoryError> {
        let guard = self.lock()?;
        Ok(query.paginate(guard.values().cloned()))
    }

    fn stats(&self) -> Result<MessageStats, RepositoryError> {
        let guard = self.lock()?;
        Ok(MessageStats::from_records(guard.values()))
    }
}

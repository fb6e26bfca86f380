use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::domain::{InquiryType, MessageId, MessagePriority, MessageStatus};
use super::repository::{MessagePage, MessageQuery, MessageRecord, MessageRepository, MessageStats};
use crate::workflows::applications::RepositoryError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    inquiry_type TEXT NOT NULL,
    priority TEXT NOT NULL,
    created_at TEXT NOT NULL,
    record TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_status_created ON messages (status, created_at);
";

/// SQLite-backed message store. Shares the database file with the application store.
pub struct SqliteMessageRepository {
    connection: Mutex<Connection>,
}

impl SqliteMessageRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(unavailable)?;
        let repository = Self::initialize(connection)?;
        info!(database = %path.display(), "message store ready");
        Ok(repository)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::initialize(Connection::open_in_memory().map_err(unavailable)?)
    }

    fn initialize(connection: Connection) -> Result<Self, RepositoryError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(unavailable)?;
        connection.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.connection
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn decode(raw: &str) -> Result<MessageRecord, RepositoryError> {
        serde_json::from_str(raw)
            .map_err(|err| RepositoryError::Unavailable(format!("corrupt message row: {err}")))
    }

    fn encode(record: &MessageRecord) -> Result<String, RepositoryError> {
        serde_json::to_string(record)
            .map_err(|err| RepositoryError::Unavailable(format!("unencodable message: {err}")))
    }

    /// Run a `label, COUNT(*)` grouping and parse each label.
    fn grouped<T: Ord>(
        connection: &Connection,
        sql: &str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<BTreeMap<T, u64>, RepositoryError> {
        let mut statement = connection.prepare(sql).map_err(unavailable)?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(unavailable)?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (label, total) = row.map_err(unavailable)?;
            let key = parse(&label).ok_or_else(|| {
                RepositoryError::Unavailable(format!("unknown label '{label}' in message store"))
            })?;
            counts.insert(key, u64::try_from(total).unwrap_or(0));
        }
        Ok(counts)
    }
}

fn unavailable(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

impl MessageRepository for SqliteMessageRepository {
    fn insert(&self, record: MessageRecord) -> Result<MessageRecord, RepositoryError> {
        let encoded = Self::encode(&record)?;
        let connection = self.lock()?;
        let result = connection.execute(
            "INSERT INTO messages (id, status, inquiry_type, priority, created_at, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id.as_str(),
                record.status.label(),
                record.inquiry_type.label(),
                record.priority.label(),
                record.created_at.to_rfc3339(),
                encoded,
            ],
        );

        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RepositoryError::Conflict)
            }
            Err(err) => Err(unavailable(err)),
        }
    }

    fn modify<F>(&self, id: &MessageId, change: F) -> Result<MessageRecord, RepositoryError>
    where
        F: FnOnce(&mut MessageRecord),
    {
        let mut connection = self.lock()?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;

        let raw: Option<String> = transaction
            .query_row(
                "SELECT record FROM messages WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        let Some(raw) = raw else {
            return Err(RepositoryError::NotFound);
        };

        let mut record = Self::decode(&raw)?;
        change(&mut record);
        if &record.id != id {
            return Err(RepositoryError::Conflict);
        }

        let encoded = Self::encode(&record)?;
        transaction
            .execute(
                "UPDATE messages SET status = ?1, inquiry_type = ?2, priority = ?3, record = ?4
                 WHERE id = ?5",
                params![
                    record.status.label(),
                    record.inquiry_type.label(),
                    record.priority.label(),
                    encoded,
                    id.as_str(),
                ],
            )
            .map_err(unavailable)?;
        transaction.commit().map_err(unavailable)?;
        Ok(record)
    }

    fn fetch(&self, id: &MessageId) -> Result<Option<MessageRecord>, RepositoryError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT record FROM messages WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        raw.as_deref().map(Self::decode).transpose()
    }

    fn list(&self, query: &MessageQuery) -> Result<MessagePage, RepositoryError> {
        let mut sql = String::from("SELECT record FROM messages");
        let mut filters = Vec::new();
        let mut values: Vec<&'static str> = Vec::new();
        if let Some(status) = query.status {
            filters.push(format!("status = ?{}", values.len() + 1));
            values.push(status.label());
        }
        if let Some(kind) = query.inquiry_type {
            filters.push(format!("inquiry_type = ?{}", values.len() + 1));
            values.push(kind.label());
        }
        if let Some(priority) = query.priority {
            filters.push(format!("priority = ?{}", values.len() + 1));
            values.push(priority.label());
        }
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }

        let connection = self.lock()?;
        let mut statement = connection.prepare(&sql).map_err(unavailable)?;
        let rows = statement
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))
            .map_err(unavailable)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(Self::decode(&raw.map_err(unavailable)?)?);
        }
        Ok(query.paginate(records))
    }

    fn stats(&self) -> Result<MessageStats, RepositoryError> {
        let connection = self.lock()?;
        let by_status: HashMap<MessageStatus, u64> = Self::grouped(
            &connection,
            "SELECT status, COUNT(*) FROM messages GROUP BY status",
            MessageStatus::parse,
        )?
        .into_iter()
        .collect();
        let by_type = Self::grouped(
            &connection,
            "SELECT inquiry_type, COUNT(*) FROM messages GROUP BY inquiry_type",
            InquiryType::parse,
        )?;
        let by_priority = Self::grouped(
            &connection,
            "SELECT priority, COUNT(*) FROM messages GROUP BY priority",
            MessagePriority::parse,
        )?;
        Ok(MessageStats::from_counts(&by_status, by_type, by_priority))
    }
}

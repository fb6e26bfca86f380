use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Datelike;
use rusqlite::{
    ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, TransactionBehavior,
};
use tracing::info;

use super::domain::{ApplicationId, ApplicationStatus, GradeLevel};
use super::repository::{
    ApplicationPage, ApplicationQuery, ApplicationRecord, ApplicationRepository, ApplicationStats,
    RepositoryError,
};
use super::sequence::SequenceCounter;

const APPLICATION_NUMBER_COUNTER: &str = "application_number";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    application_number TEXT NOT NULL UNIQUE,
    sequence INTEGER NOT NULL,
    status TEXT NOT NULL,
    grade_level TEXT NOT NULL,
    submitted_year INTEGER NOT NULL,
    submitted_month INTEGER NOT NULL,
    submitted_at TEXT NOT NULL,
    record TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS applications_status_idx ON applications (status, submitted_at);
CREATE INDEX IF NOT EXISTS applications_grade_idx ON applications (grade_level);
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

/// SQLite-backed store. The application-number counter lives in the `sequences` table and is
/// advanced with a single `UPDATE .. RETURNING`, which is atomic across every connection to the
/// same database file.
pub struct SqliteApplicationRepository {
    connection: Mutex<Connection>,
}

impl SqliteApplicationRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(unavailable)?;
        let repository = Self::initialize(connection)?;
        info!(database = %path.display(), "application store ready");
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
        // Seed from the highest number ever stored so an older database keeps counting upward.
        connection
            .execute(
                "INSERT OR IGNORE INTO sequences (name, value)
                 SELECT ?1, COALESCE(MAX(sequence), 0) FROM applications",
                params![APPLICATION_NUMBER_COUNTER],
            )
            .map_err(unavailable)?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.connection
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn decode(raw: &str) -> Result<ApplicationRecord, RepositoryError> {
        serde_json::from_str(raw)
            .map_err(|err| RepositoryError::Unavailable(format!("corrupt application row: {err}")))
    }

    fn encode(record: &ApplicationRecord) -> Result<String, RepositoryError> {
        serde_json::to_string(record)
            .map_err(|err| RepositoryError::Unavailable(format!("unencodable application: {err}")))
    }
}

fn unavailable(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SequenceCounter for SqliteApplicationRepository {
    fn next_sequence(&self) -> Result<u64, RepositoryError> {
        let connection = self.lock()?;
        let value: i64 = connection
            .query_row(
                "UPDATE sequences SET value = value + 1 WHERE name = ?1 RETURNING value",
                params![APPLICATION_NUMBER_COUNTER],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        Ok(count(value))
    }
}

impl ApplicationRepository for SqliteApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let encoded = Self::encode(&record)?;
        let connection = self.lock()?;
        let result = connection.execute(
            "INSERT INTO applications (
                id, application_number, sequence, status, grade_level,
                submitted_year, submitted_month, submitted_at, record
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.as_str(),
                record.application_number.to_string(),
                to_i64(record.application_number.sequence()),
                record.status.label(),
                record.academic_info.grade_level.label(),
                record.submitted_at.year(),
                record.submitted_at.month(),
                record.submitted_at.to_rfc3339(),
                encoded,
            ],
        );

        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(failure, message))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                let message = message.unwrap_or_default();
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    && message.contains("application_number")
                {
                    Err(RepositoryError::DuplicateApplicationNumber(
                        record.application_number,
                    ))
                } else {
                    Err(RepositoryError::Conflict)
                }
            }
            Err(err) => Err(unavailable(err)),
        }
    }

    fn modify<F>(&self, id: &ApplicationId, change: F) -> Result<ApplicationRecord, RepositoryError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        let mut connection = self.lock()?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;

        let raw: Option<String> = transaction
            .query_row(
                "SELECT record FROM applications WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        let Some(raw) = raw else {
            return Err(RepositoryError::NotFound);
        };

        let stored = Self::decode(&raw)?;
        let mut record = stored.clone();
        change(&mut record);
        if record.id != stored.id || record.application_number != stored.application_number {
            return Err(RepositoryError::Conflict);
        }

        let encoded = Self::encode(&record)?;
        transaction
            .execute(
                "UPDATE applications SET status = ?1, grade_level = ?2, record = ?3 WHERE id = ?4",
                params![
                    record.status.label(),
                    record.academic_info.grade_level.label(),
                    encoded,
                    record.id.as_str(),
                ],
            )
            .map_err(unavailable)?;
        transaction.commit().map_err(unavailable)?;
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let connection = self.lock()?;
        let raw: Option<String> = connection
            .query_row(
                "SELECT record FROM applications WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        raw.as_deref().map(Self::decode).transpose()
    }

    fn delete(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        let connection = self.lock()?;
        let removed = connection
            .execute("DELETE FROM applications WHERE id = ?1", params![id.as_str()])
            .map_err(unavailable)?;
        Ok(removed > 0)
    }

    fn list(&self, query: &ApplicationQuery) -> Result<ApplicationPage, RepositoryError> {
        let mut sql = String::from("SELECT record FROM applications");
        let mut filters = Vec::new();
        let mut values = Vec::new();
        if let Some(status) = query.status {
            filters.push("status = ?");
            values.push(status.label());
        }
        if let Some(grade) = query.grade_level {
            filters.push("grade_level = ?");
            values.push(grade.label());
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

    fn stats(&self, year: i32) -> Result<ApplicationStats, RepositoryError> {
        let connection = self.lock()?;

        let mut by_status = HashMap::new();
        let mut statement = connection
            .prepare("SELECT status, COUNT(*) FROM applications GROUP BY status")
            .map_err(unavailable)?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(unavailable)?;
        for row in rows {
            let (label, total) = row.map_err(unavailable)?;
            let status = ApplicationStatus::parse(&label).ok_or_else(|| {
                RepositoryError::Unavailable(format!("unknown status '{label}' in store"))
            })?;
            by_status.insert(status, count(total));
        }

        let mut by_grade = BTreeMap::new();
        let mut statement = connection
            .prepare("SELECT grade_level, COUNT(*) FROM applications GROUP BY grade_level")
            .map_err(unavailable)?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(unavailable)?;
        for row in rows {
            let (label, total) = row.map_err(unavailable)?;
            let grade = GradeLevel::parse(&label).ok_or_else(|| {
                RepositoryError::Unavailable(format!("unknown grade level '{label}' in store"))
            })?;
            by_grade.insert(grade, count(total));
        }

        let mut by_month = BTreeMap::new();
        let mut statement = connection
            .prepare(
                "SELECT submitted_month, COUNT(*) FROM applications
                 WHERE submitted_year = ?1 GROUP BY submitted_month",
            )
            .map_err(unavailable)?;
        let rows = statement
            .query_map(params![year], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(unavailable)?;
        for row in rows {
            let (month, total) = row.map_err(unavailable)?;
            by_month.insert(month, count(total));
        }

        Ok(ApplicationStats::from_counts(&by_status, by_grade, by_month))
    }
}

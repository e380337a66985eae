//! Storage layer for the work timer.
//!
//! Implements [`wt_core::Store`] on top of `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The timer engine keeps its store behind a `Mutex`, so a single `Database` is
//! shared by the control thread and the autosave thread.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with microseconds
//! (e.g., `2024-01-15T10:30:00.000000Z`). This format ensures:
//! - Lexicographic ordering matches chronological ordering
//! - Human-readable values in the database
//! - Timezone-aware (always UTC)
//!
//! ## Default Rate
//!
//! The default hourly rate lives in the `config` table under the `rate` key.
//! A database without that row reports the fallback rate given to
//! [`Database::with_fallback_rate`] (zero unless set).

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

use wt_core::{
    InvalidInterval, Project, ProjectId, ProjectPatch, Rate, RecordId, StorageError, Store,
    ValidationError, WorkRecord,
};

const DEFAULT_RATE_KEY: &str = "rate";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for work record {record_id}: {timestamp}")]
    TimestampParse {
        record_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored record ends before it starts.
    #[error("invalid interval for work record {record_id}")]
    InvalidInterval {
        record_id: i64,
        #[source]
        source: InvalidInterval,
    },
    /// A stored rate is negative or not a number.
    #[error("invalid rate {value:?}")]
    InvalidRate {
        value: String,
        #[source]
        source: ValidationError,
    },
}

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        Self::backend(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    fallback_rate: Rate,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            fallback_rate: Rate::ZERO,
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn,
            fallback_rate: Rate::ZERO,
        };
        db.init()?;
        Ok(db)
    }

    /// Sets the default rate reported when none has been saved.
    #[must_use]
    pub const fn with_fallback_rate(mut self, rate: Rate) -> Self {
        self.fallback_rate = rate;
        self
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS config (
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS project (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                rate REAL NOT NULL
            );

            -- start_at/end_at: RFC 3339 UTC (e.g., '2024-01-15T10:30:00.000000Z')
            -- end_at starts equal to start_at and moves forward while timing
            CREATE TABLE IF NOT EXISTS work_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                project_id INTEGER NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES project(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_work_record_project ON work_record(project_id);
            ",
        )?;
        Ok(())
    }

    /// Lists all projects with their records, in creation order.
    pub fn list_projects(&self) -> Result<Vec<Project>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, active, rate FROM project ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let active: bool = row.get(2)?;
            let rate: f64 = row.get(3)?;
            Ok((id, name, active, rate))
        })?;
        let mut projects = Vec::new();
        for row in rows {
            let (id, name, active, rate) = row?;
            let rate = parse_rate(rate)?;
            let mut project = Project::new(ProjectId::from(id), name, rate);
            project.active = active;
            projects.push(project);
        }

        let mut stmt = self.conn.prepare(
            "
            SELECT id, project_id, start_at, end_at
            FROM work_record
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let project_id: i64 = row.get(1)?;
            let start: String = row.get(2)?;
            let end: String = row.get(3)?;
            Ok((id, project_id, start, end))
        })?;
        for row in rows {
            let (id, project_id, start, end) = row?;
            let start = parse_timestamp(&start, id)?;
            let end = parse_timestamp(&end, id)?;
            let record = WorkRecord::from_parts(RecordId::from(id), start, end)
                .map_err(|source| DbError::InvalidInterval {
                    record_id: id,
                    source,
                })?;
            if let Some(project) = projects.iter_mut().find(|p| p.id.get() == project_id) {
                project.records.push(record);
            }
        }
        Ok(projects)
    }

    /// Reads the saved default rate, if any.
    pub fn default_rate(&self) -> Result<Option<Rate>, DbError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?",
                [DEFAULT_RATE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|value| {
                value.parse::<Rate>().map_err(|source| DbError::InvalidRate {
                    value,
                    source,
                })
            })
            .transpose()
    }

    /// Saves the default rate.
    pub fn set_default_rate(&self, rate: Rate) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO config (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            ",
            params![DEFAULT_RATE_KEY, rate.value().to_string()],
        )?;
        Ok(())
    }

    /// Inserts an active project.
    pub fn insert_project(&self, name: &str, rate: Rate) -> Result<Project, DbError> {
        self.conn.execute(
            "INSERT INTO project (name, active, rate) VALUES (?, 1, ?)",
            params![name, rate.value()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(project = id, "project inserted");
        Ok(Project::new(ProjectId::from(id), name.to_string(), rate))
    }

    /// Applies a partial update. Returns the number of rows changed.
    pub fn patch_project(&self, id: ProjectId, patch: &ProjectPatch) -> Result<usize, DbError> {
        let rate = patch.rate.map(Rate::value);
        let changed = self.conn.execute(
            "
            UPDATE project SET
                name = COALESCE(?, name),
                rate = COALESCE(?, rate),
                active = COALESCE(?, active)
            WHERE id = ?
            ",
            params![patch.name, rate, patch.active, id.get()],
        )?;
        Ok(changed)
    }

    /// Inserts a record with `end_at == start_at`.
    pub fn insert_work_record(
        &self,
        project: ProjectId,
        start: DateTime<Utc>,
    ) -> Result<WorkRecord, DbError> {
        let start = truncate_to_stored(start);
        let timestamp = format_timestamp(start);
        self.conn.execute(
            "INSERT INTO work_record (project_id, start_at, end_at) VALUES (?, ?, ?)",
            params![project.get(), timestamp, timestamp],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(record = id, project = %project, "work record inserted");
        Ok(WorkRecord::new(RecordId::from(id), start))
    }

    /// Moves a record's end. Returns the number of rows changed.
    pub fn set_work_record_end(&self, id: RecordId, end: DateTime<Utc>) -> Result<usize, DbError> {
        let changed = self.conn.execute(
            "UPDATE work_record SET end_at = ? WHERE id = ?",
            params![format_timestamp(end), id.get()],
        )?;
        Ok(changed)
    }
}

impl Store for Database {
    fn load_all(&self) -> Result<Vec<Project>, StorageError> {
        Ok(self.list_projects()?)
    }

    fn load_default_rate(&self) -> Result<Rate, StorageError> {
        Ok(self.default_rate()?.unwrap_or(self.fallback_rate))
    }

    fn save_default_rate(&mut self, rate: Rate) -> Result<(), StorageError> {
        Ok(self.set_default_rate(rate)?)
    }

    fn create_project(&mut self, name: &str, rate: Rate) -> Result<Project, StorageError> {
        Ok(self.insert_project(name, rate)?)
    }

    fn update_project(&mut self, id: ProjectId, patch: &ProjectPatch) -> Result<(), StorageError> {
        if self.patch_project(id, patch)? == 0 {
            return Err(StorageError::NotFound {
                entity: "project",
                id: id.get(),
            });
        }
        Ok(())
    }

    fn create_work_record(
        &mut self,
        project: ProjectId,
        start: DateTime<Utc>,
    ) -> Result<WorkRecord, StorageError> {
        match self.insert_work_record(project, start) {
            Ok(record) => Ok(record),
            Err(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::NotFound {
                    entity: "project",
                    id: project.get(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_work_record_end(
        &mut self,
        id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if self.set_work_record_end(id, end)? == 0 {
            return Err(StorageError::NotFound {
                entity: "work record",
                id: id.get(),
            });
        }
        Ok(())
    }
}

fn parse_rate(value: f64) -> Result<Rate, DbError> {
    Rate::new(value).map_err(|source| DbError::InvalidRate {
        value: value.to_string(),
        source,
    })
}

fn parse_timestamp(timestamp: &str, record_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drops precision the stored form cannot hold, so the returned record
/// equals what a later load reads back.
fn truncate_to_stored(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    parse_timestamp(&format_timestamp(timestamp), 0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn rate(value: f64) -> Rate {
        Rate::new(value).unwrap()
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(table_columns(&db.conn, "config"), vec!["key", "value"]);
        assert_eq!(
            table_columns(&db.conn, "project"),
            vec!["id", "name", "active", "rate"]
        );
        assert_eq!(
            table_columns(&db.conn, "work_record"),
            vec!["id", "project_id", "start_at", "end_at"]
        );
    }

    #[test]
    fn init_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("wt.db");
        let mut db = Database::open(&path).unwrap();
        db.create_project("Acme", rate(500.0)).unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load_all().unwrap().len(), 1);
    }

    #[test]
    fn projects_round_trip_with_records_in_order() {
        let mut db = Database::open_in_memory().unwrap();
        let acme = db.create_project("Acme", rate(500.0)).unwrap();
        let other = db.create_project("Other", rate(100.0)).unwrap();

        let first = db.create_work_record(acme.id, t0()).unwrap();
        db.create_work_record(other.id, t0() + Duration::minutes(5))
            .unwrap();
        let second = db
            .create_work_record(acme.id, t0() + Duration::hours(1))
            .unwrap();
        db.update_work_record_end(first.id, t0() + Duration::seconds(125))
            .unwrap();

        let projects = db.load_all().unwrap();
        assert_eq!(projects.len(), 2);
        let acme = &projects[0];
        assert_eq!(acme.name, "Acme");
        assert!(acme.active);
        assert_eq!(acme.rate, rate(500.0));
        let ids: Vec<RecordId> = acme.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(acme.records[0].elapsed_seconds(), 125);
        assert_eq!(acme.records[1].start(), acme.records[1].end());
        assert_eq!(projects[1].records.len(), 1);
    }

    #[test]
    fn sub_second_precision_survives_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let project = db.create_project("Acme", Rate::ZERO).unwrap();
        let start = t0() + Duration::microseconds(250_001);
        let record = db.create_work_record(project.id, start).unwrap();
        db.update_work_record_end(record.id, start + Duration::milliseconds(1_999))
            .unwrap();

        let loaded = &db.load_all().unwrap()[0].records[0];
        assert_eq!(loaded.start(), record.start());
        assert_eq!(loaded.elapsed_seconds(), 1);
    }

    #[test]
    fn patch_leaves_unspecified_fields() {
        let mut db = Database::open_in_memory().unwrap();
        let project = db.create_project("Acme", rate(500.0)).unwrap();

        db.update_project(project.id, &ProjectPatch::rate(Rate::ZERO))
            .unwrap();
        db.update_project(project.id, &ProjectPatch::finished())
            .unwrap();

        let loaded = &db.load_all().unwrap()[0];
        assert_eq!(loaded.name, "Acme");
        assert_eq!(loaded.rate, Rate::ZERO);
        assert!(!loaded.active);
    }

    #[test]
    fn default_rate_falls_back_until_saved() {
        let mut db = Database::open_in_memory()
            .unwrap()
            .with_fallback_rate(rate(300.0));
        assert_eq!(db.load_default_rate().unwrap(), rate(300.0));

        db.save_default_rate(rate(450.5)).unwrap();
        db.save_default_rate(rate(475.25)).unwrap();
        assert_eq!(db.load_default_rate().unwrap(), rate(475.25));

        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM config", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn corrupt_default_rate_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute("INSERT INTO config (key, value) VALUES ('rate', 'lots')", [])
            .unwrap();
        let err = db.load_default_rate().unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[test]
    fn missing_rows_are_not_found() {
        let mut db = Database::open_in_memory().unwrap();
        let err = db
            .update_project(ProjectId::from(7), &ProjectPatch::name("x"))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "project", id: 7 }));

        let err = db
            .update_work_record_end(RecordId::from(3), t0())
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "work record", id: 3 }));

        let err = db.create_work_record(ProjectId::from(42), t0()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "project", id: 42 }));
    }

    #[test]
    fn reversed_stored_interval_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute("INSERT INTO project (name, rate) VALUES ('Acme', 1.0)", [])
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO work_record (project_id, start_at, end_at)
                 VALUES (1, '2025-03-10T09:00:10.000000Z', '2025-03-10T09:00:00.000000Z')",
                [],
            )
            .unwrap();
        let err = db.list_projects().unwrap_err();
        assert!(matches!(err, DbError::InvalidInterval { record_id: 1, .. }));
    }
}

//! SQLite backend.
//!
//! One connection behind a mutex; every transaction is `BEGIN IMMEDIATE`
//! so concurrent processes sharing the file serialize their writes.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use super::{Backend, NewRun, NewValue, Transaction};
use crate::experiment::{
    ExperimentId, ExperimentRecord, KeyedValue, NewVariable, RunId, RunRecord, ValueId,
    ValueRecord, VariableId, VariableRecord, VariableType,
};
use crate::value::LogValue;
use crate::{Error, Result};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS experiment (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    description  TEXT,
    artifact_uri TEXT
);

CREATE TABLE IF NOT EXISTS run (
    id            INTEGER PRIMARY KEY,
    experiment_id INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    description   TEXT,
    created_at    TEXT NOT NULL,
    uuid          TEXT NOT NULL UNIQUE
);
CREATE INDEX IF NOT EXISTS run_experiment ON run(experiment_id);

CREATE TABLE IF NOT EXISTS variable (
    id            INTEGER PRIMARY KEY,
    experiment_id INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE,
    "key"         TEXT NOT NULL,
    parent_id     INTEGER REFERENCES variable(id) ON DELETE CASCADE,
    "type"        TEXT NOT NULL,
    is_step       INTEGER
);
-- NULL parents must collide with each other, which a plain UNIQUE would not do.
CREATE UNIQUE INDEX IF NOT EXISTS variable_identity
    ON variable(experiment_id, "key", IFNULL(parent_id, 0));

CREATE TABLE IF NOT EXISTS "value" (
    id          INTEGER PRIMARY KEY,
    run_id      INTEGER NOT NULL REFERENCES run(id) ON DELETE CASCADE,
    variable_id INTEGER NOT NULL REFERENCES variable(id) ON DELETE CASCADE,
    value_json  TEXT NOT NULL,
    "timestamp" TEXT NOT NULL,
    step_id     INTEGER REFERENCES "value"(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS value_run ON "value"(run_id, variable_id);
CREATE INDEX IF NOT EXISTS value_step ON "value"(step_id);
"#;

const EXPERIMENT_COLUMNS: &str = "id, name, description, artifact_uri";
const RUN_COLUMNS: &str = "id, experiment_id, name, description, created_at, uuid";
const VARIABLE_COLUMNS: &str = r#"id, experiment_id, "key", parent_id, "type", is_step"#;
const VALUE_COLUMNS: &str = r#"v.id, v.run_id, v.variable_id, v.value_json, v."timestamp", v.step_id"#;

/// SQLite tracking backend.
///
/// # Example
///
/// ```rust
/// use trueno_track::backend::SqliteBackend;
/// use trueno_track::TrackingStore;
///
/// let store = TrackingStore::new(SqliteBackend::open_in_memory()?);
/// store.create_experiment("mnist", None)?;
/// # Ok::<(), trueno_track::Error>(())
/// ```
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or the schema applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Backend for SqliteBackend {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Storage("sqlite connection mutex poisoned".to_string()))?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction { conn, done: false }))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(error) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %error, "sqlite rollback failed");
        }
    }
}

/// Map a unique-constraint failure to [`Error::Conflict`].
fn unique_conflict(err: rusqlite::Error, what: impl FnOnce() -> String) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
        {
            Error::Conflict(what())
        }
        other => Error::Sqlite(other),
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp '{text}': {e}")))
}

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<ExperimentRecord> {
    Ok(ExperimentRecord::builder(ExperimentId::new(row.get(0)?), row.get::<_, String>(1)?)
        .description(row.get(2)?)
        .artifact_uri(row.get(3)?)
        .build())
}

/// Run row before text columns are decoded.
struct RunRow {
    id: i64,
    experiment_id: i64,
    name: String,
    description: Option<String>,
    created_at: String,
    uuid: String,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            experiment_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            uuid: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<RunRecord> {
        let uuid = Uuid::parse_str(&self.uuid)
            .map_err(|e| Error::Storage(format!("bad run uuid '{}': {e}", self.uuid)))?;
        Ok(
            RunRecord::builder(RunId::new(self.id), ExperimentId::new(self.experiment_id), self.name)
                .description(self.description)
                .created_at(parse_time(&self.created_at)?)
                .uuid(uuid)
                .build(),
        )
    }
}

/// Variable row before the type column is decoded.
struct VariableRow {
    id: i64,
    experiment_id: i64,
    key: String,
    parent_id: Option<i64>,
    kind: String,
    is_step: Option<bool>,
}

impl VariableRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            experiment_id: row.get(1)?,
            key: row.get(2)?,
            parent_id: row.get(3)?,
            kind: row.get(4)?,
            is_step: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<VariableRecord> {
        Ok(VariableRecord::new(
            VariableId::new(self.id),
            ExperimentId::new(self.experiment_id),
            self.key,
            self.parent_id.map(VariableId::new),
            VariableType::from_str(&self.kind)?,
            self.is_step,
        ))
    }
}

/// Value row (optionally joined with its variable) before decoding.
struct ValueRow {
    id: i64,
    run_id: i64,
    variable_id: i64,
    value_json: String,
    timestamp: String,
    step_id: Option<i64>,
    key: Option<String>,
    kind: Option<String>,
}

impl ValueRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            variable_id: row.get(2)?,
            value_json: row.get(3)?,
            timestamp: row.get(4)?,
            step_id: row.get(5)?,
            key: None,
            kind: None,
        })
    }

    fn from_joined_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut value = Self::from_row(row)?;
        value.key = Some(row.get(6)?);
        value.kind = Some(row.get(7)?);
        Ok(value)
    }

    fn into_record(self) -> Result<ValueRecord> {
        Ok(ValueRecord::new(
            ValueId::new(self.id),
            RunId::new(self.run_id),
            VariableId::new(self.variable_id),
            LogValue::from_json_str(&self.value_json)?,
            parse_time(&self.timestamp)?,
            self.step_id.map(ValueId::new),
        ))
    }

    fn into_keyed(mut self) -> Result<KeyedValue> {
        let key = self.key.take().unwrap_or_default();
        let kind = VariableType::from_str(self.kind.as_deref().unwrap_or("unknown"))?;
        Ok(KeyedValue {
            record: self.into_record()?,
            key,
            kind,
        })
    }
}

impl SqliteTransaction<'_> {
    fn query_runs(&self, sql: &str, experiment_id: ExperimentId) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([experiment_id.get()], RunRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RunRow::into_record).collect()
    }

    fn query_keyed(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<KeyedValue>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, ValueRow::from_joined_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ValueRow::into_keyed).collect()
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }

    fn insert_experiment(
        &mut self,
        name: &str,
        description: Option<&str>,
        artifact_uri: Option<&str>,
    ) -> Result<ExperimentRecord> {
        self.conn
            .execute(
                "INSERT INTO experiment (name, description, artifact_uri) VALUES (?1, ?2, ?3)",
                params![name, description, artifact_uri],
            )
            .map_err(|e| unique_conflict(e, || format!("experiment name '{name}'")))?;
        let id = ExperimentId::new(self.conn.last_insert_rowid());
        Ok(ExperimentRecord::builder(id, name)
            .description(description.map(ToString::to_string))
            .artifact_uri(artifact_uri.map(ToString::to_string))
            .build())
    }

    fn experiment_by_id(&mut self, id: ExperimentId) -> Result<Option<ExperimentRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE id = ?1"),
                [id.get()],
                experiment_from_row,
            )
            .optional()?)
    }

    fn experiment_by_name(&mut self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE name = ?1"),
                [name],
                experiment_from_row,
            )
            .optional()?)
    }

    fn list_experiments(&mut self) -> Result<Vec<ExperimentRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment ORDER BY id"))?;
        let rows = stmt
            .query_map([], experiment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn rename_experiment(&mut self, id: ExperimentId, name: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE experiment SET name = ?1 WHERE id = ?2",
                params![name, id.get()],
            )
            .map_err(|e| unique_conflict(e, || format!("experiment name '{name}'")))?;
        Ok(changed > 0)
    }

    fn set_artifact_uri(&mut self, id: ExperimentId, uri: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE experiment SET artifact_uri = ?1 WHERE id = ?2",
            params![uri, id.get()],
        )?;
        Ok(changed > 0)
    }

    fn delete_experiment(&mut self, id: ExperimentId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM experiment WHERE id = ?1", [id.get()])?;
        Ok(changed > 0)
    }

    fn insert_run(&mut self, run: NewRun<'_>) -> Result<RunRecord> {
        self.conn.execute(
            "INSERT INTO run (experiment_id, name, description, created_at, uuid)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.experiment_id.get(),
                run.name,
                run.description,
                run.created_at.to_rfc3339(),
                run.uuid.to_string(),
            ],
        )?;
        let id = RunId::new(self.conn.last_insert_rowid());
        Ok(RunRecord::builder(id, run.experiment_id, run.name)
            .description(run.description.map(ToString::to_string))
            .created_at(run.created_at)
            .uuid(run.uuid)
            .build())
    }

    fn run_by_id(&mut self, id: RunId) -> Result<Option<RunRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM run WHERE id = ?1"),
                [id.get()],
                RunRow::from_row,
            )
            .optional()?
            .map(RunRow::into_record)
            .transpose()
    }

    fn runs_for_experiment(&mut self, experiment_id: ExperimentId) -> Result<Vec<RunRecord>> {
        self.query_runs(
            &format!("SELECT {RUN_COLUMNS} FROM run WHERE experiment_id = ?1 ORDER BY id"),
            experiment_id,
        )
    }

    fn set_run_description(&mut self, id: RunId, description: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE run SET description = ?1 WHERE id = ?2",
            params![description, id.get()],
        )?;
        Ok(changed > 0)
    }

    fn delete_run(&mut self, id: RunId) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM run WHERE id = ?1", [id.get()])?;
        Ok(changed > 0)
    }

    fn insert_variable(&mut self, variable: NewVariable<'_>) -> Result<VariableRecord> {
        self.conn
            .execute(
                r#"INSERT INTO variable (experiment_id, "key", parent_id, "type", is_step)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    variable.experiment_id.get(),
                    variable.key,
                    variable.parent_id.map(VariableId::get),
                    variable.kind.as_str(),
                    variable.is_step,
                ],
            )
            .map_err(|e| {
                unique_conflict(e, || {
                    format!(
                        "variable '{}' (parent {:?}) in experiment {}",
                        variable.key, variable.parent_id, variable.experiment_id
                    )
                })
            })?;
        Ok(VariableRecord::new(
            VariableId::new(self.conn.last_insert_rowid()),
            variable.experiment_id,
            variable.key,
            variable.parent_id,
            variable.kind,
            variable.is_step,
        ))
    }

    fn find_variable(
        &mut self,
        experiment_id: ExperimentId,
        key: &str,
        parent_id: Option<VariableId>,
    ) -> Result<Option<VariableRecord>> {
        self.conn
            .query_row(
                &format!(
                    r#"SELECT {VARIABLE_COLUMNS} FROM variable
                       WHERE experiment_id = ?1 AND "key" = ?2 AND parent_id IS ?3"#
                ),
                params![experiment_id.get(), key, parent_id.map(VariableId::get)],
                VariableRow::from_row,
            )
            .optional()?
            .map(VariableRow::into_record)
            .transpose()
    }

    fn variable_by_id(&mut self, id: VariableId) -> Result<Option<VariableRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {VARIABLE_COLUMNS} FROM variable WHERE id = ?1"),
                [id.get()],
                VariableRow::from_row,
            )
            .optional()?
            .map(VariableRow::into_record)
            .transpose()
    }

    fn promote_step(&mut self, id: VariableId) -> Result<()> {
        let changed = self
            .conn
            .execute("UPDATE variable SET is_step = 1 WHERE id = ?1", [id.get()])?;
        if changed == 0 {
            return Err(Error::not_found(format!("variable {id}")));
        }
        Ok(())
    }

    fn insert_value(&mut self, value: NewValue<'_>) -> Result<ValueRecord> {
        self.conn.execute(
            r#"INSERT INTO "value" (run_id, variable_id, value_json, "timestamp", step_id)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                value.run_id.get(),
                value.variable_id.get(),
                value.value.to_json_string()?,
                value.timestamp.to_rfc3339(),
                value.step_id.map(ValueId::get),
            ],
        )?;
        Ok(ValueRecord::new(
            ValueId::new(self.conn.last_insert_rowid()),
            value.run_id,
            value.variable_id,
            value.value.clone(),
            value.timestamp,
            value.step_id,
        ))
    }

    fn value_by_id(&mut self, id: ValueId) -> Result<Option<ValueRecord>> {
        self.conn
            .query_row(
                &format!(r#"SELECT {VALUE_COLUMNS} FROM "value" v WHERE v.id = ?1"#),
                [id.get()],
                ValueRow::from_row,
            )
            .optional()?
            .map(ValueRow::into_record)
            .transpose()
    }

    fn find_values(
        &mut self,
        run_id: RunId,
        variable_id: VariableId,
        step_id: Option<ValueId>,
    ) -> Result<Vec<ValueRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {VALUE_COLUMNS} FROM "value" v
               WHERE v.run_id = ?1 AND v.variable_id = ?2 AND v.step_id IS ?3
               ORDER BY v.id"#
        ))?;
        let rows = stmt
            .query_map(
                params![run_id.get(), variable_id.get(), step_id.map(ValueId::get)],
                ValueRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ValueRow::into_record).collect()
    }

    fn run_values(&mut self, run_id: RunId) -> Result<Vec<KeyedValue>> {
        self.query_keyed(
            &format!(
                r#"SELECT {VALUE_COLUMNS}, var."key", var."type"
                   FROM "value" v JOIN variable var ON var.id = v.variable_id
                   WHERE v.run_id = ?1
                   ORDER BY v.id"#
            ),
            [run_id.get()],
        )
    }

    fn experiment_values(
        &mut self,
        experiment_id: ExperimentId,
        kind: Option<VariableType>,
    ) -> Result<Vec<KeyedValue>> {
        self.query_keyed(
            &format!(
                r#"SELECT {VALUE_COLUMNS}, var."key", var."type"
                   FROM "value" v
                   JOIN variable var ON var.id = v.variable_id
                   JOIN run r ON r.id = v.run_id
                   WHERE r.experiment_id = ?1 AND (?2 IS NULL OR var."type" = ?2)
                   ORDER BY v.id"#
            ),
            params![experiment_id.get(), kind.map(VariableType::as_str)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.db");
        drop(SqliteBackend::open(&path).unwrap());
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.name(), "sqlite");
    }

    #[test]
    fn test_null_parent_is_unique() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut tx = backend.begin().unwrap();
        let exp = tx.insert_experiment("exp", None, None).unwrap();
        let new = NewVariable {
            experiment_id: exp.id(),
            key: "lr",
            parent_id: None,
            kind: VariableType::Parameter,
            is_step: None,
        };
        tx.insert_variable(new.clone()).unwrap();
        assert!(tx.insert_variable(new).unwrap_err().is_conflict());
    }

    #[test]
    fn test_rollback_on_drop() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        {
            let mut tx = backend.begin().unwrap();
            tx.insert_experiment("exp", None, None).unwrap();
        }
        let mut tx = backend.begin().unwrap();
        assert!(tx.experiment_by_name("exp").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_experiment_is_conflict() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut tx = backend.begin().unwrap();
        tx.insert_experiment("exp", None, None).unwrap();
        assert!(tx.insert_experiment("exp", None, None).unwrap_err().is_conflict());
    }
}

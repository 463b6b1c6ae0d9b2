//! SQLite store backend.
//!
//! Dates are stored as `YYYY-MM-DD`, timestamps as RFC 3339 text keeping
//! the offset they were written with, so a calendar date read back is the
//! one that was stored. The blocking `rusqlite` connection is driven from
//! `spawn_blocking`.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::StoreBackend;
use crate::error::{DaybookError, IntoDaybookError, Result};
use crate::model::{
    ActionableInstance, CoverageRequest, CoverageRequestId, InstanceId, InstanceKey, InstanceNote,
    NoteId, UserId,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS instances (
      id TEXT PRIMARY KEY,
      user_id TEXT NOT NULL,
      kind TEXT NOT NULL,
      entity_id TEXT NOT NULL,
      date TEXT NOT NULL,
      status TEXT NOT NULL DEFAULT 'pending',
      assignee_override TEXT,
      deferred_to TEXT,
      completed_at TEXT,
      skipped_at TEXT,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS instances_user_date
      ON instances (user_id, date);

    CREATE TABLE IF NOT EXISTS instance_notes (
      id TEXT PRIMARY KEY,
      instance_id TEXT NOT NULL,
      author TEXT NOT NULL,
      text TEXT NOT NULL,
      created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS instance_notes_instance
      ON instance_notes (instance_id);

    CREATE TABLE IF NOT EXISTS coverage_requests (
      id TEXT PRIMARY KEY,
      instance_id TEXT NOT NULL,
      requested_by TEXT NOT NULL,
      covered_by TEXT,
      status TEXT NOT NULL DEFAULT 'pending',
      requested_at TEXT NOT NULL,
      responded_at TEXT
    );

    CREATE INDEX IF NOT EXISTS coverage_requests_instance
      ON coverage_requests (instance_id);
"#;

const UNIQUE_INSTANCES: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS instances_unique_key
      ON instances (user_id, kind, entity_id, date);
"#;

const INSTANCE_COLUMNS: &str = "id, user_id, kind, entity_id, date, status, assignee_override, \
     deferred_to, completed_at, skipped_at, created_at, updated_at";

const COVERAGE_COLUMNS: &str =
    "id, instance_id, requested_by, covered_by, status, requested_at, responded_at";

/// Store backend over a single SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    unique_instances: bool,
}

impl SqliteBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, unique_instances: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), unique_instances, "Opened SQLite store");
        Self::init(conn, unique_instances)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(unique_instances: bool) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, unique_instances)
    }

    fn init(conn: Connection, unique_instances: bool) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        if unique_instances {
            conn.execute_batch(UNIQUE_INSTANCES)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            unique_instances,
        })
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| DaybookError::store(operation, "connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .into_store_error(operation)?
    }
}

// ============================================================================
// Column encoding
// ============================================================================

fn utc_text(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn offset_text(t: DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, false)
}

fn date_text(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| conversion_error(idx, format!("'{}': {}", raw, e)))
}

fn offset_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<FixedOffset>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s).map_err(|e| conversion_error(idx, format!("'{}': {}", s, e)))
    })
    .transpose()
}

fn utc_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(offset_time(row, idx)?.map(|t| t.with_timezone(&Utc)))
}

fn required_utc(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    utc_time(row, idx)?.ok_or_else(|| conversion_error(idx, "missing timestamp".to_string()))
}

fn map_instance(row: &Row<'_>) -> rusqlite::Result<ActionableInstance> {
    Ok(ActionableInstance {
        id: parsed(row, 0)?,
        user_id: UserId::new(row.get::<_, String>(1)?),
        kind: parsed(row, 2)?,
        entity_id: row.get::<_, String>(3)?.into(),
        date: parsed(row, 4)?,
        status: parsed(row, 5)?,
        assignee_override: row.get::<_, Option<String>>(6)?.map(UserId::new),
        deferred_to: offset_time(row, 7)?,
        completed_at: utc_time(row, 8)?,
        skipped_at: utc_time(row, 9)?,
        created_at: required_utc(row, 10)?,
        updated_at: required_utc(row, 11)?,
    })
}

fn map_note(row: &Row<'_>) -> rusqlite::Result<InstanceNote> {
    Ok(InstanceNote {
        id: parsed(row, 0)?,
        instance_id: parsed(row, 1)?,
        author: UserId::new(row.get::<_, String>(2)?),
        text: row.get(3)?,
        created_at: required_utc(row, 4)?,
    })
}

fn map_coverage(row: &Row<'_>) -> rusqlite::Result<CoverageRequest> {
    Ok(CoverageRequest {
        id: parsed(row, 0)?,
        instance_id: parsed(row, 1)?,
        requested_by: UserId::new(row.get::<_, String>(2)?),
        covered_by: row.get::<_, Option<String>>(3)?.map(UserId::new),
        status: parsed(row, 4)?,
        requested_at: required_utc(row, 5)?,
        responded_at: utc_time(row, 6)?,
    })
}

fn select_by_key(
    conn: &Connection,
    user: &UserId,
    key: &InstanceKey,
) -> Result<Vec<ActionableInstance>> {
    let sql = format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances \
         WHERE user_id = ?1 AND kind = ?2 AND entity_id = ?3 AND date = ?4 \
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                user.as_str(),
                key.kind.as_str(),
                key.entity_id.as_str(),
                date_text(key.date)
            ],
            map_instance,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    async fn find_instances(
        &self,
        user: &UserId,
        key: &InstanceKey,
    ) -> Result<Vec<ActionableInstance>> {
        let user = user.clone();
        let key = key.clone();
        self.run("find_instances", move |conn| select_by_key(conn, &user, &key))
            .await
    }

    async fn list_instances(
        &self,
        user: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActionableInstance>> {
        let user = user.clone();
        self.run("list_instances", move |conn| {
            let sql = format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances \
                 WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 \
                 ORDER BY date ASC, created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![user.as_str(), date_text(from), date_text(to)],
                    map_instance,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert_instance(&self, instance: ActionableInstance) -> Result<ActionableInstance> {
        let unique = self.unique_instances;
        self.run("insert_instance", move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO instances (id, user_id, kind, entity_id, date, status, \
                 assignee_override, deferred_to, completed_at, skipped_at, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    instance.id.to_string(),
                    instance.user_id.as_str(),
                    instance.kind.as_str(),
                    instance.entity_id.as_str(),
                    date_text(instance.date),
                    instance.status.as_str(),
                    instance.assignee_override.as_ref().map(UserId::as_str),
                    instance.deferred_to.map(offset_text),
                    instance.completed_at.map(utc_text),
                    instance.skipped_at.map(utc_text),
                    utc_text(instance.created_at),
                    utc_text(instance.updated_at),
                ],
            )?;
            if inserted == 1 {
                return Ok(instance);
            }
            if unique {
                let key = instance.key();
                if let Some(existing) =
                    select_by_key(conn, &instance.user_id, &key)?.into_iter().next()
                {
                    debug!(key = %key, "Unique instance already present");
                    return Ok(existing);
                }
            }
            Err(DaybookError::store(
                "insert_instance",
                format!("instance {} already exists", instance.id),
            ))
        })
        .await
    }

    async fn update_instance(&self, instance: &ActionableInstance) -> Result<bool> {
        let instance = instance.clone();
        self.run("update_instance", move |conn| {
            let changed = conn.execute(
                "UPDATE instances SET status = ?1, assignee_override = ?2, deferred_to = ?3, \
                 completed_at = ?4, skipped_at = ?5, updated_at = ?6 \
                 WHERE id = ?7 AND user_id = ?8",
                params![
                    instance.status.as_str(),
                    instance.assignee_override.as_ref().map(UserId::as_str),
                    instance.deferred_to.map(offset_text),
                    instance.completed_at.map(utc_text),
                    instance.skipped_at.map(utc_text),
                    utc_text(instance.updated_at),
                    instance.id.to_string(),
                    instance.user_id.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_notes(&self, instance: InstanceId) -> Result<Vec<InstanceNote>> {
        self.run("list_notes", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, instance_id, author, text, created_at FROM instance_notes \
                 WHERE instance_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![instance.to_string()], map_note)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert_note(&self, note: InstanceNote) -> Result<InstanceNote> {
        self.run("insert_note", move |conn| {
            conn.execute(
                "INSERT INTO instance_notes (id, instance_id, author, text, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    note.id.to_string(),
                    note.instance_id.to_string(),
                    note.author.as_str(),
                    note.text,
                    utc_text(note.created_at),
                ],
            )?;
            Ok(note)
        })
        .await
    }

    async fn delete_note(&self, author: &UserId, note: NoteId) -> Result<bool> {
        let author = author.clone();
        self.run("delete_note", move |conn| {
            let deleted = conn.execute(
                "DELETE FROM instance_notes WHERE id = ?1 AND author = ?2",
                params![note.to_string(), author.as_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_coverage(&self, instance: InstanceId) -> Result<Vec<CoverageRequest>> {
        self.run("list_coverage", move |conn| {
            let sql = format!(
                "SELECT {COVERAGE_COLUMNS} FROM coverage_requests \
                 WHERE instance_id = ?1 ORDER BY requested_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![instance.to_string()], map_coverage)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_coverage(&self, id: CoverageRequestId) -> Result<Option<CoverageRequest>> {
        self.run("get_coverage", move |conn| {
            let sql = format!("SELECT {COVERAGE_COLUMNS} FROM coverage_requests WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id.to_string()], map_coverage)
                .optional()?)
        })
        .await
    }

    async fn insert_coverage(&self, request: CoverageRequest) -> Result<CoverageRequest> {
        self.run("insert_coverage", move |conn| {
            conn.execute(
                "INSERT INTO coverage_requests (id, instance_id, requested_by, covered_by, \
                 status, requested_at, responded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.id.to_string(),
                    request.instance_id.to_string(),
                    request.requested_by.as_str(),
                    request.covered_by.as_ref().map(UserId::as_str),
                    request.status.as_str(),
                    utc_text(request.requested_at),
                    request.responded_at.map(utc_text),
                ],
            )?;
            Ok(request)
        })
        .await
    }

    async fn update_coverage(&self, request: &CoverageRequest) -> Result<bool> {
        let request = request.clone();
        self.run("update_coverage", move |conn| {
            let changed = conn.execute(
                "UPDATE coverage_requests SET covered_by = ?1, status = ?2, responded_at = ?3 \
                 WHERE id = ?4 AND status = 'pending'",
                params![
                    request.covered_by.as_ref().map(UserId::as_str),
                    request.status.as_str(),
                    request.responded_at.map(utc_text),
                    request.id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_open_coverage(&self, excluding: &UserId) -> Result<Vec<CoverageRequest>> {
        let excluding = excluding.clone();
        self.run("list_open_coverage", move |conn| {
            let sql = format!(
                "SELECT {COVERAGE_COLUMNS} FROM coverage_requests \
                 WHERE status = 'pending' AND requested_by != ?1 \
                 ORDER BY requested_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![excluding.as_str()], map_coverage)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoverageStatus, EntityId, EntityKind, InstanceStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn key(entity: &str, date: &str) -> InstanceKey {
        InstanceKey::new(
            EntityKind::CalendarEvent,
            &EntityId::new(entity),
            date.parse().unwrap(),
        )
    }

    fn row(n: u128, key: InstanceKey) -> ActionableInstance {
        ActionableInstance::pending(
            InstanceId::from_uuid(Uuid::from_u128(n)),
            UserId::new("alice"),
            key,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_instance_round_trip_preserves_offset() {
        let store = SqliteBackend::open_in_memory(false).unwrap();
        let mut inst = row(1, key("standup", "2024-01-15"));
        let target = FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 16, 21, 30, 0)
            .unwrap();
        inst.defer(target, Utc::now());
        store.insert_instance(inst.clone()).await.unwrap();

        let found = store
            .find_instances(&UserId::new("alice"), &key("standup", "2024-01-15"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, InstanceStatus::Deferred);
        assert_eq!(found[0].deferred_to, Some(target));
        assert_eq!(
            found[0].deferred_date(),
            Some("2024-01-16".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_update_and_range_query() {
        let store = SqliteBackend::open_in_memory(false).unwrap();
        let mut inst = store
            .insert_instance(row(1, key("standup", "2024-01-15")))
            .await
            .unwrap();
        store
            .insert_instance(row(2, key("standup", "2024-01-17")))
            .await
            .unwrap();

        inst.mark_done(Utc::now());
        assert!(store.update_instance(&inst).await.unwrap());

        let rows = store
            .list_instances(
                &UserId::new("alice"),
                "2024-01-14".parse().unwrap(),
                "2024-01-15".parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, InstanceStatus::Completed);
        assert!(rows[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_timestamps_round_trip_exactly() {
        let store = SqliteBackend::open_in_memory(false).unwrap();
        let mut inst = store
            .insert_instance(row(1, key("standup", "2024-01-15")))
            .await
            .unwrap();
        let done = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        inst.mark_done(done);
        assert!(store.update_instance(&inst).await.unwrap());

        let found = store
            .find_instances(&UserId::new("alice"), &key("standup", "2024-01-15"))
            .await
            .unwrap();
        assert_eq!(found, vec![inst]);
        assert_eq!(found[0].completed_at, Some(done));
    }

    #[tokio::test]
    async fn test_answered_coverage_is_not_overwritten() {
        let store = SqliteBackend::open_in_memory(false).unwrap();
        let inst = store
            .insert_instance(row(1, key("standup", "2024-01-15")))
            .await
            .unwrap();
        let request = store
            .insert_coverage(CoverageRequest::new(
                CoverageRequestId::from_uuid(Uuid::from_u128(20)),
                inst.id,
                UserId::new("alice"),
                Utc::now(),
            ))
            .await
            .unwrap();

        let mut declined = request.clone();
        declined.decline(Utc::now());
        let mut accepted = request.clone();
        accepted.accept(UserId::new("carol"), Utc::now());

        assert!(store.update_coverage(&declined).await.unwrap());
        assert!(!store.update_coverage(&accepted).await.unwrap());
        let stored = store.get_coverage(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CoverageStatus::Declined);
        assert!(stored.covered_by.is_none());
    }

    #[tokio::test]
    async fn test_unique_index_collapses_duplicates() {
        let store = SqliteBackend::open_in_memory(true).unwrap();
        let first = store
            .insert_instance(row(1, key("standup", "2024-01-15")))
            .await
            .unwrap();
        let second = store
            .insert_instance(row(2, key("standup", "2024-01-15")))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_notes_and_coverage_on_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/daybook.db");
        let store = SqliteBackend::open(&path, false).unwrap();
        let inst = store
            .insert_instance(row(1, key("standup", "2024-01-15")))
            .await
            .unwrap();

        let note = InstanceNote {
            id: NoteId::from_uuid(Uuid::from_u128(10)),
            instance_id: inst.id,
            author: UserId::new("alice"),
            text: "moved to room 4".to_string(),
            created_at: Utc::now(),
        };
        store.insert_note(note.clone()).await.unwrap();
        assert_eq!(store.list_notes(inst.id).await.unwrap(), vec![note.clone()]);
        assert!(!store
            .delete_note(&UserId::new("bob"), note.id)
            .await
            .unwrap());
        assert!(store
            .delete_note(&UserId::new("alice"), note.id)
            .await
            .unwrap());

        let mut request = CoverageRequest::new(
            CoverageRequestId::from_uuid(Uuid::from_u128(20)),
            inst.id,
            UserId::new("alice"),
            Utc::now(),
        );
        store.insert_coverage(request.clone()).await.unwrap();
        assert_eq!(
            store
                .list_open_coverage(&UserId::new("bob"))
                .await
                .unwrap()
                .len(),
            1
        );

        request.accept(UserId::new("bob"), Utc::now());
        assert!(store.update_coverage(&request).await.unwrap());

        // Reopen to make sure the write reached the file.
        drop(store);
        let reopened = SqliteBackend::open(&path, false).unwrap();
        let stored = reopened.get_coverage(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CoverageStatus::Accepted);
        assert_eq!(stored.covered_by, Some(UserId::new("bob")));
        assert!(reopened
            .list_open_coverage(&UserId::new("bob"))
            .await
            .unwrap()
            .is_empty());
    }
}

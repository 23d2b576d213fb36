//! Local SQLite database layer.
//!
//! The function host owns every business record; this file only keeps what the
//! gateway itself needs to remember across restarts: login lockout counters
//! (in `local_settings`) and a journal of pump inventory submissions.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection. A poisoned lock still hands out the connection;
    /// SQLite keeps its own consistency.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/station.db`.
///
/// On open failure the file is deleted and opened once more; nothing in it
/// is authoritative.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("station.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// An in-memory database with the full schema.
pub fn init_in_memory() -> Result<DbState, String> {
    let conn = Connection::open_in_memory().map_err(|e| format!("sqlite open: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("pragma setup: {e}"))?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// v1: key/value settings.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )
    .map_err(|e| format!("migrate v1: {e}"))
}

/// v2: pump inventory submission journal.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pump_inventory_submissions (
            id TEXT PRIMARY KEY,
            location TEXT NOT NULL,
            pump_id TEXT NOT NULL,
            reading_date TEXT NOT NULL,
            submitted_by TEXT NOT NULL,
            payload TEXT NOT NULL,
            forward_status TEXT NOT NULL DEFAULT 'local',
            upstream_status INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_submissions_location
            ON pump_inventory_submissions (location, created_at);
        INSERT INTO schema_version (version) VALUES (2);",
    )
    .map_err(|e| format!("migrate v2: {e}"))
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .optional()
    .ok()
    .flatten()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Submission journal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub location: String,
    pub pump_id: String,
    pub reading_date: String,
    pub submitted_by: String,
    pub payload: serde_json::Value,
    pub forward_status: String,
    pub upstream_status: Option<u16>,
    pub created_at: String,
}

pub fn insert_submission(conn: &Connection, record: &SubmissionRecord) -> Result<(), String> {
    conn.execute(
        "INSERT INTO pump_inventory_submissions (
            id, location, pump_id, reading_date, submitted_by, payload,
            forward_status, upstream_status, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.location,
            record.pump_id,
            record.reading_date,
            record.submitted_by,
            record.payload.to_string(),
            record.forward_status,
            record.upstream_status,
            record.created_at,
        ],
    )
    .map_err(|e| format!("insert submission: {e}"))?;
    Ok(())
}

pub fn update_forward_status(
    conn: &Connection,
    id: &str,
    forward_status: &str,
    upstream_status: Option<u16>,
) -> Result<(), String> {
    conn.execute(
        "UPDATE pump_inventory_submissions
         SET forward_status = ?2, upstream_status = ?3
         WHERE id = ?1",
        params![id, forward_status, upstream_status],
    )
    .map_err(|e| format!("update submission: {e}"))?;
    Ok(())
}

/// Most recent submissions for a location, newest first.
pub fn recent_submissions(
    conn: &Connection,
    location: &str,
    limit: u32,
) -> Result<Vec<SubmissionRecord>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, location, pump_id, reading_date, submitted_by, payload,
                    forward_status, upstream_status, created_at
             FROM pump_inventory_submissions
             WHERE location = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )
        .map_err(|e| format!("prepare submissions: {e}"))?;

    let rows = stmt
        .query_map(params![location, limit], |row| {
            let payload: String = row.get(5)?;
            Ok(SubmissionRecord {
                id: row.get(0)?,
                location: row.get(1)?,
                pump_id: row.get(2)?,
                reading_date: row.get(3)?,
                submitted_by: row.get(4)?,
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                forward_status: row.get(6)?,
                upstream_status: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .map_err(|e| format!("query submissions: {e}"))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("read submissions: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, location: &str, created_at: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: id.into(),
            location: location.into(),
            pump_id: "7".into(),
            reading_date: "2026-10-18".into(),
            submitted_by: "10002".into(),
            payload: json!({ "pump_id": "7" }),
            forward_status: "local".into(),
            upstream_status: None,
            created_at: created_at.into(),
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = init_in_memory().expect("db");
        let conn = db.lock();
        run_migrations(&conn).expect("second run");
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .expect("version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn settings_upsert_overwrites() {
        let db = init_in_memory().expect("db");
        let conn = db.lock();
        assert_eq!(get_setting(&conn, "lockout", "a@b.c"), None);
        set_setting(&conn, "lockout", "a@b.c", "1").expect("set");
        set_setting(&conn, "lockout", "a@b.c", "2").expect("overwrite");
        assert_eq!(get_setting(&conn, "lockout", "a@b.c").as_deref(), Some("2"));
    }

    #[test]
    fn submissions_are_listed_newest_first_per_location() {
        let db = init_in_memory().expect("db");
        let conn = db.lock();
        insert_submission(&conn, &record("s1", "loboc", "2026-10-18T01:00:00Z")).expect("s1");
        insert_submission(&conn, &record("s2", "loboc", "2026-10-18T02:00:00Z")).expect("s2");
        insert_submission(&conn, &record("s3", "sikatuna", "2026-10-18T03:00:00Z")).expect("s3");
        update_forward_status(&conn, "s2", "forwarded", Some(201)).expect("update");

        let rows = recent_submissions(&conn, "loboc", 10).expect("list");
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert_eq!(rows[0].forward_status, "forwarded");
        assert_eq!(rows[0].upstream_status, Some(201));
        assert_eq!(rows[1].payload, json!({ "pump_id": "7" }));
    }
}

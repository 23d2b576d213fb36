//! Diagnostics for the gateway.
//!
//! Provides:
//! - **About info**: version, platform, arch
//! - **Health**: schema version, database size, journaled submissions
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use crate::db::DbState;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Prefix of the daily log files (`gateway.log.2026-10-18`). Kept apart
/// from `station.db` since the log and data directories may be the same.
pub const LOG_FILE_PREFIX: &str = "gateway.log";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

pub fn about_info() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Liveness payload for `/health`. Database problems are reported in the
/// payload rather than failing the health check.
pub fn health(db: &DbState) -> Value {
    let (schema_version, submissions, failed_forwards) = {
        let conn = db.lock();
        let schema_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        let submissions: i64 = conn
            .query_row("SELECT COUNT(*) FROM pump_inventory_submissions", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);
        let failed_forwards: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pump_inventory_submissions WHERE forward_status = 'failed'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        (schema_version, submissions, failed_forwards)
    };

    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    json!({
        "status": "ok",
        "about": about_info(),
        "schemaVersion": schema_version,
        "dbSizeBytes": db_size,
        "submissions": {
            "total": submissions,
            "failedForwards": failed_forwards,
        },
    })
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Create the log directory if needed and return it.
pub fn ensure_log_dir(log_dir: &Path) -> PathBuf {
    if let Err(e) = fs::create_dir_all(log_dir) {
        warn!("Failed to create log dir {}: {e}", log_dir.display());
    }
    log_dir.to_path_buf()
}

fn is_log_file(name: &str) -> bool {
    name == LOG_FILE_PREFIX || name.starts_with(&format!("{LOG_FILE_PREFIX}."))
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
/// Returns how many were removed.
pub fn prune_old_logs(log_dir: &Path) -> usize {
    if !log_dir.exists() {
        return 0;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if is_log_file(name) {
                    let modified = entry
                        .metadata()
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .unwrap_or(std::time::UNIX_EPOCH);
                    log_files.push((path, modified));
                }
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn about_info_has_required_fields() {
        let info = about_info();
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
        assert!(info.get("platform").is_some());
        assert!(info.get("arch").is_some());
    }

    #[test]
    fn health_with_empty_db() {
        let db = crate::db::init_in_memory().expect("db");
        let h = health(&db);
        assert_eq!(h["status"], "ok");
        assert_eq!(h["schemaVersion"], 2);
        assert_eq!(h["submissions"]["total"], 0);
    }

    #[test]
    fn prune_keeps_newest_gateway_logs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = SystemTime::now() - Duration::from_secs(3600);
        for i in 0..(MAX_LOG_FILES + 3) {
            let path = dir.path().join(format!("gateway.log.2026-10-{:02}", i + 1));
            fs::write(&path, "x").expect("write log");
            let file = fs::File::options().write(true).open(&path).expect("open");
            file.set_modified(base + Duration::from_secs(i as u64 * 60))
                .expect("set mtime");
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").expect("write other");
        for db_file in ["station.db", "station.db-wal", "station.db-shm"] {
            fs::write(dir.path().join(db_file), "db").expect("write db file");
        }

        assert_eq!(prune_old_logs(dir.path()), 3);
        assert!(!dir.path().join("gateway.log.2026-10-01").exists());
        assert!(dir.path().join("gateway.log.2026-10-13").exists());
        assert!(dir.path().join("unrelated.txt").exists());
        for db_file in ["station.db", "station.db-wal", "station.db-shm"] {
            assert!(dir.path().join(db_file).exists(), "{db_file} must survive pruning");
        }
    }

    #[test]
    fn prune_on_missing_dir_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(prune_old_logs(&dir.path().join("absent")), 0);
    }
}

//! Local SQLite database layer.
//!
//! Holds the persisted UI settings, the JSON-document rows used by the local
//! tabular backend, and local sign-in accounts. Uses rusqlite with WAL mode
//! and versioned migrations.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

use crate::error::{PosError, PosResult};

/// Shared handle to the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{data_dir}/pos.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations.
pub fn init(data_dir: &Path) -> PosResult<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| PosError::Storage(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("pos.db");
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open a throwaway in-memory database with the full schema applied.
pub fn open_in_memory() -> PosResult<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> PosResult<Connection> {
    let conn = Connection::open(path).map_err(|e| PosError::Storage(format!("sqlite open: {e}")))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| PosError::Storage(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| PosError::Storage(format!("create schema_version: {e}")))?;

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
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: persisted UI settings.
fn migrate_v1(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        PosError::Storage(format!("migration v1: {e}"))
    })?;

    info!("Applied migration v1 (local_settings)");
    Ok(())
}

/// Migration v2: JSON-document rows for the local tabular backend.
///
/// Uniqueness rules that the hosted backend enforces with real constraints
/// are expressed as partial expression indexes over the documents.
fn migrate_v2(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(table_name, id)
        );

        CREATE INDEX IF NOT EXISTS idx_records_table ON records(table_name);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_records_table_number
            ON records(json_extract(data, '$.branch_id'), json_extract(data, '$.table_number'))
            WHERE table_name = 'tables';

        CREATE UNIQUE INDEX IF NOT EXISTS idx_records_shop_slug
            ON records(json_extract(data, '$.slug'))
            WHERE table_name = 'shops';

        CREATE UNIQUE INDEX IF NOT EXISTS idx_records_plan_user
            ON records(json_extract(data, '$.user_id'))
            WHERE table_name = 'user_plans';

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        PosError::Storage(format!("migration v2: {e}"))
    })?;

    info!("Applied migration v2 (records)");
    Ok(())
}

/// Migration v3: local sign-in accounts.
fn migrate_v3(conn: &Connection) -> PosResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            full_name TEXT,
            role TEXT NOT NULL DEFAULT 'owner'
                CHECK (role IN ('owner', 'staff', 'admin')),
            created_at TEXT DEFAULT (datetime('now'))
        );

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        PosError::Storage(format!("migration v3: {e}"))
    })?;

    info!("Applied migration v3 (users)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> PosResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| PosError::Storage(format!("set_setting: {e}")))?;
    Ok(())
}

/// Delete all settings in a category.
pub fn delete_all_settings(conn: &Connection, category: &str) -> PosResult<()> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1",
        params![category],
    )
    .map_err(|e| PosError::Storage(format!("delete_all_settings: {e}")))?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        assert!(tables.contains(&"local_settings".to_string()));
        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"users".to_string()));

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");
        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_table_number_unique_within_branch() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO records (table_name, id, data) VALUES ('tables', 't1', '{\"branch_id\":\"b1\",\"table_number\":\"1\"}')",
            [],
        )
        .expect("insert first table");
        conn.execute(
            "INSERT INTO records (table_name, id, data) VALUES ('tables', 't2', '{\"branch_id\":\"b2\",\"table_number\":\"1\"}')",
            [],
        )
        .expect("same number in another branch is fine");

        let dup = conn.execute(
            "INSERT INTO records (table_name, id, data) VALUES ('tables', 't3', '{\"branch_id\":\"b1\",\"table_number\":\"1\"}')",
            [],
        );
        assert!(dup.is_err(), "duplicate table number should be rejected");
    }

    #[test]
    fn test_user_role_check_constraint() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");
        let bad = conn.execute(
            "INSERT INTO users (id, email, password_hash, role) VALUES ('u1', 'a@b.c', 'x', 'root')",
            [],
        );
        assert!(bad.is_err(), "unknown role should be rejected");
    }

    #[test]
    fn test_settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "ui", "language", "th").expect("set");
        assert_eq!(get_setting(&conn, "ui", "language"), Some("th".to_string()));

        set_setting(&conn, "ui", "language", "en").expect("update");
        assert_eq!(get_setting(&conn, "ui", "language"), Some("en".to_string()));

        delete_all_settings(&conn, "ui").expect("delete");
        assert!(get_setting(&conn, "ui", "language").is_none());
    }

    #[test]
    fn test_init_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init(dir.path()).expect("init");
        assert!(db.db_path.exists());
    }
}

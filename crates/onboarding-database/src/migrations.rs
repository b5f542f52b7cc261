//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_users(conn)?;
    }
    if current_version < 2 {
        migrate_v2_notification_flags(conn)?;
    }
    if current_version < 3 {
        migrate_v3_user_activity(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: users and their unlocked content modules.
fn migrate_v1_users(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: users");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            display_name TEXT,
            trial_start_date TEXT,
            subscription_start_date TEXT,
            subscription_status TEXT NOT NULL DEFAULT 'none',
            trial_ended INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_subscription_status
            ON users(subscription_status);

        -- Append-only: nothing in the engine deletes from this table.
        CREATE TABLE IF NOT EXISTS user_unlocked_modules (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            module INTEGER NOT NULL,
            unlocked_at TEXT NOT NULL,
            PRIMARY KEY (user_id, module)
        );
        ",
    )?;

    record_migration(conn, 1, "users")
}

/// V2: one row per (user, trigger) acting as a single-acquisition lock.
fn migrate_v2_notification_flags(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: notification flags");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notification_flags (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            trigger_id TEXT NOT NULL,
            sent INTEGER NOT NULL DEFAULT 0,
            claimed_at TEXT,
            delivered_at TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, trigger_id)
        );
        ",
    )?;

    record_migration(conn, 2, "notification_flags")
}

/// V3: interaction log used by the inactivity reminder.
fn migrate_v3_user_activity(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v3: user activity");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS user_activity (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            occurred_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_user_activity_user_occurred
            ON user_activity(user_id, occurred_at_ms);
        ",
    )?;

    record_migration(conn, 3, "user_activity")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["users", "user_unlocked_modules", "notification_flags", "user_activity"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, CURRENT_VERSION as i64);
    }
}

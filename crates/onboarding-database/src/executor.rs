//! Async SQLite executor using a dedicated background thread.
//!
//! This module provides an async-friendly interface to SQLite that:
//! - Uses a single dedicated thread for all SQLite operations
//! - Sends queries through a channel (non-blocking from caller's perspective)
//! - Keeps the Tokio runtime free for other async work
//!
//! Only SQL belongs inside `call()`. Network sends, sleeps and template
//! rendering happen outside, otherwise they stall every queued query.
//!
//! # Example
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//!
//! let won = db
//!     .call(move |conn| queries::claim_notification_flag(conn, &user_id, trigger, now))
//!     .await?;
//! ```

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::info;

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
///
/// Cloning is cheap and every clone talks to the same thread. Separate
/// `open` calls on one file behave like separate processes: they share
/// nothing but the file and its locks.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database at the given path.
    ///
    /// This will:
    /// - Create the database file if it doesn't exist
    /// - Enable WAL mode and a busy timeout for cross-process writers
    /// - Run any pending migrations
    /// - Start the dedicated executor thread
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();

        info!(path = %path_str, "Opening async database");

        let conn = Connection::open(&path_str)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::migrate(&conn).await?;

        info!(path = %path_str, "Async database initialized with WAL mode");

        Ok(Self {
            conn,
            path: path_str,
        })
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::migrate(&conn).await?;

        Ok(Self {
            conn,
            path: ":memory:".to_string(),
        })
    }

    async fn migrate(conn: &Connection) -> DatabaseResult<()> {
        conn.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(from_tokio_rusqlite(e).to_string()))
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread. The caller's async
    /// task is parked (not blocked) until the result is ready.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our DatabaseResult rides inside tokio_rusqlite's Ok variant and is
        // flattened after the await.
        let outer_result = self
            .conn
            .call(move |conn| Ok(f(conn)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Get the database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the database connection.
    ///
    /// Waits for pending operations, then shuts down the executor thread.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use crate::NewUser;
    use chrono::Utc;
    use entitlement_core::{SubscriptionStatus, TriggerId};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_async_database_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        let one = db
            .call(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .await
            .unwrap();
        assert_eq!(one, 1);
        assert!(db_path.exists());
        assert_eq!(db.path(), db_path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        db.call(|conn| {
            queries::insert_user(
                conn,
                &NewUser {
                    id: "user-1".to_string(),
                    email: "a@example.com".to_string(),
                    display_name: None,
                    trial_start_date: Some(Utc::now()),
                    subscription_status: SubscriptionStatus::Trialing,
                },
                Utc::now(),
            )
        })
        .await
        .unwrap();
        db.close().await.unwrap();

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        let user = db
            .call(|conn| queries::get_user(conn, "user-1"))
            .await
            .unwrap();
        assert!(user.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_connection() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        db.call(|conn| {
            queries::insert_user(
                conn,
                &NewUser {
                    id: "user-1".to_string(),
                    email: "a@example.com".to_string(),
                    display_name: None,
                    trial_start_date: Some(Utc::now()),
                    subscription_status: SubscriptionStatus::Trialing,
                },
                Utc::now(),
            )
        })
        .await
        .unwrap();

        let mut handles = vec![];
        for _ in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.call(|conn| {
                    queries::claim_notification_flag(conn, "user-1", TriggerId::Welcome, Utc::now())
                })
                .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

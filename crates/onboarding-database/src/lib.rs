//! SQLite database layer for the onboarding lifecycle engine.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Database migrations
//! - Model types for all tables
//! - Query helpers, including the atomic notification-flag claim
//!
//! # Architecture
//!
//! The `AsyncDatabase` uses a single dedicated thread for all SQLite operations.
//! Queries are sent through a channel and executed in FIFO order.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let user = db.call(move |conn| queries::get_user(conn, &user_id)).await?;
//! ```
//!
//! Several processes may open the same file. The flag claim is a single
//! conditional upsert, so SQLite's write lock is the only coordination
//! between them.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;

//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside `AsyncDatabase::call` or directly against a test connection.

use crate::{DatabaseError, DatabaseResult, NewUser, NotificationFlag, User};
use chrono::{DateTime, SecondsFormat, Utc};
use entitlement_core::{SubscriptionStatus, TriggerId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use tracing::debug;

const USER_COLUMNS: &str = "id, email, display_name, trial_start_date, subscription_start_date, \
     subscription_status, trial_ended, created_at, updated_at";

// ==========================================
// Users
// ==========================================

/// Insert a new user at intake.
pub fn insert_user(conn: &Connection, user: &NewUser, now: DateTime<Utc>) -> DatabaseResult<User> {
    let now_str = to_db_timestamp(now);
    conn.execute(
        "INSERT INTO users (id, email, display_name, trial_start_date, subscription_status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            user.id,
            user.email,
            user.display_name,
            user.trial_start_date.map(to_db_timestamp),
            user.subscription_status.as_str(),
            now_str,
        ],
    )?;
    debug!(user_id = %user.id, "User inserted");
    get_user(conn, &user.id)?
        .ok_or_else(|| DatabaseError::NotFound("User not found after insert".to_string()))
}

/// Get a user by ID, including unlocked modules.
pub fn get_user(conn: &Connection, id: &str) -> DatabaseResult<Option<User>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;

    let user = stmt.query_row(params![id], map_user_row).optional()?;

    match user {
        Some(mut user) => {
            user.unlocked_modules = get_unlocked_modules(conn, &user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

/// Users the batch sweep re-evaluates: every stored spelling in
/// [`SubscriptionStatus::SWEEP_CANDIDATE_SPELLINGS`].
pub fn list_sweep_candidates(conn: &Connection) -> DatabaseResult<Vec<User>> {
    let spellings = SubscriptionStatus::SWEEP_CANDIDATE_SPELLINGS;
    let placeholders = (1..=spellings.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE subscription_status IN ({placeholders})
         ORDER BY created_at, id"
    ))?;

    let mut users = stmt
        .query_map(rusqlite::params_from_iter(spellings), map_user_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for user in &mut users {
        user.unlocked_modules = get_unlocked_modules(conn, &user.id)?;
    }

    Ok(users)
}

/// Record a subscription change coming from the payment integration.
pub fn set_subscription(
    conn: &Connection,
    user_id: &str,
    status: SubscriptionStatus,
    subscription_start_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE users SET subscription_status = ?2, subscription_start_date = ?3, updated_at = ?4
         WHERE id = ?1",
        params![
            user_id,
            status.as_str(),
            subscription_start_date.map(to_db_timestamp),
            to_db_timestamp(now),
        ],
    )?;
    Ok(count > 0)
}

/// Set the `trial_ended` marker once. A still-trialing status moves to
/// `trial_ended`; any other status is left alone.
///
/// Returns true if this call set the marker.
pub fn mark_trial_ended(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE users
         SET trial_ended = 1,
             subscription_status = CASE
                 WHEN subscription_status IN ('trialing', 'trial') THEN 'trial_ended'
                 ELSE subscription_status
             END,
             updated_at = ?2
         WHERE id = ?1 AND trial_ended = 0",
        params![user_id, to_db_timestamp(now)],
    )?;
    Ok(count == 1)
}

// ==========================================
// Unlocked modules
// ==========================================

/// Modules unlocked for a user.
pub fn get_unlocked_modules(conn: &Connection, user_id: &str) -> DatabaseResult<BTreeSet<u32>> {
    let mut stmt = conn.prepare_cached(
        "SELECT module FROM user_unlocked_modules WHERE user_id = ?1 ORDER BY module",
    )?;
    let modules = stmt
        .query_map(params![user_id], |row| row.get::<_, u32>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(modules)
}

/// Append modules to a user's unlocked set. Already-present modules are
/// ignored; there is no removal counterpart.
///
/// Returns the number of modules actually added.
pub fn add_unlocked_modules(
    conn: &Connection,
    user_id: &str,
    modules: &BTreeSet<u32>,
    now: DateTime<Utc>,
) -> DatabaseResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let now_str = to_db_timestamp(now);
    let mut added = 0;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO user_unlocked_modules (user_id, module, unlocked_at)
             VALUES (?1, ?2, ?3)",
        )?;
        for module in modules {
            added += stmt.execute(params![user_id, module, now_str])?;
        }
    }
    tx.commit()?;
    debug!(user_id, added, "Unlocked modules appended");
    Ok(added)
}

// ==========================================
// Notification flags
// ==========================================

/// Atomically flip a sent flag from false to true.
///
/// A single conditional upsert: it inserts a claimed row if none exists and
/// otherwise updates only while `sent = 0`. Exactly one caller sees a
/// changed row, whichever connection or process it comes from.
pub fn claim_notification_flag(
    conn: &Connection,
    user_id: &str,
    trigger: TriggerId,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "INSERT INTO notification_flags (user_id, trigger_id, sent, claimed_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?3)
         ON CONFLICT(user_id, trigger_id) DO UPDATE
             SET sent = 1,
                 claimed_at = excluded.claimed_at,
                 updated_at = excluded.updated_at
             WHERE notification_flags.sent = 0",
        params![user_id, trigger.as_str(), to_db_timestamp(now)],
    )?;
    Ok(count == 1)
}

/// Reset a claimed flag after a failed send. A confirmed delivery is never
/// reset.
pub fn release_notification_flag(
    conn: &Connection,
    user_id: &str,
    trigger: TriggerId,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE notification_flags
         SET sent = 0, claimed_at = NULL, updated_at = ?3
         WHERE user_id = ?1 AND trigger_id = ?2 AND sent = 1 AND delivered_at IS NULL",
        params![user_id, trigger.as_str(), to_db_timestamp(now)],
    )?;
    Ok(count == 1)
}

/// Stamp a claimed flag as delivered.
pub fn confirm_notification_flag(
    conn: &Connection,
    user_id: &str,
    trigger: TriggerId,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE notification_flags
         SET delivered_at = ?3, updated_at = ?3
         WHERE user_id = ?1 AND trigger_id = ?2 AND sent = 1 AND delivered_at IS NULL",
        params![user_id, trigger.as_str(), to_db_timestamp(now)],
    )?;
    Ok(count == 1)
}

/// Get one flag row, if it was ever claimed.
pub fn get_notification_flag(
    conn: &Connection,
    user_id: &str,
    trigger: TriggerId,
) -> DatabaseResult<Option<NotificationFlag>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, trigger_id, sent, claimed_at, delivered_at
         FROM notification_flags WHERE user_id = ?1 AND trigger_id = ?2",
    )?;
    let flag = stmt
        .query_row(params![user_id, trigger.as_str()], map_flag_row)
        .optional()?;
    Ok(flag)
}

// ==========================================
// Activity
// ==========================================

/// Append an interaction to the activity log.
pub fn record_activity(conn: &Connection, user_id: &str, at: DateTime<Utc>) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO user_activity (user_id, occurred_at_ms) VALUES (?1, ?2)",
        params![user_id, at.timestamp_millis()],
    )?;
    Ok(())
}

/// Most recent interaction for a user.
pub fn last_activity_at(conn: &Connection, user_id: &str) -> DatabaseResult<Option<DateTime<Utc>>> {
    let ms: Option<i64> = conn.query_row(
        "SELECT MAX(occurred_at_ms) FROM user_activity WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    match ms {
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| DatabaseError::InvalidData(format!("activity timestamp out of range: {ms}"))),
        None => Ok(None),
    }
}

// ==========================================
// Row mapping
// ==========================================

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        trial_start_date: optional_datetime_column(row, 3)?,
        subscription_start_date: optional_datetime_column(row, 4)?,
        subscription_status: SubscriptionStatus::from_str(&row.get::<_, String>(5)?),
        trial_ended: row.get(6)?,
        unlocked_modules: BTreeSet::new(),
        created_at: datetime_column(row, 7)?,
        updated_at: datetime_column(row, 8)?,
    })
}

fn map_flag_row(row: &Row<'_>) -> rusqlite::Result<NotificationFlag> {
    let raw_trigger: String = row.get(1)?;
    let trigger_id = raw_trigger
        .parse::<TriggerId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(NotificationFlag {
        user_id: row.get(0)?,
        trigger_id,
        sent: row.get(2)?,
        claimed_at: optional_datetime_column(row, 3)?,
        delivered_at: optional_datetime_column(row, 4)?,
    })
}

fn to_db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

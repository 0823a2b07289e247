//! User record access. Accounts are created and managed by the account service; this
//! crate reads them to authenticate and writes them only for tooling and tests.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::models::User;
use crate::db::{format_timestamp, parse_timestamp};

pub fn find_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_changed_at, created_at FROM users WHERE id = ?1",
        [user_id],
        |row| {
            let changed: Option<String> = row.get(2)?;
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_changed_at: changed.as_deref().map(parse_timestamp).transpose()?,
                created_at: parse_timestamp(&row.get::<_, String>(3)?)?,
            })
        },
    )
    .optional()
}

pub fn create_user(conn: &Connection, username: &str) -> rusqlite::Result<User> {
    let user = User {
        id: Uuid::now_v7().to_string(),
        username: username.to_string(),
        password_changed_at: None,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO users (id, username, password_changed_at, created_at) VALUES (?1, ?2, NULL, ?3)",
        params![user.id, user.username, format_timestamp(user.created_at)],
    )?;
    Ok(user)
}

/// Record a password change. Credentials issued before `at` stop working.
pub fn record_password_change(
    conn: &Connection,
    user_id: &str,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET password_changed_at = ?2 WHERE id = ?1",
        params![user_id, format_timestamp(at)],
    )?;
    Ok(())
}

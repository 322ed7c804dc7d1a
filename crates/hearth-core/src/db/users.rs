//! Household member directory

use rusqlite::{params, Connection, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::models::User;

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let active: i64 = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        is_active: active != 0,
    })
}

pub(crate) fn fetch_users(conn: &Connection, active_only: bool) -> Result<Vec<User>> {
    let sql = if active_only {
        "SELECT id, username, display_name, is_active FROM users WHERE is_active = 1 ORDER BY id"
    } else {
        "SELECT id, username, display_name, is_active FROM users ORDER BY id"
    };
    let mut stmt = conn.prepare(sql)?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

pub(crate) fn fetch_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, display_name, is_active FROM users WHERE id = ?",
            params![id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

impl Database {
    /// List all users, including inactive ones
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        fetch_users(&conn, false)
    }

    /// List active users (the reserved default user included)
    pub fn active_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        fetch_users(&conn, true)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        fetch_user(&conn, id)
    }

    /// Create a user
    pub fn create_user(&self, username: &str, display_name: &str) -> Result<User> {
        let username = username.trim();
        let display_name = display_name.trim();

        let mut errors = Vec::new();
        if username.is_empty() {
            errors.push(crate::error::FieldError::new("username", "is required"));
        }
        if display_name.is_empty() {
            errors.push(crate::error::FieldError::new("display_name", "is required"));
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)",
            params![username],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::Conflict(format!("user '{}' already exists", username)));
        }

        conn.execute(
            "INSERT INTO users (username, display_name, is_active) VALUES (?, ?, 1)",
            params![username, display_name],
        )?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            is_active: true,
        })
    }

    /// Make sure the reserved system user exists
    pub fn ensure_reserved_user(&self, username: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (username, display_name, is_active) VALUES (?, ?, 1)",
            params![username, username],
        )?;
        Ok(())
    }

    /// Deactivate a user; existing allocations are kept
    pub fn deactivate_user(&self, id: i64) -> Result<User> {
        let conn = self.conn()?;
        let changed = conn.execute("UPDATE users SET is_active = 0 WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        fetch_user(&conn, id)?.ok_or_else(|| Error::NotFound(format!("user {}", id)))
    }
}

//! Tenant records and the daily rollover watermark.

use super::{Database, date_column, now_ms};
use crate::types::User;
use anyhow::{Result, anyhow};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        timezone: row.get("timezone")?,
        last_rollover_date: date_column(row, "last_rollover_date")?,
        created_at: row.get("created_at")?,
    })
}

impl Database {
    /// Register a user. Generates a UUID7 id when `id` is not given.
    pub fn create_user(
        &self,
        id: Option<String>,
        name: &str,
        timezone: Option<&str>,
    ) -> Result<User> {
        let id = id.unwrap_or_else(|| Uuid::now_v7().to_string());
        if id.is_empty() {
            return Err(anyhow!("user id must not be empty"));
        }
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, timezone, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![&id, name, timezone, now],
            )?;
            Ok(User {
                id,
                name: name.to_string(),
                timezone: timezone.map(str::to_string),
                last_rollover_date: None,
                created_at: now,
            })
        })
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT * FROM users WHERE id = ?1",
                    params![user_id],
                    parse_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// All users in creation order.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at, id")?;
            let users = stmt
                .query_map([], parse_user_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    pub fn set_user_timezone(&self, user_id: &str, timezone: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET timezone = ?1 WHERE id = ?2",
                params![timezone, user_id],
            )?;
            if changed == 0 {
                return Err(anyhow!("User not found: {}", user_id));
            }
            Ok(())
        })
    }
}

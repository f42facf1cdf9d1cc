//! Clients and their public approval links.

use super::{Database, now_ms};
use crate::types::{Client, PublicApprovalLink};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

fn parse_client_row(row: &Row) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

impl Database {
    pub fn create_client(&self, id: Option<String>, user_id: &str, name: &str) -> Result<Client> {
        let id = id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO clients (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![&id, user_id, name, now],
            )?;
            Ok(Client {
                id,
                user_id: user_id.to_string(),
                name: name.to_string(),
                created_at: now,
            })
        })
    }

    pub fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        self.with_conn(|conn| {
            let client = conn
                .query_row(
                    "SELECT * FROM clients WHERE id = ?1",
                    params![client_id],
                    parse_client_row,
                )
                .optional()?;
            Ok(client)
        })
    }

    pub fn list_clients(&self, user_id: &str) -> Result<Vec<Client>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM clients WHERE user_id = ?1 ORDER BY created_at, id")?;
            let clients = stmt
                .query_map(params![user_id], parse_client_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clients)
        })
    }

    /// Issue an approval link for `client_id` valid until `expires_at` (ms).
    pub fn create_approval_link(&self, client_id: &str, expires_at: i64) -> Result<PublicApprovalLink> {
        let token = Uuid::now_v7().simple().to_string();
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO public_approval_links (token, client_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![&token, client_id, expires_at, now],
            )?;
            Ok(PublicApprovalLink {
                token,
                client_id: client_id.to_string(),
                expires_at,
                created_at: now,
            })
        })
    }

    pub fn get_approval_link(&self, token: &str) -> Result<Option<PublicApprovalLink>> {
        self.with_conn(|conn| {
            let link = conn
                .query_row(
                    "SELECT token, client_id, expires_at, created_at
                     FROM public_approval_links WHERE token = ?1",
                    params![token],
                    |row| {
                        Ok(PublicApprovalLink {
                            token: row.get(0)?,
                            client_id: row.get(1)?,
                            expires_at: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(link)
        })
    }
}

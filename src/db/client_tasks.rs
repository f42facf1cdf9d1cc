//! Client task records.
//!
//! Generated rows carry `(template_id, month_year_reference, slot_date,
//! slot_index)`; the unique index over those columns plus `client_id` is the
//! generation idempotency key. Inserts use `ON CONFLICT DO NOTHING`, so a
//! colliding insert reports zero changed rows instead of failing.

use super::lifecycle::parse_metrics;
use super::{Database, date_column, date_to_sql, enum_column, now_ms};
use crate::store::NewClientTask;
use crate::types::{Board, ClientTask, ClientTaskStatus, MonthRef};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

pub fn parse_client_task_row(row: &Row) -> rusqlite::Result<ClientTask> {
    let month: Option<String> = row.get("month_year_reference")?;
    let month_year_reference = match month {
        Some(m) => Some(m.parse::<MonthRef>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(ClientTask {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        client_id: row.get("client_id")?,
        template_id: row.get("template_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: enum_column(row, "status")?,
        month_year_reference,
        due_date: date_column(row, "due_date")?,
        time: row.get("time")?,
        is_completed: row.get("is_completed")?,
        completed_at: row.get("completed_at")?,
        origin_board: enum_column(row, "origin_board")?,
        current_board: enum_column(row, "current_board")?,
        is_daily_recurring: row.get("is_daily_recurring")?,
        metrics: parse_metrics(row)?,
        parent_task_id: row.get("parent_task_id")?,
        last_moved_to_overdue_at: row.get("last_moved_to_overdue_at")?,
        main_task_id: row.get("main_task_id")?,
        is_standard_task: row.get("is_standard_task")?,
        order_index: row.get("order_index")?,
        public_approval_enabled: row.get("public_approval_enabled")?,
        slot_date: date_column(row, "slot_date")?,
        slot_index: row.get("slot_index")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_client_task_internal(conn: &Connection, id: &str) -> Result<Option<ClientTask>> {
    let task = conn
        .query_row(
            "SELECT * FROM client_tasks WHERE id = ?1",
            params![id],
            parse_client_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Insert a client task owned by its client's user.
///
/// `order_index` is the next free position in the client's `pending` column,
/// computed in the same statement as the insert. Returns the new id, or
/// `None` when nothing was inserted (slot collision or unknown client).
fn insert_client_task(conn: &Connection, task: &NewClientTask) -> Result<Option<String>> {
    let id = Uuid::now_v7().to_string();
    let now = now_ms();
    let board = task.board.unwrap_or(Board::General);
    let status = ClientTaskStatus::Pending;

    let changed = conn.execute(
        "INSERT INTO client_tasks (
            id, user_id, client_id, template_id, title, description, status,
            month_year_reference, due_date, origin_board, current_board, is_daily_recurring,
            parent_task_id, is_standard_task, public_approval_enabled, slot_date, slot_index,
            order_index, created_at, updated_at
        )
        SELECT ?1, c.user_id, c.id, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
            COALESCE(
                (SELECT MAX(order_index) FROM client_tasks WHERE client_id = c.id AND status = ?5),
                -1
            ) + 1,
            ?15, ?15
        FROM clients c WHERE c.id = ?16
        ON CONFLICT DO NOTHING",
        params![
            &id,
            &task.template_id,
            &task.title,
            &task.description,
            status.as_str(),
            task.month_year_reference.map(|m| m.to_string()),
            task.due_date.map(date_to_sql),
            board.as_str(),
            task.is_daily_recurring,
            &task.parent_task_id,
            task.is_standard_task,
            task.public_approval_enabled,
            task.slot.map(|s| date_to_sql(s.due_date)),
            task.slot.map(|s| s.slot_index),
            now,
            &task.client_id,
        ],
    )?;

    Ok((changed > 0).then_some(id))
}

impl Database {
    /// Create an ad hoc client task.
    pub fn create_client_task(&self, task: &NewClientTask) -> Result<ClientTask> {
        self.with_conn(|conn| {
            let id = insert_client_task(conn, task)?
                .ok_or_else(|| anyhow!("Client not found: {}", task.client_id))?;
            get_client_task_internal(conn, &id)?
                .ok_or_else(|| anyhow!("Client task not found after insert: {}", id))
        })
    }

    /// Insert a generated client task; `Ok(None)` when its slot is already taken.
    pub fn insert_generated_client_task(&self, task: &NewClientTask) -> Result<Option<ClientTask>> {
        self.with_conn(|conn| match insert_client_task(conn, task)? {
            Some(id) => get_client_task_internal(conn, &id),
            None => Ok(None),
        })
    }

    pub fn get_client_task(&self, client_task_id: &str) -> Result<Option<ClientTask>> {
        self.with_conn(|conn| get_client_task_internal(conn, client_task_id))
    }

    /// Client tasks generated from `template_id` for `month`, in slot order.
    pub fn list_generated_client_tasks(
        &self,
        client_id: &str,
        template_id: &str,
        month: MonthRef,
    ) -> Result<Vec<ClientTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM client_tasks
                 WHERE client_id = ?1 AND template_id = ?2 AND month_year_reference = ?3
                 ORDER BY slot_date, slot_index",
            )?;
            let tasks = stmt
                .query_map(
                    params![client_id, template_id, month.to_string()],
                    parse_client_task_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// All client tasks of a client, oldest first.
    pub fn list_client_tasks(&self, client_id: &str) -> Result<Vec<ClientTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM client_tasks WHERE client_id = ?1 ORDER BY created_at, id",
            )?;
            let tasks = stmt
                .query_map(params![client_id], parse_client_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    pub fn link_main_task(&self, client_task_id: &str, main_task_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE client_tasks SET main_task_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![main_task_id, now_ms(), client_task_id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Client task not found: {}", client_task_id));
            }
            Ok(())
        })
    }

    /// Write a status change with its board and completion consequences.
    pub fn set_client_task_status(
        &self,
        client_task_id: &str,
        status: ClientTaskStatus,
        board: Board,
        completed: bool,
        now: i64,
    ) -> Result<ClientTask> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE client_tasks SET
                    status = ?1,
                    current_board = ?2,
                    is_completed = ?3,
                    completed_at = CASE WHEN ?3 THEN COALESCE(completed_at, ?4) ELSE NULL END,
                    updated_at = ?4
                 WHERE id = ?5",
                params![status.as_str(), board.as_str(), completed, now, client_task_id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Client task not found: {}", client_task_id));
            }
            get_client_task_internal(conn, client_task_id)?
                .ok_or_else(|| anyhow!("Client task not found: {}", client_task_id))
        })
    }
}

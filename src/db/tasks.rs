//! General dashboard task records.

use super::lifecycle::parse_metrics;
use super::{Database, date_column, date_to_sql, enum_column, json_column, now_ms};
use crate::store::NewTask;
use crate::types::{Board, Task};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
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
        tags: json_column(row, "tags")?,
        generation_key: row.get("generation_key")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Internal helper to get a task using an existing connection.
pub(crate) fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1",
            params![task_id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Insert `task`; with `ignore_conflict` a duplicate `generation_key` is skipped.
fn insert_task(conn: &Connection, task: &NewTask, ignore_conflict: bool) -> Result<String> {
    let id = Uuid::now_v7().to_string();
    let now = now_ms();
    let board = task.board.unwrap_or(Board::General);
    let tags_json = serde_json::to_string(&task.tags)?;
    let on_conflict = if ignore_conflict {
        "ON CONFLICT(generation_key) DO NOTHING"
    } else {
        ""
    };

    conn.execute(
        &format!(
            "INSERT INTO tasks (
                id, user_id, title, description, due_date, time, origin_board, current_board,
                is_daily_recurring, parent_task_id, tags, generation_key, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, ?10, ?11, ?12, ?12) {}",
            on_conflict
        ),
        params![
            &id,
            &task.user_id,
            &task.title,
            &task.description,
            task.due_date.map(date_to_sql),
            &task.time,
            board.as_str(),
            task.is_daily_recurring,
            &task.parent_task_id,
            tags_json,
            &task.generation_key,
            now,
        ],
    )?;
    Ok(id)
}

impl Database {
    /// Create an ad hoc task.
    pub fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.with_conn(|conn| {
            let id = insert_task(conn, task, false)?;
            get_task_internal(conn, &id)?.ok_or_else(|| anyhow!("Task not found after insert: {}", id))
        })
    }

    /// Insert a keyed task, or return the task already holding the key.
    pub fn insert_task_if_absent(&self, task: &NewTask) -> Result<Task> {
        let Some(key) = task.generation_key.as_deref() else {
            return self.create_task(task);
        };

        self.with_conn(|conn| {
            insert_task(conn, task, true)?;
            let existing = conn
                .query_row(
                    "SELECT * FROM tasks WHERE generation_key = ?1",
                    params![key],
                    parse_task_row,
                )
                .optional()?;
            existing.ok_or_else(|| anyhow!("Task with generation key {} vanished", key))
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// Tasks owned by `user_id`, optionally restricted to one board, oldest first.
    pub fn list_tasks(&self, user_id: &str, board: Option<Board>) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks
                 WHERE user_id = ?1 AND (?2 IS NULL OR current_board = ?2)
                 ORDER BY created_at, id",
            )?;
            let tasks = stmt
                .query_map(params![user_id, board.map(|b| b.as_str())], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Update board placement and completion. `origin_board` is never written.
    pub fn set_task_board(
        &self,
        task_id: &str,
        board: Board,
        completed: bool,
        now: i64,
    ) -> Result<Task> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET
                    current_board = ?1,
                    is_completed = ?2,
                    completed_at = CASE WHEN ?2 THEN COALESCE(completed_at, ?3) ELSE NULL END,
                    updated_at = ?3
                 WHERE id = ?4",
                params![board.as_str(), completed, now, task_id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Task not found: {}", task_id));
            }
            get_task_internal(conn, task_id)?.ok_or_else(|| anyhow!("Task not found: {}", task_id))
        })
    }
}

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use task_rollover::db::Database;
use task_rollover::store::{DailyPlanner, NewClientTask, NewTask, RecordStore};
use task_rollover::types::{
    Board, Client, ClientTask, ClientTaskStatus, GenerationTemplate, LifecycleRecord, MonthRef,
    PublicApprovalLink, RecurrenceUpdate, Task, TaskKind, User,
};

/// Helper to create a fresh in-memory database for testing.
pub fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn month(s: &str) -> MonthRef {
    s.parse().unwrap()
}

/// Database with one user `u1` (UTC) and one client `c1`.
pub fn seeded_db() -> Database {
    let db = setup_db();
    db.create_user(Some("u1".into()), "Ana", Some("UTC")).unwrap();
    db.create_client(Some("c1".into()), "u1", "Acme").unwrap();
    db
}

/// Record store that fails on demand and otherwise delegates to SQLite.
pub struct FaultyStore {
    pub inner: Database,
    /// Users whose overdue query fails.
    pub fail_overdue_for: HashSet<String>,
    /// Number of upcoming `link_main_task` calls that fail.
    pub link_failures: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_overdue_for: HashSet::new(),
            link_failures: AtomicUsize::new(0),
        }
    }
}

impl RecordStore for FaultyStore {
    fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users()
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.inner.get_user(user_id)
    }

    fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        self.inner.get_client(client_id)
    }

    fn get_template(&self, template_id: &str) -> Result<Option<GenerationTemplate>> {
        self.inner.get_template(template_id)
    }

    fn list_active_templates(&self, user_id: &str) -> Result<Vec<GenerationTemplate>> {
        self.inner.list_active_templates(user_id)
    }

    fn list_generated_client_tasks(
        &self,
        client_id: &str,
        template_id: &str,
        month: MonthRef,
    ) -> Result<Vec<ClientTask>> {
        self.inner
            .list_generated_client_tasks(client_id, template_id, month)
    }

    fn insert_generated_client_task(&self, task: &NewClientTask) -> Result<Option<ClientTask>> {
        self.inner.insert_generated_client_task(task)
    }

    fn insert_task_if_absent(&self, task: &NewTask) -> Result<Task> {
        self.inner.insert_task_if_absent(task)
    }

    fn link_main_task(&self, client_task_id: &str, main_task_id: &str) -> Result<()> {
        let remaining = self.link_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.link_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("injected link failure"));
        }
        self.inner.link_main_task(client_task_id, main_task_id)
    }

    fn list_overdue_candidates(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<LifecycleRecord>> {
        if self.fail_overdue_for.contains(user_id) {
            return Err(anyhow!("injected overdue failure for {}", user_id));
        }
        self.inner.list_overdue_candidates(user_id, today)
    }

    fn mark_overdue(&self, kind: TaskKind, id: &str, now_ms: i64) -> Result<bool> {
        self.inner.mark_overdue(kind, id, now_ms)
    }

    fn advance_daily_recurring(
        &self,
        user_id: &str,
        today: NaiveDate,
        planner: &DailyPlanner<'_>,
    ) -> Result<Option<Vec<RecurrenceUpdate>>> {
        self.inner.advance_daily_recurring(user_id, today, planner)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.inner.get_task(task_id)
    }

    fn get_client_task(&self, client_task_id: &str) -> Result<Option<ClientTask>> {
        self.inner.get_client_task(client_task_id)
    }

    fn set_task_board(
        &self,
        task_id: &str,
        board: Board,
        completed: bool,
        now_ms: i64,
    ) -> Result<Task> {
        self.inner.set_task_board(task_id, board, completed, now_ms)
    }

    fn set_client_task_status(
        &self,
        client_task_id: &str,
        status: ClientTaskStatus,
        board: Board,
        completed: bool,
        now_ms: i64,
    ) -> Result<ClientTask> {
        self.inner
            .set_client_task_status(client_task_id, status, board, completed, now_ms)
    }

    fn get_approval_link(&self, token: &str) -> Result<Option<PublicApprovalLink>> {
        self.inner.get_approval_link(token)
    }

    fn list_tasks(&self, user_id: &str, board: Option<Board>) -> Result<Vec<Task>> {
        self.inner.list_tasks(user_id, board)
    }

    fn list_client_tasks(&self, client_id: &str) -> Result<Vec<ClientTask>> {
        self.inner.list_client_tasks(client_id)
    }
}

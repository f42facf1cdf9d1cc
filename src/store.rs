//! Record store contract consumed by the engine.
//!
//! The engine never talks SQL directly. Every read, conditional insert and
//! update it needs goes through [`RecordStore`], which the SQLite
//! [`Database`](crate::db::Database) implements. Store methods return
//! `anyhow::Result`; the engine lifts failures into
//! [`EngineError::Storage`](crate::error::EngineError::Storage).

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{
    Board, Client, ClientTask, ClientTaskStatus, GenerationTemplate, LifecycleRecord, MonthRef,
    PublicApprovalLink, RecurrenceUpdate, Task, TaskKind, User,
};

/// Fields for a new general task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<String>,
    /// Board the task is created on (defaults to `general`).
    #[serde(default)]
    pub board: Option<Board>,
    #[serde(default)]
    pub is_daily_recurring: bool,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Idempotency key; a second insert with the same key returns the first task.
    #[serde(default)]
    pub generation_key: Option<String>,
}

/// Fields for a new client task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewClientTask {
    pub client_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub month_year_reference: Option<MonthRef>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub board: Option<Board>,
    #[serde(default)]
    pub is_daily_recurring: bool,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub is_standard_task: bool,
    #[serde(default)]
    pub public_approval_enabled: bool,
    /// Generation slot; `None` for ad hoc tasks.
    #[serde(default)]
    pub slot: Option<crate::schedule::SlotKey>,
}

/// Scores daily-recurring records given the previous watermark.
pub type DailyPlanner<'a> =
    dyn Fn(Option<NaiveDate>, &[LifecycleRecord]) -> Vec<RecurrenceUpdate> + 'a;

/// Storage operations the core depends on.
///
/// Implementations must make `insert_generated_client_task` and
/// `insert_task_if_absent` conflict-tolerant on their uniqueness keys, and
/// `advance_daily_recurring` atomic with respect to the watermark and to
/// completions of the records it reads.
pub trait RecordStore: Send + Sync {
    // Tenants

    fn list_users(&self) -> Result<Vec<User>>;

    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    fn get_client(&self, client_id: &str) -> Result<Option<Client>>;

    // Templates and generation

    fn get_template(&self, template_id: &str) -> Result<Option<GenerationTemplate>>;

    /// Active templates across all of the user's clients.
    fn list_active_templates(&self, user_id: &str) -> Result<Vec<GenerationTemplate>>;

    /// Client tasks previously generated for (client, template, month).
    fn list_generated_client_tasks(
        &self,
        client_id: &str,
        template_id: &str,
        month: MonthRef,
    ) -> Result<Vec<ClientTask>>;

    /// Insert a generated client task; `Ok(None)` when its slot already exists.
    fn insert_generated_client_task(&self, task: &NewClientTask) -> Result<Option<ClientTask>>;

    /// Insert a task keyed by `generation_key`, returning the existing one on conflict.
    fn insert_task_if_absent(&self, task: &NewTask) -> Result<Task>;

    /// Point a client task at its mirrored general task.
    fn link_main_task(&self, client_task_id: &str, main_task_id: &str) -> Result<()>;

    // Rollover

    /// Incomplete, non-daily tasks of both kinds due before `today` and not yet overdue.
    fn list_overdue_candidates(&self, user_id: &str, today: NaiveDate)
    -> Result<Vec<LifecycleRecord>>;

    /// Move a record to the overdue board unless it is already there.
    /// Returns whether a row changed.
    fn mark_overdue(&self, kind: TaskKind, id: &str, now_ms: i64) -> Result<bool>;

    /// Claim the user's watermark for `today`, read their daily-recurring
    /// records and write what `planner` returns, all in one transaction.
    ///
    /// `planner` receives the watermark as it stood before the claim.
    /// Returns `None` (and writes nothing) when the watermark was already at
    /// or past `today`.
    fn advance_daily_recurring(
        &self,
        user_id: &str,
        today: NaiveDate,
        planner: &DailyPlanner<'_>,
    ) -> Result<Option<Vec<RecurrenceUpdate>>>;

    // Board transitions

    fn get_task(&self, task_id: &str) -> Result<Option<Task>>;

    fn get_client_task(&self, client_task_id: &str) -> Result<Option<ClientTask>>;

    /// Set `current_board` and completion state of a general task.
    fn set_task_board(&self, task_id: &str, board: Board, completed: bool, now_ms: i64)
    -> Result<Task>;

    /// Set status, board and completion state of a client task.
    fn set_client_task_status(
        &self,
        client_task_id: &str,
        status: ClientTaskStatus,
        board: Board,
        completed: bool,
        now_ms: i64,
    ) -> Result<ClientTask>;

    fn get_approval_link(&self, token: &str) -> Result<Option<PublicApprovalLink>>;

    // Presentation reads

    fn list_tasks(&self, user_id: &str, board: Option<Board>) -> Result<Vec<Task>>;

    fn list_client_tasks(&self, client_id: &str) -> Result<Vec<ClientTask>>;
}

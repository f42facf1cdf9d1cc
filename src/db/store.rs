//! [`RecordStore`] backed by SQLite.

use super::Database;
use crate::store::{DailyPlanner, NewClientTask, NewTask, RecordStore};
use crate::types::{
    Board, Client, ClientTask, ClientTaskStatus, GenerationTemplate, LifecycleRecord, MonthRef,
    PublicApprovalLink, RecurrenceUpdate, Task, TaskKind, User,
};
use anyhow::Result;
use chrono::NaiveDate;

impl RecordStore for Database {
    fn list_users(&self) -> Result<Vec<User>> {
        Database::list_users(self)
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Database::get_user(self, user_id)
    }

    fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Database::get_client(self, client_id)
    }

    fn get_template(&self, template_id: &str) -> Result<Option<GenerationTemplate>> {
        Database::get_template(self, template_id)
    }

    fn list_active_templates(&self, user_id: &str) -> Result<Vec<GenerationTemplate>> {
        Database::list_active_templates(self, user_id)
    }

    fn list_generated_client_tasks(
        &self,
        client_id: &str,
        template_id: &str,
        month: MonthRef,
    ) -> Result<Vec<ClientTask>> {
        Database::list_generated_client_tasks(self, client_id, template_id, month)
    }

    fn insert_generated_client_task(&self, task: &NewClientTask) -> Result<Option<ClientTask>> {
        Database::insert_generated_client_task(self, task)
    }

    fn insert_task_if_absent(&self, task: &NewTask) -> Result<Task> {
        Database::insert_task_if_absent(self, task)
    }

    fn link_main_task(&self, client_task_id: &str, main_task_id: &str) -> Result<()> {
        Database::link_main_task(self, client_task_id, main_task_id)
    }

    fn list_overdue_candidates(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<LifecycleRecord>> {
        Database::list_overdue_candidates(self, user_id, today)
    }

    fn mark_overdue(&self, kind: TaskKind, id: &str, now_ms: i64) -> Result<bool> {
        Database::mark_overdue(self, kind, id, now_ms)
    }

    fn advance_daily_recurring(
        &self,
        user_id: &str,
        today: NaiveDate,
        planner: &DailyPlanner<'_>,
    ) -> Result<Option<Vec<RecurrenceUpdate>>> {
        Database::advance_daily_recurring(self, user_id, today, planner)
    }

    fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        Database::get_task(self, task_id)
    }

    fn get_client_task(&self, client_task_id: &str) -> Result<Option<ClientTask>> {
        Database::get_client_task(self, client_task_id)
    }

    fn set_task_board(
        &self,
        task_id: &str,
        board: Board,
        completed: bool,
        now_ms: i64,
    ) -> Result<Task> {
        Database::set_task_board(self, task_id, board, completed, now_ms)
    }

    fn set_client_task_status(
        &self,
        client_task_id: &str,
        status: ClientTaskStatus,
        board: Board,
        completed: bool,
        now_ms: i64,
    ) -> Result<ClientTask> {
        Database::set_client_task_status(self, client_task_id, status, board, completed, now_ms)
    }

    fn get_approval_link(&self, token: &str) -> Result<Option<PublicApprovalLink>> {
        Database::get_approval_link(self, token)
    }

    fn list_tasks(&self, user_id: &str, board: Option<Board>) -> Result<Vec<Task>> {
        Database::list_tasks(self, user_id, board)
    }

    fn list_client_tasks(&self, client_id: &str) -> Result<Vec<ClientTask>> {
        Database::list_client_tasks(self, client_id)
    }
}

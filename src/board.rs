//! Board placement and client task status rules.
//!
//! Three actors drive changes. The owner may make any valid status
//! transition and any manual board move. An anonymous public approval link
//! may only settle a task that is under review. The system (rollover) never
//! changes status; it only demotes to `overdue`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::now_ms;
use crate::error::{EngineError, EngineResult};
use crate::store::RecordStore;
use crate::types::{Board, ClientTask, ClientTaskStatus, Task};

impl ClientTaskStatus {
    /// Statuses reachable in one step.
    pub fn exits(&self) -> &'static [ClientTaskStatus] {
        use ClientTaskStatus::*;
        match self {
            Pending => &[InProgress],
            InProgress => &[UnderReview, Completed],
            UnderReview => &[Approved, Rejected, EditRequested],
            Approved => &[Posted, Completed],
            Rejected | EditRequested => &[InProgress],
            Posted | Completed => &[],
        }
    }

    pub fn is_valid_transition(&self, to: ClientTaskStatus) -> bool {
        self.exits().contains(&to)
    }

    /// Absorbing statuses have no exits.
    pub fn is_terminal(&self) -> bool {
        self.exits().is_empty()
    }

    /// Decisions a public approval link may record.
    pub fn is_review_decision(&self) -> bool {
        matches!(
            self,
            ClientTaskStatus::Approved | ClientTaskStatus::Rejected | ClientTaskStatus::EditRequested
        )
    }
}

/// Who is asking for a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Owner { user_id: String },
    PublicLink { token: String },
    System,
}

/// What caused a board move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTrigger {
    Rollover,
    UserCompletion,
    Manual,
}

/// Check that `trigger` may move a record from `from` to `to`.
///
/// `overdue` is entered only by rollover and `completed` only by user
/// completion; rollover itself can target nothing else.
pub fn check_board_move(from: Board, to: Board, trigger: MoveTrigger) -> EngineResult<()> {
    let allowed = match (to, trigger) {
        (Board::Overdue, MoveTrigger::Rollover) => from != Board::Overdue,
        (_, MoveTrigger::Rollover) => false,
        (Board::Completed, MoveTrigger::UserCompletion) => true,
        (Board::Overdue | Board::Completed, _) => false,
        (_, MoveTrigger::Manual) => true,
        (_, MoveTrigger::UserCompletion) => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::invalid_transition(from, to))
    }
}

fn require_owner(actor: &Actor, owner_id: &str) -> EngineResult<()> {
    match actor {
        Actor::Owner { user_id } if user_id == owner_id => Ok(()),
        Actor::Owner { .. } => Err(EngineError::forbidden("task belongs to another user")),
        Actor::PublicLink { .. } => Err(EngineError::forbidden(
            "public links may only review client tasks",
        )),
        Actor::System => Err(EngineError::forbidden(
            "system actor cannot change tasks directly",
        )),
    }
}

/// Mark a task done.
///
/// A daily-recurring task only raises its completion flag and stays on its
/// board so the next rollover can count it and reset it. Any other task moves
/// to `completed`. Completing a completed task is a no-op.
pub fn complete_task(store: &dyn RecordStore, actor: &Actor, task_id: &str) -> EngineResult<Task> {
    let task = store
        .get_task(task_id)?
        .ok_or_else(|| EngineError::not_found("task", task_id))?;
    require_owner(actor, &task.user_id)?;

    if task.is_completed {
        return Ok(task);
    }

    let board = if task.is_daily_recurring {
        task.current_board
    } else {
        check_board_move(task.current_board, Board::Completed, MoveTrigger::UserCompletion)?;
        Board::Completed
    };
    let updated = store.set_task_board(task_id, board, true, now_ms())?;
    info!(task_id, board = %board, "Task completed");
    Ok(updated)
}

/// Manually move a task to another board.
///
/// Moving a task off `completed` reopens it.
pub fn move_task_board(
    store: &dyn RecordStore,
    actor: &Actor,
    task_id: &str,
    to: Board,
) -> EngineResult<Task> {
    let task = store
        .get_task(task_id)?
        .ok_or_else(|| EngineError::not_found("task", task_id))?;
    require_owner(actor, &task.user_id)?;
    check_board_move(task.current_board, to, MoveTrigger::Manual)?;

    let completed = task.is_completed && task.current_board != Board::Completed;
    let updated = store.set_task_board(task_id, to, completed, now_ms())?;
    debug!(task_id, from = %task.current_board, to = %to, "Task moved");
    Ok(updated)
}

/// Move a client task to a new status on behalf of `actor`.
///
/// Reaching `posted` or `completed` marks the task done and moves it to the
/// `completed` board.
pub fn transition_client_task(
    store: &dyn RecordStore,
    actor: &Actor,
    client_task_id: &str,
    to: ClientTaskStatus,
) -> EngineResult<ClientTask> {
    let task = store
        .get_client_task(client_task_id)?
        .ok_or_else(|| EngineError::not_found("client task", client_task_id))?;
    let now = now_ms();

    match actor {
        Actor::PublicLink { token } => authorize_public_review(store, token, &task, to, now)?,
        other => require_owner(other, &task.user_id)?,
    }

    if !task.status.is_valid_transition(to) {
        return Err(EngineError::invalid_transition(task.status, to));
    }

    let (board, completed) = if to.is_done() {
        (Board::Completed, true)
    } else {
        (task.current_board, false)
    };
    let updated = store.set_client_task_status(client_task_id, to, board, completed, now)?;
    info!(
        client_task_id,
        from = %task.status,
        to = %to,
        "Client task status changed"
    );
    Ok(updated)
}

fn authorize_public_review(
    store: &dyn RecordStore,
    token: &str,
    task: &ClientTask,
    to: ClientTaskStatus,
    now: i64,
) -> EngineResult<()> {
    let link = store
        .get_approval_link(token)?
        .ok_or_else(|| EngineError::forbidden("unknown approval link"))?;
    if link.is_expired(now) {
        return Err(EngineError::forbidden("approval link has expired"));
    }
    if link.client_id != task.client_id {
        return Err(EngineError::forbidden(
            "approval link does not cover this client",
        ));
    }
    if !task.public_approval_enabled {
        return Err(EngineError::forbidden(
            "public approval is not enabled for this task",
        ));
    }
    if task.status != ClientTaskStatus::UnderReview || !to.is_review_decision() {
        return Err(EngineError::forbidden(
            "public links may only approve, reject or request edits on tasks under review",
        ));
    }
    Ok(())
}

/// Record a client's review decision through a public approval link.
pub fn review_via_link(
    store: &dyn RecordStore,
    token: &str,
    client_task_id: &str,
    decision: ClientTaskStatus,
) -> EngineResult<ClientTask> {
    let actor = Actor::PublicLink {
        token: token.to_string(),
    };
    transition_client_task(store, &actor, client_task_id, decision)
}

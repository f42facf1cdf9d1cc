//! Rollover reads and writes shared by tasks and client tasks.
//!
//! Both tables carry the same lifecycle columns, so every query here runs
//! once per [`TaskKind`] and results are merged.

use super::{Database, date_column, date_to_sql, enum_column, json_column, now_ms};
use crate::store::DailyPlanner;
use crate::types::{LifecycleRecord, RecurrenceMetrics, RecurrenceUpdate, TaskKind};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

const KINDS: [TaskKind; 2] = [TaskKind::Task, TaskKind::ClientTask];

/// Decode the recurrence metric columns of a task row.
pub(crate) fn parse_metrics(row: &Row) -> rusqlite::Result<RecurrenceMetrics> {
    Ok(RecurrenceMetrics {
        streak: row.get("recurrence_streak")?,
        total_completed: row.get("total_completed")?,
        missed_days: json_column(row, "missed_days")?,
        fail_by_weekday: json_column(row, "fail_by_weekday")?,
        success_rate: row.get("success_rate")?,
    })
}

fn parse_lifecycle_row(kind: TaskKind, row: &Row) -> rusqlite::Result<LifecycleRecord> {
    Ok(LifecycleRecord {
        kind,
        id: row.get("id")?,
        due_date: date_column(row, "due_date")?,
        is_completed: row.get("is_completed")?,
        current_board: enum_column(row, "current_board")?,
        is_daily_recurring: row.get("is_daily_recurring")?,
        metrics: parse_metrics(row)?,
        last_moved_to_overdue_at: row.get("last_moved_to_overdue_at")?,
    })
}

fn query_lifecycle(
    conn: &Connection,
    kind: TaskKind,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<LifecycleRecord>> {
    let sql = format!(
        "SELECT id, due_date, is_completed, current_board, is_daily_recurring,
                recurrence_streak, total_completed, missed_days, fail_by_weekday,
                success_rate, last_moved_to_overdue_at
         FROM {} WHERE {} ORDER BY created_at, id",
        kind.table(),
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params, |row| parse_lifecycle_row(kind, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

impl Database {
    pub fn list_overdue_candidates(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<LifecycleRecord>> {
        let today = date_to_sql(today);
        self.with_conn(|conn| {
            let mut records = Vec::new();
            for kind in KINDS {
                records.extend(query_lifecycle(
                    conn,
                    kind,
                    "user_id = ?1
                     AND is_completed = 0
                     AND is_daily_recurring = 0
                     AND due_date IS NOT NULL
                     AND due_date < ?2
                     AND current_board != 'overdue'",
                    params![user_id, &today],
                )?);
            }
            Ok(records)
        })
    }

    /// Conditional demotion; a record already on `overdue` keeps its timestamp.
    pub fn mark_overdue(&self, kind: TaskKind, id: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE {} SET
                        current_board = 'overdue',
                        last_moved_to_overdue_at = ?1,
                        updated_at = ?1
                     WHERE id = ?2 AND current_board != 'overdue' AND is_completed = 0",
                    kind.table()
                ),
                params![now, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Claim the watermark for `today`, then score and write the user's
    /// daily-recurring records in the same transaction.
    ///
    /// The claim is a conditional update of `users.last_rollover_date`. When
    /// it matches no row another run already advanced this user for `today`;
    /// the transaction is rolled back untouched and `None` is returned.
    /// Records are read only after the claim, so a completion that lands
    /// before the write is either seen by `planner` or waits for the commit.
    pub fn advance_daily_recurring(
        &self,
        user_id: &str,
        today: NaiveDate,
        planner: &DailyPlanner<'_>,
    ) -> Result<Option<Vec<RecurrenceUpdate>>> {
        let today_sql = date_to_sql(today);
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let previous: Option<Option<NaiveDate>> = tx
                .query_row(
                    "SELECT last_rollover_date FROM users WHERE id = ?1",
                    params![user_id],
                    |row| date_column(row, "last_rollover_date"),
                )
                .optional()?;
            let Some(previous) = previous else {
                return Ok(None);
            };

            let claimed = tx.execute(
                "UPDATE users SET last_rollover_date = ?1
                 WHERE id = ?2 AND (last_rollover_date IS NULL OR last_rollover_date < ?1)",
                params![&today_sql, user_id],
            )?;
            if claimed == 0 {
                // Dropping the transaction rolls it back
                return Ok(None);
            }

            let mut records = Vec::new();
            for kind in KINDS {
                records.extend(query_lifecycle(
                    &tx,
                    kind,
                    "user_id = ?1 AND is_daily_recurring = 1",
                    params![user_id],
                )?);
            }

            let updates = planner(previous, &records);
            for update in &updates {
                write_recurrence(&tx, update, now)?;
            }

            tx.commit()?;
            Ok(Some(updates))
        })
    }
}

fn write_recurrence(conn: &Connection, update: &RecurrenceUpdate, now: i64) -> Result<()> {
    let missed_days = serde_json::to_string(&update.metrics.missed_days)?;
    let fail_by_weekday = serde_json::to_string(&update.metrics.fail_by_weekday)?;
    conn.execute(
        &format!(
            "UPDATE {} SET
                recurrence_streak = ?1,
                total_completed = ?2,
                missed_days = ?3,
                fail_by_weekday = ?4,
                success_rate = ?5,
                is_completed = 0,
                completed_at = NULL,
                due_date = COALESCE(?6, due_date),
                updated_at = ?7
             WHERE id = ?8",
            update.kind.table()
        ),
        params![
            update.metrics.streak,
            update.metrics.total_completed,
            missed_days,
            fail_by_weekday,
            update.metrics.success_rate,
            update.due_date.map(date_to_sql),
            now,
            &update.id,
        ],
    )?;
    Ok(())
}

//! Daily rollover across all users.
//!
//! Each user is rolled over independently on a bounded pool of blocking
//! workers. Within a user the steps run in order:
//!
//! 1. demote incomplete, non-recurring tasks that went past due to `overdue`;
//! 2. advance daily-recurring streaks for every day since the last run,
//!    guarded by the user's `last_rollover_date` watermark;
//! 3. generate this month's (and, within the lookahead, next month's)
//!    client tasks for every active template.
//!
//! Steps 1 and 3 are idempotent on their own and rerun on every trigger.
//! A failure in one step is recorded and the remaining steps still run. A
//! failure for one user never affects another.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::board::{MoveTrigger, check_board_move};
use crate::config::RolloverConfig;
use crate::error::{EngineError, EngineResult};
use crate::notify::{DigestNotifier, RolloverDigest};
use crate::schedule::generate_for_template;
use crate::store::RecordStore;
use crate::timezone::{local_today, parse_timezone, resolve_user_timezone};
use crate::types::{Board, LifecycleRecord, MonthRef, RecurrenceUpdate, User};

/// Engine knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct RolloverSettings {
    pub default_timezone: Tz,
    pub max_concurrency: usize,
    pub generation_lookahead_days: i64,
}

impl Default for RolloverSettings {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            max_concurrency: 4,
            generation_lookahead_days: 0,
        }
    }
}

impl RolloverSettings {
    pub fn from_config(config: &RolloverConfig) -> EngineResult<Self> {
        Ok(Self {
            default_timezone: parse_timezone(&config.default_timezone)?,
            max_concurrency: config.max_concurrency.max(1),
            generation_lookahead_days: config.generation_lookahead_days.max(0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Daily advancement ran for this date.
    Processed,
    /// Advancement had already run for this date; idempotent steps reran.
    Skipped,
    /// At least one step failed.
    Failed,
}

/// Result of one user's rollover.
#[derive(Debug, Clone, Serialize)]
pub struct UserRollover {
    pub user_id: String,
    pub status: UserStatus,
    pub today: Option<NaiveDate>,
    pub timezone: String,
    pub moved_to_overdue: usize,
    /// Daily-recurring tasks advanced; `None` when the watermark was already claimed.
    pub advanced: Option<usize>,
    pub generated: usize,
    /// Templates rejected for bad data; these do not fail the user.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl UserRollover {
    fn new(user_id: &str, tz: Tz, today: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            status: UserStatus::Skipped,
            today: Some(today),
            timezone: tz.name().to_string(),
            moved_to_overdue: 0,
            advanced: None,
            generated: 0,
            template_errors: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn failed(user_id: &str, reason: String) -> Self {
        Self {
            user_id: user_id.to_string(),
            status: UserStatus::Failed,
            today: None,
            timezone: String::new(),
            moved_to_overdue: 0,
            advanced: None,
            generated: 0,
            template_errors: Vec::new(),
            errors: vec![reason],
        }
    }
}

/// Aggregate over all users.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloverSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub users: Vec<UserRollover>,
}

impl RolloverSummary {
    fn from_users(users: Vec<UserRollover>) -> Self {
        let count = |s: UserStatus| users.iter().filter(|u| u.status == s).count();
        Self {
            processed: count(UserStatus::Processed),
            skipped: count(UserStatus::Skipped),
            failed: count(UserStatus::Failed),
            users,
        }
    }
}

pub struct RolloverEngine {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn DigestNotifier>,
    settings: RolloverSettings,
}

impl RolloverEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn DigestNotifier>,
        settings: RolloverSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &RolloverSettings {
        &self.settings
    }

    /// Roll over every user.
    ///
    /// `date_override` replaces each user's local today (backfill and tests).
    /// Only a failure to list users is returned as an error.
    pub async fn run_all(
        &self,
        now: DateTime<Utc>,
        date_override: Option<NaiveDate>,
    ) -> EngineResult<RolloverSummary> {
        let store = self.store.clone();
        let users = tokio::task::spawn_blocking(move || store.list_users())
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("user listing panicked: {}", e)))??;

        info!(users = users.len(), "Starting rollover");

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        for (position, user) in users.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let notifier = self.notifier.clone();
            let settings = self.settings.clone();
            set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        roll_user_blocking(store, notifier, settings, user, now, date_override)
                            .await
                    }
                    Err(e) => UserRollover::failed(&user.id, e.to_string()),
                };
                (position, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => outcomes.push(entry),
                Err(e) => error!(error = %e, "Rollover worker aborted"),
            }
        }
        outcomes.sort_by_key(|(position, _)| *position);

        let summary = RolloverSummary::from_users(outcomes.into_iter().map(|(_, o)| o).collect());
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Rollover finished"
        );
        Ok(summary)
    }

    /// Roll over a single user.
    pub async fn run_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        date_override: Option<NaiveDate>,
    ) -> EngineResult<UserRollover> {
        let store = self.store.clone();
        let id = user_id.to_string();
        let user = tokio::task::spawn_blocking(move || store.get_user(&id))
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("user lookup panicked: {}", e)))??
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        Ok(roll_user_blocking(
            self.store.clone(),
            self.notifier.clone(),
            self.settings.clone(),
            user,
            now,
            date_override,
        )
        .await)
    }
}

/// Run one user's steps on the blocking pool, then send the digest.
async fn roll_user_blocking(
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn DigestNotifier>,
    settings: RolloverSettings,
    user: User,
    now: DateTime<Utc>,
    date_override: Option<NaiveDate>,
) -> UserRollover {
    let user_id = user.id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        roll_user(store.as_ref(), &settings, &user, now, date_override)
    })
    .await;

    match joined {
        Ok((outcome, digest)) => {
            if let Err(e) = notifier.notify(&digest).await {
                warn!(user_id = %user_id, error = %e, "Digest notification failed");
            }
            outcome
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Rollover panicked");
            UserRollover::failed(&user_id, format!("rollover panicked: {}", e))
        }
    }
}

/// All rollover steps for one user. Never returns early on a step failure.
pub fn roll_user(
    store: &dyn RecordStore,
    settings: &RolloverSettings,
    user: &User,
    now: DateTime<Utc>,
    date_override: Option<NaiveDate>,
) -> (UserRollover, RolloverDigest) {
    let tz = resolve_user_timezone(&user.id, user.timezone.as_deref(), settings.default_timezone);
    let today = date_override.unwrap_or_else(|| local_today(now, tz));
    let mut outcome = UserRollover::new(&user.id, tz, today);
    let mut digest = RolloverDigest {
        user_id: user.id.clone(),
        date: Some(today),
        ..Default::default()
    };

    match demote_overdue(store, &user.id, today, now.timestamp_millis()) {
        Ok(moved) => {
            outcome.moved_to_overdue = moved;
            digest.moved_to_overdue = moved;
        }
        Err(e) => record_failure(&mut outcome, "overdue", e),
    }

    match advance_daily(store, &user.id, today) {
        Ok(Some(advance)) => {
            outcome.advanced = Some(advance.records);
            digest.recurring_completed = advance.completed;
            digest.recurring_missed = advance.missed;
        }
        Ok(None) => debug!(user_id = %user.id, %today, "Daily advancement already done"),
        Err(e) => record_failure(&mut outcome, "advancement", e),
    }

    for month in generation_months(today, settings.generation_lookahead_days) {
        generate_month(store, &user.id, month, &mut outcome);
    }
    digest.generated = outcome.generated;

    outcome.status = if !outcome.errors.is_empty() {
        UserStatus::Failed
    } else if outcome.advanced.is_some() {
        UserStatus::Processed
    } else {
        UserStatus::Skipped
    };

    info!(
        user_id = %user.id,
        %today,
        status = ?outcome.status,
        overdue = outcome.moved_to_overdue,
        generated = outcome.generated,
        "User rollover complete"
    );
    (outcome, digest)
}

fn record_failure(outcome: &mut UserRollover, step: &str, e: EngineError) {
    error!(user_id = %outcome.user_id, step, error = %e, "Rollover step failed");
    outcome.errors.push(format!("{}: {}", step, e));
}

/// Move past-due, incomplete, non-recurring records to `overdue`.
fn demote_overdue(
    store: &dyn RecordStore,
    user_id: &str,
    today: NaiveDate,
    now_ms: i64,
) -> EngineResult<usize> {
    let mut moved = 0;
    for record in store.list_overdue_candidates(user_id, today)? {
        if check_board_move(record.current_board, Board::Overdue, MoveTrigger::Rollover).is_err() {
            continue;
        }
        if store.mark_overdue(record.kind, &record.id, now_ms)? {
            moved += 1;
        }
    }
    if moved > 0 {
        debug!(user_id, moved, "Moved tasks to overdue");
    }
    Ok(moved)
}

/// Oldest day a single advancement will backfill.
const MAX_BACKFILL_DAYS: i64 = 366;

struct Advancement {
    records: usize,
    completed: usize,
    missed: usize,
}

/// Score every day since the last advancement for each daily-recurring
/// record and reset it for today.
///
/// Returns `None` when the watermark shows this user was already advanced
/// for `today`.
fn advance_daily(
    store: &dyn RecordStore,
    user_id: &str,
    today: NaiveDate,
) -> EngineResult<Option<Advancement>> {
    let Some(yesterday) = today.pred_opt() else {
        return Err(EngineError::validation("date", "no day precedes the given date"));
    };

    let planner = |watermark: Option<NaiveDate>, records: &[LifecycleRecord]| {
        plan_daily(watermark, records, yesterday, today)
    };
    let Some(updates) = store.advance_daily_recurring(user_id, today, &planner)? else {
        return Ok(None);
    };

    let advancement = Advancement {
        records: updates.len(),
        completed: updates.iter().map(|u| u.completed).sum(),
        missed: updates.iter().map(|u| u.missed).sum(),
    };
    if advancement.missed > 0 {
        debug!(user_id, missed = advancement.missed, "Recorded missed recurring days");
    }
    Ok(Some(advancement))
}

/// Work out the recurrence updates for the days `first..=yesterday`, where
/// `first` is the previous watermark (or yesterday on a user's first run).
///
/// A record is scored from its due date when that is later, and a
/// completion only counts for the first scored day: once the watermark
/// moves past a day, the instance for that day is gone.
pub fn plan_daily(
    watermark: Option<NaiveDate>,
    records: &[LifecycleRecord],
    yesterday: NaiveDate,
    today: NaiveDate,
) -> Vec<RecurrenceUpdate> {
    let floor = yesterday - Duration::days(MAX_BACKFILL_DAYS - 1);
    let first = watermark.unwrap_or(yesterday).max(floor);

    records
        .iter()
        .filter_map(|record| {
            let start = record.due_date.map_or(first, |due| due.max(first));
            if start > yesterday {
                return None;
            }

            let mut metrics = record.metrics.clone();
            let (mut completed, mut missed) = (0, 0);
            for day in start.iter_days().take_while(|d| *d <= yesterday) {
                let done = record.is_completed && day == start;
                if done {
                    completed += 1;
                } else {
                    missed += 1;
                }
                metrics = metrics.advance(done, day);
            }

            Some(RecurrenceUpdate {
                kind: record.kind,
                id: record.id.clone(),
                metrics,
                due_date: Some(today),
                completed,
                missed,
            })
        })
        .collect()
}

/// The current month, plus the next one once it is within `lookahead_days`.
pub fn generation_months(today: NaiveDate, lookahead_days: i64) -> Vec<MonthRef> {
    let current = MonthRef::of(today);
    let mut months = vec![current];
    if lookahead_days > 0 {
        let next = current.next();
        if next.first_day() - today <= Duration::days(lookahead_days) {
            months.push(next);
        }
    }
    months
}

fn generate_month(store: &dyn RecordStore, user_id: &str, month: MonthRef, outcome: &mut UserRollover) {
    let templates = match store.list_active_templates(user_id) {
        Ok(templates) => templates,
        Err(e) => {
            record_failure(outcome, "generation", e.into());
            return;
        }
    };

    for template in templates {
        match generate_for_template(store, &template.client_id, &template.id, month) {
            Ok(generated) => outcome.generated += generated.created.len(),
            Err(e) if e.is_template_scoped() => {
                warn!(
                    user_id,
                    template_id = %template.id,
                    error = %e,
                    "Template rejected"
                );
                outcome
                    .template_errors
                    .push(format!("{} ({}): {}", template.id, month, e));
            }
            Err(e) => record_failure(outcome, "generation", e),
        }
    }
}

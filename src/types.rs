//! Core types for the rollover engine.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Board (lane) a general task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    General,
    TodayHighPriority,
    TodayMediumPriority,
    Urgent,
    WeekLowPriority,
    Overdue,
    Completed,
}

impl Board {
    pub const ALL: [Board; 7] = [
        Board::General,
        Board::TodayHighPriority,
        Board::TodayMediumPriority,
        Board::Urgent,
        Board::WeekLowPriority,
        Board::Overdue,
        Board::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Board::General => "general",
            Board::TodayHighPriority => "today_high_priority",
            Board::TodayMediumPriority => "today_medium_priority",
            Board::Urgent => "urgent",
            Board::WeekLowPriority => "week_low_priority",
            Board::Overdue => "overdue",
            Board::Completed => "completed",
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Board {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Board::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| EngineError::validation("board", format!("unknown board '{}'", s)))
    }
}

/// Workflow status of a client task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientTaskStatus {
    Pending,
    InProgress,
    UnderReview,
    Approved,
    Rejected,
    EditRequested,
    Posted,
    Completed,
}

impl ClientTaskStatus {
    pub const ALL: [ClientTaskStatus; 8] = [
        ClientTaskStatus::Pending,
        ClientTaskStatus::InProgress,
        ClientTaskStatus::UnderReview,
        ClientTaskStatus::Approved,
        ClientTaskStatus::Rejected,
        ClientTaskStatus::EditRequested,
        ClientTaskStatus::Posted,
        ClientTaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientTaskStatus::Pending => "pending",
            ClientTaskStatus::InProgress => "in_progress",
            ClientTaskStatus::UnderReview => "under_review",
            ClientTaskStatus::Approved => "approved",
            ClientTaskStatus::Rejected => "rejected",
            ClientTaskStatus::EditRequested => "edit_requested",
            ClientTaskStatus::Posted => "posted",
            ClientTaskStatus::Completed => "completed",
        }
    }

    /// Statuses that count the task as done.
    pub fn is_done(&self) -> bool {
        matches!(self, ClientTaskStatus::Posted | ClientTaskStatus::Completed)
    }
}

impl fmt::Display for ClientTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientTaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientTaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| EngineError::validation("status", format!("unknown status '{}'", s)))
    }
}

/// Lowercase weekday name used as the `fail_by_weekday` key.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Streak and failure metrics carried by daily-recurring tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceMetrics {
    pub streak: u32,
    pub total_completed: u32,
    pub missed_days: BTreeSet<NaiveDate>,
    pub fail_by_weekday: BTreeMap<String, u32>,
    pub success_rate: f64,
}

impl RecurrenceMetrics {
    /// `total_completed / (total_completed + |missed_days|)`, 0 when nothing was tracked yet.
    pub fn compute_success_rate(&self) -> f64 {
        let completed = self.total_completed as f64;
        let denominator = completed + self.missed_days.len() as f64;
        if denominator == 0.0 {
            0.0
        } else {
            completed / denominator
        }
    }

    /// Record the outcome of `day` and return the advanced metrics.
    ///
    /// A day already present in `missed_days` is not counted twice.
    pub fn advance(&self, completed: bool, day: NaiveDate) -> RecurrenceMetrics {
        let mut next = self.clone();
        if completed {
            next.streak += 1;
            next.total_completed += 1;
        } else {
            if next.missed_days.insert(day) {
                *next
                    .fail_by_weekday
                    .entry(weekday_key(day.weekday()).to_string())
                    .or_insert(0) += 1;
            }
            next.streak = 0;
        }
        next.success_rate = next.compute_success_rate();
        next
    }
}

/// A calendar month used as the billing/generation period (`YYYY-MM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthRef {
    year: i32,
    month: u32,
}

impl MonthRef {
    pub fn new(year: i32, month: u32) -> Result<Self, EngineError> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::validation(
                "month",
                format!("month {} out of range 1..=12", month),
            ));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month is validated on construction, day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for MonthRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::validation("month", format!("expected YYYY-MM, got '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthRef::new(year, month)
    }
}

impl Serialize for MonthRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A tenant whose boards are rolled over daily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// IANA timezone name; the configured default applies when unset.
    pub timezone: Option<String>,
    pub last_rollover_date: Option<NaiveDate>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: i64,
}

/// A general dashboard task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub time: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<i64>,
    pub origin_board: Board,
    pub current_board: Board,
    pub is_daily_recurring: bool,
    pub metrics: RecurrenceMetrics,
    pub parent_task_id: Option<String>,
    pub last_moved_to_overdue_at: Option<i64>,
    pub tags: Vec<String>,
    pub generation_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A task scoped to a client engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTask {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub template_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: ClientTaskStatus,
    pub month_year_reference: Option<MonthRef>,
    pub due_date: Option<NaiveDate>,
    pub time: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<i64>,
    pub origin_board: Board,
    pub current_board: Board,
    pub is_daily_recurring: bool,
    pub metrics: RecurrenceMetrics,
    pub parent_task_id: Option<String>,
    pub last_moved_to_overdue_at: Option<i64>,
    pub main_task_id: Option<String>,
    pub is_standard_task: bool,
    pub order_index: i64,
    pub public_approval_enabled: bool,
    pub slot_date: Option<NaiveDate>,
    pub slot_index: Option<u32>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Recipe producing recurring client tasks each month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTemplate {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: Option<String>,
    pub delivery_count: u32,
    pub generation_pattern: Vec<crate::schedule::pattern::RawPatternEntry>,
    /// Decode failure of the stored pattern; such a template is rejected at generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_error: Option<String>,
    pub default_due_days: i64,
    pub fifth_week: crate::schedule::pattern::FifthWeek,
    pub is_active: bool,
    pub is_standard_task: bool,
    pub public_approval_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Time-limited anonymous review entry point for one client's tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicApprovalLink {
    pub token: String,
    pub client_id: String,
    pub expires_at: i64,
    pub created_at: i64,
}

impl PublicApprovalLink {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Which table a lifecycle record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Task,
    ClientTask,
}

impl TaskKind {
    pub fn table(&self) -> &'static str {
        match self {
            TaskKind::Task => "tasks",
            TaskKind::ClientTask => "client_tasks",
        }
    }
}

/// The slice of a task/client task the rollover reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleRecord {
    pub kind: TaskKind,
    pub id: String,
    pub due_date: Option<NaiveDate>,
    pub is_completed: bool,
    pub current_board: Board,
    pub is_daily_recurring: bool,
    pub metrics: RecurrenceMetrics,
    pub last_moved_to_overdue_at: Option<i64>,
}

/// New recurrence state for one daily task, written by advancement.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceUpdate {
    pub kind: TaskKind,
    pub id: String,
    pub metrics: RecurrenceMetrics,
    pub due_date: Option<NaiveDate>,
    /// Days this update scored as completed.
    pub completed: usize,
    /// Days this update scored as missed.
    pub missed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_board_roundtrip_names() {
        for board in Board::ALL {
            assert_eq!(board.as_str().parse::<Board>().unwrap(), board);
        }
        assert!("backlog".parse::<Board>().is_err());
    }

    #[test]
    fn test_success_rate_zero_when_untracked() {
        assert_eq!(RecurrenceMetrics::default().compute_success_rate(), 0.0);
    }

    #[test]
    fn test_advance_completed_day() {
        let metrics = RecurrenceMetrics {
            streak: 2,
            total_completed: 3,
            missed_days: [date(2024, 3, 1)].into_iter().collect(),
            ..Default::default()
        };
        let next = metrics.advance(true, date(2024, 3, 5));
        assert_eq!(next.streak, 3);
        assert_eq!(next.total_completed, 4);
        assert_eq!(next.missed_days.len(), 1);
        assert!((next.success_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_advance_missed_day() {
        let metrics = RecurrenceMetrics {
            streak: 4,
            total_completed: 1,
            ..Default::default()
        };
        // 2024-03-05 is a Tuesday
        let next = metrics.advance(false, date(2024, 3, 5));
        assert_eq!(next.streak, 0);
        assert_eq!(next.total_completed, 1);
        assert!(next.missed_days.contains(&date(2024, 3, 5)));
        assert_eq!(next.fail_by_weekday.get("tuesday"), Some(&1));
        assert!((next.success_rate - 0.5).abs() < f64::EPSILON);

        // Same day again does not double count
        let again = next.advance(false, date(2024, 3, 5));
        assert_eq!(again.missed_days.len(), 1);
        assert_eq!(again.fail_by_weekday.get("tuesday"), Some(&1));
    }

    #[test]
    fn test_month_ref_parse_and_bounds() {
        let month: MonthRef = "2024-02".parse().unwrap();
        assert_eq!(month.to_string(), "2024-02");
        assert_eq!(month.first_day(), date(2024, 2, 1));
        assert_eq!(month.last_day(), date(2024, 2, 29));
        assert_eq!(
            "2024-12".parse::<MonthRef>().unwrap().next().to_string(),
            "2025-01"
        );
        assert!("2024-13".parse::<MonthRef>().is_err());
        assert!("march".parse::<MonthRef>().is_err());
    }
}

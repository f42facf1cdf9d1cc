//! Week/weekday pattern expansion.
//!
//! A generation pattern is an ordered list of `{week, day_of_week, count}`
//! entries. Each entry resolves to the `week`-th occurrence of `day_of_week`
//! in the reference month, shifted by the template's `default_due_days`, and
//! emits `count` independent task slots on that date.
//!
//! Expansion is pure: the same pattern, month and offset always yield the
//! same slots in the same order.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::types::MonthRef;

/// Weekday as stored in a pattern: a name (`"monday"`, `"Mon"`) or an index
/// where 0 is Sunday and 6 is Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DayOfWeek {
    Index(i64),
    Name(String),
}

impl DayOfWeek {
    pub fn resolve(&self) -> Option<Weekday> {
        match self {
            DayOfWeek::Index(i) => weekday_from_index(*i),
            DayOfWeek::Name(name) => {
                let name = name.trim();
                match name.parse::<i64>() {
                    Ok(i) => weekday_from_index(i),
                    Err(_) => name.parse::<Weekday>().ok(),
                }
            }
        }
    }
}

fn weekday_from_index(i: i64) -> Option<Weekday> {
    match i {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Pattern entry exactly as persisted on the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPatternEntry {
    pub week: i64,
    pub day_of_week: DayOfWeek,
    #[serde(default = "default_count")]
    pub count: i64,
}

fn default_count() -> i64 {
    1
}

impl RawPatternEntry {
    pub fn new(week: i64, day: Weekday, count: i64) -> Self {
        Self {
            week,
            day_of_week: DayOfWeek::Name(crate::types::weekday_key(day).to_string()),
            count,
        }
    }

    /// Check ranges and resolve the weekday.
    pub fn validate(&self, position: usize) -> EngineResult<PatternEntry> {
        if !(1..=5).contains(&self.week) {
            return Err(EngineError::validation(
                "generation_pattern.week",
                format!("entry {}: week {} is outside 1..=5", position, self.week),
            ));
        }
        let weekday = self.day_of_week.resolve().ok_or_else(|| {
            EngineError::validation(
                "generation_pattern.day_of_week",
                format!(
                    "entry {}: unrecognized weekday {:?}",
                    position, self.day_of_week
                ),
            )
        })?;
        let count = u32::try_from(self.count).map_err(|_| {
            EngineError::validation(
                "generation_pattern.count",
                format!("entry {}: count {} must be >= 0", position, self.count),
            )
        })?;
        Ok(PatternEntry {
            week: self.week as u8,
            weekday,
            count,
        })
    }
}

/// A validated pattern entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEntry {
    pub week: u8,
    pub weekday: Weekday,
    pub count: u32,
}

/// How `week = 5` is resolved in months with only four occurrences of the weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FifthWeek {
    /// Only a literal fifth occurrence counts; otherwise the entry is skipped.
    #[default]
    Skip,
    /// Week 5 means the last occurrence of the weekday in the month.
    Last,
}

impl FifthWeek {
    pub fn as_str(&self) -> &'static str {
        match self {
            FifthWeek::Skip => "skip",
            FifthWeek::Last => "last",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "last" => FifthWeek::Last,
            _ => FifthWeek::Skip,
        }
    }
}

/// `count` task slots due on `due_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSlot {
    pub due_date: NaiveDate,
    pub count: u32,
}

/// Identity of one generated instance within a template and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub due_date: NaiveDate,
    pub slot_index: u32,
}

/// Date of the `week`-th `weekday` of `month`, or `None` when it does not exist.
pub fn nth_weekday(month: MonthRef, weekday: Weekday, week: u8, fifth: FifthWeek) -> Option<NaiveDate> {
    if let Some(date) =
        NaiveDate::from_weekday_of_month_opt(month.year(), month.month(), weekday, week)
    {
        return Some(date);
    }
    if week == 5 && fifth == FifthWeek::Last {
        let last = month.last_day();
        let back = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
        return Some(last - Duration::days(back as i64));
    }
    None
}

/// Resolve `pattern` to dated slots for `month`.
///
/// Every entry is validated before any date is computed, so a malformed
/// entry rejects the whole pattern. Entries whose occurrence does not exist
/// in the month are skipped.
pub fn expand_pattern(
    pattern: &[RawPatternEntry],
    month: MonthRef,
    default_due_days: i64,
    fifth: FifthWeek,
) -> EngineResult<Vec<PatternSlot>> {
    let entries = pattern
        .iter()
        .enumerate()
        .map(|(i, raw)| raw.validate(i))
        .collect::<EngineResult<Vec<_>>>()?;

    let offset = Duration::try_days(default_due_days).ok_or_else(|| {
        EngineError::validation(
            "default_due_days",
            format!("offset {} is out of range", default_due_days),
        )
    })?;

    let mut slots = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(date) = nth_weekday(month, entry.weekday, entry.week, fifth) else {
            continue;
        };
        let due_date = date.checked_add_signed(offset).ok_or_else(|| {
            EngineError::validation(
                "default_due_days",
                format!("offset {} overflows the calendar", default_due_days),
            )
        })?;
        slots.push(PatternSlot {
            due_date,
            count: entry.count,
        });
    }
    Ok(slots)
}

/// Flatten slots into per-instance keys.
///
/// `slot_index` counts upward per due date across entries, so two entries
/// landing on the same day produce distinct keys.
pub fn expand_slots(slots: &[PatternSlot]) -> Vec<SlotKey> {
    let mut next_index: HashMap<NaiveDate, u32> = HashMap::new();
    let mut keys = Vec::new();
    for slot in slots {
        let counter = next_index.entry(slot.due_date).or_insert(0);
        for _ in 0..slot.count {
            keys.push(SlotKey {
                due_date: slot.due_date,
                slot_index: *counter,
            });
            *counter += 1;
        }
    }
    keys
}

//! Recurring client task generation.
//!
//! - [`pattern`] resolves a template's week/weekday pattern into dated slots.
//! - [`generator`] creates the missing task instances for a template and month.

pub mod generator;
pub mod pattern;

pub use generator::{GenerationOutcome, generate_for_template};
pub use pattern::{PatternEntry, PatternSlot, RawPatternEntry, SlotKey, expand_pattern, expand_slots};

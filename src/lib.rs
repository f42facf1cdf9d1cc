//! Recurring task generation and daily rollover engine.
//!
//! Expands monthly delivery templates into client tasks, advances
//! daily-recurring streaks once per user per day, demotes overdue work and
//! assembles flat task lists into parent/subtask trees.

pub mod board;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod rollover;
pub mod schedule;
pub mod server;
pub mod store;
pub mod timezone;
pub mod tree;
pub mod types;

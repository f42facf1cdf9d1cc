//! Configuration.
//!
//! Three file tiers merged key by key, then environment overrides:
//! 1. **Defaults** - built in
//! 2. **Project** - `./task-rollover/config.yaml`
//! 3. **User** - `~/.task-rollover/config.yaml`
//!
//! ## Environment Variables
//! - `TASK_ROLLOVER_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `TASK_ROLLOVER_DB_PATH` - Database path
//! - `TASK_ROLLOVER_DEFAULT_TZ` - Fallback timezone for users
//! - `TASK_ROLLOVER_PORT` - HTTP port

mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, merge_into};
pub use types::*;

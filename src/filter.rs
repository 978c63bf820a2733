//! Day-of-week scoping for reservation tasks.

use chrono::Weekday;

use crate::config::TaskConfig;

/// Whether `task` should be attempted on `today`.
///
/// A task that is not active today counts as satisfied without any request.
pub fn is_active_today(task: &TaskConfig, today: Weekday) -> bool {
    task.active_weekdays.contains(&today)
}

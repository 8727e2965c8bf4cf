//! CLI command implementations

pub mod check;
pub mod replay;

use std::time::Duration;

/// Seconds with one decimal, as shown in summary tables.
pub(crate) fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

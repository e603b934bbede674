//! Local-time stamps in the formats the workspace files use.

use chrono::Local;

/// `2026-10-18T09:30:00`, used in queue, task and report records.
pub fn record_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// `2026-10-18 09:30`, written after the dashboard's last-updated marker.
pub fn dashboard_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// `09:30`, the time column of a results row.
pub fn clock_time() -> String {
    Local::now().format("%H:%M").to_string()
}

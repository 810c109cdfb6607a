//! Formatting utilities

use chrono::{DateTime, Local};

/// Format an elapsed number of seconds as `"1h 2m 3s"`.
///
/// Every non-zero unit is shown, largest first; zero units are omitted, so
/// one hour and five seconds is `"1h 5s"`. Zero, negative and non-finite
/// input all format as `"0h 0m 0s"`.
pub fn duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    if total == 0 {
        return "0h 0m 0s".to_string();
    }

    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if mins > 0 {
        parts.push(format!("{}m", mins));
    }
    if secs > 0 {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}

/// Format a chrono duration (negative spans count as zero)
pub fn elapsed(span: chrono::Duration) -> String {
    duration(span.num_milliseconds() as f64 / 1000.0)
}

/// Format a number of minutes, e.g. a stored `durationMinutes` value
pub fn minutes(mins: f64) -> String {
    duration(mins * 60.0)
}

/// Format a timestamp as HH:MM:SS
pub fn time(dt: DateTime<Local>) -> String {
    dt.format("%H:%M:%S").to_string()
}

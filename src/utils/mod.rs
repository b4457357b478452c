//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod clock;
pub mod error;
pub mod retry;

use chrono::Duration;

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Format a signed duration as "1d 2h 3m", prefixed with "-" when negative
pub fn format_duration(duration: Duration) -> String {
    let negative = duration < Duration::zero();
    let total_minutes = duration.num_minutes().abs();
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if days > 0 || hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    out.push_str(&format!("{minutes}m"));
    out
}

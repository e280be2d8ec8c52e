//! Formatting utilities.

use std::time::Duration;

/// Format a duration for log and console output.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", ms)
    }
}

/// First `max_chars` characters of `text` on a single line.
pub fn format_excerpt(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

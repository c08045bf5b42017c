//! Shared formatting for command output.
//!
//! Human-readable output goes to stdout as aligned text; `--json` prints
//! the same data as pretty JSON so scripts can consume it.

use anyhow::Result;
use serde::Serialize;

use task_context_core::models::Task;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line task summary used by list-style commands.
pub fn task_line(task: &Task) -> String {
    format!(
        "{:<12} {:<12} {:>4}%  {:<7} {}",
        task.code,
        task.status.as_str(),
        task.progress,
        task.priority.as_str(),
        task.title
    )
}

pub fn print_task_table(tasks: &[Task]) {
    println!(
        "{:<12} {:<12} {:>5}  {:<7} {}",
        "CODE", "STATUS", "PROG", "PRIO", "TITLE"
    );
    println!("{}", "-".repeat(72));
    for task in tasks {
        println!("{}", task_line(task));
    }
}

/// Format a unix-millisecond timestamp as `YYYY-MM-DD HH:MM` (UTC).
pub fn format_ts(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Collapse whitespace and cut to `max_chars`, marking the cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_collapses_and_cuts() {
        assert_eq!(preview("a\n  b\tc", 10), "a b c");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00");
    }
}

//! Console output helpers shared by the executor and the watcher.

use chrono::Local;
use colored::{ColoredString, Colorize};

/// Wall-clock prefix, e.g. `[14:03:27]`
pub fn stamp() -> ColoredString {
    format!("[{}]", Local::now().format("%H:%M:%S")).dimmed()
}

pub fn rule() -> ColoredString {
    "─".repeat(50).dimmed()
}

pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

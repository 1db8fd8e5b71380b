//! General output formatting utilities.

use owo_colors::OwoColorize;

/// Prints a visual separator with spacing.
pub fn print_separator_with_spacing() {
    println!();
    println!("{}", "─".repeat(60).bright_black());
    println!();
}

/// Prints a summary box with statistics.
pub fn print_summary_box(title: &str, items: &[(&str, &str)]) {
    let title_colored = title.cyan().bold().to_string();
    let separator = "─".repeat(50);
    println!("┌─ {} {}", title_colored, separator.bright_black());
    for (key, value) in items {
        println!("│ {} {}", key.bright_black().bold(), value.bold().white());
    }
    println!("└{}", "─".repeat(60).bright_black());
}

/// Prints a key-value pair with consistent formatting.
pub fn print_key_value(key: &str, value: &str) {
    println!("  {} {}", key.bright_black().bold(), value.bold().white());
}

/// Formats duration in a human-readable way.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.2}s", seconds)
    } else {
        let mins = (seconds / 60.0) as u64;
        let secs = seconds % 60.0;
        format!("{}m {:.1}s", mins, secs)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

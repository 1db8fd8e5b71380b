//! Section headers.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
pub enum SectionStyle {
    Primary,
    Secondary,
}

impl SectionStyle {
    fn colorize(&self, text: &str) -> String {
        match self {
            SectionStyle::Primary => text.cyan().bold().to_string(),
            SectionStyle::Secondary => text.bright_black().bold().to_string(),
        }
    }
}

/// Prints a section header followed by a blank line.
pub fn print_section_header(title: &str, style: SectionStyle) {
    println!("{}", style.colorize(title));
    println!();
}

//! Terminal output formatting.
//!
//! Consistent colors, status symbols, tables and progress bars for every
//! command.

mod headers;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, SectionStyle};
pub use output::{
    format_bytes, format_duration, print_key_value, print_separator_with_spacing,
    print_summary_box,
};
pub use progress::{create_progress_bar, create_spinner};
pub use status::{print_error, print_status, print_success, Status};
pub use tables::{
    describe_steps, print_action_table, print_artifact_table, print_report_table,
    print_task_table,
};

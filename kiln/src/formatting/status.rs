//! Status markers shared by run reports, watch output and publish stages.

use kiln_core::ActionOutcome;
use owo_colors::OwoColorize;

/// What happened to an action, stage or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    /// Transform skipped by the change cache.
    UpToDate,
    /// Background process spawned and left running.
    Started,
    /// Stage or step deliberately not run.
    Skipped,
    /// In flight.
    Running,
    Failed,
}

impl Status {
    pub fn of(outcome: &ActionOutcome) -> Self {
        match outcome {
            ActionOutcome::Ran => Status::Done,
            ActionOutcome::Skipped => Status::UpToDate,
            ActionOutcome::Started { .. } => Status::Started,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Done => "✓",
            Status::UpToDate => "=",
            Status::Started => "↗",
            Status::Skipped => "-",
            Status::Running => "→",
            Status::Failed => "✗",
        }
    }

    pub fn table_color(&self) -> comfy_table::Color {
        match self {
            Status::Done => comfy_table::Color::Green,
            Status::UpToDate | Status::Skipped => comfy_table::Color::DarkGrey,
            Status::Started | Status::Running => comfy_table::Color::Cyan,
            Status::Failed => comfy_table::Color::Red,
        }
    }

    fn line(&self, message: &str) -> String {
        match self {
            Status::Done => format!("{} {}", self.symbol().green(), message.green().bold()),
            Status::UpToDate | Status::Skipped => {
                format!("{} {}", self.symbol().bright_black(), message.bright_black())
            }
            Status::Started | Status::Running => format!("{} {}", self.symbol().cyan(), message.cyan()),
            Status::Failed => format!("{} {}", self.symbol().red(), message.red().bold()),
        }
    }
}

/// Prints one status line; failures go to stderr.
pub fn print_status(status: Status, message: &str) {
    if status == Status::Failed {
        eprintln!("  {}", status.line(message));
    } else {
        println!("  {}", status.line(message));
    }
}

pub fn print_success(message: &str) {
    print_status(Status::Done, message);
}

pub fn print_error(message: &str) {
    print_status(Status::Failed, message);
}

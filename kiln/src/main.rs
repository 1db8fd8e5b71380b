mod commands;
mod formatting;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::formatting::print_error;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Asset pipeline orchestration: incremental builds, watch mode and release publishing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the pipeline configuration.
    #[arg(long, global = true, default_value = kiln_core::CONFIG_FILE_NAME)]
    config: PathBuf,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true, action)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task or action once.
    Run {
        #[arg(default_value = "default")]
        task: String,
        /// Run every transform even if its inputs are unchanged.
        #[arg(long, action)]
        no_cache: bool,
        #[arg(short = 'j', long)]
        parallel: Option<usize>,
        /// Override a `[options.vars]` placeholder, e.g. `--var message="Fix nav"`.
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    /// Re-run watch groups when their files change, until Ctrl+C.
    Watch {
        #[arg(long, action)]
        no_cache: bool,
    },
    /// Run the default task, then watch.
    Dev {
        #[arg(long, action)]
        no_cache: bool,
    },
    /// Build, archive, release and upload a version.
    Release {
        #[arg(long)]
        version: Option<String>,
        /// Stop after the archive stage.
        #[arg(long, action)]
        dry_run: bool,
    },
    /// Upload the current output directory without rebuilding.
    Upload {
        #[arg(long)]
        version: Option<String>,
    },
    /// Show the execution tree of a task without running it.
    Plan {
        task: String,
        #[arg(long, action)]
        json: bool,
    },
    /// List tasks, actions and watch groups.
    List {
        #[arg(long, action)]
        json: bool,
    },
    /// Clear the persisted change cache.
    Clean,
}

fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    match cli.command.unwrap_or(Commands::Dev { no_cache: false }) {
        Commands::Run {
            task,
            no_cache,
            parallel,
            vars,
        } => commands::cmd_run(&config, &task, no_cache, parallel, &vars),
        Commands::Watch { no_cache } => commands::cmd_watch(&config, no_cache),
        Commands::Dev { no_cache } => commands::cmd_dev(&config, no_cache),
        Commands::Release { version, dry_run } => {
            commands::cmd_release(&config, version.as_deref(), dry_run)
        }
        Commands::Upload { version } => commands::cmd_upload(&config, version.as_deref()),
        Commands::Plan { task, json } => commands::cmd_plan(&config, &task, json),
        Commands::List { json } => commands::cmd_list(&config, json),
        Commands::Clean => commands::cmd_clean(&config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(origin) = err
                .downcast_ref::<kiln_core::Error>()
                .and_then(|e| e.origin())
            {
                print_error(&format!("{} failed", origin));
            }
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

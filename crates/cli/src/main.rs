//! Toolwright CLI — the main entry point.
//!
//! Commands:
//! - `run`    — Drive one task through the agent loop
//! - `tools`  — List the built-in capabilities
//! - `config` — Print the default configuration, or validate the current one

use clap::{Parser, Subcommand};
use toolwright_config::IterationLimit;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolwright",
    about = "Toolwright — a budgeted, approval-gated agent loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task
    Run {
        /// What the agent should do
        #[arg(short, long)]
        task: String,

        /// Execute risky capabilities without asking
        #[arg(long = "unsafe")]
        unsafe_mode: bool,

        /// Cycle limit: a number, or "unbounded" (stop with Ctrl-C)
        #[arg(long, value_parser = parse_iteration_limit)]
        max_iterations: Option<IterationLimit>,
    },

    /// List the built-in capabilities
    Tools,

    /// Print the default configuration
    Config {
        /// Load and validate the current configuration instead
        #[arg(long)]
        validate: bool,
    },
}

fn parse_iteration_limit(raw: &str) -> Result<IterationLimit, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "unbounded" | "infinite" | "inf" => Ok(IterationLimit::Unbounded),
        n => n
            .parse::<u32>()
            .map(IterationLimit::Bounded)
            .map_err(|_| format!("expected a number or \"unbounded\", got \"{raw}\"")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            task,
            unsafe_mode,
            max_iterations,
        } => commands::run::run(&task, unsafe_mode, max_iterations).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Config { validate } => commands::config_cmd::run(validate)?,
    }

    Ok(())
}

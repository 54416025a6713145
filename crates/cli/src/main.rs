//! apicheck CLI - Main Entry Point
//!
//! Runs parameterized contract suites against the location and agency
//! statistics API and reports per-case verdicts.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{cases, list, run};

/// Exit code for runs that never produced a report
const EXIT_ABORTED: i32 = 2;

/// apicheck - HTTP Contract Test Harness
#[derive(Parser)]
#[command(name = "apicheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected suites
    Run(run::RunArgs),

    /// List endpoints and their case counts
    List(list::ListArgs),

    /// Show the cases generated for one endpoint
    Cases(cases::CasesArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, cli.format).await,
        Commands::List(args) => list::execute(args, cli.format).await.map(|_| 0),
        Commands::Cases(args) => cases::execute(args, cli.format).await.map(|_| 0),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            EXIT_ABORTED
        }
    };
    std::process::exit(code);
}

//! Trace Engine CLI
//!
//! Processes captured performance traces into per-domain models and
//! writes a JSON summary with hot paths and entity counts.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use trace_engine::commands::{
    display_schema, display_version, execute_process, validate_args, validate_summary_file,
    ProcessArgs,
};

/// Trace Engine - multi-pass trace processing
#[derive(Parser, Debug)]
#[command(name = "trace-engine")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Process a trace file and write a summary
    Process {
        /// Trace file (.json or .json.gz)
        #[arg(short, long)]
        trace: PathBuf,

        /// Output path for JSON summary
        #[arg(short, long, default_value = "summary.json")]
        output: PathBuf,

        /// Annotations document (hidden entries, breadcrumbs) to resolve
        #[arg(short, long)]
        annotations: Option<PathBuf>,

        /// Engine configuration file (TOML)
        #[arg(short, long, env = "TRACE_ENGINE_CONFIG")]
        config: Option<PathBuf>,

        /// Number of top hot paths to include
        #[arg(long)]
        top_paths: Option<usize>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a summary JSON file
    Validate {
        /// Path to summary JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Process {
            trace,
            output,
            annotations,
            config,
            top_paths,
            summary,
        } => {
            let args = ProcessArgs {
                trace_path: trace,
                output_json: output,
                annotations,
                config,
                top_paths,
                print_summary: summary,
            };

            // Validate args first
            validate_args(&args)?;

            execute_process(args).await?;
        }

        Commands::Validate { file } => {
            validate_summary_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

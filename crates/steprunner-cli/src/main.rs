//! Step runner CLI tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use steprunner_runner::RunnerSettings;
use steprunner_runner::runner::{DEFAULT_RESULTS_DIR, DEFAULT_RESULTS_FILE_NAME, DEFAULT_WORK_DIR};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::results::OutputFormat;

#[derive(Parser)]
#[command(name = "steprunner")]
#[command(about = "Run CI/CD pipeline steps from layered configuration", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for the YAML/JSON result files
    #[arg(long, global = true, env = "STEPRUNNER_RESULTS_DIR", default_value = DEFAULT_RESULTS_DIR)]
    results_dir: PathBuf,

    /// Directory for the state file and per-step working directories
    #[arg(long, global = true, env = "STEPRUNNER_WORK_DIR", default_value = DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    /// Base name of the result and state files
    #[arg(long, global = true, default_value = DEFAULT_RESULTS_FILE_NAME)]
    results_file_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every sub-step of a step
    Run {
        /// Step name
        #[arg(long)]
        step: String,
        /// Environment to run the step for
        #[arg(long)]
        environment: Option<String>,
        /// Configuration files or directories, applied in order
        #[arg(long = "config", short = 'c', required = true)]
        config: Vec<PathBuf>,
        /// Step config override as KEY=VALUE, VALUE parsed as YAML
        #[arg(long = "step-config")]
        step_config: Vec<String>,
    },
    /// Load configuration and list its steps
    Validate {
        /// Configuration files or directories, applied in order
        #[arg(long = "config", short = 'c', required = true)]
        config: Vec<PathBuf>,
    },
    /// Print the persisted results
    Results {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = RunnerSettings {
        results_dir: cli.results_dir,
        work_dir: cli.work_dir,
        results_file_name: cli.results_file_name,
    };

    match cli.command {
        Commands::Run {
            step,
            environment,
            config,
            step_config,
        } => {
            let success =
                commands::run::run(settings, &step, environment.as_deref(), &config, &step_config)
                    .await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Validate { config } => {
            commands::validate::validate(&config)?;
        }
        Commands::Results { format } => {
            commands::results::print(&settings, format)?;
        }
    }

    Ok(())
}

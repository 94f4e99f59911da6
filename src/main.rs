use std::path::PathBuf;

use anyhow::Result;
use apikey_gateway::{load_settings, metrics};
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod cli;

use cli::{
    cmd_check, cmd_serve, cmd_validate, init_logging, CheckArgs, OutputFormat, ServeArgs,
    ValidateArgs,
};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

/// API key authorization and rate/quota enforcement for an API gateway
#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    /// Metrics server port (set to 0 to disable)
    #[arg(long, default_value_t = 9090)]
    metrics_port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the forward-auth HTTP adapter
    Serve(ServeArgs),

    /// Evaluate one request against a registry snapshot
    Check(CheckArgs),

    /// Validate a registry snapshot file
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_json)?;

    let settings = load_settings(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Serve(args) => {
            let _metrics_server = metrics::spawn_metrics_server(cli.metrics_port);
            info!("Starting apikey-gateway v{}", VERSION);
            cmd_serve(args, settings).await
        }
        Commands::Check(args) => cmd_check(args, settings, cli.output).await,
        Commands::Validate(args) => cmd_validate(args, cli.output).await,
    };

    if let Err(err) = result {
        error!("Command failed: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}

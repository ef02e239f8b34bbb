pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use parley_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Inspect configuration, replay model responses through the parsers, and run the negotiation pipeline against a scripted board.",
    after_help = "Examples:\n  parley config\n  parley parse-orders --response reply.txt --possible-orders orders.json\n  parley smoke --rounds 2"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of parley.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Extract and validate orders from a saved model response")]
    ParseOrders {
        #[arg(long, help = "File holding the raw model response")]
        response: PathBuf,
        #[arg(long, help = "JSON object of location -> legal orders")]
        possible_orders: PathBuf,
    },
    #[command(about = "Extract negotiation messages from a saved model response")]
    ParseMessages {
        #[arg(long, help = "File holding the raw model response")]
        response: PathBuf,
    },
    #[command(about = "Run negotiation and order phases against an in-memory board with scripted models")]
    Smoke {
        #[arg(long, help = "Negotiation rounds to run (defaults to negotiation.max_rounds)")]
        rounds: Option<u32>,
    },
    #[command(about = "Show the model and vendor assigned to each power")]
    Vendors,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::ParseOrders { response, possible_orders } => {
            commands::parse_orders::run(&response, &possible_orders)
        }
        Command::ParseMessages { response } => commands::parse_messages::run(&response),
        Command::Smoke { rounds } => commands::smoke::run(&options, rounds),
        Command::Vendors => commands::vendors::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr; stdout carries only the command result.
fn init_logging(logging: &LoggingConfig) {
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

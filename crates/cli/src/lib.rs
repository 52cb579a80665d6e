pub mod commands;
pub mod logging;
pub mod notifier;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use workshop_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "workshop",
    about = "Workshop operator CLI",
    long_about = "Operate the quotation approval and work-order workflow: migrations, demo \
                  data, readiness checks, and recovery of approved quotations that were never \
                  generated.",
    after_help = "Examples:\n  workshop doctor --json\n  workshop pending\n  \
                  workshop generate --quotation <id> --advisor advisor-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo workshop dataset")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification channel, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List approved quotations that have not been generated into a work order")]
    Pending,
    #[command(about = "Run work-order generation for one approved quotation")]
    Generate(commands::generate::GenerateArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Commands report configuration problems themselves; logging falls back to defaults.
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    if let Err(error) = logging::init(&logging) {
        eprintln!("logging disabled: {error:#}");
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Pending => commands::pending::run(),
        Command::Generate(args) => commands::generate::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

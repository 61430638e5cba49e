use clap::Parser;
use colored::Colorize;
use tracing::error;

use btpi_cli::cli::{Cli, Commands};
use btpi_cli::commands::{self, effective_config};
use btpi_cli::error::CliError;
use btpi_cli::logging::init_tracing;
use btpi_cli::output::OutputWriter;
use btpi_core::config::BtpiConfig;
use btpi_core::error::BtpiError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Loaded before tracing so the configured log level applies.
    let loaded = BtpiConfig::load(&cli.config).await;
    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();

    if let Err(e) = init_tracing(cli.effective_log_level(&general.log_level), &general.log_format)
    {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli, loaded).await {
        error!(error = %e, "command failed");
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, loaded: Result<BtpiConfig, BtpiError>) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => {
            commands::config::execute(args, &cli.config, loaded, &writer).await
        }
        Commands::Init(args) => {
            commands::init::execute(args, &effective_config(loaded)?, &writer).await
        }
        Commands::Deploy(args) => {
            commands::deploy::execute(args, effective_config(loaded)?, &writer).await
        }
        Commands::Status(args) => {
            commands::status::execute(args, effective_config(loaded)?, &writer).await
        }
        Commands::Verify(args) => {
            commands::verify::execute(args, &effective_config(loaded)?, &writer).await
        }
        Commands::Teardown(args) => {
            commands::teardown::execute(args, effective_config(loaded)?, &writer).await
        }
        Commands::Report(args) => {
            commands::report::execute(args, &effective_config(loaded)?, &writer).await
        }
    }
}

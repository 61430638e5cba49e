//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use btpi_core::types::DeployMode;

/// btpi -- deploy and verify the BTPI-REACT security stack on Docker.
///
/// Use `btpi <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "btpi", version, about, long_about = None)]
pub struct Cli {
    /// Path to the btpi.toml configuration file.
    #[arg(short, long, default_value = "btpi.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Shorthand for `--log-level debug`.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Effective log level: `--debug` beats `--log-level`, which beats the config file.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.debug {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate secrets, certificates and service configuration files.
    Init(InitArgs),

    /// Deploy services in dependency order and wait for readiness.
    Deploy(DeployArgs),

    /// Show container state per service.
    Status(ServicesArgs),

    /// Run readiness and health checks once per service.
    Verify(ServicesArgs),

    /// Stop and remove deployed containers.
    Teardown(TeardownArgs),

    /// Print access URLs and credentials.
    Report(ReportArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Service selection shared by most subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Deployment mode (full, minimal, custom). Defaults to custom when
    /// `--services` is given, otherwise to the configured mode.
    #[arg(long)]
    pub mode: Option<DeployMode>,

    /// Comma-separated service list, e.g. `wazuh-manager,velociraptor`.
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,
}

// ---- init ----

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Regenerate the TLS bundle even if it is complete.
    #[arg(long)]
    pub force_certs: bool,

    /// Regenerate every secret, including existing ones.
    #[arg(long)]
    pub rotate_secrets: bool,
}

// ---- deploy ----

#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print the plan without touching Docker.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not pull images before creating containers.
    #[arg(long)]
    pub skip_pull: bool,

    /// Do not wait for readiness.
    #[arg(long)]
    pub no_wait: bool,

    /// Do not generate secrets, certificates or config files first.
    #[arg(long)]
    pub skip_init: bool,
}

// ---- status / verify ----

/// Services to inspect. Without `--services`, the configured plan is used.
#[derive(Args, Debug)]
pub struct ServicesArgs {
    /// Comma-separated service list.
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,
}

// ---- teardown ----

#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Comma-separated service list.
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Also remove named volumes (data loss).
    #[arg(long)]
    pub volumes: bool,

    /// Also remove the shared Docker network.
    #[arg(long)]
    pub network: bool,
}

// ---- report ----

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Comma-separated service list.
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Print passwords in clear text.
    #[arg(long)]
    pub reveal: bool,
}

// ---- config ----

/// Manage btpi configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, network, deploy, services, env).
        #[arg(long)]
        section: Option<String>,
    },
}

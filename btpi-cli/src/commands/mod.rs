//! Command handlers -- one module per subcommand

pub mod config;
pub mod deploy;
pub mod init;
pub mod report;
pub mod status;
pub mod teardown;
pub mod verify;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use btpi_core::config::BtpiConfig;
use btpi_core::error::{BtpiError, ConfigError};
use btpi_core::types::{DeployMode, ServiceId};
use btpi_deployer::BollardDockerClient;
use btpi_deployer::catalog;
use btpi_deployer::plan::{self, DeploymentPlan};

use crate::cli::SelectionArgs;
use crate::error::CliError;

/// Load the configuration, falling back to defaults when the file is missing.
pub async fn load_config(path: &Path) -> Result<BtpiConfig, CliError> {
    effective_config(BtpiConfig::load(path).await)
}

/// Turn a load result into the effective configuration.
///
/// A missing file yields the defaults (with env overrides applied) and a
/// warning. Parse and validation errors are returned as-is.
pub fn effective_config(
    loaded: Result<BtpiConfig, BtpiError>,
) -> Result<BtpiConfig, CliError> {
    match loaded {
        Ok(config) => Ok(config),
        Err(BtpiError::Config(ConfigError::FileNotFound { path })) => {
            warn!(path = %path, "config file not found, using defaults");
            let mut config = BtpiConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the deployment plan from CLI flags and configuration.
///
/// `--services` without `--mode` means custom mode. Without either flag the
/// configured mode is used, and custom mode takes `deploy.services`.
pub fn resolve_plan(
    config: &BtpiConfig,
    selection: &SelectionArgs,
) -> Result<DeploymentPlan, CliError> {
    let mode = selection.mode.unwrap_or(if selection.services.is_empty() {
        config.deploy.mode
    } else {
        DeployMode::Custom
    });
    let requested = if selection.services.is_empty() && mode == DeployMode::Custom {
        config.deploy.services.clone()
    } else {
        selection.services.clone()
    };
    Ok(DeploymentPlan::resolve(config, mode, &requested)?)
}

/// Services to inspect or tear down.
///
/// Explicit names are used exactly as given (no dependencies added) in
/// dependency order. Otherwise the configured plan is used.
pub fn select_services(
    config: &BtpiConfig,
    services: &[String],
) -> Result<Vec<ServiceId>, CliError> {
    if services.is_empty() {
        return Ok(resolve_plan(config, &SelectionArgs::default())?.services);
    }
    let selected: BTreeSet<ServiceId> = plan::parse_services(services)?.into_iter().collect();
    Ok(plan::dependency_order(&selected, |id| {
        catalog::definition(id).depends_on
    })?)
}

/// Connect to the Docker daemon configured in `[network]`.
pub fn connect_docker(config: &BtpiConfig) -> Result<Arc<BollardDockerClient>, CliError> {
    Ok(Arc::new(BollardDockerClient::connect(
        &config.network.docker_socket,
    )?))
}

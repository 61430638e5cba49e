//! CLI-specific error types and exit code mapping

use btpi_core::error::{BtpiError, DeploymentError};
use btpi_deployer::DeployerError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// A service did not become ready or a verification check failed.
    #[error("{0}")]
    Unhealthy(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from btpi-core.
    #[error("{0}")]
    Core(#[from] BtpiError),
}

impl From<DeployerError> for CliError {
    fn from(e: DeployerError) -> Self {
        Self::Core(e.into())
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                 |
    /// |------|-----------------------------------------|
    /// | 0    | Success                                 |
    /// | 1    | General / command error                 |
    /// | 2    | Configuration error                     |
    /// | 3    | Docker daemon unreachable               |
    /// | 4    | Readiness or verification failure       |
    /// | 10   | IO error                                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(BtpiError::Config(_)) => 2,
            Self::Core(BtpiError::Deployment(DeploymentError::DockerUnavailable(_))) => 3,
            Self::Unhealthy(_) | Self::Core(BtpiError::Deployment(DeploymentError::NotReady { .. })) => {
                4
            }
            Self::Io(_) | Self::Core(BtpiError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

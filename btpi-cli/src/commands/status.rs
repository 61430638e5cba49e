//! `btpi status` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::EnvFile;
use btpi_deployer::{Deployer, DockerClient, LiveProber, ManagedContainer, ServiceStatus};

use crate::cli::ServicesArgs;
use crate::commands::{connect_docker, select_services};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, state_label};

/// Execute the `status` command.
///
/// Managed containers outside the selection (for example from an earlier
/// deployment with another mode) are listed separately.
pub async fn execute(
    args: ServicesArgs,
    config: BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let services = select_services(&config, &args.services)?;
    let env = EnvFile::load(config.env_file_path()).await?;
    let docker = connect_docker(&config)?;
    let prober = LiveProber::new(Arc::clone(&docker))?;
    let network = config.network.name.clone();
    let deployer = Deployer::new(Arc::clone(&docker), prober, config, &env);

    let statuses = deployer.status(&services).await?;
    let others = docker
        .list_managed()
        .await?
        .into_iter()
        .filter(|c| !statuses.iter().any(|s| s.container == c.name))
        .collect();
    writer.render(&StatusReport {
        network,
        services: statuses,
        others,
    })?;
    Ok(())
}

/// Container state per service.
#[derive(Serialize)]
pub struct StatusReport {
    pub network: String,
    pub services: Vec<ServiceStatus>,
    /// Managed containers not in the selection
    pub others: Vec<ManagedContainer>,
}

impl StatusReport {
    fn running(&self) -> usize {
        self.services.iter().filter(|s| s.state.is_running()).count()
    }
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Network: {}", self.network)?;
        writeln!(w)?;
        writeln!(w, "{:<18} {:<26} {:<10}", "SERVICE", "CONTAINER", "STATE")?;
        writeln!(w, "{}", "-".repeat(56))?;
        for status in &self.services {
            writeln!(
                w,
                "{:<18} {:<26} {}",
                status.service.as_str(),
                status.container,
                state_label(&status.state)
            )?;
        }
        if !self.others.is_empty() {
            writeln!(w)?;
            writeln!(w, "Other managed containers:")?;
            for other in &self.others {
                writeln!(
                    w,
                    "{:<18} {:<26} {}",
                    other.service,
                    other.name,
                    state_label(&other.state)
                )?;
            }
        }
        writeln!(w)?;
        writeln!(w, "{}/{} running", self.running(), self.services.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btpi_core::types::{ContainerState, ServiceId};

    fn report() -> StatusReport {
        StatusReport {
            network: "btpi-network".to_owned(),
            services: vec![
                ServiceStatus {
                    service: ServiceId::Portainer,
                    container: "btpi-portainer".to_owned(),
                    state: ContainerState::Running,
                },
                ServiceStatus {
                    service: ServiceId::Kasm,
                    container: "btpi-kasm".to_owned(),
                    state: ContainerState::Missing,
                },
            ],
            others: vec![ManagedContainer {
                name: "btpi-cortex".to_owned(),
                service: "cortex".to_owned(),
                image: "thehiveproject/cortex:3.1.8".to_owned(),
                state: ContainerState::Exited,
            }],
        }
    }

    #[test]
    fn test_status_report_render_text() {
        let mut buffer = Vec::new();
        report()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("btpi-portainer"));
        assert!(output.contains("missing"));
        assert!(output.contains("Other managed containers:"));
        assert!(output.contains("btpi-cortex"));
        assert!(output.contains("1/2 running"));
    }

    #[test]
    fn test_status_report_json() {
        let json = serde_json::to_value(report()).expect("JSON serialization should succeed");
        assert_eq!(json["services"][0]["state"].as_str(), Some("running"));
        assert_eq!(json["services"][1]["service"].as_str(), Some("kasm"));
    }
}

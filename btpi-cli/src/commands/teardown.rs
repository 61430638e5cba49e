//! `btpi teardown` command handler

use std::io::Write;
use std::sync::Arc;

use tracing::warn;

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::EnvFile;
use btpi_deployer::{Deployer, LiveProber, TeardownReport};

use crate::cli::TeardownArgs;
use crate::commands::{connect_docker, select_services};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `teardown` command.
///
/// Containers are removed in reverse dependency order. Missing containers
/// are reported as skipped, not as errors. Resources that could not be
/// removed are listed in the report and make the command fail afterwards.
pub async fn execute(
    args: TeardownArgs,
    config: BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let services = select_services(&config, &args.services)?;
    if args.volumes {
        warn!("removing named volumes, service data will be lost");
    }

    let env = EnvFile::load(config.env_file_path()).await?;
    let docker = connect_docker(&config)?;
    let prober = LiveProber::new(Arc::clone(&docker))?;
    let deployer = Deployer::new(docker, prober, config, &env);

    let report = deployer
        .teardown(&services, args.volumes, args.network)
        .await?;
    writer.render(&report)?;
    if !report.failures.is_empty() {
        return Err(CliError::Command(format!(
            "{} resource(s) could not be removed",
            report.failures.len()
        )));
    }
    Ok(())
}

impl Render for TeardownReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for name in &self.removed {
            writeln!(w, "{} {name}", "removed".red())?;
        }
        for name in &self.skipped {
            writeln!(w, "{} {name} (not found)", "skipped".dimmed())?;
        }
        for volume in &self.volumes_removed {
            writeln!(w, "{} volume {volume}", "removed".red())?;
        }
        if self.network_removed {
            writeln!(w, "{} network", "removed".red())?;
        }
        if !self.network_in_use_by.is_empty() {
            writeln!(
                w,
                "{} network (still used by {})",
                "kept".yellow(),
                self.network_in_use_by.join(", ")
            )?;
        }
        for failure in &self.failures {
            writeln!(w, "{} {}: {}", "failed".red().bold(), failure.resource, failure.error)?;
        }
        writeln!(
            w,
            "{} container(s) removed, {} skipped",
            self.removed.len(),
            self.skipped.len()
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btpi_deployer::TeardownFailure;

    #[test]
    fn test_teardown_report_render_text() {
        let report = TeardownReport {
            removed: vec!["btpi-cortex".to_owned()],
            skipped: vec!["btpi-thehive".to_owned()],
            volumes_removed: vec!["btpi_cortex-data".to_owned()],
            network_removed: true,
            network_in_use_by: Vec::new(),
            failures: Vec::new(),
        };
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("btpi-thehive (not found)"));
        assert!(output.contains("volume btpi_cortex-data"));
        assert!(output.contains("network"));
        assert!(output.contains("1 container(s) removed, 1 skipped"));
    }

    #[test]
    fn test_teardown_report_lists_failures_and_kept_network() {
        colored::control::set_override(false);
        let report = TeardownReport {
            removed: vec!["btpi-kasm".to_owned()],
            skipped: Vec::new(),
            volumes_removed: Vec::new(),
            network_removed: false,
            network_in_use_by: vec!["btpi-portainer".to_owned()],
            failures: vec![TeardownFailure {
                resource: "btpi_kasm_data".to_owned(),
                error: "volume is in use".to_owned(),
            }],
        };
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("kept network (still used by btpi-portainer)"));
        assert!(output.contains("failed btpi_kasm_data: volume is in use"));

        let json = serde_json::to_value(&report).expect("JSON serialization should succeed");
        assert_eq!(json["failures"][0]["resource"].as_str(), Some("btpi_kasm_data"));
    }
}

//! `btpi init` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use btpi_core::config::BtpiConfig;
use btpi_core::types::ServiceId;
use btpi_deployer::{AssetGenerator, AssetReport};

use crate::cli::InitArgs;
use crate::commands::resolve_plan;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `init` command.
///
/// Generates missing secrets, the TLS bundle and per-service config files
/// for the resolved plan. Running it twice without flags changes nothing
/// except re-rendered config files.
pub async fn execute(
    args: InitArgs,
    config: &BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = resolve_plan(config, &args.selection)?;
    info!(mode = %plan.mode, services = plan.services.len(), "preparing deployment assets");

    let assets = AssetGenerator::new(config)
        .prepare(&plan.services, args.force_certs, args.rotate_secrets)
        .await?;

    writer.render(&InitReport {
        services: plan.services,
        assets,
    })?;
    Ok(())
}

/// Result of `btpi init`.
#[derive(Serialize)]
pub struct InitReport {
    pub services: Vec<ServiceId>,
    #[serde(flatten)]
    pub assets: AssetReport,
}

impl Render for InitReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let names: Vec<&str> = self.services.iter().map(ServiceId::as_str).collect();
        writeln!(w, "Services: {}", names.join(", ").bold())?;
        writeln!(w, "Env file: {}", self.assets.env_file.display())?;

        if self.assets.generated_secrets.is_empty() {
            writeln!(w, "Secrets:  {}", "unchanged".dimmed())?;
        } else {
            writeln!(
                w,
                "Secrets:  {} generated",
                self.assets.generated_secrets.len().to_string().green()
            )?;
            for key in &self.assets.generated_secrets {
                writeln!(w, "  + {key}")?;
            }
        }

        let certs = if self.assets.certificates_generated {
            "generated".green()
        } else {
            "unchanged".dimmed()
        };
        writeln!(w, "TLS:      {certs}")?;

        writeln!(w, "Config files: {}", self.assets.files_written.len())?;
        for path in &self.assets.files_written {
            writeln!(w, "  {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report() -> InitReport {
        InitReport {
            services: vec![ServiceId::WazuhIndexer, ServiceId::Portainer],
            assets: AssetReport {
                env_file: PathBuf::from("/opt/btpi-react/.env"),
                generated_secrets: vec!["WAZUH_INDEXER_PASSWORD".to_owned()],
                certificates_generated: true,
                files_written: vec![PathBuf::from(
                    "/opt/btpi-react/config/wazuh-indexer/opensearch.yml",
                )],
            },
        }
    }

    #[test]
    fn test_init_report_render_text() {
        let mut buffer = Vec::new();
        report()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("wazuh-indexer, portainer"));
        assert!(output.contains("+ WAZUH_INDEXER_PASSWORD"));
        assert!(output.contains("opensearch.yml"));
    }

    #[test]
    fn test_init_report_json_is_flat() {
        let json = serde_json::to_value(report()).expect("JSON serialization should succeed");
        assert_eq!(json["services"][0].as_str(), Some("wazuh-indexer"));
        assert_eq!(json["certificates_generated"].as_bool(), Some(true));
        assert_eq!(json["env_file"].as_str(), Some("/opt/btpi-react/.env"));
    }
}

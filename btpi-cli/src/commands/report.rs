//! `btpi report` command handler

use std::io::Write;

use tracing::warn;

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::EnvFile;
use btpi_deployer::AccessReport;
use btpi_deployer::catalog;

use crate::cli::ReportArgs;
use crate::commands::select_services;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `report` command.
///
/// Reads only the config and `.env`; Docker is not contacted.
pub async fn execute(
    args: ReportArgs,
    config: &BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let services = select_services(config, &args.services)?;
    let env = EnvFile::load(config.env_file_path()).await?;
    if env.is_empty() {
        warn!(path = %config.env_file_path().display(), "env file is empty, run `btpi init` first");
    }
    let ctx = catalog::template_context(config, &env);

    let report = AccessReport::build(&services, &ctx, &env, args.reveal)?;
    writer.render(&report)?;
    Ok(())
}

impl Render for AccessReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<16} {:<22} {:<36} {:<12} {}",
            "SERVICE", "ACCESS", "URL", "USER", "PASSWORD"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;
        for entry in &self.entries {
            writeln!(
                w,
                "{:<16} {:<22} {:<36} {:<12} {}",
                entry.service.as_str(),
                entry.label,
                entry.url,
                entry.username.as_deref().unwrap_or("-"),
                entry.password.as_deref().unwrap_or("-")
            )?;
        }
        if !self.revealed {
            writeln!(w)?;
            writeln!(w, "{}", "Passwords are masked; use --reveal to show them.".dimmed())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btpi_core::types::ServiceId;
    use btpi_deployer::AccessEntry;

    fn report(revealed: bool) -> AccessReport {
        AccessReport {
            entries: vec![AccessEntry {
                service: ServiceId::WazuhDashboard,
                label: "Wazuh dashboard".to_owned(),
                url: "https://10.0.0.9:5601".to_owned(),
                username: Some("admin".to_owned()),
                password: Some("Ab********".to_owned()),
            }],
            revealed,
        }
    }

    #[test]
    fn test_access_report_render_text() {
        let mut buffer = Vec::new();
        report(false)
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("https://10.0.0.9:5601"));
        assert!(output.contains("Ab********"));
        assert!(output.contains("--reveal"));
    }

    #[test]
    fn test_revealed_report_has_no_hint() {
        let mut buffer = Vec::new();
        report(true)
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(!output.contains("--reveal"));
    }
}

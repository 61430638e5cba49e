//! `btpi deploy` command handler

use std::io::Write;
use std::sync::Arc;

use tracing::{error, info};

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::EnvFile;
use btpi_deployer::{
    AssetGenerator, DeployAction, DeployOptions, Deployer, DeploymentReport, LiveProber,
};

use crate::cli::DeployArgs;
use crate::commands::{connect_docker, resolve_plan};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `deploy` command.
///
/// Prepares assets (unless `--skip-init` or `--dry-run`), then deploys the
/// plan one service at a time. On failure the partial report is still
/// rendered before the error is returned. A dry run on a host without
/// generated secrets lists the missing keys instead of failing.
pub async fn execute(
    args: DeployArgs,
    config: BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = resolve_plan(&config, &args.selection)?;
    if !plan.auto_added.is_empty() {
        info!(added = ?plan.auto_added, "dependencies added to plan");
    }

    if !args.skip_init && !args.dry_run {
        AssetGenerator::new(&config)
            .prepare(&plan.services, false, false)
            .await?;
    }

    let env = EnvFile::load(config.env_file_path()).await?;
    let docker = connect_docker(&config)?;
    let prober = LiveProber::new(Arc::clone(&docker))?;
    let deployer = Deployer::new(docker, prober, config, &env);

    let options = DeployOptions {
        dry_run: args.dry_run,
        skip_pull: args.skip_pull,
        no_wait: args.no_wait,
    };

    match deployer.deploy(&plan, &options).await {
        Ok(report) => {
            writer.render(&report)?;
            Ok(())
        }
        Err(failure) => {
            error!(
                service = %failure.service,
                error = %failure.error,
                completed = failure.report.services.len(),
                "deployment stopped"
            );
            writer.render(&failure.report)?;
            Err(failure.error.into())
        }
    }
}

impl Render for DeploymentReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let title = if self.dry_run {
            "Deployment plan (dry run)"
        } else {
            "Deployment"
        };
        writeln!(
            w,
            "{} [mode: {}, network: {}, run: {}]",
            title.bold(),
            self.mode,
            self.network,
            self.run_id
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<18} {:<26} {:<16} {:<10}",
            "SERVICE", "CONTAINER", "ACTION", "READY"
        )?;
        writeln!(w, "{}", "-".repeat(72))?;

        for outcome in &self.services {
            let action = match outcome.action {
                DeployAction::Created => "created".green(),
                DeployAction::Started => "started".green(),
                DeployAction::AlreadyRunning => "already running".normal(),
                DeployAction::Planned => "planned".cyan(),
            };
            let ready = match &outcome.ready {
                Some(info) => format!("{} ({} tries)", format_ms(info.elapsed.as_millis()), info.attempts),
                None => "-".to_owned(),
            };
            let restarted = if outcome.restarted { " (restarted)" } else { "" };
            writeln!(
                w,
                "{:<18} {:<26} {:<16} {}{}",
                outcome.service.as_str(),
                outcome.container,
                action,
                ready,
                restarted.yellow()
            )?;
        }

        let mut missing: Vec<&str> = self
            .services
            .iter()
            .flat_map(|o| o.missing_secrets.iter().map(String::as_str))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        if !missing.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{} {} (run `btpi init`)",
                "Missing secrets:".yellow(),
                missing.join(", ")
            )?;
        }

        writeln!(w)?;
        writeln!(
            w,
            "{} service(s) in {}",
            self.services.len(),
            format_ms(u128::from(self.elapsed_ms))
        )?;
        Ok(())
    }
}

fn format_ms(ms: u128) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btpi_core::types::{DeployMode, ServiceId};
    use btpi_deployer::{ReadyInfo, ServiceOutcome};
    use std::time::Duration;

    fn report() -> DeploymentReport {
        DeploymentReport {
            run_id: "0c2e6f0a-1111-4222-8333-444455556666".to_owned(),
            mode: DeployMode::Minimal,
            network: "btpi-network".to_owned(),
            dry_run: false,
            services: vec![
                ServiceOutcome {
                    service: ServiceId::WazuhIndexer,
                    container: "btpi-wazuh-indexer".to_owned(),
                    image: "wazuh/wazuh-indexer:4.9.2".to_owned(),
                    action: DeployAction::Created,
                    ready: Some(ReadyInfo {
                        attempts: 4,
                        elapsed: Duration::from_millis(31_500),
                    }),
                    restarted: false,
                    missing_secrets: Vec::new(),
                },
                ServiceOutcome {
                    service: ServiceId::Portainer,
                    container: "btpi-portainer".to_owned(),
                    image: "portainer/portainer-ce:2.21.4".to_owned(),
                    action: DeployAction::AlreadyRunning,
                    ready: None,
                    restarted: true,
                    missing_secrets: Vec::new(),
                },
            ],
            elapsed_ms: 45_200,
        }
    }

    #[test]
    fn test_deployment_report_render_text() {
        let mut buffer = Vec::new();
        report()
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("mode: minimal"));
        assert!(output.contains("btpi-wazuh-indexer"));
        assert!(output.contains("31.5s (4 tries)"));
        assert!(output.contains("already running"));
        assert!(output.contains("(restarted)"));
        assert!(output.contains("2 service(s) in 45.2s"));
    }

    #[test]
    fn test_dry_run_title() {
        let mut plan = report();
        plan.dry_run = true;
        let mut buffer = Vec::new();
        plan.render_text(&mut buffer).expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("dry run"));
        assert!(!output.contains("Missing secrets"));
    }

    #[test]
    fn test_dry_run_lists_missing_secrets() {
        colored::control::set_override(false);
        let mut plan = report();
        plan.dry_run = true;
        for outcome in &mut plan.services {
            outcome.action = DeployAction::Planned;
            outcome.ready = None;
        }
        plan.services[0].missing_secrets = vec![
            "WAZUH_DASHBOARD_PASSWORD".to_owned(),
            "WAZUH_INDEXER_PASSWORD".to_owned(),
        ];
        plan.services[1].missing_secrets = vec!["PORTAINER_ADMIN_PASSWORD".to_owned()];

        let mut buffer = Vec::new();
        plan.render_text(&mut buffer).expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains(
            "Missing secrets: PORTAINER_ADMIN_PASSWORD, WAZUH_DASHBOARD_PASSWORD, WAZUH_INDEXER_PASSWORD (run `btpi init`)"
        ));

        let json = serde_json::to_value(&plan).expect("JSON serialization should succeed");
        assert_eq!(
            json["services"][1]["missing_secrets"][0].as_str(),
            Some("PORTAINER_ADMIN_PASSWORD")
        );
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(850), "850ms");
        assert_eq!(format_ms(1000), "1.0s");
        assert_eq!(format_ms(12_340), "12.3s");
    }
}

//! `btpi verify` command handler

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::EnvFile;
use btpi_core::types::{HealthStatus, ServiceId};
use btpi_deployer::catalog;
use btpi_deployer::{CheckResult, LiveProber, VerificationReport, Verifier};

use crate::cli::ServicesArgs;
use crate::commands::{connect_docker, select_services};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, pass_label};

/// Execute the `verify` command.
///
/// Every check runs exactly once. Any failed check exits with code 4.
pub async fn execute(
    args: ServicesArgs,
    config: &BtpiConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let services = select_services(config, &args.services)?;
    let env = EnvFile::load(config.env_file_path()).await?;
    let ctx = catalog::template_context(config, &env);

    let docker = connect_docker(config)?;
    let prober = LiveProber::new(Arc::clone(&docker))?;
    let verifier = Verifier::new(
        docker,
        prober,
        Duration::from_secs(config.deploy.probe_timeout_secs),
    );

    let report = verifier.verify(config, &ctx, &services).await?;
    let summary = VerifySummary::new(&services, report);
    writer.render(&summary)?;

    let failed = summary.report.failed().count();
    if failed > 0 {
        warn!(failed, "verification failed");
        return Err(CliError::Unhealthy(format!(
            "{failed} of {} checks failed",
            summary.report.checks.len()
        )));
    }
    Ok(())
}

/// Verification checks plus the derived health per service.
#[derive(Serialize)]
pub struct VerifySummary {
    pub health: Vec<ServiceHealth>,
    #[serde(flatten)]
    pub report: VerificationReport,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub service: ServiceId,
    pub status: HealthStatus,
}

impl VerifySummary {
    pub fn new(services: &[ServiceId], report: VerificationReport) -> Self {
        let health = services
            .iter()
            .map(|id| ServiceHealth {
                service: *id,
                status: report.health(*id),
            })
            .collect();
        Self { health, report }
    }
}

impl Render for VerifySummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for entry in &self.health {
            let status = match &entry.status {
                HealthStatus::Healthy => "healthy".green(),
                HealthStatus::Degraded(_) => "degraded".yellow(),
                HealthStatus::Unhealthy(_) => "unhealthy".red(),
            };
            writeln!(w, "{} {}", entry.service.as_str().bold(), status)?;
            let checks = self
                .report
                .checks
                .iter()
                .filter(|c| c.service == entry.service);
            for check in checks {
                render_check(w, check)?;
            }
        }

        let failed = self.report.failed().count();
        writeln!(w)?;
        if failed == 0 {
            writeln!(w, "{}", "All checks passed".green().bold())?;
        } else {
            writeln!(
                w,
                "{}",
                format!("{failed} of {} checks failed", self.report.checks.len())
                    .red()
                    .bold()
            )?;
        }
        Ok(())
    }
}

fn render_check(w: &mut dyn Write, check: &CheckResult) -> std::io::Result<()> {
    writeln!(
        w,
        "  [{}] {:<34} {}",
        pass_label(check.passed),
        check.check,
        check.detail
    )
}

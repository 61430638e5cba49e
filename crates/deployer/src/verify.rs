//! 배포 검증
//!
//! 서비스마다 컨테이너가 실행 중인지 확인한 뒤, 준비 상태 프로브와
//! 카탈로그의 추가 체크를 각각 정확히 한 번 실행합니다. 재시도는 하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use btpi_core::config::BtpiConfig;
use btpi_core::template::TemplateContext;
use btpi_core::types::{HealthStatus, ServiceId};

use crate::catalog::{self, container_name};
use crate::docker::DockerClient;
use crate::error::DeployerError;
use crate::probe::{ProbeOutcome, Prober};

/// 체크 1건 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub service: ServiceId,
    pub check: String,
    pub passed: bool,
    pub detail: String,
}

/// 검증 리포트
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// 서비스별 헬스 상태
    ///
    /// 컨테이너 체크가 실패하면 Unhealthy, 그 외 체크만 실패하면 Degraded.
    pub fn health(&self, service: ServiceId) -> HealthStatus {
        let statuses: Vec<HealthStatus> = self
            .checks
            .iter()
            .filter(|c| c.service == service && !c.passed)
            .map(|c| {
                let reason = format!("{}: {}", c.check, c.detail);
                if c.check == CONTAINER_CHECK || c.check == READINESS_CHECK {
                    HealthStatus::Unhealthy(reason)
                } else {
                    HealthStatus::Degraded(reason)
                }
            })
            .collect();
        HealthStatus::worst_of(&statuses)
    }
}

const CONTAINER_CHECK: &str = "container running";
const READINESS_CHECK: &str = "readiness";

/// 배포 검증기
pub struct Verifier<D: DockerClient, P: Prober> {
    docker: Arc<D>,
    prober: P,
    timeout: Duration,
}

impl<D: DockerClient, P: Prober> Verifier<D, P> {
    pub fn new(docker: Arc<D>, prober: P, timeout: Duration) -> Self {
        Self {
            docker,
            prober,
            timeout,
        }
    }

    /// 서비스들을 검증합니다.
    ///
    /// 개별 체크 실패는 리포트에 기록되며 에러가 아닙니다.
    ///
    /// # Errors
    ///
    /// Docker에 연결할 수 없으면 `DeployerError::DockerConnection`.
    pub async fn verify(
        &self,
        config: &BtpiConfig,
        ctx: &TemplateContext,
        services: &[ServiceId],
    ) -> Result<VerificationReport, DeployerError> {
        self.docker.ping().await?;
        let mut report = VerificationReport::default();

        for id in services {
            let def = catalog::definition(*id);
            let container = container_name(&config.general.project, *id);

            let state = self.docker.container_state(&container).await?;
            let running = state.is_running();
            report.checks.push(CheckResult {
                service: *id,
                check: CONTAINER_CHECK.to_owned(),
                passed: running,
                detail: format!("{container} is {state}"),
            });
            if !running {
                warn!(service = %id, container = %container, state = %state, "container not running");
                continue;
            }

            let local = catalog::service_context(config, ctx, *id);
            let mut probes = vec![(READINESS_CHECK, def.readiness)];
            probes.extend(def.checks.iter().map(|c| (c.name, c.probe)));

            for (name, probe) in probes {
                let result = match probe.render(&local) {
                    Ok(rendered) => {
                        let outcome = match tokio::time::timeout(
                            self.timeout,
                            self.prober.probe(&container, &rendered, self.timeout),
                        )
                        .await
                        {
                            Ok(outcome) => outcome,
                            Err(_) => ProbeOutcome::NotReady("timed out".to_owned()),
                        };
                        match outcome {
                            ProbeOutcome::Ready => CheckResult {
                                service: *id,
                                check: name.to_owned(),
                                passed: true,
                                detail: rendered.describe(),
                            },
                            ProbeOutcome::NotReady(reason) => CheckResult {
                                service: *id,
                                check: name.to_owned(),
                                passed: false,
                                detail: format!("{}: {reason}", rendered.describe()),
                            },
                        }
                    }
                    Err(e) => CheckResult {
                        service: *id,
                        check: name.to_owned(),
                        passed: false,
                        detail: e.to_string(),
                    },
                };
                report.checks.push(result);
            }
        }

        let failed = report.failed().count();
        info!(
            checks = report.checks.len(),
            failed,
            "verification finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::MockDockerClient;
    use crate::wait::testing::ScriptedProber;
    use btpi_core::secrets::EnvFile;
    use btpi_core::types::ContainerState;

    fn ctx(config: &BtpiConfig) -> TemplateContext {
        let mut env = EnvFile::new();
        for def in catalog::all() {
            for spec in def.secrets {
                env.set(spec.key, "pw").unwrap();
            }
        }
        catalog::template_context(config, &env)
    }

    #[tokio::test]
    async fn runs_readiness_and_extra_checks_once() {
        let config = BtpiConfig::default();
        let docker = Arc::new(
            MockDockerClient::new().with_container("btpi-portainer", ContainerState::Running),
        );
        let prober = ScriptedProber::always_ready();
        let verifier = Verifier::new(docker, prober, Duration::from_secs(1));

        let report = verifier
            .verify(&config, &ctx(&config), &[ServiceId::Portainer])
            .await
            .unwrap();

        // container + readiness + admin login
        assert_eq!(report.checks.len(), 3);
        assert!(report.all_passed());
        assert_eq!(verifier.prober.calls(), 2);
        assert!(report.health(ServiceId::Portainer).is_healthy());
    }

    #[tokio::test]
    async fn stopped_container_skips_probes() {
        let config = BtpiConfig::default();
        let docker = Arc::new(
            MockDockerClient::new().with_container("btpi-kasm", ContainerState::Exited),
        );
        let verifier = Verifier::new(docker, ScriptedProber::always_ready(), Duration::from_secs(1));

        let report = verifier
            .verify(&config, &ctx(&config), &[ServiceId::Kasm, ServiceId::Misp])
            .await
            .unwrap();

        assert_eq!(report.checks.len(), 2);
        assert!(!report.all_passed());
        assert_eq!(report.checks[0].detail, "btpi-kasm is exited");
        assert_eq!(report.checks[1].detail, "btpi-misp is missing");
        assert_eq!(verifier.prober.calls(), 0);
        assert!(report.health(ServiceId::Kasm).is_unhealthy());
    }

    #[tokio::test]
    async fn failed_extra_check_degrades_service() {
        let config = BtpiConfig::default();
        let docker = Arc::new(
            MockDockerClient::new()
                .with_container("btpi-elasticsearch", ContainerState::Running),
        );
        let prober = ScriptedProber::new(
            vec![ProbeOutcome::Ready],
            ProbeOutcome::NotReady("status red".to_owned()),
        );
        let verifier = Verifier::new(docker, prober, Duration::from_secs(1));

        let report = verifier
            .verify(&config, &ctx(&config), &[ServiceId::Elasticsearch])
            .await
            .unwrap();

        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].check, "cluster status green or yellow");
        assert!(failed[0].detail.ends_with("status red"));
        assert!(matches!(
            report.health(ServiceId::Elasticsearch),
            HealthStatus::Degraded(_)
        ));
    }

    #[tokio::test]
    async fn missing_secret_fails_check_instead_of_erroring() {
        let config = BtpiConfig::default();
        let docker = Arc::new(
            MockDockerClient::new().with_container("btpi-wazuh-manager", ContainerState::Running),
        );
        let verifier = Verifier::new(docker, ScriptedProber::always_ready(), Duration::from_secs(1));
        let empty = catalog::template_context(&config, &EnvFile::new());

        let report = verifier
            .verify(&config, &empty, &[ServiceId::WazuhManager])
            .await
            .unwrap();

        let readiness = &report.checks[1];
        assert_eq!(readiness.check, "readiness");
        assert!(!readiness.passed);
        assert!(readiness.detail.contains("WAZUH_API_PASSWORD"));
    }
}

//! 배포 오케스트레이터
//!
//! [`Deployer`]는 [`DeploymentPlan`] 순서대로 서비스를 하나씩 올립니다.
//!
//! ```text
//! ensure network (1회)
//!   └─ for service in plan:
//!        pull image ─▶ running?  ──yes──▶ AlreadyRunning
//!                        │no
//!                        ├─ exists ──▶ start           (Started)
//!                        └─ missing ─▶ create + start  (Created)
//!                     ─▶ wait for readiness
//!                          └─ 실패 시 restart 1회 후 다시 대기 (restart_on_failure)
//! ```
//!
//! 첫 실패에서 멈추며, 에러([`DeployFailure`])는 그때까지의 부분 리포트를 담습니다.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use btpi_core::config::BtpiConfig;
use btpi_core::error::TemplateError;
use btpi_core::secrets::EnvFile;
use btpi_core::template::TemplateContext;
use btpi_core::types::{ContainerState, DeployMode, ServiceId};

use crate::catalog::{self, container_name};
use crate::docker::DockerClient;
use crate::error::DeployerError;
use crate::plan::DeploymentPlan;
use crate::probe::Prober;
use crate::wait::{ReadyInfo, WaitPolicy, millis, wait_for_service};

/// 배포 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Docker를 호출하지 않고 계획만 보고
    pub dry_run: bool,
    pub skip_pull: bool,
    /// 준비 상태 폴링 생략
    pub no_wait: bool,
}

/// 서비스별 수행 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployAction {
    Created,
    Started,
    AlreadyRunning,
    /// dry-run에서 예정된 동작
    Planned,
}

/// 서비스별 배포 결과
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOutcome {
    pub service: ServiceId,
    pub container: String,
    pub image: String,
    pub action: DeployAction,
    pub ready: Option<ReadyInfo>,
    /// 준비 실패 후 재시작했는지
    pub restarted: bool,
    /// dry-run에서 `.env`에 아직 없는 시크릿
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_secrets: Vec<String>,
}

/// 배포 리포트
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub run_id: String,
    pub mode: DeployMode,
    pub network: String,
    pub dry_run: bool,
    pub services: Vec<ServiceOutcome>,
    pub elapsed_ms: u64,
}

/// 중간에 실패한 배포
#[derive(Debug, thiserror::Error)]
#[error("deployment failed at '{service}': {error}")]
pub struct DeployFailure {
    pub service: ServiceId,
    pub error: DeployerError,
    /// 실패 전까지 완료된 서비스
    pub report: DeploymentReport,
}

/// 서비스별 컨테이너 상태
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceId,
    pub container: String,
    pub state: ContainerState,
}

/// teardown 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub removed: Vec<String>,
    /// 컨테이너가 없어서 건너뜀
    pub skipped: Vec<String>,
    pub volumes_removed: Vec<String>,
    pub network_removed: bool,
    /// 네트워크를 남겨 둔 이유가 된 관리 컨테이너
    pub network_in_use_by: Vec<String>,
    /// 삭제하지 못한 리소스
    pub failures: Vec<TeardownFailure>,
}

/// teardown 중 삭제하지 못한 리소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    pub resource: String,
    pub error: String,
}

impl TeardownFailure {
    fn new(resource: impl Into<String>, error: &DeployerError) -> Self {
        Self {
            resource: resource.into(),
            error: error.to_string(),
        }
    }
}

/// 배포 오케스트레이터
pub struct Deployer<D: DockerClient, P: Prober> {
    docker: Arc<D>,
    prober: P,
    config: BtpiConfig,
    ctx: TemplateContext,
    policy: WaitPolicy,
}

impl<D: DockerClient, P: Prober> Deployer<D, P> {
    pub fn new(docker: Arc<D>, prober: P, config: BtpiConfig, env: &EnvFile) -> Self {
        let ctx = catalog::template_context(&config, env);
        let policy = WaitPolicy::from_config(&config.deploy);
        Self {
            docker,
            prober,
            config,
            ctx,
            policy,
        }
    }

    /// 폴링 정책을 교체합니다.
    pub fn with_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context(&self) -> &TemplateContext {
        &self.ctx
    }

    fn container(&self, id: ServiceId) -> String {
        container_name(&self.config.general.project, id)
    }

    /// 계획대로 배포합니다.
    ///
    /// # Errors
    ///
    /// 첫 실패 시 부분 리포트를 담은 [`DeployFailure`]를 반환합니다.
    pub async fn deploy(
        &self,
        plan: &DeploymentPlan,
        options: &DeployOptions,
    ) -> Result<DeploymentReport, DeployFailure> {
        let started = Instant::now();
        let mut report = DeploymentReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode: plan.mode,
            network: self.config.network.name.clone(),
            dry_run: options.dry_run,
            services: Vec::with_capacity(plan.services.len()),
            elapsed_ms: 0,
        };

        info!(
            run_id = %report.run_id,
            mode = %plan.mode,
            services = plan.services.len(),
            dry_run = options.dry_run,
            "deployment started"
        );

        if !options.dry_run {
            if let Some(first) = plan.services.first() {
                if let Err(error) = self.prepare_network().await {
                    report.elapsed_ms = millis(started.elapsed());
                    return Err(DeployFailure {
                        service: *first,
                        error,
                        report,
                    });
                }
            }
        }

        for id in &plan.services {
            let result = if options.dry_run {
                self.plan_service(*id)
            } else {
                self.deploy_service(*id, options).await
            };
            match result {
                Ok(outcome) => report.services.push(outcome),
                Err(error) => {
                    warn!(run_id = %report.run_id, service = %id, error = %error, "deployment stopped");
                    report.elapsed_ms = millis(started.elapsed());
                    return Err(DeployFailure {
                        service: *id,
                        error,
                        report,
                    });
                }
            }
        }

        report.elapsed_ms = millis(started.elapsed());
        info!(
            run_id = %report.run_id,
            elapsed_ms = report.elapsed_ms,
            "deployment finished"
        );
        Ok(report)
    }

    async fn prepare_network(&self) -> Result<(), DeployerError> {
        self.docker.ping().await?;
        let network = &self.config.network;
        if self
            .docker
            .ensure_network(&network.name, &network.driver)
            .await?
        {
            info!(network = %network.name, driver = %network.driver, "network created");
        }
        Ok(())
    }

    fn plan_service(&self, id: ServiceId) -> Result<ServiceOutcome, DeployerError> {
        let def = catalog::definition(id);
        let mut missing_secrets = Vec::new();
        // 시크릿 누락은 실패가 아니라 목록으로 보고
        let rendered = [
            def.container_spec(&self.config, &self.ctx).map(|_| ()),
            def.readiness_probe(&self.config, &self.ctx).map(|_| ()),
        ];
        for result in rendered {
            match result {
                Ok(()) => {}
                Err(DeployerError::Template(TemplateError::MissingVariables { names })) => {
                    missing_secrets.extend(names);
                }
                Err(e) => return Err(e),
            }
        }
        missing_secrets.sort();
        missing_secrets.dedup();
        if !missing_secrets.is_empty() {
            warn!(service = %id, missing = ?missing_secrets, "secrets not generated yet, run `btpi init`");
        }

        Ok(ServiceOutcome {
            service: id,
            container: self.container(id),
            image: def.image(&self.config).to_owned(),
            action: DeployAction::Planned,
            ready: None,
            restarted: false,
            missing_secrets,
        })
    }

    async fn deploy_service(
        &self,
        id: ServiceId,
        options: &DeployOptions,
    ) -> Result<ServiceOutcome, DeployerError> {
        let def = catalog::definition(id);
        let spec = def.container_spec(&self.config, &self.ctx)?;
        let probe = def.readiness_probe(&self.config, &self.ctx)?;

        if self.config.deploy.pull_images && !options.skip_pull {
            info!(service = %id, image = %spec.image, "pulling image");
            self.docker.pull_image(&spec.image).await?;
        }

        let action = match self.docker.container_state(&spec.name).await? {
            ContainerState::Running => DeployAction::AlreadyRunning,
            ContainerState::Missing => {
                self.docker.create_container(&spec).await?;
                self.docker.start_container(&spec.name).await?;
                DeployAction::Created
            }
            _ => {
                self.docker.start_container(&spec.name).await?;
                DeployAction::Started
            }
        };
        info!(service = %id, container = %spec.name, action = ?action, "container up");

        let mut outcome = ServiceOutcome {
            service: id,
            container: spec.name.clone(),
            image: spec.image.clone(),
            action,
            ready: None,
            restarted: false,
            missing_secrets: Vec::new(),
        };
        if options.no_wait {
            return Ok(outcome);
        }

        match wait_for_service(&self.prober, id, &spec.name, &probe, &self.policy).await {
            Ok(info) => outcome.ready = Some(info),
            Err(error) if self.config.deploy.restart_on_failure => {
                warn!(service = %id, error = %error, "restarting container once");
                self.docker.restart_container(&spec.name).await?;
                outcome.restarted = true;
                outcome.ready =
                    Some(wait_for_service(&self.prober, id, &spec.name, &probe, &self.policy).await?);
            }
            Err(error) => return Err(error),
        }
        Ok(outcome)
    }

    /// 컨테이너를 역순으로 중지/삭제합니다. 없는 컨테이너는 건너뜁니다.
    ///
    /// 개별 컨테이너, 볼륨, 네트워크 삭제 실패는 [`TeardownReport::failures`]에
    /// 기록하고 나머지를 계속 정리합니다. 선택 밖의 관리 컨테이너가 남아 있으면
    /// 네트워크는 지우지 않습니다.
    ///
    /// # Errors
    ///
    /// Docker에 연결할 수 없을 때만 에러를 반환합니다.
    pub async fn teardown(
        &self,
        services: &[ServiceId],
        remove_volumes: bool,
        remove_network: bool,
    ) -> Result<TeardownReport, DeployerError> {
        self.docker.ping().await?;
        let mut report = TeardownReport::default();

        for id in services.iter().rev() {
            let name = self.container(*id);
            match self.remove_service_container(&name, remove_volumes).await {
                Ok(true) => {
                    info!(service = %id, container = %name, "container removed");
                    report.removed.push(name);
                }
                Ok(false) => {
                    info!(service = %id, container = %name, "container not found, skipping");
                    report.skipped.push(name);
                    continue;
                }
                Err(error) => {
                    warn!(service = %id, container = %name, error = %error, "container removal failed");
                    report.failures.push(TeardownFailure::new(name, &error));
                    continue;
                }
            }

            if remove_volumes {
                for volume in catalog::definition(*id).volume_names(&self.config.general.project) {
                    match self.docker.remove_volume(&volume).await {
                        Ok(()) => report.volumes_removed.push(volume),
                        Err(error) => {
                            warn!(volume = %volume, error = %error, "volume removal failed");
                            report.failures.push(TeardownFailure::new(volume, &error));
                        }
                    }
                }
            }
        }

        if remove_network {
            self.teardown_network(&mut report).await;
        }
        Ok(report)
    }

    /// 컨테이너를 중지 후 삭제합니다. 없으면 `Ok(false)`.
    async fn remove_service_container(
        &self,
        name: &str,
        remove_volumes: bool,
    ) -> Result<bool, DeployerError> {
        let state = self.docker.container_state(name).await?;
        if !state.exists() {
            return Ok(false);
        }
        if state.is_running() {
            self.docker.stop_container(name).await?;
        }
        match self.docker.remove_container(name, remove_volumes).await {
            Ok(()) | Err(DeployerError::ContainerNotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn teardown_network(&self, report: &mut TeardownReport) {
        let network = &self.config.network.name;
        match self.docker.list_managed().await {
            Ok(remaining) if !remaining.is_empty() => {
                report.network_in_use_by = remaining.into_iter().map(|c| c.name).collect();
                info!(
                    network = %network,
                    containers = report.network_in_use_by.len(),
                    "network still in use, keeping it"
                );
                return;
            }
            Ok(_) => {}
            Err(error) => {
                report
                    .failures
                    .push(TeardownFailure::new(format!("network {network}"), &error));
                return;
            }
        }
        match self.docker.remove_network(network).await {
            Ok(()) => {
                report.network_removed = true;
                info!(network = %network, "network removed");
            }
            Err(error) => {
                warn!(network = %network, error = %error, "network removal failed");
                report
                    .failures
                    .push(TeardownFailure::new(format!("network {network}"), &error));
            }
        }
    }

    /// 서비스별 컨테이너 상태
    pub async fn status(&self, services: &[ServiceId]) -> Result<Vec<ServiceStatus>, DeployerError> {
        self.docker.ping().await?;
        let mut statuses = Vec::with_capacity(services.len());
        for id in services {
            let container = self.container(*id);
            let state = self.docker.container_state(&container).await?;
            statuses.push(ServiceStatus {
                service: *id,
                container,
                state,
            });
        }
        Ok(statuses)
    }
}

//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐
//! │ Deployer │   │ Verifier │   │ LiveProber  │
//! └────┬─────┘   └────┬─────┘   └──────┬──────┘
//!      └──────────────┼────────────────┘
//!                     ▼
//!              ┌─────────────┐
//!              │DockerClient │ (trait)
//!              └─────────────┘
//!                 │       │
//!                 ▼       ▼
//!            ┌───────┐ ┌──────┐
//!            │Bollard│ │ Mock │
//!            └───┬───┘ └──────┘
//!                ▼
//!          Docker Daemon
//! ```
//!
//! # Name Validation
//!
//! Methods that accept container, network or volume names validate them first:
//! - Must be 1-128 characters
//! - Must start with an ASCII alphanumeric character
//! - May contain only `[A-Za-z0-9_.-]`

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::debug;

use btpi_core::types::ContainerState;

use crate::error::DeployerError;

/// 관리 대상 컨테이너에 붙는 라벨
pub const MANAGED_LABEL: &str = "io.btpi.managed";
/// 서비스 식별 라벨
pub const SERVICE_LABEL: &str = "io.btpi.service";

const STOP_GRACE_SECS: i64 = 30;

/// Validates a Docker object name (container, network, volume).
pub fn validate_name(name: &str) -> Result<(), DeployerError> {
    let invalid = |reason: &str| DeployerError::InvalidName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.is_empty() || name.len() > 128 {
        return Err(invalid("length must be 1-128"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with an alphanumeric character"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(invalid("contains characters outside [A-Za-z0-9_.-]"));
    }
    Ok(())
}

/// 포트 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// 호스트 포트 -> 컨테이너 포트 매핑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    pub const fn tcp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::Tcp,
        }
    }

    pub const fn udp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::Udp,
        }
    }

    /// Docker API 키 형식 (`9200/tcp`)
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container, self.protocol.as_str())
    }
}

/// 컨테이너 생성 요청 (템플릿이 모두 렌더링된 상태)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub ports: Vec<PortMapping>,
    /// `host:container[:mode]` bind mount
    pub binds: Vec<String>,
    /// (named volume, mount path)
    pub volumes: Vec<(String, String)>,
    pub command: Vec<String>,
    pub privileged: bool,
    pub network: String,
    pub labels: Vec<(String, String)>,
}

/// exec 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

/// `io.btpi.managed=true` 라벨이 붙은 컨테이너 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedContainer {
    pub name: String,
    pub service: String,
    pub image: String,
    pub state: ContainerState,
}

/// Trait abstracting Docker API operations.
///
/// # Implementations
///
/// - [`BollardDockerClient`]: Production implementation using the `bollard` library
/// - `MockDockerClient`: Test implementation with configurable responses (available in tests only)
///
/// # Error Handling
///
/// - **404 errors**: Converted to `DeployerError::ContainerNotFound`
///   (`container_state` reports `ContainerState::Missing` instead)
/// - **Connection errors**: Wrapped as `DeployerError::DockerConnection`
/// - **Everything else**: Wrapped as `DeployerError::DockerApi`
pub trait DockerClient: Send + Sync + 'static {
    /// Checks Docker daemon connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Creates the network unless it already exists.
    ///
    /// Returns `true` if the network was created.
    fn ensure_network(
        &self,
        name: &str,
        driver: &str,
    ) -> impl Future<Output = Result<bool, DeployerError>> + Send;

    /// Removes a network. A missing network is not an error.
    fn remove_network(&self, name: &str) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Pulls an image, draining the progress stream.
    fn pull_image(&self, image: &str) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Returns the container state, `Missing` if it does not exist.
    fn container_state(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ContainerState, DeployerError>> + Send;

    /// Creates (but does not start) a container.
    fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<(), DeployerError>> + Send;

    fn start_container(&self, name: &str)
    -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Stops a container with a 30-second grace period.
    fn stop_container(&self, name: &str) -> impl Future<Output = Result<(), DeployerError>> + Send;

    fn restart_container(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Force-removes a container, optionally with its anonymous volumes.
    fn remove_container(
        &self,
        name: &str,
        remove_volumes: bool,
    ) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Removes a named volume. A missing volume is not an error.
    fn remove_volume(&self, name: &str) -> impl Future<Output = Result<(), DeployerError>> + Send;

    /// Runs a command inside a running container and waits for it to exit.
    fn exec(
        &self,
        name: &str,
        cmd: &[String],
    ) -> impl Future<Output = Result<ExecOutput, DeployerError>> + Send;

    /// Lists every container carrying the managed label, running or not.
    fn list_managed(
        &self,
    ) -> impl Future<Output = Result<Vec<ManagedContainer>, DeployerError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker using the default local socket.
    ///
    /// # Errors
    ///
    /// Returns `DeployerError::DockerConnection` if the connection fails.
    pub fn connect_local() -> Result<Self, DeployerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            DeployerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, DeployerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    DeployerError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// 설정의 소켓 경로가 비어 있으면 로컬 기본값으로 연결합니다.
    pub fn connect(socket_path: &str) -> Result<Self, DeployerError> {
        if socket_path.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket_path)
        }
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn api_error(action: &str, target: &str, err: bollard::errors::Error) -> DeployerError {
    if is_not_found(&err) {
        DeployerError::ContainerNotFound(target.to_owned())
    } else {
        DeployerError::DockerApi(format!("{action} '{target}' failed: {err}"))
    }
}

impl DockerClient for BollardDockerClient {
    async fn ping(&self) -> Result<(), DeployerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DeployerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn ensure_network(&self, name: &str, driver: &str) -> Result<bool, DeployerError> {
        use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};

        validate_name(name)?;

        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => return Ok(false),
            Err(e) if is_not_found(&e) => {}
            Err(e) => {
                return Err(DeployerError::DockerApi(format!(
                    "inspect network '{name}' failed: {e}"
                )));
            }
        }

        let options = CreateNetworkOptions {
            name: name.to_owned(),
            driver: driver.to_owned(),
            check_duplicate: true,
            labels: HashMap::from([(MANAGED_LABEL.to_owned(), "true".to_owned())]),
            ..Default::default()
        };
        self.docker.create_network(options).await.map_err(|e| {
            DeployerError::DockerApi(format!("create network '{name}' failed: {e}"))
        })?;
        Ok(true)
    }

    async fn remove_network(&self, name: &str) -> Result<(), DeployerError> {
        validate_name(name)?;
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(DeployerError::DockerApi(format!(
                "remove network '{name}' failed: {e}"
            ))),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), DeployerError> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: image.to_owned(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| {
                DeployerError::DockerApi(format!("pull image '{image}' failed: {e}"))
            })?;
            if let Some(status) = info.status {
                debug!(image, status = %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState, DeployerError> {
        use bollard::container::InspectContainerOptions;

        validate_name(name)?;

        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(details
                .state
                .and_then(|s| s.status)
                .map(|s| ContainerState::from_docker(&s.to_string()))
                .unwrap_or_else(|| ContainerState::Other("unknown".to_owned()))),
            Err(e) if is_not_found(&e) => Ok(ContainerState::Missing),
            Err(e) => Err(DeployerError::DockerApi(format!(
                "inspect container '{name}' failed: {e}"
            ))),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), DeployerError> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};

        validate_name(&spec.name)?;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &spec.ports {
            exposed_ports.insert(port.container_key(), HashMap::new());
            port_bindings.insert(
                port.container_key(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(port.host.to_string()),
                }]),
            );
        }

        let mut binds = spec.binds.clone();
        binds.extend(
            spec.volumes
                .iter()
                .map(|(volume, path)| format!("{volume}:{path}")),
        );

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(binds),
            privileged: Some(spec.privileged),
            network_mode: Some(spec.network.clone()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(
                spec.env
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>(),
            ),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.iter().cloned().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                DeployerError::DockerApi(format!("create container '{}' failed: {e}", spec.name))
            })?;
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), DeployerError> {
        use bollard::container::StartContainerOptions;

        validate_name(name)?;
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| api_error("start container", name, e))
    }

    async fn stop_container(&self, name: &str) -> Result<(), DeployerError> {
        use bollard::container::StopContainerOptions;

        validate_name(name)?;
        self.docker
            .stop_container(name, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(|e| api_error("stop container", name, e))
    }

    async fn restart_container(&self, name: &str) -> Result<(), DeployerError> {
        use bollard::container::RestartContainerOptions;

        validate_name(name)?;
        self.docker
            .restart_container(
                name,
                Some(RestartContainerOptions {
                    t: STOP_GRACE_SECS as isize,
                }),
            )
            .await
            .map_err(|e| api_error("restart container", name, e))
    }

    async fn remove_container(&self, name: &str, remove_volumes: bool) -> Result<(), DeployerError> {
        use bollard::container::RemoveContainerOptions;

        validate_name(name)?;
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    v: remove_volumes,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| api_error("remove container", name, e))
    }

    async fn remove_volume(&self, name: &str) -> Result<(), DeployerError> {
        validate_name(name)?;
        match self.docker.remove_volume(name, None).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(DeployerError::DockerApi(format!(
                "remove volume '{name}' failed: {e}"
            ))),
        }
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput, DeployerError> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        validate_name(name)?;

        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| api_error("create exec in", name, e))?;

        let mut output = String::new();
        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| api_error("start exec in", name, e))?
        {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| api_error("read exec output from", name, e))?;
                output.push_str(&chunk.to_string());
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| api_error("inspect exec in", name, e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            output,
        })
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, DeployerError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([(
                "label".to_owned(),
                vec![format!("{MANAGED_LABEL}=true")],
            )]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| DeployerError::DockerApi(format!("list containers failed: {e}")))?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let name = container
                .names
                .unwrap_or_default()
                .first()
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default();
            let service = container
                .labels
                .as_ref()
                .and_then(|labels| labels.get(SERVICE_LABEL).cloned())
                .unwrap_or_default();
            result.push(ManagedContainer {
                name,
                service,
                image: container.image.unwrap_or_default(),
                state: ContainerState::from_docker(&container.state.unwrap_or_default()),
            });
        }
        Ok(result)
    }
}

/// 테스트용 Mock Docker 클라이언트
///
/// 컨테이너 상태를 메모리에 보관하고, 호출 기록을 남깁니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    pub states: std::sync::Mutex<HashMap<String, ContainerState>>,
    pub created: std::sync::Mutex<Vec<ContainerSpec>>,
    pub calls: std::sync::Mutex<Vec<String>>,
    pub exec_exit_code: i64,
    pub unreachable: bool,
    pub fail_pull: bool,
    pub fail_remove_network: bool,
}

#[cfg(test)]
impl MockDockerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str, state: ContainerState) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(name.to_owned(), state);
        self
    }

    pub fn with_exec_exit_code(mut self, code: i64) -> Self {
        self.exec_exit_code = code;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn with_failing_network_removal(mut self) -> Self {
        self.fail_remove_network = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn state_of(&self, name: &str) -> ContainerState {
        self.states
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or(ContainerState::Missing)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn set_state(&self, name: &str, state: ContainerState) -> Result<(), DeployerError> {
        let mut states = self.states.lock().unwrap();
        match states.get_mut(name) {
            Some(current) => {
                *current = state;
                Ok(())
            }
            None => Err(DeployerError::ContainerNotFound(name.to_owned())),
        }
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn ping(&self) -> Result<(), DeployerError> {
        if self.unreachable {
            return Err(DeployerError::DockerConnection("mock unreachable".to_owned()));
        }
        Ok(())
    }

    async fn ensure_network(&self, name: &str, _driver: &str) -> Result<bool, DeployerError> {
        validate_name(name)?;
        self.record(format!("network:{name}"));
        Ok(true)
    }

    async fn remove_network(&self, name: &str) -> Result<(), DeployerError> {
        self.record(format!("rm-network:{name}"));
        if self.fail_remove_network {
            return Err(DeployerError::DockerApi(format!(
                "remove network '{name}' failed: network has active endpoints"
            )));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), DeployerError> {
        self.record(format!("pull:{image}"));
        if self.fail_pull {
            return Err(DeployerError::DockerApi(format!("pull image '{image}' failed")));
        }
        Ok(())
    }

    async fn container_state(&self, name: &str) -> Result<ContainerState, DeployerError> {
        validate_name(name)?;
        Ok(self.state_of(name))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<(), DeployerError> {
        validate_name(&spec.name)?;
        self.record(format!("create:{}", spec.name));
        self.states
            .lock()
            .unwrap()
            .insert(spec.name.clone(), ContainerState::Created);
        self.created.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), DeployerError> {
        self.record(format!("start:{name}"));
        self.set_state(name, ContainerState::Running)
    }

    async fn stop_container(&self, name: &str) -> Result<(), DeployerError> {
        self.record(format!("stop:{name}"));
        self.set_state(name, ContainerState::Exited)
    }

    async fn restart_container(&self, name: &str) -> Result<(), DeployerError> {
        self.record(format!("restart:{name}"));
        self.set_state(name, ContainerState::Running)
    }

    async fn remove_container(&self, name: &str, _remove_volumes: bool) -> Result<(), DeployerError> {
        self.record(format!("rm:{name}"));
        match self.states.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(DeployerError::ContainerNotFound(name.to_owned())),
        }
    }

    async fn remove_volume(&self, name: &str) -> Result<(), DeployerError> {
        self.record(format!("rm-volume:{name}"));
        Ok(())
    }

    async fn exec(&self, name: &str, cmd: &[String]) -> Result<ExecOutput, DeployerError> {
        self.record(format!("exec:{name}:{}", cmd.join(" ")));
        Ok(ExecOutput {
            exit_code: self.exec_exit_code,
            output: String::new(),
        })
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, DeployerError> {
        let states = self.states.lock().unwrap();
        let mut result: Vec<ManagedContainer> = states
            .iter()
            .map(|(name, state)| ManagedContainer {
                name: name.clone(),
                service: String::new(),
                image: String::new(),
                state: state.clone(),
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}

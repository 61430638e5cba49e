//! 배포기 에러 타입
//!
//! [`DeployerError`]는 Docker 호출, 배포 계획, 자산 생성, 준비 상태 폴링에서
//! 발생하는 모든 에러를 표현합니다. `From<DeployerError> for BtpiError` 변환이
//! 구현되어 있어 상위 레이어에서 `?`로 전파할 수 있습니다.

use btpi_core::error::{BtpiError, DeploymentError, TemplateError};
use btpi_core::types::ServiceId;

/// 배포기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Docker 리소스 이름이 허용 형식이 아님
    #[error("invalid docker name '{name}': {reason}")]
    InvalidName {
        /// 문제가 된 이름
        name: String,
        /// 거부 사유
        reason: String,
    },

    /// 알 수 없는 서비스 이름
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// 서비스 의존성 순환
    #[error("dependency cycle among services: {}", .services.iter().map(ServiceId::as_str).collect::<Vec<_>>().join(" -> "))]
    DependencyCycle {
        /// 순환에 걸린 서비스
        services: Vec<ServiceId>,
    },

    /// 두 서비스가 같은 호스트 포트를 사용
    #[error("host port {port}/{protocol} is used by both '{first}' and '{second}'")]
    PortConflict {
        port: u16,
        protocol: String,
        first: ServiceId,
        second: ServiceId,
    },

    /// 배포 계획 에러
    #[error("plan error: {0}")]
    Plan(String),

    /// 설정 파일/디렉터리 쓰기 실패
    #[error("asset error: {path}: {source}")]
    Asset {
        /// 대상 경로
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 생성형 설정 파일 내용 생성 실패
    #[error("failed to generate {path}: {reason}")]
    Generate {
        /// 서비스 설정 디렉터리 기준 경로
        path: String,
        reason: String,
    },

    /// 서비스가 준비 상태에 도달하지 못함
    #[error("service '{service}' not ready after {attempts} attempts: {reason}")]
    NotReady {
        service: ServiceId,
        attempts: u32,
        /// 마지막 프로브 실패 사유
        reason: String,
    },

    /// 템플릿 렌더링 실패
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// 코어 에러 (설정, 시크릿, TLS, I/O)
    #[error(transparent)]
    Core(#[from] BtpiError),
}

impl From<DeployerError> for BtpiError {
    fn from(err: DeployerError) -> Self {
        match err {
            DeployerError::DockerApi(msg) => BtpiError::Deployment(DeploymentError::DockerApi(msg)),
            DeployerError::DockerConnection(msg) => {
                BtpiError::Deployment(DeploymentError::DockerUnavailable(msg))
            }
            DeployerError::ContainerNotFound(_) | DeployerError::InvalidName { .. } => {
                BtpiError::Deployment(DeploymentError::DockerApi(err.to_string()))
            }
            DeployerError::UnknownService(_)
            | DeployerError::DependencyCycle { .. }
            | DeployerError::PortConflict { .. }
            | DeployerError::Plan(_)
            | DeployerError::Generate { .. } => {
                BtpiError::Deployment(DeploymentError::Plan(err.to_string()))
            }
            DeployerError::Asset { path, source } => {
                BtpiError::Io(std::io::Error::new(source.kind(), format!("{path}: {source}")))
            }
            DeployerError::NotReady {
                service, reason, ..
            } => BtpiError::Deployment(DeploymentError::NotReady {
                service: service.to_string(),
                reason,
            }),
            DeployerError::Template(e) => BtpiError::Template(e),
            DeployerError::Core(e) => e,
        }
    }
}

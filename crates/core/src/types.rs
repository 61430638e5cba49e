//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 배포 대상 서비스 식별자, 배포 모드, 컨테이너 상태, 헬스 상태를 정의합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 배포 대상 서비스 식별자
///
/// `ServiceId::ALL`의 순서가 기본 배포 순서입니다 (의존성 정렬 시 tie-breaker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceId {
    Portainer,
    Elasticsearch,
    Cassandra,
    WazuhIndexer,
    WazuhManager,
    WazuhDashboard,
    Velociraptor,
    Kasm,
    Misp,
    #[serde(rename = "thehive")]
    TheHive,
    Cortex,
}

impl ServiceId {
    /// 모든 서비스 (기본 배포 순서)
    pub const ALL: [ServiceId; 11] = [
        ServiceId::Portainer,
        ServiceId::Elasticsearch,
        ServiceId::Cassandra,
        ServiceId::WazuhIndexer,
        ServiceId::WazuhManager,
        ServiceId::WazuhDashboard,
        ServiceId::Velociraptor,
        ServiceId::Kasm,
        ServiceId::Misp,
        ServiceId::TheHive,
        ServiceId::Cortex,
    ];

    /// kebab-case 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portainer => "portainer",
            Self::Elasticsearch => "elasticsearch",
            Self::Cassandra => "cassandra",
            Self::WazuhIndexer => "wazuh-indexer",
            Self::WazuhManager => "wazuh-manager",
            Self::WazuhDashboard => "wazuh-dashboard",
            Self::Velociraptor => "velociraptor",
            Self::Kasm => "kasm",
            Self::Misp => "misp",
            Self::TheHive => "thehive",
            Self::Cortex => "cortex",
        }
    }

    /// 레거시 서비스 여부
    ///
    /// TheHive/Cortex는 full 모드에 포함되지 않으며, 명시적으로 요청하거나
    /// 설정에서 `enabled = true`로 켠 경우에만 배포됩니다.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::TheHive | Self::Cortex)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ServiceId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "service".to_owned(),
                reason: format!(
                    "unknown service '{s}' (expected one of: {})",
                    ServiceId::ALL
                        .iter()
                        .map(ServiceId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
    }
}

/// 배포 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// 레거시를 제외한 모든 서비스
    #[default]
    Full,
    /// Wazuh 스택 + Velociraptor + Portainer
    Minimal,
    /// 명시된 서비스만
    Custom,
}

impl DeployMode {
    /// 모드에 포함되는 서비스 (custom은 빈 목록)
    pub fn default_services(&self) -> Vec<ServiceId> {
        match self {
            Self::Full => ServiceId::ALL
                .iter()
                .copied()
                .filter(|id| !id.is_legacy())
                .collect(),
            Self::Minimal => vec![
                ServiceId::Portainer,
                ServiceId::WazuhIndexer,
                ServiceId::WazuhManager,
                ServiceId::WazuhDashboard,
                ServiceId::Velociraptor,
            ],
            Self::Custom => Vec::new(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "custom" => Ok(Self::Custom),
            other => Err(ConfigError::InvalidValue {
                field: "deploy.mode".to_owned(),
                reason: format!("unknown mode '{other}' (expected: full, minimal, custom)"),
            }),
        }
    }
}

/// 컨테이너 런타임 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Paused,
    Restarting,
    Exited,
    Created,
    /// 컨테이너가 존재하지 않음
    Missing,
    Other(String),
}

impl ContainerState {
    /// Docker가 보고하는 상태 문자열에서 변환합니다.
    pub fn from_docker(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" | "dead" => Self::Exited,
            "created" => Self::Created,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Paused => f.write_str("paused"),
            Self::Restarting => f.write_str("restarting"),
            Self::Exited => f.write_str("exited"),
            Self::Created => f.write_str("created"),
            Self::Missing => f.write_str("missing"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }

    /// 여러 상태 중 가장 나쁜 상태를 반환합니다.
    ///
    /// Unhealthy > Degraded > Healthy. 사유는 `"; "`로 이어 붙입니다.
    pub fn worst_of<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> HealthStatus {
        let mut degraded = Vec::new();
        let mut unhealthy = Vec::new();
        for status in statuses {
            match status {
                Self::Healthy => {}
                Self::Degraded(reason) => degraded.push(reason.as_str()),
                Self::Unhealthy(reason) => unhealthy.push(reason.as_str()),
            }
        }
        if !unhealthy.is_empty() {
            Self::Unhealthy(unhealthy.join("; "))
        } else if !degraded.is_empty() {
            Self::Degraded(degraded.join("; "))
        } else {
            Self::Healthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

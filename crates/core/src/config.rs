//! 설정 관리 — btpi.toml 파싱 및 런타임 설정
//!
//! [`BtpiConfig`]는 배포에 필요한 모든 설정을 담는 최상위 구조체입니다.
//! 스크립트를 `sed`로 고쳐 쓰던 동작은 전부 이 설정값으로 대체됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BTPI_DEPLOY_MODE=minimal` 형식)
//! 3. 설정 파일 (`btpi.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), btpi_core::error::BtpiError> {
//! use btpi_core::config::BtpiConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BtpiConfig::load("btpi.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BtpiConfig::parse("[deploy]\nmode = \"minimal\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BtpiError, ConfigError};
use crate::types::{DeployMode, ServiceId};

/// 대기 시도 횟수 상한
const MAX_WAIT_ATTEMPTS: u32 = 1000;
/// 대기 간격 상한 (초)
const MAX_WAIT_INTERVAL_SECS: u64 = 600;

/// BTPI 통합 설정
///
/// `btpi.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BtpiConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 네트워크 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 배포 동작 설정
    #[serde(default)]
    pub deploy: DeployConfig,
    /// 서비스별 오버라이드 (`[services.wazuh-manager]`)
    #[serde(default)]
    pub services: BTreeMap<String, ServiceOverride>,
}

impl BtpiConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BtpiError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BtpiError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BtpiError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BtpiError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BtpiError> {
        toml::from_str(toml_str).map_err(|e| {
            BtpiError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BTPI_{SECTION}_{FIELD}`
    /// 예: `BTPI_NETWORK_HOST_ADDRESS=10.0.0.5`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BTPI_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BTPI_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "BTPI_GENERAL_DATA_DIR");
        override_string(&mut self.general.env_file, "BTPI_GENERAL_ENV_FILE");
        override_string(&mut self.general.project, "BTPI_GENERAL_PROJECT");

        // Network
        override_string(&mut self.network.name, "BTPI_NETWORK_NAME");
        override_string(&mut self.network.driver, "BTPI_NETWORK_DRIVER");
        override_string(&mut self.network.host_address, "BTPI_NETWORK_HOST_ADDRESS");
        override_string(&mut self.network.docker_socket, "BTPI_NETWORK_DOCKER_SOCKET");

        // Deploy
        if let Ok(val) = std::env::var("BTPI_DEPLOY_MODE") {
            match val.parse::<DeployMode>() {
                Ok(mode) => self.deploy.mode = mode,
                Err(_) => warn!(
                    env_key = "BTPI_DEPLOY_MODE",
                    value = val.as_str(),
                    "failed to parse deploy mode from env var, ignoring"
                ),
            }
        }
        override_csv(&mut self.deploy.services, "BTPI_DEPLOY_SERVICES");
        override_bool(&mut self.deploy.pull_images, "BTPI_DEPLOY_PULL_IMAGES");
        override_u32(
            &mut self.deploy.wait_max_attempts,
            "BTPI_DEPLOY_WAIT_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.deploy.wait_interval_secs,
            "BTPI_DEPLOY_WAIT_INTERVAL_SECS",
        );
        override_u64(
            &mut self.deploy.probe_timeout_secs,
            "BTPI_DEPLOY_PROBE_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.deploy.restart_on_failure,
            "BTPI_DEPLOY_RESTART_ON_FAILURE",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BtpiError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.general.data_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.data_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        // 컨테이너 이름 접두어로 쓰이므로 Docker 이름 규칙을 따라야 함
        let project = &self.general.project;
        if project.is_empty()
            || !project
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidValue {
                field: "general.project".to_owned(),
                reason: "must be non-empty and contain only [A-Za-z0-9_-]".to_owned(),
            }
            .into());
        }

        if self.network.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "network.name".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.network.host_address.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "network.host_address".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.deploy.wait_max_attempts == 0 || self.deploy.wait_max_attempts > MAX_WAIT_ATTEMPTS
        {
            return Err(ConfigError::InvalidValue {
                field: "deploy.wait_max_attempts".to_owned(),
                reason: format!("must be between 1 and {MAX_WAIT_ATTEMPTS}"),
            }
            .into());
        }

        if self.deploy.wait_interval_secs == 0
            || self.deploy.wait_interval_secs > MAX_WAIT_INTERVAL_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "deploy.wait_interval_secs".to_owned(),
                reason: format!("must be between 1 and {MAX_WAIT_INTERVAL_SECS}"),
            }
            .into());
        }

        if self.deploy.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "deploy.probe_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        for name in &self.deploy.services {
            name.parse::<ServiceId>().map_err(|_| ConfigError::InvalidValue {
                field: "deploy.services".to_owned(),
                reason: format!("unknown service '{name}'"),
            })?;
        }

        for name in self.services.keys() {
            name.parse::<ServiceId>().map_err(|_| ConfigError::InvalidValue {
                field: format!("services.{name}"),
                reason: "unknown service".to_owned(),
            })?;
        }

        Ok(())
    }

    /// `.env` 파일의 실제 경로 (상대 경로는 `data_dir` 기준)
    pub fn env_file_path(&self) -> PathBuf {
        let env_file = Path::new(&self.general.env_file);
        if env_file.is_absolute() {
            env_file.to_path_buf()
        } else {
            self.data_dir().join(env_file)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir)
    }

    /// 생성된 인증서 디렉토리
    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir().join("certs")
    }

    /// 렌더링된 서비스 설정 파일 디렉토리
    pub fn service_config_dir(&self, id: ServiceId) -> PathBuf {
        self.data_dir().join("config").join(id.as_str())
    }

    /// 서비스 오버라이드 조회 (`wazuh_manager`와 `wazuh-manager` 모두 허용)
    pub fn service_override(&self, id: ServiceId) -> Option<&ServiceOverride> {
        self.services
            .iter()
            .find(|(name, _)| name.parse::<ServiceId>().ok() == Some(id))
            .map(|(_, ov)| ov)
    }

    /// 설정상 명시적 활성화 여부 (`None`이면 모드 기본값을 따름)
    pub fn service_enabled(&self, id: ServiceId) -> Option<bool> {
        self.service_override(id).and_then(|ov| ov.enabled)
    }

    pub fn image_override(&self, id: ServiceId) -> Option<&str> {
        self.service_override(id).and_then(|ov| ov.image.as_deref())
    }

    /// `deploy.services`를 파싱합니다 (validate 이후 호출 시 실패하지 않음).
    pub fn requested_services(&self) -> Result<Vec<ServiceId>, ConfigError> {
        self.deploy
            .services
            .iter()
            .map(|s| s.parse::<ServiceId>())
            .collect()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 생성 파일(시크릿, 인증서, 서비스 설정)의 루트 디렉토리
    pub data_dir: String,
    /// `.env` 파일 경로 (상대 경로는 data_dir 기준)
    pub env_file: String,
    /// 컨테이너 이름 접두어
    pub project: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: "/opt/btpi-react".to_owned(),
            env_file: ".env".to_owned(),
            project: "btpi".to_owned(),
        }
    }
}

/// Docker 네트워크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 서비스들이 공유하는 Docker 네트워크 이름
    pub name: String,
    /// 네트워크 드라이버
    pub driver: String,
    /// 호스트 측 프로브와 접속 URL에 쓰는 주소
    pub host_address: String,
    /// Docker 소켓 경로 (빈 문자열이면 로컬 기본값)
    pub docker_socket: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "btpi-network".to_owned(),
            driver: "bridge".to_owned(),
            host_address: "localhost".to_owned(),
            docker_socket: String::new(),
        }
    }
}

/// 배포 동작 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// 배포 모드
    pub mode: DeployMode,
    /// custom 모드에서 배포할 서비스
    pub services: Vec<String>,
    /// 배포 전 이미지 pull 여부
    pub pull_images: bool,
    /// 준비 상태 폴링 최대 시도 횟수
    pub wait_max_attempts: u32,
    /// 폴링 간격 (초)
    pub wait_interval_secs: u64,
    /// 프로브 1회 타임아웃 (초)
    pub probe_timeout_secs: u64,
    /// 준비 실패 시 컨테이너를 한 번 재시작하고 다시 폴링
    pub restart_on_failure: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            mode: DeployMode::Full,
            services: Vec::new(),
            pull_images: true,
            wait_max_attempts: 30,
            wait_interval_secs: 10,
            probe_timeout_secs: 5,
            restart_on_failure: true,
        }
    }
}

/// 서비스별 오버라이드
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverride {
    /// 명시적 활성화/비활성화
    pub enabled: Option<bool>,
    /// 이미지 교체 (예: 사내 레지스트리 미러)
    pub image: Option<String>,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

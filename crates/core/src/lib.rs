#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod secrets;
pub mod template;
pub mod tls;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    BtpiError, ConfigError, DeploymentError, SecretError, TemplateError, TlsError,
};

// 설정
pub use config::{BtpiConfig, DeployConfig, GeneralConfig, NetworkConfig, ServiceOverride};

// 시크릿 / 템플릿 / TLS
pub use secrets::{EnvFile, SecretKind, SecretSpec};
pub use template::TemplateContext;
pub use tls::{CertificateBundle, LeafSpec};

// 도메인 타입
pub use types::{ContainerState, DeployMode, HealthStatus, ServiceId};

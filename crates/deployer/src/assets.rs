//! 배포 자산 준비
//!
//! 컨테이너를 만들기 전에 필요한 파일을 모두 준비합니다.
//!
//! 1. `.env` 시크릿: 선택된 서비스가 요구하는 키 중 없는 것만 생성 (`rotate`면 전부)
//! 2. TLS 번들: 인증서를 마운트하는 서비스가 있을 때만, 불완전하거나 `force`면 재생성
//! 3. 서비스 설정 파일: `<data_dir>/config/<service>/` 아래에 매번 다시 렌더링

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::{EnvFile, SecretSpec, ensure_secrets};
use btpi_core::tls;
use btpi_core::types::ServiceId;

use crate::catalog::{self, CA_COMMON_NAME};
use crate::error::DeployerError;

/// `prepare` 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetReport {
    pub env_file: PathBuf,
    /// 이번 실행에서 새로 쓴 시크릿 키
    pub generated_secrets: Vec<String>,
    pub certificates_generated: bool,
    pub files_written: Vec<PathBuf>,
}

/// 시크릿, 인증서, 설정 파일 생성기
pub struct AssetGenerator<'a> {
    config: &'a BtpiConfig,
}

impl<'a> AssetGenerator<'a> {
    pub fn new(config: &'a BtpiConfig) -> Self {
        Self { config }
    }

    /// 선택된 서비스가 요구하는 시크릿 (키 기준 중복 제거, 카탈로그 순서)
    pub fn required_secrets(services: &[ServiceId]) -> Vec<SecretSpec> {
        let mut specs: Vec<SecretSpec> = Vec::new();
        for id in ServiceId::ALL.into_iter().filter(|id| services.contains(id)) {
            for spec in catalog::definition(id).secrets {
                if !specs.iter().any(|s| s.key == spec.key) {
                    specs.push(*spec);
                }
            }
        }
        specs
    }

    /// 자산을 준비합니다.
    ///
    /// # Errors
    ///
    /// `.env` 읽기/쓰기, 인증서 생성, 설정 파일 렌더링/쓰기 실패.
    pub async fn prepare(
        &self,
        services: &[ServiceId],
        force_certs: bool,
        rotate: bool,
    ) -> Result<AssetReport, DeployerError> {
        let env_path = self.config.env_file_path();
        let mut env = EnvFile::load(&env_path).await?;

        let specs = Self::required_secrets(services);
        let generated_secrets = ensure_secrets(&mut env, &specs, rotate);
        if !generated_secrets.is_empty() || !env_path.exists() {
            env.save(&env_path).await?;
            info!(
                path = %env_path.display(),
                generated = generated_secrets.len(),
                "env file written"
            );
        }
        if rotate && !generated_secrets.is_empty() {
            warn!("rotated secrets take effect after the affected containers are recreated");
        }

        let needs_certs = services
            .iter()
            .any(|id| catalog::definition(*id).uses_certificates);
        let certificates_generated = if needs_certs {
            tls::ensure_bundle(
                self.config.certs_dir(),
                CA_COMMON_NAME,
                &catalog::leaf_specs(self.config),
                force_certs,
            )
            .await?
        } else {
            false
        };

        let ctx = catalog::template_context(self.config, &env);
        let mut files_written = Vec::new();
        for id in services {
            let def = catalog::definition(*id);
            if def.files.is_empty() {
                continue;
            }
            let dir = self.config.service_config_dir(*id);
            create_dir(&dir).await?;
            let local = catalog::service_context(self.config, &ctx, *id);
            for file in def.files {
                let path = dir.join(file.path);
                let content = file.render(&local)?;
                write_file(&path, &content, file.secret).await?;
                debug!(service = %id, path = %path.display(), "config file rendered");
                files_written.push(path);
            }
        }

        if services.contains(&ServiceId::Cortex) {
            create_dir(&self.config.data_dir().join("cortex-jobs")).await?;
        }

        info!(
            services = services.len(),
            files = files_written.len(),
            certificates_generated,
            "assets prepared"
        );

        Ok(AssetReport {
            env_file: env_path,
            generated_secrets,
            certificates_generated,
            files_written,
        })
    }
}

fn asset_error(path: &Path, err: std::io::Error) -> DeployerError {
    DeployerError::Asset {
        path: path.display().to_string(),
        source: err,
    }
}

async fn create_dir(dir: &Path) -> Result<(), DeployerError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| asset_error(dir, e))
}

async fn write_file(path: &Path, content: &str, secret: bool) -> Result<(), DeployerError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| asset_error(path, e))?;
    #[cfg(unix)]
    if secret {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| asset_error(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = secret;
    Ok(())
}

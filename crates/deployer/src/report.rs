//! 접속 정보 리포트
//!
//! 배포된 서비스의 URL과 자격 증명을 정리합니다. 비밀번호는 기본적으로
//! 마스킹하며 `reveal`일 때만 원문을 넣습니다.

use serde::Serialize;

use btpi_core::secrets::{EnvFile, mask};
use btpi_core::template::TemplateContext;
use btpi_core::types::ServiceId;

use crate::catalog;
use crate::error::DeployerError;

/// 접속 정보 1건
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessEntry {
    pub service: ServiceId,
    pub label: String,
    pub url: String,
    pub username: Option<String>,
    /// 마스킹되었거나 원문인 비밀번호. `.env`에 없으면 `None`
    pub password: Option<String>,
}

/// 접속 정보 리포트
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessReport {
    pub entries: Vec<AccessEntry>,
    pub revealed: bool,
}

impl AccessReport {
    /// # Errors
    ///
    /// URL 템플릿 렌더링 실패 시 `DeployerError::Template`.
    pub fn build(
        services: &[ServiceId],
        ctx: &TemplateContext,
        env: &EnvFile,
        reveal: bool,
    ) -> Result<Self, DeployerError> {
        let mut entries = Vec::new();
        for id in services {
            for access in catalog::definition(*id).access {
                let password = access
                    .password_key
                    .and_then(|key| env.get(key))
                    .map(|value| {
                        if reveal {
                            value.to_owned()
                        } else {
                            mask(value)
                        }
                    });
                entries.push(AccessEntry {
                    service: *id,
                    label: access.label.to_owned(),
                    url: ctx.render(access.url)?,
                    username: access.username.map(str::to_owned),
                    password,
                });
            }
        }
        Ok(Self {
            entries,
            revealed: reveal,
        })
    }
}

//! 준비 상태 프로브
//!
//! 카탈로그의 [`Probe`]는 `'static` 템플릿이고, [`Probe::render`]로 현재
//! `.env`/설정 값을 채운 [`RenderedProbe`]가 실제 실행 단위입니다.
//!
//! 실행은 [`Prober`] trait 뒤에 있습니다. 프로덕션은 [`LiveProber`]
//! (reqwest + TCP connect + Docker exec), 테스트는 스크립트된 mock을 씁니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

use btpi_core::error::TemplateError;
use btpi_core::template::TemplateContext;

use crate::docker::DockerClient;
use crate::error::DeployerError;

/// HTTP 메서드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// HTTP 프로브 템플릿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpProbe {
    pub url: &'static str,
    pub method: HttpMethod,
    /// 허용 상태 코드 (하나라도 일치하면 통과)
    pub expect_status: &'static [u16],
    /// 본문에 포함되어야 하는 문자열 (비어 있으면 검사 안 함, 하나라도 있으면 통과)
    pub body_contains: &'static [&'static str],
    /// (username, password) 템플릿
    pub basic_auth: Option<(&'static str, &'static str)>,
    /// JSON 요청 본문 템플릿
    pub body: Option<&'static str>,
    /// 자체 서명 인증서 허용
    pub insecure: bool,
}

impl HttpProbe {
    /// 인증 없는 GET, 200 기대
    pub const fn get(url: &'static str) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            expect_status: &[200],
            body_contains: &[],
            basic_auth: None,
            body: None,
            insecure: false,
        }
    }
}

/// 프로브 템플릿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Http(HttpProbe),
    /// TCP 연결 성공 여부
    Tcp { host: &'static str, port: u16 },
    /// 컨테이너 안에서 명령 실행, exit code 0이면 통과
    Exec { command: &'static [&'static str] },
}

impl Probe {
    /// 템플릿 변수를 채웁니다.
    pub fn render(&self, ctx: &TemplateContext) -> Result<RenderedProbe, TemplateError> {
        Ok(match self {
            Self::Http(http) => RenderedProbe::Http {
                url: ctx.render(http.url)?,
                method: http.method,
                expect_status: http.expect_status.to_vec(),
                body_contains: http.body_contains.iter().map(|s| (*s).to_owned()).collect(),
                basic_auth: match http.basic_auth {
                    Some((user, password)) => Some((ctx.render(user)?, ctx.render(password)?)),
                    None => None,
                },
                body: http.body.map(|b| ctx.render(b)).transpose()?,
                insecure: http.insecure,
            },
            Self::Tcp { host, port } => RenderedProbe::Tcp {
                host: ctx.render(host)?,
                port: *port,
            },
            Self::Exec { command } => RenderedProbe::Exec {
                command: command
                    .iter()
                    .map(|arg| ctx.render(arg))
                    .collect::<Result<_, _>>()?,
            },
        })
    }
}

/// 변수가 채워진 프로브
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedProbe {
    Http {
        url: String,
        method: HttpMethod,
        expect_status: Vec<u16>,
        body_contains: Vec<String>,
        basic_auth: Option<(String, String)>,
        body: Option<String>,
        insecure: bool,
    },
    Tcp {
        host: String,
        port: u16,
    },
    Exec {
        command: Vec<String>,
    },
}

impl RenderedProbe {
    /// 로그/리포트용 설명. 자격 증명과 요청 본문은 포함하지 않습니다.
    pub fn describe(&self) -> String {
        match self {
            Self::Http { url, method, .. } => {
                let method = match method {
                    HttpMethod::Get => "GET",
                    HttpMethod::Post => "POST",
                };
                format!("{method} {url}")
            }
            Self::Tcp { host, port } => format!("tcp {host}:{port}"),
            Self::Exec { command } => format!("exec {}", command.first().map_or("", String::as_str)),
        }
    }
}

/// 프로브 1회 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    NotReady(String),
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// HTTP 응답을 기대값과 비교합니다.
pub fn evaluate_http(
    status: u16,
    body: &str,
    expect_status: &[u16],
    body_contains: &[String],
) -> ProbeOutcome {
    if !expect_status.contains(&status) {
        return ProbeOutcome::NotReady(format!(
            "unexpected status {status} (expected {})",
            expect_status
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join("/")
        ));
    }
    if !body_contains.is_empty() && !body_contains.iter().any(|needle| body.contains(needle)) {
        return ProbeOutcome::NotReady(format!(
            "response body does not contain any of: {}",
            body_contains.join(", ")
        ));
    }
    ProbeOutcome::Ready
}

/// 프로브 실행기
pub trait Prober: Send + Sync {
    /// 프로브를 한 번 실행합니다. 타임아웃은 호출자가 건 값입니다.
    ///
    /// `container`는 exec 프로브 대상 컨테이너 이름입니다.
    fn probe(
        &self,
        container: &str,
        probe: &RenderedProbe,
        timeout: Duration,
    ) -> impl Future<Output = ProbeOutcome> + Send;
}

/// reqwest/TCP/Docker exec 기반 프로덕션 프로브 실행기
pub struct LiveProber<D: DockerClient> {
    docker: Arc<D>,
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl<D: DockerClient> LiveProber<D> {
    /// # Errors
    ///
    /// HTTP 클라이언트 TLS 백엔드 초기화 실패 시 `DeployerError::Plan`을 반환합니다.
    pub fn new(docker: Arc<D>) -> Result<Self, DeployerError> {
        let build = |insecure: bool| {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| DeployerError::Plan(format!("failed to build http client: {e}")))
        };
        Ok(Self {
            docker,
            client: build(false)?,
            insecure_client: build(true)?,
        })
    }

    async fn probe_http(&self, probe: &RenderedProbe, timeout: Duration) -> ProbeOutcome {
        let RenderedProbe::Http {
            url,
            method,
            expect_status,
            body_contains,
            basic_auth,
            body,
            insecure,
        } = probe
        else {
            return ProbeOutcome::NotReady("not an http probe".to_owned());
        };

        let client = if *insecure {
            &self.insecure_client
        } else {
            &self.client
        };
        let mut request = match method {
            HttpMethod::Get => client.get(url),
            HttpMethod::Post => client.post(url),
        }
        .timeout(timeout);
        if let Some((user, password)) = basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::NotReady(format!("request failed: {e}")),
        };
        let status = response.status().as_u16();
        let text = if body_contains.is_empty() {
            String::new()
        } else {
            match response.text().await {
                Ok(text) => text,
                Err(e) => return ProbeOutcome::NotReady(format!("failed to read body: {e}")),
            }
        };
        evaluate_http(status, &text, expect_status, body_contains)
    }
}

impl<D: DockerClient> Prober for LiveProber<D> {
    async fn probe(&self, container: &str, probe: &RenderedProbe, timeout: Duration) -> ProbeOutcome {
        debug!(container, probe = %probe.describe(), "probing");
        match probe {
            RenderedProbe::Http { .. } => self.probe_http(probe, timeout).await,
            RenderedProbe::Tcp { host, port } => {
                match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port))).await
                {
                    Ok(Ok(_)) => ProbeOutcome::Ready,
                    Ok(Err(e)) => ProbeOutcome::NotReady(format!("connect failed: {e}")),
                    Err(_) => ProbeOutcome::NotReady("connect timed out".to_owned()),
                }
            }
            RenderedProbe::Exec { command } => {
                match tokio::time::timeout(timeout, self.docker.exec(container, command)).await {
                    Ok(Ok(out)) if out.exit_code == 0 => ProbeOutcome::Ready,
                    Ok(Ok(out)) => {
                        ProbeOutcome::NotReady(format!("command exited with {}", out.exit_code))
                    }
                    Ok(Err(e)) => ProbeOutcome::NotReady(e.to_string()),
                    Err(_) => ProbeOutcome::NotReady("exec timed out".to_owned()),
                }
            }
        }
    }
}

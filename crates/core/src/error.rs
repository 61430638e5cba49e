//! 에러 타입 — 도메인별 에러 정의

/// BTPI 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BtpiError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// `.env` 시크릿 파일 에러
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    /// 설정 템플릿 렌더링 에러
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// 인증서 생성 에러
    #[error("tls error: {0}")]
    Tls(#[from] TlsError),

    /// 배포 에러
    #[error("deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// `.env` 파일 에러
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// 파싱할 수 없는 줄
    #[error("invalid line {line} in env file: {reason}")]
    InvalidLine { line: usize, reason: String },

    /// 유효하지 않은 키 이름
    #[error("invalid env key '{0}'")]
    InvalidKey(String),

    /// 필요한 시크릿이 없음
    #[error("missing secret '{0}' (run `btpi init`)")]
    Missing(String),
}

/// 템플릿 렌더링 에러
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// 컨텍스트에 없는 변수 참조
    #[error("missing template variables: {}", .names.join(", "))]
    MissingVariables { names: Vec<String> },
}

/// 인증서 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// 키/인증서 생성 실패
    #[error("certificate generation failed for '{name}': {reason}")]
    Generation { name: String, reason: String },

    /// 유효하지 않은 leaf 정의
    #[error("invalid leaf certificate spec: {0}")]
    InvalidSpec(String),
}

/// 배포 단계 에러 (deployer 크레이트에서 변환됨)
#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    /// Docker API 에러
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 데몬에 연결할 수 없음
    #[error("docker unavailable: {0}")]
    DockerUnavailable(String),

    /// 배포 계획 에러
    #[error("plan error: {0}")]
    Plan(String),

    /// 서비스가 준비 상태에 도달하지 못함
    #[error("service '{service}' not ready: {reason}")]
    NotReady { service: String, reason: String },
}

//! 서비스 카탈로그
//!
//! 배포 가능한 모든 서비스의 정적 정의입니다. 이미지, 포트, 환경변수/bind
//! 템플릿, named volume, 의존성, 필요한 시크릿, 렌더링할 설정 파일,
//! 준비 상태 프로브, 검증 체크, 접속 정보를 한곳에 모읍니다.
//!
//! 템플릿 값은 [`template_context`]가 만든 컨텍스트(`.env` 시크릿 +
//! `HOST_ADDRESS`, `DATA_DIR`, `CERTS_DIR`, `NETWORK`, `PROJECT`)와
//! 서비스별 `CONFIG_DIR`로 렌더링됩니다.

use btpi_core::config::BtpiConfig;
use btpi_core::secrets::{EnvFile, SecretSpec};
use btpi_core::error::TemplateError;
use btpi_core::template::TemplateContext;
use btpi_core::tls::LeafSpec;
use btpi_core::types::ServiceId;

use crate::docker::{ContainerSpec, MANAGED_LABEL, PortMapping, SERVICE_LABEL};
use crate::error::DeployerError;
use crate::probe::{HttpMethod, HttpProbe, Probe, RenderedProbe};

/// 루트 CA의 CN
pub const CA_COMMON_NAME: &str = "BTPI-REACT Root CA";

/// 번들에 포함되는 leaf 인증서
pub const TLS_LEAVES: [&str; 4] = ["wazuh-indexer", "wazuh-manager", "wazuh-dashboard", "admin"];

/// 동적으로 생성되는 설정 파일
pub type Generator = fn(&TemplateContext) -> Result<String, DeployerError>;

/// 설정 파일 내용의 출처
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource {
    Template(&'static str),
    Generated(Generator),
}

/// `<data_dir>/config/<service>/` 아래에 렌더링되는 파일
#[derive(Debug, Clone, Copy)]
pub struct ConfigFile {
    /// 서비스 설정 디렉터리 기준 상대 경로
    pub path: &'static str,
    pub source: ConfigSource,
    /// 비밀 값이 그대로 들어가는 파일 (0600)
    pub secret: bool,
}

impl ConfigFile {
    pub fn render(&self, ctx: &TemplateContext) -> Result<String, DeployerError> {
        match self.source {
            ConfigSource::Template(template) => Ok(ctx.render(template)?),
            ConfigSource::Generated(generate) => generate(ctx),
        }
    }
}

/// 준비 상태 외의 검증 체크
#[derive(Debug, Clone, Copy)]
pub struct Check {
    pub name: &'static str,
    pub probe: Probe,
}

/// 사용자에게 안내하는 접속 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPoint {
    pub label: &'static str,
    pub url: &'static str,
    pub username: Option<&'static str>,
    /// 비밀번호가 저장된 `.env` 키
    pub password_key: Option<&'static str>,
}

/// 서비스 정의
#[derive(Debug)]
pub struct ServiceDefinition {
    pub id: ServiceId,
    pub description: &'static str,
    pub image: &'static str,
    pub ports: &'static [PortMapping],
    pub env: &'static [(&'static str, &'static str)],
    /// `host:container[:mode]` 템플릿
    pub binds: &'static [&'static str],
    /// (volume 이름 접미사, 마운트 경로). 실제 이름은 `<project>_<suffix>`
    pub volumes: &'static [(&'static str, &'static str)],
    pub command: &'static [&'static str],
    pub privileged: bool,
    pub depends_on: &'static [ServiceId],
    pub secrets: &'static [SecretSpec],
    /// TLS 번들을 마운트하는지 여부
    pub uses_certificates: bool,
    pub files: &'static [ConfigFile],
    pub readiness: Probe,
    pub checks: &'static [Check],
    pub access: &'static [AccessPoint],
}

impl ServiceDefinition {
    /// 설정 오버라이드를 반영한 이미지
    pub fn image<'a>(&'a self, config: &'a BtpiConfig) -> &'a str {
        config.image_override(self.id).unwrap_or(self.image)
    }

    pub fn volume_names(&self, project: &str) -> Vec<String> {
        self.volumes
            .iter()
            .map(|(suffix, _)| format!("{project}_{suffix}"))
            .collect()
    }

    /// Docker에 넘길 컨테이너 사양을 만듭니다.
    ///
    /// # Errors
    ///
    /// 템플릿이 참조하는 시크릿이 `.env`에 없으면 `DeployerError::Template`.
    pub fn container_spec(
        &self,
        config: &BtpiConfig,
        ctx: &TemplateContext,
    ) -> Result<ContainerSpec, DeployerError> {
        let ctx = service_context(config, ctx, self.id);
        let project = &config.general.project;

        let env = self
            .env
            .iter()
            .map(|(key, value)| ctx.render(value).map(|v| ((*key).to_owned(), v)))
            .collect::<Result<Vec<_>, _>>()?;
        let binds = self
            .binds
            .iter()
            .map(|bind| ctx.render(bind))
            .collect::<Result<Vec<_>, _>>()?;
        let command = self
            .command
            .iter()
            .map(|arg| ctx.render(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let volumes = self
            .volume_names(project)
            .into_iter()
            .zip(self.volumes.iter().map(|(_, path)| (*path).to_owned()))
            .collect();

        Ok(ContainerSpec {
            name: container_name(project, self.id),
            image: self.image(config).to_owned(),
            env,
            ports: self.ports.to_vec(),
            binds,
            volumes,
            command,
            privileged: self.privileged,
            network: config.network.name.clone(),
            labels: vec![
                (MANAGED_LABEL.to_owned(), "true".to_owned()),
                (SERVICE_LABEL.to_owned(), self.id.to_string()),
            ],
        })
    }

    pub fn readiness_probe(
        &self,
        config: &BtpiConfig,
        ctx: &TemplateContext,
    ) -> Result<RenderedProbe, DeployerError> {
        Ok(self.readiness.render(&service_context(config, ctx, self.id))?)
    }
}

/// `<project>-<service>` 형식의 컨테이너 이름
pub fn container_name(project: &str, id: ServiceId) -> String {
    format!("{project}-{id}")
}

/// 서비스 정의를 조회합니다.
pub fn definition(id: ServiceId) -> &'static ServiceDefinition {
    match id {
        ServiceId::Portainer => &PORTAINER,
        ServiceId::Elasticsearch => &ELASTICSEARCH,
        ServiceId::Cassandra => &CASSANDRA,
        ServiceId::WazuhIndexer => &WAZUH_INDEXER,
        ServiceId::WazuhManager => &WAZUH_MANAGER,
        ServiceId::WazuhDashboard => &WAZUH_DASHBOARD,
        ServiceId::Velociraptor => &VELOCIRAPTOR,
        ServiceId::Kasm => &KASM,
        ServiceId::Misp => &MISP,
        ServiceId::TheHive => &THEHIVE,
        ServiceId::Cortex => &CORTEX,
    }
}

/// 카탈로그 순서대로 모든 정의
pub fn all() -> impl Iterator<Item = &'static ServiceDefinition> {
    ServiceId::ALL.into_iter().map(definition)
}

/// 배포 전역 템플릿 컨텍스트
///
/// `.env` 값 위에 내장 변수를 덮어씁니다. 같은 이름의 `.env` 키는 무시됩니다.
pub fn template_context(config: &BtpiConfig, env: &EnvFile) -> TemplateContext {
    let mut ctx = TemplateContext::new();
    ctx.extend_from_env(env);
    ctx.insert("HOST_ADDRESS", config.network.host_address.clone())
        .insert("DATA_DIR", config.data_dir().display().to_string())
        .insert("CERTS_DIR", config.certs_dir().display().to_string())
        .insert("NETWORK", config.network.name.clone())
        .insert("PROJECT", config.general.project.clone())
        .insert(
            "ADMIN_DN",
            LeafSpec::new("admin", Vec::<String>::new()).distinguished_name(),
        )
        .insert(
            "INDEXER_DN",
            LeafSpec::new("wazuh-indexer", Vec::<String>::new()).distinguished_name(),
        );
    ctx
}

/// 서비스 하나에 대한 컨텍스트 (`CONFIG_DIR` 추가)
pub fn service_context(config: &BtpiConfig, ctx: &TemplateContext, id: ServiceId) -> TemplateContext {
    let mut local = ctx.clone();
    local.insert(
        "CONFIG_DIR",
        config.service_config_dir(id).display().to_string(),
    );
    local
}

/// TLS 번들 leaf 정의
///
/// SAN에는 컨테이너 이름, 짧은 서비스 이름, localhost, 설정된 호스트 주소가 들어갑니다.
pub fn leaf_specs(config: &BtpiConfig) -> Vec<LeafSpec> {
    let project = &config.general.project;
    let host = &config.network.host_address;
    TLS_LEAVES
        .iter()
        .map(|name| {
            let mut sans = vec![
                format!("{project}-{name}"),
                (*name).to_owned(),
                "localhost".to_owned(),
                "127.0.0.1".to_owned(),
            ];
            if !sans.contains(host) {
                sans.push(host.clone());
            }
            LeafSpec::new(*name, sans)
        })
        .collect()
}

// --- 서비스 정의 ---

static PORTAINER: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Portainer,
    description: "Container management UI",
    image: "portainer/portainer-ce:2.21.4",
    ports: &[PortMapping::tcp(9443, 9443)],
    env: &[],
    binds: &[
        "/var/run/docker.sock:/var/run/docker.sock",
        "${CONFIG_DIR}/admin-password:/run/secrets/portainer:ro",
    ],
    volumes: &[("portainer_data", "/data")],
    command: &["--admin-password-file", "/run/secrets/portainer"],
    privileged: false,
    depends_on: &[],
    secrets: &[SecretSpec::password("PORTAINER_ADMIN_PASSWORD")],
    uses_certificates: false,
    files: &[ConfigFile {
        path: "admin-password",
        source: ConfigSource::Template("${PORTAINER_ADMIN_PASSWORD}"),
        secret: true,
    }],
    readiness: Probe::Http(HttpProbe {
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:9443/api/system/status")
    }),
    checks: &[Check {
        name: "admin login",
        probe: Probe::Http(HttpProbe {
            method: HttpMethod::Post,
            body_contains: &["jwt"],
            body: Some(r#"{"username":"admin","password":"${PORTAINER_ADMIN_PASSWORD}"}"#),
            insecure: true,
            ..HttpProbe::get("https://${HOST_ADDRESS}:9443/api/auth")
        }),
    }],
    access: &[AccessPoint {
        label: "Portainer",
        url: "https://${HOST_ADDRESS}:9443",
        username: Some("admin"),
        password_key: Some("PORTAINER_ADMIN_PASSWORD"),
    }],
};

static ELASTICSEARCH: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Elasticsearch,
    description: "Search backend for TheHive and Cortex",
    image: "docker.elastic.co/elasticsearch/elasticsearch:7.17.25",
    ports: &[PortMapping::tcp(9200, 9200)],
    env: &[
        ("discovery.type", "single-node"),
        ("xpack.security.enabled", "false"),
        ("cluster.name", "${PROJECT}-es"),
        ("ES_JAVA_OPTS", "-Xms1g -Xmx1g"),
    ],
    binds: &[],
    volumes: &[("elasticsearch_data", "/usr/share/elasticsearch/data")],
    command: &[],
    privileged: false,
    depends_on: &[],
    secrets: &[],
    uses_certificates: false,
    files: &[],
    readiness: Probe::Http(HttpProbe {
        body_contains: &["\"status\""],
        ..HttpProbe::get("http://${HOST_ADDRESS}:9200/_cluster/health")
    }),
    checks: &[Check {
        name: "cluster status green or yellow",
        probe: Probe::Http(HttpProbe {
            body_contains: &["\"status\":\"green\"", "\"status\":\"yellow\""],
            ..HttpProbe::get("http://${HOST_ADDRESS}:9200/_cluster/health")
        }),
    }],
    access: &[AccessPoint {
        label: "Elasticsearch API",
        url: "http://${HOST_ADDRESS}:9200",
        username: None,
        password_key: None,
    }],
};

static CASSANDRA: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Cassandra,
    description: "Database backend for TheHive",
    image: "cassandra:4.1",
    ports: &[],
    env: &[
        ("CASSANDRA_CLUSTER_NAME", "btpi"),
        ("MAX_HEAP_SIZE", "1G"),
        ("HEAP_NEWSIZE", "256M"),
    ],
    binds: &[],
    volumes: &[("cassandra_data", "/var/lib/cassandra")],
    command: &[],
    privileged: false,
    depends_on: &[],
    secrets: &[],
    uses_certificates: false,
    files: &[],
    readiness: Probe::Exec {
        command: &["cqlsh", "-e", "describe keyspaces"],
    },
    checks: &[],
    access: &[],
};

static WAZUH_INDEXER: ServiceDefinition = ServiceDefinition {
    id: ServiceId::WazuhIndexer,
    description: "Wazuh indexer (OpenSearch)",
    image: "wazuh/wazuh-indexer:4.9.2",
    // 9200은 Elasticsearch가 사용
    ports: &[PortMapping::tcp(9201, 9200)],
    env: &[("OPENSEARCH_JAVA_OPTS", "-Xms1g -Xmx1g")],
    binds: &[
        "${CERTS_DIR}/root-ca.pem:/usr/share/wazuh-indexer/certs/root-ca.pem:ro",
        "${CERTS_DIR}/wazuh-indexer.pem:/usr/share/wazuh-indexer/certs/wazuh-indexer.pem:ro",
        "${CERTS_DIR}/wazuh-indexer-key.pem:/usr/share/wazuh-indexer/certs/wazuh-indexer-key.pem:ro",
        "${CERTS_DIR}/admin.pem:/usr/share/wazuh-indexer/certs/admin.pem:ro",
        "${CERTS_DIR}/admin-key.pem:/usr/share/wazuh-indexer/certs/admin-key.pem:ro",
        "${CONFIG_DIR}/opensearch.yml:/usr/share/wazuh-indexer/opensearch.yml:ro",
        "${CONFIG_DIR}/internal_users.yml:/usr/share/wazuh-indexer/opensearch-security/internal_users.yml:ro",
    ],
    volumes: &[("wazuh_indexer_data", "/var/lib/wazuh-indexer")],
    command: &[],
    privileged: false,
    depends_on: &[],
    secrets: &[
        SecretSpec::password("WAZUH_INDEXER_PASSWORD"),
        SecretSpec::password("WAZUH_DASHBOARD_PASSWORD"),
    ],
    uses_certificates: true,
    files: &[
        ConfigFile {
            path: "opensearch.yml",
            source: ConfigSource::Template(include_str!("templates/wazuh-indexer/opensearch.yml")),
            secret: false,
        },
        ConfigFile {
            path: "internal_users.yml",
            source: ConfigSource::Generated(indexer_internal_users),
            secret: true,
        },
    ],
    readiness: Probe::Http(HttpProbe {
        expect_status: &[200, 401],
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:9201/")
    }),
    checks: &[Check {
        name: "cluster health",
        probe: Probe::Http(HttpProbe {
            body_contains: &["\"status\":\"green\"", "\"status\":\"yellow\""],
            basic_auth: Some(("admin", "${WAZUH_INDEXER_PASSWORD}")),
            insecure: true,
            ..HttpProbe::get("https://${HOST_ADDRESS}:9201/_cluster/health")
        }),
    }],
    access: &[AccessPoint {
        label: "Wazuh indexer API",
        url: "https://${HOST_ADDRESS}:9201",
        username: Some("admin"),
        password_key: Some("WAZUH_INDEXER_PASSWORD"),
    }],
};

static WAZUH_MANAGER: ServiceDefinition = ServiceDefinition {
    id: ServiceId::WazuhManager,
    description: "Wazuh manager and API",
    image: "wazuh/wazuh-manager:4.9.2",
    ports: &[
        PortMapping::tcp(1514, 1514),
        PortMapping::tcp(1515, 1515),
        PortMapping::udp(514, 514),
        PortMapping::tcp(55000, 55000),
    ],
    env: &[
        ("INDEXER_URL", "https://${PROJECT}-wazuh-indexer:9200"),
        ("INDEXER_USERNAME", "admin"),
        ("INDEXER_PASSWORD", "${WAZUH_INDEXER_PASSWORD}"),
        ("FILEBEAT_SSL_VERIFICATION_MODE", "full"),
        ("SSL_CERTIFICATE_AUTHORITIES", "/etc/ssl/root-ca.pem"),
        ("SSL_CERTIFICATE", "/etc/ssl/filebeat.pem"),
        ("SSL_KEY", "/etc/ssl/filebeat.key"),
        ("API_USERNAME", "wazuh-wui"),
        ("API_PASSWORD", "${WAZUH_API_PASSWORD}"),
    ],
    binds: &[
        "${CERTS_DIR}/root-ca.pem:/etc/ssl/root-ca.pem:ro",
        "${CERTS_DIR}/wazuh-manager.pem:/etc/ssl/filebeat.pem:ro",
        "${CERTS_DIR}/wazuh-manager-key.pem:/etc/ssl/filebeat.key:ro",
    ],
    volumes: &[
        ("wazuh_api_configuration", "/var/ossec/api/configuration"),
        ("wazuh_etc", "/var/ossec/etc"),
        ("wazuh_logs", "/var/ossec/logs"),
        ("wazuh_queue", "/var/ossec/queue"),
    ],
    command: &[],
    privileged: false,
    depends_on: &[ServiceId::WazuhIndexer],
    secrets: &[
        SecretSpec::password("WAZUH_INDEXER_PASSWORD"),
        SecretSpec::password("WAZUH_API_PASSWORD"),
    ],
    uses_certificates: true,
    files: &[],
    readiness: Probe::Http(HttpProbe {
        method: HttpMethod::Post,
        body_contains: &["token"],
        basic_auth: Some(("wazuh-wui", "${WAZUH_API_PASSWORD}")),
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:55000/security/user/authenticate")
    }),
    checks: &[Check {
        name: "agent enrollment port",
        probe: Probe::Tcp {
            host: "${HOST_ADDRESS}",
            port: 1515,
        },
    }],
    access: &[AccessPoint {
        label: "Wazuh API",
        url: "https://${HOST_ADDRESS}:55000",
        username: Some("wazuh-wui"),
        password_key: Some("WAZUH_API_PASSWORD"),
    }],
};

static WAZUH_DASHBOARD: ServiceDefinition = ServiceDefinition {
    id: ServiceId::WazuhDashboard,
    description: "Wazuh dashboard",
    image: "wazuh/wazuh-dashboard:4.9.2",
    ports: &[PortMapping::tcp(5601, 5601)],
    env: &[
        ("INDEXER_USERNAME", "admin"),
        ("INDEXER_PASSWORD", "${WAZUH_INDEXER_PASSWORD}"),
        ("WAZUH_API_URL", "https://${PROJECT}-wazuh-manager"),
        ("DASHBOARD_USERNAME", "kibanaserver"),
        ("DASHBOARD_PASSWORD", "${WAZUH_DASHBOARD_PASSWORD}"),
        ("API_USERNAME", "wazuh-wui"),
        ("API_PASSWORD", "${WAZUH_API_PASSWORD}"),
    ],
    binds: &[
        "${CERTS_DIR}/root-ca.pem:/usr/share/wazuh-dashboard/certs/root-ca.pem:ro",
        "${CERTS_DIR}/wazuh-dashboard.pem:/usr/share/wazuh-dashboard/certs/wazuh-dashboard.pem:ro",
        "${CERTS_DIR}/wazuh-dashboard-key.pem:/usr/share/wazuh-dashboard/certs/wazuh-dashboard-key.pem:ro",
        "${CONFIG_DIR}/opensearch_dashboards.yml:/usr/share/wazuh-dashboard/config/opensearch_dashboards.yml:ro",
        "${CONFIG_DIR}/wazuh.yml:/usr/share/wazuh-dashboard/data/wazuh/config/wazuh.yml",
    ],
    volumes: &[],
    command: &[],
    privileged: false,
    depends_on: &[ServiceId::WazuhIndexer, ServiceId::WazuhManager],
    secrets: &[
        SecretSpec::password("WAZUH_INDEXER_PASSWORD"),
        SecretSpec::password("WAZUH_API_PASSWORD"),
        SecretSpec::password("WAZUH_DASHBOARD_PASSWORD"),
    ],
    uses_certificates: true,
    files: &[
        ConfigFile {
            path: "opensearch_dashboards.yml",
            source: ConfigSource::Template(include_str!(
                "templates/wazuh-dashboard/opensearch_dashboards.yml"
            )),
            secret: false,
        },
        ConfigFile {
            path: "wazuh.yml",
            source: ConfigSource::Template(include_str!("templates/wazuh-dashboard/wazuh.yml")),
            secret: true,
        },
    ],
    readiness: Probe::Http(HttpProbe {
        expect_status: &[200, 302, 401],
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:5601/api/status")
    }),
    checks: &[],
    access: &[AccessPoint {
        label: "Wazuh dashboard",
        url: "https://${HOST_ADDRESS}:5601",
        username: Some("admin"),
        password_key: Some("WAZUH_INDEXER_PASSWORD"),
    }],
};

static VELOCIRAPTOR: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Velociraptor,
    description: "Velociraptor DFIR server",
    image: "wlambert/velociraptor:latest",
    ports: &[
        PortMapping::tcp(8000, 8000),
        PortMapping::tcp(8001, 8001),
        PortMapping::tcp(8889, 8889),
    ],
    env: &[
        ("VELOX_USER", "admin"),
        ("VELOX_PASSWORD", "${VELOCIRAPTOR_ADMIN_PASSWORD}"),
        ("VELOX_ROLE", "administrator"),
        ("VELOX_SERVER_URL", "https://${HOST_ADDRESS}:8000/"),
        ("VELOX_FRONTEND_HOSTNAME", "${HOST_ADDRESS}"),
    ],
    binds: &[],
    volumes: &[("velociraptor_data", "/velociraptor")],
    command: &[],
    privileged: false,
    depends_on: &[],
    secrets: &[SecretSpec::password("VELOCIRAPTOR_ADMIN_PASSWORD")],
    uses_certificates: false,
    files: &[],
    readiness: Probe::Http(HttpProbe {
        expect_status: &[200, 401],
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:8889/api/v1/GetVersion")
    }),
    checks: &[Check {
        name: "admin login",
        probe: Probe::Http(HttpProbe {
            body_contains: &["version"],
            basic_auth: Some(("admin", "${VELOCIRAPTOR_ADMIN_PASSWORD}")),
            insecure: true,
            ..HttpProbe::get("https://${HOST_ADDRESS}:8889/api/v1/GetVersion")
        }),
    }],
    access: &[AccessPoint {
        label: "Velociraptor GUI",
        url: "https://${HOST_ADDRESS}:8889",
        username: Some("admin"),
        password_key: Some("VELOCIRAPTOR_ADMIN_PASSWORD"),
    }],
};

static KASM: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Kasm,
    description: "Kasm Workspaces",
    image: "lscr.io/linuxserver/kasm:1.16.1",
    ports: &[PortMapping::tcp(3000, 3000), PortMapping::tcp(6443, 443)],
    env: &[("KASM_PORT", "443"), ("DOCKER_MTU", "1500")],
    binds: &[],
    volumes: &[("kasm_data", "/opt"), ("kasm_profiles", "/profiles")],
    command: &[],
    privileged: true,
    depends_on: &[],
    secrets: &[],
    uses_certificates: false,
    files: &[],
    readiness: Probe::Http(HttpProbe {
        expect_status: &[200, 302],
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:3000/")
    }),
    checks: &[],
    access: &[
        AccessPoint {
            label: "Kasm setup wizard",
            url: "https://${HOST_ADDRESS}:3000",
            username: None,
            password_key: None,
        },
        AccessPoint {
            label: "Kasm Workspaces",
            url: "https://${HOST_ADDRESS}:6443",
            username: None,
            password_key: None,
        },
    ],
};

static MISP: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Misp,
    description: "MISP threat intelligence platform",
    image: "harvarditsecurity/misp:latest",
    ports: &[PortMapping::tcp(8443, 443)],
    env: &[
        ("MYSQL_MISP_PASSWORD", "${MISP_MYSQL_PASSWORD}"),
        ("MISP_ADMIN_PASSPHRASE", "${MISP_ADMIN_PASSPHRASE}"),
        ("MISP_BASEURL", "https://${HOST_ADDRESS}:8443"),
        ("POSTFIX_RELAY_HOST", "localhost"),
        ("TIMEZONE", "Etc/UTC"),
    ],
    binds: &[],
    volumes: &[("misp_db", "/var/lib/mysql")],
    command: &[],
    privileged: false,
    depends_on: &[],
    secrets: &[
        SecretSpec::password("MISP_ADMIN_PASSPHRASE"),
        SecretSpec::token("MISP_MYSQL_PASSWORD", 32),
    ],
    uses_certificates: false,
    files: &[],
    readiness: Probe::Http(HttpProbe {
        body_contains: &["MISP"],
        insecure: true,
        ..HttpProbe::get("https://${HOST_ADDRESS}:8443/users/login")
    }),
    checks: &[],
    // MISP_ADMIN_PASSPHRASE는 GPG 키 passphrase. 웹 로그인은 이미지 기본값
    access: &[AccessPoint {
        label: "MISP (initial password: admin)",
        url: "https://${HOST_ADDRESS}:8443",
        username: Some("admin@admin.test"),
        password_key: None,
    }],
};

static THEHIVE: ServiceDefinition = ServiceDefinition {
    id: ServiceId::TheHive,
    description: "TheHive case management (legacy)",
    image: "strangebee/thehive:5.2",
    ports: &[PortMapping::tcp(9000, 9000)],
    env: &[],
    binds: &["${CONFIG_DIR}/application.conf:/etc/thehive/application.conf:ro"],
    volumes: &[("thehive_files", "/opt/thp/thehive/files")],
    command: &["--no-config", "--config-file", "/etc/thehive/application.conf"],
    privileged: false,
    depends_on: &[ServiceId::Cassandra, ServiceId::Elasticsearch],
    secrets: &[SecretSpec::hex("THEHIVE_SECRET", 32)],
    uses_certificates: false,
    files: &[ConfigFile {
        path: "application.conf",
        source: ConfigSource::Template(include_str!("templates/thehive/application.conf")),
        secret: true,
    }],
    readiness: Probe::Http(HttpProbe::get("http://${HOST_ADDRESS}:9000/api/v1/status/public")),
    checks: &[],
    access: &[AccessPoint {
        label: "TheHive",
        url: "http://${HOST_ADDRESS}:9000",
        username: Some("admin@thehive.local"),
        password_key: None,
    }],
};

static CORTEX: ServiceDefinition = ServiceDefinition {
    id: ServiceId::Cortex,
    description: "Cortex analysis engine (legacy)",
    image: "thehiveproject/cortex:3.1.8",
    ports: &[PortMapping::tcp(9001, 9001)],
    env: &[],
    binds: &[
        "${CONFIG_DIR}/application.conf:/etc/cortex/application.conf:ro",
        "${CONFIG_DIR}/analyzers.json:/etc/cortex/analyzers.json:ro",
        "/var/run/docker.sock:/var/run/docker.sock",
        "${DATA_DIR}/cortex-jobs:/tmp/cortex-jobs",
    ],
    volumes: &[],
    command: &["--no-config", "--config-file", "/etc/cortex/application.conf"],
    privileged: false,
    depends_on: &[ServiceId::Elasticsearch],
    secrets: &[SecretSpec::hex("CORTEX_SECRET", 32)],
    uses_certificates: false,
    files: &[
        ConfigFile {
            path: "application.conf",
            source: ConfigSource::Template(include_str!("templates/cortex/application.conf")),
            secret: true,
        },
        ConfigFile {
            path: "analyzers.json",
            source: ConfigSource::Generated(cortex_analyzers),
            secret: false,
        },
    ],
    readiness: Probe::Http(HttpProbe {
        body_contains: &["versions"],
        ..HttpProbe::get("http://${HOST_ADDRESS}:9001/api/status")
    }),
    checks: &[],
    access: &[AccessPoint {
        label: "Cortex",
        url: "http://${HOST_ADDRESS}:9001",
        username: None,
        password_key: None,
    }],
};

/// Cortex 분석기 카탈로그 (`analyzer.urls`가 가리키는 JSON)
fn cortex_analyzers(ctx: &TemplateContext) -> Result<String, DeployerError> {
    let misp_url = ctx.render("https://${HOST_ADDRESS}:8443")?;
    let analyzers = serde_json::json!([
        {
            "name": "FileInfo",
            "version": "8.0",
            "author": "TheHive-Project",
            "url": "https://github.com/TheHive-Project/Cortex-Analyzers",
            "license": "AGPL-V3",
            "description": "Parse files in several formats such as OLE and OpenXML",
            "dataTypeList": ["file"],
            "dockerImage": "cortexneurons/fileinfo:8",
            "baseConfig": "FileInfo",
            "configurationItems": []
        },
        {
            "name": "Abuse_Finder",
            "version": "3.0",
            "author": "CERT-BDF",
            "url": "https://github.com/TheHive-Project/Cortex-Analyzers",
            "license": "AGPL-V3",
            "description": "Find abuse contacts associated with domain names, URLs, IPs and email addresses",
            "dataTypeList": ["ip", "domain", "fqdn", "url", "mail"],
            "dockerImage": "cortexneurons/abuse_finder:3",
            "baseConfig": "Abuse_Finder",
            "configurationItems": []
        },
        {
            "name": "MISP",
            "version": "2.1",
            "author": "Nils Kuhnert, CERT-Bund",
            "url": "https://github.com/TheHive-Project/Cortex-Analyzers",
            "license": "AGPL-V3",
            "description": "Query the local MISP instance for events containing the observable",
            "dataTypeList": ["domain", "ip", "url", "fqdn", "uri_path", "user-agent", "hash", "email", "mail", "mail_subject", "registry", "regexp", "other", "filename"],
            "dockerImage": "cortexneurons/misp:2",
            "baseConfig": "MISP",
            "config": {
                "url": [misp_url],
                "cert_check": false
            },
            "configurationItems": [
                { "name": "url", "description": "URL of MISP servers", "type": "string", "multi": true, "required": true },
                { "name": "key", "description": "API key for each server", "type": "string", "multi": true, "required": true },
                { "name": "cert_check", "description": "Verify server certificate", "type": "boolean", "multi": false, "required": true, "defaultValue": true }
            ]
        }
    ]);
    serde_json::to_string_pretty(&analyzers).map_err(|e| DeployerError::Generate {
        path: "cortex/analyzers.json".to_owned(),
        reason: e.to_string(),
    })
}

/// 인덱서 내부 사용자 (해시 placeholder, `.env` 키)
const INDEXER_USERS: [(&str, &str); 2] = [
    ("ADMIN_HASH", "WAZUH_INDEXER_PASSWORD"),
    ("KIBANASERVER_HASH", "WAZUH_DASHBOARD_PASSWORD"),
];

/// OpenSearch security 플러그인이 받는 bcrypt cost
const INDEXER_HASH_COST: u32 = 10;

/// 인덱서 `internal_users.yml`
///
/// 이미지 기본값(`admin:SecretPassword`, `kibanaserver:kibanaserver`) 대신
/// `.env` 비밀번호의 bcrypt 해시를 넣습니다. 솔트가 매번 달라서 렌더링할
/// 때마다 내용이 바뀝니다.
fn indexer_internal_users(ctx: &TemplateContext) -> Result<String, DeployerError> {
    let missing: Vec<String> = INDEXER_USERS
        .iter()
        .filter(|(_, key)| ctx.get(key).is_none())
        .map(|(_, key)| (*key).to_owned())
        .collect();
    if !missing.is_empty() {
        return Err(TemplateError::MissingVariables { names: missing }.into());
    }

    let mut local = ctx.clone();
    for (placeholder, key) in INDEXER_USERS {
        let password = ctx.get(key).unwrap_or_default();
        local.insert(placeholder, hash_password(password)?);
    }
    Ok(local.render(include_str!("templates/wazuh-indexer/internal_users.yml"))?)
}

fn hash_password(password: &str) -> Result<String, DeployerError> {
    bcrypt::hash_with_result(password, INDEXER_HASH_COST)
        .map(|parts| parts.format_for_version(bcrypt::Version::TwoY))
        .map_err(|e| DeployerError::Generate {
            path: "wazuh-indexer/internal_users.yml".to_owned(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use btpi_core::template::placeholders;

    use super::*;

    /// 시크릿 키 + 내장 변수만 있는 컨텍스트
    fn full_context(config: &BtpiConfig) -> TemplateContext {
        let mut env = EnvFile::new();
        for def in all() {
            for spec in def.secrets {
                env.set(spec.key, "secret-value").unwrap();
            }
        }
        template_context(config, &env)
    }

    #[test]
    fn definitions_match_their_ids() {
        for id in ServiceId::ALL {
            assert_eq!(definition(id).id, id);
        }
    }

    #[test]
    fn dependencies_point_to_earlier_catalog_entries() {
        // 카탈로그 순서 자체가 유효한 배포 순서여야 함
        for def in all() {
            for dep in def.depends_on {
                assert!(
                    dep < &def.id,
                    "{} depends on later service {}",
                    def.id,
                    dep
                );
            }
        }
    }

    #[test]
    fn no_host_port_is_shared_across_catalog() {
        let mut seen = BTreeMap::new();
        for def in all() {
            for port in def.ports {
                if let Some(other) = seen.insert((port.host, port.protocol), def.id) {
                    panic!("{} and {} both bind {}", other, def.id, port.host);
                }
            }
        }
    }

    #[test]
    fn every_secret_placeholder_is_declared_by_its_service() {
        let builtins: BTreeSet<&str> = [
            "HOST_ADDRESS",
            "DATA_DIR",
            "CERTS_DIR",
            "CONFIG_DIR",
            "NETWORK",
            "PROJECT",
            "ADMIN_DN",
            "INDEXER_DN",
        ]
        .into_iter()
        .collect();

        for def in all() {
            let declared: BTreeSet<&str> = def.secrets.iter().map(|s| s.key).collect();
            let mut templates: Vec<&str> = def.env.iter().map(|(_, v)| *v).collect();
            templates.extend(def.binds.iter().copied());
            templates.extend(def.command.iter().copied());
            templates.extend(def.access.iter().map(|a| a.url));
            templates.extend(def.files.iter().filter_map(|f| match f.source {
                ConfigSource::Template(t) => Some(t),
                ConfigSource::Generated(_) => None,
            }));
            for name in templates.iter().flat_map(|t| placeholders(t)) {
                assert!(
                    builtins.contains(name.as_str()) || declared.contains(name.as_str()),
                    "{} references undeclared variable {name}",
                    def.id
                );
            }
            for key in def.access.iter().filter_map(|a| a.password_key) {
                assert!(declared.contains(key), "{} access uses undeclared {key}", def.id);
            }
        }
    }

    #[test]
    fn container_spec_renders_names_labels_and_volumes() {
        let config = BtpiConfig::default();
        let ctx = full_context(&config);
        let spec = definition(ServiceId::WazuhManager)
            .container_spec(&config, &ctx)
            .unwrap();

        assert_eq!(spec.name, "btpi-wazuh-manager");
        assert_eq!(spec.network, "btpi-network");
        assert!(spec.labels.contains(&("io.btpi.managed".to_owned(), "true".to_owned())));
        assert!(
            spec.labels
                .contains(&("io.btpi.service".to_owned(), "wazuh-manager".to_owned()))
        );
        assert!(
            spec.env
                .contains(&("API_PASSWORD".to_owned(), "secret-value".to_owned()))
        );
        assert!(
            spec.env.contains(&(
                "INDEXER_URL".to_owned(),
                "https://btpi-wazuh-indexer:9200".to_owned()
            ))
        );
        assert!(
            spec.binds
                .contains(&"/opt/btpi-react/certs/root-ca.pem:/etc/ssl/root-ca.pem:ro".to_owned())
        );
        assert!(
            spec.volumes
                .contains(&("btpi_wazuh_etc".to_owned(), "/var/ossec/etc".to_owned()))
        );
    }

    #[test]
    fn container_spec_uses_service_config_dir() {
        let config = BtpiConfig::default();
        let spec = definition(ServiceId::TheHive)
            .container_spec(&config, &full_context(&config))
            .unwrap();
        assert_eq!(
            spec.binds,
            vec!["/opt/btpi-react/config/thehive/application.conf:/etc/thehive/application.conf:ro"]
        );
    }

    #[test]
    fn container_spec_honors_image_override() {
        let config = BtpiConfig::parse(
            r#"
[services.kasm]
image = "registry.local/kasm:pinned"
"#,
        )
        .unwrap();
        let spec = definition(ServiceId::Kasm)
            .container_spec(&config, &full_context(&config))
            .unwrap();
        assert_eq!(spec.image, "registry.local/kasm:pinned");
        assert!(spec.privileged);
    }

    #[test]
    fn container_spec_fails_without_secrets() {
        let config = BtpiConfig::default();
        let ctx = template_context(&config, &EnvFile::new());
        let err = definition(ServiceId::Velociraptor)
            .container_spec(&config, &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("VELOCIRAPTOR_ADMIN_PASSWORD"));
    }

    #[test]
    fn every_config_file_renders() {
        let config = BtpiConfig::default();
        let ctx = full_context(&config);
        for def in all() {
            let local = service_context(&config, &ctx, def.id);
            for file in def.files {
                let content = file.render(&local).unwrap();
                assert!(!content.is_empty(), "{}/{} is empty", def.id, file.path);
                assert!(!content.contains("${"), "{}/{} left a placeholder", def.id, file.path);
            }
        }
    }

    #[test]
    fn indexer_config_carries_distinguished_names() {
        let config = BtpiConfig::default();
        let ctx = full_context(&config);
        let content = definition(ServiceId::WazuhIndexer).files[0]
            .render(&ctx)
            .unwrap();
        assert!(content.contains("CN=admin,OU=BTPI,O=BTPI-REACT"));
        assert!(content.contains("CN=wazuh-indexer,OU=BTPI,O=BTPI-REACT"));
    }

    /// `hash: "..."` 줄의 값을 순서대로
    fn hashes(content: &str) -> Vec<String> {
        content
            .lines()
            .filter_map(|line| line.trim().strip_prefix("hash: "))
            .map(|value| value.trim_matches('"').to_owned())
            .collect()
    }

    #[test]
    fn indexer_users_carry_hashes_of_env_passwords() {
        let config = BtpiConfig::default();
        let mut env = EnvFile::new();
        env.set("WAZUH_INDEXER_PASSWORD", "Admin.Pass-42").unwrap();
        env.set("WAZUH_DASHBOARD_PASSWORD", "Kibana+Pass7").unwrap();
        let content = indexer_internal_users(&template_context(&config, &env)).unwrap();

        assert!(content.contains("\nadmin:\n"));
        assert!(content.contains("\nkibanaserver:\n"));
        let hashes = hashes(&content);
        assert_eq!(hashes.len(), 2);
        assert!(hashes[0].starts_with("$2y$10$"));
        assert!(bcrypt::verify("Admin.Pass-42", &hashes[0]).unwrap());
        assert!(bcrypt::verify("Kibana+Pass7", &hashes[1]).unwrap());
        assert!(!bcrypt::verify("SecretPassword", &hashes[0]).unwrap());
    }

    #[test]
    fn indexer_users_require_both_passwords() {
        let config = BtpiConfig::default();
        let mut env = EnvFile::new();
        env.set("WAZUH_INDEXER_PASSWORD", "Admin.Pass-42").unwrap();
        let err = indexer_internal_users(&template_context(&config, &env)).unwrap_err();
        assert!(err.to_string().contains("WAZUH_DASHBOARD_PASSWORD"));
    }

    #[test]
    fn indexer_mounts_internal_users() {
        let config = BtpiConfig::default();
        let spec = definition(ServiceId::WazuhIndexer)
            .container_spec(&config, &full_context(&config))
            .unwrap();
        assert!(spec.binds.contains(
            &"/opt/btpi-react/config/wazuh-indexer/internal_users.yml:/usr/share/wazuh-indexer/opensearch-security/internal_users.yml:ro"
                .to_owned()
        ));
    }

    #[test]
    fn misp_access_does_not_offer_the_gpg_passphrase() {
        let access = definition(ServiceId::Misp).access;
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].password_key, None);
        assert!(access[0].label.contains("initial password"));
    }

    #[test]
    fn cortex_analyzers_is_valid_json_pointing_at_misp() {
        let config = BtpiConfig::default();
        let json = cortex_analyzers(&full_context(&config)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let analyzers = value.as_array().unwrap();
        assert_eq!(analyzers.len(), 3);
        assert_eq!(analyzers[2]["config"]["url"][0], "https://localhost:8443");
    }

    #[test]
    fn leaf_specs_include_container_name_and_host() {
        let mut config = BtpiConfig::default();
        config.network.host_address = "10.0.0.7".to_owned();
        let leaves = leaf_specs(&config);
        assert_eq!(leaves.len(), TLS_LEAVES.len());
        let indexer = &leaves[0];
        assert_eq!(indexer.name, "wazuh-indexer");
        assert!(indexer.sans.contains(&"btpi-wazuh-indexer".to_owned()));
        assert!(indexer.sans.contains(&"10.0.0.7".to_owned()));
    }

    #[test]
    fn readiness_probe_uses_host_address() {
        let mut config = BtpiConfig::default();
        config.network.host_address = "192.168.1.20".to_owned();
        let probe = definition(ServiceId::Velociraptor)
            .readiness_probe(&config, &full_context(&config))
            .unwrap();
        assert_eq!(
            probe.describe(),
            "GET https://192.168.1.20:8889/api/v1/GetVersion"
        );
    }
}

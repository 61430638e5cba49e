//! 배포 계획
//!
//! 모드와 요청 목록, 설정의 `enabled` 오버라이드로 대상 서비스를 고르고,
//! 의존성을 자동으로 추가한 뒤 안정적인 위상 정렬 순서를 만듭니다.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use btpi_core::config::BtpiConfig;
use btpi_core::types::{DeployMode, ServiceId};

use crate::catalog::{self, ServiceDefinition};
use crate::error::DeployerError;

/// 확정된 배포 계획
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub mode: DeployMode,
    /// 배포 순서 (의존성이 먼저)
    pub services: Vec<ServiceId>,
    /// 의존성 때문에 자동으로 추가된 서비스
    pub auto_added: Vec<ServiceId>,
}

impl DeploymentPlan {
    /// 계획을 확정합니다.
    ///
    /// - full/minimal: 모드 기본 목록에서 `enabled = false`인 서비스를 빼고,
    ///   `enabled = true`인 서비스와 `requested`를 더합니다.
    /// - custom: `requested`만 사용합니다 (비어 있으면 에러).
    ///
    /// # Errors
    ///
    /// 알 수 없는 이름, 의존성 순환, 호스트 포트 충돌, 빈 선택.
    pub fn resolve(
        config: &BtpiConfig,
        mode: DeployMode,
        requested: &[String],
    ) -> Result<Self, DeployerError> {
        let requested = parse_services(requested)?;

        let mut selected = BTreeSet::new();
        match mode {
            DeployMode::Custom => {
                if requested.is_empty() {
                    return Err(DeployerError::Plan(
                        "custom mode requires at least one service".to_owned(),
                    ));
                }
                selected.extend(requested.iter().copied());
            }
            DeployMode::Full | DeployMode::Minimal => {
                for id in mode.default_services() {
                    if config.service_enabled(id) == Some(false) {
                        info!(service = %id, "skipping service disabled in config");
                    } else {
                        selected.insert(id);
                    }
                }
                selected.extend(
                    ServiceId::ALL
                        .into_iter()
                        .filter(|id| config.service_enabled(*id) == Some(true)),
                );
                selected.extend(requested.iter().copied());
            }
        }

        let explicit = selected.clone();
        let mut stack: Vec<ServiceId> = selected.iter().copied().collect();
        while let Some(id) = stack.pop() {
            for dep in catalog::definition(id).depends_on {
                if selected.insert(*dep) {
                    stack.push(*dep);
                }
            }
        }
        let auto_added: Vec<ServiceId> = selected.difference(&explicit).copied().collect();
        for id in &auto_added {
            info!(service = %id, "adding required dependency");
        }

        if selected.is_empty() {
            return Err(DeployerError::Plan("no services selected".to_owned()));
        }

        let services = dependency_order(&selected, |id| catalog::definition(id).depends_on)?;
        check_port_conflicts(services.iter().map(|id| catalog::definition(*id)))?;

        Ok(Self {
            mode,
            services,
            auto_added,
        })
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.services.contains(&id)
    }
}

/// 서비스 이름 목록을 파싱합니다. 중복은 한 번만 남깁니다.
pub fn parse_services(names: &[String]) -> Result<Vec<ServiceId>, DeployerError> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id: ServiceId = name
            .parse()
            .map_err(|_| DeployerError::UnknownService(name.clone()))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// 안정적인 위상 정렬
///
/// 매 단계에서 의존성이 모두 배치된 서비스 중 카탈로그 순서가 가장 앞선 것을
/// 고릅니다. `selected` 밖의 의존성은 무시합니다.
pub fn dependency_order<'a, F>(
    selected: &BTreeSet<ServiceId>,
    deps: F,
) -> Result<Vec<ServiceId>, DeployerError>
where
    F: Fn(ServiceId) -> &'a [ServiceId],
{
    let mut placed: Vec<ServiceId> = Vec::with_capacity(selected.len());
    let mut remaining: BTreeSet<ServiceId> = selected.clone();

    while !remaining.is_empty() {
        let next = remaining.iter().copied().find(|id| {
            deps(*id)
                .iter()
                .all(|dep| !selected.contains(dep) || placed.contains(dep))
        });
        match next {
            Some(id) => {
                remaining.remove(&id);
                placed.push(id);
            }
            None => {
                return Err(DeployerError::DependencyCycle {
                    services: remaining.into_iter().collect(),
                });
            }
        }
    }
    Ok(placed)
}

/// 선택된 서비스끼리 같은 호스트 포트를 쓰는지 확인합니다.
pub fn check_port_conflicts<'a>(
    definitions: impl IntoIterator<Item = &'a ServiceDefinition>,
) -> Result<(), DeployerError> {
    let mut owners = BTreeMap::new();
    for def in definitions {
        for port in def.ports {
            if let Some(first) = owners.insert((port.host, port.protocol), def.id) {
                if first != def.id {
                    return Err(DeployerError::PortConflict {
                        port: port.host,
                        protocol: port.protocol.as_str().to_owned(),
                        first,
                        second: def.id,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::docker::PortMapping;
    use crate::probe::{HttpProbe, Probe};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn fake(id: ServiceId, ports: &'static [PortMapping]) -> ServiceDefinition {
        ServiceDefinition {
            id,
            description: "test",
            image: "busybox",
            ports,
            env: &[],
            binds: &[],
            volumes: &[],
            command: &[],
            privileged: false,
            depends_on: &[],
            secrets: &[],
            uses_certificates: false,
            files: &[],
            readiness: Probe::Http(HttpProbe::get("http://localhost/")),
            checks: &[],
            access: &[],
        }
    }

    #[test]
    fn full_mode_orders_wazuh_stack() {
        let plan =
            DeploymentPlan::resolve(&BtpiConfig::default(), DeployMode::Full, &[]).unwrap();
        assert_eq!(plan.services.len(), 9);
        let pos = |id| plan.services.iter().position(|s| *s == id).unwrap();
        assert!(pos(ServiceId::WazuhIndexer) < pos(ServiceId::WazuhManager));
        assert!(pos(ServiceId::WazuhManager) < pos(ServiceId::WazuhDashboard));
        assert!(!plan.contains(ServiceId::TheHive));
        assert!(plan.auto_added.is_empty());
    }

    #[test]
    fn minimal_mode_is_catalog_ordered() {
        let plan =
            DeploymentPlan::resolve(&BtpiConfig::default(), DeployMode::Minimal, &[]).unwrap();
        assert_eq!(
            plan.services,
            vec![
                ServiceId::Portainer,
                ServiceId::WazuhIndexer,
                ServiceId::WazuhManager,
                ServiceId::WazuhDashboard,
                ServiceId::Velociraptor,
            ]
        );
    }

    #[test]
    fn custom_mode_adds_dependencies() {
        let plan = DeploymentPlan::resolve(
            &BtpiConfig::default(),
            DeployMode::Custom,
            &names(&["thehive"]),
        )
        .unwrap();
        assert_eq!(
            plan.services,
            vec![
                ServiceId::Elasticsearch,
                ServiceId::Cassandra,
                ServiceId::TheHive
            ]
        );
        assert_eq!(
            plan.auto_added,
            vec![ServiceId::Elasticsearch, ServiceId::Cassandra]
        );
    }

    #[test]
    fn custom_mode_without_services_is_an_error() {
        let err =
            DeploymentPlan::resolve(&BtpiConfig::default(), DeployMode::Custom, &[]).unwrap_err();
        assert!(matches!(err, DeployerError::Plan(_)));
    }

    #[test]
    fn unknown_service_is_rejected() {
        let err = DeploymentPlan::resolve(
            &BtpiConfig::default(),
            DeployMode::Custom,
            &names(&["kasm", "splunk"]),
        )
        .unwrap_err();
        match err {
            DeployerError::UnknownService(name) => assert_eq!(name, "splunk"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disabled_services_are_dropped_and_enabled_legacy_added() {
        let config = BtpiConfig::parse(
            r#"
[services.kasm]
enabled = false

[services.cortex]
enabled = true
"#,
        )
        .unwrap();
        let plan = DeploymentPlan::resolve(&config, DeployMode::Full, &[]).unwrap();
        assert!(!plan.contains(ServiceId::Kasm));
        assert!(plan.contains(ServiceId::Cortex));
        assert!(plan.contains(ServiceId::Elasticsearch));
    }

    #[test]
    fn dependency_wins_over_disabled_flag() {
        let config = BtpiConfig::parse(
            r#"
[services.wazuh-indexer]
enabled = false
"#,
        )
        .unwrap();
        let plan = DeploymentPlan::resolve(&config, DeployMode::Minimal, &[]).unwrap();
        assert!(plan.contains(ServiceId::WazuhIndexer));
        assert_eq!(plan.auto_added, vec![ServiceId::WazuhIndexer]);
    }

    #[test]
    fn explicit_request_wins_over_disabled_flag() {
        let config = BtpiConfig::parse(
            r#"
[services.misp]
enabled = false
"#,
        )
        .unwrap();
        let plan =
            DeploymentPlan::resolve(&config, DeployMode::Full, &names(&["misp"])).unwrap();
        assert!(plan.contains(ServiceId::Misp));
    }

    #[test]
    fn duplicate_names_collapse() {
        let ids = parse_services(&names(&["kasm", "KASM", "wazuh_manager"])).unwrap();
        assert_eq!(ids, vec![ServiceId::Kasm, ServiceId::WazuhManager]);
    }

    #[test]
    fn cycle_is_detected() {
        let graph: HashMap<ServiceId, Vec<ServiceId>> = HashMap::from([
            (ServiceId::TheHive, vec![ServiceId::Cortex]),
            (ServiceId::Cortex, vec![ServiceId::TheHive]),
            (ServiceId::Portainer, vec![]),
        ]);
        let selected: BTreeSet<ServiceId> = graph.keys().copied().collect();
        let err = dependency_order(&selected, |id| graph[&id].as_slice()).unwrap_err();
        match err {
            DeployerError::DependencyCycle { services } => {
                assert_eq!(services, vec![ServiceId::TheHive, ServiceId::Cortex]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn order_is_stable_for_independent_services() {
        let selected: BTreeSet<ServiceId> =
            [ServiceId::Misp, ServiceId::Kasm, ServiceId::Portainer].into();
        let order = dependency_order(&selected, |_| &[]).unwrap();
        assert_eq!(
            order,
            vec![ServiceId::Portainer, ServiceId::Kasm, ServiceId::Misp]
        );
    }

    #[test]
    fn port_conflict_is_reported() {
        const ES_PORTS: &[PortMapping] = &[PortMapping::tcp(9200, 9200)];
        let a = fake(ServiceId::Elasticsearch, ES_PORTS);
        let b = fake(ServiceId::WazuhIndexer, ES_PORTS);
        let err = check_port_conflicts([&a, &b]).unwrap_err();
        assert!(matches!(
            err,
            DeployerError::PortConflict {
                port: 9200,
                first: ServiceId::Elasticsearch,
                second: ServiceId::WazuhIndexer,
                ..
            }
        ));
    }

    #[test]
    fn same_port_different_protocol_is_fine() {
        const SYSLOG_UDP: &[PortMapping] = &[PortMapping::udp(514, 514)];
        const SYSLOG_TCP: &[PortMapping] = &[PortMapping::tcp(514, 514)];
        let a = fake(ServiceId::WazuhManager, SYSLOG_UDP);
        let b = fake(ServiceId::Kasm, SYSLOG_TCP);
        assert!(check_port_conflicts([&a, &b]).is_ok());
    }
}

//! 준비 상태 폴링
//!
//! 첫 프로브는 즉시 실행하고, 실패할 때마다 `interval`만큼 쉰 뒤 다시 시도합니다.
//! 시도 횟수는 `max_attempts`를 넘지 않으며, 마지막 시도 뒤에는 대기하지 않습니다.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use btpi_core::config::DeployConfig;
use btpi_core::types::ServiceId;

use crate::error::DeployerError;
use crate::probe::{ProbeOutcome, Prober, RenderedProbe};

/// 폴링 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// 프로브 1회 타임아웃
    pub attempt_timeout: Duration,
}

impl WaitPolicy {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            max_attempts: config.wait_max_attempts.max(1),
            interval: Duration::from_secs(config.wait_interval_secs),
            attempt_timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_config(&DeployConfig::default())
    }
}

/// 준비 완료 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadyInfo {
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// 프로브가 통과할 때까지 폴링합니다.
///
/// # Errors
///
/// `max_attempts`번 모두 실패하면 마지막 실패 사유를 담은
/// `DeployerError::NotReady`를 반환합니다.
pub async fn wait_for_service<P: Prober>(
    prober: &P,
    service: ServiceId,
    container: &str,
    probe: &RenderedProbe,
    policy: &WaitPolicy,
) -> Result<ReadyInfo, DeployerError> {
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        let outcome = match tokio::time::timeout(
            policy.attempt_timeout,
            prober.probe(container, probe, policy.attempt_timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::NotReady(format!(
                "probe timed out after {}s",
                policy.attempt_timeout.as_secs()
            )),
        };

        match outcome {
            ProbeOutcome::Ready => {
                let elapsed = started.elapsed();
                info!(
                    service = %service,
                    attempts = attempt,
                    elapsed_ms = millis(elapsed),
                    "service ready"
                );
                return Ok(ReadyInfo {
                    attempts: attempt,
                    elapsed,
                });
            }
            ProbeOutcome::NotReady(reason) => {
                debug!(
                    service = %service,
                    attempt,
                    max_attempts,
                    reason = %reason,
                    "service not ready yet"
                );
                last_reason = reason;
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(
        service = %service,
        attempts = max_attempts,
        probe = %probe.describe(),
        reason = %last_reason,
        "service did not become ready"
    );
    Err(DeployerError::NotReady {
        service,
        attempts: max_attempts,
        reason: last_reason,
    })
}

/// 보고용 밀리초 (`u64`를 넘으면 포화)
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProber;
    use super::*;

    fn probe() -> RenderedProbe {
        RenderedProbe::Tcp {
            host: "localhost".to_owned(),
            port: 9200,
        }
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    fn policy(max_attempts: u32) -> WaitPolicy {
        WaitPolicy {
            max_attempts,
            interval: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_attempt_does_not_sleep() {
        let prober = ScriptedProber::always_ready();
        let info = wait_for_service(
            &prober,
            ServiceId::Elasticsearch,
            "btpi-elasticsearch",
            &probe(),
            &policy(5),
        )
        .await
        .unwrap();
        assert_eq!(info.attempts, 1);
        assert_eq!(info.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_retries_counts_attempts() {
        let prober = ScriptedProber::new(
            vec![
                ProbeOutcome::NotReady("refused".to_owned()),
                ProbeOutcome::NotReady("refused".to_owned()),
            ],
            ProbeOutcome::Ready,
        );
        let info = wait_for_service(
            &prober,
            ServiceId::WazuhManager,
            "btpi-wazuh-manager",
            &probe(),
            &policy(5),
        )
        .await
        .unwrap();
        assert_eq!(info.attempts, 3);
        assert_eq!(info.elapsed, Duration::from_secs(20));
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_last_reason() {
        let prober = ScriptedProber::new(
            vec![ProbeOutcome::NotReady("first".to_owned())],
            ProbeOutcome::NotReady("last".to_owned()),
        );
        let err = wait_for_service(
            &prober,
            ServiceId::Misp,
            "btpi-misp",
            &probe(),
            &policy(3),
        )
        .await
        .unwrap_err();
        match err {
            DeployerError::NotReady {
                service,
                attempts,
                reason,
            } => {
                assert_eq!(service, ServiceId::Misp);
                assert_eq!(attempts, 3);
                assert_eq!(reason, "last");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_sleep_after_final_attempt() {
        let prober = ScriptedProber::never_ready("down");
        let started = Instant::now();
        let result = wait_for_service(
            &prober,
            ServiceId::Kasm,
            "btpi-kasm",
            &probe(),
            &policy(3),
        )
        .await;
        assert!(result.is_err());
        // 3회 시도 사이 대기 2번
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn policy_from_config_clamps_zero_attempts() {
        let config = DeployConfig {
            wait_max_attempts: 0,
            ..DeployConfig::default()
        };
        assert_eq!(WaitPolicy::from_config(&config).max_attempts, 1);
    }
}

//! 파이프라인 trait -- 수집 파이프라인 생명주기 정의

use std::fmt;
use std::future::Future;

use crate::error::AgentError;

/// 파이프라인 건강 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작은 하지만 일부 기능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
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

/// 시작/정지/상태 확인이 가능한 파이프라인
///
/// 에이전트 바이너리는 이 trait만으로 파이프라인을 관리합니다.
pub trait Pipeline: Send {
    /// 모든 워커를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), AgentError>> + Send;

    /// 새 작업 수락을 멈추고, 진행 중인 작업이 끝날 때까지 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), AgentError>> + Send;

    /// 현재 건강 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

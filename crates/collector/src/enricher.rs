//! IP -> 서비스 이름 보강 단계
//!
//! 크롤러와 배처 사이의 통과 워커입니다. 리졸버가 있으면 컨테이너 이벤트의 IP에 대해
//! 서비스 이름 매핑을 붙이고, 없으면 컨테이너를 그대로 넘깁니다.

use std::collections::BTreeMap;

use tailguard_core::event::EventsContainer;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// IP 주소를 서비스 이름 목록으로 해석
pub trait IpServiceResolver: Send + Sync {
    /// 알려진 서비스 이름 목록. 모르면 `None`.
    fn resolve(&self, ip: &str) -> Option<Vec<String>>;
}

/// 설정 파일의 정적 매핑으로 해석하는 리졸버
#[derive(Debug, Clone, Default)]
pub struct StaticServiceMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl StaticServiceMap {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IpServiceResolver for StaticServiceMap {
    fn resolve(&self, ip: &str) -> Option<Vec<String>> {
        self.entries.get(ip).filter(|names| !names.is_empty()).cloned()
    }
}

/// 보강 단계
pub struct Enricher {
    resolver: Option<Box<dyn IpServiceResolver>>,
}

impl Enricher {
    /// 리졸버 없이 그대로 통과시키는 단계
    pub fn passthrough() -> Self {
        Self { resolver: None }
    }

    /// 리졸버를 사용하는 단계
    pub fn with_resolver(resolver: impl IpServiceResolver + 'static) -> Self {
        Self {
            resolver: Some(Box::new(resolver)),
        }
    }

    /// 컨테이너 하나를 보강합니다.
    pub fn enrich(&self, container: &mut EventsContainer) {
        let Some(resolver) = &self.resolver else {
            return;
        };
        for event in &container.events {
            if event.ip.is_empty() || container.ip_services.contains_key(&event.ip) {
                continue;
            }
            if let Some(names) = resolver.resolve(&event.ip) {
                container.ip_services.insert(event.ip.clone(), names);
            }
        }
    }

    /// 입력 채널이 닫힐 때까지 컨테이너를 보강해 다음 단계로 넘깁니다.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<EventsContainer>,
        tx: mpsc::Sender<EventsContainer>,
    ) {
        while let Some(mut container) = rx.recv().await {
            self.enrich(&mut container);
            if tx.send(container).await.is_err() {
                debug!("batcher channel closed, enricher exiting");
                break;
            }
        }
        info!("enricher stopped");
    }
}

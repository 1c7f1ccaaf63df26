//! 파이프라인 오케스트레이션 -- 크롤링/보강/배치/전송/위치 동기화 워커 연결
//!
//! [`CollectorPipeline`]은 core의 [`Pipeline`](tailguard_core::pipeline::Pipeline) trait을
//! 구현하여 `tailguard-agent`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileCrawler -> mpsc -> Enricher -> mpsc -> Batcher -> mpsc -> HttpGateway -> mpsc -> PositionTracker
//!                                                                   |
//!                                                                   +-> spool (.net_*)
//! ```
//!
//! 각 워커는 자신의 가변 상태를 단독으로 소유하고 단방향 채널로만 통신합니다.
//! 정지 시 크롤러만 취소하면 채널 닫힘이 연쇄되어 배처의 마지막 플러시,
//! 게이트웨이 전송, 위치 기록까지 순서대로 마무리됩니다.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tailguard_core::error::{AgentError, PipelineError};
use tailguard_core::pipeline::{HealthStatus, Pipeline};

use crate::batcher::{BatchPolicy, Batcher};
use crate::config::CollectorConfig;
use crate::crawler::FileCrawler;
use crate::enricher::{Enricher, StaticServiceMap};
use crate::error::CollectorError;
use crate::gateway::{HttpGateway, ReqwestTransport};
use crate::rule::RuleEngine;
use crate::state::PositionTracker;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    Initialized,
    Running,
    Stopped,
}

/// 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use tailguard_collector::{CollectorPipelineBuilder, RuleEngine};
///
/// let rules = RuleEngine::load_from_dir(&config.rules_dir, &options).await?;
/// let mut pipeline = CollectorPipelineBuilder::new()
///     .config(config)
///     .rules(rules)
///     .build()?;
///
/// pipeline.start().await?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct CollectorPipeline {
    config: CollectorConfig,
    rules: RuleEngine,
    state: PipelineState,
    cancel: CancellationToken,
    /// 워커 이름과 태스크 핸들 (데이터 흐름 순서)
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl CollectorPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// 로드된 룰 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn enricher(&self) -> Enricher {
        if self.config.ip_services.is_empty() {
            Enricher::passthrough()
        } else {
            Enricher::with_resolver(StaticServiceMap::new(self.config.ip_services.clone()))
        }
    }

    async fn spawn_workers(&mut self) -> Result<(), CollectorError> {
        let config = &self.config;
        let capacity = config.channel_capacity;

        let tracker = PositionTracker::load(config.state_file()).await;
        info!(
            sources = tracker.len(),
            path = %config.state_file().display(),
            "source positions loaded"
        );

        let transport = ReqwestTransport::new(
            &config.collector_url,
            config.request_timeout(),
            Some(config.proxy.as_str()),
        )?;
        let gateway = HttpGateway::from_config(config, transport);

        let (crawl_tx, crawl_rx) = mpsc::channel(capacity);
        let (enriched_tx, enriched_rx) = mpsc::channel(capacity);
        let (batch_tx, batch_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = mpsc::channel(capacity);

        let crawler = FileCrawler::new(
            self.rules.file_rules(),
            tracker.clone(),
            crawl_tx,
            config.crawl_interval(),
        );
        let cancel = self.cancel.clone();
        let crawler_task = tokio::spawn(async move {
            if let Err(e) = crawler.run(cancel).await {
                warn!(error = %e, "file crawler terminated");
            }
        });

        let enricher_task = tokio::spawn(self.enricher().run(crawl_rx, enriched_tx));

        let batcher = Batcher::new(BatchPolicy::from_config(config), tokio::time::Instant::now());
        let batcher_task =
            tokio::spawn(batcher.run(enriched_rx, batch_tx, config.first_flush_delay()));

        let gateway_task = tokio::spawn(gateway.run(batch_rx, state_tx));
        let sync_task = tokio::spawn(tracker.run_sync(state_rx));

        self.tasks = vec![
            ("crawler", crawler_task),
            ("enricher", enricher_task),
            ("batcher", batcher_task),
            ("gateway", gateway_task),
            ("state-sync", sync_task),
        ];
        Ok(())
    }
}

impl Pipeline for CollectorPipeline {
    async fn start(&mut self) -> Result<(), AgentError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            rules = self.rules.len(),
            file_rules = self.rules.file_rules().len(),
            collector = %self.config.collector_url,
            "starting collector pipeline"
        );

        self.cancel = CancellationToken::new();
        self.spawn_workers().await?;

        self.state = PipelineState::Running;
        info!("collector pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping collector pipeline");
        self.cancel.cancel();

        for (name, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(worker = name, error = %e, "worker task failed");
            }
        }

        self.state = PipelineState::Stopped;
        info!("collector pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let exited: Vec<&str> = self
                    .tasks
                    .iter()
                    .filter(|(_, task)| task.is_finished())
                    .map(|(name, _)| *name)
                    .collect();
                if exited.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy(format!("worker exited: {}", exited.join(", ")))
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 수집 파이프라인 빌더
#[derive(Default)]
pub struct CollectorPipelineBuilder {
    config: CollectorConfig,
    rules: RuleEngine,
}

impl CollectorPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 수집기 설정을 지정합니다.
    pub fn config(mut self, config: CollectorConfig) -> Self {
        self.config = config;
        self
    }

    /// 로드된 룰 엔진을 지정합니다.
    pub fn rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// 설정이 유효하지 않거나 룰이 하나도 없으면 실패합니다.
    pub fn build(self) -> Result<CollectorPipeline, CollectorError> {
        self.config.validate()?;

        if self.rules.is_empty() {
            return Err(CollectorError::Config {
                field: "rules".to_owned(),
                reason: "no rules loaded".to_owned(),
            });
        }

        Ok(CollectorPipeline {
            config: self.config,
            rules: self.rules,
            state: PipelineState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

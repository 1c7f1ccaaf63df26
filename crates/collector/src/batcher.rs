//! 배처 -- 크기/시간/긴급도 기반 적응형 플러시
//!
//! 크롤러가 보낸 [`EventsContainer`]를 모았다가 한 번에 게이트웨이로 넘깁니다.
//! 실제 입력뿐 아니라 주기 타이머(유휴 타임아웃)와 시작 후 1회 타이머가
//! 같은 평가 경로로 "깨우기" 입력을 넣습니다.
//!
//! # 플러시 조건 (우선순위 순)
//! 1. 마지막 플러시 후 유휴 타임아웃 초과
//! 2. 누적 컨테이너 수 >= 최대 항목 수
//! 3. critical 이벤트 보유 + 마지막 플러시 후 critical 타임아웃 초과
//! 4. 시작 후 첫 플러시
//! 5. 누적 이벤트 수 >= 최대 이벤트 수

use std::time::Duration;

use tailguard_core::event::EventsContainer;
use tailguard_core::metrics as m;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;

/// 플러시 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Idle,
    Items,
    Critical,
    First,
    Events,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Items => "items",
            Self::Critical => "critical",
            Self::First => "first",
            Self::Events => "events",
            Self::Shutdown => "shutdown",
        }
    }
}

/// 플러시 임계값
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub idle_timeout: Duration,
    pub max_items: usize,
    pub critical_timeout: Duration,
    pub max_events: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_items: 10,
            critical_timeout: Duration::from_secs(20),
            max_events: 1000,
        }
    }
}

impl BatchPolicy {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_items: config.max_batch_items,
            critical_timeout: config.critical_timeout(),
            max_events: config.max_batch_events,
        }
    }
}

/// 컨테이너 누적기
#[derive(Debug)]
pub struct Batcher {
    policy: BatchPolicy,
    items: Vec<EventsContainer>,
    critical: bool,
    last_flush: Instant,
    first_flush_done: bool,
}

impl Batcher {
    pub fn new(policy: BatchPolicy, now: Instant) -> Self {
        Self {
            policy,
            items: Vec::new(),
            critical: false,
            last_flush: now,
            first_flush_done: false,
        }
    }

    /// 대기 중인 컨테이너 수
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 대기 중인 보안 이벤트 수
    pub fn pending_events(&self) -> usize {
        self.items.iter().map(EventsContainer::len).sum()
    }

    /// 입력을 추가하고 플러시 조건을 평가합니다.
    ///
    /// `None`은 타이머가 넣은 깨우기 입력입니다.
    /// 조건이 성립하면 누적된 컨테이너 전체를 반환합니다 (비어 있을 수 있음).
    pub fn push(
        &mut self,
        input: Option<EventsContainer>,
        now: Instant,
    ) -> Option<(FlushTrigger, Vec<EventsContainer>)> {
        if let Some(container) = input {
            if !self.critical && container.has_critical() {
                self.critical = true;
            }
            self.items.push(container);
        }

        let elapsed = now.saturating_duration_since(self.last_flush);
        let trigger = if elapsed > self.policy.idle_timeout {
            FlushTrigger::Idle
        } else if self.items.len() >= self.policy.max_items {
            FlushTrigger::Items
        } else if self.critical && elapsed > self.policy.critical_timeout {
            FlushTrigger::Critical
        } else if !self.first_flush_done {
            FlushTrigger::First
        } else if self.pending_events() >= self.policy.max_events {
            FlushTrigger::Events
        } else {
            metrics::gauge!(m::BATCHER_PENDING_CONTAINERS).set(self.items.len() as f64);
            return None;
        };

        Some((trigger, self.take(now)))
    }

    /// 누적된 컨테이너를 모두 꺼내고 상태를 초기화합니다.
    pub fn take(&mut self, now: Instant) -> Vec<EventsContainer> {
        self.critical = false;
        self.last_flush = now;
        self.first_flush_done = true;
        metrics::gauge!(m::BATCHER_PENDING_CONTAINERS).set(0.0);
        std::mem::take(&mut self.items)
    }

    /// 입력 채널이 닫힐 때까지 누적/플러시하는 워커 루프
    ///
    /// 채널이 닫히면 남은 컨테이너를 마지막으로 플러시하고 종료합니다.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<EventsContainer>,
        tx: mpsc::Sender<Vec<EventsContainer>>,
        first_flush_delay: Duration,
    ) {
        let idle = self.policy.idle_timeout;
        let mut ticker = tokio::time::interval_at(Instant::now() + idle, idle);
        let first_timer = tokio::time::sleep(first_flush_delay);
        tokio::pin!(first_timer);
        let mut first_timer_fired = false;

        info!(
            idle_timeout_secs = idle.as_secs(),
            max_items = self.policy.max_items,
            max_events = self.policy.max_events,
            "batcher started"
        );

        loop {
            let input = tokio::select! {
                received = rx.recv() => match received {
                    Some(container) => Some(container),
                    None => break,
                },
                _ = ticker.tick() => None,
                _ = &mut first_timer, if !first_timer_fired => {
                    first_timer_fired = true;
                    None
                }
            };

            if let Some((trigger, batch)) = self.push(input, Instant::now()) {
                if !Self::forward(&tx, trigger, batch).await {
                    warn!("gateway channel closed, batcher exiting");
                    return;
                }
            }
        }

        if !self.is_empty() {
            let batch = self.take(Instant::now());
            Self::forward(&tx, FlushTrigger::Shutdown, batch).await;
        }
        info!("batcher stopped");
    }

    async fn forward(
        tx: &mpsc::Sender<Vec<EventsContainer>>,
        trigger: FlushTrigger,
        batch: Vec<EventsContainer>,
    ) -> bool {
        let events: usize = batch.iter().map(EventsContainer::len).sum();
        debug!(
            trigger = trigger.as_str(),
            containers = batch.len(),
            events,
            "flushing batch"
        );
        metrics::counter!(m::BATCHER_FLUSHES_TOTAL, m::LABEL_TRIGGER => trigger.as_str())
            .increment(1);
        tx.send(batch).await.is_ok()
    }
}

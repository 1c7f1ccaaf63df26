//! 전송 게이트웨이 -- 배치를 봉투로 만들어 수집 서버로 보내고 실패분을 스풀
//!
//! 배치마다 다음 순서로 처리합니다.
//! 1. 이전에 스풀된 봉투를 오래된 것부터 재전송 (성공하면 파일 삭제)
//! 2. 새 봉투 전송, 실패하고 이벤트가 있으면 스풀 파일로 기록
//! 3. 결과와 관계없이 배치를 위치 추적기로 전달
//!
//! 위치 전진은 전송 확인과 분리되어 있습니다. 전송 중이던 배치의 내구성은
//! 스풀 파일로만 보장됩니다.

pub mod envelope;
pub mod spool;
pub mod transport;

use tailguard_core::event::EventsContainer;
use tailguard_core::metrics as m;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;

pub use envelope::{ERROR_CODE_MALFORMED, Envelope, ServerResponse};
pub use spool::SpoolDir;
pub use transport::{ReqwestTransport, Transport};

/// 전송 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 서버가 수락함
    Delivered,
    /// 서버가 malformed payload로 거절함, 이벤트는 버려짐
    Dropped,
    /// 재시도 대상
    Failed(String),
}

impl DeliveryOutcome {
    /// 스풀에서 지워도 되는 결과인지
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Dropped => "dropped",
            Self::Failed(_) => "failed",
        }
    }
}

/// HTTP 응답을 전송 결과로 분류합니다.
pub fn classify(status: u16, body: &[u8]) -> DeliveryOutcome {
    if status != 200 {
        return DeliveryOutcome::Failed(format!("unexpected status {status}"));
    }
    let response: ServerResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(e) => return DeliveryOutcome::Failed(format!("unparseable response: {e}")),
    };
    if response.success {
        DeliveryOutcome::Delivered
    } else if response.is_malformed_payload() {
        DeliveryOutcome::Dropped
    } else {
        DeliveryOutcome::Failed(format!(
            "server rejected envelope: code={:?} error={}",
            response.errorcode,
            response.error.as_deref().unwrap_or("")
        ))
    }
}

/// 전송 게이트웨이
pub struct HttpGateway<T> {
    transport: T,
    spool: SpoolDir,
    token: String,
    server_key: String,
    first_sent: bool,
}

impl<T: Transport> HttpGateway<T> {
    pub fn new(
        transport: T,
        spool: SpoolDir,
        token: impl Into<String>,
        server_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            spool,
            token: token.into(),
            server_key: server_key.into(),
            first_sent: false,
        }
    }

    /// 상태 디렉토리를 스풀 디렉토리로 사용하는 게이트웨이
    pub fn from_config(config: &CollectorConfig, transport: T) -> Self {
        Self::new(
            transport,
            SpoolDir::new(&config.state_dir),
            &config.access_token,
            &config.server_key,
        )
    }

    pub fn spool(&self) -> &SpoolDir {
        &self.spool
    }

    /// 첫 전송 성공 여부
    pub fn first_sent(&self) -> bool {
        self.first_sent
    }

    async fn post(&self, body: Vec<u8>) -> DeliveryOutcome {
        match self.transport.post(body).await {
            Ok((status, body)) => classify(status, &body),
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }

    /// 스풀된 봉투를 오래된 것부터 재전송합니다.
    ///
    /// 정리된(전달/드롭) 파일 수를 반환합니다. 실패한 파일은 다음 주기에 다시 시도합니다.
    pub async fn resend_spooled(&self) -> usize {
        let files = match self.spool.list().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "failed to list spool directory");
                return 0;
            }
        };

        let mut settled = 0;
        for path in files {
            let body = match self.spool.read(&path).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "failed to read spool file");
                    continue;
                }
            };

            let outcome = self.post(body).await;
            metrics::counter!(m::GATEWAY_ENVELOPES_TOTAL, m::LABEL_RESULT => outcome.label())
                .increment(1);
            match outcome {
                DeliveryOutcome::Failed(reason) => {
                    debug!(path = %path.display(), reason = %reason, "spooled envelope still undeliverable");
                }
                settled_outcome => {
                    if let Err(e) = self.spool.remove(&path).await {
                        warn!(error = %e, "failed to remove resent spool file");
                        continue;
                    }
                    info!(
                        path = %path.display(),
                        result = settled_outcome.label(),
                        "spooled envelope resent"
                    );
                    metrics::counter!(m::GATEWAY_SPOOL_RESENT_TOTAL).increment(1);
                    settled += 1;
                }
            }
        }
        settled
    }

    /// 배치 한 건을 전송합니다. 스풀 재전송이 먼저 수행됩니다.
    pub async fn deliver(&mut self, batch: &[EventsContainer]) -> DeliveryOutcome {
        self.resend_spooled().await;

        let envelope = Envelope::build(&self.token, &self.server_key, batch, !self.first_sent);
        let event_count = envelope.events.len();
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to serialize envelope");
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        let outcome = self.post(body.clone()).await;
        metrics::counter!(m::GATEWAY_ENVELOPES_TOTAL, m::LABEL_RESULT => outcome.label())
            .increment(1);

        match &outcome {
            DeliveryOutcome::Delivered => {
                self.first_sent = true;
                debug!(events = event_count, "envelope delivered");
            }
            DeliveryOutcome::Dropped => {
                self.first_sent = true;
                warn!(events = event_count, "collector rejected payload as malformed, events dropped");
                metrics::counter!(m::GATEWAY_EVENTS_DROPPED_TOTAL).increment(event_count as u64);
            }
            DeliveryOutcome::Failed(reason) => {
                warn!(events = event_count, reason = %reason, "envelope delivery failed");
                if envelope.has_events() {
                    match self.spool.write(&body).await {
                        Ok(path) => {
                            info!(path = %path.display(), events = event_count, "envelope spooled for retry");
                            metrics::counter!(m::GATEWAY_SPOOL_WRITTEN_TOTAL).increment(1);
                        }
                        Err(e) => warn!(error = %e, "failed to spool envelope, events lost"),
                    }
                }
            }
        }

        outcome
    }

    /// 배치 채널이 닫힐 때까지 전송하고 배치를 위치 동기화 채널로 넘기는 워커 루프
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Vec<EventsContainer>>,
        state_tx: mpsc::Sender<Vec<EventsContainer>>,
    ) {
        info!(spool = %self.spool.path().display(), "gateway started");
        while let Some(batch) = rx.recv().await {
            self.deliver(&batch).await;
            if state_tx.send(batch).await.is_err() {
                warn!("state sync channel closed, gateway exiting");
                return;
            }
        }
        info!("gateway stopped");
    }
}

//! 위치 저장소 -- 소스별 읽기 오프셋/라인 영속화
//!
//! [`PositionTracker`]는 소스 식별자(inode+device 등)별로 마지막으로 읽은
//! 바이트 오프셋과 다음 라인 번호를 보관하고, JSON 배열 파일 하나에 통째로 기록합니다.
//!
//! # 단일 작성자
//! 파일은 sync 워커([`PositionTracker::run_sync`])만 씁니다.
//! 크롤러는 시작 시 로드한 스냅샷을 독립적으로 소유하고 메모리에서만 갱신합니다.
//!
//! # 알려진 한계
//! - 파일 쓰기는 전체 덮어쓰기이며 트랜잭션이 아닙니다.
//! - 파싱 실패 시 빈 저장소로 시작합니다 (이전 위치 유실).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tailguard_core::event::EventsContainer;
use tailguard_core::metrics as m;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::STATE_RETENTION;
use crate::error::CollectorError;

/// 소스 하나의 영속 위치
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    /// 안정적인 소스 식별자 (경로가 아님)
    #[serde(rename = "srcid")]
    pub source_id: String,
    /// 표시용 경로
    #[serde(rename = "src")]
    pub source: String,
    /// 바이트 오프셋
    pub offset: u64,
    /// 다음에 읽을 라인 번호 (1부터, 0 = 추적 안 함)
    pub line: u64,
    /// 마지막 갱신 시각 (epoch seconds)
    #[serde(rename = "t")]
    pub updated_at: i64,
}

impl SourceState {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_owned(),
            source: String::new(),
            offset: 0,
            line: 1,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// 소스별 위치 저장소
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    path: Option<PathBuf>,
    sources: BTreeMap<String, SourceState>,
}

impl PositionTracker {
    /// 파일과 연결되지 않은 빈 저장소를 생성합니다.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 파일에서 위치를 로드합니다.
    ///
    /// 파일이 없거나 파싱에 실패하면 경고를 남기고 빈 저장소로 시작합니다.
    /// 30일 넘게 갱신되지 않은 레코드는 제거됩니다.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut tracker = Self {
            path: Some(path.clone()),
            sources: BTreeMap::new(),
        };

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no position store yet, starting empty");
                return tracker;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read position store, starting empty");
                return tracker;
            }
        };

        let records: Vec<SourceState> = match serde_json::from_slice(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse position store, starting empty");
                return tracker;
            }
        };

        let cutoff = chrono::Utc::now().timestamp() - STATE_RETENTION.as_secs() as i64;
        let total = records.len();
        for record in records {
            if record.updated_at < cutoff {
                debug!(source = %record.source, "pruning stale position record");
                continue;
            }
            tracker.sources.insert(record.source_id.clone(), record);
        }

        info!(
            path = %path.display(),
            loaded = tracker.sources.len(),
            pruned = total - tracker.sources.len(),
            "position store loaded"
        );
        metrics::gauge!(m::STATE_SOURCES).set(tracker.sources.len() as f64);
        tracker
    }

    /// 소스 위치를 조회하고, 없으면 오프셋 0으로 생성합니다.
    pub fn find(&mut self, source_id: &str) -> &mut SourceState {
        self.sources
            .entry(source_id.to_owned())
            .or_insert_with(|| SourceState::new(source_id))
    }

    /// 소스 위치를 읽기 전용으로 조회합니다.
    pub fn get(&self, source_id: &str) -> Option<&SourceState> {
        self.sources.get(source_id)
    }

    /// 추적 중인 소스 수
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// 추적 중인 소스가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 컨테이너들의 최종 위치를 병합합니다 (저장하지 않음).
    pub fn merge(&mut self, containers: &[EventsContainer]) {
        let now = chrono::Utc::now().timestamp();
        for container in containers {
            if container.source_id.is_empty() {
                continue;
            }
            let state = self.find(&container.source_id);
            state.offset = container.offset;
            state.line = container.line;
            state.source.clone_from(&container.source);
            state.updated_at = now;
        }
    }

    /// 컨테이너 위치를 병합하고 저장소 전체를 파일에 기록합니다.
    pub async fn sync(&mut self, containers: &[EventsContainer]) -> Result<(), CollectorError> {
        self.merge(containers);
        self.save().await
    }

    /// 저장소 전체를 파일에 덮어씁니다.
    pub async fn save(&self) -> Result<(), CollectorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CollectorError::State(format!("{}: {e}", parent.display())))?;
            }
        }

        let records: Vec<&SourceState> = self.sources.values().collect();
        let content = serde_json::to_vec(&records)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| CollectorError::State(format!("{}: {e}", path.display())))?;

        metrics::counter!(m::STATE_SYNCS_TOTAL).increment(1);
        metrics::gauge!(m::STATE_SOURCES).set(self.sources.len() as f64);
        Ok(())
    }

    /// 게이트웨이가 넘긴 배치를 받아 위치를 기록하는 워커 루프
    ///
    /// 입력 채널이 닫히면 종료합니다. 기록 실패는 로그만 남기고 계속합니다.
    pub async fn run_sync(mut self, mut rx: mpsc::Receiver<Vec<EventsContainer>>) {
        while let Some(batch) = rx.recv().await {
            if let Err(e) = self.sync(&batch).await {
                warn!(error = %e, "failed to persist source positions");
            } else {
                debug!(containers = batch.len(), "source positions persisted");
            }
        }
        info!("position sync worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, offset: u64, line: u64) -> EventsContainer {
        let mut c = EventsContainer::new(id, format!("/var/log/{id}.log"));
        c.offset = offset;
        c.line = line;
        c
    }

    #[test]
    fn find_creates_missing_record_at_zero() {
        let mut tracker = PositionTracker::in_memory();
        let state = tracker.find("42_7");
        assert_eq!(state.offset, 0);
        assert_eq!(state.line, 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn merge_updates_offset_and_line() {
        let mut tracker = PositionTracker::in_memory();
        tracker.merge(&[container("a", 100, 5)]);
        tracker.merge(&[container("a", 250, 9)]);

        let state = tracker.get("a").unwrap();
        assert_eq!(state.offset, 250);
        assert_eq!(state.line, 9);
        assert_eq!(state.source, "/var/log/a.log");
    }

    #[tokio::test]
    async fn sync_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".tailguard-state");

        let mut tracker = PositionTracker::load(&path).await;
        assert!(tracker.is_empty());
        tracker.sync(&[container("a", 10, 2)]).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let first = &raw.as_array().unwrap()[0];
        assert_eq!(first["srcid"], "a");
        assert_eq!(first["src"], "/var/log/a.log");
        assert_eq!(first["offset"], 10);
        assert_eq!(first["line"], 2);
        assert!(first["t"].is_i64());
    }

    #[tokio::test]
    async fn load_round_trips_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tailguard-state");

        let mut tracker = PositionTracker::load(&path).await;
        tracker
            .sync(&[container("a", 10, 2), container("b", 20, 3)])
            .await
            .unwrap();

        let reloaded = PositionTracker::load(&path).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("b").unwrap().offset, 20);
    }

    #[tokio::test]
    async fn load_prunes_records_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tailguard-state");
        let now = chrono::Utc::now().timestamp();
        let old = now - 31 * 24 * 60 * 60;
        let body = format!(
            r#"[{{"srcid":"old","src":"/a","offset":1,"line":2,"t":{old}}},
                {{"srcid":"new","src":"/b","offset":3,"line":4,"t":{now}}}]"#
        );
        std::fs::write(&path, body).unwrap();

        let tracker = PositionTracker::load(&path).await;
        assert!(tracker.get("old").is_none());
        assert_eq!(tracker.get("new").unwrap().offset, 3);
    }

    #[tokio::test]
    async fn load_with_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tailguard-state");
        std::fs::write(&path, b"{not json").unwrap();

        let tracker = PositionTracker::load(&path).await;
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn run_sync_persists_until_channel_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tailguard-state");
        let tracker = PositionTracker::load(&path).await;

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(tracker.run_sync(rx));
        tx.send(vec![container("a", 7, 3)]).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let reloaded = PositionTracker::load(&path).await;
        assert_eq!(reloaded.get("a").unwrap().offset, 7);
    }
}

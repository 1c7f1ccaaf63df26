//! 파일 크롤러 -- 위치 기반 로그 파일 tailing
//!
//! 주기마다 모든 룰의 경로 패턴을 펼쳐 파일별로 담당 룰을 모으고,
//! 저장된 위치부터 새로 추가된 줄을 읽어 룰 엔진에 넘깁니다.
//! 파일 하나의 결과는 [`EventsContainer`] 하나로 다음 단계에 전달됩니다.
//!
//! # 위치 처리
//! - 저장된 오프셋 > 파일 크기: truncation/로테이션으로 보고 (0, 1)부터 다시 읽음
//! - 저장된 오프셋 == 파일 크기: 새 데이터 없음, 건너뜀
//! - 종결자 없는 마지막 줄: 파일이 60초 넘게 수정되지 않았으면 처리, 아니면 다음 사이클로 미룸
//!
//! # 에러 처리
//! 파일 stat/open/read 실패는 로그만 남기고 해당 파일만 이번 사이클에서 건너뜁니다.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tailguard_core::event::EventsContainer;
use tailguard_core::metrics as m;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{MIN_DEAD_TIME, PARTIAL_LINE_IDLE};
use crate::dedup::dedupe_container;
use crate::encoding::{TextEncoding, UTF8_PROBE_LEN};
use crate::error::CollectorError;
use crate::platform::{NativePlatform, SourcePlatform};
use crate::rule::{RuleConfig, match_line};
use crate::state::PositionTracker;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// 파일 크롤러
pub struct FileCrawler {
    rules: Vec<Arc<RuleConfig>>,
    /// 시작 시 로드한 위치 스냅샷 (메모리에서만 갱신)
    positions: PositionTracker,
    platform: Box<dyn SourcePlatform>,
    tx: mpsc::Sender<EventsContainer>,
    interval: Duration,
    first_run: bool,
}

impl FileCrawler {
    /// 현재 플랫폼 구현으로 크롤러를 생성합니다.
    pub fn new(
        rules: Vec<Arc<RuleConfig>>,
        positions: PositionTracker,
        tx: mpsc::Sender<EventsContainer>,
        interval: Duration,
    ) -> Self {
        Self::with_platform(rules, positions, tx, interval, NativePlatform)
    }

    /// 플랫폼 구현을 지정해 크롤러를 생성합니다.
    pub fn with_platform(
        rules: Vec<Arc<RuleConfig>>,
        positions: PositionTracker,
        tx: mpsc::Sender<EventsContainer>,
        interval: Duration,
        platform: impl SourcePlatform + 'static,
    ) -> Self {
        Self {
            rules,
            positions,
            platform: Box::new(platform),
            tx,
            interval,
            first_run: true,
        }
    }

    /// 크롤러의 위치 스냅샷
    pub fn positions(&self) -> &PositionTracker {
        &self.positions
    }

    /// 취소될 때까지 주기적으로 크롤링합니다.
    ///
    /// 진행 중인 사이클은 끝까지 수행한 뒤 종료합니다.
    /// 종료 시 송신 채널이 닫혀 다음 단계들이 차례로 정리됩니다.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), CollectorError> {
        info!(
            rules = self.rules.len(),
            interval_secs = self.interval.as_secs(),
            "file crawler started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(forwarded) => debug!(containers = forwarded, "crawl cycle finished"),
                Err(e) => {
                    warn!(error = %e, "downstream closed, file crawler exiting");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("file crawler stopped");
        Ok(())
    }

    /// 한 사이클을 수행하고 전달한 컨테이너 수를 반환합니다.
    ///
    /// 다음 단계 채널이 닫힌 경우에만 에러를 반환합니다.
    pub async fn run_once(&mut self) -> Result<usize, CollectorError> {
        let files = self.resolve_files();
        metrics::gauge!(m::CRAWLER_TRACKED_FILES).set(files.len() as f64);

        let mut forwarded = 0;
        for (path, rules) in &files {
            let container = match self.scan_file(path, rules).await {
                Ok(Some(container)) => container,
                Ok(None) => continue,
                Err(e) => {
                    metrics::counter!(m::CRAWLER_FILE_ERRORS_TOTAL).increment(1);
                    warn!(path = %path.display(), error = %e, "failed to scan file, skipping");
                    continue;
                }
            };

            metrics::counter!(m::CRAWLER_EVENTS_MATCHED_TOTAL)
                .increment(container.events.len() as u64);
            self.tx
                .send(container)
                .await
                .map_err(|e| CollectorError::Channel(e.to_string()))?;
            forwarded += 1;
        }

        self.first_run = false;
        Ok(forwarded)
    }

    /// 경로 패턴을 펼쳐 파일별 담당 룰을 모읍니다.
    fn resolve_files(&self) -> BTreeMap<PathBuf, Vec<Arc<RuleConfig>>> {
        let mut files: BTreeMap<PathBuf, Vec<Arc<RuleConfig>>> = BTreeMap::new();

        for rule in &self.rules {
            for pattern in &rule.paths {
                let entries = match glob::glob(pattern.trim()) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(rule = %rule.name, pattern = %pattern, error = %e, "malformed path pattern");
                        continue;
                    }
                };

                for entry in entries {
                    let path = match entry {
                        Ok(path) => path,
                        Err(e) => {
                            debug!(pattern = %pattern, error = %e, "unreadable glob entry");
                            continue;
                        }
                    };

                    if rule.excludes(&path.to_string_lossy()) {
                        continue;
                    }

                    let claimed = files.entry(path).or_default();
                    if !claimed.iter().any(|r| r.name == rule.name) {
                        claimed.push(Arc::clone(rule));
                    }
                }
            }
        }
        files
    }

    /// 파일 하나를 저장된 위치부터 읽어 컨테이너를 만듭니다.
    ///
    /// 읽을 것이 없으면 `None`을 반환합니다.
    async fn scan_file(
        &mut self,
        path: &Path,
        rules: &[Arc<RuleConfig>],
    ) -> Result<Option<EventsContainer>, CollectorError> {
        let source_err = |reason: String| CollectorError::Source {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| source_err(format!("stat failed: {e}")))?;
        if !metadata.is_file() {
            return Ok(None);
        }

        let source_id = self
            .platform
            .resolve_identity(path, &metadata)
            .map_err(|e| source_err(format!("identity failed: {e}")))?;

        let max_dead_time = rules
            .iter()
            .map(|r| r.dead_time)
            .max()
            .unwrap_or_default()
            .max(MIN_DEAD_TIME);
        let modified = metadata
            .modified()
            .map_err(|e| source_err(format!("mtime unavailable: {e}")))?;
        let idle_for = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if idle_for > max_dead_time {
            return Ok(None);
        }

        let source = path.display().to_string();
        let state = self.positions.find(&source_id);
        let (mut offset, mut line) = if state.offset > 0 {
            (state.offset, state.line)
        } else {
            (0, 1)
        };

        if self.first_run {
            let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
            info!(
                path = %source,
                offset,
                line,
                rules = %names.join(", "),
                "resume observing file"
            );
        }

        let size = metadata.len();
        if offset > size {
            info!(path = %source, offset, size, "file shrank, reading from the start");
            offset = 0;
            line = 1;
        } else if offset == size {
            return Ok(None);
        }

        let file = self
            .platform
            .open_shared_read(path)
            .map_err(|e| source_err(format!("open failed: {e}")))?;
        let mut file = tokio::fs::File::from_std(file);

        let mut head = Vec::with_capacity(UTF8_PROBE_LEN.min(size as usize));
        (&mut file)
            .take(UTF8_PROBE_LEN as u64)
            .read_to_end(&mut head)
            .await
            .map_err(|e| source_err(format!("read failed: {e}")))?;

        let hint = rules.first().and_then(|r| r.encoding.as_deref());
        let encoding = TextEncoding::resolve(hint, &head);
        if offset == 0 {
            offset = encoding.bom_len(&head) as u64;
        }

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| source_err(format!("seek failed: {e}")))?;

        let mut container = EventsContainer::new(source_id, source.clone());
        container.offset = offset;
        container.line = line;

        let mut scan = LineScan {
            encoding,
            source: &source,
            rules,
            container: &mut container,
            platform: self.platform.as_ref(),
            offset,
            line,
            lines_read: 0,
        };

        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut searched = 0usize;
        loop {
            let read = match file.read(&mut chunk).await {
                Ok(read) => read,
                Err(e) => {
                    metrics::counter!(m::CRAWLER_FILE_ERRORS_TOTAL).increment(1);
                    warn!(path = %source, error = %e, "read interrupted, keeping progress so far");
                    buf.clear();
                    break;
                }
            };
            if read == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..read]);

            let mut start = 0usize;
            while let Some(pos) = encoding.find_newline(&buf[start + searched..]) {
                let end = start + searched + pos;
                let next = end + encoding.newline().len();
                scan.consume(&buf[start..end], next - start);
                start = next;
                searched = 0;
            }
            // 아직 종결자를 찾지 못한 부분은 코드 유닛 단위로 다시 검사하지 않는다
            let pending = buf.len() - start;
            searched = pending - pending % encoding.unit_width();
            buf.drain(..start);
        }

        if !buf.is_empty() {
            if idle_for >= PARTIAL_LINE_IDLE {
                let len = buf.len();
                scan.consume(&buf, len);
            } else {
                debug!(path = %source, bytes = buf.len(), "partial last line, deferring");
            }
        }

        let (offset, line, lines_read) = (scan.offset, scan.line, scan.lines_read);
        metrics::counter!(m::CRAWLER_LINES_READ_TOTAL).increment(lines_read);

        dedupe_container(&mut container);
        container.offset = offset;
        container.line = line;
        self.positions.merge(std::slice::from_ref(&container));

        Ok(Some(container))
    }
}

/// 한 파일을 읽는 동안의 라인 처리 상태
struct LineScan<'a> {
    encoding: TextEncoding,
    source: &'a str,
    rules: &'a [Arc<RuleConfig>],
    container: &'a mut EventsContainer,
    platform: &'a dyn SourcePlatform,
    offset: u64,
    line: u64,
    lines_read: u64,
}

impl LineScan<'_> {
    /// 한 줄(종결자 제외)을 처리하고 `consumed` 바이트만큼 위치를 전진시킵니다.
    fn consume(&mut self, bytes: &[u8], consumed: usize) {
        let line_no = self.line;
        if self.line > 0 {
            self.line += 1;
        }
        self.offset += consumed as u64;
        self.lines_read += 1;
        self.container.offset = self.offset;
        self.container.line = self.line;

        let text = self.platform.decode_to_utf8(self.encoding, bytes);
        if text.is_empty() {
            return;
        }
        for rule in self.rules {
            let events = match_line(rule, self.source, line_no, &text);
            self.container.events.extend(events);
        }
    }
}

//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 단계는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tailguard_`
//! - 단계명: `crawler_`, `batcher_`, `gateway_`, `state_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (delivered, failed, dropped)
pub const LABEL_RESULT: &str = "result";

/// 플러시 사유 레이블 키 (idle, items, critical, first, events, shutdown)
pub const LABEL_TRIGGER: &str = "trigger";

// ─── Crawler 메트릭 ────────────────────────────────────────────────

/// Crawler: 읽은 라인 수 (counter)
pub const CRAWLER_LINES_READ_TOTAL: &str = "tailguard_crawler_lines_read_total";

/// Crawler: 추출된 보안 이벤트 수 (counter)
pub const CRAWLER_EVENTS_MATCHED_TOTAL: &str = "tailguard_crawler_events_matched_total";

/// Crawler: 시간 파싱 실패 수 (counter)
pub const CRAWLER_TIME_PARSE_ERRORS_TOTAL: &str = "tailguard_crawler_time_parse_errors_total";

/// Crawler: 읽기 실패로 건너뛴 파일 수 (counter)
pub const CRAWLER_FILE_ERRORS_TOTAL: &str = "tailguard_crawler_file_errors_total";

/// Crawler: 마지막 사이클에서 추적 중인 파일 수 (gauge)
pub const CRAWLER_TRACKED_FILES: &str = "tailguard_crawler_tracked_files";

// ─── Batcher 메트릭 ────────────────────────────────────────────────

/// Batcher: 플러시 횟수 (counter, label: trigger)
pub const BATCHER_FLUSHES_TOTAL: &str = "tailguard_batcher_flushes_total";

/// Batcher: 대기 중인 컨테이너 수 (gauge)
pub const BATCHER_PENDING_CONTAINERS: &str = "tailguard_batcher_pending_containers";

// ─── Gateway 메트릭 ────────────────────────────────────────────────

/// Gateway: 엔벨로프 전송 결과 (counter, label: result)
pub const GATEWAY_ENVELOPES_TOTAL: &str = "tailguard_gateway_envelopes_total";

/// Gateway: 스풀 파일로 기록된 엔벨로프 수 (counter)
pub const GATEWAY_SPOOL_WRITTEN_TOTAL: &str = "tailguard_gateway_spool_written_total";

/// Gateway: 재전송에 성공해 삭제된 스풀 파일 수 (counter)
pub const GATEWAY_SPOOL_RESENT_TOTAL: &str = "tailguard_gateway_spool_resent_total";

/// Gateway: 서버가 거부해 폐기된 이벤트 수 (counter)
pub const GATEWAY_EVENTS_DROPPED_TOTAL: &str = "tailguard_gateway_events_dropped_total";

// ─── State 메트릭 ──────────────────────────────────────────────────

/// State: 위치 저장소 동기화 횟수 (counter)
pub const STATE_SYNCS_TOTAL: &str = "tailguard_state_syncs_total";

/// State: 추적 중인 소스 수 (gauge)
pub const STATE_SOURCES: &str = "tailguard_state_sources";

/// 등록된 모든 메트릭 이름
pub const ALL_METRIC_NAMES: &[&str] = &[
    CRAWLER_LINES_READ_TOTAL,
    CRAWLER_EVENTS_MATCHED_TOTAL,
    CRAWLER_TIME_PARSE_ERRORS_TOTAL,
    CRAWLER_FILE_ERRORS_TOTAL,
    CRAWLER_TRACKED_FILES,
    BATCHER_FLUSHES_TOTAL,
    BATCHER_PENDING_CONTAINERS,
    GATEWAY_ENVELOPES_TOTAL,
    GATEWAY_SPOOL_WRITTEN_TOTAL,
    GATEWAY_SPOOL_RESENT_TOTAL,
    GATEWAY_EVENTS_DROPPED_TOTAL,
    STATE_SYNCS_TOTAL,
    STATE_SOURCES,
];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 메트릭 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Crawler
    describe_counter!(
        CRAWLER_LINES_READ_TOTAL,
        "Total number of complete lines read from tailed files"
    );
    describe_counter!(
        CRAWLER_EVENTS_MATCHED_TOTAL,
        "Total number of security events extracted by rules"
    );
    describe_counter!(
        CRAWLER_TIME_PARSE_ERRORS_TOTAL,
        "Event time values that could not be parsed"
    );
    describe_counter!(
        CRAWLER_FILE_ERRORS_TOTAL,
        "Files skipped for a cycle because of stat/open/read errors"
    );
    describe_gauge!(
        CRAWLER_TRACKED_FILES,
        "Files resolved from rule path patterns in the last cycle"
    );

    // Batcher
    describe_counter!(BATCHER_FLUSHES_TOTAL, "Batches flushed, by trigger");
    describe_gauge!(
        BATCHER_PENDING_CONTAINERS,
        "Containers waiting in the batcher accumulator"
    );

    // Gateway
    describe_counter!(GATEWAY_ENVELOPES_TOTAL, "Envelope send outcomes, by result");
    describe_counter!(
        GATEWAY_SPOOL_WRITTEN_TOTAL,
        "Failed envelopes written to the retry spool"
    );
    describe_counter!(
        GATEWAY_SPOOL_RESENT_TOTAL,
        "Spooled envelopes delivered and removed"
    );
    describe_counter!(
        GATEWAY_EVENTS_DROPPED_TOTAL,
        "Events dropped because the collector rejected the payload as malformed"
    );

    // State
    describe_counter!(STATE_SYNCS_TOTAL, "Position store write-backs");
    describe_gauge!(STATE_SOURCES, "Sources tracked by the position store");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_start_with_tailguard_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("tailguard_"),
                "Metric '{}' does not start with 'tailguard_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더 없이 호출해도 패닉하지 않아야 함
        describe_all();
    }
}

//! 이벤트 타입 -- 파이프라인 단계 사이를 이동하는 데이터
//!
//! # 흐름
//! ```text
//! FileCrawler --EventsContainer--> Enricher --EventsContainer--> Batcher
//!     Batcher --Vec<EventsContainer>--> Gateway --Vec<EventsContainer>--> PositionTracker
//! ```
//!
//! 모든 이벤트는 값으로 전달되며, 생성 이후에는 변경되지 않습니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 규칙 매칭으로 추출된 보안 이벤트
///
/// 직렬화 형식은 수집 서버의 `events[]` 항목과 동일합니다.
/// `critical` 플래그는 배치 정책에만 쓰이므로 전송되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 보안 이벤트 ID
    #[serde(rename = "sid")]
    pub security_id: u32,
    /// 보안 이벤트 그룹 ID (0이면 생략)
    #[serde(rename = "gid", default, skip_serializing_if = "is_zero")]
    pub group_id: u32,
    /// 이벤트 발생 시각 (UTC epoch 초)
    #[serde(rename = "t")]
    pub timestamp: i64,
    /// 템플릿이 적용된 메시지
    #[serde(rename = "m", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// 이벤트와 연관된 IP 주소 (캡처되지 않았으면 빈 문자열)
    pub ip: String,
    /// `ip`, `eventTime`을 제외한 캡처 필드
    #[serde(rename = "a", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// 긴급 전송 대상 여부
    #[serde(skip)]
    pub critical: bool,
    /// 소스 위치 (`path` 또는 `path:line`)
    #[serde(rename = "src", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl SecurityEvent {
    /// 중복 판정 키 (security id, ip, timestamp)
    pub fn dedup_key(&self) -> (u32, &str, i64) {
        (self.security_id, self.ip.as_str(), self.timestamp)
    }
}

/// 한 소스에 대한 한 번의 크롤링 결과
///
/// 크롤러가 생성하고 배처가 소비합니다. `offset`/`line`은 컨테이너에 담긴
/// 마지막 라인 직후의 읽기 위치이며, 전송 이후 위치 추적기에 병합됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsContainer {
    /// 소스 식별자 (경로가 아닌 OS 수준 파일 식별자)
    pub source_id: String,
    /// 다음에 읽을 바이트 오프셋
    pub offset: u64,
    /// 다음에 읽을 라인 번호 (0 = 추적 안 함)
    pub line: u64,
    /// 소스 경로 (표시용)
    pub source: String,
    /// 추출된 보안 이벤트 (파일 내 순서 유지)
    pub events: Vec<SecurityEvent>,
    /// IP -> 서비스 이름 목록
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ip_services: BTreeMap<String, Vec<String>>,
}

impl EventsContainer {
    /// 빈 컨테이너를 생성합니다.
    pub fn new(source_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    /// 긴급 이벤트가 포함되어 있는지 확인합니다.
    pub fn has_critical(&self) -> bool {
        self.events.iter().any(|e| e.critical)
    }

    /// 이벤트 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 이벤트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

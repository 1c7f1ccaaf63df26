//! 룰 엔진 -- YAML 룰 기반 라인 매칭 및 보안 이벤트 추출
//!
//! # 룰 형식
//! ```yaml
//! source: file
//! paths:
//!   - /var/log/auth.log*
//! encoding: utf-8
//! deadtime: 360h
//! excludefilesregex: '\.gz$'
//! eventtimeformat: "MMM D hh:mm:ss"
//! events:
//!   - sid: 1001
//!     gid: 10
//!     message: "Failed password for #user from #ip"
//!     regex: '^(?P<eventTime>\w{3}\s+\d+ [\d:]+) .* Failed password for (?P<user>\S+) from (?P<ip>\S+)'
//!     exclude:
//!       ip: '^127\.'
//!     critical: false
//! ```
//!
//! # 아키텍처
//! - [`RuleEngine`]: 로드된 룰 집합과 매칭 진입점
//! - [`loader`]: YAML 파일 로딩, 환경변수 치환, 룰 선택
//! - [`matcher`]: 정규식 추출, 시간 해석, 제외, 메시지 템플릿
//! - [`timefmt`]: 토큰 기반 시간 형식
//! - [`types`]: 룰 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod timefmt;
pub mod types;

pub use loader::{RuleLoadOptions, RuleLoader};
pub use matcher::match_line;
pub use timefmt::TimeFormat;
pub use types::{EventFilter, RuleConfig, SourceKind};

use std::path::Path;
use std::sync::Arc;

use tailguard_core::event::SecurityEvent;
use tracing::info;

use crate::error::CollectorError;

/// 룰 엔진 -- 로드된 룰 집합
///
/// 룰은 로드 이후 변경되지 않으며 `Arc`로 크롤러와 공유됩니다.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Arc<RuleConfig>>,
}

impl RuleEngine {
    /// 컴파일된 룰 목록으로 엔진을 생성합니다.
    pub fn new(rules: Vec<RuleConfig>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    /// 디렉토리에서 룰을 로드해 엔진을 생성합니다.
    pub async fn load_from_dir(
        dir: impl AsRef<Path>,
        options: &RuleLoadOptions,
    ) -> Result<Self, CollectorError> {
        let engine = Self::new(RuleLoader::load_directory(dir, options).await?);

        for rule in engine.inactive_rules() {
            info!(
                rule = %rule.name,
                "event log rule loaded but no event log reader is available, rule inactive"
            );
        }
        Ok(engine)
    }

    /// 모든 룰
    pub fn rules(&self) -> &[Arc<RuleConfig>] {
        &self.rules
    }

    /// 파일 크롤러가 처리하는 룰
    pub fn file_rules(&self) -> Vec<Arc<RuleConfig>> {
        self.rules
            .iter()
            .filter(|r| r.source == SourceKind::File)
            .cloned()
            .collect()
    }

    /// 로드되었지만 처리할 입력이 없는 룰
    pub fn inactive_rules(&self) -> impl Iterator<Item = &Arc<RuleConfig>> {
        self.rules.iter().filter(|r| r.source != SourceKind::File)
    }

    /// 룰 수
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 룰이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 한 줄을 지정한 룰에 적용합니다.
    pub fn evaluate(
        &self,
        rule: &RuleConfig,
        source: &str,
        line_no: u64,
        line: &str,
    ) -> Vec<SecurityEvent> {
        match_line(rule, source, line_no, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_RULE: &str = r#"
paths: ["/var/log/app.log"]
events:
  - sid: 1
    regex: '^(?P<eventTime>\S+) denied (?P<ip>\S+)$'
"#;

    const EVENTLOG_RULE: &str = r#"
source: wineventlog
events:
  - sid: 4625
    wineventids: [4625]
    regex: 'Account Name:\s+(?P<user>\S+)'
"#;

    fn engine() -> RuleEngine {
        let options = RuleLoadOptions::default();
        RuleEngine::new(vec![
            RuleLoader::parse_yaml(FILE_RULE, "app", &options).unwrap(),
            RuleLoader::parse_yaml(EVENTLOG_RULE, "windows", &options).unwrap(),
        ])
    }

    #[test]
    fn eventlog_rules_are_inactive() {
        let engine = engine();
        assert_eq!(engine.len(), 2);
        let file_rules = engine.file_rules();
        assert_eq!(file_rules.len(), 1);
        assert_eq!(file_rules[0].name, "app");
        assert_eq!(engine.inactive_rules().count(), 1);
    }

    #[test]
    fn evaluate_delegates_to_matcher() {
        let engine = engine();
        let rule = engine.file_rules().remove(0);
        let events = engine.evaluate(&rule, "/var/log/app.log", 3, "2023-01-01T00:00:00Z denied 1.2.3.4");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ip, "1.2.3.4");
    }
}

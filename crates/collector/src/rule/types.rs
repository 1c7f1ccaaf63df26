//! 룰 데이터 구조 정의
//!
//! [`RuleFile`]/[`EventFilterFile`]은 YAML 파일을 그대로 옮긴 원시 형태이고,
//! [`RuleConfig`]/[`EventFilter`]는 정규식과 시간 형식이 미리 컴파일된 형태입니다.
//! 컴파일된 룰은 로드 이후 변경되지 않으며 크롤러 사이클 간에 공유됩니다.

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::timefmt::TimeFormat;
use crate::error::CollectorError;

/// YAML 룰 파일 원시 형태
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleFile {
    /// 소스 종류 (file, eventlog, wineventlog)
    pub source: String,
    /// 경로 glob 패턴
    pub paths: Vec<String>,
    /// 인코딩 이름
    pub encoding: String,
    /// dead-time (예: "360h")
    #[serde(rename = "deadtime")]
    pub dead_time: String,
    /// 제외 파일 정규식
    #[serde(rename = "excludefilesregex")]
    pub exclude_files_regex: String,
    /// 이벤트 시간 형식
    #[serde(rename = "eventtimeformat")]
    pub event_time_format: String,
    /// 이벤트 필터 목록
    pub events: Vec<EventFilterFile>,
}

/// YAML 이벤트 필터 원시 형태
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilterFile {
    /// 보안 ID
    pub sid: u32,
    /// 그룹 ID
    pub gid: u32,
    /// 플랫폼 이벤트 로그 ID 목록
    #[serde(rename = "wineventids")]
    pub win_event_ids: Vec<u32>,
    /// 메시지 템플릿
    pub message: String,
    /// 이름 있는 캡처 그룹을 포함한 정규식
    pub regex: String,
    /// 고정 필드
    pub fields: BTreeMap<String, String>,
    /// 필드별 제외 정규식
    pub exclude: BTreeMap<String, String>,
    /// critical 여부
    pub critical: bool,
}

/// 룰 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 텍스트 로그 파일
    File,
    /// 플랫폼 구조화 이벤트 로그
    EventLog,
}

impl SourceKind {
    /// 룰 파일의 `source` 값을 해석합니다. 비어 있으면 `File`입니다.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "file" => Some(Self::File),
            "eventlog" | "wineventlog" => Some(Self::EventLog),
            _ => None,
        }
    }
}

/// 컴파일된 룰
#[derive(Debug, Clone)]
pub struct RuleConfig {
    /// 룰 이름 (소문자 파일 이름, 확장자 제외)
    pub name: String,
    /// 소스 종류
    pub source: SourceKind,
    /// 경로 glob 패턴
    pub paths: Vec<String>,
    /// 인코딩 힌트
    pub encoding: Option<String>,
    /// 최대 파일 유휴 시간
    pub dead_time: Duration,
    /// 제외 파일 정규식
    pub exclude_files: Option<Regex>,
    /// 사용자 시간 형식 (없으면 자기 기술 형식)
    pub time_format: Option<TimeFormat>,
    /// 이벤트 필터 (선언 순서)
    pub filters: Vec<EventFilter>,
}

/// 컴파일된 이벤트 필터
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub security_id: u32,
    pub group_id: u32,
    pub event_ids: Vec<u32>,
    pub message: String,
    pub regex: Regex,
    pub fields: BTreeMap<String, String>,
    pub exclude: BTreeMap<String, Regex>,
    pub critical: bool,
}

impl RuleConfig {
    /// 원시 룰을 컴파일합니다.
    ///
    /// dead-time, 제외 파일 정규식, 시간 형식이 잘못되면 룰 전체가 실패합니다.
    /// 정규식이 잘못된 필터는 경고 후 제외되고, 남은 필터가 없으면 실패합니다.
    pub fn compile(name: &str, raw: RuleFile) -> Result<Self, CollectorError> {
        let invalid = |reason: String| CollectorError::RuleValidation {
            rule: name.to_owned(),
            reason,
        };

        let source = SourceKind::parse(&raw.source)
            .ok_or_else(|| invalid(format!("unknown source kind '{}'", raw.source)))?;

        let dead_time = super::loader::parse_duration(&raw.dead_time)
            .map_err(|e| invalid(format!("deadtime '{}': {e}", raw.dead_time)))?;

        let exclude_files = if raw.exclude_files_regex.is_empty() {
            None
        } else {
            Some(
                Regex::new(&raw.exclude_files_regex)
                    .map_err(|e| invalid(format!("excludefilesregex: {e}")))?,
            )
        };

        let time_format = if raw.event_time_format.trim().is_empty() {
            None
        } else {
            Some(
                TimeFormat::compile(&raw.event_time_format)
                    .map_err(|e| invalid(format!("eventtimeformat: {e}")))?,
            )
        };

        let mut filters = Vec::with_capacity(raw.events.len());
        for (index, event) in raw.events.into_iter().enumerate() {
            match EventFilter::compile(event) {
                Ok(filter) => filters.push(filter),
                Err(e) => warn!(
                    rule = name,
                    filter = index,
                    error = %e,
                    "failed to compile event filter, skipping"
                ),
            }
        }

        if filters.is_empty() {
            return Err(invalid("no usable event filters".to_owned()));
        }

        if source == SourceKind::File && raw.paths.is_empty() {
            return Err(invalid("file rule has no paths".to_owned()));
        }

        let encoding = Some(raw.encoding.trim().to_owned()).filter(|e| !e.is_empty());

        Ok(Self {
            name: name.to_owned(),
            source,
            paths: raw.paths,
            encoding,
            dead_time,
            exclude_files,
            time_format,
            filters,
        })
    }

    /// 경로가 이 룰의 제외 파일 정규식에 해당하는지 여부
    pub fn excludes(&self, path: &str) -> bool {
        self.exclude_files
            .as_ref()
            .is_some_and(|re| re.is_match(path))
    }
}

impl EventFilter {
    /// 원시 필터를 컴파일합니다.
    ///
    /// 잘못된 제외 정규식은 해당 항목만 경고 후 무시합니다.
    pub fn compile(raw: EventFilterFile) -> Result<Self, CollectorError> {
        let regex = Regex::new(&raw.regex)?;

        let mut exclude = BTreeMap::new();
        for (field, pattern) in raw.exclude {
            match Regex::new(&pattern) {
                Ok(re) => {
                    exclude.insert(field, re);
                }
                Err(e) => warn!(
                    field = %field,
                    pattern = %pattern,
                    error = %e,
                    "failed to compile exclude regex, ignoring"
                ),
            }
        }

        Ok(Self {
            security_id: raw.sid,
            group_id: raw.gid,
            event_ids: raw.win_event_ids,
            message: raw.message,
            regex,
            fields: raw.fields,
            exclude,
            critical: raw.critical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_rule() -> RuleFile {
        RuleFile {
            paths: vec!["/var/log/auth.log".to_owned()],
            dead_time: "1h".to_owned(),
            events: vec![EventFilterFile {
                sid: 1001,
                regex: r"from (?P<ip>\S+)".to_owned(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn source_kind_parsing() {
        assert_eq!(SourceKind::parse(""), Some(SourceKind::File));
        assert_eq!(SourceKind::parse("File"), Some(SourceKind::File));
        assert_eq!(SourceKind::parse("wineventlog"), Some(SourceKind::EventLog));
        assert_eq!(SourceKind::parse("journald"), None);
    }

    #[test]
    fn compile_valid_rule() {
        let rule = RuleConfig::compile("sshd", raw_rule()).unwrap();
        assert_eq!(rule.name, "sshd");
        assert_eq!(rule.dead_time, Duration::from_secs(3600));
        assert_eq!(rule.filters.len(), 1);
        assert!(rule.encoding.is_none());
        assert!(rule.time_format.is_none());
    }

    #[test]
    fn bad_filter_is_skipped_but_rule_survives() {
        let mut raw = raw_rule();
        raw.events.push(EventFilterFile {
            sid: 1002,
            regex: "(unclosed".to_owned(),
            ..Default::default()
        });
        let rule = RuleConfig::compile("sshd", raw).unwrap();
        assert_eq!(rule.filters.len(), 1);
        assert_eq!(rule.filters[0].security_id, 1001);
    }

    #[test]
    fn rule_without_usable_filters_fails() {
        let mut raw = raw_rule();
        raw.events[0].regex = "(unclosed".to_owned();
        assert!(matches!(
            RuleConfig::compile("sshd", raw),
            Err(CollectorError::RuleValidation { .. })
        ));
    }

    #[test]
    fn bad_dead_time_fails_rule() {
        let mut raw = raw_rule();
        raw.dead_time = "forever".to_owned();
        assert!(RuleConfig::compile("sshd", raw).is_err());
    }

    #[test]
    fn bad_exclude_regex_entry_is_dropped() {
        let mut raw = raw_rule();
        raw.events[0]
            .exclude
            .insert("ip".to_owned(), "[".to_owned());
        raw.events[0]
            .exclude
            .insert("user".to_owned(), "^root$".to_owned());
        let rule = RuleConfig::compile("sshd", raw).unwrap();
        let exclude = &rule.filters[0].exclude;
        assert_eq!(exclude.len(), 1);
        assert!(exclude.contains_key("user"));
    }

    #[test]
    fn excludes_matches_exclude_files_regex() {
        let mut raw = raw_rule();
        raw.exclude_files_regex = r"\.gz$".to_owned();
        let rule = RuleConfig::compile("sshd", raw).unwrap();
        assert!(rule.excludes("/var/log/auth.log.1.gz"));
        assert!(!rule.excludes("/var/log/auth.log"));
    }
}

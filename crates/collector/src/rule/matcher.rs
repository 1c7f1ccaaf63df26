//! 라인 매칭 로직 -- 정규식 추출, 시간 해석, 제외 필터, 메시지 템플릿
//!
//! 한 줄을 룰의 각 이벤트 필터에 선언 순서대로 적용해 [`SecurityEvent`]를 만듭니다.
//! 시간 파싱 실패는 해당 필터만 건너뛰고 나머지 필터는 계속 평가합니다.

use std::collections::BTreeMap;

use tailguard_core::event::SecurityEvent;
use tailguard_core::metrics as m;
use tracing::warn;

use super::timefmt;
use super::types::{EventFilter, RuleConfig};
use crate::error::CollectorError;

/// 이벤트 시간 캡처 필드 이름
pub const EVENT_TIME_FIELD: &str = "eventTime";
/// IP 캡처 필드 이름
pub const IP_FIELD: &str = "ip";
/// 템플릿이 없을 때 메시지로 사용하는 캡처 필드 이름
pub const MESSAGE_FIELD: &str = "message";

/// 한 줄을 룰에 적용해 보안 이벤트를 추출합니다.
///
/// `line_no`는 1부터 시작하는 라인 번호이며, 0이면 소스 위치에 라인 번호를 붙이지 않습니다.
pub fn match_line(rule: &RuleConfig, source: &str, line_no: u64, line: &str) -> Vec<SecurityEvent> {
    let mut events = Vec::new();

    for filter in &rule.filters {
        if !filter.regex.is_match(line) {
            continue;
        }

        let captured = capture_fields(filter, line);

        let event_time = captured
            .get(EVENT_TIME_FIELD)
            .map(String::as_str)
            .unwrap_or_default();
        let timestamp = match resolve_time(rule, event_time) {
            Ok(ts) => ts,
            Err(e) => {
                metrics::counter!(m::CRAWLER_TIME_PARSE_ERRORS_TOTAL).increment(1);
                warn!(rule = %rule.name, source, error = %e, "failed to parse event time, skipping filter");
                continue;
            }
        };

        if is_excluded(filter, &captured) {
            continue;
        }

        let ip = captured.get(IP_FIELD).cloned().unwrap_or_default();
        let message = render_message(filter, &captured, &ip);

        let fields: BTreeMap<String, String> = captured
            .into_iter()
            .filter(|(k, _)| k != IP_FIELD && k != EVENT_TIME_FIELD)
            .collect();

        let locator = if line_no > 0 {
            format!("{source}:{line_no}")
        } else {
            source.to_owned()
        };

        events.push(SecurityEvent {
            security_id: filter.security_id,
            group_id: filter.group_id,
            timestamp,
            message,
            ip,
            fields,
            critical: filter.critical,
            source: Some(locator),
        });
    }

    events
}

/// 고정 필드 위에 모든 매치의 이름 있는 캡처(빈 값 제외)를 덮어씁니다.
fn capture_fields(filter: &EventFilter, line: &str) -> BTreeMap<String, String> {
    let mut fields = filter.fields.clone();
    let names: Vec<&str> = filter.regex.capture_names().flatten().collect();

    for caps in filter.regex.captures_iter(line) {
        for name in &names {
            if let Some(m) = caps.name(name) {
                if !m.as_str().is_empty() {
                    fields.insert((*name).to_owned(), m.as_str().to_owned());
                }
            }
        }
    }
    fields
}

fn resolve_time(rule: &RuleConfig, value: &str) -> Result<i64, CollectorError> {
    match &rule.time_format {
        Some(format) => format.parse(value),
        None => timefmt::parse_self_describing(value),
    }
}

/// 비어 있지 않은 캡처 값이 해당 필드의 제외 정규식과 일치하면 true
fn is_excluded(filter: &EventFilter, captured: &BTreeMap<String, String>) -> bool {
    filter.exclude.iter().any(|(field, re)| {
        captured
            .get(field)
            .is_some_and(|value| !value.is_empty() && re.is_match(value))
    })
}

/// `#field` 토큰을 캡처 값으로 치환합니다.
///
/// `#user`가 `#username`의 일부를 바꾸지 않도록 긴 필드 이름부터 치환합니다.
fn render_message(filter: &EventFilter, captured: &BTreeMap<String, String>, ip: &str) -> String {
    let template = if filter.message.is_empty() {
        captured.get(MESSAGE_FIELD).cloned().unwrap_or_default()
    } else {
        filter.message.clone()
    };
    if !template.contains('#') {
        return template;
    }

    let mut keys: Vec<&String> = captured.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut message = template;
    for key in keys {
        message = message.replace(&format!("#{key}"), &captured[key]);
    }
    message.replace("#ip", ip)
}

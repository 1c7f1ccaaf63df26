#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use tailguard_collector::rule::{RuleConfig, RuleLoadOptions, RuleLoader, match_line};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 필터 목록 (최대 4개로 제한)
    filters: Vec<FuzzFilter>,
    /// 시간 형식 (없으면 자기 기술 형식)
    time_format: Option<String>,
    /// 매칭 대상 라인
    line: String,
    line_no: u64,
}

#[derive(Arbitrary, Debug)]
struct FuzzFilter {
    regex: String,
    message: String,
    exclude_ip: Option<String>,
    critical: bool,
}

/// YAML 단일 인용 문자열 이스케이프
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn build_rule(input: &FuzzInput) -> Option<RuleConfig> {
    let mut yaml = String::from("paths: [\"/var/log/fuzz.log\"]\n");
    if let Some(format) = &input.time_format {
        yaml.push_str(&format!("eventtimeformat: {}\n", quote(format)));
    }
    yaml.push_str("events:\n");
    for (sid, filter) in input.filters.iter().take(4).enumerate() {
        yaml.push_str(&format!(
            "  - sid: {sid}\n    regex: {}\n    message: {}\n    critical: {}\n",
            quote(&filter.regex),
            quote(&filter.message),
            filter.critical
        ));
        if let Some(exclude) = &filter.exclude_ip {
            yaml.push_str(&format!("    exclude:\n      ip: {}\n", quote(exclude)));
        }
    }
    RuleLoader::parse_yaml(&yaml, "fuzz", &RuleLoadOptions::default()).ok()
}

fuzz_target!(|input: FuzzInput| {
    // 줄바꿈이 들어간 값은 YAML 구조를 깨므로 제외
    if input.line.contains('\n') {
        return;
    }
    let Some(rule) = build_rule(&input) else {
        return;
    };

    for event in match_line(&rule, "/var/log/fuzz.log", input.line_no, &input.line) {
        assert!(!event.fields.contains_key("ip"));
        assert!(!event.fields.contains_key("eventTime"));
    }
});

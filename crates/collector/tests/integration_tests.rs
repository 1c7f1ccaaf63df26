//! 통합 테스트 -- 파일 크롤링부터 수집 서버 전송까지 전체 흐름 검증
//!
//! 임시 디렉토리의 로그 파일과 mockito 수집 서버로 파이프라인을 실제로 구동합니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use mockito::Matcher;
use tailguard_collector::{
    CollectorConfig, CollectorConfigBuilder, CollectorPipelineBuilder, PositionTracker,
    RuleEngine, RuleLoadOptions, RuleLoader, SpoolDir,
};
use tailguard_core::pipeline::Pipeline;

const AUTH_LOG: &str = "\
2023-01-01T00:00:00Z login failed from 10.0.0.5
2023-01-01T00:00:01Z login ok from 10.0.0.6
2023-01-01T00:00:02Z login failed from 10.0.0.7
";

fn rules_for(log_dir: &Path) -> RuleEngine {
    let yaml = format!(
        r#"
paths: ["{}/*.log"]
excludefilesregex: '\.gz$'
events:
  - sid: 4625
    gid: 2
    message: "Failed login from #ip"
    regex: '^(?P<eventTime>\S+) login failed from (?P<ip>\S+)$'
"#,
        log_dir.display()
    );
    let rule = RuleLoader::parse_yaml(&yaml, "auth", &RuleLoadOptions::default()).unwrap();
    RuleEngine::new(vec![rule])
}

fn config_for(state_dir: &Path, url: &str) -> CollectorConfigBuilder {
    CollectorConfigBuilder::new()
        .state_dir(state_dir)
        .collector_url(url)
        .credentials("tok", "key")
        .crawl_interval_secs(3600)
        .request_timeout_secs(5)
}

/// 조건이 참이 될 때까지 최대 5초 대기
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn run_until(config: CollectorConfig, rules: RuleEngine, condition: impl FnMut() -> bool) {
    let mut pipeline = CollectorPipelineBuilder::new()
        .config(config)
        .rules(rules)
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    let reached = wait_until(condition).await;
    pipeline.stop().await.unwrap();
    assert!(reached, "pipeline did not reach expected state");
}

fn spool_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with(".net_"))
                .count()
        })
        .unwrap_or(0)
}

/// 크롤링 -> 매칭 -> 보강 -> 전송 -> 위치 기록
#[tokio::test]
async fn test_crawl_deliver_and_persist_positions() {
    let logs = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    std::fs::write(logs.path().join("auth.log"), AUTH_LOG).unwrap();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/collect")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(serde_json::json!({"token": "tok", "hd": "key", "v": "1.0"})),
            Matcher::Regex(r#""m":"Failed login from 10.0.0.5""#.to_owned()),
            Matcher::Regex(r#""m":"Failed login from 10.0.0.7""#.to_owned()),
            Matcher::Regex(r#""ipsrvs":\{"10.0.0.5":\["ssh"\]\}"#.to_owned()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;

    let mut services = BTreeMap::new();
    services.insert("10.0.0.5".to_owned(), vec!["ssh".to_owned()]);
    let config = config_for(state.path(), &format!("{}/collect", server.url()))
        .ip_services(services)
        .build()
        .unwrap();
    let state_file = config.state_file();

    run_until(config, rules_for(logs.path()), || state_file.exists()).await;
    mock.assert_async().await;

    let tracker = PositionTracker::load(&state_file).await;
    assert_eq!(tracker.len(), 1);
    assert_eq!(spool_count(state.path()), 0);
}

/// 전송 실패 -> 스풀 -> 다음 실행에서 재전송 후 삭제, 이미 전달된 이벤트는 다시 읽지 않음
#[tokio::test]
async fn test_failed_delivery_is_spooled_and_resent() {
    let logs = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    std::fs::write(logs.path().join("auth.log"), AUTH_LOG).unwrap();

    let mut server = mockito::Server::new_async().await;
    let url = format!("{}/collect", server.url());

    let failing = server
        .mock("POST", "/collect")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(state.path(), &url).build().unwrap();
    let state_file = config.state_file();
    let state_dir = state.path().to_path_buf();
    run_until(config, rules_for(logs.path()), || {
        state_file.exists() && spool_count(&state_dir) == 1
    })
    .await;
    failing.assert_async().await;
    failing.remove_async().await;

    // 스풀 파일에는 매칭된 이벤트 전체가 들어 있음
    let spool = SpoolDir::new(state.path());
    let files = spool.list().await.unwrap();
    let spooled: serde_json::Value =
        serde_json::from_slice(&spool.read(&files[0]).await.unwrap()).unwrap();
    assert_eq!(spooled["events"].as_array().unwrap().len(), 2);

    // 첫 플러시의 빈 봉투: 이벤트 없이 핸드셰이크 필드만 포함
    let empty = server
        .mock("POST", "/collect")
        .match_body(Matcher::Regex(
            r#"^\{"token":"tok","hd":"key","ult":\d+,"ulto":-?\d+,"v":"1.0"\}$"#.to_owned(),
        ))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;
    let resent = server
        .mock("POST", "/collect")
        .match_body(Matcher::Regex("10.0.0.5".to_owned()))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(state.path(), &url)
        .first_flush_delay_secs(1)
        .build()
        .unwrap();
    run_until(config, rules_for(logs.path()), || spool_count(&state_dir) == 0).await;

    resent.assert_async().await;
    empty.assert_async().await;
}

/// malformed payload 응답은 이벤트를 버리고 스풀하지 않음
#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let logs = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    std::fs::write(logs.path().join("auth.log"), AUTH_LOG).unwrap();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/collect")
        .with_status(200)
        .with_body(r#"{"success":false,"error":"malformed payload","errorcode":1}"#)
        .expect(1)
        .create_async()
        .await;

    let config = config_for(state.path(), &format!("{}/collect", server.url()))
        .build()
        .unwrap();
    let state_file = config.state_file();
    run_until(config, rules_for(logs.path()), || state_file.exists()).await;

    mock.assert_async().await;
    assert_eq!(spool_count(state.path()), 0);
}

/// 룰 디렉토리 로딩부터 파이프라인 빌드까지
#[tokio::test]
async fn test_rules_loaded_from_directory() {
    let rules_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        rules_dir.path().join("sshd.yml"),
        r#"
paths: ["/var/log/auth.log"]
events:
  - sid: 1
    regex: 'Failed password .* from (?P<ip>\S+)'
"#,
    )
    .unwrap();
    std::fs::write(
        rules_dir.path().join("security.yaml"),
        r#"
source: eventlog
events:
  - sid: 2
    wineventids: [4625]
    regex: 'Account Name:\s+(?P<user>\S+)'
"#,
    )
    .unwrap();

    let engine = RuleEngine::load_from_dir(rules_dir.path(), &RuleLoadOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.len(), 2);
    assert_eq!(engine.file_rules().len(), 1);
    assert_eq!(engine.inactive_rules().count(), 1);

    let state = tempfile::tempdir().unwrap();
    let result = CollectorPipelineBuilder::new()
        .config(config_for(state.path(), "http://localhost:5000/collect").build().unwrap())
        .rules(engine)
        .build();
    assert!(result.is_ok());
}

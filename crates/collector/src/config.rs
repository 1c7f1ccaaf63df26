//! 수집기 설정
//!
//! [`CollectorConfig`]는 core의 [`AgentConfig`]를 기반으로
//! 크롤러, 배처, 게이트웨이가 사용하는 런타임 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use tailguard_core::config::AgentConfig;
//! use tailguard_collector::config::CollectorConfig;
//!
//! let core_config = AgentConfig::default();
//! let config = CollectorConfig::from_core(&core_config);
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tailguard_core::config::AgentConfig;

use crate::error::CollectorError;

/// 위치 저장소 파일 이름 (`state_dir` 하위)
pub const STATE_FILE_NAME: &str = ".tailguard-state";

/// 스풀 파일 이름 접두사
pub const SPOOL_FILE_PREFIX: &str = ".net_";

/// 이 기간 동안 갱신되지 않은 위치 레코드는 로드 시 제거
pub const STATE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// 종결자 없는 마지막 줄을 완성된 줄로 간주하기 위한 파일 유휴 시간
pub const PARTIAL_LINE_IDLE: Duration = Duration::from_secs(60);

/// dead-time 하한
pub const MIN_DEAD_TIME: Duration = Duration::from_secs(1);

/// 수집 프로토콜 버전
pub const PROTOCOL_VERSION: &str = "1.0";

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// 위치 저장소와 스풀 파일 디렉토리
    pub state_dir: PathBuf,
    /// 룰 YAML 디렉토리
    pub rules_dir: PathBuf,
    /// 모든 룰 사용 여부
    pub all_rules: bool,
    /// 사용할 룰 이름 목록
    pub rules: Vec<String>,
    /// 기본 dead-time (Go 형식 문자열)
    pub default_dead_time: String,
    /// 기본 제외 파일 정규식
    pub default_exclude_files: String,
    /// 크롤링 주기 (초)
    pub crawl_interval_secs: u64,

    /// 접근 토큰
    pub access_token: String,
    /// 서버 키
    pub server_key: String,
    /// 수집 서버 주소
    pub collector_url: String,
    /// 업스트림 프록시 (비어 있으면 직접 연결)
    pub proxy: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,

    /// 배치 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
    /// 이 개수만큼 컨테이너가 모이면 플러시
    pub max_batch_items: usize,
    /// 누적 이벤트가 이 개수 이상이면 플러시
    pub max_batch_events: usize,
    /// critical 이벤트 보유 시 플러시 대기 시간 (초)
    pub critical_timeout_secs: u64,
    /// 시작 후 첫 플러시를 깨우는 타이머 (초)
    pub first_flush_delay_secs: u64,

    /// 단계 간 채널 용량
    pub channel_capacity: usize,
    /// 정적 IP -> 서비스 이름 매핑
    pub ip_services: BTreeMap<String, Vec<String>>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".state"),
            rules_dir: PathBuf::from("/etc/tailguard/rules.d"),
            all_rules: true,
            rules: Vec::new(),
            default_dead_time: "360h".to_owned(),
            default_exclude_files: "((.gz)|(.zip)|(.tar)|(.zip))".to_owned(),
            crawl_interval_secs: 60,
            access_token: String::new(),
            server_key: String::new(),
            collector_url: tailguard_core::config::PROD_COLLECTOR_URL.to_owned(),
            proxy: String::new(),
            request_timeout_secs: 15,
            idle_timeout_secs: 60,
            max_batch_items: 10,
            max_batch_events: 1000,
            critical_timeout_secs: 20,
            first_flush_delay_secs: 20,
            channel_capacity: 64,
            ip_services: BTreeMap::new(),
        }
    }
}

impl CollectorConfig {
    /// core의 `AgentConfig`에서 수집기 설정을 생성합니다.
    ///
    /// core 설정에 없는 배치 임계값은 기본값이 적용됩니다.
    pub fn from_core(core: &AgentConfig) -> Self {
        Self {
            state_dir: PathBuf::from(&core.general.state_dir),
            rules_dir: PathBuf::from(&core.general.rules_dir),
            all_rules: core.input.all_rules,
            rules: core.input.rules.clone(),
            default_dead_time: core.input.default_dead_time.clone(),
            default_exclude_files: core.input.default_exclude_files.clone(),
            crawl_interval_secs: core.input.crawl_interval_secs,
            access_token: core.output.access_token.clone(),
            server_key: core.output.server_key.clone(),
            collector_url: core.output.collector_url().to_owned(),
            proxy: core.output.proxy.clone(),
            request_timeout_secs: core.output.timeout_secs,
            idle_timeout_secs: core.input.idle_timeout_secs,
            ip_services: core.input.ip_services.clone(),
            ..Self::default()
        }
    }

    /// 위치 저장소 파일 경로
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    /// 크롤링 주기
    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval_secs)
    }

    /// 배치 유휴 타임아웃
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// critical 플러시 대기 시간
    pub fn critical_timeout(&self) -> Duration {
        Duration::from_secs(self.critical_timeout_secs)
    }

    /// 첫 플러시 타이머
    pub fn first_flush_delay(&self) -> Duration {
        Duration::from_secs(self.first_flush_delay_secs)
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.crawl_interval_secs == 0 {
            return Err(CollectorError::Config {
                field: "crawl_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.idle_timeout_secs == 0 {
            return Err(CollectorError::Config {
                field: "idle_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(CollectorError::Config {
                field: "request_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_batch_items == 0 || self.max_batch_events == 0 {
            return Err(CollectorError::Config {
                field: "max_batch_items".to_owned(),
                reason: "batch thresholds must be greater than 0".to_owned(),
            });
        }

        if self.channel_capacity == 0 {
            return Err(CollectorError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.collector_url.is_empty() {
            return Err(CollectorError::Config {
                field: "collector_url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.state_dir.as_os_str().is_empty() {
            return Err(CollectorError::Config {
                field: "state_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 수집기 설정 빌더
#[derive(Default)]
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 상태 디렉토리를 설정합니다.
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.state_dir = dir.into();
        self
    }

    /// 룰 디렉토리를 설정합니다.
    pub fn rules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.rules_dir = dir.into();
        self
    }

    /// 수집 서버 주소를 설정합니다.
    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.config.collector_url = url.into();
        self
    }

    /// 접근 토큰과 서버 키를 설정합니다.
    pub fn credentials(mut self, token: impl Into<String>, server_key: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self.config.server_key = server_key.into();
        self
    }

    /// 프록시를 설정합니다.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = proxy.into();
        self
    }

    /// 크롤링 주기(초)를 설정합니다.
    pub fn crawl_interval_secs(mut self, secs: u64) -> Self {
        self.config.crawl_interval_secs = secs;
        self
    }

    /// 배치 유휴 타임아웃(초)을 설정합니다.
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    /// 첫 플러시 타이머(초)를 설정합니다.
    pub fn first_flush_delay_secs(mut self, secs: u64) -> Self {
        self.config.first_flush_delay_secs = secs;
        self
    }

    /// 요청 타임아웃(초)을 설정합니다.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// 정적 IP 서비스 매핑을 설정합니다.
    pub fn ip_services(mut self, map: BTreeMap<String, Vec<String>>) -> Self {
        self.config.ip_services = map;
        self
    }

    /// 설정을 검증하고 `CollectorConfig`를 생성합니다.
    pub fn build(self) -> Result<CollectorConfig, CollectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CollectorConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = AgentConfig::default();
        core.general.state_dir = "/var/lib/tailguard".to_owned();
        core.output.environment = "dev".to_owned();
        core.output.proxy = "http://proxy:3128".to_owned();
        core.input.idle_timeout_secs = 30;

        let config = CollectorConfig::from_core(&core);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/tailguard"));
        assert_eq!(config.collector_url, "http://localhost:5000/collect");
        assert_eq!(config.proxy, "http://proxy:3128");
        assert_eq!(config.idle_timeout_secs, 30);
        // 확장 필드는 기본값
        assert_eq!(config.max_batch_items, 10);
        assert_eq!(config.max_batch_events, 1000);
    }

    #[test]
    fn state_file_is_under_state_dir() {
        let config = CollectorConfigBuilder::new()
            .state_dir("/tmp/tg")
            .build()
            .unwrap();
        assert_eq!(config.state_file(), PathBuf::from("/tmp/tg/.tailguard-state"));
    }

    #[test]
    fn validate_rejects_zero_idle_timeout() {
        let config = CollectorConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_rejects_empty_url() {
        let result = CollectorConfigBuilder::new().collector_url("").build();
        assert!(result.is_err());
    }
}

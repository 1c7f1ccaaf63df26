//! 설정 관리 -- tailguard.toml 파싱 및 런타임 설정
//!
//! [`AgentConfig`]는 에이전트 전체 설정을 담는 최상위 구조체입니다.
//! 규칙(rule) 파일은 별도 디렉토리의 YAML 파일이며 `tailguard-collector`가 로드합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TAILGUARD_OUTPUT_PROXY=http://proxy:3128` 형식)
//! 3. 설정 파일 (`tailguard.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tailguard_core::error::AgentError> {
//! use tailguard_core::config::AgentConfig;
//!
//! let config = AgentConfig::load("tailguard.toml").await?;
//! let config = AgentConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AgentError, ConfigError};

/// 운영 수집 서버 주소
pub const PROD_COLLECTOR_URL: &str = "https://collector.tailguard.dev/collect";
/// 테스트 수집 서버 주소
pub const TEST_COLLECTOR_URL: &str = "https://collector-test.tailguard.dev/collect";
/// 로컬 개발 수집 서버 주소
pub const DEV_COLLECTOR_URL: &str = "http://localhost:5000/collect";

/// Tailguard 통합 설정
///
/// `tailguard.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집 서버 전송 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// 입력(규칙/크롤링/배치) 설정
    #[serde(default)]
    pub input: InputConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AgentConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AgentError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AgentError> {
        toml::from_str(toml_str).map_err(|e| {
            AgentError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TAILGUARD_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TAILGUARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TAILGUARD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.state_dir, "TAILGUARD_GENERAL_STATE_DIR");
        override_string(&mut self.general.rules_dir, "TAILGUARD_GENERAL_RULES_DIR");

        // Output
        override_string(
            &mut self.output.access_token,
            "TAILGUARD_OUTPUT_ACCESS_TOKEN",
        );
        override_string(&mut self.output.server_key, "TAILGUARD_OUTPUT_SERVER_KEY");
        override_string(
            &mut self.output.environment,
            "TAILGUARD_OUTPUT_ENVIRONMENT",
        );
        override_string(&mut self.output.url, "TAILGUARD_OUTPUT_URL");
        override_string(&mut self.output.proxy, "TAILGUARD_OUTPUT_PROXY");
        override_u64(
            &mut self.output.timeout_secs,
            "TAILGUARD_OUTPUT_TIMEOUT_SECS",
        );

        // Input
        override_bool(&mut self.input.all_rules, "TAILGUARD_INPUT_ALL_RULES");
        override_csv(&mut self.input.rules, "TAILGUARD_INPUT_RULES");
        override_u64(
            &mut self.input.idle_timeout_secs,
            "TAILGUARD_INPUT_IDLE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.input.crawl_interval_secs,
            "TAILGUARD_INPUT_CRAWL_INTERVAL_SECS",
        );
        override_string(
            &mut self.input.default_dead_time,
            "TAILGUARD_INPUT_DEFAULT_DEAD_TIME",
        );
        override_string(
            &mut self.input.default_exclude_files,
            "TAILGUARD_INPUT_DEFAULT_EXCLUDE_FILES",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "TAILGUARD_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "TAILGUARD_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "TAILGUARD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AgentError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.general.state_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.state_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.general.rules_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "general.rules_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        let valid_envs = ["prod", "test", "dev"];
        if !valid_envs.contains(&self.output.environment.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "output.environment".to_owned(),
                reason: format!("must be one of: {}", valid_envs.join(", ")),
            }
            .into());
        }

        if self.output.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.input.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "input.idle_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.input.crawl_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "input.crawl_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "must be greater than 0 when metrics are enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 위치 저장소와 스풀 파일이 놓이는 디렉토리
    pub state_dir: String,
    /// 규칙 YAML 디렉토리
    pub rules_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            state_dir: ".state".to_owned(),
            rules_dir: "/etc/tailguard/rules.d".to_owned(),
        }
    }
}

/// 수집 서버 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 접근 토큰
    pub access_token: String,
    /// 서버 키
    pub server_key: String,
    /// 수집 서버 환경 (prod, test, dev)
    pub environment: String,
    /// 수집 서버 주소 직접 지정 (비어 있으면 environment로 결정)
    pub url: String,
    /// 업스트림 프록시 URL (비어 있으면 직접 연결)
    pub proxy: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            server_key: String::new(),
            environment: "prod".to_owned(),
            url: String::new(),
            proxy: String::new(),
            timeout_secs: 15,
        }
    }
}

impl OutputConfig {
    /// 실제로 사용할 수집 서버 주소를 반환합니다.
    pub fn collector_url(&self) -> &str {
        if !self.url.is_empty() {
            return &self.url;
        }
        match self.environment.to_lowercase().as_str() {
            "dev" => DEV_COLLECTOR_URL,
            "test" => TEST_COLLECTOR_URL,
            _ => PROD_COLLECTOR_URL,
        }
    }
}

/// 입력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// 규칙 디렉토리의 모든 규칙 사용 여부
    pub all_rules: bool,
    /// `all_rules = false`일 때 사용할 규칙 이름 목록
    pub rules: Vec<String>,
    /// 배치 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
    /// 파일 크롤링 주기 (초)
    pub crawl_interval_secs: u64,
    /// 규칙에 deadtime이 없을 때 사용할 기본값 (예: "360h")
    pub default_dead_time: String,
    /// 규칙에 excludefilesregex가 없을 때 사용할 기본값
    pub default_exclude_files: String,
    /// 정적 IP -> 서비스 이름 매핑
    pub ip_services: BTreeMap<String, Vec<String>>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            all_rules: true,
            rules: Vec::new(),
            idle_timeout_secs: 60,
            crawl_interval_secs: 60,
            default_dead_time: "360h".to_owned(),
            default_exclude_files: "((.gz)|(.zip)|(.tar)|(.zip))".to_owned(),
            ip_services: BTreeMap::new(),
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9105,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = AgentConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.state_dir, ".state");
        assert_eq!(config.output.timeout_secs, 15);
        assert_eq!(config.input.idle_timeout_secs, 60);
        assert_eq!(config.input.default_dead_time, "360h");
        assert!(config.input.all_rules);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        AgentConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = AgentConfig::parse("").unwrap();
        assert_eq!(config.output.environment, "prod");
        assert_eq!(config.input.crawl_interval_secs, 60);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[output]
access_token = "abc"
proxy = "http://proxy.local:3128"

[input]
all_rules = false
rules = ["sshd", "nginx"]

[input.ip_services]
"10.0.0.5" = ["db.internal"]
"#;
        let config = AgentConfig::parse(toml).unwrap();
        assert_eq!(config.output.access_token, "abc");
        assert_eq!(config.output.proxy, "http://proxy.local:3128");
        // timeout은 기본값 유지
        assert_eq!(config.output.timeout_secs, 15);
        assert!(!config.input.all_rules);
        assert_eq!(config.input.rules, vec!["sshd", "nginx"]);
        assert_eq!(config.input.ip_services["10.0.0.5"], vec!["db.internal"]);
    }

    #[test]
    fn parse_invalid_toml_fails() {
        let result = AgentConfig::parse("[general\nlog_level = ");
        assert!(matches!(
            result,
            Err(AgentError::Config(ConfigError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = AgentConfig::default();
        config.general.log_level = "verbose".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_idle_timeout() {
        let mut config = AgentConfig::default();
        config.input.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_environment() {
        let mut config = AgentConfig::default();
        config.output.environment = "staging".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn collector_url_follows_environment() {
        let mut output = OutputConfig::default();
        assert_eq!(output.collector_url(), PROD_COLLECTOR_URL);

        output.environment = "DEV".to_owned();
        assert_eq!(output.collector_url(), DEV_COLLECTOR_URL);

        output.environment = "test".to_owned();
        assert_eq!(output.collector_url(), TEST_COLLECTOR_URL);

        output.url = "http://127.0.0.1:8080/collect".to_owned();
        assert_eq!(output.collector_url(), "http://127.0.0.1:8080/collect");
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        // SAFETY: serial 테스트에서만 환경변수를 변경함
        unsafe {
            std::env::set_var("TAILGUARD_OUTPUT_PROXY", "http://10.0.0.1:3128");
            std::env::set_var("TAILGUARD_INPUT_RULES", "sshd, nginx ,");
            std::env::set_var("TAILGUARD_INPUT_IDLE_TIMEOUT_SECS", "30");
        }

        let mut config = AgentConfig::default();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var("TAILGUARD_OUTPUT_PROXY");
            std::env::remove_var("TAILGUARD_INPUT_RULES");
            std::env::remove_var("TAILGUARD_INPUT_IDLE_TIMEOUT_SECS");
        }

        assert_eq!(config.output.proxy, "http://10.0.0.1:3128");
        assert_eq!(config.input.rules, vec!["sshd", "nginx"]);
        assert_eq!(config.input.idle_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn env_override_with_bad_number_is_ignored() {
        unsafe {
            std::env::set_var("TAILGUARD_OUTPUT_TIMEOUT_SECS", "soon");
        }

        let mut config = AgentConfig::default();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var("TAILGUARD_OUTPUT_TIMEOUT_SECS");
        }

        assert_eq!(config.output.timeout_secs, 15);
    }
}

//! 룰 파일 로더 -- YAML 룰 파일을 디스크에서 로드합니다.
//!
//! 룰 디렉토리 내의 `.yml`/`.yaml` 파일을 파일 이름 순으로 스캔하고 파싱합니다.
//! 룰 이름은 소문자로 바꾼 파일 이름(확장자 제외)입니다.
//! 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::types::{RuleConfig, RuleFile};
use crate::config::CollectorConfig;
use crate::error::CollectorError;

const MAX_RULE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 룰 로딩 옵션
#[derive(Debug, Clone)]
pub struct RuleLoadOptions {
    /// 모든 룰 사용 여부
    pub all_rules: bool,
    /// `all_rules = false`일 때 사용할 룰 이름
    pub enabled: Vec<String>,
    /// 룰에 deadtime이 없을 때의 기본값
    pub default_dead_time: String,
    /// 룰에 excludefilesregex가 없을 때의 기본값
    pub default_exclude_files: String,
}

impl Default for RuleLoadOptions {
    fn default() -> Self {
        Self {
            all_rules: true,
            enabled: Vec::new(),
            default_dead_time: "360h".to_owned(),
            default_exclude_files: "((.gz)|(.zip)|(.tar)|(.zip))".to_owned(),
        }
    }
}

impl RuleLoadOptions {
    /// 수집기 설정의 `[input]` 값으로 옵션을 만듭니다.
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            all_rules: config.all_rules,
            enabled: config.rules.clone(),
            default_dead_time: config.default_dead_time.clone(),
            default_exclude_files: config.default_exclude_files.clone(),
        }
    }

    fn is_selected(&self, name: &str) -> bool {
        self.all_rules || self.enabled.iter().any(|r| r.eq_ignore_ascii_case(name))
    }
}

/// 룰 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 디렉토리에서 선택된 모든 룰을 로드합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 사용할 수 있는 룰이 하나도 없는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
        options: &RuleLoadOptions,
    ) -> Result<Vec<RuleConfig>, CollectorError> {
        let dir = dir.as_ref();

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| CollectorError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CollectorError::RuleLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory entry: {e}"),
            })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut rules = Vec::new();
        for path in paths {
            let Some(name) = rule_name(&path) else {
                continue;
            };
            if !options.is_selected(&name) {
                debug!(rule = %name, "rule not enabled, skipping");
                continue;
            }

            match Self::load_file(&path, &name, options).await {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to load rule file, skipping"
                ),
            }
        }

        if rules.is_empty() {
            return Err(CollectorError::RuleLoad {
                path: dir.display().to_string(),
                reason: "no usable rules loaded".to_owned(),
            });
        }

        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        info!(
            dir = %dir.display(),
            count = rules.len(),
            rules = %names.join(", "),
            "loaded rules"
        );

        Ok(rules)
    }

    /// 단일 YAML 파일에서 룰을 로드합니다.
    pub async fn load_file(
        path: impl AsRef<Path>,
        name: &str,
        options: &RuleLoadOptions,
    ) -> Result<RuleConfig, CollectorError> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| CollectorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(CollectorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CollectorError::RuleLoad {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })?;

        Self::parse_yaml(&content, name, options)
    }

    /// YAML 문자열을 파싱하여 룰을 생성합니다.
    ///
    /// `${VAR}` 참조는 파싱 전에 환경변수 값으로 치환됩니다.
    pub fn parse_yaml(
        yaml_str: &str,
        name: &str,
        options: &RuleLoadOptions,
    ) -> Result<RuleConfig, CollectorError> {
        let expanded = expand_env(yaml_str);
        let mut raw: RuleFile =
            serde_yaml::from_str(&expanded).map_err(|e| CollectorError::RuleLoad {
                path: name.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        if raw.dead_time.trim().is_empty() {
            raw.dead_time.clone_from(&options.default_dead_time);
        }
        if raw.exclude_files_regex.is_empty() {
            raw.exclude_files_regex
                .clone_from(&options.default_exclude_files);
        }

        RuleConfig::compile(name, raw)
    }
}

/// 파일 경로에서 룰 이름을 만듭니다 (소문자, 확장자 제외).
pub fn rule_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase)
}

/// `${VAR}` 참조를 환경변수 값으로 치환합니다. 정의되지 않은 변수는 빈 문자열이 됩니다.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                out.push_str(&std::env::var(var).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Go 형식 기간 문자열(`300ms`, `1h30m`, `1.5h`)을 파싱합니다.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_owned());
    }
    if s.starts_with('-') {
        return Err("negative duration".to_owned());
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut total_nanos: f64 = 0.0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration '{s}'"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{s}'"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration '{s}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration '{s}'")),
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

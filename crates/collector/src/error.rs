//! 수집기 에러 타입
//!
//! [`CollectorError`]는 크롤링, 룰 로딩, 배치, 전송 과정에서 발생하는 모든 에러를 표현합니다.
//! `From<CollectorError> for AgentError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use tailguard_core::error::{AgentError, PipelineError};

/// 수집기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 이벤트 시간 파싱 실패
    #[error("time format error: value '{value}' does not match '{format}'")]
    TimeFormat {
        /// 시간 형식 (없으면 자기 기술 형식)
        format: String,
        /// 파싱 대상 값
        value: String,
    },

    /// 위치 저장소 에러
    #[error("state error: {0}")]
    State(String),

    /// 소스 파일 접근 에러
    #[error("source error: {path}: {reason}")]
    Source {
        /// 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 스풀 파일 에러
    #[error("spool error: {path}: {reason}")]
    Spool {
        /// 스풀 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// 수집 서버 전송 에러
    #[error("transport error: {0}")]
    Transport(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<CollectorError> for AgentError {
    fn from(err: CollectorError) -> Self {
        AgentError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

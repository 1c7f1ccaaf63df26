#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AgentError, ConfigError, PipelineError};

// 설정
pub use config::AgentConfig;

// 이벤트
pub use event::{EventsContainer, SecurityEvent};

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`crawler`]: 위치 기반 로그 파일 tailing (glob 확장, 인코딩 감지, 부분 라인 지연)
//! - [`rule`]: YAML 룰 로딩, 사용자 시간 형식, 정규식 매칭
//! - [`dedup`]: (sid, ip, timestamp) 기준 이벤트 중복 제거
//! - [`enricher`]: IP -> 서비스 이름 보강 단계
//! - [`batcher`]: 크기/시간/긴급도 기반 적응형 배치
//! - [`gateway`]: 수집 서버 전송, 실패 봉투 디스크 스풀
//! - [`state`]: 소스별 읽기 위치 저장소
//! - [`platform`]: 파일 식별/공유 읽기/디코딩 플랫폼 추상화
//! - [`encoding`]: BOM 및 텍스트 인코딩 처리
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 수집기 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! FileCrawler -> Enricher -> Batcher -> HttpGateway -> PositionTracker
//!     |              |          |            |
//!  glob + rules   ip map   flush policy   spool on failure
//! ```

pub mod batcher;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod encoding;
pub mod enricher;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod platform;
pub mod rule;
pub mod state;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{CollectorPipeline, CollectorPipelineBuilder};

// 설정
pub use config::{CollectorConfig, CollectorConfigBuilder};

// 에러
pub use error::CollectorError;

// 룰 엔진
pub use rule::{RuleConfig, RuleEngine, RuleLoadOptions, RuleLoader, TimeFormat};

// 워커
pub use batcher::{BatchPolicy, Batcher, FlushTrigger};
pub use crawler::FileCrawler;
pub use enricher::{Enricher, IpServiceResolver, StaticServiceMap};
pub use gateway::{DeliveryOutcome, HttpGateway, ReqwestTransport, SpoolDir, Transport};
pub use state::{PositionTracker, SourceState};

//! 전송 봉투와 서버 응답 스키마

use std::collections::BTreeMap;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tailguard_core::event::{EventsContainer, SecurityEvent};

use crate::config::PROTOCOL_VERSION;

/// "malformed payload" 서버 에러 코드
///
/// 이 코드로 거절된 배치는 재시도해도 계속 거절되므로 전달된 것으로 취급합니다.
pub const ERROR_CODE_MALFORMED: i64 = 1;

/// 수집 서버로 보내는 배치 한 건
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub token: String,
    /// 서버 키
    pub hd: String,
    /// 봉투 생성 시각 (UTC epoch 초)
    pub ult: i64,
    /// 로컬 시간대의 UTC 오프셋 (초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ulto: Option<i32>,
    /// 프로토콜 버전
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SecurityEvent>,
    /// ip -> 서비스 이름 목록
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ipsrvs: BTreeMap<String, Vec<String>>,
}

impl Envelope {
    /// 배치의 이벤트와 ip 서비스 매핑을 모아 봉투를 만듭니다.
    ///
    /// `handshake`가 참이면 프로토콜 버전과 UTC 오프셋을 포함합니다.
    pub fn build(
        token: &str,
        server_key: &str,
        batch: &[EventsContainer],
        handshake: bool,
    ) -> Self {
        let mut envelope = Self {
            token: token.to_owned(),
            hd: server_key.to_owned(),
            ult: Utc::now().timestamp(),
            ..Default::default()
        };

        if handshake {
            envelope.v = Some(PROTOCOL_VERSION.to_owned());
            envelope.ulto = Some(Local::now().offset().local_minus_utc());
        }

        for container in batch {
            envelope.events.extend(container.events.iter().cloned());
            // 같은 ip는 나중 컨테이너의 매핑이 우선
            for (ip, services) in &container.ip_services {
                envelope.ipsrvs.insert(ip.clone(), services.clone());
            }
        }

        envelope
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// 수집 서버 응답
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerResponse {
    /// 실패 응답에서는 생략될 수 있음
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errorcode: Option<i64>,
}

impl ServerResponse {
    pub fn is_malformed_payload(&self) -> bool {
        !self.success && self.errorcode == Some(ERROR_CODE_MALFORMED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(ip: &str, services: &[&str]) -> EventsContainer {
        let mut c = EventsContainer::new("1_1", "/var/log/auth.log");
        c.events.push(SecurityEvent {
            security_id: 7,
            ip: ip.to_owned(),
            timestamp: 100,
            ..Default::default()
        });
        if !services.is_empty() {
            c.ip_services.insert(
                ip.to_owned(),
                services.iter().map(|s| s.to_string()).collect(),
            );
        }
        c
    }

    #[test]
    fn build_concatenates_events_and_merges_services() {
        let batch = vec![
            container("10.0.0.1", &["ssh"]),
            container("10.0.0.2", &[]),
            container("10.0.0.1", &["ssh", "sftp"]),
        ];
        let envelope = Envelope::build("tok", "key", &batch, false);
        assert_eq!(envelope.events.len(), 3);
        assert_eq!(envelope.ipsrvs.len(), 1);
        assert_eq!(
            envelope.ipsrvs["10.0.0.1"],
            vec!["ssh".to_owned(), "sftp".to_owned()]
        );
    }

    #[test]
    fn handshake_fields_only_when_requested() {
        let plain = serde_json::to_value(Envelope::build("t", "k", &[], false)).unwrap();
        assert!(plain.get("v").is_none());
        assert!(plain.get("ulto").is_none());
        assert!(plain.get("events").is_none());

        let first = serde_json::to_value(Envelope::build("t", "k", &[], true)).unwrap();
        assert_eq!(first["v"], PROTOCOL_VERSION);
        assert!(first["ulto"].is_i64());
        assert_eq!(first["token"], "t");
        assert_eq!(first["hd"], "k");
    }

    #[test]
    fn local_time_is_epoch_seconds() {
        let before = Utc::now().timestamp();
        let json = serde_json::to_value(Envelope::build("t", "k", &[], false)).unwrap();
        assert!(json["ult"].is_i64(), "ult must be a number, got {}", json["ult"]);
        let ult = json["ult"].as_i64().unwrap();
        assert!(ult >= before && ult <= Utc::now().timestamp());
    }

    #[test]
    fn response_parsing() {
        let ok: ServerResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(ok.success);
        assert!(!ok.is_malformed_payload());

        let malformed: ServerResponse =
            serde_json::from_str(r#"{"success":false,"error":"bad","errorcode":1}"#).unwrap();
        assert!(malformed.is_malformed_payload());

        let other: ServerResponse =
            serde_json::from_str(r#"{"success":false,"errorcode":5}"#).unwrap();
        assert!(!other.is_malformed_payload());

        // success=false가 생략된 응답
        let omitted: ServerResponse =
            serde_json::from_str(r#"{"error":"bad json","errorcode":1}"#).unwrap();
        assert!(!omitted.success);
        assert!(omitted.is_malformed_payload());
    }
}

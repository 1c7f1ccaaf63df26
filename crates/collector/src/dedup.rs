//! 같은 사이클 내 보안 이벤트 중복 제거
//!
//! 한 줄이 여러 룰이나 여러 필터에 걸리면 의미상 같은 이벤트가 여러 번 만들어집니다.
//! (security id, ip, timestamp)가 같은 이벤트는 처음 나온 것만 남깁니다.

use std::collections::HashSet;

use tailguard_core::event::{EventsContainer, SecurityEvent};

/// 순서를 유지하며 중복 이벤트를 제거합니다.
pub fn dedupe(events: Vec<SecurityEvent>) -> Vec<SecurityEvent> {
    if events.len() < 2 {
        return events;
    }

    let mut seen: HashSet<(u32, String, i64)> = HashSet::with_capacity(events.len());
    events
        .into_iter()
        .filter(|event| seen.insert((event.security_id, event.ip.clone(), event.timestamp)))
        .collect()
}

/// 컨테이너의 이벤트 목록에서 중복을 제거합니다.
pub fn dedupe_container(container: &mut EventsContainer) {
    let events = std::mem::take(&mut container.events);
    container.events = dedupe(events);
}

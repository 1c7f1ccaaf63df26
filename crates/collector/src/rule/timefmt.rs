//! 이벤트 시간 파싱 -- 토큰 기반 사용자 형식과 자기 기술 형식
//!
//! # 토큰
//! | 토큰 | 의미 | 예 |
//! |------|------|----|
//! | `YYYY` / `YY` | 연도 | 2006 / 06 |
//! | `MMMM` / `MMM` | 월 이름 | January / Jan |
//! | `MM` / `M` | 월 숫자 | 01 / 1 |
//! | `DDDD` / `DDD` | 요일 이름 (검증만, 날짜와 대조하지 않음) | Monday / Mon |
//! | `DD` / `D` | 일 | 02 / 2 |
//! | `hh` / `h` | 시 (24시간 / 12시간) | 15 / 03 |
//! | `mm` / `ss` | 분 / 초 | 04 / 05 |
//! | `pm` | AM/PM | PM |
//! | `ZZZZ` / `ZZZ` / `ZZ` | 시간대 | -0700 / MST / Z07:00 |
//!
//! 그 외 문자는 리터럴이며, 연속된 공백은 하나 이상의 공백과 일치합니다.
//! 연도 토큰이 없으면 현재 UTC 연도를 사용하고, 시간대 토큰이 없으면 로컬 시간대로 해석합니다.

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::CollectorError;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// 형식 토큰이 나타내는 시간 구성요소
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Year4,
    Year2,
    MonthName,
    MonthAbbr,
    Month,
    WeekdayName,
    WeekdayAbbr,
    Day,
    Hour24,
    Hour12,
    Minute,
    Second,
    Fraction,
    Meridiem,
    OffsetNumeric,
    ZoneAbbr,
    OffsetColon,
}

// 긴 토큰이 먼저 와야 한다
const TOKENS: &[(&str, Component, &str)] = &[
    ("YYYY", Component::Year4, r"\d{4}"),
    ("YY", Component::Year2, r"\d{2}"),
    ("MMMM", Component::MonthName, r"[A-Za-z]+"),
    ("MMM", Component::MonthAbbr, r"[A-Za-z]{3}"),
    ("MM", Component::Month, r"\d{2}"),
    ("M", Component::Month, r"\d{1,2}"),
    ("DDDD", Component::WeekdayName, r"[A-Za-z]+"),
    ("DDD", Component::WeekdayAbbr, r"[A-Za-z]{3}"),
    ("DD", Component::Day, r"\d{2}"),
    ("D", Component::Day, r"\d{1,2}"),
    ("hh", Component::Hour24, r"\d{1,2}"),
    ("h", Component::Hour12, r"\d{2}"),
    ("mm", Component::Minute, r"\d{2}"),
    ("ss", Component::Second, r"\d{2}"),
    ("pm", Component::Meridiem, r"[AaPp][Mm]"),
    ("ZZZZ", Component::OffsetNumeric, r"[+-]\d{4}"),
    ("ZZZ", Component::ZoneAbbr, r"[A-Za-z]{3,5}"),
    ("ZZ", Component::OffsetColon, r"Z|[+-]\d{2}:\d{2}"),
];

/// 컴파일된 사용자 시간 형식
#[derive(Debug, Clone)]
pub struct TimeFormat {
    format: String,
    regex: Regex,
    components: Vec<(String, Component)>,
    has_year: bool,
}

impl TimeFormat {
    /// 형식 문자열을 정규식으로 컴파일합니다.
    pub fn compile(format: &str) -> Result<Self, CollectorError> {
        let mut pattern = String::from("^");
        let mut components = Vec::new();
        let mut rest = format;

        while !rest.is_empty() {
            if let Some((token, component, expr)) =
                TOKENS.iter().find(|(token, _, _)| rest.starts_with(token))
            {
                let group = format!("c{}", components.len());
                pattern.push_str(&format!("(?P<{group}>{expr})"));
                components.push((group, *component));

                if *component == Component::Second {
                    let group = format!("c{}", components.len());
                    pattern.push_str(&format!(r"(?:[.,](?P<{group}>\d+))?"));
                    components.push((group, Component::Fraction));
                }
                rest = &rest[token.len()..];
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            if ch.is_whitespace() {
                pattern.push_str(r"\s+");
                rest = rest.trim_start();
            } else {
                pattern.push_str(&regex::escape(&ch.to_string()));
                rest = &rest[ch.len_utf8()..];
            }
        }
        pattern.push('$');

        let has_year = components
            .iter()
            .any(|(_, c)| matches!(c, Component::Year4 | Component::Year2));

        Ok(Self {
            format: format.to_owned(),
            regex: Regex::new(&pattern)?,
            components,
            has_year,
        })
    }

    /// 원본 형식 문자열
    pub fn as_str(&self) -> &str {
        &self.format
    }

    /// 값을 파싱해 UTC epoch seconds를 반환합니다.
    pub fn parse(&self, value: &str) -> Result<i64, CollectorError> {
        self.parse_with_year(value, Utc::now().year())
            .map(|dt| dt.timestamp())
    }

    /// 연도 토큰이 없을 때 사용할 연도를 지정해 파싱합니다.
    pub fn parse_with_year(
        &self,
        value: &str,
        default_year: i32,
    ) -> Result<DateTime<FixedOffset>, CollectorError> {
        let err = || CollectorError::TimeFormat {
            format: self.format.clone(),
            value: value.to_owned(),
        };

        let caps = self.regex.captures(value.trim()).ok_or_else(err)?;

        let mut year = if self.has_year { 0 } else { default_year };
        let mut month = 1u32;
        let mut day = 1u32;
        let mut hour = 0u32;
        let mut hour12: Option<u32> = None;
        let mut pm: Option<bool> = None;
        let mut minute = 0u32;
        let mut second = 0u32;
        let mut nanos = 0u32;
        let mut offset: Option<FixedOffset> = None;

        for (group, component) in &self.components {
            let Some(m) = caps.name(group) else {
                continue;
            };
            let text = m.as_str();
            match component {
                Component::Year4 => year = text.parse().map_err(|_| err())?,
                Component::Year2 => {
                    let yy: i32 = text.parse().map_err(|_| err())?;
                    year = if yy >= 69 { 1900 + yy } else { 2000 + yy };
                }
                Component::MonthName => month = month_from_name(text, false).ok_or_else(err)?,
                Component::MonthAbbr => month = month_from_name(text, true).ok_or_else(err)?,
                Component::Month => month = text.parse().map_err(|_| err())?,
                Component::WeekdayName | Component::WeekdayAbbr => {
                    let abbreviated = *component == Component::WeekdayAbbr;
                    if !weekday_known(text, abbreviated) {
                        return Err(err());
                    }
                }
                Component::Day => day = text.parse().map_err(|_| err())?,
                Component::Hour24 => hour = text.parse().map_err(|_| err())?,
                Component::Hour12 => hour12 = Some(text.parse().map_err(|_| err())?),
                Component::Minute => minute = text.parse().map_err(|_| err())?,
                Component::Second => second = text.parse().map_err(|_| err())?,
                Component::Fraction => nanos = fraction_to_nanos(text),
                Component::Meridiem => pm = Some(text.eq_ignore_ascii_case("pm")),
                Component::OffsetNumeric | Component::OffsetColon => {
                    offset = Some(parse_offset(text).ok_or_else(err)?)
                }
                Component::ZoneAbbr => offset = Some(zone_abbr_offset(text).ok_or_else(err)?),
            }
        }

        if let Some(h) = hour12 {
            if h > 12 {
                return Err(err());
            }
            hour = match pm {
                Some(true) if h < 12 => h + 12,
                Some(false) if h == 12 => 0,
                _ => h,
            };
        }

        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_nano_opt(hour, minute, second, nanos))
            .ok_or_else(err)?;

        match offset {
            Some(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(err),
            None => local_to_fixed(&naive).ok_or_else(err),
        }
    }
}

/// 형식이 지정되지 않은 경우의 시간 파싱
///
/// RFC 3339를 먼저 시도하고, 실패하면 `YYYY-MM-DDThh:mm:ss`(또는 공백 구분)를
/// 로컬 시간으로 해석합니다. 그 외 형식은 지원하지 않습니다.
pub fn parse_self_describing(value: &str) -> Result<i64, CollectorError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }

    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            if let Some(dt) = local_to_fixed(&naive) {
                return Ok(dt.timestamp());
            }
        }
    }

    Err(CollectorError::TimeFormat {
        format: String::new(),
        value: value.to_owned(),
    })
}

fn local_to_fixed(naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

fn month_from_name(text: &str, abbreviated: bool) -> Option<u32> {
    let lower = text.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|name| if abbreviated { name[..3] == lower } else { *name == lower })
        .map(|i| i as u32 + 1)
}

fn weekday_known(text: &str, abbreviated: bool) -> bool {
    let lower = text.to_ascii_lowercase();
    WEEKDAYS
        .iter()
        .any(|name| if abbreviated { name[..3] == lower } else { *name == lower })
}

fn fraction_to_nanos(text: &str) -> u32 {
    let digits: String = text.chars().take(9).collect();
    let scale = 10u32.pow(9 - digits.len() as u32);
    digits.parse::<u32>().map(|v| v * scale).unwrap_or(0)
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = match text.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = text[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// 알 수 없는 약어는 UTC 오프셋으로 취급한다
fn zone_abbr_offset(abbr: &str) -> Option<FixedOffset> {
    let hours = match abbr.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        "CET" => 1,
        "CEST" | "EET" => 2,
        "EEST" | "MSK" => 3,
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600)
}

//! 소스 텍스트 인코딩 판별 및 디코딩
//!
//! 오프셋은 항상 디코딩 전 원시 바이트 기준입니다.
//! UTF-16/32처럼 코드 유닛이 여러 바이트인 인코딩은 인코딩된 LF 유닛에서 줄을 나눕니다.
//!
//! # 판별 순서
//! 1. 룰이 지정한 인코딩 이름 (알 수 없는 이름이면 자동 판별로 대체)
//! 2. BOM (UTF-8, UTF-16 LE/BE, UTF-32 LE/BE)
//! 3. 앞부분 [`UTF8_PROBE_LEN`] 바이트가 유효한 UTF-8이면 UTF-8
//! 4. 플랫폼 기본값 (Windows는 windows-1252, 그 외 UTF-8)

use encoding_rs::Encoding;

/// UTF-8 판별 시 검사하는 최대 바이트 수
pub const UTF8_PROBE_LEN: usize = 128 * 1024;

/// 소스 텍스트 인코딩
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    /// `encoding_rs`가 지원하는 레거시 코드 페이지
    Legacy(&'static Encoding),
}

impl TextEncoding {
    /// 인코딩 이름(WHATWG 레이블)으로 조회합니다.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "utf-32" | "utf-32le" | "utf32" => return Some(Self::Utf32Le),
            "utf-32be" => return Some(Self::Utf32Be),
            _ => {}
        }

        let encoding = Encoding::for_label(normalized.as_bytes())?;
        Some(if encoding == encoding_rs::UTF_8 {
            Self::Utf8
        } else if encoding == encoding_rs::UTF_16LE {
            Self::Utf16Le
        } else if encoding == encoding_rs::UTF_16BE {
            Self::Utf16Be
        } else {
            Self::Legacy(encoding)
        })
    }

    /// 플랫폼 기본 인코딩
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::Legacy(encoding_rs::WINDOWS_1252)
        } else {
            Self::Utf8
        }
    }

    /// BOM을 검사해 인코딩과 BOM 길이를 반환합니다.
    pub fn sniff_bom(head: &[u8]) -> Option<(Self, usize)> {
        // UTF-32LE BOM은 UTF-16LE BOM으로 시작하므로 먼저 검사
        if head.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
            Some((Self::Utf32Le, 4))
        } else if head.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
            Some((Self::Utf32Be, 4))
        } else if head.starts_with(&[0xEF, 0xBB, 0xBF]) {
            Some((Self::Utf8, 3))
        } else if head.starts_with(&[0xFF, 0xFE]) {
            Some((Self::Utf16Le, 2))
        } else if head.starts_with(&[0xFE, 0xFF]) {
            Some((Self::Utf16Be, 2))
        } else {
            None
        }
    }

    /// 파일 앞부분으로 인코딩을 자동 판별합니다.
    pub fn detect(head: &[u8]) -> Self {
        if let Some((encoding, _)) = Self::sniff_bom(head) {
            return encoding;
        }

        let probe = &head[..head.len().min(UTF8_PROBE_LEN)];
        match std::str::from_utf8(probe) {
            Ok(_) => Self::Utf8,
            // 검사 구간 끝에서 잘린 멀티바이트 문자는 유효한 것으로 본다
            Err(e) if e.error_len().is_none() => Self::Utf8,
            Err(_) => Self::platform_default(),
        }
    }

    /// 룰 힌트가 있으면 그것을, 없거나 알 수 없으면 자동 판별 결과를 사용합니다.
    pub fn resolve(hint: Option<&str>, head: &[u8]) -> Self {
        match hint.filter(|h| !h.trim().is_empty()) {
            Some(label) => match Self::from_label(label) {
                Some(encoding) => encoding,
                None => {
                    tracing::warn!(encoding = label, "unsupported encoding, falling back to autodetect");
                    Self::detect(head)
                }
            },
            None => Self::detect(head),
        }
    }

    /// 코드 유닛 크기 (바이트)
    pub fn unit_width(&self) -> usize {
        match self {
            Self::Utf16Le | Self::Utf16Be => 2,
            Self::Utf32Le | Self::Utf32Be => 4,
            Self::Utf8 | Self::Legacy(_) => 1,
        }
    }

    /// 인코딩된 LF 유닛
    pub fn newline(&self) -> &'static [u8] {
        match self {
            Self::Utf16Le => &[0x0A, 0x00],
            Self::Utf16Be => &[0x00, 0x0A],
            Self::Utf32Le => &[0x0A, 0x00, 0x00, 0x00],
            Self::Utf32Be => &[0x00, 0x00, 0x00, 0x0A],
            Self::Utf8 | Self::Legacy(_) => b"\n",
        }
    }

    /// 이 인코딩의 BOM 길이 (`head`가 BOM으로 시작할 때만)
    pub fn bom_len(&self, head: &[u8]) -> usize {
        match Self::sniff_bom(head) {
            Some((encoding, len)) if encoding == *self => len,
            _ => 0,
        }
    }

    /// 코드 유닛 경계에 정렬된 첫 LF 유닛의 위치를 찾습니다.
    pub fn find_newline(&self, buf: &[u8]) -> Option<usize> {
        let width = self.unit_width();
        let newline = self.newline();
        if width == 1 {
            return buf.iter().position(|b| *b == b'\n');
        }
        buf.chunks_exact(width)
            .position(|unit| unit == newline)
            .map(|i| i * width)
    }

    /// 한 줄(LF 제외)을 UTF-8 문자열로 디코딩하고 끝의 CR을 제거합니다.
    pub fn decode_line(&self, bytes: &[u8]) -> String {
        let mut text = self.decode(bytes);
        if text.ends_with('\r') {
            text.pop();
        }
        text
    }

    /// 바이트를 UTF-8 문자열로 디코딩합니다. 잘못된 시퀀스는 U+FFFD로 대체됩니다.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le => encoding_rs::UTF_16LE
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
            Self::Utf16Be => encoding_rs::UTF_16BE
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
            Self::Utf32Le => decode_utf32(bytes, u32::from_le_bytes),
            Self::Utf32Be => decode_utf32(bytes, u32::from_be_bytes),
            Self::Legacy(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}

// encoding_rs는 UTF-32를 지원하지 않는다
fn decode_utf32(bytes: &[u8], to_u32: fn([u8; 4]) -> u32) -> String {
    let mut out = String::with_capacity(bytes.len() / 4);
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let unit = to_u32([chunk[0], chunk[1], chunk[2], chunk[3]]);
        out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    if !chunks.remainder().is_empty() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn bom_sniff_prefers_utf32_over_utf16() {
        let head = [0xFF, 0xFE, 0x00, 0x00, b'a', 0, 0, 0];
        assert_eq!(
            TextEncoding::sniff_bom(&head),
            Some((TextEncoding::Utf32Le, 4))
        );
        assert_eq!(
            TextEncoding::sniff_bom(&[0xFF, 0xFE, b'a', 0]),
            Some((TextEncoding::Utf16Le, 2))
        );
        assert_eq!(
            TextEncoding::sniff_bom(&[0xEF, 0xBB, 0xBF, b'x']),
            Some((TextEncoding::Utf8, 3))
        );
        assert_eq!(TextEncoding::sniff_bom(b"plain"), None);
    }

    #[test]
    fn detect_valid_utf8_without_bom() {
        assert_eq!(TextEncoding::detect("héllo\n".as_bytes()), TextEncoding::Utf8);
    }

    #[test]
    fn detect_truncated_multibyte_at_probe_end_is_utf8() {
        let bytes = "é".as_bytes();
        assert_eq!(TextEncoding::detect(&bytes[..1]), TextEncoding::Utf8);
    }

    #[test]
    fn detect_invalid_utf8_falls_back_to_platform_default() {
        let head = [b'a', 0xE9, b' ', b'b'];
        assert_eq!(TextEncoding::detect(&head), TextEncoding::platform_default());
    }

    #[test]
    fn from_label_maps_known_names() {
        assert_eq!(TextEncoding::from_label("UTF-8"), Some(TextEncoding::Utf8));
        assert_eq!(TextEncoding::from_label("utf-16le"), Some(TextEncoding::Utf16Le));
        assert_eq!(TextEncoding::from_label("utf-32be"), Some(TextEncoding::Utf32Be));
        assert_eq!(
            TextEncoding::from_label("windows-1251"),
            Some(TextEncoding::Legacy(encoding_rs::WINDOWS_1251))
        );
        assert_eq!(TextEncoding::from_label("klingon"), None);
    }

    #[test]
    fn resolve_with_unknown_hint_autodetects() {
        let head = utf16le("\u{feff}abc");
        assert_eq!(
            TextEncoding::resolve(Some("klingon"), &head),
            TextEncoding::Utf16Le
        );
        assert_eq!(TextEncoding::resolve(Some("  "), b"abc"), TextEncoding::Utf8);
    }

    #[test]
    fn find_newline_is_unit_aligned() {
        // 'Ċ' (U+010A)의 LE 인코딩은 0x0A 0x01 이므로 LF로 오인하면 안 됨
        let mut buf = utf16le("\u{010A}x");
        buf.extend(utf16le("\n"));
        let pos = TextEncoding::Utf16Le.find_newline(&buf).unwrap();
        assert_eq!(pos, 4);

        // 홀수 위치의 0x0A 0x00 조합도 무시
        let buf = [0x41, 0x0A, 0x00, 0x42, 0x0A, 0x00];
        assert_eq!(TextEncoding::Utf16Le.find_newline(&buf), Some(4));
    }

    #[test]
    fn decode_line_strips_carriage_return() {
        assert_eq!(TextEncoding::Utf8.decode_line(b"abc\r"), "abc");
        let bytes = utf16le("zażółć\r");
        assert_eq!(TextEncoding::Utf16Le.decode_line(&bytes), "zażółć");
    }

    #[test]
    fn decode_utf32_be() {
        let bytes: Vec<u8> = "hi€"
            .chars()
            .flat_map(|c| (c as u32).to_be_bytes())
            .collect();
        assert_eq!(TextEncoding::Utf32Be.decode(&bytes), "hi€");
    }

    #[test]
    fn decode_legacy_code_page() {
        let encoding = TextEncoding::Legacy(encoding_rs::WINDOWS_1252);
        assert_eq!(encoding.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }
}

//! 플랫폼별 파일 식별/공유 읽기/디코딩 기능
//!
//! 크롤러는 [`SourcePlatform`] trait에만 의존하고,
//! 실제 구현은 컴파일 대상 플랫폼에 따라 [`NativePlatform`]이 선택합니다.

use std::fs::{File, Metadata};
use std::io;
use std::path::Path;

use crate::encoding::TextEncoding;

/// 파일 소스 접근 기능
pub trait SourcePlatform: Send + Sync {
    /// 경로와 무관한 안정적인 파일 식별자를 반환합니다.
    ///
    /// 로테이션으로 같은 경로에 새 파일이 생기면 다른 값이 나와야 합니다.
    fn resolve_identity(&self, path: &Path, metadata: &Metadata) -> io::Result<String>;

    /// 다른 프로세스의 쓰기를 막지 않는 읽기 전용 핸들을 엽니다.
    fn open_shared_read(&self, path: &Path) -> io::Result<File>;

    /// 한 줄 분량의 원시 바이트를 UTF-8로 디코딩합니다.
    fn decode_to_utf8(&self, encoding: TextEncoding, bytes: &[u8]) -> String {
        encoding.decode_line(bytes)
    }
}

/// 현재 플랫폼의 기본 구현
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePlatform;

#[cfg(unix)]
impl SourcePlatform for NativePlatform {
    fn resolve_identity(&self, _path: &Path, metadata: &Metadata) -> io::Result<String> {
        use std::os::unix::fs::MetadataExt;
        Ok(format!("{}_{}", metadata.ino(), metadata.dev()))
    }

    fn open_shared_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }
}

#[cfg(windows)]
impl SourcePlatform for NativePlatform {
    fn resolve_identity(&self, path: &Path, metadata: &Metadata) -> io::Result<String> {
        // 안정화된 파일 인덱스 API가 없어 정규화 경로 + 생성 시각을 사용
        let canonical = std::fs::canonicalize(path)?;
        let created = metadata
            .created()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Ok(format!("{}_{}", canonical.display(), created))
    }

    fn open_shared_read(&self, path: &Path) -> io::Result<File> {
        use std::os::windows::fs::OpenOptionsExt;
        // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE
        std::fs::OpenOptions::new()
            .read(true)
            .share_mode(0x7)
            .open(path)
    }
}

#[cfg(not(any(unix, windows)))]
impl SourcePlatform for NativePlatform {
    fn resolve_identity(&self, path: &Path, _metadata: &Metadata) -> io::Result<String> {
        Ok(std::fs::canonicalize(path)?.display().to_string())
    }

    fn open_shared_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }
}

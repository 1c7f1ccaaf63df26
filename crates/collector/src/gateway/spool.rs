//! 전송 실패 봉투의 디스크 스풀
//!
//! 파일 이름은 `.net_<unix-nanos>` (20자리 0 채움)이므로 이름순 정렬이 곧 생성순입니다.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::config::SPOOL_FILE_PREFIX;
use crate::error::CollectorError;

/// 스풀 디렉토리
#[derive(Debug, Clone)]
pub struct SpoolDir {
    dir: PathBuf,
}

impl SpoolDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// 스풀 파일 목록 (오래된 것부터)
    ///
    /// 디렉토리가 없으면 빈 목록입니다.
    pub async fn list(&self) -> Result<Vec<PathBuf>, CollectorError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.error(&self.dir, e))?
        {
            let is_spool = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(SPOOL_FILE_PREFIX));
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if is_spool && is_file {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// 봉투 바이트를 새 스풀 파일로 기록하고 경로를 반환합니다.
    pub async fn write(&self, body: &[u8]) -> Result<PathBuf, CollectorError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.error(&self.dir, e))?;

        let mut stamp = Utc::now()
            .timestamp_nanos_opt()
            .map_or(0, |nanos| nanos.max(0) as u64);
        loop {
            let path = self.dir.join(format!("{SPOOL_FILE_PREFIX}{stamp:020}"));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    use tokio::io::AsyncWriteExt;
                    file.write_all(body)
                        .await
                        .map_err(|e| self.error(&path, e))?;
                    file.flush().await.map_err(|e| self.error(&path, e))?;
                    debug!(path = %path.display(), bytes = body.len(), "envelope spooled");
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(self.error(&path, e)),
            }
        }
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, CollectorError> {
        tokio::fs::read(path).await.map_err(|e| self.error(path, e))
    }

    pub async fn remove(&self, path: &Path) -> Result<(), CollectorError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| self.error(path, e))
    }

    fn error(&self, path: &Path, e: std::io::Error) -> CollectorError {
        CollectorError::Spool {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_dir_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let spool = SpoolDir::new(tmp.path().join("absent"));
        assert!(spool.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_list_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let spool = SpoolDir::new(tmp.path().join("spool"));

        let first = spool.write(b"one").await.unwrap();
        let second = spool.write(b"two").await.unwrap();
        assert_ne!(first, second);

        let listed = spool.list().await.unwrap();
        assert_eq!(listed, vec![first.clone(), second.clone()]);
        assert_eq!(spool.read(&first).await.unwrap(), b"one");

        spool.remove(&first).await.unwrap();
        assert_eq!(spool.list().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".tailguard-state"), "[]").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        let spool = SpoolDir::new(tmp.path());
        spool.write(b"{}").await.unwrap();

        let listed = spool.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        let name = listed[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(SPOOL_FILE_PREFIX));
        assert_eq!(name.len(), SPOOL_FILE_PREFIX.len() + 20);
    }
}

//! Platform adapter supplied by the host
//!
//! The host hands the SDK one [`PlatformAdapter`] at initialization and
//! must keep it valid for the SDK's lifetime. File and secure-store access,
//! clock, memory pressure, and optional download/extraction hooks all go
//! through it so the core stays portable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ErrorCode, Result, SdkError};
use crate::traits::adapter::DownloadStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Host memory snapshot used by the pressure handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Host-provided platform services.
pub trait PlatformAdapter: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn file_exists(&self, path: &Path) -> bool;

    fn file_read(&self, path: &Path) -> Result<Vec<u8>>;

    fn file_write(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn file_delete(&self, path: &Path) -> Result<()>;

    /// Credential store access; keys are namespaced by the SDK.
    fn secure_get(&self, key: &str) -> Result<Option<String>>;

    fn secure_set(&self, key: &str, value: &str) -> Result<()>;

    fn secure_delete(&self, key: &str) -> Result<()>;

    /// Monotonic-enough wall clock in milliseconds.
    fn now_ms(&self) -> u64;

    fn memory_info(&self) -> MemoryInfo;

    /// Host downloader override; `None` uses the SDK's HTTP strategy.
    fn http_download(&self) -> Option<Arc<dyn DownloadStrategy>> {
        None
    }

    /// Extract an archive, returning the extracted root directory.
    fn extract_archive(&self, archive: &Path, dest: &Path) -> Result<PathBuf> {
        let _ = (archive, dest);
        Err(SdkError::new(
            ErrorCode::ExtractionFailed,
            "archive extraction not supported by this platform adapter",
        ))
    }
}

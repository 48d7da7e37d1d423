//! Native platform adapter for desktop hosts
//!
//! Suitable default for tests and desktop apps. Mobile and embedded hosts
//! supply their own [`PlatformAdapter`] with real keychain and memory
//! integration; the adapter must stay valid for the SDK's lifetime.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use edgekit_core::{LogLevel, MemoryInfo, PlatformAdapter, Result};

/// Standard-library-backed platform adapter.
///
/// The secure store is process-memory only; hosts that need durable
/// credentials must bring a keychain-backed adapter.
#[derive(Default)]
pub struct StdPlatform {
    secure: Mutex<HashMap<String, String>>,
}

impl StdPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlatformAdapter for StdPlatform {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "edgekit::host", "{message}"),
            LogLevel::Info => tracing::info!(target: "edgekit::host", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "edgekit::host", "{message}"),
            LogLevel::Error => tracing::error!(target: "edgekit::host", "{message}"),
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn file_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    fn file_delete(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn secure_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.secure.lock().get(key).cloned())
    }

    fn secure_set(&self, key: &str, value: &str) -> Result<()> {
        self.secure.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn secure_delete(&self, key: &str) -> Result<()> {
        self.secure.lock().remove(key);
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn memory_info(&self) -> MemoryInfo {
        #[cfg(target_os = "linux")]
        {
            if let Some(info) = read_proc_meminfo() {
                return info;
            }
        }
        // Unknown host: report plenty so pressure eviction stays off.
        MemoryInfo {
            total_bytes: u64::MAX,
            available_bytes: u64::MAX,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_proc_meminfo() -> Option<MemoryInfo> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "MemTotal:" => total = parts.next()?.parse::<u64>().ok(),
            "MemAvailable:" => available = parts.next()?.parse::<u64>().ok(),
            _ => {}
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }
    Some(MemoryInfo {
        total_bytes: total? * 1024,
        available_bytes: available? * 1024,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let platform = StdPlatform::new();
        let path = dir.path().join("nested/file.bin");

        assert!(!platform.file_exists(&path));
        platform.file_write(&path, b"data").unwrap();
        assert!(platform.file_exists(&path));
        assert_eq!(platform.file_read(&path).unwrap(), b"data");
        platform.file_delete(&path).unwrap();
        assert!(!platform.file_exists(&path));
    }

    #[test]
    fn test_secure_store() {
        let platform = StdPlatform::new();
        assert!(platform.secure_get("k").unwrap().is_none());
        platform.secure_set("k", "v").unwrap();
        assert_eq!(platform.secure_get("k").unwrap().as_deref(), Some("v"));
        platform.secure_delete("k").unwrap();
        assert!(platform.secure_get("k").unwrap().is_none());
    }

    #[test]
    fn test_memory_info_is_populated() {
        let info = StdPlatform::new().memory_info();
        assert!(info.total_bytes > 0);
        assert!(info.available_bytes > 0);
    }
}

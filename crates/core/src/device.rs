//! Device identity stamped on assignment requests and telemetry payloads

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SDK version reported to backend endpoints.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity of the device running the SDK.
///
/// Captured once at startup and persisted to the `device_info` table so the
/// id survives restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable random id, generated on first launch
    pub device_id: String,
    /// Coarse device class ("desktop", "phone", "tablet", "embedded")
    pub device_type: String,
    /// Operating system family ("linux", "macos", "windows", "ios", "android")
    pub platform: String,
    pub sdk_version: String,
}

impl DeviceInfo {
    /// Detect the current host. The device id is freshly generated; callers
    /// that already persisted one should use [`DeviceInfo::with_id`].
    pub fn detect() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(device_id: String) -> Self {
        Self {
            device_id,
            device_type: "desktop".to_string(),
            platform: std::env::consts::OS.to_string(),
            sdk_version: SDK_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_populates_platform() {
        let info = DeviceInfo::detect();
        assert!(!info.device_id.is_empty());
        assert!(!info.platform.is_empty());
        assert_eq!(info.sdk_version, SDK_VERSION);
    }

    #[test]
    fn test_with_id_is_stable() {
        let info = DeviceInfo::with_id("abc".into());
        assert_eq!(info.device_id, "abc");
    }
}

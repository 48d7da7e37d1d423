//! Error and context framework
//!
//! Every fallible operation in the SDK returns [`SdkError`], which carries a
//! stable machine-readable [`ErrorCode`], a derived [`ErrorCategory`], an
//! optional wrapped cause, and capture-site [`ErrorContext`]. Errors crossing
//! the public boundary are mapped down to the much smaller [`PublicError`]
//! surface; the rich context stays available through the last-error accessor
//! on the SDK facade.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convenience result alias used across all EdgeKit crates.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Coarse error grouping, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Initialization,
    Model,
    Generation,
    Network,
    Storage,
    Memory,
    Hardware,
    Validation,
    Authentication,
    Component,
    Framework,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialization => "initialization",
            Self::Model => "model",
            Self::Generation => "generation",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Memory => "memory",
            Self::Hardware => "hardware",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Component => "component",
            Self::Framework => "framework",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Stable machine-readable error identifiers.
///
/// The string form (`as_str`) is part of the telemetry wire contract and
/// must never change for an existing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // initialization
    NotInitialized,
    AlreadyInitialized,
    InvalidConfig,
    ComponentInitFailed,
    // model
    ModelNotFound,
    UnsupportedFormat,
    ChecksumMismatch,
    IncompatibleFramework,
    UnsupportedModality,
    DownloadFailed,
    ExtractionFailed,
    AdapterNotFound,
    ServiceInitFailed,
    // generation
    GenerationFailed,
    GenerationTimeout,
    StreamingNotSupported,
    ContextLengthExceeded,
    Cancelled,
    // network
    NetworkUnavailable,
    NetworkTimeout,
    Unauthorized,
    Forbidden,
    HttpError,
    NetworkValidationFailed,
    // storage
    DiskFull,
    IoError,
    CorruptDatabase,
    // memory
    OutOfMemory,
    ModelTooLarge,
    // hardware
    AcceleratorUnavailable,
    ThermalThrottled,
    // authentication
    InvalidApiKey,
    ExpiredToken,
    AuthenticationFailed,
    // component
    ComponentNotReady,
    InvalidState,
    // framework
    FrameworkNotAvailable,
    LoadFailed,
    // validation
    ValidationFailed,
    // fallback
    Unknown,
}

impl ErrorCode {
    /// Stable snake_case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::InvalidConfig => "invalid_config",
            Self::ComponentInitFailed => "component_init_failed",
            Self::ModelNotFound => "model_not_found",
            Self::UnsupportedFormat => "unsupported_format",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::IncompatibleFramework => "incompatible_framework",
            Self::UnsupportedModality => "unsupported_modality",
            Self::DownloadFailed => "download_failed",
            Self::ExtractionFailed => "extraction_failed",
            Self::AdapterNotFound => "adapter_not_found",
            Self::ServiceInitFailed => "service_init_failed",
            Self::GenerationFailed => "generation_failed",
            Self::GenerationTimeout => "generation_timeout",
            Self::StreamingNotSupported => "streaming_not_supported",
            Self::ContextLengthExceeded => "context_length_exceeded",
            Self::Cancelled => "cancelled",
            Self::NetworkUnavailable => "network_unavailable",
            Self::NetworkTimeout => "network_timeout",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::HttpError => "http_error",
            Self::NetworkValidationFailed => "network_validation_failed",
            Self::DiskFull => "disk_full",
            Self::IoError => "io_error",
            Self::CorruptDatabase => "corrupt_database",
            Self::OutOfMemory => "out_of_memory",
            Self::ModelTooLarge => "model_too_large",
            Self::AcceleratorUnavailable => "accelerator_unavailable",
            Self::ThermalThrottled => "thermal_throttled",
            Self::InvalidApiKey => "invalid_api_key",
            Self::ExpiredToken => "expired_token",
            Self::AuthenticationFailed => "authentication_failed",
            Self::ComponentNotReady => "component_not_ready",
            Self::InvalidState => "invalid_state",
            Self::FrameworkNotAvailable => "framework_not_available",
            Self::LoadFailed => "load_failed",
            Self::ValidationFailed => "validation_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            NotInitialized | AlreadyInitialized | InvalidConfig | ComponentInitFailed => {
                ErrorCategory::Initialization
            }
            ModelNotFound | UnsupportedFormat | ChecksumMismatch | IncompatibleFramework
            | UnsupportedModality | DownloadFailed | ExtractionFailed | AdapterNotFound
            | ServiceInitFailed => ErrorCategory::Model,
            GenerationFailed | GenerationTimeout | StreamingNotSupported
            | ContextLengthExceeded | Cancelled => ErrorCategory::Generation,
            NetworkUnavailable | NetworkTimeout | Unauthorized | Forbidden | HttpError
            | NetworkValidationFailed => ErrorCategory::Network,
            DiskFull | IoError | CorruptDatabase => ErrorCategory::Storage,
            OutOfMemory | ModelTooLarge => ErrorCategory::Memory,
            AcceleratorUnavailable | ThermalThrottled => ErrorCategory::Hardware,
            InvalidApiKey | ExpiredToken | AuthenticationFailed => {
                ErrorCategory::Authentication
            }
            ComponentNotReady | InvalidState => ErrorCategory::Component,
            FrameworkNotAvailable | LoadFailed => ErrorCategory::Framework,
            ValidationFailed => ErrorCategory::Validation,
            Unknown => ErrorCategory::Unknown,
        }
    }

    /// Transient errors are eligible for retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::NetworkTimeout | Self::HttpError
        )
    }
}

/// Capture-site metadata attached to an error at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    pub thread: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn capture(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function,
            thread: std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Capture an [`ErrorContext`] at the call site.
#[macro_export]
macro_rules! error_context {
    () => {
        $crate::error::ErrorContext::capture(file!(), line!(), module_path!())
    };
}

/// The SDK-internal error type.
///
/// Cloneable so the last-error accessor can hand out copies; the wrapped
/// cause is shared behind an `Arc` for the same reason.
#[derive(Clone)]
pub struct SdkError {
    code: ErrorCode,
    message: String,
    http_status: Option<u16>,
    underlying: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: Option<ErrorContext>,
}

impl SdkError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
            underlying: None,
            context: None,
        }
    }

    /// Attach the wrapped cause.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.underlying = Some(Arc::new(source));
        self
    }

    /// Attach capture-site context. Use through [`error_context!`].
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach an HTTP status for `HttpError` codes.
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_ref()
    }

    pub fn is_transient(&self) -> bool {
        if self.code == ErrorCode::HttpError {
            // 5xx and 408 are retryable; other statuses are not.
            return match self.http_status {
                Some(s) => s >= 500 || s == 408,
                None => false,
            };
        }
        self.code.is_transient()
    }

    /// Log the error with its full context at error level.
    pub fn log(&self) {
        match &self.context {
            Some(ctx) => tracing::error!(
                code = self.code.as_str(),
                category = %self.category(),
                file = ctx.file,
                line = ctx.line,
                function = ctx.function,
                thread = %ctx.thread,
                "{}",
                self.message
            ),
            None => tracing::error!(
                code = self.code.as_str(),
                category = %self.category(),
                "{}",
                self.message
            ),
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl fmt::Debug for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkError")
            .field("code", &self.code)
            .field("category", &self.category())
            .field("message", &self.message)
            .field("http_status", &self.http_status)
            .field("underlying", &self.underlying.as_ref().map(|e| e.to_string()))
            .field("context", &self.context)
            .finish()
    }
}

impl std::error::Error for SdkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.underlying
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for SdkError {
    fn from(e: std::io::Error) -> Self {
        // ENOSPC maps to the dedicated disk-full code.
        let code = if e.raw_os_error() == Some(28) {
            ErrorCode::DiskFull
        } else {
            ErrorCode::IoError
        };
        SdkError::new(code, e.to_string()).with_source(e)
    }
}

/// The small, stable error surface exposed to host applications.
///
/// Descriptions are safe to show to users and never leak internal file
/// paths; richer diagnostics come from the last-error context accessor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublicError {
    #[error("SDK is not initialized")]
    NotInitialized,
    #[error("model not found")]
    ModelNotFound,
    #[error("model loading failed: {0}")]
    LoadingFailed(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("operation timed out")]
    Timeout,
    #[error("storage is full")]
    StorageFull,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl From<&SdkError> for PublicError {
    fn from(e: &SdkError) -> Self {
        let reason = sanitize(e.message());
        match e.code() {
            ErrorCode::NotInitialized => PublicError::NotInitialized,
            ErrorCode::ModelNotFound => PublicError::ModelNotFound,
            ErrorCode::DownloadFailed
            | ErrorCode::ExtractionFailed
            | ErrorCode::ChecksumMismatch
            | ErrorCode::AdapterNotFound
            | ErrorCode::ServiceInitFailed
            | ErrorCode::LoadFailed
            | ErrorCode::UnsupportedFormat
            | ErrorCode::IncompatibleFramework => PublicError::LoadingFailed(reason),
            ErrorCode::GenerationFailed
            | ErrorCode::StreamingNotSupported
            | ErrorCode::ContextLengthExceeded
            | ErrorCode::Cancelled => PublicError::GenerationFailed(reason),
            ErrorCode::NetworkUnavailable => PublicError::NetworkUnavailable,
            ErrorCode::NetworkTimeout | ErrorCode::GenerationTimeout => PublicError::Timeout,
            ErrorCode::DiskFull => PublicError::StorageFull,
            ErrorCode::ValidationFailed | ErrorCode::InvalidConfig => {
                PublicError::ValidationFailed(reason)
            }
            _ => PublicError::RequestFailed(reason),
        }
    }
}

impl From<SdkError> for PublicError {
    fn from(e: SdkError) -> Self {
        PublicError::from(&e)
    }
}

/// Strip anything that looks like a filesystem path from a public message.
fn sanitize(message: &str) -> String {
    message
        .split_whitespace()
        .map(|word| {
            if word.contains('/') || word.contains('\\') {
                "<path>"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

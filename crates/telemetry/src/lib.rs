//! Typed telemetry with consent gating and offline persistence
//!
//! Events are fixed-schema per modality, buffered in a bounded queue, and
//! persisted before transmit so nothing is lost across restarts. See
//! [`queue::AnalyticsQueue`].

pub mod events;
pub mod queue;
pub mod transmitter;

pub use events::{ModalityFields, TelemetryEvent, TelemetryModality};
pub use queue::{AnalyticsQueue, TelemetryConsent};
pub use transmitter::{HttpTransmitter, TelemetryBatch, TelemetryTransmitter, TransmitReport};

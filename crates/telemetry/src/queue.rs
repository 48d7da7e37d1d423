//! Analytics queue
//!
//! Consent-gated, bounded in-memory buffer with drop-oldest overflow.
//! Flushes on demand, on the size threshold, and on a timed interval;
//! events are persisted before transmit so an offline device re-submits
//! them at the next flush. Batches go out partitioned by modality so the
//! receiver can route to specialized storage.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use edgekit_core::{CancellationToken, DeviceInfo, Event, Result};
use edgekit_persistence::{Store, TelemetryRow};

use crate::events::{TelemetryEvent, TelemetryModality};
use crate::transmitter::{TelemetryBatch, TelemetryTransmitter};

/// Host-controlled telemetry consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryConsent {
    Granted,
    Denied,
    NotDetermined,
}

/// Batched, typed telemetry queue.
pub struct AnalyticsQueue {
    consent: RwLock<TelemetryConsent>,
    buffer: Mutex<VecDeque<TelemetryEvent>>,
    dropped: AtomicU64,
    max_buffer: usize,
    batch_size: usize,
    device: DeviceInfo,
    store: Arc<Store>,
    transmitter: Arc<dyn TelemetryTransmitter>,
    flush_signal: Notify,
}

impl AnalyticsQueue {
    pub fn new(
        device: DeviceInfo,
        store: Arc<Store>,
        transmitter: Arc<dyn TelemetryTransmitter>,
        max_buffer: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            consent: RwLock::new(TelemetryConsent::NotDetermined),
            buffer: Mutex::new(VecDeque::with_capacity(batch_size.min(max_buffer))),
            dropped: AtomicU64::new(0),
            max_buffer,
            batch_size,
            device,
            store,
            transmitter,
            flush_signal: Notify::new(),
        }
    }

    pub fn set_consent(&self, consent: TelemetryConsent) {
        tracing::info!(consent = ?consent, "Telemetry consent updated");
        *self.consent.write() = consent;
    }

    pub fn consent(&self) -> TelemetryConsent {
        *self.consent.read()
    }

    /// Record one event. A no-op unless consent is granted.
    pub fn track(&self, event: TelemetryEvent) {
        if self.consent() != TelemetryConsent::Granted {
            return;
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.max_buffer {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);

        if buffer.len() >= self.batch_size {
            self.flush_signal.notify_one();
        }
    }

    /// Convert and record a bus event; public-only events are ignored.
    pub fn track_event(&self, event: &Event) {
        if let Some(telemetry) = TelemetryEvent::from_event(event, &self.device) {
            self.track(telemetry);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Events dropped to the overflow policy since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Persist the in-memory buffer, then transmit everything pending,
    /// partitioned by modality. Failed partitions stay persisted for the
    /// next flush.
    pub async fn flush(&self) -> Result<usize> {
        // Stage 1: make the buffer durable.
        let staged: Vec<TelemetryEvent> = self.buffer.lock().drain(..).collect();
        if !staged.is_empty() {
            let rows: Vec<TelemetryRow> = staged.iter().filter_map(to_row).collect();
            self.store
                .persist_telemetry(&rows)
                .map_err(edgekit_core::SdkError::from)?;
        }

        // Stage 2: drain everything pending, including prior sessions.
        let pending = self
            .store
            .pending_telemetry(self.max_buffer)
            .map_err(edgekit_core::SdkError::from)?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut sent_total = 0usize;
        for modality in [
            TelemetryModality::Llm,
            TelemetryModality::Stt,
            TelemetryModality::Tts,
            TelemetryModality::Model,
            TelemetryModality::Unspecified,
        ] {
            let partition: Vec<&TelemetryRow> = pending
                .iter()
                .filter(|row| row.modality == modality.as_str())
                .collect();
            if partition.is_empty() {
                continue;
            }

            let events: Vec<TelemetryEvent> = partition
                .iter()
                .filter_map(|row| serde_json::from_str(&row.payload).ok())
                .collect();
            let batch = TelemetryBatch {
                events,
                device_id: self.device.device_id.clone(),
                timestamp: Utc::now(),
            };

            match self.transmitter.transmit(&batch).await {
                Ok(_report) => {
                    let ids: Vec<String> = partition.iter().map(|r| r.id.clone()).collect();
                    self.store
                        .delete_telemetry(&ids)
                        .map_err(edgekit_core::SdkError::from)?;
                    sent_total += ids.len();
                }
                Err(e) => {
                    tracing::warn!(
                        modality = modality.as_str(),
                        error = %e,
                        "Telemetry partition transmit failed; rows stay persisted"
                    );
                }
            }
        }

        Ok(sent_total)
    }

    /// Periodic flush loop; runs until `shutdown` fires, flushing one last
    /// time on the way out.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.flush_signal.notified() => {}
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.flush().await {
                tracing::warn!(error = %e, "Periodic telemetry flush failed");
            }
        }
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "Final telemetry flush failed");
        }
    }
}

fn to_row(event: &TelemetryEvent) -> Option<TelemetryRow> {
    let payload = serde_json::to_string(event).ok()?;
    Some(TelemetryRow {
        id: event.id.clone(),
        event_type: event.event_type.clone(),
        modality: event.modality().as_str().to_string(),
        payload,
        created_at: event.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmitter::TransmitReport;
    use async_trait::async_trait;
    use edgekit_core::{ErrorCode, EventPayload, ModelPhase, SdkError};

    /// Captures batches; optionally fails every transmit.
    struct MockTransmitter {
        batches: Mutex<Vec<TelemetryBatch>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MockTransmitter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl TelemetryTransmitter for MockTransmitter {
        async fn transmit(&self, batch: &TelemetryBatch) -> Result<TransmitReport> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SdkError::new(ErrorCode::NetworkUnavailable, "offline"));
            }
            self.batches.lock().push(batch.clone());
            Ok(TransmitReport {
                success: true,
                events_received: batch.events.len() as u32,
                events_stored: batch.events.len() as u32,
                errors: None,
            })
        }
    }

    fn queue_with(
        transmitter: Arc<MockTransmitter>,
        max_buffer: usize,
    ) -> (Arc<AnalyticsQueue>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let queue = Arc::new(AnalyticsQueue::new(
            DeviceInfo::with_id("d1".into()),
            store.clone(),
            transmitter,
            max_buffer,
            100,
        ));
        (queue, store)
    }

    fn model_event() -> Event {
        Event::new(EventPayload::Model {
            model_id: "m1".into(),
            phase: ModelPhase::LoadCompleted { duration_ms: 10 },
        })
    }

    #[tokio::test]
    async fn test_denied_consent_records_nothing() {
        let transmitter = MockTransmitter::new();
        let (queue, store) = queue_with(transmitter.clone(), 100);

        queue.set_consent(TelemetryConsent::Denied);
        queue.track_event(&model_event());
        assert_eq!(queue.buffered(), 0);

        queue.flush().await.unwrap();
        assert_eq!(store.pending_telemetry_count().unwrap(), 0);
        assert!(transmitter.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_not_determined_is_also_a_noop() {
        let (queue, _store) = queue_with(MockTransmitter::new(), 100);
        queue.track_event(&model_event());
        assert_eq!(queue.buffered(), 0);
    }

    #[tokio::test]
    async fn test_flush_transmits_and_clears() {
        let transmitter = MockTransmitter::new();
        let (queue, store) = queue_with(transmitter.clone(), 100);
        queue.set_consent(TelemetryConsent::Granted);

        queue.track_event(&model_event());
        queue.track_event(&model_event());
        assert_eq!(queue.buffered(), 2);

        let sent = queue.flush().await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(queue.buffered(), 0);
        assert_eq!(store.pending_telemetry_count().unwrap(), 0);
        assert_eq!(transmitter.batches.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transmit_keeps_rows_for_retry() {
        let transmitter = MockTransmitter::new();
        let (queue, store) = queue_with(transmitter.clone(), 100);
        queue.set_consent(TelemetryConsent::Granted);
        queue.track_event(&model_event());

        transmitter.fail.store(true, Ordering::Relaxed);
        let sent = queue.flush().await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(store.pending_telemetry_count().unwrap(), 1);

        // Back online: the persisted row goes out.
        transmitter.fail.store(false, Ordering::Relaxed);
        let sent = queue.flush().await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(store.pending_telemetry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_with_counter() {
        let (queue, _store) = queue_with(MockTransmitter::new(), 3);
        queue.set_consent(TelemetryConsent::Granted);

        for _ in 0..5 {
            queue.track_event(&model_event());
        }
        assert_eq!(queue.buffered(), 3);
        assert_eq!(queue.dropped(), 2);
    }

    #[tokio::test]
    async fn test_roundtrip_through_persistence() {
        let transmitter = MockTransmitter::new();
        let (queue, _store) = queue_with(transmitter.clone(), 100);
        queue.set_consent(TelemetryConsent::Granted);
        queue.track_event(&model_event());
        queue.flush().await.unwrap();

        let batches = transmitter.batches.lock();
        assert_eq!(batches.len(), 1);
        let event = &batches[0].events[0];
        assert_eq!(event.event_type, "model_load_completed");
        assert_eq!(event.modality(), TelemetryModality::Model);
    }
}

//! Telemetry endpoint client
//!
//! `POST /telemetry` with `{events, device_id, timestamp}`. Transient
//! failures retry with bounded exponential backoff and jitter; the queue
//! keeps events persisted until a transmit succeeds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edgekit_core::{ErrorCode, Result, SdkError};

use crate::events::TelemetryEvent;

/// One submission unit.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryBatch {
    pub events: Vec<TelemetryEvent>,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Endpoint acknowledgement.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TransmitReport {
    pub success: bool,
    pub events_received: u32,
    pub events_stored: u32,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

/// Transport seam so tests can capture batches without a server.
#[async_trait]
pub trait TelemetryTransmitter: Send + Sync {
    async fn transmit(&self, batch: &TelemetryBatch) -> Result<TransmitReport>;
}

/// Production transmitter over HTTP.
pub struct HttpTransmitter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    retry_count: u32,
}

impl HttpTransmitter {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        retry_count: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SdkError::new(ErrorCode::InvalidConfig, "failed to create HTTP client")
                    .with_source(e)
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/telemetry", base_url.trim_end_matches('/')),
            api_key,
            retry_count,
        })
    }

    async fn post_once(&self, batch: &TelemetryBatch) -> Result<TransmitReport> {
        let mut request = self.client.post(&self.endpoint).json(batch);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            let code = if e.is_timeout() {
                ErrorCode::NetworkTimeout
            } else {
                ErrorCode::NetworkUnavailable
            };
            SdkError::new(code, e.to_string()).with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SdkError::new(
                ErrorCode::HttpError,
                format!("telemetry endpoint returned {status}"),
            )
            .with_http_status(status.as_u16()));
        }

        response.json::<TransmitReport>().await.map_err(|e| {
            SdkError::new(
                ErrorCode::NetworkValidationFailed,
                "telemetry acknowledgement failed to parse",
            )
            .with_source(e)
        })
    }
}

#[async_trait]
impl TelemetryTransmitter for HttpTransmitter {
    async fn transmit(&self, batch: &TelemetryBatch) -> Result<TransmitReport> {
        let mut backoff = Duration::from_millis(200);
        let mut last_error: Option<SdkError> = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                let jitter = 0.8 + rand::random::<f64>() * 0.4;
                tokio::time::sleep(backoff.mul_f64(jitter)).await;
                backoff *= 2;
            }

            match self.post_once(batch).await {
                Ok(report) => {
                    tracing::debug!(
                        events = batch.events.len(),
                        stored = report.events_stored,
                        "Telemetry batch accepted"
                    );
                    return Ok(report);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "Telemetry transmit failed, will retry");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SdkError::new(ErrorCode::NetworkUnavailable, "telemetry retries exhausted")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_wire_shape() {
        let batch = TelemetryBatch {
            events: vec![],
            device_id: "d1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.get("events").is_some());
        assert!(json.get("device_id").is_some());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_report_parsing() {
        let report: TransmitReport = serde_json::from_str(
            r#"{"success": true, "events_received": 5, "events_stored": 5}"#,
        )
        .unwrap();
        assert!(report.success);
        assert_eq!(report.events_stored, 5);
        assert!(report.errors.is_none());
    }
}

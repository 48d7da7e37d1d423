//! Component lifecycle core
//!
//! Every capability component shares this state machine:
//!
//! ```text
//! NotInitialized --initialize()--> Initializing --ok--> Ready
//!                                       |
//!                                       +--err--> Failed
//! Ready --cleanup()--> ShuttingDown --> CleanedUp --initialize()--> ...
//! Failed --cleanup()--> CleanedUp
//! ```
//!
//! `initialize()` is single-flight: concurrent callers share one
//! underlying init and all await the same outcome. Cleanup is bounded by a
//! timeout, after which resources are force-released.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use edgekit_core::{
    ComponentPhase, ErrorCode, Event, EventBus, EventPayload, Result, SdkError, ServiceHandle,
};

/// Lifecycle state of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    NotInitialized,
    Initializing,
    Ready,
    Failed(String),
    ShuttingDown,
    CleanedUp,
}

type ServiceFactory = Box<dyn Fn() -> BoxFuture<'static, Result<ServiceHandle>> + Send + Sync>;
type InitOutcome = std::result::Result<(), String>;

/// One runtime-managed capability component owning zero-or-one service.
pub struct Component {
    name: String,
    bus: EventBus,
    factory: ServiceFactory,
    cleanup_timeout: Duration,
    state: RwLock<ComponentState>,
    service: RwLock<Option<ServiceHandle>>,
    in_flight: Mutex<Option<watch::Receiver<Option<InitOutcome>>>>,
}

impl Component {
    pub fn new<F>(name: impl Into<String>, bus: EventBus, factory: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<ServiceHandle>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            bus,
            factory: Box::new(factory),
            cleanup_timeout: Duration::from_secs(5),
            state: RwLock::new(ComponentState::NotInitialized),
            service: RwLock::new(None),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ComponentState {
        self.state.read().clone()
    }

    /// The live service, once ready.
    pub fn service(&self) -> Option<ServiceHandle> {
        self.service.read().clone()
    }

    /// Succeeds only in `Ready`.
    pub fn ensure_ready(&self) -> Result<ServiceHandle> {
        match &*self.state.read() {
            ComponentState::Ready => self.service.read().clone().ok_or_else(|| {
                SdkError::new(ErrorCode::InvalidState, "ready component lost its service")
            }),
            state => Err(SdkError::new(
                ErrorCode::ComponentNotReady,
                format!("component {} is {:?}", self.name, state),
            )),
        }
    }

    /// Initialize the component; concurrent callers share one init.
    ///
    /// Already-ready components return immediately. `CleanedUp` components
    /// re-initialize from scratch.
    pub async fn initialize(&self) -> Result<()> {
        enum Claim {
            Run(watch::Sender<Option<InitOutcome>>),
            Join(watch::Receiver<Option<InitOutcome>>),
        }

        // Join an in-flight init when one exists; otherwise claim the slot.
        let claim = {
            let mut slot = self.in_flight.lock();
            if let Some(rx) = slot.as_ref() {
                Claim::Join(rx.clone())
            } else {
                {
                    let mut state = self.state.write();
                    if *state == ComponentState::Ready {
                        return Ok(());
                    }
                    *state = ComponentState::Initializing;
                }
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                Claim::Run(tx)
            }
        };

        match claim {
            Claim::Run(tx) => self.run_init(tx).await,
            Claim::Join(mut rx) => {
                // Wait for the owning caller to publish the outcome.
                loop {
                    if let Some(outcome) = rx.borrow().clone() {
                        return outcome.map_err(|message| {
                            SdkError::new(ErrorCode::ComponentInitFailed, message)
                        });
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                // Sender dropped without an outcome; report current state.
                self.ensure_ready().map(|_| ())
            }
        }
    }

    async fn run_init(&self, tx: watch::Sender<Option<InitOutcome>>) -> Result<()> {
        let started = Instant::now();
        self.publish(ComponentPhase::InitializationStarted);
        tracing::info!(component = %self.name, "Component initializing");

        let result = (self.factory)().await;
        let outcome = match &result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.message().to_string()),
        };

        let final_result = match result {
            Ok(service) => {
                *self.service.write() = Some(service);
                *self.state.write() = ComponentState::Ready;
                let duration_ms = started.elapsed().as_millis() as u64;
                self.publish(ComponentPhase::InitializationCompleted { duration_ms });
                tracing::info!(component = %self.name, duration_ms, "Component ready");
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ComponentState::Failed(e.message().to_string());
                self.publish(ComponentPhase::InitializationFailed {
                    message: e.message().to_string(),
                });
                tracing::error!(component = %self.name, error = %e, "Component init failed");
                Err(e)
            }
        };

        let _ = tx.send(Some(outcome));
        *self.in_flight.lock() = None;
        final_result
    }

    /// Tear the component down. Cleanup is bounded by the configured
    /// timeout; on expiry the service is force-released.
    pub async fn cleanup(&self) {
        let previous = {
            let mut state = self.state.write();
            let previous = state.clone();
            match previous {
                ComponentState::NotInitialized | ComponentState::CleanedUp => return,
                _ => *state = ComponentState::ShuttingDown,
            }
            previous
        };

        if previous == ComponentState::Ready {
            if let Some(service) = self.service.read().clone() {
                let cleanup = cleanup_handle(service);
                if tokio::time::timeout(self.cleanup_timeout, cleanup)
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        component = %self.name,
                        timeout_ms = self.cleanup_timeout.as_millis() as u64,
                        "Cleanup timed out; force-releasing service"
                    );
                }
            }
        }

        *self.service.write() = None;
        *self.state.write() = ComponentState::CleanedUp;
        tracing::info!(component = %self.name, "Component cleaned up");
    }

    /// Report a model-download phase for this component. Factories whose
    /// init triggers a download call this around the transfer.
    pub fn report_download(&self, phase: ComponentPhase) {
        debug_assert!(matches!(
            phase,
            ComponentPhase::DownloadRequired
                | ComponentPhase::DownloadStarted
                | ComponentPhase::DownloadProgress { .. }
                | ComponentPhase::DownloadCompleted
        ));
        self.publish(phase);
    }

    fn publish(&self, phase: ComponentPhase) {
        self.bus.publish(Event::new(EventPayload::Component {
            component: self.name.clone(),
            phase,
        }));
    }
}

async fn cleanup_handle(handle: ServiceHandle) -> Result<()> {
    match handle {
        ServiceHandle::Llm(s) => s.cleanup().await,
        ServiceHandle::Stt(s) => s.cleanup().await,
        ServiceHandle::Tts(s) => s.cleanup().await,
        ServiceHandle::Vad(s) => s.cleanup().await,
        ServiceHandle::Diarization(s) => {
            s.reset();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgekit_core::{GenerationOptions, LlmService};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopLlm;

    #[async_trait]
    impl LlmService for NoopLlm {
        async fn initialize(&self, _: Option<&std::path::Path>) -> Result<()> {
            Ok(())
        }

        async fn stream_generate(
            &self,
            _: &str,
            _: &GenerationOptions,
            _: tokio::sync::mpsc::Sender<String>,
            _: &edgekit_core::CancellationToken,
        ) -> Result<edgekit_core::BackendUsage> {
            Ok(edgekit_core::BackendUsage::default())
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn current_model(&self) -> Option<String> {
            None
        }

        async fn cleanup(&self) -> Result<()> {
            Ok(())
        }
    }

    fn counting_component(constructed: Arc<AtomicU32>) -> Component {
        Component::new("llm", EventBus::new(), move || {
            let constructed = constructed.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                constructed.fetch_add(1, Ordering::SeqCst);
                Ok(ServiceHandle::Llm(Arc::new(NoopLlm)))
            })
        })
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let component = counting_component(Arc::new(AtomicU32::new(0)));
        assert_eq!(component.state(), ComponentState::NotInitialized);
        assert!(component.ensure_ready().is_err());

        component.initialize().await.unwrap();
        assert_eq!(component.state(), ComponentState::Ready);
        assert!(component.ensure_ready().is_ok());

        component.cleanup().await;
        assert_eq!(component.state(), ComponentState::CleanedUp);
        assert!(component.service().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_init_is_single_flight() {
        let constructed = Arc::new(AtomicU32::new(0));
        let component = Arc::new(counting_component(constructed.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let component = component.clone();
            handles.push(tokio::spawn(async move { component.initialize().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert_eq!(component.state(), ComponentState::Ready);
    }

    #[tokio::test]
    async fn test_failed_init_reports_to_all_callers() {
        let component = Arc::new(Component::new("stt", EventBus::new(), || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(SdkError::new(ErrorCode::ServiceInitFailed, "backend exploded"))
            })
        }));

        let a = {
            let c = component.clone();
            tokio::spawn(async move { c.initialize().await })
        };
        let b = {
            let c = component.clone();
            tokio::spawn(async move { c.initialize().await })
        };

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
        assert!(matches!(component.state(), ComponentState::Failed(_)));

        // Failed -> CleanedUp -> re-init works.
        component.cleanup().await;
        assert_eq!(component.state(), ComponentState::CleanedUp);
    }

    #[tokio::test]
    async fn test_reinitialize_after_cleanup() {
        let constructed = Arc::new(AtomicU32::new(0));
        let component = counting_component(constructed.clone());

        component.initialize().await.unwrap();
        component.cleanup().await;
        component.initialize().await.unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 2);
        assert_eq!(component.state(), ComponentState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_when_ready_is_noop() {
        let constructed = Arc::new(AtomicU32::new(0));
        let component = counting_component(constructed.clone());
        component.initialize().await.unwrap();
        component.initialize().await.unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_events_published() {
        let bus = EventBus::new();
        let (_token, mut rx) = bus.subscribe_channel(edgekit_core::EventCategory::Component);
        let component = Component::new("tts", bus, || {
            Box::pin(async { Ok(ServiceHandle::Llm(Arc::new(NoopLlm))) })
        });
        component.initialize().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "component_tts_initialization_started");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.name(), "component_tts_initialization_completed");
    }
}

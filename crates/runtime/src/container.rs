//! Service container
//!
//! Process-wide holder of the runtime's subsystems. Construction is
//! strictly leaves-first (event bus, registries, model registry, loading
//! service, telemetry, engine); teardown runs in reverse with a bounded
//! per-component timeout. Components reach collaborators through the
//! accessors here and never hold a reference back to the container.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use edgekit_config::{ConfigResolver, ConfigurationData};
use edgekit_core::{
    CancellationToken, DeviceInfo, Event, EventBus, EventCategory, EventPayload,
    PlatformAdapter, Result, SubscriptionToken,
};
use edgekit_llm::StreamingEngine;
use edgekit_persistence::Store;
use edgekit_registry::{AdapterRegistry, AssignmentFetcher, ModelRegistry, ModuleRegistry};
use edgekit_telemetry::{AnalyticsQueue, HttpTransmitter};

use crate::component::Component;
use crate::loading::ModelLoadingService;

const ALL_CATEGORIES: [EventCategory; 9] = [
    EventCategory::Sdk,
    EventCategory::Component,
    EventCategory::Model,
    EventCategory::Generation,
    EventCategory::Stt,
    EventCategory::Tts,
    EventCategory::Vad,
    EventCategory::Pipeline,
    EventCategory::AudioControl,
];

/// Lazily-constructed, single-ownership holder of the runtime.
pub struct ServiceContainer {
    bus: EventBus,
    device: DeviceInfo,
    platform: Arc<dyn PlatformAdapter>,
    resolver: Arc<ConfigResolver>,
    store: Arc<Store>,
    modules: Arc<ModuleRegistry>,
    adapters: Arc<AdapterRegistry>,
    models: Arc<ModelRegistry>,
    loading: Arc<ModelLoadingService>,
    telemetry: Arc<AnalyticsQueue>,
    engine: Arc<StreamingEngine>,
    assignments: Arc<AssignmentFetcher>,
    components: RwLock<Vec<Arc<Component>>>,
    telemetry_task: Mutex<Option<JoinHandle<()>>>,
    telemetry_shutdown: CancellationToken,
    bridge_tokens: Mutex<Vec<SubscriptionToken>>,
}

impl ServiceContainer {
    /// Build the runtime leaves-first and start the telemetry drain loop.
    pub fn init(
        defaults: ConfigurationData,
        platform: Arc<dyn PlatformAdapter>,
        store: Arc<Store>,
    ) -> Result<Arc<Self>> {
        let bus = EventBus::new();

        // Device identity survives restarts through the store.
        let device = match store.load_device_info() {
            Ok(Some(device)) => device,
            _ => {
                let device = DeviceInfo::detect();
                if let Err(e) = store.save_device_info(&device) {
                    tracing::warn!(error = %e, "Failed to persist device info");
                }
                device
            }
        };

        let api = defaults.api.clone();
        let storage = defaults.storage.clone();
        let telemetry_config = defaults.telemetry.clone();
        let download = defaults.download.clone();
        let api_key = defaults.api_key.clone();

        let resolver = Arc::new(ConfigResolver::new(defaults));
        let modules = Arc::new(ModuleRegistry::new());
        let adapters = Arc::new(AdapterRegistry::new());
        let models = Arc::new(ModelRegistry::new(store.clone(), &storage.model_root)?);
        let loading = Arc::new(ModelLoadingService::new(
            models.clone(),
            adapters.clone(),
            platform.clone(),
            bus.clone(),
            download.retry_count,
            storage.memory_threshold_bytes,
        )?);

        let transmitter = Arc::new(HttpTransmitter::new(
            &api.base_url,
            api_key,
            api.timeout,
            api.retry_count,
        )?);
        let telemetry = Arc::new(AnalyticsQueue::new(
            device.clone(),
            store.clone(),
            transmitter,
            telemetry_config.max_buffered_events,
            telemetry_config.batch_size,
        ));

        let engine = Arc::new(StreamingEngine::new(resolver.clone(), bus.clone()));
        let assignments = Arc::new(AssignmentFetcher::new(
            api.base_url.clone(),
            device.clone(),
            store.clone(),
            api.timeout,
            api.retry_count,
        )?);

        let container = Arc::new(Self {
            bus,
            device,
            platform,
            resolver,
            store,
            modules,
            adapters,
            models,
            loading,
            telemetry,
            engine,
            assignments,
            components: RwLock::new(Vec::new()),
            telemetry_task: Mutex::new(None),
            telemetry_shutdown: CancellationToken::new(),
            bridge_tokens: Mutex::new(Vec::new()),
        });

        // Every analytics-destined event flows into the queue.
        {
            let mut tokens = container.bridge_tokens.lock();
            for category in ALL_CATEGORIES {
                let queue = container.telemetry.clone();
                tokens.push(
                    container
                        .bus
                        .subscribe(category, move |event| queue.track_event(event)),
                );
            }
        }

        let task = tokio::spawn(
            container
                .telemetry
                .clone()
                .run(telemetry_config.flush_interval, container.telemetry_shutdown.clone()),
        );
        *container.telemetry_task.lock() = Some(task);

        container.bus.publish(Event::new(EventPayload::SdkInitialized));
        tracing::info!(device_id = %container.device.device_id, "Service container initialized");
        Ok(container)
    }

    /// Add a lifecycle-managed capability component. Teardown runs in
    /// reverse registration order.
    pub fn register_component(&self, component: Component) -> Arc<Component> {
        let component = Arc::new(component);
        self.components.write().push(component.clone());
        component
    }

    pub fn component(&self, name: &str) -> Option<Arc<Component>> {
        self.components
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Initialize every registered component in registration order.
    pub async fn initialize_components(&self) -> Result<()> {
        let components: Vec<Arc<Component>> = self.components.read().clone();
        for component in components {
            component.initialize().await?;
        }
        Ok(())
    }

    /// Tear everything down in reverse construction order.
    pub async fn teardown(&self) {
        self.bus.publish(Event::new(EventPayload::SdkShutdown));

        let components: Vec<Arc<Component>> = {
            let mut components = self.components.write();
            let drained: Vec<_> = components.drain(..).collect();
            drained
        };
        for component in components.into_iter().rev() {
            component.cleanup().await;
        }

        self.loading.unload_all().await;

        // Stop the drain loop; it flushes one final time on the way out.
        self.telemetry_shutdown.cancel();
        let task = self.telemetry_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        for token in self.bridge_tokens.lock().drain(..) {
            self.bus.unsubscribe(token);
        }
        self.modules.clear(None);
        self.adapters.clear();

        tracing::info!("Service container torn down");
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn platform(&self) -> &Arc<dyn PlatformAdapter> {
        &self.platform
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn loading(&self) -> &Arc<ModelLoadingService> {
        &self.loading
    }

    pub fn telemetry(&self) -> &Arc<AnalyticsQueue> {
        &self.telemetry
    }

    pub fn engine(&self) -> &Arc<StreamingEngine> {
        &self.engine
    }

    pub fn assignments(&self) -> &Arc<AssignmentFetcher> {
        &self.assignments
    }
}

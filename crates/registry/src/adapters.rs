//! Adapter registry
//!
//! Framework adapters keyed by framework identifier. `find_best_adapter`
//! selects in three passes: the model's preferred framework when that
//! adapter supports the format, then any adapter whose `can_handle`
//! accepts the model, then a structural match on (format, modality).
//! Ties break on registration priority, then insertion order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use edgekit_core::{FrameworkAdapter, Modality, ModelInfo};

struct AdapterRegistration {
    adapter: Arc<dyn FrameworkAdapter>,
    priority: i32,
    order: u64,
}

/// Registry of framework adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<Vec<AdapterRegistration>>,
    counter: AtomicU64,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn FrameworkAdapter>, priority: i32) {
        let order = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut adapters = self.adapters.write();
        adapters.push(AdapterRegistration {
            adapter: adapter.clone(),
            priority,
            order,
        });
        adapters.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));

        tracing::debug!(
            framework = ?adapter.framework(),
            priority,
            "Registered framework adapter"
        );
    }

    /// Adapter registered for an exact framework.
    pub fn get(&self, framework: edgekit_core::Framework) -> Option<Arc<dyn FrameworkAdapter>> {
        self.adapters
            .read()
            .iter()
            .find(|r| r.adapter.framework() == framework)
            .map(|r| r.adapter.clone())
    }

    /// Best adapter for a model per the selection cascade.
    pub fn find_best_adapter(&self, model: &ModelInfo) -> Option<Arc<dyn FrameworkAdapter>> {
        let adapters = self.adapters.read();

        // 1. Preferred framework, provided it supports the model's format.
        if let Some(preferred) = model.preferred_framework {
            if let Some(registration) = adapters.iter().find(|r| {
                r.adapter.framework() == preferred
                    && r.adapter.supported_formats().contains(&model.format)
            }) {
                return Some(registration.adapter.clone());
            }
        }

        // 2. Any adapter that claims the model.
        if let Some(registration) = adapters.iter().find(|r| r.adapter.can_handle(model)) {
            return Some(registration.adapter.clone());
        }

        // 3. Structural match on format and modality.
        let modality = Modality::for_category(model.category);
        adapters
            .iter()
            .find(|r| {
                r.adapter.supported_formats().contains(&model.format)
                    && r.adapter.supported_modalities().contains(&modality)
            })
            .map(|r| r.adapter.clone())
    }

    /// All registered adapters, highest priority first.
    pub fn all(&self) -> Vec<Arc<dyn FrameworkAdapter>> {
        self.adapters
            .read()
            .iter()
            .map(|r| r.adapter.clone())
            .collect()
    }

    /// Built-in models contributed by every registered adapter.
    pub fn provided_models(&self) -> Vec<ModelInfo> {
        self.adapters
            .read()
            .iter()
            .flat_map(|r| r.adapter.provided_models())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }

    pub fn clear(&self) {
        self.adapters.write().clear();
    }
}

//! Module registry
//!
//! One ordered provider list per capability, sorted by descending priority
//! with stable insertion order on ties. Selection walks the list and takes
//! the first provider whose `can_handle` accepts the model, so for
//! identical registration order and predicate outcomes the choice is
//! reproducible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use edgekit_core::{Capability, ErrorCode, ModelInfo, Result, SdkError, ServiceProvider};

struct Registration {
    provider: Arc<dyn ServiceProvider>,
    priority: i32,
    order: u64,
}

/// Registry of service providers per capability.
#[derive(Default)]
pub struct ModuleRegistry {
    lists: RwLock<HashMap<Capability, Vec<Registration>>>,
    counter: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a capability with a priority.
    ///
    /// Fails with `validation_failed` when the provider does not declare
    /// the capability it is being registered under.
    pub fn register(
        &self,
        capability: Capability,
        provider: Arc<dyn ServiceProvider>,
        priority: i32,
    ) -> Result<()> {
        if provider.capability() != capability {
            return Err(SdkError::new(
                ErrorCode::ValidationFailed,
                format!(
                    "provider {} declares capability {} but was registered under {}",
                    provider.name(),
                    provider.capability(),
                    capability
                ),
            ));
        }

        let order = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut lists = self.lists.write();
        let list = lists.entry(capability).or_default();
        list.push(Registration {
            provider: provider.clone(),
            priority,
            order,
        });
        list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));

        tracing::debug!(
            capability = %capability,
            provider = provider.name(),
            priority,
            "Registered service provider"
        );
        Ok(())
    }

    /// Snapshot of providers for a capability, highest priority first.
    pub fn providers(&self, capability: Capability) -> Vec<Arc<dyn ServiceProvider>> {
        self.lists
            .read()
            .get(&capability)
            .map(|list| list.iter().map(|r| r.provider.clone()).collect())
            .unwrap_or_default()
    }

    /// First provider whose `can_handle` accepts the model.
    ///
    /// A `None` model selects the highest-priority fallback provider, the
    /// first whose `can_handle(None)` is true.
    pub fn provider_for(
        &self,
        capability: Capability,
        model: Option<&ModelInfo>,
    ) -> Option<Arc<dyn ServiceProvider>> {
        let lists = self.lists.read();
        lists
            .get(&capability)?
            .iter()
            .find(|r| r.provider.can_handle(model))
            .map(|r| r.provider.clone())
    }

    /// Remove all providers for one capability, or everything.
    pub fn clear(&self, capability: Option<Capability>) {
        let mut lists = self.lists.write();
        match capability {
            Some(capability) => {
                lists.remove(&capability);
            }
            None => lists.clear(),
        }
    }

    pub fn provider_count(&self, capability: Capability) -> usize {
        self.lists
            .read()
            .get(&capability)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgekit_core::{ProviderConfig, ServiceHandle};

    struct TestProvider {
        name: String,
        capability: Capability,
        handles: Option<String>,
    }

    impl TestProvider {
        fn new(name: &str, capability: Capability, handles: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                capability,
                handles: handles.map(String::from),
            })
        }
    }

    #[async_trait]
    impl ServiceProvider for TestProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn capability(&self) -> Capability {
            self.capability
        }

        fn can_handle(&self, model: Option<&ModelInfo>) -> bool {
            match (&self.handles, model) {
                (None, _) => true,
                (Some(id), Some(model)) => model.id == *id,
                (Some(_), None) => false,
            }
        }

        async fn create_service(&self, _config: &ProviderConfig) -> Result<ServiceHandle> {
            Err(SdkError::new(ErrorCode::ServiceInitFailed, "test provider"))
        }
    }

    fn model(id: &str) -> ModelInfo {
        ModelInfo::new(id, id, edgekit_core::ModelCategory::Language)
    }

    #[test]
    fn test_register_validates_capability() {
        let registry = ModuleRegistry::new();
        let provider = TestProvider::new("p", Capability::Stt, None);
        let err = registry
            .register(Capability::Llm, provider, 0)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_priority_ordering_with_stable_ties() {
        let registry = ModuleRegistry::new();
        registry
            .register(Capability::Llm, TestProvider::new("low", Capability::Llm, None), 1)
            .unwrap();
        registry
            .register(Capability::Llm, TestProvider::new("hi-a", Capability::Llm, None), 10)
            .unwrap();
        registry
            .register(Capability::Llm, TestProvider::new("hi-b", Capability::Llm, None), 10)
            .unwrap();

        let names: Vec<String> = registry
            .providers(Capability::Llm)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["hi-a", "hi-b", "low"]);
    }

    #[test]
    fn test_selection_walks_can_handle() {
        let registry = ModuleRegistry::new();
        registry
            .register(
                Capability::Llm,
                TestProvider::new("specific", Capability::Llm, Some("m2")),
                10,
            )
            .unwrap();
        registry
            .register(
                Capability::Llm,
                TestProvider::new("fallback", Capability::Llm, None),
                1,
            )
            .unwrap();

        let m1 = model("m1");
        let selected = registry.provider_for(Capability::Llm, Some(&m1)).unwrap();
        assert_eq!(selected.name(), "fallback");

        let m2 = model("m2");
        let selected = registry.provider_for(Capability::Llm, Some(&m2)).unwrap();
        assert_eq!(selected.name(), "specific");

        // nil model matches the highest-priority fallback
        let selected = registry.provider_for(Capability::Llm, None).unwrap();
        assert_eq!(selected.name(), "fallback");
    }

    #[test]
    fn test_clear() {
        let registry = ModuleRegistry::new();
        registry
            .register(Capability::Llm, TestProvider::new("p", Capability::Llm, None), 0)
            .unwrap();
        registry
            .register(Capability::Stt, TestProvider::new("s", Capability::Stt, None), 0)
            .unwrap();

        registry.clear(Some(Capability::Llm));
        assert_eq!(registry.provider_count(Capability::Llm), 0);
        assert_eq!(registry.provider_count(Capability::Stt), 1);

        registry.clear(None);
        assert_eq!(registry.provider_count(Capability::Stt), 0);
    }
}

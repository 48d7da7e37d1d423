//! Model registry
//!
//! In-memory catalog keyed by model id, backed by the persistent store.
//! Registration is an upsert; the latest entry wins. Multi-file lists are
//! kept in an in-process sidecar cache because the persistent registry
//! does not round-trip arrays; absence from the sidecar means
//! "single-file model".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use edgekit_core::{
    ArtifactType, FileDescriptor, Framework, ModelCategory, ModelInfo, Result,
};
use edgekit_persistence::Store;

/// Catalog of models known to the SDK.
pub struct ModelRegistry {
    store: Arc<Store>,
    model_root: PathBuf,
    entries: RwLock<HashMap<String, ModelInfo>>,
    /// Sidecar cache: model id -> multi-file descriptors
    multi_file_cache: DashMap<String, Vec<FileDescriptor>>,
    /// Ids registered but not yet flushed to the store
    pending: Mutex<Vec<String>>,
}

impl ModelRegistry {
    /// Open over the persistent store, hydrating the in-memory view.
    pub fn new(store: Arc<Store>, model_root: impl Into<PathBuf>) -> Result<Self> {
        let persisted = store.list_models().map_err(edgekit_core::SdkError::from)?;
        let mut entries = HashMap::with_capacity(persisted.len());
        for model in persisted {
            entries.insert(model.id.clone(), model);
        }

        tracing::info!(models = entries.len(), "Hydrated model registry from store");

        Ok(Self {
            store,
            model_root: model_root.into(),
            entries: RwLock::new(entries),
            multi_file_cache: DashMap::new(),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn model_root(&self) -> &Path {
        &self.model_root
    }

    /// Directory holding every file of one model.
    pub fn model_dir(&self, id: &str) -> PathBuf {
        self.model_root.join(id)
    }

    /// Upsert a model. Re-registering an id replaces the prior entry.
    pub fn register(&self, model: ModelInfo) -> Result<()> {
        let model = model.normalized()?;

        if let ArtifactType::MultiFile { files } = &model.artifact_type {
            self.multi_file_cache
                .insert(model.id.clone(), files.clone());
        } else {
            self.multi_file_cache.remove(&model.id);
        }

        tracing::debug!(
            model_id = %model.id,
            category = ?model.category,
            source = ?model.source,
            "Registered model"
        );

        let id = model.id.clone();
        self.entries.write().insert(id.clone(), model);
        self.pending.lock().push(id);
        Ok(())
    }

    /// Write queued registrations through to the persistent store.
    ///
    /// `discover_downloaded` is only consistent once this has run; it
    /// calls through here first.
    pub fn flush_pending_registrations(&self) -> Result<()> {
        let ids: Vec<String> = std::mem::take(&mut *self.pending.lock());
        if ids.is_empty() {
            return Ok(());
        }

        let entries = self.entries.read();
        for id in &ids {
            if let Some(model) = entries.get(id) {
                self.store
                    .upsert_model(model)
                    .map_err(edgekit_core::SdkError::from)?;
            }
        }
        tracing::debug!(flushed = ids.len(), "Flushed pending model registrations");
        Ok(())
    }

    /// Look up one model, with the sidecar file list re-attached.
    pub fn lookup(&self, id: &str) -> Option<ModelInfo> {
        let model = self.entries.read().get(id).cloned()?;
        Some(self.attach_files(model))
    }

    /// Sidecar file descriptors; `None` means single-file model.
    pub fn file_descriptors(&self, id: &str) -> Option<Vec<FileDescriptor>> {
        self.multi_file_cache.get(id).map(|f| f.clone())
    }

    pub fn filter_by_framework(&self, framework: Framework) -> Vec<ModelInfo> {
        self.entries
            .read()
            .values()
            .filter(|m| m.compatible_frameworks.contains(&framework))
            .cloned()
            .map(|m| self.attach_files(m))
            .collect()
    }

    pub fn filter_by_category(&self, category: ModelCategory) -> Vec<ModelInfo> {
        self.entries
            .read()
            .values()
            .filter(|m| m.category == category)
            .cloned()
            .map(|m| self.attach_files(m))
            .collect()
    }

    pub fn enumerate(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = self
            .entries
            .read()
            .values()
            .cloned()
            .map(|m| self.attach_files(m))
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        models
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove a model from the registry and the store. Files on disk are
    /// left for the loading service to clean up.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let existed = self.entries.write().remove(id).is_some();
        self.multi_file_cache.remove(id);
        self.pending.lock().retain(|p| p != id);
        self.store
            .delete_model(id)
            .map_err(edgekit_core::SdkError::from)?;
        Ok(existed)
    }

    /// Scan the model root and set `local_path` for every registered id
    /// whose expected files are all present. Idempotent; unregistered
    /// files on disk are ignored.
    pub fn discover_downloaded(&self) -> Result<usize> {
        self.flush_pending_registrations()?;

        let mut discovered = 0;
        let ids: Vec<String> = self.entries.read().keys().cloned().collect();

        for id in ids {
            let Some(model) = self.lookup(&id) else {
                continue;
            };
            if model.local_path.is_some() {
                continue;
            }

            let dir = self.model_dir(&id);
            let expected = model.expected_filenames();
            if expected.is_empty() {
                continue;
            }

            let all_present = expected.iter().all(|name| dir.join(name).is_file());
            if !all_present {
                continue;
            }

            let local_path = match &model.artifact_type {
                ArtifactType::MultiFile { .. } | ArtifactType::Directory => dir.clone(),
                _ => dir.join(&expected[0]),
            };

            tracing::info!(model_id = %id, path = %local_path.display(), "Discovered downloaded model");
            self.set_local_path(&id, local_path)?;
            discovered += 1;
        }

        Ok(discovered)
    }

    /// Record the on-disk location of a model and persist it.
    pub fn set_local_path(&self, id: &str, path: PathBuf) -> Result<()> {
        let updated = {
            let mut entries = self.entries.write();
            match entries.get_mut(id) {
                Some(model) => {
                    model.local_path = Some(path);
                    model.updated_at = chrono::Utc::now();
                    Some(model.clone())
                }
                None => None,
            }
        };
        if let Some(model) = updated {
            self.store
                .upsert_model(&model)
                .map_err(edgekit_core::SdkError::from)?;
        }
        Ok(())
    }

    /// Bump usage tracking after a load or generation.
    pub fn touch(&self, id: &str) -> Result<()> {
        let updated = {
            let mut entries = self.entries.write();
            match entries.get_mut(id) {
                Some(model) => {
                    model.touch();
                    Some(model.clone())
                }
                None => None,
            }
        };
        if let Some(model) = updated {
            self.store
                .upsert_model(&model)
                .map_err(edgekit_core::SdkError::from)?;
        }
        Ok(())
    }

    fn attach_files(&self, mut model: ModelInfo) -> ModelInfo {
        if model.artifact_type.is_multi_file() {
            match self.multi_file_cache.get(&model.id) {
                Some(files) => {
                    model.artifact_type = ArtifactType::MultiFile {
                        files: files.clone(),
                    };
                }
                // Sidecar absence means single-file.
                None => model.artifact_type = ArtifactType::SingleFile,
            }
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::{ModelFormat, ModelSource};

    fn registry() -> (ModelRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = ModelRegistry::new(store, dir.path()).unwrap();
        (registry, dir)
    }

    fn language_model(id: &str) -> ModelInfo {
        ModelInfo::new(id, id, ModelCategory::Language)
            .with_download_url(format!("https://host/{id}/weights.gguf"))
    }

    fn multi_file_model(id: &str) -> ModelInfo {
        ModelInfo::new(id, id, ModelCategory::SpeechRecognition).with_artifact_type(
            ArtifactType::MultiFile {
                files: vec![
                    FileDescriptor {
                        url: format!("https://host/{id}/encoder.onnx"),
                        filename: "encoder.onnx".into(),
                        size: None,
                        checksum: None,
                    },
                    FileDescriptor {
                        url: format!("https://host/{id}/decoder.onnx"),
                        filename: "decoder.onnx".into(),
                        size: None,
                        checksum: None,
                    },
                ],
            },
        )
    }

    #[test]
    fn test_register_then_lookup_identity() {
        let (registry, _dir) = registry();
        let model = language_model("m1");
        registry.register(model.clone()).unwrap();

        let found = registry.lookup("m1").unwrap();
        assert_eq!(found.id, "m1");
        assert_eq!(found.format, ModelFormat::Gguf);
    }

    #[test]
    fn test_reregister_replaces() {
        let (registry, _dir) = registry();
        registry.register(language_model("m1")).unwrap();

        let mut replacement = language_model("m1");
        replacement.name = "Renamed".into();
        replacement.source = ModelSource::Local;
        registry.register(replacement).unwrap();

        assert_eq!(registry.len(), 1);
        let found = registry.lookup("m1").unwrap();
        assert_eq!(found.name, "Renamed");
        assert_eq!(found.source, ModelSource::Local);
    }

    #[test]
    fn test_sidecar_survives_persistence_gap() {
        let (registry, _dir) = registry();
        registry.register(multi_file_model("m2")).unwrap();
        registry.flush_pending_registrations().unwrap();

        // The store dropped the file list, the sidecar kept it.
        let found = registry.lookup("m2").unwrap();
        match found.artifact_type {
            ArtifactType::MultiFile { files } => assert_eq!(files.len(), 2),
            other => panic!("unexpected artifact type: {other:?}"),
        }
        assert_eq!(registry.file_descriptors("m2").unwrap().len(), 2);
        assert!(registry.file_descriptors("m1").is_none());
    }

    #[test]
    fn test_filters() {
        let (registry, _dir) = registry();
        registry
            .register(language_model("m1").with_preferred_framework(Framework::LlamaCpp))
            .unwrap();
        registry.register(multi_file_model("m2")).unwrap();

        assert_eq!(registry.filter_by_category(ModelCategory::Language).len(), 1);
        assert_eq!(
            registry
                .filter_by_category(ModelCategory::SpeechRecognition)
                .len(),
            1
        );
        assert_eq!(registry.filter_by_framework(Framework::LlamaCpp).len(), 1);
        assert_eq!(registry.enumerate().len(), 2);
    }

    #[test]
    fn test_discover_downloaded_single_file() {
        let (registry, dir) = registry();
        registry.register(language_model("m1")).unwrap();

        // Not on disk yet
        assert_eq!(registry.discover_downloaded().unwrap(), 0);
        assert!(registry.lookup("m1").unwrap().local_path.is_none());

        std::fs::create_dir_all(dir.path().join("m1")).unwrap();
        std::fs::write(dir.path().join("m1/weights.gguf"), b"gguf").unwrap();

        assert_eq!(registry.discover_downloaded().unwrap(), 1);
        let found = registry.lookup("m1").unwrap();
        assert_eq!(
            found.local_path.unwrap(),
            dir.path().join("m1/weights.gguf")
        );

        // Idempotent: nothing changes on a second scan.
        assert_eq!(registry.discover_downloaded().unwrap(), 0);
    }

    #[test]
    fn test_discover_requires_every_file() {
        let (registry, dir) = registry();
        registry.register(multi_file_model("m2")).unwrap();

        std::fs::create_dir_all(dir.path().join("m2")).unwrap();
        std::fs::write(dir.path().join("m2/encoder.onnx"), b"onnx").unwrap();
        assert_eq!(registry.discover_downloaded().unwrap(), 0);

        std::fs::write(dir.path().join("m2/decoder.onnx"), b"onnx").unwrap();
        assert_eq!(registry.discover_downloaded().unwrap(), 1);
        assert_eq!(
            registry.lookup("m2").unwrap().local_path.unwrap(),
            dir.path().join("m2")
        );
    }

    #[test]
    fn test_unregistered_files_stay_invisible() {
        let (registry, dir) = registry();
        std::fs::create_dir_all(dir.path().join("ghost")).unwrap();
        std::fs::write(dir.path().join("ghost/weights.gguf"), b"gguf").unwrap();

        assert_eq!(registry.discover_downloaded().unwrap(), 0);
        assert!(registry.lookup("ghost").is_none());
    }

    #[test]
    fn test_remove() {
        let (registry, _dir) = registry();
        registry.register(multi_file_model("m2")).unwrap();
        assert!(registry.remove("m2").unwrap());
        assert!(!registry.remove("m2").unwrap());
        assert!(registry.lookup("m2").is_none());
        assert!(registry.file_descriptors("m2").is_none());
    }

    #[test]
    fn test_touch_updates_usage() {
        let (registry, _dir) = registry();
        registry.register(language_model("m1")).unwrap();
        registry.touch("m1").unwrap();
        registry.touch("m1").unwrap();

        let found = registry.lookup("m1").unwrap();
        assert_eq!(found.usage_count, 2);
        assert!(found.last_used.is_some());
    }
}

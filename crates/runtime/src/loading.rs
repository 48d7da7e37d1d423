//! Model loading service
//!
//! Turns a model id into a live [`LoadedModel`] exactly once per
//! concurrent caller: lookup, reuse, single-flight dedup, download via the
//! owning adapter's strategy (per-file locks, multi-file folders, archive
//! extraction through the platform adapter), checksum verification,
//! adapter selection, service creation. Memory pressure evicts loaded
//! models LRU by last use.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use edgekit_core::{
    error_context, ArtifactType, CancellationToken, Capability, DownloadStrategy, ErrorCode,
    Event, EventBus, EventPayload, Modality, ModelInfo, ModelPhase, PlatformAdapter, Result,
    SdkError, ServiceHandle,
};
use edgekit_registry::{AdapterRegistry, ModelRegistry};

use crate::download::HttpDownloadStrategy;

/// One loaded model with its live service.
pub struct LoadedModel {
    pub info: ModelInfo,
    pub service: ServiceHandle,
    pub modality: Modality,
    pub loaded_at: Instant,
    last_used: Mutex<Instant>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("info", &self.info)
            .field("modality", &self.modality)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

impl LoadedModel {
    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }
}

/// Single-flight model loader and cache.
pub struct ModelLoadingService {
    registry: Arc<ModelRegistry>,
    adapters: Arc<AdapterRegistry>,
    platform: Arc<dyn PlatformAdapter>,
    bus: EventBus,
    default_strategy: Arc<dyn DownloadStrategy>,
    /// capability:model_id -> loaded entry
    loaded: DashMap<String, Arc<LoadedModel>>,
    /// model_id -> single-flight guard
    model_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// destination path -> single-writer guard
    file_locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
    retry_count: u32,
    memory_threshold_bytes: u64,
}

impl ModelLoadingService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        adapters: Arc<AdapterRegistry>,
        platform: Arc<dyn PlatformAdapter>,
        bus: EventBus,
        retry_count: u32,
        memory_threshold_bytes: u64,
    ) -> Result<Self> {
        let default_strategy: Arc<dyn DownloadStrategy> = match platform.http_download() {
            Some(strategy) => strategy,
            None => Arc::new(HttpDownloadStrategy::new(Duration::from_secs(60))?),
        };

        Ok(Self {
            registry,
            adapters,
            platform,
            bus,
            default_strategy,
            loaded: DashMap::new(),
            model_locks: DashMap::new(),
            file_locks: DashMap::new(),
            retry_count,
            memory_threshold_bytes,
        })
    }

    fn cache_key(capability: Capability, model_id: &str) -> String {
        format!("{capability}:{model_id}")
    }

    /// Load a model, deduplicating concurrent callers per model id.
    pub async fn load_model(
        &self,
        model_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<LoadedModel>> {
        let info = self.registry.lookup(model_id).ok_or_else(|| {
            SdkError::new(
                ErrorCode::ModelNotFound,
                format!("model {model_id} is not registered"),
            )
            .with_context(error_context!())
        })?;
        let capability = Capability::for_category(info.category);
        let key = Self::cache_key(capability, model_id);

        if let Some(existing) = self.loaded.get(&key) {
            existing.touch();
            return Ok(existing.clone());
        }

        // Single-flight: the first caller loads, the rest wait here and
        // find the cached entry.
        let lock = self
            .model_locks
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(existing) = self.loaded.get(&key) {
            existing.touch();
            return Ok(existing.clone());
        }

        cancel.check()?;
        let started = Instant::now();
        self.publish(model_id, ModelPhase::LoadingStarted);

        match self.load_inner(&info, cancel).await {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                self.loaded.insert(key, loaded.clone());
                self.registry.touch(model_id)?;
                self.publish(
                    model_id,
                    ModelPhase::LoadCompleted {
                        duration_ms: started.elapsed().as_millis() as u64,
                    },
                );
                Ok(loaded)
            }
            Err(e) => {
                self.publish(
                    model_id,
                    ModelPhase::LoadFailed {
                        message: e.message().to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn load_inner(
        &self,
        info: &ModelInfo,
        cancel: &CancellationToken,
    ) -> Result<LoadedModel> {
        let local_path = self.ensure_local(info, cancel).await?;
        self.verify_files(info, &local_path)?;
        self.verify_checksums(info, &local_path).await?;

        cancel.check()?;
        let adapter = self.adapters.find_best_adapter(info).ok_or_else(|| {
            SdkError::new(
                ErrorCode::AdapterNotFound,
                format!(
                    "no adapter for model {} (format {:?}, category {:?})",
                    info.id, info.format, info.category
                ),
            )
        })?;

        let service = adapter
            .load_model(info, &local_path)
            .await
            .map_err(|e| match e.code() {
                // Adapter-specific codes pass through untouched.
                ErrorCode::Unknown => {
                    SdkError::new(ErrorCode::ServiceInitFailed, e.message().to_string())
                }
                _ => e,
            })?;

        Ok(LoadedModel {
            modality: Modality::for_category(info.category),
            info: info.clone(),
            service,
            loaded_at: Instant::now(),
            last_used: Mutex::new(Instant::now()),
        })
    }

    /// Resolve the model's on-disk location, downloading when absent.
    async fn ensure_local(
        &self,
        info: &ModelInfo,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if let Some(path) = &info.local_path {
            return Ok(path.clone());
        }

        let dir = self.registry.model_dir(&info.id);
        let strategy = self
            .adapters
            .find_best_adapter(info)
            .and_then(|a| a.download_strategy())
            .unwrap_or_else(|| self.default_strategy.clone());

        self.publish(&info.id, ModelPhase::DownloadStarted);
        let result = self
            .download_artifacts(info, &dir, strategy, cancel)
            .await;

        match result {
            Ok(local) => {
                self.publish(&info.id, ModelPhase::DownloadCompleted);
                self.registry.set_local_path(&info.id, local.clone())?;
                Ok(local)
            }
            Err(e) => {
                self.publish(
                    &info.id,
                    ModelPhase::DownloadFailed {
                        message: e.message().to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn download_artifacts(
        &self,
        info: &ModelInfo,
        dir: &PathBuf,
        strategy: Arc<dyn DownloadStrategy>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        match &info.artifact_type {
            ArtifactType::MultiFile { files } => {
                // All files live in one per-model folder.
                for file in files {
                    let dest = dir.join(&file.filename);
                    self.download_one(&strategy, &info.id, &file.url, &dest, cancel)
                        .await?;
                }
                Ok(dir.clone())
            }
            ArtifactType::Archive { .. } => {
                let url = info.download_url.as_deref().ok_or_else(|| {
                    SdkError::new(
                        ErrorCode::DownloadFailed,
                        format!("model {} has no download url", info.id),
                    )
                })?;
                let archive_name = edgekit_core::filename_from_url(url)
                    .unwrap_or_else(|| "archive.bin".to_string());
                let archive_path = dir.join(archive_name);
                self.download_one(&strategy, &info.id, url, &archive_path, cancel)
                    .await?;

                let extracted = self
                    .platform
                    .extract_archive(&archive_path, dir)
                    .map_err(|e| {
                        SdkError::new(
                            ErrorCode::ExtractionFailed,
                            format!("failed to extract {}: {}", info.id, e.message()),
                        )
                    })?;
                Ok(extracted)
            }
            ArtifactType::SingleFile => {
                let url = info.download_url.as_deref().ok_or_else(|| {
                    SdkError::new(
                        ErrorCode::DownloadFailed,
                        format!("model {} has neither local path nor download url", info.id),
                    )
                })?;
                let filename = edgekit_core::filename_from_url(url).ok_or_else(|| {
                    SdkError::new(
                        ErrorCode::DownloadFailed,
                        format!("cannot derive a filename from the url of model {}", info.id),
                    )
                })?;
                let dest = dir.join(filename);
                self.download_one(&strategy, &info.id, url, &dest, cancel)
                    .await?;
                Ok(dest)
            }
            ArtifactType::Directory => Err(SdkError::new(
                ErrorCode::DownloadFailed,
                format!(
                    "model {} is a directory artifact and must be installed locally",
                    info.id
                ),
            )),
        }
    }

    /// Download one file under a per-file lock; existing files are reused.
    async fn download_one(
        &self,
        strategy: &Arc<dyn DownloadStrategy>,
        model_id: &str,
        url: &str,
        dest: &PathBuf,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let lock = self
            .file_locks
            .entry(dest.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if self.platform.file_exists(dest) {
            return Ok(());
        }

        let bus = self.bus.clone();
        let id = model_id.to_string();
        let progress: edgekit_core::ProgressCallback = Arc::new(move |bytes, total| {
            bus.publish(Event::new(EventPayload::Model {
                model_id: id.clone(),
                phase: ModelPhase::DownloadProgress { bytes, total },
            }));
        });

        let mut backoff = Duration::from_millis(250);
        let mut last_error: Option<SdkError> = None;
        for attempt in 0..=self.retry_count {
            cancel.check()?;
            if attempt > 0 {
                let jitter = 0.8 + rand::random::<f64>() * 0.4;
                tokio::time::sleep(backoff.mul_f64(jitter)).await;
                backoff *= 2;
            }

            match strategy
                .download(url, dest, Some(progress.clone()), cancel)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() => {
                    tracing::warn!(model_id, url, attempt, error = %e, "Transient download failure");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SdkError::new(ErrorCode::DownloadFailed, format!("download of {url} failed"))
        }))
    }

    /// A multi-file model missing any file never partially loads.
    fn verify_files(&self, info: &ModelInfo, local_path: &PathBuf) -> Result<()> {
        if let ArtifactType::MultiFile { files } = &info.artifact_type {
            for file in files {
                let path = local_path.join(&file.filename);
                if !self.platform.file_exists(&path) {
                    return Err(SdkError::new(
                        ErrorCode::ModelNotFound,
                        format!("model {} is missing file {}", info.id, file.filename),
                    ));
                }
            }
        } else if !self.platform.file_exists(local_path) {
            return Err(SdkError::new(
                ErrorCode::ModelNotFound,
                format!("model {} has no artifact on disk", info.id),
            ));
        }
        Ok(())
    }

    async fn verify_checksums(&self, info: &ModelInfo, local_path: &PathBuf) -> Result<()> {
        match &info.artifact_type {
            ArtifactType::MultiFile { files } => {
                for file in files {
                    if let Some(expected) = &file.checksum {
                        verify_sha256(&local_path.join(&file.filename), expected).await?;
                    }
                }
            }
            _ => {
                if let Some(expected) = &info.checksum {
                    verify_sha256(local_path, expected).await?;
                }
            }
        }
        Ok(())
    }

    /// Loaded entry for a model id under any capability.
    pub fn loaded_model(&self, model_id: &str) -> Option<Arc<LoadedModel>> {
        self.loaded
            .iter()
            .find(|entry| entry.value().info.id == model_id)
            .map(|entry| entry.value().clone())
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.loaded_model(model_id).is_some()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Unload a model and clean up its service.
    pub async fn unload(&self, model_id: &str) -> Result<bool> {
        let keys: Vec<String> = self
            .loaded
            .iter()
            .filter(|entry| entry.value().info.id == model_id)
            .map(|entry| entry.key().clone())
            .collect();
        if keys.is_empty() {
            return Ok(false);
        }

        for key in keys {
            if let Some((_, loaded)) = self.loaded.remove(&key) {
                cleanup_service(&loaded.service).await;
            }
        }
        self.publish(model_id, ModelPhase::UnloadCompleted);
        tracing::info!(model_id, "Model unloaded");
        Ok(true)
    }

    pub async fn unload_all(&self) {
        let ids: Vec<String> = self
            .loaded
            .iter()
            .map(|entry| entry.value().info.id.clone())
            .collect();
        for id in ids {
            let _ = self.unload(&id).await;
        }
    }

    /// Evict the least-recently-used model; returns its id.
    pub async fn evict_lru(&self) -> Option<String> {
        let oldest = self
            .loaded
            .iter()
            .min_by_key(|entry| entry.value().last_used())
            .map(|entry| entry.value().info.id.clone())?;
        let _ = self.unload(&oldest).await;
        Some(oldest)
    }

    /// On host memory pressure, unload LRU models until available memory
    /// rises above the configured threshold.
    pub async fn handle_memory_pressure(&self) {
        loop {
            let info = self.platform.memory_info();
            if info.available_bytes >= self.memory_threshold_bytes {
                return;
            }
            match self.evict_lru().await {
                Some(id) => {
                    tracing::warn!(model_id = %id, "Evicted model under memory pressure")
                }
                None => return,
            }
        }
    }

    fn publish(&self, model_id: &str, phase: ModelPhase) {
        self.bus.publish(Event::new(EventPayload::Model {
            model_id: model_id.to_string(),
            phase,
        }));
    }
}

async fn cleanup_service(service: &ServiceHandle) {
    let result = match service {
        ServiceHandle::Llm(s) => s.cleanup().await,
        ServiceHandle::Stt(s) => s.cleanup().await,
        ServiceHandle::Tts(s) => s.cleanup().await,
        ServiceHandle::Vad(s) => s.cleanup().await,
        ServiceHandle::Diarization(s) => {
            s.reset();
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "Service cleanup reported an error");
    }
}

async fn verify_sha256(path: &PathBuf, expected: &str) -> Result<()> {
    let path = path.clone();
    let expected = expected.to_ascii_lowercase();
    let actual = tokio::task::spawn_blocking(move || -> Result<String> {
        let bytes = std::fs::read(&path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| SdkError::new(ErrorCode::IoError, format!("checksum task failed: {e}")))??;

    if actual != expected {
        return Err(SdkError::new(
            ErrorCode::ChecksumMismatch,
            format!("checksum mismatch: expected {expected}, got {actual}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgekit_core::{
        FileDescriptor, Framework, GenerationOptions, LlmService, LogLevel, MemoryInfo,
        ModelCategory, ModelFormat,
    };
    use edgekit_persistence::Store;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

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
            _: &CancellationToken,
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

    struct TestPlatform {
        available: AtomicU64,
    }

    impl TestPlatform {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                available: AtomicU64::new(u64::MAX),
            })
        }
    }

    impl PlatformAdapter for TestPlatform {
        fn log(&self, _level: LogLevel, _message: &str) {}

        fn file_exists(&self, path: &std::path::Path) -> bool {
            path.exists()
        }

        fn file_read(&self, path: &std::path::Path) -> Result<Vec<u8>> {
            Ok(std::fs::read(path)?)
        }

        fn file_write(&self, path: &std::path::Path, data: &[u8]) -> Result<()> {
            std::fs::write(path, data)?;
            Ok(())
        }

        fn file_delete(&self, path: &std::path::Path) -> Result<()> {
            std::fs::remove_file(path)?;
            Ok(())
        }

        fn secure_get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn secure_set(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn secure_delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        fn now_ms(&self) -> u64 {
            0
        }

        fn memory_info(&self) -> MemoryInfo {
            MemoryInfo {
                total_bytes: u64::MAX,
                available_bytes: self.available.load(Ordering::Relaxed),
            }
        }
    }

    struct GgufAdapter {
        loads: AtomicU32,
        delay: Duration,
    }

    impl GgufAdapter {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicU32::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl edgekit_core::FrameworkAdapter for GgufAdapter {
        fn framework(&self) -> Framework {
            Framework::LlamaCpp
        }

        fn supported_modalities(&self) -> Vec<Modality> {
            vec![Modality::TextToText]
        }

        fn supported_formats(&self) -> Vec<ModelFormat> {
            vec![ModelFormat::Gguf]
        }

        async fn load_model(
            &self,
            _model: &ModelInfo,
            _local_path: &std::path::Path,
        ) -> Result<ServiceHandle> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(ServiceHandle::Llm(Arc::new(NoopLlm)))
        }
    }

    struct Fixture {
        service: Arc<ModelLoadingService>,
        registry: Arc<ModelRegistry>,
        adapter: Arc<GgufAdapter>,
        platform: Arc<TestPlatform>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with_delay(Duration::ZERO)
    }

    fn fixture_with_delay(delay: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(ModelRegistry::new(store, dir.path()).unwrap());
        let adapters = Arc::new(AdapterRegistry::new());
        let adapter = GgufAdapter::new(delay);
        adapters.register(adapter.clone(), 0);
        let platform = TestPlatform::new();
        let service = Arc::new(
            ModelLoadingService::new(
                registry.clone(),
                adapters,
                platform.clone(),
                EventBus::new(),
                0,
                512 * 1024 * 1024,
            )
            .unwrap(),
        );
        Fixture {
            service,
            registry,
            adapter,
            platform,
            _dir: dir,
        }
    }

    fn place_model(fixture: &Fixture, id: &str) {
        let dir = fixture.registry.model_dir(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("t.gguf"), b"gguf-bytes").unwrap();
    }

    fn register_gguf(fixture: &Fixture, id: &str) {
        fixture
            .registry
            .register(
                ModelInfo::new(id, id, ModelCategory::Language)
                    .with_download_url(format!("file:///unused/{id}/t.gguf"))
                    .with_preferred_framework(Framework::LlamaCpp),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_registration_then_load() {
        let fixture = fixture();
        register_gguf(&fixture, "m1");
        place_model(&fixture, "m1");

        let loaded = fixture
            .service
            .load_model("m1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(loaded.info.id, "m1");
        assert_eq!(loaded.modality, Modality::TextToText);
        assert!(fixture.service.is_loaded("m1"));
        assert_eq!(fixture.registry.lookup("m1").unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_model_fails() {
        let fixture = fixture();
        let err = fixture
            .service
            .load_model("ghost", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModelNotFound);
    }

    #[tokio::test]
    async fn test_concurrent_loads_are_single_flight() {
        let fixture = fixture_with_delay(Duration::from_millis(30));
        register_gguf(&fixture, "m1");
        place_model(&fixture, "m1");

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = fixture.service.clone();
            handles.push(tokio::spawn(async move {
                service.load_model("m1", &CancellationToken::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fixture.adapter.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multi_file_missing_any_file_is_model_not_found() {
        let fixture = fixture();
        // Only the first file is present on disk.
        let dir = fixture.registry.model_dir("m2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.gguf"), b"a").unwrap();

        fixture
            .registry
            .register(
                ModelInfo::new("m2", "Multi", ModelCategory::Language)
                    .with_preferred_framework(Framework::LlamaCpp)
                    .with_format(ModelFormat::Gguf)
                    .with_local_path(dir)
                    .with_artifact_type(ArtifactType::MultiFile {
                        files: vec![
                            FileDescriptor {
                                url: "file:///unused/a.gguf".into(),
                                filename: "a.gguf".into(),
                                size: None,
                                checksum: None,
                            },
                            FileDescriptor {
                                url: "file:///missing/b.gguf".into(),
                                filename: "b.gguf".into(),
                                size: None,
                                checksum: None,
                            },
                        ],
                    }),
            )
            .unwrap();

        let err = fixture
            .service
            .load_model("m2", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModelNotFound);
        assert!(!fixture.service.is_loaded("m2"));
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let fixture = fixture();
        fixture
            .registry
            .register(
                ModelInfo::new("m1", "M", ModelCategory::Language)
                    .with_download_url("file:///unused/t.gguf")
                    .with_preferred_framework(Framework::LlamaCpp)
                    .with_checksum("deadbeef"),
            )
            .unwrap();
        place_model(&fixture, "m1");

        let err = fixture
            .service
            .load_model("m1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChecksumMismatch);
    }

    #[tokio::test]
    async fn test_unload() {
        let fixture = fixture();
        register_gguf(&fixture, "m1");
        place_model(&fixture, "m1");
        fixture
            .service
            .load_model("m1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(fixture.service.unload("m1").await.unwrap());
        assert!(!fixture.service.is_loaded("m1"));
        assert!(fixture.service.loaded_model("m1").is_none());
        assert!(!fixture.service.unload("m1").await.unwrap());
    }

    #[tokio::test]
    async fn test_lru_eviction_order() {
        let fixture = fixture();
        for id in ["m1", "m2"] {
            register_gguf(&fixture, id);
            place_model(&fixture, id);
            fixture
                .service
                .load_model(id, &CancellationToken::new())
                .await
                .unwrap();
        }

        // m1 used most recently; m2 is the LRU victim.
        fixture.service.loaded_model("m1").unwrap().touch();
        let evicted = fixture.service.evict_lru().await.unwrap();
        assert_eq!(evicted, "m2");
        assert!(fixture.service.is_loaded("m1"));
    }

    #[tokio::test]
    async fn test_memory_pressure_unloads_until_empty() {
        let fixture = fixture();
        for id in ["m1", "m2"] {
            register_gguf(&fixture, id);
            place_model(&fixture, id);
            fixture
                .service
                .load_model(id, &CancellationToken::new())
                .await
                .unwrap();
        }

        fixture.platform.available.store(0, Ordering::Relaxed);
        fixture.service.handle_memory_pressure().await;
        assert_eq!(fixture.service.loaded_count(), 0);
    }

    #[tokio::test]
    async fn test_reload_after_unload_loads_again() {
        let fixture = fixture();
        register_gguf(&fixture, "m1");
        place_model(&fixture, "m1");

        fixture
            .service
            .load_model("m1", &CancellationToken::new())
            .await
            .unwrap();
        fixture.service.unload("m1").await.unwrap();
        fixture
            .service
            .load_model("m1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fixture.adapter.loads.load(Ordering::SeqCst), 2);
    }
}

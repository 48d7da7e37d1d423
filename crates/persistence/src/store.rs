//! Embedded store over SQLite
//!
//! One connection guarded by a mutex; callers are synchronous and short.
//! Writes happen on the caller's thread, which keeps the registry's
//! many-readers/single-writer policy at the API layer above.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use edgekit_core::{
    ArchiveKind, ArtifactType, DeviceInfo, ErrorCode, Framework, ModelCategory, ModelFormat,
    ModelInfo, ModelSource, SdkError,
};

use crate::schema::CREATE_TABLES;

/// Store-level error, converted to the SDK storage category at the
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for SdkError {
    fn from(e: StoreError) -> Self {
        let code = match &e {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseCorrupt =>
            {
                ErrorCode::CorruptDatabase
            }
            StoreError::Database(_) => ErrorCode::IoError,
            StoreError::Serialization(_) => ErrorCode::IoError,
        };
        SdkError::new(code, e.to_string()).with_source(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One unflushed telemetry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRow {
    pub id: String,
    pub event_type: String,
    pub modality: String,
    /// Serialized event payload, transmitted as-is
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Embedded local database holding models, telemetry, configuration, and
/// device info.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory database for tests and ephemeral hosts.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- models ----

    /// Insert or replace a model row. Multi-file lists are not persisted;
    /// the registry keeps those in its sidecar cache.
    pub fn upsert_model(&self, model: &ModelInfo) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO models (
                id, name, category, format, artifact_kind, download_url, local_path,
                download_size, memory_required, frameworks, preferred_framework,
                context_length, supports_thinking, checksum, usage_count, last_used,
                source, created_at, updated_at, sync_pending
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                model.id,
                model.name,
                enum_tag(&model.category)?,
                enum_tag(&model.format)?,
                artifact_kind(&model.artifact_type),
                model.download_url,
                model.local_path.as_ref().map(|p| p.to_string_lossy().to_string()),
                model.download_size,
                model.memory_required,
                serde_json::to_string(&model.compatible_frameworks)?,
                model
                    .preferred_framework
                    .as_ref()
                    .map(enum_tag)
                    .transpose()?,
                model.context_length,
                model.supports_thinking as i64,
                model.checksum,
                model.usage_count as i64,
                model.last_used.map(|t| t.to_rfc3339()),
                enum_tag(&model.source)?,
                model.created_at.to_rfc3339(),
                model.updated_at.to_rfc3339(),
                model.sync_pending as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_model(&self, id: &str) -> StoreResult<Option<ModelInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM models WHERE id = ?1")?;
        let model = stmt
            .query_row(params![id], row_to_model)
            .optional()?
            .transpose()?;
        Ok(model)
    }

    pub fn list_models(&self) -> StoreResult<Vec<ModelInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM models ORDER BY id")?;
        let rows = stmt.query_map([], row_to_model)?;
        let mut models = Vec::new();
        for row in rows {
            models.push(row??);
        }
        Ok(models)
    }

    pub fn delete_model(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM models WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ---- telemetry ----

    /// Persist unflushed events so they survive restarts.
    pub fn persist_telemetry(&self, rows: &[TelemetryRow]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for row in rows {
            tx.execute(
                "INSERT OR REPLACE INTO telemetry
                    (id, event_type, modality, payload, created_at, updated_at, sync_pending)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                params![
                    row.id,
                    row.event_type,
                    row.modality,
                    row.payload,
                    row.created_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Unflushed events in submission order.
    pub fn pending_telemetry(&self, limit: usize) -> StoreResult<Vec<TelemetryRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, modality, payload, created_at
             FROM telemetry WHERE sync_pending = 1
             ORDER BY created_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(TelemetryRow {
                id: row.get(0)?,
                event_type: row.get(1)?,
                modality: row.get(2)?,
                payload: row.get(3)?,
                created_at: parse_timestamp(row.get::<_, String>(4)?),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Remove rows after a successful transmit.
    pub fn delete_telemetry(&self, ids: &[String]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM telemetry WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pending_telemetry_count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM telemetry WHERE sync_pending = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ---- configuration ----

    pub fn save_configuration(&self, key: &str, value: &str, source: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO configuration (key, value, source, created_at, updated_at, sync_pending)
             VALUES (?1, ?2, ?3, ?4, ?4, 0)
             ON CONFLICT(key) DO UPDATE SET value = ?2, source = ?3, updated_at = ?4",
            params![key, value, source, now],
        )?;
        Ok(())
    }

    pub fn load_configuration(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM configuration WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // ---- device info ----

    pub fn save_device_info(&self, info: &DeviceInfo) -> StoreResult<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO device_info
                (device_id, device_type, platform, sdk_version, created_at, updated_at, sync_pending)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)
             ON CONFLICT(device_id) DO UPDATE SET
                device_type = ?2, platform = ?3, sdk_version = ?4, updated_at = ?5",
            params![
                info.device_id,
                info.device_type,
                info.platform,
                info.sdk_version,
                now
            ],
        )?;
        Ok(())
    }

    pub fn load_device_info(&self) -> StoreResult<Option<DeviceInfo>> {
        let conn = self.conn.lock();
        let info = conn
            .query_row(
                "SELECT device_id, device_type, platform, sdk_version
                 FROM device_info ORDER BY created_at ASC LIMIT 1",
                [],
                |row| {
                    Ok(DeviceInfo {
                        device_id: row.get(0)?,
                        device_type: row.get(1)?,
                        platform: row.get(2)?,
                        sdk_version: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}

/// serde's external tag for a fieldless enum value ("language", "gguf", …).
fn enum_tag<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    let json = serde_json::to_string(value)?;
    Ok(json.trim_matches('"').to_string())
}

fn parse_enum_tag<T: serde::de::DeserializeOwned>(tag: &str) -> StoreResult<T> {
    Ok(serde_json::from_str(&format!("\"{tag}\""))?)
}

fn artifact_kind(artifact: &ArtifactType) -> String {
    match artifact {
        ArtifactType::SingleFile => "single_file".to_string(),
        ArtifactType::Archive { format } => match format {
            ArchiveKind::Zip => "archive:zip".to_string(),
            ArchiveKind::TarGz => "archive:tar_gz".to_string(),
            ArchiveKind::TarBz2 => "archive:tar_bz2".to_string(),
        },
        ArtifactType::MultiFile { .. } => "multi_file".to_string(),
        ArtifactType::Directory => "directory".to_string(),
    }
}

fn parse_artifact_kind(kind: &str) -> ArtifactType {
    match kind {
        "archive:zip" => ArtifactType::Archive {
            format: ArchiveKind::Zip,
        },
        "archive:tar_gz" => ArtifactType::Archive {
            format: ArchiveKind::TarGz,
        },
        "archive:tar_bz2" => ArtifactType::Archive {
            format: ArchiveKind::TarBz2,
        },
        // The file list lives in the registry's sidecar cache only.
        "multi_file" => ArtifactType::MultiFile { files: Vec::new() },
        "directory" => ArtifactType::Directory,
        _ => ArtifactType::SingleFile,
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<ModelInfo>> {
    Ok(build_model(row))
}

fn build_model(row: &rusqlite::Row<'_>) -> StoreResult<ModelInfo> {
    let category: ModelCategory = parse_enum_tag(&row.get::<_, String>("category")?)?;
    let format: ModelFormat = parse_enum_tag(&row.get::<_, String>("format")?)?;
    let source: ModelSource = parse_enum_tag(&row.get::<_, String>("source")?)?;
    let frameworks: Vec<Framework> =
        serde_json::from_str(&row.get::<_, String>("frameworks")?)?;
    let preferred_framework = row
        .get::<_, Option<String>>("preferred_framework")?
        .map(|tag| parse_enum_tag::<Framework>(&tag))
        .transpose()?;

    Ok(ModelInfo {
        id: row.get("id")?,
        name: row.get("name")?,
        category,
        format,
        artifact_type: parse_artifact_kind(&row.get::<_, String>("artifact_kind")?),
        download_url: row.get("download_url")?,
        local_path: row
            .get::<_, Option<String>>("local_path")?
            .map(Into::into),
        download_size: row.get("download_size")?,
        memory_required: row.get("memory_required")?,
        compatible_frameworks: frameworks,
        preferred_framework,
        context_length: row.get("context_length")?,
        supports_thinking: row.get::<_, i64>("supports_thinking")? != 0,
        checksum: row.get("checksum")?,
        usage_count: row.get::<_, i64>("usage_count")? as u64,
        last_used: row
            .get::<_, Option<String>>("last_used")?
            .map(parse_timestamp),
        source,
        created_at: parse_timestamp(row.get::<_, String>("created_at")?),
        updated_at: parse_timestamp(row.get::<_, String>("updated_at")?),
        sync_pending: row.get::<_, i64>("sync_pending")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::FileDescriptor;

    fn sample_model() -> ModelInfo {
        ModelInfo::new("m1", "Model One", ModelCategory::Language)
            .with_download_url("https://host/m1/weights.gguf")
            .with_preferred_framework(Framework::LlamaCpp)
            .with_context_length(4096)
            .normalized()
            .unwrap()
    }

    #[test]
    fn test_model_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let model = sample_model();
        store.upsert_model(&model).unwrap();

        let loaded = store.get_model("m1").unwrap().unwrap();
        assert_eq!(loaded.id, model.id);
        assert_eq!(loaded.format, ModelFormat::Gguf);
        assert_eq!(loaded.preferred_framework, Some(Framework::LlamaCpp));
        assert_eq!(loaded.context_length, Some(4096));
    }

    #[test]
    fn test_upsert_replaces() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_model(&sample_model()).unwrap();

        let mut updated = sample_model();
        updated.name = "Renamed".to_string();
        store.upsert_model(&updated).unwrap();

        let models = store.list_models().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "Renamed");
    }

    #[test]
    fn test_multi_file_list_is_not_persisted() {
        let store = Store::open_in_memory().unwrap();
        let model = ModelInfo::new("m2", "Multi", ModelCategory::SpeechRecognition)
            .with_artifact_type(ArtifactType::MultiFile {
                files: vec![FileDescriptor {
                    url: "https://host/m2/encoder.onnx".into(),
                    filename: "encoder.onnx".into(),
                    size: None,
                    checksum: None,
                }],
            });
        store.upsert_model(&model).unwrap();

        let loaded = store.get_model("m2").unwrap().unwrap();
        match loaded.artifact_type {
            ArtifactType::MultiFile { files } => assert!(files.is_empty()),
            other => panic!("unexpected artifact type: {other:?}"),
        }
    }

    #[test]
    fn test_delete_model() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_model(&sample_model()).unwrap();
        assert!(store.delete_model("m1").unwrap());
        assert!(!store.delete_model("m1").unwrap());
        assert!(store.get_model("m1").unwrap().is_none());
    }

    #[test]
    fn test_telemetry_persist_and_drain() {
        let store = Store::open_in_memory().unwrap();
        let rows: Vec<TelemetryRow> = (0..3)
            .map(|i| TelemetryRow {
                id: format!("e{i}"),
                event_type: "generation_completed".into(),
                modality: "llm".into(),
                payload: "{}".into(),
                created_at: Utc::now(),
            })
            .collect();
        store.persist_telemetry(&rows).unwrap();
        assert_eq!(store.pending_telemetry_count().unwrap(), 3);

        let pending = store.pending_telemetry(10).unwrap();
        assert_eq!(pending.len(), 3);

        let ids: Vec<String> = pending.iter().map(|r| r.id.clone()).collect();
        store.delete_telemetry(&ids).unwrap();
        assert_eq!(store.pending_telemetry_count().unwrap(), 0);
    }

    #[test]
    fn test_configuration_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_configuration("remote", "{\"a\":1}", "remote")
            .unwrap();
        store
            .save_configuration("remote", "{\"a\":2}", "remote")
            .unwrap();
        assert_eq!(
            store.load_configuration("remote").unwrap().as_deref(),
            Some("{\"a\":2}")
        );
        assert!(store.load_configuration("missing").unwrap().is_none());
    }

    #[test]
    fn test_device_info_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_device_info().unwrap().is_none());

        let info = DeviceInfo::with_id("device-1".into());
        store.save_device_info(&info).unwrap();
        assert_eq!(store.load_device_info().unwrap(), Some(info));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edgekit.db");
        {
            let store = Store::open(&path).unwrap();
            store.upsert_model(&sample_model()).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_models().unwrap().len(), 1);
    }
}

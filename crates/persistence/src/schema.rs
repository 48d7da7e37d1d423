//! SQLite schema
//!
//! Four tables back the SDK's durable state. Every table carries
//! `created_at`, `updated_at`, and `sync_pending` bookkeeping columns.
//!
//! The `models` table intentionally has no column for multi-file lists;
//! the registry keeps those in its in-process sidecar cache.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS models (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    category      TEXT NOT NULL,
    format        TEXT NOT NULL,
    artifact_kind TEXT NOT NULL,
    download_url  TEXT,
    local_path    TEXT,
    download_size INTEGER,
    memory_required INTEGER,
    frameworks    TEXT NOT NULL,
    preferred_framework TEXT,
    context_length INTEGER,
    supports_thinking INTEGER NOT NULL DEFAULT 0,
    checksum      TEXT,
    usage_count   INTEGER NOT NULL DEFAULT 0,
    last_used     TEXT,
    source        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    sync_pending  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS telemetry (
    id           TEXT PRIMARY KEY,
    event_type   TEXT NOT NULL,
    modality     TEXT NOT NULL,
    payload      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    sync_pending INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS configuration (
    key          TEXT PRIMARY KEY,
    value        TEXT NOT NULL,
    source       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    sync_pending INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS device_info (
    device_id    TEXT PRIMARY KEY,
    device_type  TEXT NOT NULL,
    platform     TEXT NOT NULL,
    sdk_version  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    sync_pending INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_telemetry_pending ON telemetry (sync_pending, created_at);
CREATE INDEX IF NOT EXISTS idx_models_category ON models (category);
"#;

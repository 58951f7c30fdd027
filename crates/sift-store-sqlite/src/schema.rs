//! SQL schema for the Sift SQLite store.
//!
//! Executed once at connection startup. Databases created by an older
//! version are first brought forward with [`MIGRATIONS`], gated on
//! `PRAGMA user_version`.

pub const SCHEMA_VERSION: i64 = 2;

/// `(version, ddl)`: run when the database is older than `version`.
pub const MIGRATIONS: &[(i64, &str)] = &[(2, "ALTER TABLE archives ADD COLUMN started_at TEXT;")];

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS services (
    service_id        TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    priority          INTEGER NOT NULL DEFAULT 0,
    archive_extension TEXT NOT NULL    -- 'zip' | 'csv'
);

CREATE TABLE IF NOT EXISTS requests (
    request_id   TEXT PRIMARY KEY,
    subject_id   TEXT NOT NULL,
    email        TEXT NOT NULL,
    token        TEXT NOT NULL UNIQUE,
    services     TEXT NOT NULL DEFAULT '[]',   -- JSON array of service ids
    extras       TEXT NOT NULL DEFAULT '{}',   -- JSON object
    can_email    INTEGER NOT NULL DEFAULT 1,
    last_emailed TEXT,
    requested_at TEXT NOT NULL
);

-- processed_at and skipped_at are mutually exclusive; either one is final.
-- started_at is set once, when a worker claims the archive.
CREATE TABLE IF NOT EXISTS archives (
    archive_id   TEXT PRIMARY KEY,
    request_id   TEXT NOT NULL REFERENCES requests(request_id) ON DELETE CASCADE,
    service_id   TEXT NOT NULL,
    path         TEXT NOT NULL,
    uploaded_at  TEXT NOT NULL,
    started_at   TEXT,
    processed_at TEXT,
    skipped_at   TEXT,
    CHECK (processed_at IS NULL OR skipped_at IS NULL)
);

-- Records are append-only; only subject_id is ever rewritten (request merges).
CREATE TABLE IF NOT EXISTS records (
    record_id     TEXT PRIMARY KEY,
    generator_id  TEXT NOT NULL,
    subject_id    TEXT NOT NULL,
    secondary_tag TEXT,              -- 'active' | 'passive' | 'incoming active' | 'none'
    properties    TEXT NOT NULL,     -- JSON object
    occurred_at   TEXT NOT NULL,     -- ISO 8601 UTC
    ingested_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_subject_idx   ON records(subject_id);
CREATE INDEX IF NOT EXISTS records_generator_idx ON records(generator_id);
CREATE INDEX IF NOT EXISTS records_occurred_idx  ON records(occurred_at);
CREATE INDEX IF NOT EXISTS archives_request_idx  ON archives(request_id);

PRAGMA user_version = 2;
";

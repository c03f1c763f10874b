//! SQLite database management with migrations

use crate::error::{AbuseFilterError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AbuseFilterError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });
        let pool = Pool::builder().max_size(16).build(manager)?;

        let db = Self { pool };
        db.migrate()?;
        Ok(db)
    }

    pub fn get_conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;
            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }
}

/// Each string is one migration
const MIGRATIONS: &[&str] = &[
    // Migration 1: consequence state and audit log
    r#"
    CREATE TABLE filters (
        key TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        pattern TEXT NOT NULL DEFAULT '',
        enabled INTEGER NOT NULL DEFAULT 1,
        deleted INTEGER NOT NULL DEFAULT 0,
        hidden INTEGER NOT NULL DEFAULT 0,
        throttled INTEGER NOT NULL DEFAULT 0,
        actions TEXT NOT NULL,  -- JSON: name -> params
        hit_count INTEGER NOT NULL DEFAULT 0
    );

    -- System accounts only; regular users live in the wiki
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE user_groups (
        user_id INTEGER NOT NULL,
        group_name TEXT NOT NULL,
        PRIMARY KEY (user_id, group_name)
    );

    CREATE TABLE rights_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        group_name TEXT NOT NULL,
        change TEXT NOT NULL,  -- 'added' or 'removed'
        performer_id INTEGER NOT NULL,
        performer_name TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );

    CREATE INDEX idx_rights_log_user ON rights_log(user_id);

    CREATE TABLE blocks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target TEXT NOT NULL,
        performer_id INTEGER NOT NULL,
        performer_name TEXT NOT NULL,
        reason TEXT NOT NULL,
        expiry TEXT NOT NULL,
        prevent_talk_edit INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        removed_at INTEGER,
        removed_by TEXT,
        remove_reason TEXT
    );

    CREATE INDEX idx_blocks_target ON blocks(target, removed_at);

    CREATE TABLE autopromote_blocks (
        user_id INTEGER PRIMARY KEY,
        until INTEGER NOT NULL,
        performer_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE change_tags (
        specifier TEXT NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (specifier, tag)
    );

    CREATE TABLE throttle_hits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL,
        hit_at INTEGER NOT NULL
    );

    CREATE INDEX idx_throttle_hits_key ON throttle_hits(key, hit_at);

    CREATE TABLE abuse_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        filter_key TEXT NOT NULL,
        actions TEXT NOT NULL,  -- comma-separated final action names
        wiki TEXT NOT NULL,
        filter_wiki TEXT,
        user_id INTEGER NOT NULL,
        user_name TEXT NOT NULL,
        target TEXT NOT NULL,
        action TEXT NOT NULL,
        ip TEXT NOT NULL,
        var_dump TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );

    CREATE INDEX idx_abuse_log_filter ON abuse_log(filter_key, timestamp);
    CREATE INDEX idx_abuse_log_request ON abuse_log(request_id);
    "#,
];

//! SQLite session store backing the `whatsapp-rust` client.
//!
//! Everything the client needs to resume a linked device (identity, Signal
//! sessions, pre-keys, app-state sync keys, device record) lives in one file
//! inside the auth directory, so a session snapshot is a plain copy of that
//! directory. The journal is kept in rollback mode: between transactions the
//! database file alone is complete.

mod app_sync_store;
mod device_store;
mod protocol_store;
mod signal_store;


use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::path::Path;
use wacore::store::error::db_err;

type Result<T> = wacore::store::error::Result<T>;

/// File name of the session database inside the auth directory.
pub const SESSION_DB: &str = "session.db";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS identities (
        address TEXT PRIMARY KEY,
        key_data BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        address TEXT PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS prekeys (
        id INTEGER PRIMARY KEY,
        record BLOB NOT NULL,
        uploaded INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS signed_prekeys (
        id INTEGER PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sender_keys (
        address TEXT PRIMARY KEY,
        record BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS app_sync_keys (
        key_id BLOB PRIMARY KEY,
        key_data BLOB NOT NULL,
        timestamp INTEGER NOT NULL DEFAULT 0,
        fingerprint BLOB
    )",
    "CREATE TABLE IF NOT EXISTS app_versions (
        collection TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mutation_macs (
        collection TEXT NOT NULL,
        index_mac BLOB NOT NULL,
        version INTEGER NOT NULL,
        value_mac BLOB NOT NULL,
        PRIMARY KEY (collection, index_mac)
    )",
    "CREATE TABLE IF NOT EXISTS skdm_recipients (
        group_jid TEXT NOT NULL,
        device_jid TEXT NOT NULL,
        PRIMARY KEY (group_jid, device_jid)
    )",
    "CREATE TABLE IF NOT EXISTS lid_mappings (
        lid TEXT PRIMARY KEY,
        phone_number TEXT NOT NULL,
        created_at INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0,
        learning_source TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS base_keys (
        address TEXT NOT NULL,
        message_id TEXT NOT NULL,
        base_key BLOB NOT NULL,
        PRIMARY KEY (address, message_id)
    )",
    "CREATE TABLE IF NOT EXISTS device_lists (
        user TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS forget_sender_keys (
        group_jid TEXT NOT NULL,
        participant TEXT NOT NULL,
        PRIMARY KEY (group_jid, participant)
    )",
    "CREATE TABLE IF NOT EXISTS device (
        id INTEGER PRIMARY KEY,
        data BLOB NOT NULL
    )",
];

/// Session store for one linked device.
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> std::result::Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Release the database file.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn blob_by_key(&self, sql: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|(data,)| data))
    }

    async fn blob_by_id(&self, sql: &str, id: u32) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(sql)
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|(data,)| data))
    }

    async fn delete_by_key(&self, sql: &str, key: &str) -> Result<()> {
        sqlx::query(sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_by_id(&self, sql: &str, id: u32) -> Result<()> {
        sqlx::query(sql)
            .bind(i64::from(id))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn put_keyed_blob(&self, sql: &str, key: &str, data: &[u8]) -> Result<()> {
        sqlx::query(sql)
            .bind(key)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn strings_by_key(&self, sql: &str, key: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}

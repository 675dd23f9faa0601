//! SQLite-backed [`Store`](slotbot_core::store::Store).
//!
//! All statements run on tokio-rusqlite's single background thread, so writes are
//! serialised and multi-statement updates can use a plain transaction.

use std::path::Path;

use slotbot_core::{errors::Error, Result};
use tracing::info;

mod rows;
mod store;

const SCHEMA: &str = include_str!("../schema/init.sql");

pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(storage_err)?;
        let store = Self::init(conn).await?;
        info!(path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(storage_err)?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
        conn.call(|conn| -> std::result::Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }
}

pub(crate) fn storage_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(e.to_string())
}

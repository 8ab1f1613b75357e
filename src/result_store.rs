use crate::aggregate::ReconciliationResult;
use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Key-value capability the conference hands its final result to.
pub trait ResultSink {
    fn save(&self, key: &str, result: &ReconciliationResult) -> Result<(), StoreError>;
    fn load(&self, key: &str) -> Result<Option<ReconciliationResult>, StoreError>;
}

pub struct ResultStore {
    conn: Connection,
}

/// Metadata about a stored result, without decoding the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResultInfo {
    pub key: String,
    pub digest: String,
    pub saved_at: i64,
}

impl ResultStore {
    /// Open (or create) the SQLite-backed result store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS results (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                digest TEXT NOT NULL,
                saved_at INTEGER NOT NULL
            )",
            [],
        )?;
        info!("Result store initialized");
        Ok(Self { conn })
    }

    /// Hex SHA-256 of a serialized payload.
    pub fn digest(payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn info(&self, key: &str) -> Result<Option<StoredResultInfo>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT key, digest, saved_at FROM results WHERE key = ?1",
                params![key],
                |row| {
                    Ok(StoredResultInfo {
                        key: row.get(0)?,
                        digest: row.get(1)?,
                        saved_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

impl ResultSink for ResultStore {
    /// Insert or replace the result stored under `key`.
    fn save(&self, key: &str, result: &ReconciliationResult) -> Result<(), StoreError> {
        let payload = serde_json::to_string(result)?;
        let digest = Self::digest(&payload);
        let saved_at = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO results (key, payload, digest, saved_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                digest = excluded.digest,
                saved_at = excluded.saved_at",
            params![key, payload, digest, saved_at],
        )?;
        info!(
            key = %key,
            digest = %digest,
            matched = result.matched_count,
            pending = result.pending_count,
            unmatched = result.unmatched_count,
            "Result stored"
        );
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<ReconciliationResult>, StoreError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, digest FROM results WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, digest)) = row else {
            info!(key = %key, "No stored result");
            return Ok(None);
        };

        if Self::digest(&payload) != digest {
            warn!(key = %key, "Stored result digest mismatch");
            return Err(StoreError::Corrupt {
                key: key.to_string(),
            });
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }
}

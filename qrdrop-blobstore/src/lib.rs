//! Key-guarded file storage for QRDrop.
//!
//! Each record pairs a payload with an index row holding the record's access
//! key and descriptive metadata. Payloads are sealed with the record's own key
//! when `encrypt_at_rest` is set, so reading a file requires both the index
//! check and a successful Poly1305 verification.
//!
//! Crash ordering: `put` writes the payload before the index row and `delete`
//! removes the index row before the payload. Either way an interruption can
//! only leave an orphaned payload (reclaimed by [`BlobStore::collect_orphans`]),
//! never an index row pointing at nothing.

mod legacy;
pub mod payloads;

use chrono::Utc;
use duckdb::{params, Connection};
use qrdrop_crypto::{
    generate_access_key, generate_file_id, is_valid_file_id, AccessKey, CryptoError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub use payloads::{DiskPayloads, MemoryPayloads, PayloadStore};

/// Index database file name inside the data directory.
pub const INDEX_FILE: &str = "index.duckdb";

/// Payload directory name inside the data directory.
pub const BLOB_DIR: &str = "blobs";

/// MIME type recorded when the uploader supplies none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("invalid key for file {0}")]
    Forbidden(String),
    #[error("payload missing for file {0}")]
    MissingPayload(String),
    #[error("payload failed integrity check: {0}")]
    Decryption(CryptoError),
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid legacy index: {0}")]
    LegacyIndex(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Configuration
// ============================================================================

/// How long records live and whether reading consumes them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// A successful `get` deletes the record.
    #[serde(default)]
    pub single_use: bool,
    /// Records older than this are treated as gone.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl RetentionPolicy {
    /// The retention window in milliseconds. A window too large to
    /// represent never expires anything.
    pub fn max_age_millis(&self) -> Option<i64> {
        self.max_age_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| secs.checked_mul(1000))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Seal payloads with the record's access key before writing them.
    pub encrypt_at_rest: bool,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            encrypt_at_rest: true,
            retention: RetentionPolicy::default(),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Public description of a stored file. Carries no key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Unix milliseconds. Absent from the public info endpoint.
    #[serde(default, skip_serializing)]
    pub created_at: i64,
}

/// Result of [`BlobStore::put_new`]: everything the uploader must hand on.
#[derive(Clone, Debug)]
pub struct StoredFile {
    pub id: String,
    pub key: AccessKey,
    pub info: FileInfo,
}

struct IndexRow {
    info: FileInfo,
    access_key: String,
    encrypted: bool,
}

/// Removes an id from the in-flight set when the `put` that reserved it ends.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

// ============================================================================
// BlobStore
// ============================================================================

pub struct BlobStore {
    conn: Arc<Mutex<Connection>>,
    payloads: Arc<dyn PayloadStore>,
    config: StoreConfig,
    /// Ids whose payload may exist before their index row does.
    pending: Mutex<HashSet<String>>,
}

impl BlobStore {
    /// Open a store rooted at `data_dir` (index file plus payload directory).
    pub fn open(data_dir: &Path, config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let payloads = DiskPayloads::new(data_dir.join(BLOB_DIR))?;

        let conn = Connection::open(data_dir.join(INDEX_FILE))
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // DuckDB defaults to ~80% of RAM per connection.
        conn.execute_batch("PRAGMA memory_limit='128MB'; PRAGMA threads=1;")
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let store = Self::open_with_payloads(conn, Arc::new(payloads), config)?;
        info!(data_dir = %data_dir.display(), records = store.len()?, "blob store opened");
        Ok(store)
    }

    /// Open an in-memory store (index and payloads both process-local).
    pub fn open_in_memory(config: StoreConfig) -> StoreResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Storage(e.to_string()))?;
        Self::open_with_payloads(conn, Arc::new(MemoryPayloads::new()), config)
    }

    /// Open with an existing index connection and payload backend.
    pub fn open_with_payloads(
        conn: Connection,
        payloads: Arc<dyn PayloadStore>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            payloads,
            config,
            pending: Mutex::new(HashSet::new()),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id VARCHAR PRIMARY KEY,
                access_key VARCHAR NOT NULL,
                original_name VARCHAR NOT NULL,
                mime_type VARCHAR NOT NULL,
                size BIGINT NOT NULL,
                encrypted BOOLEAN NOT NULL,
                created_at BIGINT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Store a payload under `key` and return its freshly generated id.
    pub fn put(
        &self,
        payload: &[u8],
        key: &AccessKey,
        name: &str,
        mime_type: &str,
    ) -> StoreResult<String> {
        self.put_record(payload, key, name, mime_type).map(|info| info.id)
    }

    /// Store a payload under a newly generated key.
    pub fn put_new(&self, payload: &[u8], name: &str, mime_type: &str) -> StoreResult<StoredFile> {
        let key = generate_access_key();
        let info = self.put_record(payload, &key, name, mime_type)?;
        Ok(StoredFile {
            id: info.id.clone(),
            key,
            info,
        })
    }

    fn put_record(
        &self,
        payload: &[u8],
        key: &AccessKey,
        name: &str,
        mime_type: &str,
    ) -> StoreResult<FileInfo> {
        let guard = self.reserve_id()?;
        let info = FileInfo {
            id: guard.id.clone(),
            name: name.to_string(),
            mime_type: normalize_mime(mime_type),
            size: payload.len() as u64,
            created_at: Utc::now().timestamp_millis(),
        };
        self.write_record(&info, key, payload)?;
        debug!(id = %info.id, size = info.size, "stored file");
        Ok(info)
    }

    /// Picks an id that is neither indexed, in flight, nor backed by a
    /// stray payload, and marks it in flight.
    fn reserve_id(&self) -> StoreResult<PendingGuard<'_>> {
        loop {
            let id = generate_file_id();
            let mut pending = self
                .pending
                .lock()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if pending.contains(&id) || self.payloads.exists(&id)? {
                continue;
            }
            {
                let conn = self.lock_conn()?;
                if load_row(&conn, &id)?.is_some() {
                    continue;
                }
            }
            pending.insert(id.clone());
            return Ok(PendingGuard {
                pending: &self.pending,
                id,
            });
        }
    }

    /// Payload first, then the index row. On index failure the payload is
    /// removed again so nothing is left behind.
    fn write_record(&self, info: &FileInfo, key: &AccessKey, payload: &[u8]) -> StoreResult<()> {
        let encrypted = self.config.encrypt_at_rest;
        let stored = if encrypted {
            qrdrop_crypto::seal(key, payload).map_err(|e| StoreError::Encryption(e.to_string()))?
        } else {
            payload.to_vec()
        };

        self.payloads.write(&info.id, &stored)?;

        let inserted = {
            let conn = self.lock_conn()?;
            conn.execute(
                "INSERT INTO files (id, access_key, original_name, mime_type, size, encrypted, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    info.id,
                    key.to_hex(),
                    info.name,
                    info.mime_type,
                    info.size as i64,
                    encrypted,
                    info.created_at
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))
        };

        if let Err(e) = inserted {
            if let Err(cleanup) = self.payloads.remove(&info.id) {
                warn!(id = %info.id, error = %cleanup, "failed to remove payload after index error");
            }
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read and decrypt a payload.
    pub fn get(&self, id: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.get_with_info(id, key).map(|(_, data)| data)
    }

    /// Read and decrypt a payload, returning its metadata alongside.
    ///
    /// Under a single-use policy the record is claimed (index row removed)
    /// while the index lock is held, so concurrent readers cannot both win.
    pub fn get_with_info(&self, id: &str, key: &str) -> StoreResult<(FileInfo, Vec<u8>)> {
        // A consumed record's payload outlives its row until it is read, so
        // it stays in the pending set to keep `collect_orphans` off it.
        let _claim = if self.config.retention.single_use {
            self.mark_pending(id)?
        } else {
            None
        };

        let (row, access_key) = {
            let conn = self.lock_conn()?;
            let row = self.live_row(&conn, id)?;
            let access_key = check_key(&row, key)?;
            if self.config.retention.single_use {
                delete_row(&conn, id)?;
            }
            (row, access_key)
        };

        let raw = self.payloads.read(id)?;
        if self.config.retention.single_use {
            self.discard_payload(id);
        }
        let raw = raw.ok_or_else(|| StoreError::MissingPayload(id.to_string()))?;

        let data = if row.encrypted {
            qrdrop_crypto::open(&access_key, &raw).map_err(|e| {
                warn!(id = %id, "stored payload failed authentication");
                StoreError::Decryption(e)
            })?
        } else {
            raw
        };

        debug!(id = %id, size = data.len(), "served file");
        Ok((row.info, data))
    }

    /// Metadata lookup. Needs no key.
    pub fn info(&self, id: &str) -> StoreResult<FileInfo> {
        let conn = self.lock_conn()?;
        Ok(self.live_row(&conn, id)?.info)
    }

    /// Number of indexed records.
    pub fn len(&self) -> StoreResult<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Loads a row that exists and has not expired. Expired rows are
    /// purged on the spot.
    fn live_row(&self, conn: &Connection, id: &str) -> StoreResult<IndexRow> {
        if !is_valid_file_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let row = load_row(conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if self.is_expired(&row.info, Utc::now().timestamp_millis()) {
            delete_row(conn, id)?;
            self.discard_payload(id);
            debug!(id = %id, "expired record purged on access");
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(row)
    }

    fn is_expired(&self, info: &FileInfo, now_ms: i64) -> bool {
        match self.config.retention.max_age_millis() {
            Some(max_age) => now_ms.saturating_sub(info.created_at) >= max_age,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Delete a record. Index row first, then payload.
    pub fn delete(&self, id: &str, key: &str) -> StoreResult<()> {
        {
            let conn = self.lock_conn()?;
            let row = self.live_row(&conn, id)?;
            check_key(&row, key)?;
            delete_row(&conn, id)?;
        }
        self.discard_payload(id);
        info!(id = %id, "deleted file");
        Ok(())
    }

    /// Remove every record older than the retention window.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let Some(max_age) = self.config.retention.max_age_millis() else {
            return Ok(0);
        };
        let cutoff = Utc::now().timestamp_millis().saturating_sub(max_age);

        let expired: Vec<String> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn
                .prepare("SELECT id FROM files WHERE created_at <= ?")
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let ids = stmt
                .query_map(params![cutoff], |row| row.get(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?
                .collect::<Result<Vec<String>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            drop(stmt);
            conn.execute("DELETE FROM files WHERE created_at <= ?", params![cutoff])
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            ids
        };

        for id in &expired {
            self.discard_payload(id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "purged expired files");
        }
        Ok(expired.len())
    }

    /// Remove payloads that have no index row and no `put` in flight.
    pub fn collect_orphans(&self) -> StoreResult<usize> {
        let ids = self.payloads.list_ids()?;
        let pending = self
            .pending
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut removed = 0usize;
        for id in ids {
            if pending.contains(&id) {
                continue;
            }
            let indexed = {
                let conn = self.lock_conn()?;
                load_row(&conn, &id)?.is_some()
            };
            if !indexed && self.payloads.remove(&id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(count = removed, "collected orphaned payloads");
        }
        Ok(removed)
    }

    /// Best-effort payload removal. A failure leaves an orphan for
    /// `collect_orphans`; the record is already gone from the index.
    fn discard_payload(&self, id: &str) {
        if let Err(e) = self.payloads.remove(id) {
            warn!(id = %id, error = %e, "failed to remove payload");
        }
    }

    /// Adds an existing id to the pending set. `None` if it is already there,
    /// in which case the current holder's guard keeps it.
    fn mark_pending(&self, id: &str) -> StoreResult<Option<PendingGuard<'_>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        if !pending.insert(id.to_string()) {
            return Ok(None);
        }
        Ok(Some(PendingGuard {
            pending: &self.pending,
            id: id.to_string(),
        }))
    }
}

// ============================================================================
// Index helpers
// ============================================================================

fn load_row(conn: &Connection, id: &str) -> StoreResult<Option<IndexRow>> {
    let result = conn.query_row(
        "SELECT id, access_key, original_name, mime_type, size, encrypted, created_at
         FROM files WHERE id = ?",
        params![id],
        |row| {
            Ok(IndexRow {
                info: FileInfo {
                    id: row.get(0)?,
                    name: row.get(2)?,
                    mime_type: row.get(3)?,
                    size: row.get::<_, i64>(4)? as u64,
                    created_at: row.get(6)?,
                },
                access_key: row.get(1)?,
                encrypted: row.get(5)?,
            })
        },
    );
    match result {
        Ok(row) => Ok(Some(row)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Storage(e.to_string())),
    }
}

fn delete_row(conn: &Connection, id: &str) -> StoreResult<()> {
    conn.execute("DELETE FROM files WHERE id = ?", params![id])
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(())
}

/// Constant-time key check. A presented key that does not even parse is
/// just a wrong key.
fn check_key(row: &IndexRow, presented: &str) -> StoreResult<AccessKey> {
    let stored = AccessKey::from_hex(&row.access_key)
        .map_err(|e| StoreError::Storage(format!("corrupt key for {}: {e}", row.info.id)))?;
    let matches = AccessKey::from_hex(presented)
        .map(|k| k.ct_eq(&stored))
        .unwrap_or(false);
    if !matches {
        warn!(id = %row.info.id, "rejected access with invalid key");
        return Err(StoreError::Forbidden(row.info.id.clone()));
    }
    Ok(stored)
}

fn normalize_mime(mime_type: &str) -> String {
    let trimmed = mime_type.trim();
    if trimmed.is_empty() {
        DEFAULT_MIME_TYPE.to_string()
    } else {
        trimmed.to_string()
    }
}

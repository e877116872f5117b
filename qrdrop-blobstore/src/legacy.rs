//! Import from the flat `files.json` layout.
//!
//! The older server kept one raw file per id next to a single JSON document
//! mapping id to `{id, originalName, mimeType, size, key, createdAt}`. Import
//! copies each payload into this store (sealing it when the store encrypts at
//! rest) and indexes it under the same id and key, so codes handed out by the
//! old server keep working.

use std::collections::HashMap;
use std::path::Path;

use qrdrop_crypto::{is_valid_file_id, AccessKey};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{load_row, normalize_mime, BlobStore, FileInfo, PendingGuard, StoreError, StoreResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    id: String,
    #[serde(default)]
    original_name: String,
    #[serde(default)]
    mime_type: String,
    key: String,
    #[serde(default)]
    created_at: i64,
}

impl BlobStore {
    /// Import records from a legacy `files.json` and its payload directory.
    ///
    /// Entries with an invalid id or key, a missing payload, or an id this
    /// store already knows are skipped with a warning. Returns the number of
    /// records imported.
    pub fn import_legacy_index(&self, index_path: &Path, payload_dir: &Path) -> StoreResult<usize> {
        let raw = std::fs::read(index_path)?;
        let entries: HashMap<String, LegacyEntry> = serde_json::from_slice(&raw)?;

        let mut imported = 0usize;
        for (map_id, entry) in entries {
            if map_id != entry.id || !is_valid_file_id(&entry.id) {
                warn!(id = %map_id, "skipping legacy entry with invalid id");
                continue;
            }
            let key = match AccessKey::from_hex(&entry.key) {
                Ok(k) => k,
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "skipping legacy entry with invalid key");
                    continue;
                }
            };
            let Some(_guard) = self.reserve_existing_id(&entry.id)? else {
                warn!(id = %entry.id, "skipping legacy entry already present");
                continue;
            };
            let payload = match std::fs::read(payload_dir.join(&entry.id)) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(id = %entry.id, "skipping legacy entry without payload");
                    continue;
                }
                Err(e) => return Err(StoreError::Io(e)),
            };

            let info = FileInfo {
                id: entry.id.clone(),
                name: entry.original_name,
                mime_type: normalize_mime(&entry.mime_type),
                size: payload.len() as u64,
                created_at: entry.created_at,
            };
            self.write_record(&info, &key, &payload)?;
            imported += 1;
        }

        info!(imported, path = %index_path.display(), "legacy index imported");
        Ok(imported)
    }

    /// Marks a caller-chosen id in flight, or `None` if it is already taken.
    fn reserve_existing_id(&self, id: &str) -> StoreResult<Option<PendingGuard<'_>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        if pending.contains(id) {
            return Ok(None);
        }
        {
            let conn = self.lock_conn()?;
            if load_row(&conn, id)?.is_some() {
                return Ok(None);
            }
        }
        pending.insert(id.to_string());
        Ok(Some(PendingGuard {
            pending: &self.pending,
            id: id.to_string(),
        }))
    }
}

//! Where retrievals fetch from.

use crate::error::{ExchangeError, ExchangeResult};
use crate::token::ExchangeToken;
use async_trait::async_trait;
use qrdrop_blobstore::{BlobStore, FileInfo};
use std::sync::Arc;

/// Fallback download name when neither the store nor the token has one.
pub const DEFAULT_FILE_NAME: &str = "downloaded-file";

/// A decrypted file handed back to the recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl RetrievedFile {
    /// Prefers the stored name, then the name carried in the token.
    pub(crate) fn resolve_name(stored: Option<&str>, token: &ExchangeToken) -> String {
        stored
            .filter(|n| !n.trim().is_empty())
            .or(token.name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string()
    }
}

/// Backend holding the files tokens point at.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetches and decrypts the file named by `token`.
    async fn fetch(&self, token: &ExchangeToken) -> ExchangeResult<RetrievedFile>;

    /// Public metadata for `id`.
    async fn describe(&self, id: &str) -> ExchangeResult<FileInfo>;

    /// Deletes the file named by `token`.
    async fn remove(&self, token: &ExchangeToken) -> ExchangeResult<()>;
}

/// A [`BlobStore`] in this process.
///
/// Store calls do blocking I/O and run on the blocking pool.
#[derive(Clone)]
pub struct LocalSource {
    store: Arc<BlobStore>,
}

impl LocalSource {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }

    async fn blocking<T, F>(&self, f: F) -> ExchangeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&BlobStore) -> Result<T, qrdrop_blobstore::StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ExchangeError::Io(e.to_string()))?
            .map_err(ExchangeError::from)
    }
}

#[async_trait]
impl BlobSource for LocalSource {
    async fn fetch(&self, token: &ExchangeToken) -> ExchangeResult<RetrievedFile> {
        let (id, key) = (token.id.clone(), token.key.clone());
        let (info, data) = self
            .blocking(move |store| store.get_with_info(&id, &key))
            .await?;
        Ok(RetrievedFile {
            name: RetrievedFile::resolve_name(Some(&info.name), token),
            id: info.id,
            mime_type: info.mime_type,
            data,
        })
    }

    async fn describe(&self, id: &str) -> ExchangeResult<FileInfo> {
        let id = id.to_string();
        self.blocking(move |store| store.info(&id)).await
    }

    async fn remove(&self, token: &ExchangeToken) -> ExchangeResult<()> {
        let (id, key) = (token.id.clone(), token.key.clone());
        self.blocking(move |store| store.delete(&id, &key)).await
    }
}

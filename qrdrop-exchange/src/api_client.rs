//! HTTP client for the sharing server.
//!
//! Wraps the five endpoints (`/upload`, `/download/{id}`, `/file/{id}`,
//! `DELETE /file/{id}`, `/health`) and maps the server's `{"error": ...}`
//! responses onto [`ExchangeError`].

use crate::config::ClientConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::source::{BlobSource, RetrievedFile};
use crate::token::{unpackage_token, ExchangeToken};
use async_trait::async_trait;
use qrdrop_blobstore::{FileInfo, DEFAULT_MIME_TYPE};
use qrdrop_crypto::is_valid_file_id;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Body of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub success: bool,
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl UploadReceipt {
    /// The token to render as a QR code for this upload.
    pub fn token(&self) -> ExchangeResult<ExchangeToken> {
        let raw = serde_json::json!({
            "id": self.file_id,
            "key": self.key,
            "name": self.name,
            "type": self.mime_type,
        });
        Ok(unpackage_token(&raw.to_string())?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    pub files: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct DeleteBody {
    success: bool,
    #[serde(default)]
    message: String,
}

/// HTTP client for a sharing server.
#[derive(Clone)]
pub struct ShareClient {
    client: Client,
    config: ClientConfig,
}

impl ShareClient {
    pub fn new(config: ClientConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Uploads `data` and returns the server's receipt.
    pub async fn upload(&self, data: Vec<u8>, name: &str, mime_type: &str) -> ExchangeResult<UploadReceipt> {
        let part = Part::bytes(data)
            .file_name(name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(self.config.endpoint("/upload"))
            .multipart(form)
            .send()
            .await?;
        let receipt: UploadReceipt = check(resp, "upload").await?.json().await?;
        debug!(id = %receipt.file_id, "uploaded");
        Ok(receipt)
    }

    /// Downloads and decrypts the file named by `token`.
    pub async fn download(&self, token: &ExchangeToken) -> ExchangeResult<RetrievedFile> {
        if !is_valid_file_id(&token.id) {
            return Err(ExchangeError::NotFound(token.id.clone()));
        }
        let url = self.config.endpoint(&format!("/download/{}", token.id));
        let resp = self
            .client
            .get(url)
            .query(&[("key", token.key.as_str())])
            .send()
            .await?;
        let resp = check(resp, &token.id).await?;

        let headers = resp.headers();
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);

        let data = resp.bytes().await?.to_vec();
        Ok(RetrievedFile {
            id: token.id.clone(),
            name: RetrievedFile::resolve_name(filename.as_deref(), token),
            mime_type,
            data,
        })
    }

    /// Public metadata for `id`. Needs no key.
    pub async fn info(&self, id: &str) -> ExchangeResult<FileInfo> {
        if !is_valid_file_id(id) {
            return Err(ExchangeError::NotFound(id.to_string()));
        }
        let resp = self
            .client
            .get(self.config.endpoint(&format!("/file/{id}")))
            .send()
            .await?;
        Ok(check(resp, id).await?.json().await?)
    }

    /// Deletes the file named by `token`.
    pub async fn delete(&self, token: &ExchangeToken) -> ExchangeResult<()> {
        if !is_valid_file_id(&token.id) {
            return Err(ExchangeError::NotFound(token.id.clone()));
        }
        let resp = self
            .client
            .delete(self.config.endpoint(&format!("/file/{}", token.id)))
            .query(&[("key", token.key.as_str())])
            .send()
            .await?;
        let body: DeleteBody = check(resp, &token.id).await?.json().await?;
        if !body.success {
            return Err(ExchangeError::Api {
                status: StatusCode::OK.as_u16(),
                message: body.message,
            });
        }
        Ok(())
    }

    pub async fn health(&self) -> ExchangeResult<HealthStatus> {
        let resp = self.client.get(self.config.endpoint("/health")).send().await?;
        Ok(check(resp, "health").await?.json().await?)
    }
}

#[async_trait]
impl BlobSource for ShareClient {
    async fn fetch(&self, token: &ExchangeToken) -> ExchangeResult<RetrievedFile> {
        self.download(token).await
    }

    async fn describe(&self, id: &str) -> ExchangeResult<FileInfo> {
        self.info(id).await
    }

    async fn remove(&self, token: &ExchangeToken) -> ExchangeResult<()> {
        self.delete(token).await
    }
}

/// Passes successful responses through and turns the rest into errors.
async fn check(resp: Response, subject: &str) -> ExchangeResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(ExchangeError::NotFound(subject.to_string())),
        StatusCode::FORBIDDEN => Err(ExchangeError::Forbidden(subject.to_string())),
        _ => {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            Err(ExchangeError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Extracts the file name from a `Content-Disposition` header value.
///
/// `filename*=UTF-8''...` wins over a plain `filename=`.
fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().trim_matches('"');
                let encoded = encoded
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(encoded);
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => plain = Some(value.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }
    plain.filter(|n| !n.is_empty())
}

//! Route handlers.

use actix_multipart::Multipart;
use actix_web::http::header::{
    Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue,
};
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use qrdrop_blobstore::{BlobStore, StoreResult, DEFAULT_MIME_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::AppState;

/// Response for a successful upload. `fileId` and `key` together form the
/// exchange token.
#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    #[serde(rename = "fileId")]
    file_id: String,
    key: String,
    name: String,
    #[serde(rename = "type")]
    mime_type: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    files: usize,
}

#[derive(Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

impl KeyQuery {
    fn require(self) -> Result<String, ApiError> {
        self.key
            .filter(|k| !k.is_empty())
            .ok_or(ApiError::BadRequest("Missing file ID or key"))
    }
}

/// Runs a store call on the blocking pool.
async fn with_store<T, F>(state: &AppState, action: &'static str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&BlobStore) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    web::block(move || f(&store))
        .await
        .map_err(|e| ApiError::blocking(e, action))?
        .map_err(|e| ApiError::from_store(e, action))
}

/// POST /upload
///
/// Expects a multipart field named `file`. Other fields are ignored.
pub async fn upload(
    state: web::Data<AppState>,
    mut multipart: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(mut field) = multipart.try_next().await.map_err(|e| {
        warn!(error = %e, "multipart parsing error");
        ApiError::BadRequest("Invalid multipart data")
    })? {
        // Like a browser form, a part without a filename is a plain field.
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string);
        let Some(name) = filename.filter(|_| field.name() == "file" && upload.is_none()) else {
            while field
                .try_next()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid multipart data"))?
                .is_some()
            {}
            continue;
        };

        let mime_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            warn!(error = %e, "upload stream error");
            ApiError::BadRequest("Invalid multipart data")
        })? {
            if data.len() + chunk.len() > state.max_upload_bytes {
                return Err(ApiError::PayloadTooLarge {
                    limit: state.max_upload_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some((name, mime_type, data));
    }

    let Some((name, mime_type, data)) = upload else {
        return Err(ApiError::BadRequest("No file uploaded"));
    };

    let stored = with_store(&state, "Upload failed", move |store| {
        store.put_new(&data, &name, &mime_type)
    })
    .await?;

    info!(id = %stored.id, size = stored.info.size, "upload stored");
    Ok(HttpResponse::Ok().json(UploadResponse {
        success: true,
        file_id: stored.id,
        key: stored.key.to_hex(),
        name: stored.info.name,
        mime_type: stored.info.mime_type,
    }))
}

/// GET /download/{id}?key=K
pub async fn download(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<KeyQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let key = query.into_inner().require()?;

    let (info, data) = with_store(&state, "Download failed", move |store| {
        store.get_with_info(&id, &key)
    })
    .await?;

    let filename = if info.name.trim().is_empty() {
        info.id.clone()
    } else {
        info.name.clone()
    };
    Ok(HttpResponse::Ok()
        .content_type(info.mime_type)
        .insert_header(attachment(&filename))
        .body(data))
}

/// GET /file/{id}
///
/// Public metadata. Deliberately keyless: it reveals name, type and size
/// only.
pub async fn file_info(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let info = with_store(&state, "Failed to get file info", move |store| store.info(&id)).await?;
    Ok(HttpResponse::Ok().json(info))
}

/// DELETE /file/{id}?key=K
pub async fn delete_file(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<KeyQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let key = query.into_inner().require()?;

    with_store(&state, "Failed to delete file", move |store| store.delete(&id, &key)).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "File deleted"
    })))
}

/// GET /health
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let files = with_store(&state, "Health check failed", |store| store.len()).await?;
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        files,
    }))
}

/// `Content-Disposition: attachment`, with an RFC 5987 `filename*` when the
/// name is not plain ASCII.
fn attachment(name: &str) -> ContentDisposition {
    let mut parameters = Vec::with_capacity(2);
    if name.is_ascii() {
        parameters.push(DispositionParam::Filename(name.to_string()));
    } else {
        let fallback: String = name
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        parameters.push(DispositionParam::Filename(fallback));
        parameters.push(DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: name.as_bytes().to_vec(),
        }));
    }
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters,
    }
}

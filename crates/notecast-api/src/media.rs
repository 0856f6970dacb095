//! Media storage for note attachments and profile pictures.

use std::path::PathBuf;

use async_trait::async_trait;
use axum::{
    extract::{Path, State, multipart::Field},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use notecast_types::models::mime;

use crate::AppState;
use crate::error::ApiError;

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store `bytes` and return the public URL clients fetch it from.
    async fn upload(&self, bytes: Bytes, content_type: &str) -> anyhow::Result<String>;

    /// Stored bytes and content type for `key`, if present.
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<(Bytes, &'static str)>>;
}

/// Each object is a flat file `{dir}/{uuid}.{ext}`, served at `/media/{key}`.
pub struct DiskMediaStore {
    dir: PathBuf,
    public_url: String,
}

impl DiskMediaStore {
    pub async fn new(dir: PathBuf, public_url: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Content type for a well-formed key, `None` for anything else, including
/// path traversal attempts.
fn key_content_type(key: &str) -> Option<&'static str> {
    let (stem, ext) = key.split_once('.')?;
    Uuid::parse_str(stem).ok()?;
    mime::from_extension(ext)
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> anyhow::Result<String> {
        let ext = mime::extension(content_type)
            .ok_or_else(|| anyhow::anyhow!("unsupported media type {}", content_type))?;
        let key = format!("{}.{}", Uuid::new_v4(), ext);

        fs::write(self.dir.join(&key), &bytes).await?;
        info!("Stored {} bytes as {}", bytes.len(), key);

        Ok(format!("{}/media/{}", self.public_url, key))
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<(Bytes, &'static str)>> {
        let Some(content_type) = key_content_type(key) else {
            return Ok(None);
        };
        match fs::read(self.dir.join(key)).await {
            Ok(data) => Ok(Some((Bytes::from(data), content_type))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a multipart field, failing as soon as it grows past `max` bytes.
pub(crate) async fn read_field_capped(mut field: Field<'_>, max: usize, too_large: &str) -> Result<Bytes, ApiError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > max {
            return Err(ApiError::bad_request(too_large));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// GET /media/{key}
pub async fn serve_media(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let (data, content_type) = state
        .media
        .fetch(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("No such media"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("notecast-media-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn upload_then_fetch() {
        let dir = temp_dir();
        let store = DiskMediaStore::new(dir.clone(), "http://cdn.test/").await.unwrap();

        let url = store.upload(Bytes::from_static(b"%PDF-1.4"), mime::PDF).await.unwrap();
        assert!(url.starts_with("http://cdn.test/media/"));
        assert!(url.ends_with(".pdf"));

        let key = url.rsplit('/').next().unwrap();
        let (data, ct) = store.fetch(key).await.unwrap().unwrap();
        assert_eq!(&data[..], b"%PDF-1.4");
        assert_eq!(ct, mime::PDF);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn rejects_unknown_types_and_bad_keys() {
        let dir = temp_dir();
        let store = DiskMediaStore::new(dir.clone(), "http://cdn.test").await.unwrap();

        assert!(store.upload(Bytes::from_static(b"<html>"), "text/html").await.is_err());
        assert!(store.fetch("../secret.png").await.unwrap().is_none());
        assert!(store.fetch("notes.db").await.unwrap().is_none());
        assert!(store.fetch(&format!("{}.png", Uuid::new_v4())).await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}

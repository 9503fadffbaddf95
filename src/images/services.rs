use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analysis::{EncodedImage, ImagePreprocessor};
use crate::config::ImageConfig;
use crate::error::AnalysisError;
use crate::storage::StorageClient;

const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// Full-size and thumbnail renditions of one meal photo.
#[derive(Debug, Clone)]
pub struct PreparedPhoto {
    pub full: EncodedImage,
    pub thumbnail: EncodedImage,
}

/// Object keys of a stored photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub image_ref: String,
    pub thumbnail_ref: String,
}

/// Decodes a base64 image, accepting the `data:<mime>;base64,` form browsers send.
pub fn decode_base64_image(input: &str) -> Result<Bytes, base64::DecodeError> {
    let trimmed = input.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => trimmed,
    };
    STANDARD.decode(payload.trim()).map(Bytes::from)
}

/// Compresses the upload into both storage renditions off the async runtime.
pub async fn prepare_photo(
    preprocessor: Arc<dyn ImagePreprocessor>,
    images: ImageConfig,
    raw: Bytes,
) -> Result<PreparedPhoto, AnalysisError> {
    tokio::task::spawn_blocking(move || {
        let full = preprocessor.encode(&raw, images.analysis)?;
        let thumbnail = preprocessor.encode(&raw, images.thumbnail)?;
        Ok(PreparedPhoto { full, thumbnail })
    })
    .await
    .map_err(|e| AnalysisError::Encode(format!("encoder task failed: {e}")))?
}

pub async fn upload_photo(
    storage: &dyn StorageClient,
    user_id: Uuid,
    photo: PreparedPhoto,
) -> anyhow::Result<StoredPhoto> {
    let id = Uuid::new_v4();
    let ext = ext_from_mime(photo.full.mime_type).unwrap_or("bin");
    let image_ref = format!("meals/{user_id}/{id}.{ext}");
    let thumbnail_ref = format!("meals/{user_id}/{id}-thumb.{ext}");

    storage
        .put_object(&image_ref, photo.full.bytes, photo.full.mime_type)
        .await
        .with_context(|| format!("put_object {image_ref}"))?;
    if let Err(e) = storage
        .put_object(&thumbnail_ref, photo.thumbnail.bytes, photo.thumbnail.mime_type)
        .await
    {
        delete_photos(storage, &[image_ref.as_str()]).await;
        return Err(e).with_context(|| format!("put_object {thumbnail_ref}"));
    }

    debug!(%image_ref, %thumbnail_ref, "meal photo stored");
    Ok(StoredPhoto {
        image_ref,
        thumbnail_ref,
    })
}

/// Removes stored objects, logging failures instead of returning them.
pub async fn delete_photos(storage: &dyn StorageClient, keys: &[&str]) {
    for key in keys {
        if let Err(e) = storage.delete_object(key).await {
            warn!(error = %e, %key, "failed to delete stored photo");
        }
    }
}

pub async fn presign_photo(storage: &dyn StorageClient, key: &str) -> anyhow::Result<String> {
    storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {key}"))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Presigned download links stay valid this long.
pub const PRESIGN_TTL_SECS: u64 = 30 * 60;
const PUBLIC_PREFIX: &str = "/uploads/";

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Stores each image under `issues/<reporter>/<uuid>.<ext>` and returns the keys.
/// Objects written before a failure are removed again.
pub async fn upload_images(
    st: &AppState,
    reporter_id: Uuid,
    images: Vec<UploadItem>,
) -> anyhow::Result<Vec<String>> {
    let mut keys = Vec::with_capacity(images.len());
    for img in images {
        let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
        let key = format!("issues/{}/{}.{}", reporter_id, Uuid::new_v4(), ext);
        let put = st
            .storage
            .put_object(&key, img.body, &img.content_type)
            .await
            .with_context(|| format!("put_object {}", key));
        if let Err(e) = put {
            discard_uploads(st, &keys).await;
            return Err(e);
        }
        keys.push(key);
    }
    if !keys.is_empty() {
        info!(count = keys.len(), reporter = %reporter_id, "images stored");
    }
    Ok(keys)
}

/// Best-effort cleanup of objects whose issue never got written.
pub async fn discard_uploads(st: &AppState, keys: &[String]) {
    for key in keys {
        if let Err(e) = st.storage.delete_object(key).await {
            warn!(error = %e, key = %key, "failed to discard upload");
        }
    }
}

/// Relative URL handed to clients for a stored key.
pub fn public_url(key: &str) -> String {
    format!("{PUBLIC_PREFIX}{key}")
}

pub async fn presign(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for key {}", key))
}

/// Only keys this service could have produced are served.
pub fn is_servable_key(key: &str) -> bool {
    key.starts_with("issues/")
        && !key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

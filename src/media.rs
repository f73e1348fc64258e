//! Menu image storage.
//!
//! Images live in the `menu-images` bucket under `<shop_id>/<uuid>.<ext>`.
//! Items keep only the public URL; the object path is recovered from it when
//! an image is replaced or removed.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::backend::rest::{
    authorized, build_client, friendly_error, normalize_base_url, read_json_response, AccessToken,
};
use crate::error::{PosError, PosResult};

pub const BUCKET: &str = "menu-images";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PosResult<String>;

    fn public_url(&self, path: &str) -> String;

    async fn remove(&self, paths: &[String]) -> PosResult<()>;
}

fn extension_for(content_type: &str) -> PosResult<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        "image/gif" => Ok("gif"),
        other if other.starts_with("image/") => Ok("img"),
        other => Err(PosError::validation(format!("Not an image: {other}"))),
    }
}

fn check_upload(bytes: &[u8], content_type: &str) -> PosResult<&'static str> {
    let ext = extension_for(content_type)?;
    if bytes.is_empty() {
        return Err(PosError::validation("Image file is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(PosError::validation("Image must be 5 MB or smaller"));
    }
    Ok(ext)
}

/// Fresh object path for a shop's image.
pub fn image_path(shop_id: &str, ext: &str) -> String {
    format!("{shop_id}/{}.{ext}", Uuid::new_v4())
}

/// Object path inside the bucket, taken from a public URL.
pub fn path_from_public_url(url: &str) -> Option<String> {
    let marker = format!("/{BUCKET}/");
    let start = url.find(&marker)? + marker.len();
    let path = url[start..].split(['?', '#']).next().unwrap_or_default();
    (!path.is_empty()).then(|| path.to_string())
}

/// Object paths are `segment/segment...` with no traversal.
fn validate_path(path: &str) -> PosResult<()> {
    let ok = !path.is_empty()
        && path.split('/').all(|seg| {
            !seg.is_empty()
                && seg != "."
                && seg != ".."
                && seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });
    if ok {
        Ok(())
    } else {
        Err(PosError::validation(format!("Invalid storage path: {path}")))
    }
}

/// Upload a new image for a shop and return its public URL.
pub async fn upload_image(
    storage: &dyn ObjectStorage,
    shop_id: &str,
    bytes: Vec<u8>,
    content_type: &str,
) -> PosResult<String> {
    let ext = check_upload(&bytes, content_type)?;
    let path = image_path(shop_id, ext);
    let url = storage.upload(&path, bytes, content_type).await?;
    info!(shop_id, path = %path, "image uploaded");
    Ok(url)
}

/// Upload the replacement first, then remove the old object. A failed
/// removal only leaves an orphan file, so it is logged and ignored.
pub async fn replace_image(
    storage: &dyn ObjectStorage,
    shop_id: &str,
    old_url: Option<&str>,
    bytes: Vec<u8>,
    content_type: &str,
) -> PosResult<String> {
    let url = upload_image(storage, shop_id, bytes, content_type).await?;
    if let Some(old) = old_url.and_then(path_from_public_url) {
        if let Err(e) = storage.remove(&[old.clone()]).await {
            warn!(path = %old, "failed to remove replaced image: {e}");
        }
    }
    Ok(url)
}

/// Best-effort removal of an image no longer referenced by any item.
pub async fn discard_image(storage: &dyn ObjectStorage, url: &str) {
    let Some(path) = path_from_public_url(url) else {
        return;
    };
    match storage.remove(&[path.clone()]).await {
        Ok(()) => info!(path = %path, "image removed"),
        Err(e) => warn!(path = %path, "failed to remove image: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Hosted storage
// ---------------------------------------------------------------------------

pub struct RestObjectStorage {
    client: Client,
    base_url: String,
    anon_key: Zeroizing<String>,
    token: Arc<AccessToken>,
}

impl RestObjectStorage {
    pub fn new(base_url: &str, anon_key: &str, token: Arc<AccessToken>) -> PosResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: normalize_base_url(base_url),
            anon_key: Zeroizing::new(anon_key.trim().to_string()),
            token,
        })
    }
}

#[async_trait]
impl ObjectStorage for RestObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PosResult<String> {
        validate_path(path)?;
        let url = format!("{}/storage/v1/object/{BUCKET}/{path}", self.base_url);
        let token = self.token.get();
        let req = authorized(
            self.client.post(url),
            &self.anon_key,
            token.as_deref().map(String::as_str),
        )
        .header("Content-Type", content_type)
        .header("x-upsert", "false")
        .body(bytes);
        let resp = req
            .send()
            .await
            .map_err(|e| PosError::Http(friendly_error(&self.base_url, &e)))?;
        read_json_response(resp).await?;
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{BUCKET}/{path}", self.base_url)
    }

    async fn remove(&self, paths: &[String]) -> PosResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        for path in paths {
            validate_path(path)?;
        }
        let url = format!("{}/storage/v1/object/{BUCKET}", self.base_url);
        let token = self.token.get();
        let req = authorized(
            self.client.delete(url),
            &self.anon_key,
            token.as_deref().map(String::as_str),
        )
        .json(&serde_json::json!({ "prefixes": paths }));
        let resp = req
            .send()
            .await
            .map_err(|e| PosError::Http(friendly_error(&self.base_url, &e)))?;
        read_json_response(resp).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Local storage
// ---------------------------------------------------------------------------

/// Plain files under `<data_dir>/menu-images`, addressed by `file://` URLs.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(BUCKET),
        }
    }

    fn file_for(&self, path: &str) -> PosResult<PathBuf> {
        validate_path(path)?;
        Ok(path.split('/').fold(self.root.clone(), |acc, seg| acc.join(seg)))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> PosResult<String> {
        let file = self.file_for(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, bytes).await?;
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        let root = self.root.to_string_lossy().replace('\\', "/");
        format!("file://{}/{path}", root.trim_end_matches('/'))
    }

    async fn remove(&self, paths: &[String]) -> PosResult<()> {
        for path in paths {
            let file = self.file_for(path)?;
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trips_through_public_url() {
        let storage = LocalObjectStorage::new(Path::new("/data"));
        let url = storage.public_url("s1/abc.jpg");
        assert_eq!(url, "file:///data/menu-images/s1/abc.jpg");
        assert_eq!(path_from_public_url(&url).as_deref(), Some("s1/abc.jpg"));

        let hosted = "https://x.supabase.co/storage/v1/object/public/menu-images/s1/a.png?v=2";
        assert_eq!(path_from_public_url(hosted).as_deref(), Some("s1/a.png"));
        assert_eq!(path_from_public_url("https://cdn.example.com/a.png"), None);
    }

    #[test]
    fn image_paths_are_shop_scoped() {
        let path = image_path("s1", "webp");
        assert!(path.starts_with("s1/"));
        assert!(path.ends_with(".webp"));
        assert!(validate_path(&path).is_ok());
        assert!(validate_path("s1/../secret").is_err());
        assert!(validate_path("/abs").is_err());
    }

    #[test]
    fn uploads_must_be_small_images() {
        assert_eq!(check_upload(b"x", "image/png").unwrap(), "png");
        assert!(check_upload(b"x", "application/pdf").is_err());
        assert!(check_upload(b"", "image/png").is_err());
        assert!(check_upload(&vec![0u8; MAX_IMAGE_BYTES + 1], "image/jpeg").is_err());
    }

    #[tokio::test]
    async fn replace_removes_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(dir.path());

        let first = upload_image(&storage, "s1", vec![1, 2, 3], "image/jpeg").await.unwrap();
        let first_path = path_from_public_url(&first).unwrap();
        let first_file = storage.file_for(&first_path).unwrap();
        assert!(first_file.exists());

        let second = replace_image(&storage, "s1", Some(&first), vec![4, 5], "image/png")
            .await
            .unwrap();
        assert_ne!(first, second);
        assert!(!first_file.exists());
        let second_file = storage.file_for(&path_from_public_url(&second).unwrap()).unwrap();
        assert_eq!(std::fs::read(second_file).unwrap(), vec![4, 5]);

        // removing something already gone is not an error
        storage.remove(&[first_path]).await.unwrap();
    }
}

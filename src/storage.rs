//! Persistence collaborators: the ban list file and uploaded images.

use crate::error::{ChatError, ChatResult};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait BanStore: Send + Sync {
    async fn load(&self) -> ChatResult<BTreeSet<String>>;

    async fn save(&self, bans: &BTreeSet<String>) -> ChatResult<()>;
}

/// On-disk shape of the ban database
#[derive(Debug, Default, Serialize, Deserialize)]
struct BanFile {
    #[serde(default)]
    bans: Vec<String>,
}

/// Ban list stored as `{"bans": [...]}`
#[derive(Debug, Clone)]
pub struct JsonFileBanStore {
    path: PathBuf,
}

impl JsonFileBanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BanStore for JsonFileBanStore {
    /// A missing or unreadable file is treated as an empty list
    async fn load(&self) -> ChatResult<BTreeSet<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No ban database yet, starting empty");
                return Ok(BTreeSet::new());
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read ban database");
                return Ok(BTreeSet::new());
            }
        };

        match serde_json::from_str::<BanFile>(&content) {
            Ok(file) => {
                let bans: BTreeSet<String> =
                    file.bans.into_iter().filter(|b| !b.is_empty()).collect();
                tracing::info!(count = bans.len(), "Loaded ban list");
                Ok(bans)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Invalid ban database, starting empty");
                Ok(BTreeSet::new())
            }
        }
    }

    async fn save(&self, bans: &BTreeSet<String>) -> ChatResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChatError::Storage(e.to_string()))?;
        }
        let file = BanFile {
            bans: bans.iter().cloned().collect(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|e| ChatError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;
        tracing::debug!(count = bans.len(), path = %self.path.display(), "Saved ban list");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBanStore {
    bans: RwLock<BTreeSet<String>>,
}

#[async_trait]
impl BanStore for MemoryBanStore {
    async fn load(&self) -> ChatResult<BTreeSet<String>> {
        Ok(self.bans.read().await.clone())
    }

    async fn save(&self, bans: &BTreeSet<String>) -> ChatResult<()> {
        *self.bans.write().await = bans.clone();
        Ok(())
    }
}

/// What the uploader told us about an image
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub content_type: String,
    pub file_name: Option<String>,
}

impl ImageMeta {
    /// File extension including the dot, or empty
    fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
        if let Some(ext) = from_name {
            return format!(".{}", ext.to_ascii_lowercase());
        }

        match self.content_type.as_str() {
            "image/png" => ".png",
            "image/jpeg" => ".jpg",
            "image/gif" => ".gif",
            "image/webp" => ".webp",
            _ => "",
        }
        .to_string()
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the bytes and return the public URL
    async fn store(&self, bytes: &[u8], meta: &ImageMeta) -> ChatResult<String>;

    async fn remove(&self, url: &str) -> ChatResult<()>;
}

fn image_file_name(meta: &ImageMeta) -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!(
        "image-{}-{}{}",
        crate::types::now_millis(),
        suffix,
        meta.extension()
    )
}

/// Writes uploads into a directory served at `/uploads`
#[derive(Debug, Clone)]
pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn store(&self, bytes: &[u8], meta: &ImageMeta) -> ChatResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;
        let name = image_file_name(meta);
        tokio::fs::write(self.dir.join(&name), bytes)
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;
        tracing::debug!(file = %name, size = bytes.len(), "Stored upload");
        Ok(format!("/uploads/{}", name))
    }

    async fn remove(&self, url: &str) -> ChatResult<()> {
        // Only ever touch plain file names inside our directory
        let Some(name) = url
            .strip_prefix("/uploads/")
            .filter(|n| !n.is_empty() && !n.contains('/') && !n.contains(".."))
        else {
            return Err(ChatError::Storage(format!("Not an upload URL: {}", url)));
        };
        tokio::fs::remove_file(self.dir.join(name))
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    pub async fn contains(&self, url: &str) -> bool {
        self.images.read().await.contains_key(url)
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store(&self, bytes: &[u8], meta: &ImageMeta) -> ChatResult<String> {
        let url = format!("/uploads/{}", image_file_name(meta));
        self.images.write().await.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }

    async fn remove(&self, url: &str) -> ChatResult<()> {
        self.images.write().await.remove(url);
        Ok(())
    }
}

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api::SahliClient;
use crate::error::ApiError;
use crate::transport::MultipartFile;

pub const MAX_IMAGES: usize = 6;
pub const ALLOWED_MIME: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp", "image/gif"];
pub const INVALID_TYPE_MESSAGE: &str = "Only JPG, PNG, WEBP, GIF images are allowed.";

pub fn is_allowed_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    ALLOWED_MIME.contains(&mime.as_str())
}

pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Issues local preview handles and tracks how many are still alive.
#[derive(Debug, Clone, Default)]
pub struct PreviewPool {
    live: Arc<AtomicUsize>,
}

impl PreviewPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> PreviewHandle {
        self.live.fetch_add(1, Ordering::SeqCst);
        PreviewHandle {
            id: format!("preview:{}", uuid::Uuid::new_v4()),
            live: Arc::clone(&self.live),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Released when dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: String,
    live: Arc<AtomicUsize>,
}

impl PreviewHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(handle = %self.id, "released preview");
    }
}

/// A file picked from disk, before it is staged.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(Self::from_bytes(path, bytes))
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image".to_string()),
            mime: guess_mime(path),
            path: path.to_path_buf(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug)]
pub struct StagedImage {
    pub file: ImageFile,
    pub preview: PreviewHandle,
}

impl StagedImage {
    pub fn to_multipart(&self) -> MultipartFile {
        MultipartFile {
            field: "file".to_string(),
            file_name: self.file.name.clone(),
            mime: self.file.mime.clone(),
            bytes: self.file.bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct ImageSet {
    pool: PreviewPool,
    images: Vec<StagedImage>,
}

impl ImageSet {
    pub fn new(pool: PreviewPool) -> Self {
        Self {
            pool,
            images: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn remaining(&self) -> usize {
        MAX_IMAGES.saturating_sub(self.images.len())
    }

    pub fn images(&self) -> &[StagedImage] {
        &self.images
    }

    /// Stage a batch. A batch containing any disallowed type is rejected as a
    /// whole; otherwise files beyond the remaining slots are ignored.
    pub fn stage(&mut self, files: Vec<ImageFile>) -> Result<usize, String> {
        let remaining = self.remaining();
        if files.is_empty() || remaining == 0 {
            return Ok(0);
        }
        if let Some(bad) = files.iter().find(|f| !is_allowed_mime(&f.mime)) {
            tracing::debug!(file = %bad.name, mime = %bad.mime, "rejected image batch");
            return Err(INVALID_TYPE_MESSAGE.to_string());
        }
        let added = files.len().min(remaining);
        for file in files.into_iter().take(added) {
            let preview = self.pool.issue();
            self.images.push(StagedImage { file, preview });
        }
        Ok(added)
    }

    pub fn remove(&mut self, index: usize) -> Option<ImageFile> {
        if index >= self.images.len() {
            return None;
        }
        let removed = self.images.remove(index);
        Some(removed.file)
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// Upload every staged image, one at a time and in order. The first
    /// failure aborts; paths gathered so far are discarded.
    pub async fn upload_all(
        &self,
        client: &SahliClient,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<Vec<String>, ApiError> {
        let total = self.images.len();
        let mut paths = Vec::with_capacity(total);
        for (i, img) in self.images.iter().enumerate() {
            if !is_allowed_mime(&img.file.mime) {
                return Err(ApiError::Transport(format!(
                    "Unsupported file type for {}",
                    img.file.name
                )));
            }
            tracing::debug!(index = i, file = %img.file.name, "uploading image");
            let path = client.upload_file(img.to_multipart()).await?;
            paths.push(path);
            on_progress(Progress {
                completed: i + 1,
                total,
            });
        }
        Ok(paths)
    }
}

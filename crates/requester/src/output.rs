//! Saving generated images to disk.

use std::path::{Path, PathBuf};

/// File extension for a result mimetype.
pub fn extension_for(mimetype: &str) -> &'static str {
    match mimetype.split(';').next().unwrap_or_default().trim() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Writes each session's images as `image.<ext>`, then `image-2.<ext>`,
/// `image-3.<ext>` and so on.
#[derive(Debug)]
pub struct ImageSaver {
    dir: PathBuf,
    saved: u32,
}

impl ImageSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the next image with `mimetype` will be written to.
    pub fn next_path(&self, mimetype: &str) -> PathBuf {
        let ext = extension_for(mimetype);
        let name = match self.saved {
            0 => format!("image.{ext}"),
            n => format!("image-{}.{ext}", n + 1),
        };
        self.dir.join(name)
    }

    pub async fn save(&mut self, bytes: &[u8], mimetype: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.next_path(mimetype);
        tokio::fs::write(&path, bytes).await?;
        self.saved += 1;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved image");
        Ok(path)
    }
}

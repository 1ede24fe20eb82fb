// Storage of uploaded files and their thumbnails in the uploads directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::UploadsConfig;
use crate::db::schema::{FileCreate, FileRecord};
use crate::media::{extension_for, MediaCategory, MediaError, Thumbnailer};

#[derive(Clone)]
pub struct UploadStore {
    dir: PathBuf,
    url_prefix: String,
    thumbnailer: Arc<dyn Thumbnailer>,
}

impl UploadStore {
    pub fn new(config: &UploadsConfig, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        Self {
            dir: config.dir.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            thumbnailer,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }

    fn random_name(ext: &str) -> String {
        format!("{}.{}", Uuid::new_v4().simple(), ext)
    }

    /// Write `bytes` under a random name and render its thumbnail. Nothing is
    /// left on disk when either step fails.
    pub async fn store(&self, mime: &str, bytes: &[u8]) -> Result<FileCreate, MediaError> {
        let unsupported = || MediaError::UnsupportedType(mime.to_string());
        let category = MediaCategory::from_mime(mime).ok_or_else(unsupported)?;
        let ext = extension_for(mime).ok_or_else(unsupported)?;

        let name = Self::random_name(ext);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes).await?;

        let thumb_name = Self::random_name("jpg");
        let thumb_path = self.dir.join(&thumb_name);

        let thumbnailer = self.thumbnailer.clone();
        let (source, dest) = (path.clone(), thumb_path.clone());
        let rendered = tokio::task::spawn_blocking(move || thumbnailer.render(&source, category, &dest))
            .await
            .map_err(|e| MediaError::Thumbnail(e.to_string()))
            .and_then(|r| r);

        if let Err(err) = rendered {
            tracing::warn!("Discarding upload {}: {}", name, err);
            remove_quietly(&path).await;
            remove_quietly(&thumb_path).await;
            return Err(err);
        }

        Ok(FileCreate {
            mime: mime.to_string(),
            url: self.url_for(&name),
            path: path.to_string_lossy().into_owned(),
            name,
            thumb_url: self.url_for(&thumb_name),
            thumb_path: thumb_path.to_string_lossy().into_owned(),
            thumb_name,
        })
    }

    /// Remove a file and its thumbnail from disk.
    pub async fn remove(&self, file: &FileRecord) {
        remove_quietly(Path::new(&file.path)).await;
        remove_quietly(Path::new(&file.thumb_path)).await;
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingThumbnailer, StubThumbnailer};

    fn store_in(dir: &Path, thumbnailer: Arc<dyn Thumbnailer>) -> UploadStore {
        let config = UploadsConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        };
        UploadStore::new(&config, thumbnailer)
    }

    #[tokio::test]
    async fn test_store_writes_file_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), Arc::new(StubThumbnailer));

        let created = store.store("audio/mpeg", b"ID3").await.unwrap();
        assert!(created.name.ends_with(".mp3"));
        assert!(created.thumb_name.ends_with(".jpg"));
        assert_eq!(created.url, format!("/uploads/{}", created.name));
        assert_eq!(std::fs::read(&created.path).unwrap(), b"ID3");
        assert!(Path::new(&created.thumb_path).exists());
    }

    #[tokio::test]
    async fn test_unsupported_type_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), Arc::new(StubThumbnailer));

        let err = store.store("image/gif", b"GIF89a").await.unwrap_err();
        assert_eq!(err, MediaError::UnsupportedType("image/gif".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_thumbnail_failure_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), Arc::new(FailingThumbnailer));

        let err = store.store("image/png", b"\x89PNG").await.unwrap_err();
        assert!(matches!(err, MediaError::Thumbnail(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::utils::image_processor::{self, ImageProcessingError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Source image not found: {0}")]
    SourceNotFound(Uuid),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageProcessingError),
    #[error("Image task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub id: Uuid,
    pub file_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
}

#[derive(Debug, Clone)]
pub struct SavedImage {
    pub file_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
}

/// PNG files on local disk, one directory per user under each root.
#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_dir: PathBuf,
    generated_dir: PathBuf,
}

impl ImageStore {
    pub fn new(upload_dir: impl Into<PathBuf>, generated_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            generated_dir: generated_dir.into(),
        }
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.upload_dir).await?;
        fs::create_dir_all(&self.generated_dir).await?;
        Ok(())
    }

    pub fn upload_path(&self, user_id: Uuid, image_id: Uuid) -> PathBuf {
        self.upload_dir.join(user_id.to_string()).join(format!("{image_id}.png"))
    }

    async fn user_dir(&self, base: &Path, user_id: Uuid) -> Result<PathBuf, StorageError> {
        let dir = base.join(user_id.to_string());
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Validates the upload by decoding it and stores it as an RGB PNG.
    pub async fn save_upload(&self, user_id: Uuid, data: Vec<u8>) -> Result<SavedUpload, StorageError> {
        let (png, width, height) = tokio::task::spawn_blocking(move || {
            let img = image_processor::load(&data)?;
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let png = image_processor::encode_png(&rgb)?;
            Ok::<_, ImageProcessingError>((png, rgb.width(), rgb.height()))
        })
        .await??;

        self.user_dir(&self.upload_dir, user_id).await?;
        let id = Uuid::new_v4();
        let file_path = self.upload_path(user_id, id);
        let file_size = png.len() as u64;
        fs::write(&file_path, png).await?;

        tracing::info!(user_id = %user_id, path = %file_path.display(), "saved uploaded image");
        Ok(SavedUpload { id, file_path, width, height, file_size })
    }

    pub async fn load_upload(&self, user_id: Uuid, image_id: Uuid) -> Result<DynamicImage, StorageError> {
        let path = self.upload_path(user_id, image_id);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SourceNotFound(image_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(tokio::task::spawn_blocking(move || image_processor::load(&data)).await??)
    }

    /// Writes the full image and its thumbnail side by side.
    pub async fn save_generated(&self, user_id: Uuid, image: DynamicImage) -> Result<SavedImage, StorageError> {
        let dir = self.user_dir(&self.generated_dir, user_id).await?;
        let filename = generate_filename("png");
        let file_path = dir.join(&filename);
        let thumbnail_path = dir.join(format!("thumb_{filename}"));

        let (width, height) = (image.width(), image.height());
        let (png, thumb_png) = tokio::task::spawn_blocking(move || {
            let png = image_processor::encode_png(&image)?;
            let thumb = image_processor::encode_png(&image_processor::thumbnail(&image))?;
            Ok::<_, ImageProcessingError>((png, thumb))
        })
        .await??;

        let file_size = png.len() as u64;
        write_with_thumbnail(&file_path, png, &thumbnail_path, thumb_png).await?;

        tracing::info!(path = %file_path.display(), bytes = file_size, "saved generated image");
        Ok(SavedImage { file_path, thumbnail_path, width, height, file_size })
    }

    pub async fn save_mask(&self, user_id: Uuid, job_id: Uuid, mask: GrayImage) -> Result<PathBuf, StorageError> {
        let dir = self.user_dir(&self.upload_dir, user_id).await?;
        let path = dir.join(format!("mask_{job_id}.png"));
        let png = tokio::task::spawn_blocking(move || {
            image_processor::encode_png(&DynamicImage::ImageLuma8(mask))
        })
        .await??;
        fs::write(&path, png).await?;
        tracing::debug!(path = %path.display(), "saved mask");
        Ok(path)
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(path.as_ref()).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether a file was removed; failures are logged, not raised.
    pub async fn delete(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted image");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to delete image");
                false
            }
        }
    }
}

/// Writes both files or neither.
async fn write_with_thumbnail(
    file_path: &Path,
    png: Vec<u8>,
    thumbnail_path: &Path,
    thumb_png: Vec<u8>,
) -> Result<(), StorageError> {
    fs::write(file_path, png).await?;
    if let Err(e) = fs::write(thumbnail_path, thumb_png).await {
        if let Err(cleanup) = fs::remove_file(file_path).await {
            tracing::error!(path = %file_path.display(), error = %cleanup, "failed to remove orphaned image");
        }
        return Err(e.into());
    }
    Ok(())
}

fn generate_filename(extension: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!("{timestamp}_{}.{extension}", &unique[..8])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    pub(crate) fn temp_store() -> (ImageStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("image-playground-test-{}", Uuid::new_v4()));
        (ImageStore::new(root.join("uploads"), root.join("generated")), root)
    }

    #[tokio::test]
    async fn upload_is_normalized_to_rgb_png() {
        let (store, root) = temp_store();
        let user = Uuid::new_v4();
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 128])));
        let data = image_processor::encode_png(&rgba).unwrap();

        let saved = store.save_upload(user, data).await.unwrap();
        assert_eq!((saved.width, saved.height), (6, 4));
        assert_eq!(saved.file_path, store.upload_path(user, saved.id));

        let loaded = store.load_upload(user, saved.id).await.unwrap();
        assert!(matches!(loaded, DynamicImage::ImageRgb8(_)));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn upload_rejects_non_images() {
        let (store, root) = temp_store();
        let result = store.save_upload(Uuid::new_v4(), b"plain text".to_vec()).await;
        assert!(matches!(result, Err(StorageError::Image(ImageProcessingError::Decode(_)))));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn missing_source_is_reported_by_id() {
        let (store, root) = temp_store();
        let missing = Uuid::new_v4();
        let err = store.load_upload(Uuid::new_v4(), missing).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Source image not found: {missing}"));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn generated_image_gets_a_thumbnail() {
        let (store, root) = temp_store();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(512, 512, Rgb([9, 9, 9])));

        let saved = store.save_generated(Uuid::new_v4(), img).await.unwrap();
        assert_eq!((saved.width, saved.height), (512, 512));
        assert!(saved.file_size > 0);

        let thumb = store.read(&saved.thumbnail_path).await.unwrap().unwrap();
        let thumb = image_processor::load(&thumb).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (256, 256));

        assert!(store.delete(&saved.file_path).await);
        assert!(!store.delete(&saved.file_path).await);
        assert!(store.read(&saved.file_path).await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn failed_thumbnail_write_removes_full_image() {
        let (store, root) = temp_store();
        store.ensure_dirs().await.unwrap();
        let file_path = root.join("generated").join("full.png");
        let thumbnail_path = root.join("generated").join("missing").join("thumb.png");

        let result = write_with_thumbnail(&file_path, vec![1, 2, 3], &thumbnail_path, vec![4]).await;

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert!(!file_path.exists());
        let _ = std::fs::remove_dir_all(root);
    }
}

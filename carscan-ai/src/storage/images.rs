//! Image store
//!
//! Validates uploads against the extension allow-list and size limit, then
//! writes them as `<uuid><ext>` into the upload directory. The uuid becomes
//! the analysis id.

use carscan_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;

/// Public URL prefix under which stored images are served
pub const UPLOADS_ROUTE: &str = "/uploads";

/// An image written to the upload directory
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: Uuid,
    /// Filesystem path handed to analyzers
    pub path: PathBuf,
    pub file_name: String,
    pub original_name: String,
}

impl StoredImage {
    pub fn public_path(&self) -> String {
        format!("{}/{}", UPLOADS_ROUTE, self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_dir: PathBuf,
    max_bytes: usize,
    allowed_extensions: Vec<String>,
}

impl ImageStore {
    pub fn new(upload_dir: impl Into<PathBuf>, max_bytes: usize, allowed_extensions: &[String]) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_bytes,
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
            &config.allowed_extensions,
        )
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check name and size; returns the normalized extension (`.jpg`)
    pub fn validate(&self, original_name: &str, len: usize) -> Result<String> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| self.allowed_extensions.contains(ext))
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Invalid file format. Allowed: {}",
                    self.allowed_extensions.join(", ")
                ))
            })?;

        if len == 0 {
            return Err(Error::InvalidInput("Uploaded image is empty".to_string()));
        }
        if len > self.max_bytes {
            return Err(Error::InvalidInput(format!(
                "Uploaded image exceeds {} bytes",
                self.max_bytes
            )));
        }

        Ok(format!(".{}", extension))
    }

    /// Validate and persist an upload
    pub async fn save_uploaded_image(&self, bytes: &[u8], original_name: &str) -> Result<StoredImage> {
        let extension = self.validate(original_name, bytes.len())?;

        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let id = Uuid::new_v4();
        let file_name = format!("{}{}", id, extension);
        let path = self.upload_dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;

        debug!(
            image_id = %id,
            original_name = original_name,
            bytes = bytes.len(),
            "Stored uploaded image"
        );

        Ok(StoredImage {
            id,
            path,
            file_name,
            original_name: original_name.to_string(),
        })
    }

    /// Remove a stored image that ended up with no analysis record
    pub async fn discard(&self, image: &StoredImage) {
        match tokio::fs::remove_file(&image.path).await {
            Ok(()) => debug!(image_id = %image.id, "Discarded unrecorded upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                image_id = %image.id,
                path = %image.path.display(),
                error = %e,
                "Failed to discard unrecorded upload"
            ),
        }
    }
}

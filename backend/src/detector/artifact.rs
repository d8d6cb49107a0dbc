use std::path::{Path, PathBuf};

use shared::DetectorType;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error(
        "Invalid image format '{0}'. Only JPG, JPEG, PNG, GIF, BMP, and TIFF formats are supported."
    )]
    InvalidExtension(String),
    #[error("Detection artifact not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to rename detection artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Renamed detector output image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedArtifact {
    pub name: String,
    pub path: PathBuf,
}

fn allowed_extension(path: &Path) -> Result<String, ArtifactError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ArtifactError::InvalidExtension(ext))
    }
}

/// Builds `{prefix}{stem}_{uuid}.{ext}` without touching the filesystem.
pub fn tagged_file_name(path: &Path, detector_type: DetectorType) -> Result<String, ArtifactError> {
    let ext = allowed_extension(path)?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    Ok(format!(
        "{}{}_{}.{}",
        detector_type.artifact_prefix(),
        stem,
        Uuid::new_v4(),
        ext
    ))
}

/// Renames the artifact at `path` in place to its detector-tagged unique name.
pub async fn tag_artifact(path: &Path, detector_type: DetectorType) -> Result<TaggedArtifact, ArtifactError> {
    let name = tagged_file_name(path, detector_type)?;
    let is_file = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(ArtifactError::Io(e)),
    };
    if !is_file {
        log::warn!("Artifact '{}' does not exist", path.display());
        return Err(ArtifactError::NotFound(path.to_path_buf()));
    }

    let new_path = path.with_file_name(&name);
    tokio::fs::rename(path, &new_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArtifactError::NotFound(path.to_path_buf()),
        _ => ArtifactError::Io(e),
    })?;
    log::info!("Artifact '{}' renamed to '{}'", path.display(), new_path.display());

    Ok(TaggedArtifact { name, path: new_path })
}

//! Auxiliary media archives (`tar.gz` of the media root).
//!
//! The tar and gzip work is blocking, so it runs on the blocking pool.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media root does not exist: {0}")]
    MissingRoot(String),

    #[error("Media archive not found: {0}")]
    MissingArchive(String),

    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media task failed: {0}")]
    Task(String),
}

/// Archive everything under `root` into a gzipped tarball at `dest`.
/// Returns the archive size in bytes.
pub async fn archive_directory(root: &Path, dest: &Path) -> Result<i64, MediaError> {
    if !tokio::fs::try_exists(root).await? {
        return Err(MediaError::MissingRoot(root.display().to_string()));
    }
    let root = root.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || write_archive(&root, &dest))
        .await
        .map_err(|e| MediaError::Task(e.to_string()))?
}

fn write_archive(root: &Path, dest: &Path) -> Result<i64, MediaError> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", root)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;

    Ok(std::fs::metadata(dest)?.len() as i64)
}

/// Unpack `archive` over `root`, overwriting files that already exist.
pub async fn extract_archive(archive: &Path, root: &Path) -> Result<(), MediaError> {
    if !tokio::fs::try_exists(archive).await? {
        return Err(MediaError::MissingArchive(archive.display().to_string()));
    }
    tokio::fs::create_dir_all(root).await?;
    let archive = archive.to_path_buf();
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), MediaError> {
        let decoder = GzDecoder::new(File::open(&archive)?);
        let mut tar = Archive::new(decoder);
        tar.set_overwrite(true);
        tar.unpack(&root)?;
        Ok(())
    })
    .await
    .map_err(|e| MediaError::Task(e.to_string()))?
}

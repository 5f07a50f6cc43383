//! ZIP archives of downloaded videos

use crate::error::{Result, ScraperError};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive every file below `folder` into `zip_path`
///
/// Entry names are relative to `folder` and use `/` separators. Returns the
/// number of files archived.
pub async fn zip_folder(folder: &Path, zip_path: &Path) -> Result<usize> {
    let folder = folder.to_path_buf();
    let zip_path = zip_path.to_path_buf();

    let archived = tokio::task::spawn_blocking(move || write_archive(&folder, &zip_path))
        .await
        .map_err(|e| ScraperError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    Ok(archived)
}

fn write_archive(folder: &Path, zip_path: &Path) -> Result<usize> {
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = ZipWriter::new(BufWriter::new(File::create(zip_path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut archived = 0;

    for entry in WalkDir::new(folder).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ScraperError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry_name(folder, entry.path());
        debug!("Adding {} to {}", name, zip_path.display());
        writer.start_file(name, options)?;
        let mut source = BufReader::new(File::open(entry.path())?);
        std::io::copy(&mut source, &mut writer)?;
        archived += 1;
    }

    writer.finish()?.flush()?;
    info!("🗜️ Archived {} files into {}", archived, zip_path.display());
    Ok(archived)
}

fn entry_name(folder: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(folder).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_zip_folder_contains_files() {
        let temp_dir = TempDir::new().unwrap();
        let videos = temp_dir.path().join("Test Program/2021-01-01/videos");
        std::fs::create_dir_all(videos.join("nested")).unwrap();
        std::fs::write(videos.join("test_video.mp4"), b"fake video").unwrap();
        std::fs::write(videos.join("nested/other.mp4"), b"other").unwrap();

        let zip_path = temp_dir.path().join("Test Program/2021-01-01.zip");
        let archived = zip_folder(&videos, &zip_path).await.unwrap();
        assert_eq!(archived, 2);
        assert!(zip_path.exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["nested/other.mp4", "test_video.mp4"]);

        let mut content = String::new();
        archive.by_name("test_video.mp4").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "fake video");
        // Originals stay in place
        assert!(videos.join("test_video.mp4").exists());
    }

    #[tokio::test]
    async fn test_zip_empty_folder() {
        let temp_dir = TempDir::new().unwrap();
        let videos = temp_dir.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        let zip_path = temp_dir.path().join("empty.zip");
        assert_eq!(zip_folder(&videos, &zip_path).await.unwrap(), 0);
        assert!(zip_path.exists());
    }
}

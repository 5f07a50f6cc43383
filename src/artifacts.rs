//! Output layout and table persistence
//!
//! Every run writes below `{output_dir}/{program}/{date}/`:
//!
//! ```text
//! {program}/{date}/{program}_{date}.csv        episode metadata
//! {program}/{date}/xml-subtitles/{id}.xml      raw subtitle documents
//! {program}/{date}/subtitles/{id}.csv          segmented transcripts
//! {program}/{date}/videos/{id}.mp4             downloaded videos
//! {program}/{date}.zip                         video archive
//! ```

use crate::error::Result;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub const XML_FOLDER: &str = "xml-subtitles";
pub const SUBTITLES_FOLDER: &str = "subtitles";
pub const VIDEO_FOLDER: &str = "videos";

/// Kinds of artifacts a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The per-run metadata table lives directly in the run folder
    Metadata,
    RawSubtitles,
    Transcripts,
    Videos,
}

impl ArtifactKind {
    fn folder(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::Metadata => None,
            ArtifactKind::RawSubtitles => Some(XML_FOLDER),
            ArtifactKind::Transcripts => Some(SUBTITLES_FOLDER),
            ArtifactKind::Videos => Some(VIDEO_FOLDER),
        }
    }
}

/// A record type that can be stored as a CSV table
///
/// `HEADERS` must list the serialized field names in declaration order so
/// that the header row is written even when there are no rows.
pub trait TableRow: Serialize + DeserializeOwned {
    const HEADERS: &'static [&'static str];
}

/// Maps (program, date, kind) to directories below the output root
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    base_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for one run of one program, without creating it
    pub fn run_dir(&self, program: &str, date: &str) -> PathBuf {
        self.base_dir
            .join(sanitize_component(program))
            .join(sanitize_component(date))
    }

    /// Directory for an artifact kind, created on demand
    ///
    /// Calling this repeatedly with the same key returns the same path.
    pub async fn location_for(&self, program: &str, date: &str, kind: ArtifactKind) -> Result<PathBuf> {
        let mut dir = self.run_dir(program, date);
        if let Some(folder) = kind.folder() {
            dir.push(folder);
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Path of the metadata table for one run
    pub fn metadata_path(&self, program: &str, date: &str) -> PathBuf {
        self.run_dir(program, date)
            .join(format!("{}_{}.csv", sanitize_component(program), sanitize_component(date)))
    }

    /// Path of the video archive for one run
    pub fn archive_path(&self, program: &str, date: &str) -> PathBuf {
        self.base_dir
            .join(sanitize_component(program))
            .join(format!("{}.zip", sanitize_component(date)))
    }
}

/// Write `rows` as CSV with a header row and no index column
pub async fn write_table<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(T::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    tokio::fs::write(path, bytes).await?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Read a table written by [`write_table`]
pub async fn read_table<T: TableRow>(path: &Path) -> Result<Vec<T>> {
    let bytes = tokio::fs::read(path).await?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

/// Store a raw document
pub async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Make a program name, date or id safe to use as a single path component
pub fn sanitize_component(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let pattern = UNSAFE.get_or_init(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("valid regex"));
    let cleaned = pattern.replace_all(name, "_");
    match cleaned.as_ref() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::TranscriptRow;
    use tempfile::TempDir;

    fn row(text: &str, style: &str, start: &str, end: &str) -> TranscriptRow {
        TranscriptRow {
            text: text.to_string(),
            style_tag: style.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    #[tokio::test]
    async fn test_location_for_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp_dir.path());

        let first = writer.location_for("Test Program", "2021-01-01", ArtifactKind::Transcripts).await.unwrap();
        let second = writer.location_for("Test Program", "2021-01-01", ArtifactKind::Transcripts).await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert_eq!(first, temp_dir.path().join("Test Program/2021-01-01/subtitles"));
    }

    #[tokio::test]
    async fn test_layout_paths() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(temp_dir.path());

        let run_dir = writer.location_for("tagesschau", "2024-05-01", ArtifactKind::Metadata).await.unwrap();
        assert_eq!(run_dir, temp_dir.path().join("tagesschau/2024-05-01"));
        assert_eq!(
            writer.metadata_path("tagesschau", "2024-05-01"),
            temp_dir.path().join("tagesschau/2024-05-01/tagesschau_2024-05-01.csv")
        );
        assert_eq!(
            writer.archive_path("tagesschau", "2024-05-01"),
            temp_dir.path().join("tagesschau/2024-05-01.zip")
        );
        let xml = writer.location_for("tagesschau", "2024-05-01", ArtifactKind::RawSubtitles).await.unwrap();
        assert!(xml.ends_with("xml-subtitles"));
        let videos = writer.location_for("tagesschau", "2024-05-01", ArtifactKind::Videos).await.unwrap();
        assert!(videos.ends_with("videos"));
    }

    #[tokio::test]
    async fn test_transcript_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("episode.csv");
        let rows = vec![
            row("Guten Abend, meine Damen und Herren.", "textWhite", "10:00:01.000", "10:00:05.000"),
            row("Er sagte: \"Nein\", dann ging er.", "", "", "10:00:09.000"),
        ];

        write_table(&path, &rows).await.unwrap();
        let back: Vec<TranscriptRow> = read_table(&path).await.unwrap();
        assert_eq!(back, rows);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with("text,color,start_time,end_time\n"));
    }

    #[tokio::test]
    async fn test_empty_table_keeps_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.csv");
        write_table::<TranscriptRow>(&path, &[]).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "text,color,start_time,end_time\n");
        assert!(read_table::<TranscriptRow>(&path).await.unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Test Program"), "Test Program");
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component(".."), "_");
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::archive::zip_folder;
use crate::artifacts::{write_table, ArtifactKind, ArtifactWriter};
use crate::catalog::{filter_min_duration, CatalogClient, EpisodeRecord, EpisodeRow};
use crate::config::{Config, ProgramConfig};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::subtitles::{decode_file, Segmenter};

/// Outcome of one program in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramStatus {
    Completed,
    /// The catalog query failed
    Unavailable,
    /// The catalog returned no usable episodes
    Empty,
    /// Writing this program's artifacts failed
    Failed,
}

/// Per-program counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramReport {
    pub program: String,
    pub status: ProgramStatus,
    pub episodes: usize,
    pub subtitles_stored: usize,
    pub subtitles_failed: usize,
    pub transcripts_written: usize,
    pub transcripts_failed: usize,
    pub videos_downloaded: usize,
    pub videos_failed: usize,
    pub metadata_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
}

impl ProgramReport {
    fn new(program: &str, status: ProgramStatus) -> Self {
        Self {
            program: program.to_string(),
            status,
            episodes: 0,
            subtitles_stored: 0,
            subtitles_failed: 0,
            transcripts_written: 0,
            transcripts_failed: 0,
            videos_downloaded: 0,
            videos_failed: 0,
            metadata_path: None,
            archive_path: None,
        }
    }
}

/// Totals over all programs of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub date: String,
    pub programs_processed: usize,
    pub programs_skipped: usize,
    pub episodes: usize,
    pub subtitles_stored: usize,
    pub subtitles_failed: usize,
    pub transcripts_written: usize,
    pub transcripts_failed: usize,
    pub videos_downloaded: usize,
    pub videos_failed: usize,
    pub total_time: Duration,
    pub programs: Vec<ProgramReport>,
}

impl RunSummary {
    fn record(&mut self, report: ProgramReport) {
        match report.status {
            ProgramStatus::Completed => self.programs_processed += 1,
            _ => self.programs_skipped += 1,
        }
        self.episodes += report.episodes;
        self.subtitles_stored += report.subtitles_stored;
        self.subtitles_failed += report.subtitles_failed;
        self.transcripts_written += report.transcripts_written;
        self.transcripts_failed += report.transcripts_failed;
        self.videos_downloaded += report.videos_downloaded;
        self.videos_failed += report.videos_failed;
        self.programs.push(report);
    }
}

/// Runs every configured program through the scraping stages
pub struct ScrapeRunner {
    config: Config,
    catalog: CatalogClient,
    fetcher: Fetcher,
    writer: ArtifactWriter,
    segmenter: Segmenter,
}

impl ScrapeRunner {
    pub fn new(config: Config) -> Result<Self> {
        info!("🔧 Initializing scraper for {} programs", config.programs.len());

        let catalog = CatalogClient::new(&config.api)?;
        let fetcher = Fetcher::new(&config.api)?;
        let writer = ArtifactWriter::new(config.run.output_dir.clone());
        let segmenter = Segmenter::new().with_trailing_flush(config.subtitles.flush_trailing_fragment);

        Ok(Self {
            config,
            catalog,
            fetcher,
            writer,
            segmenter,
        })
    }

    /// Scrape all programs, writing artifacts under the run date `date`
    ///
    /// Only an unusable output folder fails the run; everything else is
    /// logged and counted in the summary.
    pub async fn run(&self, date: &str) -> Result<RunSummary> {
        let start_time = Instant::now();

        info!("🚀 Starting scrape run for {}", date);
        info!("📂 Output: {}", self.writer.base_dir().display());
        tokio::fs::create_dir_all(self.writer.base_dir()).await?;

        let mut summary = RunSummary {
            date: date.to_string(),
            ..RunSummary::default()
        };

        for (index, program) in self.config.programs.iter().enumerate() {
            info!("📺 Program {}/{}: {}", index + 1, self.config.programs.len(), program.name);

            let report = match self.process_program(program, date).await {
                Ok(report) => report,
                Err(e) if e.is_recoverable() => {
                    warn!("❌ Program {} failed: {}", program.name, e);
                    ProgramReport::new(&program.name, ProgramStatus::Failed)
                }
                Err(e) => return Err(e),
            };
            summary.record(report);
        }

        summary.total_time = start_time.elapsed();
        Ok(summary)
    }

    /// Run all enabled stages for one program
    pub async fn process_program(&self, program: &ProgramConfig, date: &str) -> Result<ProgramReport> {
        let name = program.name.as_str();

        let Some(episodes) = self.catalog.fetch_program(name, &program.query).await else {
            return Ok(ProgramReport::new(name, ProgramStatus::Unavailable));
        };
        if episodes.is_empty() {
            warn!("Querying for '{}' has returned no data.", name);
            return Ok(ProgramReport::new(name, ProgramStatus::Empty));
        }

        let episodes = self.select_episodes(program, episodes);
        let mut report = ProgramReport::new(name, ProgramStatus::Completed);
        report.episodes = episodes.len();

        let xml_dir = self.writer.location_for(name, date, ArtifactKind::RawSubtitles).await?;

        // Documents of this run; a failed fetch never falls back to an older file
        let documents = if self.config.run.subtitles {
            info!("📄 Fetching {} subtitle documents for {}", episodes.len(), name);
            let stored = self.fetcher.fetch_subtitles(&episodes, &xml_dir).await;
            report.subtitles_stored = stored.iter().filter(|p| p.is_some()).count();
            report.subtitles_failed = stored.len() - report.subtitles_stored;
            stored
        } else {
            stored_documents(&episodes, &xml_dir).await
        };

        if self.config.run.parse {
            self.parse_stage(name, date, &episodes, &documents, &mut report).await?;
        }

        if self.config.run.download {
            self.download_stage(name, date, &episodes, &mut report).await?;
        }

        let rows: Vec<EpisodeRow> = episodes
            .iter()
            .zip(&documents)
            .map(|(episode, document)| EpisodeRow::new(episode, document.as_ref().map(|_| episode.file_name("xml"))))
            .collect();
        self.writer.location_for(name, date, ArtifactKind::Metadata).await?;
        let metadata_path = self.writer.metadata_path(name, date);
        write_table(&metadata_path, &rows).await?;
        info!("💾 Metadata for {} saved to: {}", name, metadata_path.display());
        report.metadata_path = Some(metadata_path);

        info!(
            "✅ {}: {} episodes, {} subtitles, {} transcripts, {} videos",
            name,
            report.episodes,
            report.subtitles_stored,
            report.transcripts_written,
            report.videos_downloaded
        );
        Ok(report)
    }

    fn select_episodes(&self, program: &ProgramConfig, episodes: Vec<EpisodeRecord>) -> Vec<EpisodeRecord> {
        let mut episodes = filter_min_duration(episodes, program.query.min_duration);

        if let Some(window) = self.config.run.time_window() {
            episodes = window.filter(episodes);
            info!(
                "Filtering data between {} and {}. Result has {} rows.",
                window.start,
                window.end,
                episodes.len()
            );
        }
        episodes
    }

    /// Decode and segment the subtitle document of every episode that has one
    ///
    /// `documents` holds one entry per episode, in episode order.
    async fn parse_stage(
        &self,
        name: &str,
        date: &str,
        episodes: &[EpisodeRecord],
        documents: &[Option<PathBuf>],
        report: &mut ProgramReport,
    ) -> Result<()> {
        let transcript_dir = self.writer.location_for(name, date, ArtifactKind::Transcripts).await?;
        let documents: Vec<_> = episodes
            .iter()
            .zip(documents)
            .filter_map(|(episode, document)| document.as_ref().map(|path| (episode, path)))
            .collect();

        info!("📝 Parsing {} XML files for {} on {}", documents.len(), name, date);

        for (episode, xml_path) in documents {
            let records = match decode_file(xml_path).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("⚠️ Skipping transcript of {}: {}", episode.permanent_id, e);
                    report.transcripts_failed += 1;
                    continue;
                }
            };

            let rows = self.segmenter.segment(&records);
            let csv_path = transcript_dir.join(episode.file_name("csv"));
            match write_table(&csv_path, &rows).await {
                Ok(()) => {
                    debug!("{} transcript rows written to {}", rows.len(), csv_path.display());
                    report.transcripts_written += 1;
                }
                Err(e) => {
                    warn!("⚠️ Could not write transcript {}: {}", csv_path.display(), e);
                    report.transcripts_failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Download videos one after another, then optionally archive them
    async fn download_stage(
        &self,
        name: &str,
        date: &str,
        episodes: &[EpisodeRecord],
        report: &mut ProgramReport,
    ) -> Result<()> {
        let video_dir = self.writer.location_for(name, date, ArtifactKind::Videos).await?;
        info!("🎬 Downloading {} videos for {}", episodes.len(), name);

        for episode in episodes {
            let Some(url) = episode.download_url() else {
                debug!("No video URL for {}", episode.permanent_id);
                report.videos_failed += 1;
                continue;
            };

            let dest = video_dir.join(episode.file_name("mp4"));
            match self.fetcher.download_video(url, &dest).await {
                Ok(_) => report.videos_downloaded += 1,
                Err(e) => {
                    warn!("⚠️ Video download failed for {}: {}", episode.permanent_id, e);
                    report.videos_failed += 1;
                }
            }
        }

        if self.config.run.zip_videos {
            let archive_path = self.writer.archive_path(name, date);
            match zip_folder(&video_dir, &archive_path).await {
                Ok(_) => report.archive_path = Some(archive_path),
                Err(e) => warn!("⚠️ Could not archive videos of {}: {}", name, e),
            }
        }
        Ok(())
    }
}

/// Documents left in `xml_dir` by an earlier run, one entry per episode
async fn stored_documents(episodes: &[EpisodeRecord], xml_dir: &Path) -> Vec<Option<PathBuf>> {
    let mut documents = Vec::with_capacity(episodes.len());
    for episode in episodes {
        let path = xml_dir.join(episode.file_name("xml"));
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        documents.push(exists.then_some(path));
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::read_table;
    use crate::config::{ConfigBuilder, ProgramQuery, QuerySpec};
    use crate::subtitles::TranscriptRow;
    use mockito::Server;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<tt:tt xmlns:tt="http://www.w3.org/ns/ttml">
  <tt:head><tt:styling><tt:style xml:id="textWhite"/></tt:styling></tt:head>
  <tt:body><tt:div>
    <tt:p begin="10:00:00.000" end="10:00:02.000"><tt:span style="textWhite">Guten Abend,</tt:span></tt:p>
    <tt:p begin="10:00:02.000" end="10:00:04.000"><tt:span style="textWhite">meine Damen und Herren.</tt:span></tt:p>
  </tt:div></tt:body>
</tt:tt>"#;

    fn program_query() -> ProgramQuery {
        ProgramQuery {
            queries: vec![QuerySpec {
                fields: vec!["title".into()],
                query: "tagesschau".into(),
            }],
            ..ProgramQuery::default()
        }
    }

    fn runner(server: &Server, output: &Path, subtitles: bool) -> ScrapeRunner {
        let config = ConfigBuilder::new()
            .with_output_dir(output.to_path_buf())
            .with_endpoint(format!("{}/api/query", server.url()))
            .with_program("tagesschau", program_query())
            .with_subtitles(subtitles)
            .build();
        ScrapeRunner::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_unavailable_program_is_skipped() {
        let mut server = Server::new_async().await;
        let _m = server.mock("POST", "/api/query").with_status(503).create_async().await;
        let temp_dir = TempDir::new().unwrap();

        let summary = runner(&server, temp_dir.path(), true).run("2024-05-01").await.unwrap();
        assert_eq!(summary.programs_skipped, 1);
        assert_eq!(summary.programs_processed, 0);
        assert_eq!(summary.programs[0].status, ProgramStatus::Unavailable);
        assert!(!temp_dir.path().join("tagesschau").exists());
    }

    #[tokio::test]
    async fn test_empty_program_is_skipped() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/query")
            .with_status(200)
            .with_body(r#"{"result":{"results":[]},"err":null}"#)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();

        let summary = runner(&server, temp_dir.path(), true).run("2024-05-01").await.unwrap();
        assert_eq!(summary.programs[0].status, ProgramStatus::Empty);
        assert_eq!(summary.programs_skipped, 1);
    }

    #[tokio::test]
    async fn test_parse_stage_uses_stored_documents() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/query")
            .with_status(200)
            .with_body(
                r#"{"result":{"results":[
                    {"timestamp":1714500000,"title":"a","url_subtitle":"https://example.com/a.xml"},
                    {"timestamp":1714600000,"title":"b","url_subtitle":"https://example.com/b.xml"}
                ]},"err":null}"#,
            )
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let run_dir = temp_dir.path().join("tagesschau/2024-05-01");
        std::fs::create_dir_all(run_dir.join("xml-subtitles")).unwrap();
        std::fs::write(run_dir.join("xml-subtitles/tagesschau_1714500000.xml"), DOCUMENT).unwrap();

        let summary = runner(&server, temp_dir.path(), false).run("2024-05-01").await.unwrap();
        let report = &summary.programs[0];
        assert_eq!(report.status, ProgramStatus::Completed);
        assert_eq!(report.episodes, 2);
        assert_eq!(report.transcripts_written, 1);

        let rows: Vec<TranscriptRow> = read_table(&run_dir.join("subtitles/tagesschau_1714500000.csv"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "Guten Abend, meine Damen und Herren.");
        assert_eq!(rows[0].end, "10:00:04.000");
        assert_eq!(rows[0].style_tag, "textWhite");

        let metadata: Vec<EpisodeRow> = read_table(&run_dir.join("tagesschau_2024-05-01.csv")).await.unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].xml_path.as_deref(), Some("tagesschau_1714500000.xml"));
        assert_eq!(metadata[1].xml_path, None);
    }

    #[tokio::test]
    async fn test_unwritable_program_folder_marks_program_failed() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/query")
            .with_status(200)
            .with_body(
                r#"{"result":{"results":[
                    {"timestamp":1714500000,"title":"a","url_subtitle":"https://example.com/a.xml"}
                ]},"err":null}"#,
            )
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        // A plain file where the program folder belongs
        std::fs::write(temp_dir.path().join("tagesschau"), b"").unwrap();

        let summary = runner(&server, temp_dir.path(), false).run("2024-05-01").await.unwrap();
        assert_eq!(summary.programs[0].status, ProgramStatus::Failed);
        assert_eq!(summary.programs_skipped, 1);
        assert_eq!(summary.programs_processed, 0);
    }

    #[test]
    fn test_summary_totals() {
        let mut summary = RunSummary::default();
        let mut report = ProgramReport::new("a", ProgramStatus::Completed);
        report.episodes = 3;
        report.transcripts_written = 2;
        summary.record(report);
        summary.record(ProgramReport::new("b", ProgramStatus::Unavailable));

        assert_eq!(summary.programs_processed, 1);
        assert_eq!(summary.programs_skipped, 1);
        assert_eq!(summary.episodes, 3);
        assert_eq!(summary.transcripts_written, 2);
    }
}

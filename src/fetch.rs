//! Subtitle and video downloads

use crate::artifacts::write_bytes;
use crate::catalog::EpisodeRecord;
use crate::config::ApiConfig;
use crate::error::{Result, ScraperError};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

/// HTTP fetcher for per-episode documents and videos
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_concurrent: usize,
}

impl Fetcher {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .user_agent(api.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            max_concurrent: api.max_concurrent_fetches.max(1),
        })
    }

    /// GET one subtitle document
    pub async fn fetch_subtitle(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScraperError::item_fetch(url, e))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    /// Fetch and store the subtitle document of every episode
    ///
    /// Returns one entry per episode, in episode order: the stored file, or
    /// `None` when the episode has no subtitle or its fetch failed.
    pub async fn fetch_subtitles(&self, episodes: &[EpisodeRecord], dir: &Path) -> Vec<Option<PathBuf>> {
        stream::iter(episodes)
            .map(|episode| self.store_subtitle(episode, dir))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    async fn store_subtitle(&self, episode: &EpisodeRecord, dir: &Path) -> Option<PathBuf> {
        let url = episode.subtitle_url.as_deref()?;
        let path = dir.join(episode.file_name("xml"));

        let stored = async {
            let bytes = self.fetch_subtitle(url).await?;
            write_bytes(&path, &bytes).await
        }
        .await;

        match stored {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("⚠️ Skipping subtitles of {}: {}", episode.permanent_id, e);
                None
            }
        }
    }

    /// Stream a video to `dest`, returning the number of bytes written
    ///
    /// The body goes to `{dest}.part` first and is renamed once complete, so
    /// an interrupted download never leaves a truncated video behind.
    pub async fn download_video(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.get(url).await?;
        let partial = PathBuf::from(format!("{}.part", dest.display()));

        let written = match stream_to_file(url, response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, dest).await?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }

    async fn get(&self, url: &str) -> Result<Response> {
        let parsed = Url::parse(url).map_err(|e| ScraperError::item_fetch(url, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ScraperError::item_fetch(
                url,
                format!("unsupported scheme: {}", parsed.scheme()),
            ));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ScraperError::item_fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::item_fetch(url, format!("HTTP {}", status)));
        }
        Ok(response)
    }
}

async fn stream_to_file(url: &str, response: Response, path: &Path) -> Result<u64> {
    let progress = progress_bar(response.content_length());
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ScraperError::item_fetch(url, e))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await?;
    progress.finish_and_clear();

    Ok(written)
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    let progress = match total {
        Some(total) if total > 0 => ProgressBar::new(total),
        _ => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::with_template("{spinner:.green} {bytes}/{total_bytes} {bar:40.cyan/blue} {eta}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{normalize, RawRecord};
    use mockito::Server;
    use tempfile::TempDir;

    fn fetcher(max_concurrent_fetches: usize) -> Fetcher {
        Fetcher::new(&ApiConfig {
            max_concurrent_fetches,
            ..ApiConfig::default()
        })
        .unwrap()
    }

    fn episode(server: &Server, timestamp: i64, path: &str) -> EpisodeRecord {
        let raw = RawRecord {
            timestamp: Some(timestamp),
            url_subtitle: Some(format!("https://example.com{}", path)),
            ..Default::default()
        };
        let mut episode = normalize("test", vec![raw]).remove(0);
        episode.subtitle_url = Some(format!("{}{}", server.url(), path));
        episode
    }

    #[tokio::test]
    async fn test_fetch_subtitles_keeps_order_and_skips_failures() {
        let mut server = Server::new_async().await;
        let _ok1 = server.mock("GET", "/one.xml").with_status(200).with_body("<tt>1</tt>").create_async().await;
        let _bad = server.mock("GET", "/two.xml").with_status(404).create_async().await;
        let _ok3 = server.mock("GET", "/three.xml").with_status(200).with_body("<tt>3</tt>").create_async().await;

        let episodes = vec![
            episode(&server, 1, "/one.xml"),
            episode(&server, 2, "/two.xml"),
            episode(&server, 3, "/three.xml"),
        ];
        let temp_dir = TempDir::new().unwrap();

        for concurrency in [1, 3] {
            let stored = fetcher(concurrency).fetch_subtitles(&episodes, temp_dir.path()).await;
            assert_eq!(stored.len(), 3);
            assert_eq!(stored[0], Some(temp_dir.path().join("test_1.xml")));
            assert_eq!(stored[1], None);
            assert_eq!(stored[2], Some(temp_dir.path().join("test_3.xml")));
        }

        let content = tokio::fs::read_to_string(temp_dir.path().join("test_3.xml")).await.unwrap();
        assert_eq!(content, "<tt>3</tt>");
        assert!(!temp_dir.path().join("test_2.xml").exists());
    }

    #[tokio::test]
    async fn test_fetch_subtitle_rejects_other_schemes() {
        let err = fetcher(1).fetch_subtitle("ftp://example.com/a.xml").await.unwrap_err();
        assert!(matches!(err, ScraperError::ItemFetchFailed { .. }));
    }

    #[tokio::test]
    async fn test_download_video_success() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/video.mp4").with_status(200).with_body("data").create_async().await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("video.mp4");
        let url = format!("{}/video.mp4", server.url());

        let written = fetcher(1).download_video(&url, &dest).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"data");
        assert!(!temp_dir.path().join("video.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_download_video_failure() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/video.mp4").with_status(404).create_async().await;

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("video.mp4");
        let url = format!("{}/video.mp4", server.url());

        let err = fetcher(1).download_video(&url, &dest).await.unwrap_err();
        assert!(matches!(err, ScraperError::ItemFetchFailed { .. }));
        assert!(!dest.exists());
    }
}

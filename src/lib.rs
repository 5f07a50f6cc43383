/// OER Scraper
///
/// Collects broadcast metadata from the MediathekViewWeb catalog, fetches the
/// TTML subtitles of each episode and turns them into sentence-level
/// transcript tables. Videos can optionally be downloaded and archived.

pub mod archive;
pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod processing;
pub mod subtitles;

// Re-export main types for easy access
pub use crate::artifacts::{ArtifactKind, ArtifactWriter};
pub use crate::catalog::{CatalogClient, EpisodeRecord, RawRecord};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Result, ScraperError};
pub use crate::fetch::Fetcher;
pub use crate::processing::{RunSummary, ScrapeRunner};
pub use crate::subtitles::{CaptionRecord, Segmenter, TranscriptRow};

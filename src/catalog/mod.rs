/// Broadcast catalog access
///
/// This module queries the MediathekViewWeb search API and turns its result
/// rows into deduplicated episode records with stable identifiers.

pub mod client;
pub mod normalize;

// Re-export main types
pub use client::{CatalogClient, CatalogQuery};
pub use normalize::{filter_min_duration, normalize, normalize_episodes, TimeWindow};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Timestamp layout used in the metadata table
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One result row exactly as the API returns it
///
/// The API is loose about types: numbers sometimes arrive as strings and
/// missing values as empty strings, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub channel: Option<String>,
    pub topic: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub duration: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub size: Option<i64>,
    pub url_website: Option<String>,
    pub url_subtitle: Option<String>,
    pub url_video: Option<String>,
    pub url_video_low: Option<String>,
    pub url_video_hd: Option<String>,
    #[serde(rename = "filmlisteTimestamp", deserialize_with = "lenient_string")]
    pub filmliste_timestamp: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

/// One broadcast episode after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// `{program}_{epoch seconds}`, stable across runs
    pub permanent_id: String,
    /// Broadcast time (UTC)
    pub timestamp: DateTime<Utc>,
    pub subtitle_url: Option<String>,
    pub video_url: Option<String>,
    pub video_url_low: Option<String>,
    pub video_url_hd: Option<String>,
    pub channel: Option<String>,
    pub topic: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Duration in seconds
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub website_url: Option<String>,
    pub filmliste_timestamp: Option<String>,
    pub id: Option<String>,
}

impl EpisodeRecord {
    /// URL used for video downloads: the low-quality stream, else the standard one
    pub fn download_url(&self) -> Option<&str> {
        self.video_url_low
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| self.video_url.as_deref().filter(|url| !url.is_empty()))
    }

    /// File name of this episode's artifact with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", crate::artifacts::sanitize_component(&self.permanent_id), extension)
    }
}

/// Flat row of the per-run metadata table, columns named as in the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRow {
    pub channel: Option<String>,
    pub topic: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub timestamp: String,
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub url_website: Option<String>,
    pub url_subtitle: Option<String>,
    pub url_video: Option<String>,
    pub url_video_low: Option<String>,
    pub url_video_hd: Option<String>,
    #[serde(rename = "filmlisteTimestamp")]
    pub filmliste_timestamp: Option<String>,
    pub id: Option<String>,
    pub permanent_id: String,
    pub xml_path: Option<String>,
}

impl EpisodeRow {
    pub fn new(episode: &EpisodeRecord, xml_path: Option<String>) -> Self {
        Self {
            channel: episode.channel.clone(),
            topic: episode.topic.clone(),
            title: episode.title.clone(),
            description: episode.description.clone(),
            timestamp: episode.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            duration: episode.duration,
            size: episode.size,
            url_website: episode.website_url.clone(),
            url_subtitle: episode.subtitle_url.clone(),
            url_video: episode.video_url.clone(),
            url_video_low: episode.video_url_low.clone(),
            url_video_hd: episode.video_url_hd.clone(),
            filmliste_timestamp: episode.filmliste_timestamp.clone(),
            id: episode.id.clone(),
            permanent_id: episode.permanent_id.clone(),
            xml_path,
        }
    }
}

impl crate::artifacts::TableRow for EpisodeRow {
    const HEADERS: &'static [&'static str] = &[
        "channel",
        "topic",
        "title",
        "description",
        "timestamp",
        "duration",
        "size",
        "url_website",
        "url_subtitle",
        "url_video",
        "url_video_low",
        "url_video_hd",
        "filmlisteTimestamp",
        "id",
        "permanent_id",
        "xml_path",
    ];
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

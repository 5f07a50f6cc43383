/// Normalization and filtering of catalog results
use super::{EpisodeRecord, RawRecord};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Turn raw API rows for `program` into usable episode records
///
/// Rows are deduplicated by subtitle URL (first occurrence wins), given a
/// permanent id from the unconverted epoch timestamp, converted, and finally
/// restricted to rows whose subtitle URL uses `https`.
pub fn normalize(program: &str, raw_results: Vec<RawRecord>) -> Vec<EpisodeRecord> {
    normalize_episodes(program, raw_results, true)
}

/// Like [`normalize`], with the scheme restriction switchable
///
/// With `https_only` off, rows still need a non-empty subtitle URL.
pub fn normalize_episodes(program: &str, raw_results: Vec<RawRecord>, https_only: bool) -> Vec<EpisodeRecord> {
    let mut seen_subtitles = HashSet::new();

    raw_results
        .into_iter()
        .filter(|raw| seen_subtitles.insert(raw.url_subtitle.clone()))
        .filter_map(|raw| to_episode(program, raw))
        .filter(|episode| if https_only { has_https_subtitle(episode) } else { has_subtitle(episode) })
        .collect()
}

fn to_episode(program: &str, raw: RawRecord) -> Option<EpisodeRecord> {
    let Some(epoch) = raw.timestamp else {
        debug!("Dropping {} result without timestamp: {:?}", program, raw.title);
        return None;
    };
    let Some(timestamp) = DateTime::<Utc>::from_timestamp(epoch, 0) else {
        debug!("Dropping {} result with out-of-range timestamp {}", program, epoch);
        return None;
    };

    Some(EpisodeRecord {
        permanent_id: format!("{}_{}", program, epoch),
        timestamp,
        subtitle_url: raw.url_subtitle,
        video_url: raw.url_video,
        video_url_low: raw.url_video_low,
        video_url_hd: raw.url_video_hd,
        channel: raw.channel,
        topic: raw.topic,
        title: raw.title,
        description: raw.description,
        duration: raw.duration,
        size: raw.size,
        website_url: raw.url_website,
        filmliste_timestamp: raw.filmliste_timestamp,
        id: raw.id,
    })
}

fn has_https_subtitle(episode: &EpisodeRecord) -> bool {
    episode
        .subtitle_url
        .as_deref()
        .is_some_and(|url| url.starts_with("https"))
}

fn has_subtitle(episode: &EpisodeRecord) -> bool {
    episode.subtitle_url.as_deref().is_some_and(|url| !url.is_empty())
}

/// Inclusive broadcast-time window, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Build the window for a run
    ///
    /// Without a start time there is no window. Without an end time the
    /// window reaches `interval_days` back from the start time.
    pub fn from_run(
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        interval_days: i64,
    ) -> Option<Self> {
        let start = start_time?;
        let end = end_time.unwrap_or_else(|| start - Duration::days(interval_days));
        Some(Self {
            start: start.min(end),
            end: start.max(end),
        })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let naive = timestamp.naive_utc();
        naive >= self.start && naive <= self.end
    }

    /// Keep the episodes broadcast inside the window
    pub fn filter(&self, episodes: Vec<EpisodeRecord>) -> Vec<EpisodeRecord> {
        episodes
            .into_iter()
            .filter(|episode| self.contains(&episode.timestamp))
            .collect()
    }
}

/// Drop episodes shorter than `min_seconds`; unknown durations are kept
pub fn filter_min_duration(episodes: Vec<EpisodeRecord>, min_seconds: u64) -> Vec<EpisodeRecord> {
    if min_seconds == 0 {
        return episodes;
    }
    let min_seconds = i64::try_from(min_seconds).unwrap_or(i64::MAX);
    episodes
        .into_iter()
        .filter(|episode| episode.duration.map_or(true, |d| d >= min_seconds))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(timestamp: i64, subtitle: &str) -> RawRecord {
        RawRecord {
            timestamp: Some(timestamp),
            url_subtitle: Some(subtitle.to_string()),
            ..Default::default()
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_permanent_id_and_timestamp() {
        let episodes = normalize("Test Program", vec![raw(1609459200, "https://example.com/subtitle")]);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].permanent_id, "Test Program_1609459200");
        assert_eq!(episodes[0].timestamp.naive_utc(), at(2021, 1, 1, 0));
    }

    #[test]
    fn test_dedup_by_subtitle_url_keeps_first() {
        let episodes = normalize(
            "p",
            vec![
                raw(100, "https://example.com/a.xml"),
                raw(200, "https://example.com/b.xml"),
                raw(300, "https://example.com/a.xml"),
            ],
        );
        let ids: Vec<_> = episodes.iter().map(|e| e.permanent_id.as_str()).collect();
        assert_eq!(ids, vec!["p_100", "p_200"]);
    }

    #[test]
    fn test_scheme_filter() {
        let mut missing = raw(400, "");
        missing.url_subtitle = None;
        let episodes = normalize(
            "p",
            vec![
                raw(100, "http://example.com/a.xml"),
                raw(200, ""),
                raw(300, "https://example.com/c.xml"),
                missing,
            ],
        );
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].permanent_id, "p_300");
    }

    #[test]
    fn test_plain_http_kept_when_scheme_filter_is_off() {
        let episodes = normalize_episodes(
            "p",
            vec![raw(100, "http://example.com/a.xml"), raw(200, ""), raw(300, "https://example.com/c.xml")],
            false,
        );
        let ids: Vec<_> = episodes.iter().map(|e| e.permanent_id.as_str()).collect();
        assert_eq!(ids, vec!["p_100", "p_300"]);
    }

    #[test]
    fn test_missing_timestamp_is_dropped() {
        let mut no_time = raw(0, "https://example.com/a.xml");
        no_time.timestamp = None;
        assert!(normalize("p", vec![no_time]).is_empty());
    }

    #[test]
    fn test_empty_results() {
        assert!(normalize("p", Vec::new()).is_empty());
    }

    #[test]
    fn test_time_window_with_explicit_end() {
        let window = TimeWindow::from_run(Some(at(2021, 1, 1, 0)), Some(at(2021, 1, 2, 0)), 7).unwrap();
        let episodes = normalize(
            "p",
            vec![
                raw(1609459200, "https://e/1"),          // 2021-01-01 00:00, inclusive start
                raw(1609459200 + 86400, "https://e/2"),  // 2021-01-02 00:00, inclusive end
                raw(1609459200 + 90000, "https://e/3"),  // outside
            ],
        );
        let kept = window.filter(episodes);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_time_window_defaults_to_interval_back_from_start() {
        let window = TimeWindow::from_run(Some(at(2021, 1, 8, 0)), None, 7).unwrap();
        assert_eq!(window.start, at(2021, 1, 1, 0));
        assert_eq!(window.end, at(2021, 1, 8, 0));
        assert!(TimeWindow::from_run(None, Some(at(2021, 1, 8, 0)), 7).is_none());
    }

    #[test]
    fn test_min_duration_filter() {
        let mut short = raw(1, "https://e/1");
        short.duration = Some(60);
        let mut long = raw(2, "https://e/2");
        long.duration = Some(900);
        let unknown = raw(3, "https://e/3");

        let episodes = normalize("p", vec![short, long, unknown]);
        assert_eq!(filter_min_duration(episodes.clone(), 0).len(), 3);

        let kept = filter_min_duration(episodes, 300);
        let ids: Vec<_> = kept.iter().map(|e| e.permanent_id.as_str()).collect();
        assert_eq!(ids, vec!["p_2", "p_3"]);
    }
}

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oer_scraper::{Config, ScrapeRunner};

#[derive(Parser, Debug)]
#[command(name = "oer-scraper")]
#[command(version, about = "Scrape broadcast metadata, subtitles and videos from MediathekViewWeb")]
struct Cli {
    /// Folder the per-program output is written to
    output_folder: PathBuf,

    /// Include subtitles (default)
    #[arg(long, overrides_with = "no_subtitles")]
    subtitles: bool,
    #[arg(long, overrides_with = "subtitles")]
    no_subtitles: bool,

    /// Parse the subtitles (default)
    #[arg(long, overrides_with = "no_parse")]
    parse: bool,
    #[arg(long, overrides_with = "parse")]
    no_parse: bool,

    /// Download the videos
    #[arg(long, overrides_with = "no_download")]
    download: bool,
    #[arg(long, overrides_with = "download")]
    no_download: bool,

    /// Archive downloaded videos into {program}/{date}.zip
    #[arg(long)]
    zip: bool,

    /// Only keep episodes broadcast from this time on
    #[arg(short = 'S', long = "start-time", value_parser = parse_datetime)]
    start_time: Option<NaiveDateTime>,

    /// Only keep episodes broadcast up to this time
    #[arg(short = 'E', long = "end-time", value_parser = parse_datetime)]
    end_time: Option<NaiveDateTime>,

    /// Window length in days when no end time is given [default: 7]
    #[arg(short = 'I', long)]
    interval: Option<i64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        config.run.output_dir = self.output_folder.clone();
        if let Some(enable) = flag_pair(self.subtitles, self.no_subtitles) {
            config.run.subtitles = enable;
        }
        if let Some(enable) = flag_pair(self.parse, self.no_parse) {
            config.run.parse = enable;
        }
        if let Some(enable) = flag_pair(self.download, self.no_download) {
            config.run.download = enable;
        }
        if self.zip {
            config.run.zip_videos = true;
        }
        if self.start_time.is_some() {
            config.run.start_time = self.start_time;
        }
        if self.end_time.is_some() {
            config.run.end_time = self.end_time;
        }
        if let Some(days) = self.interval {
            config.run.interval_days = days;
        }
    }
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn parse_datetime(value: &str) -> std::result::Result<NaiveDateTime, String> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(datetime);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| {
            format!(
                "invalid datetime '{}': expected %Y-%m-%d, %Y-%m-%dT%H:%M:%S or %Y-%m-%d %H:%M:%S",
                value
            )
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "oer_scraper=debug,warn" } else { "oer_scraper=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    cli.apply(&mut config);

    config.validate()?;
    if config.programs.is_empty() {
        warn!("No programs configured, nothing to scrape");
    }
    info!("{}", config.summary());

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    let runner = ScrapeRunner::new(config)?;
    let summary = runner
        .run(&today)
        .await
        .context("Output folder is not writable")?;

    info!("🎉 Run finished in {:.2}s", summary.total_time.as_secs_f64());
    info!(
        "📊 Programs: {} processed, {} skipped",
        summary.programs_processed, summary.programs_skipped
    );
    info!(
        "📊 Episodes: {}, subtitles: {} stored / {} failed, transcripts: {} written / {} failed, videos: {} downloaded / {} failed",
        summary.episodes,
        summary.subtitles_stored,
        summary.subtitles_failed,
        summary.transcripts_written,
        summary.transcripts_failed,
        summary.videos_downloaded,
        summary.videos_failed
    );

    Ok(())
}

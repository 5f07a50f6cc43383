use crate::catalog::TimeWindow;
use crate::error::{Result, ScraperError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Configuration for the scraper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What a run does and where it writes
    pub run: RunConfig,

    /// Catalog and download HTTP settings
    pub api: ApiConfig,

    /// Subtitle processing settings
    pub subtitles: SubtitleConfig,

    /// Programs to scrape, processed in file order
    pub programs: Vec<ProgramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Fetch and store the raw subtitle documents
    pub subtitles: bool,

    /// Segment stored subtitle documents into transcripts
    pub parse: bool,

    /// Download the episode videos
    pub download: bool,

    /// Archive downloaded videos into `{program}/{date}.zip`
    pub zip_videos: bool,

    /// Start of the broadcast-time window (UTC)
    pub start_time: Option<NaiveDateTime>,

    /// End of the broadcast-time window (UTC)
    pub end_time: Option<NaiveDateTime>,

    /// Window length in days when no end time is given
    pub interval_days: i64,

    /// Base output directory
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Search API endpoint
    pub endpoint: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Timeout for every request (seconds)
    pub timeout_seconds: u64,

    /// Subtitle documents fetched at the same time within one program
    pub max_concurrent_fetches: usize,

    /// Only keep episodes whose subtitle URL uses https
    pub https_only_subtitles: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// Keep the unterminated fragment at the end of a document
    pub flush_trailing_fragment: bool,
}

/// A named program and the query that finds its episodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,

    #[serde(flatten)]
    pub query: ProgramQuery,
}

/// Search parameters for one program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramQuery {
    #[serde(rename = "sortBy", default)]
    pub sort_by: SortKey,

    #[serde(rename = "sortOrder", default)]
    pub sort_order: SortOrder,

    /// Include broadcasts scheduled in the future
    #[serde(default)]
    pub future: bool,

    #[serde(default)]
    pub offset: u32,

    #[serde(default = "default_page_size")]
    pub size: u32,

    /// Minimum episode duration in seconds (0 = no minimum)
    #[serde(default)]
    pub min_duration: u64,

    pub queries: Vec<QuerySpec>,
}

/// A single query: search `query` in each of `fields`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub fields: Vec<String>,
    pub query: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Timestamp,
    Duration,
    Channel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

fn default_page_size() -> u32 {
    50
}

impl Default for ProgramQuery {
    fn default() -> Self {
        Self {
            sort_by: SortKey::Timestamp,
            sort_order: SortOrder::Desc,
            future: false,
            offset: 0,
            size: default_page_size(),
            min_duration: 0,
            queries: Vec::new(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            subtitles: true,
            parse: true,
            download: false,
            zip_videos: false,
            start_time: None,
            end_time: None,
            interval_days: 7,
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://mediathekviewweb.de/api/query".to_string(),
            user_agent: concat!("oer-scraper/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 10,
            max_concurrent_fetches: 1,
            https_only_subtitles: true,
        }
    }
}

impl RunConfig {
    /// Broadcast-time window of this run, if any
    pub fn time_window(&self) -> Option<TimeWindow> {
        TimeWindow::from_run(self.start_time, self.end_time, self.interval_days)
    }
}

impl Config {
    /// Load configuration from the first config file found
    ///
    /// A config file that exists but cannot be read or parsed is an error;
    /// only when no file exists do the defaults apply.
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("oer-scraper.toml"),
            PathBuf::from("config/oer-scraper.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(PathBuf::from(home).join(".config/oer-scraper/config.toml"));
        }
        config_paths.push(PathBuf::from("/etc/oer-scraper/config.toml"));

        Self::load_from(&config_paths)
    }

    /// Load the first existing file of `config_paths`, or the defaults
    pub fn load_from(config_paths: &[PathBuf]) -> Result<Self> {
        match config_paths.iter().find(|path| path.exists()) {
            Some(path) => Self::from_file(path),
            // Fall back to defaults plus environment overrides
            None => Self::from_env(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.as_ref().display());
        Ok(config.with_env_overrides())
    }

    /// Default configuration with environment variable overrides
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(output_dir) = std::env::var("OER_SCRAPER_OUTPUT_DIR") {
            self.run.output_dir = PathBuf::from(output_dir);
        }

        if let Ok(endpoint) = std::env::var("OER_SCRAPER_API_ENDPOINT") {
            self.api.endpoint = endpoint;
        }

        if let Ok(timeout) = std::env::var("OER_SCRAPER_TIMEOUT") {
            self.api.timeout_seconds = timeout.parse().unwrap_or(self.api.timeout_seconds);
        }

        self
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.run.start_time, self.run.end_time) {
            if end < start {
                return Err(ScraperError::ConfigurationInvalid(format!(
                    "end time {} is before start time {}",
                    end, start
                )));
            }
        }

        if self.run.interval_days < 0 {
            return Err(ScraperError::ConfigurationInvalid(format!(
                "interval must not be negative (got {} days)",
                self.run.interval_days
            )));
        }

        if self.api.timeout_seconds == 0 {
            return Err(ScraperError::ConfigurationInvalid(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.api.max_concurrent_fetches == 0 {
            return Err(ScraperError::ConfigurationInvalid(
                "max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for program in &self.programs {
            if program.name.trim().is_empty() {
                return Err(ScraperError::ConfigurationInvalid(
                    "program name must not be empty".to_string(),
                ));
            }
            if !names.insert(program.name.as_str()) {
                return Err(ScraperError::ConfigurationInvalid(format!(
                    "program '{}' is configured twice",
                    program.name
                )));
            }
            if program.query.queries.is_empty() {
                return Err(ScraperError::ConfigurationInvalid(format!(
                    "program '{}' has no queries",
                    program.name
                )));
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        let window = match self.run.time_window() {
            Some(w) => format!("{} .. {}", w.start, w.end),
            None => "none".to_string(),
        };
        format!(
            "OER Scraper Configuration:\n\
            - Programs: {}\n\
            - Subtitles: {}, Parse: {}, Download: {}, Zip: {}\n\
            - Time window: {}\n\
            - Output Directory: {}\n\
            - API Endpoint: {} (timeout {}s, {} concurrent fetches)",
            self.programs
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.run.subtitles,
            self.run.parse,
            self.run.download,
            self.run.zip_videos,
            window,
            self.run.output_dir.display(),
            self.api.endpoint,
            self.api.timeout_seconds,
            self.api.max_concurrent_fetches
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.run.output_dir = dir;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.api.endpoint = endpoint.into();
        self
    }

    pub fn with_program(mut self, name: impl Into<String>, query: ProgramQuery) -> Self {
        self.config.programs.push(ProgramConfig {
            name: name.into(),
            query,
        });
        self
    }

    pub fn with_subtitles(mut self, enable: bool) -> Self {
        self.config.run.subtitles = enable;
        self
    }

    pub fn with_parse(mut self, enable: bool) -> Self {
        self.config.run.parse = enable;
        self
    }

    pub fn with_download(mut self, enable: bool) -> Self {
        self.config.run.download = enable;
        self
    }

    pub fn with_zip_videos(mut self, enable: bool) -> Self {
        self.config.run.zip_videos = enable;
        self
    }

    pub fn with_time_window(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.config.run.start_time = start;
        self.config.run.end_time = end;
        self
    }

    pub fn with_interval_days(mut self, days: i64) -> Self {
        self.config.run.interval_days = days;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, fetches: usize) -> Self {
        self.config.api.max_concurrent_fetches = fetches;
        self
    }

    pub fn with_https_only_subtitles(mut self, https_only: bool) -> Self {
        self.config.api.https_only_subtitles = https_only;
        self
    }

    pub fn with_trailing_flush(mut self, enable: bool) -> Self {
        self.config.subtitles.flush_trailing_fragment = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//! Error taxonomy for the scraper pipeline

/// Result type for scraper operations
pub type Result<T> = std::result::Result<T, ScraperError>;

/// Error types for scraper operations
///
/// The first four variants carry the pipeline's failure policy: an
/// `UpstreamUnavailable` skips one program, `ItemFetchFailed` and
/// `MalformedDocument` skip one episode, and `ConfigurationInvalid` aborts
/// the run before any network activity.
#[derive(thiserror::Error, Debug)]
pub enum ScraperError {
    #[error("Upstream catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Fetching {url} failed: {reason}")]
    ItemFetchFailed { url: String, reason: String },

    #[error("Malformed subtitle document: {0}")]
    MalformedDocument(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ScraperError {
    pub(crate) fn item_fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        ScraperError::ItemFetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only affects a single item or program
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ScraperError::ConfigurationInvalid(_) | ScraperError::ConfigParse(_)
        )
    }
}

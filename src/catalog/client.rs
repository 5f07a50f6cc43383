/// MediathekViewWeb query client
use super::{normalize_episodes, EpisodeRecord, RawRecord};
use crate::config::{ApiConfig, ProgramQuery, QuerySpec, SortKey, SortOrder};
use crate::error::{Result, ScraperError};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request body of the search API
#[derive(Debug, Clone, Serialize)]
pub struct CatalogQuery {
    pub queries: Vec<QuerySpec>,
    #[serde(rename = "sortBy")]
    pub sort_by: SortKey,
    #[serde(rename = "sortOrder")]
    pub sort_order: SortOrder,
    pub future: bool,
    pub offset: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<u64>,
}

impl From<&ProgramQuery> for CatalogQuery {
    fn from(query: &ProgramQuery) -> Self {
        Self {
            queries: query.queries.clone(),
            sort_by: query.sort_by,
            sort_order: query.sort_order,
            future: query.future,
            offset: query.offset,
            size: query.size,
            duration_min: (query.min_duration > 0).then_some(query.min_duration),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    results: Vec<RawRecord>,
}

/// HTTP client for the broadcast catalog
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    endpoint: String,
    https_only: bool,
}

impl CatalogClient {
    /// Create a new client from the API settings
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .user_agent(api.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            endpoint: api.endpoint.clone(),
            https_only: api.https_only_subtitles,
        })
    }

    /// Run one catalog query and return the raw result rows
    pub async fn query(&self, query: &ProgramQuery) -> Result<Vec<RawRecord>> {
        let body = serde_json::to_string(&CatalogQuery::from(query))
            .map_err(|e| ScraperError::UpstreamUnavailable(e.to_string()))?;

        // The API only accepts the JSON body when it is labelled as plain text
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| ScraperError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        debug!("Catalog query to {} returned status {}", self.endpoint, status);
        if status != StatusCode::OK {
            return Err(ScraperError::UpstreamUnavailable(format!("HTTP {}", status)));
        }

        let payload: QueryResponse = response
            .json()
            .await
            .map_err(|e| ScraperError::UpstreamUnavailable(e.to_string()))?;
        let results = payload.result.map(|r| r.results).unwrap_or_default();
        debug!("Catalog query returned {} results", results.len());

        Ok(results)
    }

    /// Fetch and normalize the current listing for `program`
    ///
    /// Returns `None` when the catalog cannot be reached; the caller skips
    /// the program for this run.
    pub async fn fetch_program(&self, program: &str, query: &ProgramQuery) -> Option<Vec<EpisodeRecord>> {
        debug!("Fetching data for {} with query: {:?}", program, query);

        match self.query(query).await {
            Ok(raw) => {
                let total = raw.len();
                let episodes = normalize_episodes(program, raw, self.https_only);
                info!("📺 {}: {} usable episodes from {} results", program, episodes.len(), total);
                Some(episodes)
            }
            Err(e) => {
                warn!("No data returned for {}: {}", program, e);
                None
            }
        }
    }
}

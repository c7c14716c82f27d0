use super::{NewsProvider, NewsQuery};
use crate::models::NewsArticle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub const SERPAPI_BASE: &str = "https://serpapi.com";

/// Google News results look back one week
const TIME_RANGE: &str = "qdr:w";

/// Reported in `error` when a search simply matched nothing
const NO_RESULTS_ERROR: &str = "hasn't returned any results";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    news_results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
    date: Option<String>,
    source: Option<ResultSource>,
}

/// SerpAPI reports the source either as a plain name or as an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultSource {
    Name(String),
    Detailed { name: Option<String> },
}

impl ResultSource {
    fn into_name(self) -> Option<String> {
        match self {
            ResultSource::Name(name) => Some(name),
            ResultSource::Detailed { name } => name,
        }
    }
}

/// SerpAPI Google News client
pub struct SerpApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(SERPAPI_BASE, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl NewsProvider for SerpApiClient {
    fn name(&self) -> &str {
        "SerpAPI"
    }

    async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsArticle>> {
        if self.api_key.is_empty() {
            anyhow::bail!("SERP_API_KEY is not set");
        }

        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", "google"),
                ("q", query.query.as_str()),
                ("tbm", "nws"),
                ("hl", query.language.as_str()),
                ("tbs", TIME_RANGE),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to SerpAPI")?;

        let status = response.status();
        let body: SearchResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse SerpAPI response ({})", status))?;

        if let Some(error) = body.error {
            if error.contains(NO_RESULTS_ERROR) {
                tracing::debug!("SerpAPI found no results: {}", error);
                return Ok(Vec::new());
            }
            anyhow::bail!("SerpAPI error ({}): {}", status, error);
        }
        if !status.is_success() {
            anyhow::bail!("SerpAPI error ({})", status);
        }

        Ok(body
            .news_results
            .into_iter()
            .filter_map(|r| {
                Some(NewsArticle {
                    title: r.title?,
                    description: r.snippet,
                    url: r.link,
                    published_at: r.date,
                    source: r.source.and_then(ResultSource::into_name),
                })
            })
            .collect())
    }
}

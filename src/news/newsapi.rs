use super::{NewsProvider, NewsQuery, QUERY_TIME_FORMAT};
use crate::models::NewsArticle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub const NEWSAPI_BASE: &str = "https://newsapi.org";

/// Response from /v2/everything
#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: RawSource,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

/// NewsAPI.org client
pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(NEWSAPI_BASE, api_key)
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
impl NewsProvider for NewsApiClient {
    fn name(&self) -> &str {
        "NewsAPI"
    }

    async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsArticle>> {
        if self.api_key.is_empty() {
            anyhow::bail!("NEWS_API_KEY is not set");
        }

        let from = query.from.format(QUERY_TIME_FORMAT).to_string();
        let to = query.to.format(QUERY_TIME_FORMAT).to_string();

        let response = self
            .client
            .get(format!("{}/v2/everything", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.query.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("language", query.language.as_str()),
                ("sortBy", query.sort_by.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to NewsAPI")?;

        let status = response.status();
        let body: EverythingResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse NewsAPI response ({})", status))?;

        if !status.is_success() || body.status != "ok" {
            anyhow::bail!(
                "NewsAPI error ({}): {}",
                status,
                body.message.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        Ok(body
            .articles
            .into_iter()
            .filter_map(|a| {
                Some(NewsArticle {
                    title: a.title?,
                    description: a.description,
                    url: a.url,
                    published_at: a.published_at,
                    source: a.source.name,
                })
            })
            .collect())
    }
}

use crate::models::FearGreedIndex;
use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;

pub const FEAR_GREED_API: &str = "https://api.alternative.me/fng/";

/// Client for the alternative.me crypto Fear & Greed index
#[derive(Clone)]
pub struct FearGreedClient {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    value_classification: String,
    timestamp: String,
}

impl FearGreedClient {
    pub fn new() -> Result<Self> {
        Self::with_url(FEAR_GREED_API)
    }

    pub fn with_url(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Fetch the latest index reading
    pub async fn latest(&self) -> Result<FearGreedIndex> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Fear & Greed API error ({})", response.status());
        }

        let body: FngResponse = response
            .json()
            .await
            .context("Failed to parse Fear & Greed response")?;
        let entry = body
            .data
            .into_iter()
            .next()
            .context("Fear & Greed response had no data")?;

        let seconds: i64 = entry
            .timestamp
            .parse()
            .with_context(|| format!("Invalid timestamp {}", entry.timestamp))?;
        let timestamp = DateTime::from_timestamp(seconds, 0)
            .with_context(|| format!("Timestamp out of range: {}", seconds))?;

        Ok(FearGreedIndex {
            value: entry
                .value
                .parse()
                .with_context(|| format!("Invalid index value {}", entry.value))?,
            classification: entry.value_classification,
            timestamp: timestamp.format("%Y%m%d%H").to_string(),
        })
    }
}

//! News headlines: provider clients, fallback between them and the local
//! cursor / article cache that persist across runs.

pub mod fallback;
pub mod newsapi;
pub mod serpapi;
pub mod store;

pub use fallback::{NewsAggregator, NewsError};
pub use newsapi::NewsApiClient;
pub use serpapi::SerpApiClient;
pub use store::{ArticleCache, NewsCursor};

use crate::config::NewsConfig;
use crate::models::NewsArticle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Timestamp format used in provider queries and the cursor file
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Search parameters shared by every provider
#[derive(Debug, Clone, PartialEq)]
pub struct NewsQuery {
    pub query: String,
    pub language: String,
    pub sort_by: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// A headline source
///
/// An `Err` means the provider is unusable (quota, auth or transport
/// failure). An empty `Ok` only means nothing matched.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &NewsQuery) -> anyhow::Result<Vec<NewsArticle>>;
}

/// Numbered headline list handed to the model
pub fn headline_summary(articles: &[NewsArticle]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(idx, article)| format!("{}. {}", idx, article.title))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetches the headlines published since the last run
pub struct NewsFeed {
    aggregator: NewsAggregator,
    cursor: NewsCursor,
    cache: ArticleCache,
    query: String,
    language: String,
    sort_by: String,
}

impl NewsFeed {
    pub fn new(aggregator: NewsAggregator, config: &NewsConfig) -> Self {
        Self {
            aggregator,
            cursor: NewsCursor::new(&config.cursor_path),
            cache: ArticleCache::new(&config.articles_path),
            query: config.query.clone(),
            language: config.language.clone(),
            sort_by: config.sort_by.clone(),
        }
    }

    /// NewsAPI first, SerpAPI as the fallback
    pub fn from_config(config: &NewsConfig) -> anyhow::Result<Self> {
        let providers: Vec<Box<dyn NewsProvider>> = vec![
            Box::new(NewsApiClient::new(config.newsapi_key.clone())?),
            Box::new(SerpApiClient::new(config.serpapi_key.clone())?),
        ];
        Ok(Self::new(NewsAggregator::new(providers), config))
    }

    /// Fetch the window `[cursor - 1 day, now]`, record the articles and
    /// move the cursor forward
    ///
    /// The cursor only moves when a provider returned articles. Failing to
    /// write the cache or cursor is logged; the fetched articles are still
    /// returned.
    pub async fn refresh(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<NewsArticle>> {
        let query = NewsQuery {
            query: self.query.clone(),
            language: self.language.clone(),
            sort_by: self.sort_by.clone(),
            from: self.cursor.window_start(now),
            to: now,
        };

        let articles = self.aggregator.fetch(&query).await?;

        match self.cache.merge(&articles) {
            Ok(added) => tracing::info!(
                "Fetched {} articles ({} new since last run)",
                articles.len(),
                added
            ),
            Err(e) => tracing::warn!(
                "⚠️  Fetched {} articles but could not update the article cache: {:#}",
                articles.len(),
                e
            ),
        }
        if let Err(e) = self.cursor.save(now) {
            tracing::warn!("⚠️  Could not save the news cursor: {:#}", e);
        }

        Ok(articles)
    }
}

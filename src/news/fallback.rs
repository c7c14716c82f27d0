use super::{NewsProvider, NewsQuery};
use crate::models::NewsArticle;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NewsError {
    #[error("all news providers are exhausted")]
    AllProvidersExhausted,
    #[error("no news provider returned articles")]
    NoArticles,
}

#[derive(Debug)]
struct FallbackState {
    current: usize,
    exhausted: Vec<bool>,
}

/// Round-robin over news providers, retiring each one that fails
///
/// A provider that errors is marked exhausted for the lifetime of the
/// aggregator. A provider that answers with no articles stays available.
pub struct NewsAggregator {
    providers: Vec<Box<dyn NewsProvider>>,
    state: Mutex<FallbackState>,
}

impl NewsAggregator {
    pub fn new(providers: Vec<Box<dyn NewsProvider>>) -> Self {
        let exhausted = vec![false; providers.len()];
        Self {
            providers,
            state: Mutex::new(FallbackState {
                current: 0,
                exhausted,
            }),
        }
    }

    /// Name of the provider the next request starts with
    pub async fn current_provider(&self) -> Option<&str> {
        let state = self.state.lock().await;
        self.providers.get(state.current).map(|p| p.name())
    }

    pub async fn is_exhausted(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        self.providers
            .iter()
            .zip(&state.exhausted)
            .any(|(p, exhausted)| p.name() == name && *exhausted)
    }

    /// Query providers starting from the current one, each at most once
    pub async fn fetch(&self, query: &NewsQuery) -> Result<Vec<NewsArticle>, NewsError> {
        let mut state = self.state.lock().await;
        let count = self.providers.len();

        for _ in 0..count {
            let idx = state.current;
            if !state.exhausted[idx] {
                let provider = &self.providers[idx];
                match provider.search(query).await {
                    Ok(articles) if !articles.is_empty() => {
                        tracing::info!(
                            "📰 {} returned {} articles",
                            provider.name(),
                            articles.len()
                        );
                        return Ok(articles);
                    }
                    Ok(_) => {
                        tracing::warn!("{} returned no articles", provider.name());
                    }
                    Err(e) => {
                        tracing::warn!("{} failed, marking exhausted: {:#}", provider.name(), e);
                        state.exhausted[idx] = true;
                    }
                }
            }
            state.current = (idx + 1) % count;
        }

        if state.exhausted.iter().all(|e| *e) {
            tracing::error!("All news providers are exhausted");
            Err(NewsError::AllProvidersExhausted)
        } else {
            Err(NewsError::NoArticles)
        }
    }
}

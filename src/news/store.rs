use super::QUERY_TIME_FORMAT;
use crate::models::NewsArticle;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Plain-text file holding the time of the last successful fetch
#[derive(Debug, Clone)]
pub struct NewsCursor {
    path: PathBuf,
}

impl NewsCursor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Last saved timestamp; a missing or unreadable file counts as none
    pub fn read(&self) -> Option<DateTime<Utc>> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let raw = raw.trim();

        let parsed = DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
            });

        match parsed {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("Ignoring malformed news cursor {:?}: {}", raw, e);
                None
            }
        }
    }

    /// Start of the next search window: one day before the cursor, or one
    /// day before `now` on the first run
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.read().unwrap_or(now) - Duration::days(1)
    }

    pub fn save(&self, now: DateTime<Utc>) -> Result<()> {
        std::fs::write(&self.path, now.format(QUERY_TIME_FORMAT).to_string())
            .with_context(|| format!("Failed to write news cursor {}", self.path.display()))
    }
}

/// CSV file of every article seen across runs
#[derive(Debug, Clone)]
pub struct ArticleCache {
    path: PathBuf,
}

impl ArticleCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<NewsArticle>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        reader
            .deserialize::<NewsArticle>()
            .map(|row| row.context("Malformed row in article cache"))
            .collect()
    }

    /// Append the articles not seen before and rewrite the file
    ///
    /// Returns how many were new.
    pub fn merge(&self, articles: &[NewsArticle]) -> Result<usize> {
        let mut cached = self.load()?;
        let mut seen: HashSet<String> = cached.iter().map(NewsArticle::dedup_key).collect();

        let before = cached.len();
        for article in articles {
            if seen.insert(article.dedup_key()) {
                cached.push(article.clone());
            }
        }
        let added = cached.len() - before;

        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        for article in &cached {
            writer.serialize(article)?;
        }
        writer.flush()?;

        Ok(added)
    }
}

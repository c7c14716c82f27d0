//! Layered configuration: defaults, optional TOML file, then environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "btcbot.toml";
const ENV_PREFIX: &str = "BTCBOT";

/// Conventional secret variables and the keys they override
const SECRET_OVERRIDES: &[(&str, &str)] = &[
    ("UPBIT_ACCESS_KEY", "exchange.access_key"),
    ("UPBIT_SECRET_KEY", "exchange.secret_key"),
    ("OPENAI_API_KEY", "llm.api_key"),
    ("NEWS_API_KEY", "news.newsapi_key"),
    ("SERP_API_KEY", "news.serpapi_key"),
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub exchange: ExchangeConfig,
    pub llm: LlmConfig,
    pub news: NewsConfig,
    pub trading: TradingConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub access_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub market: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub reflection_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewsConfig {
    pub newsapi_key: String,
    pub serpapi_key: String,
    pub query: String,
    pub language: String,
    pub sort_by: String,
    pub cursor_path: String,
    pub articles_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    pub fee_margin: f64,
    pub min_order_krw: f64,
    pub settle_delay_secs: u64,
    pub daily_candles: u32,
    pub hourly_candles: u32,
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Settings {
    /// Load settings from `path` (or `btcbot.toml` if present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = defaults(config::Config::builder())?;

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        for (var, key) in SECRET_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Settings built from defaults only
    pub fn defaults() -> Result<Self, config::ConfigError> {
        defaults(config::Config::builder())?.build()?.try_deserialize()
    }
}

fn defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    builder
        .set_default("exchange.access_key", "")?
        .set_default("exchange.secret_key", "")?
        .set_default("exchange.base_url", crate::api::upbit::UPBIT_API_BASE)?
        .set_default("exchange.market", "KRW-BTC")?
        .set_default("llm.api_key", "")?
        .set_default("llm.base_url", crate::api::openai::OPENAI_API_BASE)?
        .set_default("llm.model", "gpt-4o")?
        .set_default("llm.reflection_enabled", true)?
        .set_default("news.newsapi_key", "")?
        .set_default("news.serpapi_key", "")?
        .set_default("news.query", "bitcoin")?
        .set_default("news.language", "en")?
        .set_default("news.sort_by", "popularity")?
        .set_default("news.cursor_path", "timestamp.txt")?
        .set_default("news.articles_path", "articles.csv")?
        .set_default("trading.fee_margin", 0.0005)?
        .set_default("trading.min_order_krw", 5000.0)?
        .set_default("trading.settle_delay_secs", 2)?
        .set_default("trading.daily_candles", 30)?
        .set_default("trading.hourly_candles", 24)?
        .set_default("trading.lookback_days", 7)?
        .set_default("database.url", "sqlite://bitcoin_trades.db?mode=rwc")
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle granularity supported by the exchange client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    Day,
    Hour,
}

impl CandleInterval {
    /// Label format used when candles are handed to the model
    pub fn label_format(&self) -> &'static str {
        match self {
            CandleInterval::Day => "%Y%m%d",
            CandleInterval::Hour => "%Y%m%d%H",
        }
    }
}

/// Account balance for one currency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub currency: String,
    pub balance: f64,
    pub locked: f64,
    pub avg_buy_price: f64,
    pub unit_currency: String,
}

impl Balance {
    /// Entry for `currency` in an account listing
    pub fn find<'a>(balances: &'a [Balance], currency: &str) -> Option<&'a Balance> {
        balances.iter().find(|b| b.currency == currency)
    }
}

/// One price level of the order book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderbookUnit {
    pub ask_price: f64,
    pub bid_price: f64,
    pub ask_size: f64,
    pub bid_size: f64,
}

/// Order book snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Orderbook {
    pub market: String,
    pub timestamp: i64,
    pub total_ask_size: f64,
    pub total_bid_size: f64,
    pub units: Vec<OrderbookUnit>,
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReceipt {
    pub uuid: String,
    pub side: String,
    pub ord_type: String,
    pub state: String,
    pub market: String,
}

/// Trading action recommended by the model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trade action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for TradeAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            "hold" => Ok(TradeAction::Hold),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}

/// A parsed trading decision
///
/// Confidence is 0 for hold and at most 100 otherwise. A buy or sell at 0
/// sizes to an empty order, which the executor never submits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: TradeAction,
    pub confidence: u8,
    pub rationale: String,
}

impl Decision {
    pub fn new(action: TradeAction, confidence: f64, rationale: impl Into<String>) -> Self {
        let confidence = match action {
            TradeAction::Hold => 0,
            TradeAction::Buy | TradeAction::Sell => {
                if confidence.is_nan() {
                    0
                } else {
                    confidence.round().clamp(0.0, 100.0) as u8
                }
            }
        };

        Self {
            action,
            confidence,
            rationale: rationale.into(),
        }
    }

    pub fn hold(rationale: impl Into<String>) -> Self {
        Self::new(TradeAction::Hold, 0.0, rationale)
    }
}

/// Row of the trade ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub decision: TradeAction,
    pub percentage: u8,
    pub reason: String,
    pub btc_balance: f64,
    pub krw_balance: f64,
    pub btc_avg_buy_price: f64,
    pub btc_krw_price: f64,
    pub reflection: Option<String>,
}

impl TradeRecord {
    /// Account value with BTC marked at `spot_price`
    pub fn total_value(&self, spot_price: f64) -> f64 {
        self.krw_balance + self.btc_balance * spot_price
    }
}

/// Data for appending a trade to the ledger
#[derive(Debug, Clone)]
pub struct NewTrade<'a> {
    pub decision: TradeAction,
    pub percentage: u8,
    pub reason: &'a str,
    pub btc_balance: f64,
    pub krw_balance: f64,
    pub btc_avg_buy_price: f64,
    pub btc_krw_price: f64,
    pub reflection: Option<&'a str>,
}

/// News article normalised across providers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsArticle {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<String>,
}

impl NewsArticle {
    /// Key used to deduplicate articles across runs
    pub fn dedup_key(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!(
                "{}|{}",
                self.title,
                self.source.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Crypto Fear & Greed index reading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FearGreedIndex {
    pub value: u8,
    pub classification: String,
    /// Formatted as `%Y%m%d%H`
    pub timestamp: String,
}

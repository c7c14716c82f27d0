//! Prompt assembly for the decision and reflection requests.

use crate::indicators::EnrichedCandle;
use crate::models::{Balance, FearGreedIndex, Orderbook, TradeRecord};
use serde::Serialize;

const RESPONSE_FORMAT: &str = r#"Reply with one JSON object and nothing else:
{"decision": "buy" | "sell" | "hold", "percentage": <integer>, "reason": "<short explanation>"}

For buy, percentage is the share of available KRW to spend (1-100).
For sell, percentage is the share of held BTC to sell (1-100).
For hold, percentage is 0."#;

/// Everything the model sees when asked for a decision
#[derive(Debug, Serialize)]
pub struct MarketContext<'a> {
    pub balances: &'a [Balance],
    pub orderbook: &'a Orderbook,
    pub daily: &'a [EnrichedCandle],
    pub hourly: &'a [EnrichedCandle],
    pub news_headlines: &'a str,
    pub fear_greed: Option<&'a FearGreedIndex>,
}

pub fn system_prompt(reflection: Option<&str>) -> String {
    let reflection = reflection
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("No reflection available yet.");

    format!(
        "You manage a spot KRW-BTC position. Weigh the technical indicators, \
order book, recent headlines, the Fear and Greed index and the notes on past \
trades, then decide whether to buy, sell or hold.\n\n\
Enter positions only with clear conviction and stay out of range-bound markets. \
Treat volume and candle structure as the primary signals and cut losing \
positions quickly.\n\n\
Notes on recent trades:\n{}\n\n{}",
        reflection, RESPONSE_FORMAT
    )
}

pub fn user_prompt(context: &MarketContext<'_>) -> serde_json::Result<String> {
    Ok(format!(
        "Balances:\n{}\n\nOrder book:\n{}\n\nDaily candles with indicators:\n{}\n\n\
Hourly candles with indicators:\n{}\n\nRecent headlines:\n{}\n\nFear and Greed index:\n{}",
        serde_json::to_string(context.balances)?,
        serde_json::to_string(context.orderbook)?,
        serde_json::to_string(context.daily)?,
        serde_json::to_string(context.hourly)?,
        if context.news_headlines.is_empty() {
            "(none)"
        } else {
            context.news_headlines
        },
        serde_json::to_string(&context.fear_greed)?,
    ))
}

pub const REFLECTION_SYSTEM_PROMPT: &str =
    "You review an automated Bitcoin trading bot's recent decisions.";

pub fn reflection_prompt(
    trades: &[TradeRecord],
    context: &MarketContext<'_>,
    performance: f64,
) -> serde_json::Result<String> {
    Ok(format!(
        "Recent trades (newest first):\n{}\n\n\
Current market data:\n{}\n\n\
Return over the period: {:.2}%\n\n\
Briefly cover which decisions worked and which did not, any pattern in the \
market data, and what to change next time. Stay under 250 words.",
        serde_json::to_string(trades)?,
        serde_json::to_string(context)?,
        performance
    ))
}

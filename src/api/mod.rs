pub mod fear_greed;
pub mod openai;
pub mod upbit;

#[cfg(test)]
pub(crate) mod mock;

pub use fear_greed::FearGreedClient;
pub use openai::OpenAiClient;
pub use upbit::UpbitClient;

use crate::models::{Balance, Candle, CandleInterval, OrderReceipt, Orderbook};
use async_trait::async_trait;

/// Spot exchange operations the trading cycle depends on
///
/// Order amounts are passed as already-rounded decimal strings.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn balances(&self) -> anyhow::Result<Vec<Balance>>;

    async fn orderbook(&self, market: &str) -> anyhow::Result<Orderbook>;

    /// Candles ordered oldest first
    async fn candles(
        &self,
        market: &str,
        interval: CandleInterval,
        count: u32,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn current_price(&self, market: &str) -> anyhow::Result<f64>;

    /// Market buy spending `krw_amount` of the quote currency
    async fn buy_market(&self, market: &str, krw_amount: &str) -> anyhow::Result<OrderReceipt>;

    /// Market sell of `volume` units of the base currency
    async fn sell_market(&self, market: &str, volume: &str) -> anyhow::Result<OrderReceipt>;
}

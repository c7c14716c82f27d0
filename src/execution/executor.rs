use std::sync::Arc;

use rust_decimal::prelude::*;

use crate::api::Exchange;
use crate::models::{Balance, Decision, OrderReceipt, TradeAction};

/// KRW amounts are whole won
const KRW_DECIMALS: u32 = 0;
/// BTC volumes go to satoshi precision
const VOLUME_DECIMALS: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Hold decision, nothing to do
    Held,
    Submitted(OrderReceipt),
    /// Order value at or under the exchange minimum, not sent
    BelowMinimum { notional: f64 },
}

impl ExecutionOutcome {
    /// Whether the decision was carried out (an order went in, or nothing was asked)
    pub fn executed(&self) -> bool {
        matches!(self, ExecutionOutcome::Held | ExecutionOutcome::Submitted(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to retrieve balances: {0:#}")]
    Balances(anyhow::Error),
    #[error("failed to retrieve current price: {0:#}")]
    Price(anyhow::Error),
    #[error("order submission failed: {0:#}")]
    Order(anyhow::Error),
    #[error("order size {0} cannot be represented")]
    InvalidAmount(f64),
}

/// Turns a decision into a market order sized by its confidence
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    market: String,
    base_currency: String,
    quote_currency: String,
    fee_margin: f64,
    min_order_krw: f64,
}

impl OrderExecutor {
    /// `market` is quote-base, e.g. `KRW-BTC`
    pub fn new(exchange: Arc<dyn Exchange>, market: &str, fee_margin: f64, min_order_krw: f64) -> Self {
        let (quote, base) = market.split_once('-').unwrap_or(("KRW", "BTC"));
        Self {
            exchange,
            market: market.to_string(),
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            fee_margin,
            min_order_krw,
        }
    }

    pub async fn execute(&self, decision: &Decision) -> Result<ExecutionOutcome, ExecutionError> {
        let share = Decimal::from(decision.confidence) / Decimal::ONE_HUNDRED;

        match decision.action {
            TradeAction::Hold => {
                tracing::info!("Decision is hold, no order placed");
                Ok(ExecutionOutcome::Held)
            }
            TradeAction::Buy => {
                let krw = to_decimal(self.available(&self.quote_currency).await?)?;
                let fee = to_decimal(self.fee_margin)?;
                let amount = round_down(krw * share * (Decimal::ONE - fee), KRW_DECIMALS);
                let notional = amount.to_f64().unwrap_or_default();

                if notional <= self.min_order_krw {
                    tracing::warn!(
                        "⚠️  Buy skipped: {:.0} {} is not above the {:.0} minimum",
                        notional,
                        self.quote_currency,
                        self.min_order_krw
                    );
                    return Ok(ExecutionOutcome::BelowMinimum { notional });
                }

                tracing::info!(
                    "🟢 Buying {} with {} {} ({}% of balance)",
                    self.market,
                    amount,
                    self.quote_currency,
                    decision.confidence
                );
                let receipt = self
                    .exchange
                    .buy_market(&self.market, &amount.to_string())
                    .await
                    .map_err(ExecutionError::Order)?;
                tracing::info!("Buy order accepted: {}", receipt.uuid);

                Ok(ExecutionOutcome::Submitted(receipt))
            }
            TradeAction::Sell => {
                let held = to_decimal(self.available(&self.base_currency).await?)?;
                let volume = round_down(held * share, VOLUME_DECIMALS);
                let price = self
                    .exchange
                    .current_price(&self.market)
                    .await
                    .map_err(ExecutionError::Price)?;
                let notional = (volume * to_decimal(price)?).to_f64().unwrap_or_default();

                if notional <= self.min_order_krw {
                    tracing::warn!(
                        "⚠️  Sell skipped: {:.0} {} worth of {} is not above the {:.0} minimum",
                        notional,
                        self.quote_currency,
                        self.base_currency,
                        self.min_order_krw
                    );
                    return Ok(ExecutionOutcome::BelowMinimum { notional });
                }

                tracing::info!(
                    "🔴 Selling {} {} ({}% of holdings)",
                    volume,
                    self.base_currency,
                    decision.confidence
                );
                let receipt = self
                    .exchange
                    .sell_market(&self.market, &volume.to_string())
                    .await
                    .map_err(ExecutionError::Order)?;
                tracing::info!("Sell order accepted: {}", receipt.uuid);

                Ok(ExecutionOutcome::Submitted(receipt))
            }
        }
    }

    /// Free balance of `currency`; a currency missing from the account is 0
    async fn available(&self, currency: &str) -> Result<f64, ExecutionError> {
        let balances = self
            .exchange
            .balances()
            .await
            .map_err(ExecutionError::Balances)?;

        Ok(Balance::find(&balances, currency).map_or(0.0, |b| b.balance))
    }
}

fn to_decimal(value: f64) -> Result<Decimal, ExecutionError> {
    Decimal::from_f64(value).ok_or(ExecutionError::InvalidAmount(value))
}

fn round_down(value: Decimal, decimals: u32) -> Decimal {
    value
        .round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
        .normalize()
}

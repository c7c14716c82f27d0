//! In-memory exchange for unit tests

use super::Exchange;
use crate::models::{Balance, Candle, CandleInterval, OrderReceipt, Orderbook};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SubmittedOrder {
    Buy { market: String, krw_amount: String },
    Sell { market: String, volume: String },
}

#[derive(Default)]
pub(crate) struct MockExchange {
    pub balances: Mutex<Vec<Balance>>,
    pub price: f64,
    pub fail_balances: bool,
    pub fail_orders: bool,
    pub orders: Mutex<Vec<SubmittedOrder>>,
}

pub(crate) fn balance(currency: &str, amount: f64, avg_buy_price: f64) -> Balance {
    Balance {
        currency: currency.to_string(),
        balance: amount,
        locked: 0.0,
        avg_buy_price,
        unit_currency: "KRW".to_string(),
    }
}

impl MockExchange {
    pub fn new(krw: f64, btc: f64, price: f64) -> Self {
        Self {
            balances: Mutex::new(vec![
                balance("KRW", krw, 0.0),
                balance("BTC", btc, price),
                balance("ETH", 1.0, 3_000_000.0),
            ]),
            price,
            ..Default::default()
        }
    }

    pub fn submitted(&self) -> Vec<SubmittedOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn balances(&self) -> Result<Vec<Balance>> {
        if self.fail_balances {
            anyhow::bail!("accounts unavailable");
        }
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn orderbook(&self, market: &str) -> Result<Orderbook> {
        Ok(Orderbook {
            market: market.to_string(),
            timestamp: 1_729_468_800_000,
            total_ask_size: 3.2,
            total_bid_size: 4.1,
            units: Vec::new(),
        })
    }

    async fn candles(&self, market: &str, interval: CandleInterval, count: u32) -> Result<Vec<Candle>> {
        let step = match interval {
            CandleInterval::Day => Duration::days(1),
            CandleInterval::Hour => Duration::hours(1),
        };
        let start = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();

        Ok((0..count)
            .map(|i| {
                let close = self.price * (1.0 + (i as f64 * 0.3).sin() * 0.02);
                Candle {
                    market: market.to_string(),
                    timestamp: start + step * i as i32,
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 100.0 + i as f64,
                }
            })
            .collect())
    }

    async fn current_price(&self, _market: &str) -> Result<f64> {
        Ok(self.price)
    }

    async fn buy_market(&self, market: &str, krw_amount: &str) -> Result<OrderReceipt> {
        if self.fail_orders {
            anyhow::bail!("insufficient funds");
        }
        self.orders.lock().unwrap().push(SubmittedOrder::Buy {
            market: market.to_string(),
            krw_amount: krw_amount.to_string(),
        });
        Ok(receipt(market, "bid", "price"))
    }

    async fn sell_market(&self, market: &str, volume: &str) -> Result<OrderReceipt> {
        if self.fail_orders {
            anyhow::bail!("insufficient funds");
        }
        self.orders.lock().unwrap().push(SubmittedOrder::Sell {
            market: market.to_string(),
            volume: volume.to_string(),
        });
        Ok(receipt(market, "ask", "market"))
    }
}

fn receipt(market: &str, side: &str, ord_type: &str) -> OrderReceipt {
    OrderReceipt {
        uuid: uuid::Uuid::new_v4().to_string(),
        side: side.to_string(),
        ord_type: ord_type.to_string(),
        state: "wait".to_string(),
        market: market.to_string(),
    }
}

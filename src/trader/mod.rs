//! One trading cycle: gather market state, ask the model, execute the
//! decision and record the result in the ledger.

use crate::api::{Exchange, FearGreedClient, OpenAiClient, UpbitClient};
use crate::config::{Settings, TradingConfig};
use crate::db::TradeLedger;
use crate::decision::{DecisionEngine, MarketContext};
use crate::execution::{ExecutionError, OrderExecutor};
use crate::indicators;
use crate::models::{Balance, CandleInterval, Decision, FearGreedIndex, NewTrade, TradeRecord};
use crate::news::{self, NewsFeed};
use crate::performance::calculate_performance;
use crate::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a call to [`Trader::run_cycle`] ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was already running
    Skipped,
    /// Stopped before a trade row was written
    Aborted { reason: String },
    Completed {
        trade_id: i64,
        decision: Decision,
        executed: bool,
    },
}

/// Holds the running flag for the duration of a cycle
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Trader {
    exchange: Arc<dyn Exchange>,
    executor: OrderExecutor,
    engine: DecisionEngine,
    ledger: TradeLedger,
    news: Option<NewsFeed>,
    fear_greed: Option<FearGreedClient>,
    market: String,
    base_currency: String,
    quote_currency: String,
    trading: TradingConfig,
    reflection_enabled: bool,
    running: AtomicBool,
}

impl Trader {
    /// Trader without news or sentiment sources; add them with
    /// [`Trader::with_news`] and [`Trader::with_fear_greed`]
    pub fn new(
        exchange: Arc<dyn Exchange>,
        engine: DecisionEngine,
        ledger: TradeLedger,
        settings: &Settings,
    ) -> Self {
        let market = settings.exchange.market.clone();
        let (quote, base) = market.split_once('-').unwrap_or(("KRW", "BTC"));
        let executor = OrderExecutor::new(
            exchange.clone(),
            &market,
            settings.trading.fee_margin,
            settings.trading.min_order_krw,
        );

        Self {
            executor,
            engine,
            ledger,
            news: None,
            fear_greed: None,
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            market,
            exchange,
            trading: settings.trading.clone(),
            reflection_enabled: settings.llm.reflection_enabled,
            running: AtomicBool::new(false),
        }
    }

    /// Wire up the live exchange, model, news and sentiment clients
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let exchange = UpbitClient::with_base_url(
            &settings.exchange.base_url,
            settings.exchange.access_key.clone(),
            settings.exchange.secret_key.clone(),
        )?;
        let llm = OpenAiClient::with_base_url(
            &settings.llm.base_url,
            settings.llm.api_key.clone(),
            settings.llm.model.clone(),
        )?;
        let ledger = TradeLedger::connect(&settings.database.url).await?;

        Ok(Self::new(Arc::new(exchange), DecisionEngine::new(llm), ledger, settings)
            .with_news(NewsFeed::from_config(&settings.news)?)
            .with_fear_greed(FearGreedClient::new()?))
    }

    pub fn with_news(mut self, news: NewsFeed) -> Self {
        self.news = Some(news);
        self
    }

    pub fn with_fear_greed(mut self, client: FearGreedClient) -> Self {
        self.fear_greed = Some(client);
        self
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    /// Run one cycle unless one is already in progress
    ///
    /// Failures are logged and reported as [`CycleOutcome::Aborted`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("Trading cycle already in progress, skipping this run");
            return CycleOutcome::Skipped;
        };

        match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => abort(format!("trading cycle failed: {}", e)),
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        tracing::info!("🔄 Starting trading cycle for {}", self.market);

        let balances = match self.exchange.balances().await {
            Ok(balances) => self.account_balances(balances),
            Err(e) => return Ok(abort(format!("failed to retrieve balances: {:#}", e))),
        };

        let orderbook = self.exchange.orderbook(&self.market).await?;
        let daily = self
            .exchange
            .candles(&self.market, CandleInterval::Day, self.trading.daily_candles)
            .await?;
        let hourly = self
            .exchange
            .candles(&self.market, CandleInterval::Hour, self.trading.hourly_candles)
            .await?;
        let daily = indicators::enrich(&daily, CandleInterval::Day);
        let hourly = indicators::enrich(&hourly, CandleInterval::Hour);

        let fear_greed = self.fear_greed_reading().await;
        let headlines = self.news_headlines().await;

        let context = MarketContext {
            balances: &balances,
            orderbook: &orderbook,
            daily: &daily,
            hourly: &hourly,
            news_headlines: &headlines,
            fear_greed: fear_greed.as_ref(),
        };

        let recent = self.ledger.recent_trades(self.trading.lookback_days).await?;
        let spot = self.exchange.current_price(&self.market).await?;
        let performance = calculate_performance(&recent, spot);
        tracing::info!(
            "📈 {} trades in the last {} days, return {:.2}%",
            recent.len(),
            self.trading.lookback_days,
            performance
        );

        let reflection = self.reflection(&recent, &context, performance).await?;

        let decision = match self.engine.decide(&context, reflection.as_deref()).await {
            Ok(Some(decision)) => decision,
            Ok(None) => return Ok(abort("model reply contained no usable decision".to_string())),
            Err(e) => return Ok(abort(format!("decision request failed: {:#}", e))),
        };
        tracing::info!(
            "🤖 AI decision: {} {}% ({})",
            decision.action.as_str().to_uppercase(),
            decision.confidence,
            decision.rationale
        );

        let executed = match self.executor.execute(&decision).await {
            Ok(outcome) => outcome.executed(),
            Err(e @ ExecutionError::Order(_)) => {
                tracing::error!("❌ {}", e);
                false
            }
            Err(e) => return Ok(abort(e.to_string())),
        };

        tokio::time::sleep(Duration::from_secs(self.trading.settle_delay_secs)).await;

        let balances = match self.exchange.balances().await {
            Ok(balances) => balances,
            Err(e) => return Ok(abort(format!("failed to retrieve balances: {:#}", e))),
        };
        let base = Balance::find(&balances, &self.base_currency);
        let price = self.exchange.current_price(&self.market).await?;

        let trade_id = self
            .ledger
            .log_trade(&NewTrade {
                decision: decision.action,
                percentage: if executed { decision.confidence } else { 0 },
                reason: &decision.rationale,
                btc_balance: base.map_or(0.0, |b| b.balance),
                krw_balance: Balance::find(&balances, &self.quote_currency).map_or(0.0, |b| b.balance),
                btc_avg_buy_price: base.map_or(0.0, |b| b.avg_buy_price),
                btc_krw_price: price,
                reflection: reflection.as_deref(),
            })
            .await?;

        tracing::info!("✅ Cycle complete, trade #{} recorded", trade_id);

        Ok(CycleOutcome::Completed {
            trade_id,
            decision,
            executed,
        })
    }

    /// Only the traded pair's currencies are shown to the model
    fn account_balances(&self, balances: Vec<Balance>) -> Vec<Balance> {
        balances
            .into_iter()
            .filter(|b| b.currency == self.base_currency || b.currency == self.quote_currency)
            .collect()
    }

    async fn fear_greed_reading(&self) -> Option<FearGreedIndex> {
        let client = self.fear_greed.as_ref()?;
        match client.latest().await {
            Ok(index) => {
                tracing::info!("😨 Fear & Greed: {} ({})", index.value, index.classification);
                Some(index)
            }
            Err(e) => {
                tracing::warn!("⚠️  Fear & Greed unavailable: {:#}", e);
                None
            }
        }
    }

    async fn news_headlines(&self) -> String {
        let Some(feed) = &self.news else {
            return String::new();
        };
        match feed.refresh(Utc::now()).await {
            Ok(articles) => news::headline_summary(&articles),
            Err(e) => {
                tracing::warn!("⚠️  No news this cycle: {:#}", e);
                String::new()
            }
        }
    }

    /// Fresh critique from the model when enabled, otherwise (or when the
    /// model fails) the last one stored in the ledger
    async fn reflection(
        &self,
        recent: &[TradeRecord],
        context: &MarketContext<'_>,
        performance: f64,
    ) -> Result<Option<String>> {
        if self.reflection_enabled && !recent.is_empty() {
            match self.engine.reflect(recent, context, performance).await {
                Ok(reflection) if !reflection.is_empty() => return Ok(Some(reflection)),
                Ok(_) => tracing::warn!("⚠️  Model returned an empty reflection"),
                Err(e) => tracing::warn!("⚠️  Reflection request failed: {:#}", e),
            }
        }

        self.ledger.latest_reflection().await
    }
}

fn abort(reason: String) -> CycleOutcome {
    tracing::error!("❌ Trading cycle aborted: {}", reason);
    CycleOutcome::Aborted { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockExchange, SubmittedOrder};
    use crate::models::TradeAction;
    use mockito::Matcher;

    const PRICE: f64 = 60_000_000.0;

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    async fn trader(exchange: Arc<MockExchange>, llm_url: &str, reflection_enabled: bool) -> Trader {
        let mut settings = Settings::defaults().unwrap();
        settings.trading.settle_delay_secs = 0;
        settings.llm.reflection_enabled = reflection_enabled;

        let llm = OpenAiClient::with_base_url(llm_url, "test-key".into(), "gpt-4o".into()).unwrap();
        let ledger = TradeLedger::in_memory().await.unwrap();

        Trader::new(exchange, DecisionEngine::new(llm), ledger, &settings)
    }

    fn seed_trade(reflection: Option<&str>) -> NewTrade<'_> {
        NewTrade {
            decision: TradeAction::Hold,
            percentage: 0,
            reason: "waiting",
            btc_balance: 0.01,
            krw_balance: 1_000_000.0,
            btc_avg_buy_price: PRICE,
            btc_krw_price: PRICE,
            reflection,
        }
    }

    #[test]
    fn test_run_guard_is_exclusive() {
        let flag = AtomicBool::new(false);

        let guard = RunGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(RunGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_buy_cycle_records_trade() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "buy", "percentage": 50, "reason": "Oversold bounce"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(1_000_000.0, 0.01, PRICE));
        let trader = trader(exchange.clone(), &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        let CycleOutcome::Completed {
            trade_id,
            decision,
            executed,
        } = outcome
        else {
            panic!("expected a completed cycle, got {:?}", outcome);
        };
        assert!(executed);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(exchange.submitted().len(), 1);

        let trades = trader.ledger().all_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, trade_id);
        assert_eq!(trades[0].decision, TradeAction::Buy);
        assert_eq!(trades[0].percentage, 50);
        assert_eq!(trades[0].reason, "Oversold bounce");
        assert_eq!(trades[0].krw_balance, 1_000_000.0);
        assert_eq!(trades[0].btc_balance, 0.01);
        assert_eq!(trades[0].btc_krw_price, PRICE);
        assert_eq!(trades[0].reflection, None);
    }

    #[tokio::test]
    async fn test_skipped_order_is_recorded_at_zero() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "buy", "percentage": 50, "reason": "Small dip"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(9_000.0, 0.0, PRICE));
        let trader = trader(exchange.clone(), &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Completed { executed: false, .. }));
        assert!(exchange.submitted().is_empty());
        let trades = trader.ledger().all_trades().await.unwrap();
        assert_eq!(trades[0].decision, TradeAction::Buy);
        assert_eq!(trades[0].percentage, 0);
    }

    #[tokio::test]
    async fn test_order_failure_still_records_trade() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "sell", "percentage": 40, "reason": "Overbought"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange {
            fail_orders: true,
            ..MockExchange::new(0.0, 0.5, PRICE)
        });
        let trader = trader(exchange, &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Completed { executed: false, .. }));
        let trades = trader.ledger().all_trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].decision, TradeAction::Sell);
        assert_eq!(trades[0].percentage, 0);
    }

    #[tokio::test]
    async fn test_balance_failure_aborts_without_model_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange {
            fail_balances: true,
            ..MockExchange::new(1_000_000.0, 0.0, PRICE)
        });
        let trader = trader(exchange, &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Aborted { .. }));
        mock.assert_async().await;
        assert!(trader.ledger().all_trades().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_reply_aborts() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("The market is uncertain."))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(1_000_000.0, 0.0, PRICE));
        let trader = trader(exchange.clone(), &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Aborted { .. }));
        assert!(exchange.submitted().is_empty());
        assert!(trader.ledger().all_trades().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_percentage_buy_places_no_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "buy", "percentage": 0, "reason": "Not sure"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(10_000_000.0, 0.0, PRICE));
        let trader = trader(exchange.clone(), &server.url(), false).await;

        let outcome = trader.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Aborted { .. }));
        assert!(exchange.submitted().is_empty());
        assert!(trader.ledger().all_trades().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_reflection_feeds_decision_and_is_stored() {
        let mut server = mockito::Server::new_async().await;
        let reflect = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Recent trades \\(newest first\\)".to_string()))
            .with_status(200)
            .with_body(completion("Stop chasing pumps."))
            .create_async()
            .await;
        let decide = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Stop chasing pumps".to_string()))
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "hold", "percentage": 0, "reason": "Waiting for volume"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(1_000_000.0, 0.01, PRICE));
        let trader = trader(exchange, &server.url(), true).await;
        trader.ledger().log_trade(&seed_trade(None)).await.unwrap();

        let outcome = trader.run_cycle().await;

        reflect.assert_async().await;
        decide.assert_async().await;
        assert!(matches!(outcome, CycleOutcome::Completed { executed: true, .. }));
        assert_eq!(
            trader.ledger().latest_reflection().await.unwrap().as_deref(),
            Some("Stop chasing pumps.")
        );
    }

    #[tokio::test]
    async fn test_stored_reflection_used_when_disabled() {
        let mut server = mockito::Server::new_async().await;
        let decide = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Bought the top twice".to_string()))
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "hold", "percentage": 0, "reason": "Range bound"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(1_000_000.0, 0.01, PRICE));
        let trader = trader(exchange, &server.url(), false).await;
        trader
            .ledger()
            .log_trade(&seed_trade(Some("Bought the top twice")))
            .await
            .unwrap();

        let outcome = trader.run_cycle().await;

        decide.assert_async().await;
        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        let trades = trader.ledger().all_trades().await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].reflection.as_deref(), Some("Bought the top twice"));
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(
                r#"{"decision": "hold", "percentage": 0, "reason": "Quiet"}"#,
            ))
            .create_async()
            .await;

        let exchange = Arc::new(MockExchange::new(1_000_000.0, 0.0, PRICE));
        let trader = trader(exchange, &server.url(), false).await;

        let (first, second) = tokio::join!(trader.run_cycle(), trader.run_cycle());

        assert!(matches!(first, CycleOutcome::Completed { .. }));
        assert_eq!(second, CycleOutcome::Skipped);

        // The flag is released once the cycle ends
        assert!(matches!(trader.run_cycle().await, CycleOutcome::Completed { .. }));
    }
}

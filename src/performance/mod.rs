use crate::models::{TradeAction, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage change in account value between the oldest and newest trades
///
/// Both ends are valued with BTC marked at `spot_price`. The slice may be in
/// any order; rows are ranked by timestamp, then id. Returns 0 for an empty
/// slice or a zero starting value.
pub fn calculate_performance(trades: &[TradeRecord], spot_price: f64) -> f64 {
    let (Some(oldest), Some(newest)) = (
        trades.iter().min_by_key(|t| (t.timestamp, t.id)),
        trades.iter().max_by_key(|t| (t.timestamp, t.id)),
    ) else {
        return 0.0;
    };

    let initial = oldest.total_value(spot_price);
    if initial == 0.0 {
        return 0.0;
    }

    let final_value = newest.total_value(spot_price);
    (final_value - initial) / initial * 100.0
}

/// Ledger summary printed by the `report` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReport {
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub holds: usize,
    /// Buy/sell decisions whose order was not placed (recorded at 0%)
    pub skipped_orders: usize,
    pub first_trade: Option<DateTime<Utc>>,
    pub last_trade: Option<DateTime<Utc>>,
    pub spot_price: f64,
    pub initial_value: f64,
    pub final_value: f64,
    pub return_pct: f64,
}

impl LedgerReport {
    pub fn from_trades(trades: &[TradeRecord], spot_price: f64) -> Self {
        let count = |action: TradeAction| trades.iter().filter(|t| t.decision == action).count();

        let oldest = trades.iter().min_by_key(|t| (t.timestamp, t.id));
        let newest = trades.iter().max_by_key(|t| (t.timestamp, t.id));

        Self {
            total_trades: trades.len(),
            buys: count(TradeAction::Buy),
            sells: count(TradeAction::Sell),
            holds: count(TradeAction::Hold),
            skipped_orders: trades
                .iter()
                .filter(|t| t.decision != TradeAction::Hold && t.percentage == 0)
                .count(),
            first_trade: oldest.map(|t| t.timestamp),
            last_trade: newest.map(|t| t.timestamp),
            spot_price,
            initial_value: oldest.map_or(0.0, |t| t.total_value(spot_price)),
            final_value: newest.map_or(0.0, |t| t.total_value(spot_price)),
            return_pct: calculate_performance(trades, spot_price),
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("📒 TRADE LEDGER REPORT");
        println!("{}", "=".repeat(60));

        match (self.first_trade, self.last_trade) {
            (Some(first), Some(last)) => println!(
                "Period:          {} → {}",
                first.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            ),
            _ => println!("Period:          (no trades)"),
        }

        println!(
            "Decisions:       {} total ({} buy, {} sell, {} hold)",
            self.total_trades, self.buys, self.sells, self.holds
        );
        println!("Skipped orders:  {}", self.skipped_orders);
        println!("Spot price:      {:.0} KRW", self.spot_price);
        println!("Initial value:   {:.0} KRW", self.initial_value);
        println!("Final value:     {:.0} KRW", self.final_value);
        println!("Return:          {:+.2}%", self.return_pct);
        println!("{}", "=".repeat(60));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SPOT: f64 = 60_000_000.0;

    fn record(id: i64, minutes_ago: i64, krw: f64, btc: f64) -> TradeRecord {
        TradeRecord {
            id,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            decision: TradeAction::Hold,
            percentage: 0,
            reason: String::new(),
            btc_balance: btc,
            krw_balance: krw,
            btc_avg_buy_price: 0.0,
            btc_krw_price: SPOT,
            reflection: None,
        }
    }

    #[test]
    fn test_empty_ledger_is_zero() {
        assert_eq!(calculate_performance(&[], SPOT), 0.0);
    }

    #[test]
    fn test_growth_between_oldest_and_newest() {
        // Newest first, as returned by the ledger
        let trades = vec![record(2, 0, 450_000.0, 0.12), record(1, 60, 500_000.0, 0.1)];

        // 6,500,000 -> 7,650,000
        let performance = calculate_performance(&trades, SPOT);
        assert!((performance - 17.6923).abs() < 1e-3);
        assert!((performance - 17.6).abs() / 17.6 < 1e-2);
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let newest_first = vec![record(2, 0, 450_000.0, 0.12), record(1, 60, 500_000.0, 0.1)];
        let oldest_first = vec![record(1, 60, 500_000.0, 0.1), record(2, 0, 450_000.0, 0.12)];

        assert_eq!(
            calculate_performance(&newest_first, SPOT),
            calculate_performance(&oldest_first, SPOT)
        );
    }

    #[test]
    fn test_identical_rows_are_zero() {
        let trades = vec![record(2, 0, 500_000.0, 0.1), record(1, 60, 500_000.0, 0.1)];
        assert_eq!(calculate_performance(&trades, SPOT), 0.0);
    }

    #[test]
    fn test_krw_only_loss() {
        let trades = vec![record(2, 0, 800_000.0, 0.0), record(1, 60, 1_000_000.0, 0.0)];
        assert!((calculate_performance(&trades, SPOT) + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_starting_value() {
        let trades = vec![record(2, 0, 100_000.0, 0.0), record(1, 60, 0.0, 0.0)];
        assert_eq!(calculate_performance(&trades, SPOT), 0.0);
    }

    #[test]
    fn test_same_timestamp_ranks_by_id() {
        let ts = Utc::now();
        let mut first = record(1, 0, 1_000_000.0, 0.0);
        let mut second = record(2, 0, 1_100_000.0, 0.0);
        first.timestamp = ts;
        second.timestamp = ts;

        let performance = calculate_performance(&[second, first], SPOT);
        assert!((performance - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_counts() {
        let mut buy = record(1, 120, 1_000_000.0, 0.0);
        buy.decision = TradeAction::Buy;
        buy.percentage = 50;
        let mut skipped_sell = record(2, 60, 500_000.0, 0.01);
        skipped_sell.decision = TradeAction::Sell;
        let hold = record(3, 0, 500_000.0, 0.01);

        let report = LedgerReport::from_trades(&[hold, skipped_sell, buy], SPOT);

        assert_eq!(report.total_trades, 3);
        assert_eq!((report.buys, report.sells, report.holds), (1, 1, 1));
        assert_eq!(report.skipped_orders, 1);
        assert_eq!(report.initial_value, 1_000_000.0);
        assert_eq!(report.final_value, 1_100_000.0);
        assert!((report.return_pct - 10.0).abs() < 1e-9);
    }
}

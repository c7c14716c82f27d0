use super::period_type;
use yata::core::Method;
use yata::methods::RMA;

/// Relative Strength Index (RSI) series
///
/// Gains and losses are smoothed with Wilder's running average (yata `RMA`).
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// The first `period` entries are `None`.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    let Some(length) = period_type(period) else {
        return out;
    };
    if prices.len() < period + 1 {
        return out;
    }

    let (Ok(mut avg_gain), Ok(mut avg_loss)) = (RMA::new(length, &0.0), RMA::new(length, &0.0))
    else {
        return out;
    };

    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        let gain = avg_gain.next(&change.max(0.0));
        let loss = avg_loss.next(&(-change).max(0.0));

        if i < period {
            continue;
        }

        out[i] = Some(if loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + gain / loss))
        });
    }

    out
}

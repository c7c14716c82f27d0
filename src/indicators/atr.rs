//! Average True Range (ATR) indicator
//!
//! Measures market volatility by averaging true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing for the moving average.

use crate::models::Candle;

/// ATR series aligned with `candles`
///
/// The first ATR is the plain mean of the first `period` true ranges and
/// lands on index `period`; earlier entries are `None`.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let (prev_close, high, low) = (w[0].close, w[1].high, w[1].low);
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();

    let mut atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    out[period] = Some(atr);

    // true_ranges[i] belongs to candle i + 1
    for (i, tr) in true_ranges.iter().enumerate().skip(period) {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        out[i + 1] = Some(atr);
    }

    out
}

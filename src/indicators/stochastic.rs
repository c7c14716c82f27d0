use super::period_type;
use crate::indicators::moving_average::sma_series;
use crate::models::Candle;
use yata::core::Method;
use yata::methods::{Highest, Lowest};

/// Stochastic oscillator %K and its %D smoothing
#[derive(Debug, Clone, Default)]
pub struct StochasticSeries {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

/// %K = 100 * (close - lowest low) / (highest high - lowest low) over `period`
///
/// A window with no range reports 50.
pub fn stochastic_series(candles: &[Candle], period: usize, smooth: usize) -> StochasticSeries {
    let mut k = vec![None; candles.len()];

    if let (Some(length), Some(first)) = (period_type(period), candles.first()) {
        if let (Ok(mut highest), Ok(mut lowest)) =
            (Highest::new(length, &first.high), Lowest::new(length, &first.low))
        {
            for (i, candle) in candles.iter().enumerate() {
                let high = highest.next(&candle.high);
                let low = lowest.next(&candle.low);
                if i + 1 < period {
                    continue;
                }

                let range = high - low;
                k[i] = Some(if range > 0.0 {
                    100.0 * (candle.close - low) / range
                } else {
                    50.0
                });
            }
        }
    }

    let mut d = vec![None; candles.len()];
    if let Some(start) = k.iter().position(Option::is_some) {
        let defined: Vec<f64> = k[start..].iter().flatten().copied().collect();
        d[start..].copy_from_slice(&sma_series(&defined, smooth));
    }

    StochasticSeries { k, d }
}

use crate::models::Candle;

/// On-Balance Volume: running total of volume signed by close direction
///
/// The first candle contributes its volume as-is.
pub fn obv_series(candles: &[Candle]) -> Vec<f64> {
    let mut total = 0.0;
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let falling = i > 0 && c.close < candles[i - 1].close;
            total += if falling { -c.volume } else { c.volume };
            total
        })
        .collect()
}

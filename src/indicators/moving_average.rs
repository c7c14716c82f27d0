use super::{apply_method, period_type};
use yata::core::{Method, ValueType};
use yata::methods::{EMA, SMA};

/// Simple Moving Average series, aligned with `values`
///
/// The first `period - 1` entries are `None`.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let (Some(length), Some(first)) = (period_type(period), values.first()) else {
        return vec![None; values.len()];
    };
    apply_method(SMA::new(length, first), values, period - 1)
}

/// Exponential Moving Average series, seeded with the first value
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let (Some(length), Some(first)) = (period_type(period), values.first()) else {
        return vec![None; values.len()];
    };
    apply_method(EMA::new(length, first), values, period - 1)
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub diff: Vec<Option<f64>>,
}

pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema_series(values, fast);
    let slow_ema = ema_series(values, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut signal_line = vec![None; values.len()];
    if let (Some(start), Some(length)) = (macd.iter().position(Option::is_some), period_type(signal)) {
        let defined: Vec<ValueType> = macd[start..].iter().flatten().copied().collect();
        if let Ok(ema) = EMA::new(length, &defined[0]) {
            let smoothed = apply_method(Ok(ema), &defined, signal - 1);
            signal_line[start..].copy_from_slice(&smoothed);
        }
    }

    let diff = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        diff,
    }
}

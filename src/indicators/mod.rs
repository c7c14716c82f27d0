// Technical indicators module
// Enriches OHLCV candles with the indicator columns handed to the model

pub mod atr;
pub mod bollinger;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;
pub mod volume;

pub use atr::atr_series;
pub use bollinger::{bollinger_series, BollingerSeries};
pub use moving_average::{ema_series, macd_series, sma_series, MacdSeries};
pub use rsi::rsi_series;
pub use stochastic::{stochastic_series, StochasticSeries};
pub use volume::obv_series;

use crate::models::{Candle, CandleInterval};
use serde::Serialize;
use yata::core::{Method, PeriodType, ValueType};

const BB_PERIOD: usize = 20;
const BB_WIDTH: f64 = 2.0;
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const SMA_PERIOD: usize = 20;
const EMA_PERIOD: usize = 12;
const STOCH_PERIOD: usize = 14;
const STOCH_SMOOTH: usize = 3;
const ATR_PERIOD: usize = 14;

/// One OHLCV row with its derived indicator columns
///
/// Columns still warming up are `None` and serialize as `null`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedCandle {
    pub label: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub bb_bbm: Option<f64>,
    pub bb_bbh: Option<f64>,
    pub bb_bbl: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_diff: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_12: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub atr: Option<f64>,
    pub obv: f64,
}

/// Add indicator columns to candles ordered oldest first
pub fn enrich(candles: &[Candle], interval: CandleInterval) -> Vec<EnrichedCandle> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let bands = bollinger_series(&closes, BB_PERIOD, BB_WIDTH);
    let rsi = rsi_series(&closes, RSI_PERIOD);
    let macd = macd_series(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let sma = sma_series(&closes, SMA_PERIOD);
    let ema = ema_series(&closes, EMA_PERIOD);
    let stoch = stochastic_series(candles, STOCH_PERIOD, STOCH_SMOOTH);
    let atr = atr_series(candles, ATR_PERIOD);
    let obv = obv_series(candles);

    candles
        .iter()
        .enumerate()
        .map(|(i, c)| EnrichedCandle {
            label: c.timestamp.format(interval.label_format()).to_string(),
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            bb_bbm: bands.middle[i],
            bb_bbh: bands.upper[i],
            bb_bbl: bands.lower[i],
            rsi: rsi[i],
            macd: macd.macd[i],
            macd_signal: macd.signal[i],
            macd_diff: macd.diff[i],
            sma_20: sma[i],
            ema_12: ema[i],
            stoch_k: stoch.k[i],
            stoch_d: stoch.d[i],
            atr: atr[i],
            obv: obv[i],
        })
        .collect()
}

/// Window length as yata's period type, rejecting 0 and oversize windows
pub(crate) fn period_type(period: usize) -> Option<PeriodType> {
    PeriodType::try_from(period).ok().filter(|p| *p > 0)
}

/// Run a yata method over `values`, hiding the first `warmup` outputs
pub(crate) fn apply_method<M>(
    method: Result<M, yata::core::Error>,
    values: &[ValueType],
    warmup: usize,
) -> Vec<Option<f64>>
where
    M: Method<Input = ValueType, Output = ValueType>,
{
    let Ok(mut method) = method else {
        return vec![None; values.len()];
    };

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let out = method.next(v);
            (i >= warmup).then_some(out)
        })
        .collect()
}

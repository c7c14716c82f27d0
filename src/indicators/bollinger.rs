use super::{apply_method, period_type};
use crate::indicators::moving_average::sma_series;
use yata::core::Method;
use yata::methods::StDev;

/// Bollinger bands: moving average with a band of `width` standard deviations
#[derive(Debug, Clone, Default)]
pub struct BollingerSeries {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn bollinger_series(prices: &[f64], period: usize, width: f64) -> BollingerSeries {
    let middle = sma_series(prices, period);
    let deviation = match (period_type(period), prices.first()) {
        (Some(length), Some(first)) => apply_method(StDev::new(length, first), prices, period - 1),
        _ => vec![None; prices.len()],
    };

    let band = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&deviation)
            .map(|(m, d)| Some((*m)? + sign * width * (*d)?.max(0.0)))
            .collect()
    };

    BollingerSeries {
        upper: band(1.0),
        lower: band(-1.0),
        middle,
    }
}

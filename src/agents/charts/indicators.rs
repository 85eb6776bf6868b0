//! Indicator math over plain price series
//!
//! Every function returns the value at the last bar, or `None` when the
//! series is too short for the requested period.

use crate::domain::Candle;

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// EMA seeded with the SMA of the first `period` values
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);
    for i in period..values.len() {
        ema = (values[i] - ema) * k + ema;
        out[i] = Some(ema);
    }
    out
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied().flatten()
}

/// Wilder-smoothed RSI
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        changes[..period].iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    for change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    let line: Vec<f64> = fast_series
        .iter()
        .zip(slow_series.iter())
        .filter_map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let line_last = *line.last()?;
    let signal_last = ema(&line, signal)?;
    Some(Macd {
        line: line_last,
        signal: signal_last,
        histogram: line_last - signal_last,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands with population standard deviation
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<Bands> {
    let middle = sma(closes, period)?;
    let window = &closes[closes.len() - period..];
    let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let deviation = variance.sqrt() * width;
    Some(Bands {
        upper: middle + deviation,
        middle,
        lower: middle - deviation,
    })
}

/// Wilder-smoothed average true range
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() <= period {
        return None;
    }
    let ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect();

    let mut value = ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(value)
}

/// Slow stochastic `(%K, %D)`
pub fn stochastic(
    candles: &[Candle],
    k_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> Option<(f64, f64)> {
    if k_period == 0 || candles.len() < k_period {
        return None;
    }
    let fast_k: Vec<f64> = candles
        .windows(k_period)
        .map(|window| {
            let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let close = window[window.len() - 1].close;
            if highest > lowest {
                100.0 * (close - lowest) / (highest - lowest)
            } else {
                50.0
            }
        })
        .collect();

    if k_smooth == 0 || fast_k.len() < k_smooth {
        return None;
    }
    let slow_k: Vec<f64> = fast_k
        .windows(k_smooth)
        .map(|w| w.iter().sum::<f64>() / k_smooth as f64)
        .collect();
    let d = sma(&slow_k, d_smooth)?;
    Some((*slow_k.last()?, d))
}

/// On-balance volume, starting from the first bar's volume
pub fn obv(candles: &[Candle]) -> Option<f64> {
    let first = candles.first()?;
    let total = candles.windows(2).fold(first.volume, |acc, w| {
        if w[1].close > w[0].close {
            acc + w[1].volume
        } else if w[1].close < w[0].close {
            acc - w[1].volume
        } else {
            acc
        }
    });
    Some(total)
}

/// Cumulative volume-weighted close
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let volume: f64 = candles.iter().map(|c| c.volume).sum();
    if volume <= 0.0 {
        return None;
    }
    let weighted: f64 = candles.iter().map(|c| c.close * c.volume).sum();
    Some(weighted / volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_sma_and_ema() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 6), None);

        // seed 2.0 (mean of 1,2,3), then k = 0.5
        let series = ema_series(&values, 3);
        assert_eq!(series[1], None);
        assert_eq!(series[2], Some(2.0));
        assert_eq!(series[3], Some(3.0));
        assert_eq!(ema(&values, 3), Some(4.0));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (1..=30).map(f64::from).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert!(rsi(&falling, 14).unwrap() < 1e-9);

        assert_eq!(rsi(&rising[..14], 14), None);
    }

    #[test]
    fn test_bollinger_flat_series() {
        let flat = vec![10.0; 20];
        let bands = bollinger(&flat, 20, 2.0).unwrap();
        assert_eq!(bands.middle, 10.0);
        assert_eq!(bands.upper, 10.0);
        assert_eq!(bands.lower, 10.0);
    }

    #[test]
    fn test_macd_needs_enough_history() {
        let short: Vec<f64> = (1..=30).map(f64::from).collect();
        assert!(macd(&short, 12, 26, 9).is_none());

        let long: Vec<f64> = (1..=60).map(f64::from).collect();
        let m = macd(&long, 12, 26, 9).unwrap();
        assert!(m.line > 0.0);
    }

    #[test]
    fn test_volume_indicators() {
        let candles = vec![
            candle(10.0, 11.0, 9.0, 10.0, 100.0),
            candle(10.0, 12.0, 10.0, 12.0, 50.0),
            candle(12.0, 12.0, 10.0, 11.0, 30.0),
        ];
        assert_eq!(obv(&candles), Some(120.0));
        let expected = (10.0 * 100.0 + 12.0 * 50.0 + 11.0 * 30.0) / 180.0;
        assert!((vwap(&candles).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_atr_constant_range() {
        let candles: Vec<Candle> = (0..20)
            .map(|_| candle(10.0, 11.0, 9.0, 10.0, 1.0))
            .collect();
        assert!((atr(&candles, 14).unwrap() - 2.0).abs() < 1e-9);
    }
}

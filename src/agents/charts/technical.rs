//! Technical analysis over a candle series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::indicators;
use crate::domain::Candle;
use crate::error::{AgentError, Result};

/// Bars needed before the data-quality component scores in full
pub const MIN_PERIODS: usize = 200;

/// Indicator count the coverage component is scored against
const SCORED_INDICATORS: f64 = 12.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicators {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr_14: Option<f64>,
    pub obv: Option<f64>,
    pub vwap: Option<f64>,
}

impl Indicators {
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let macd = indicators::macd(&closes, 12, 26, 9);
        let bands = indicators::bollinger(&closes, 20, 2.0);
        let stoch = indicators::stochastic(candles, 14, 3, 3);

        Self {
            sma_20: indicators::sma(&closes, 20),
            sma_50: indicators::sma(&closes, 50),
            sma_200: indicators::sma(&closes, 200),
            ema_12: indicators::ema(&closes, 12),
            ema_26: indicators::ema(&closes, 26),
            rsi_14: indicators::rsi(&closes, 14),
            macd: macd.map(|m| m.line),
            macd_signal: macd.map(|m| m.signal),
            macd_histogram: macd.map(|m| m.histogram),
            stoch_k: stoch.map(|(k, _)| k),
            stoch_d: stoch.map(|(_, d)| d),
            bb_upper: bands.map(|b| b.upper),
            bb_middle: bands.map(|b| b.middle),
            bb_lower: bands.map(|b| b.lower),
            atr_14: indicators::atr(candles, 14),
            obv: indicators::obv(candles),
            vwap: indicators::vwap(candles),
        }
    }

    pub fn available(&self) -> usize {
        [
            self.sma_20,
            self.sma_50,
            self.sma_200,
            self.ema_12,
            self.ema_26,
            self.rsi_14,
            self.macd,
            self.macd_signal,
            self.macd_histogram,
            self.stoch_k,
            self.stoch_d,
            self.bb_upper,
            self.bb_middle,
            self.bb_lower,
            self.atr_14,
            self.obv,
            self.vwap,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStrength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecognition {
    pub patterns_found: Vec<String>,
    pub bullish_patterns: Vec<String>,
    pub bearish_patterns: Vec<String>,
    pub strength: PatternStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "bullish"),
            TrendDirection::Bearish => write!(f, "bearish"),
            TrendDirection::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

impl PivotPoints {
    /// Classic floor pivots from one bar
    pub fn from_candle(candle: &Candle) -> Self {
        let (high, low, close) = (candle.high, candle.low, candle.close);
        let pivot = (high + low + close) / 3.0;
        Self {
            pivot,
            r1: 2.0 * pivot - low,
            r2: pivot + (high - low),
            r3: high + 2.0 * (pivot - low),
            s1: 2.0 * pivot - high,
            s2: pivot - (high - low),
            s3: low - 2.0 * (high - pivot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// 0-100
    pub strength: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub pivot_points: Option<PivotPoints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "buy"),
            Signal::Sell => write!(f, "sell"),
            Signal::Hold => write!(f, "hold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    pub rsi: Option<Signal>,
    pub macd: Option<Signal>,
    pub bollinger: Option<Signal>,
    pub pattern: Signal,
    pub trend: Signal,
    /// Majority vote over the signals above
    pub overall: Signal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalAnalysis {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: f64,
    pub candle_count: usize,
    pub indicators: Indicators,
    pub patterns: PatternRecognition,
    pub trend: TrendAnalysis,
    pub signals: Signals,
    /// 0-100
    pub confidence: f64,
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_shadow(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_down(c: &Candle) -> bool {
    c.close < c.open
}

/// Candlestick patterns completed by the last bar.
/// Doji-type patterns count as found but lean neither way, except the dragonfly.
pub fn recognize_patterns(candles: &[Candle]) -> PatternRecognition {
    let mut bullish = Vec::new();
    let mut bearish = Vec::new();
    let mut neutral = Vec::new();

    let n = candles.len();
    if let Some(last) = candles.last() {
        let range = last.high - last.low;
        let b = body(last);
        let falling_into = n >= 4 && candles[n - 2].close < candles[n - 4].close;
        let rising_into = n >= 4 && candles[n - 2].close > candles[n - 4].close;

        if range > 0.0 && b <= 0.1 * range {
            if upper_shadow(last) <= 0.1 * range && lower_shadow(last) >= 0.6 * range {
                bullish.push("DRAGONFLY_DOJI");
            } else {
                neutral.push("DOJI");
            }
        } else if b > 0.0 {
            let hammer_shape = lower_shadow(last) >= 2.0 * b && upper_shadow(last) <= 0.5 * b;
            let inverted_shape = upper_shadow(last) >= 2.0 * b && lower_shadow(last) <= 0.5 * b;
            if hammer_shape && falling_into {
                bullish.push("HAMMER");
            }
            if hammer_shape && rising_into {
                bearish.push("HANGING_MAN");
            }
            if inverted_shape && falling_into {
                bullish.push("INVERTED_HAMMER");
            }
            if inverted_shape && rising_into {
                bearish.push("SHOOTING_STAR");
            }
        }
    }

    if n >= 2 {
        let (prev, last) = (&candles[n - 2], &candles[n - 1]);
        let prev_mid = (prev.open + prev.close) / 2.0;

        if is_down(prev) && last.is_up() && last.open <= prev.close && last.close >= prev.open
            && body(last) > body(prev)
        {
            bullish.push("BULLISH_ENGULFING");
        }
        if prev.is_up() && is_down(last) && last.open >= prev.close && last.close <= prev.open
            && body(last) > body(prev)
        {
            bearish.push("BEARISH_ENGULFING");
        }
        if is_down(prev) && last.is_up() && last.open < prev.low && last.close > prev_mid
            && last.close < prev.open
        {
            bullish.push("PIERCING");
        }
        if prev.is_up() && is_down(last) && last.open > prev.high && last.close < prev_mid
            && last.close > prev.open
        {
            bearish.push("DARK_CLOUD_COVER");
        }
    }

    if n >= 3 {
        let (first, star, last) = (&candles[n - 3], &candles[n - 2], &candles[n - 1]);
        let first_mid = (first.open + first.close) / 2.0;
        let small_star = body(star) <= 0.3 * body(first);

        if is_down(first) && small_star && last.is_up() && last.close > first_mid {
            bullish.push("MORNING_STAR");
        }
        if first.is_up() && small_star && is_down(last) && last.close < first_mid {
            bearish.push("EVENING_STAR");
        }

        let trio = &candles[n - 3..];
        let soldiers = trio.iter().all(|c| c.close > c.open)
            && trio.windows(2).all(|w| {
                w[1].close > w[0].close && w[1].open >= w[0].open && w[1].open <= w[0].close
            });
        let crows = trio.iter().all(is_down)
            && trio.windows(2).all(|w| {
                w[1].close < w[0].close && w[1].open <= w[0].open && w[1].open >= w[0].close
            });
        if soldiers {
            bullish.push("THREE_WHITE_SOLDIERS");
        }
        if crows {
            bearish.push("THREE_BLACK_CROWS");
        }
    }

    let patterns_found: Vec<String> = bullish
        .iter()
        .chain(bearish.iter())
        .chain(neutral.iter())
        .map(|p| p.to_string())
        .collect();
    let strength = match patterns_found.len() {
        0 | 1 => PatternStrength::Weak,
        2 => PatternStrength::Moderate,
        _ => PatternStrength::Strong,
    };

    PatternRecognition {
        patterns_found,
        bullish_patterns: bullish.iter().map(|p| p.to_string()).collect(),
        bearish_patterns: bearish.iter().map(|p| p.to_string()).collect(),
        strength,
    }
}

pub fn analyze_trend(candles: &[Candle], ind: &Indicators) -> TrendAnalysis {
    let close = candles.last().map(|c| c.close).unwrap_or_default();
    let mut direction = TrendDirection::Neutral;
    let mut strength = 50.0;

    if let (Some(sma_50), Some(sma_200)) = (ind.sma_50, ind.sma_200) {
        if close > sma_50 && sma_50 > sma_200 {
            direction = TrendDirection::Bullish;
            strength = 75.0;
        } else if close < sma_50 && sma_50 < sma_200 {
            direction = TrendDirection::Bearish;
            strength = 75.0;
        }
    } else if let (Some(ema_12), Some(ema_26)) = (ind.ema_12, ind.ema_26) {
        if ema_12 > ema_26 {
            direction = TrendDirection::Bullish;
            strength = 60.0;
        } else if ema_12 < ema_26 {
            direction = TrendDirection::Bearish;
            strength = 60.0;
        }
    }

    let pivot_points = candles.last().map(PivotPoints::from_candle);
    let (support_levels, resistance_levels) = match &pivot_points {
        Some(p) => (vec![p.s1, p.s2, p.s3], vec![p.r1, p.r2, p.r3]),
        None => (Vec::new(), Vec::new()),
    };

    TrendAnalysis {
        direction,
        strength,
        support_levels,
        resistance_levels,
        pivot_points,
    }
}

pub fn generate_signals(
    current_price: f64,
    ind: &Indicators,
    patterns: &PatternRecognition,
    trend: &TrendAnalysis,
) -> Signals {
    let rsi = ind.rsi_14.map(|rsi| {
        if rsi < 30.0 {
            Signal::Buy
        } else if rsi > 70.0 {
            Signal::Sell
        } else {
            Signal::Hold
        }
    });

    let macd = match (ind.macd, ind.macd_signal) {
        (Some(line), Some(signal)) if line > signal => Some(Signal::Buy),
        (Some(line), Some(signal)) if line < signal => Some(Signal::Sell),
        (Some(_), Some(_)) => Some(Signal::Hold),
        _ => None,
    };

    let bollinger = match (ind.bb_upper, ind.bb_lower) {
        (Some(_), Some(lower)) if current_price <= lower => Some(Signal::Buy),
        (Some(upper), Some(_)) if current_price >= upper => Some(Signal::Sell),
        (Some(_), Some(_)) => Some(Signal::Hold),
        _ => None,
    };

    let pattern = match patterns
        .bullish_patterns
        .len()
        .cmp(&patterns.bearish_patterns.len())
    {
        std::cmp::Ordering::Greater => Signal::Buy,
        std::cmp::Ordering::Less => Signal::Sell,
        std::cmp::Ordering::Equal => Signal::Hold,
    };

    let trend_signal = match trend.direction {
        TrendDirection::Bullish => Signal::Buy,
        TrendDirection::Bearish => Signal::Sell,
        TrendDirection::Neutral => Signal::Hold,
    };

    let votes: Vec<Signal> = [rsi, macd, bollinger, Some(pattern), Some(trend_signal)]
        .into_iter()
        .flatten()
        .collect();
    let buys = votes.iter().filter(|s| **s == Signal::Buy).count();
    let sells = votes.iter().filter(|s| **s == Signal::Sell).count();
    let overall = match buys.cmp(&sells) {
        std::cmp::Ordering::Greater => Signal::Buy,
        std::cmp::Ordering::Less => Signal::Sell,
        std::cmp::Ordering::Equal => Signal::Hold,
    };

    Signals {
        rsi,
        macd,
        bollinger,
        pattern,
        trend: trend_signal,
        overall,
    }
}

/// Data quality (30) + indicator coverage (30) + pattern strength (20) +
/// trend strength (20), capped at 100
pub fn confidence_score(
    data_points: usize,
    ind: &Indicators,
    patterns: &PatternRecognition,
    trend: &TrendAnalysis,
) -> f64 {
    let data = if data_points >= MIN_PERIODS {
        30.0
    } else {
        data_points as f64 / MIN_PERIODS as f64 * 30.0
    };
    let coverage = ind.available() as f64 / SCORED_INDICATORS * 30.0;
    let pattern = match patterns.strength {
        PatternStrength::Strong => 20.0,
        PatternStrength::Moderate => 12.0,
        PatternStrength::Weak => 5.0,
    };
    let trend_points = trend.strength / 100.0 * 20.0;

    (data + coverage + pattern + trend_points).min(100.0)
}

pub fn analyze(symbol: &str, timeframe: &str, candles: &[Candle]) -> Result<TechnicalAnalysis> {
    if candles.is_empty() {
        return Err(AgentError::Validation(format!(
            "no candles to analyze for {}",
            symbol
        )));
    }
    let mut sorted = candles.to_vec();
    sorted.sort_by_key(|c| c.open_time);

    let last = sorted[sorted.len() - 1];
    let indicators = Indicators::compute(&sorted);
    let patterns = recognize_patterns(&sorted);
    let trend = analyze_trend(&sorted, &indicators);
    let signals = generate_signals(last.close, &indicators, &patterns, &trend);
    let confidence = confidence_score(sorted.len(), &indicators, &patterns, &trend);

    Ok(TechnicalAnalysis {
        symbol: symbol.to_uppercase(),
        timeframe: timeframe.to_string(),
        timestamp: last.open_time,
        current_price: last.close,
        candle_count: sorted.len(),
        indicators,
        patterns,
        trend,
        signals,
        confidence,
    })
}

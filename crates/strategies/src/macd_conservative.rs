use crate::error::StrategyError;
use crate::Strategy;
use configuration::MacdParams;
use core_types::{Bar, Decision, Direction};
use rust_decimal::prelude::*;
use ta::indicators::ExponentialMovingAverage as Ema;
use ta::Next;

/// Number of signal values before the last two that must agree in sign.
const CONFIRMATION_BARS: usize = 3;

/// The conservative MACD strategy.
///
/// The MACD line is `EMA_short - EMA_long` and the signal line is its EMA.
/// A buy is issued when the signal turns positive after three negative values
/// (skipping the two most recent), a sell on the mirrored pattern. The stop and
/// target sit `band_factor` times the distance to a long moving average away
/// from the last close.
pub struct MacdConservative {
    params: MacdParams,
}

impl MacdConservative {
    pub fn new(params: MacdParams) -> Result<Self, StrategyError> {
        if params.short_period == 0 || params.signal_period == 0 || params.ma_period == 0 {
            return Err(StrategyError::InvalidParameters("MACD periods must be positive".to_string()));
        }
        if params.short_period >= params.long_period {
            return Err(StrategyError::InvalidParameters(
                "Short EMA period must be less than long EMA period".to_string(),
            ));
        }
        if params.band_factor.is_sign_negative() {
            return Err(StrategyError::InvalidParameters("band_factor must not be negative".to_string()));
        }
        Ok(Self { params })
    }

    /// Minimum history needed before a signal can be trusted.
    pub fn warm_up(&self) -> usize {
        self.params.long_period + CONFIRMATION_BARS + 2
    }

    /// The signal line over the whole window, one value per bar.
    fn signal_line(&self, closes: &[f64]) -> Result<Vec<f64>, StrategyError> {
        let mut short = Ema::new(self.params.short_period).map_err(indicator_error)?;
        let mut long = Ema::new(self.params.long_period).map_err(indicator_error)?;
        let mut signal = Ema::new(self.params.signal_period).map_err(indicator_error)?;

        Ok(closes
            .iter()
            .map(|&close| {
                let macd = short.next(close) - long.next(close);
                signal.next(macd)
            })
            .collect())
    }

    /// `|SMA(close) - close|` over `ma_period` bars, or over the whole window when shorter.
    fn band_width(&self, history: &[Bar]) -> Decimal {
        let window = &history[history.len().saturating_sub(self.params.ma_period)..];
        let Some(last) = history.last() else {
            return Decimal::ZERO;
        };
        let sum: Decimal = window.iter().map(|bar| bar.close).sum();
        let mean = sum / Decimal::from(window.len());
        (mean - last.close).abs()
    }
}

fn indicator_error(e: ta::errors::TaError) -> StrategyError {
    StrategyError::IndicatorError(e.to_string())
}

impl Strategy for MacdConservative {
    fn decide(&mut self, ticker: &str, history: &[Bar]) -> Result<Decision, StrategyError> {
        if history.len() < self.warm_up() {
            tracing::debug!(ticker, bars = history.len(), needed = self.warm_up(), "Not enough history for MACD");
            return Ok(Decision::nothing());
        }

        let closes = history
            .iter()
            .map(|bar| {
                bar.close.to_f64().ok_or_else(|| StrategyError::UnrepresentablePrice {
                    ticker: ticker.to_string(),
                    price: bar.close.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, StrategyError>>()?;

        let signal = self.signal_line(&closes)?;
        let n = signal.len();
        let last = signal[n - 1];
        // Values at positions -5, -4 and -3 from the end.
        let confirmation = &signal[n - CONFIRMATION_BARS - 2..n - 2];

        let bearish = last < 0.0 && confirmation.iter().all(|v| *v > 0.0);
        let bullish = last > 0.0 && confirmation.iter().all(|v| *v < 0.0);
        tracing::debug!(ticker, last_signal = last, bullish, bearish, "MACD evaluated");

        // Bearish takes precedence when both patterns hold.
        let (direction, comment) = if bearish {
            (Direction::Sell, "bearish-conservative")
        } else if bullish {
            (Direction::Buy, "bullish-conservative")
        } else {
            return Ok(Decision::nothing());
        };

        let close = history[history.len() - 1].close;
        let offset = self.band_width(history) * self.params.band_factor;
        let (stop_loss, take_profit) = match direction {
            Direction::Sell => (close + offset, close - offset),
            _ => (close - offset, close + offset),
        };

        tracing::info!(ticker, %close, %stop_loss, %take_profit, signal = comment, "MACD signal");
        Ok(Decision {
            direction: Some(direction),
            quantity: None,
            price: Some(close.round_dp(2)),
            stop_loss: Some(stop_loss.round_dp(2)),
            take_profit: Some(take_profit.round_dp(2)),
            comment: Some(comment.to_string()),
        })
    }

    fn name(&self) -> &'static str {
        "macd-conservative"
    }
}

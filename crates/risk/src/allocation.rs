use crate::error::RiskError;
use rust_decimal::Decimal;

/// Closes the rounding gap so the weights add up to exactly one.
fn close_to_one(mut weights: Vec<Decimal>) -> Vec<Decimal> {
    if let Some((last, rest)) = weights.split_last_mut() {
        let others: Decimal = rest.iter().sum();
        *last = Decimal::ONE - others;
    }
    weights
}

/// `n` equal weights.
pub fn equal_weights(n: usize) -> Vec<Decimal> {
    if n == 0 {
        return Vec::new();
    }
    let share = Decimal::ONE / Decimal::from(n);
    close_to_one(vec![share; n])
}

/// Scales non-negative weights so they sum to exactly one.
pub fn normalize_weights(weights: &[Decimal]) -> Result<Vec<Decimal>, RiskError> {
    if weights.iter().any(|w| w.is_sign_negative() && !w.is_zero()) {
        return Err(RiskError::Allocation("weights must not be negative".to_string()));
    }
    let total: Decimal = weights.iter().sum();
    if total <= Decimal::ZERO {
        return Err(RiskError::DegenerateWeights(total));
    }
    if total == Decimal::ONE {
        return Ok(weights.to_vec());
    }
    Ok(close_to_one(weights.iter().map(|w| w / total).collect()))
}

/// Sample variance of the closes after dividing them by their mean.
fn relative_variance(closes: &[Decimal]) -> Option<Decimal> {
    if closes.len() < 2 {
        return None;
    }
    let n = Decimal::from(closes.len());
    let mean = closes.iter().sum::<Decimal>() / n;
    if mean.is_zero() {
        return None;
    }
    let scaled: Vec<Decimal> = closes.iter().map(|c| c / mean).collect();
    let scaled_mean = scaled.iter().sum::<Decimal>() / n;
    let squares: Decimal = scaled.iter().map(|x| (x - scaled_mean) * (x - scaled_mean)).sum();
    Some(squares / (n - Decimal::ONE))
}

/// Weights proportional to `1 / var(close / mean(close))` for each ticker.
///
/// `history` pairs each ticker with its daily closes. A ticker whose history
/// is too short or perfectly flat makes the whole computation fail, so the
/// caller can fall back to equal weights.
pub fn inverse_variance_weights(history: &[(String, Vec<Decimal>)]) -> Result<Vec<Decimal>, RiskError> {
    if history.is_empty() {
        return Err(RiskError::Allocation("no tickers to weight".to_string()));
    }

    let inverse = history
        .iter()
        .map(|(ticker, closes)| {
            let variance = relative_variance(closes).ok_or_else(|| {
                RiskError::Allocation(format!("{} has fewer than two usable closes", ticker))
            })?;
            if variance.is_zero() {
                return Err(RiskError::ZeroVariance { ticker: ticker.clone() });
            }
            Ok(Decimal::ONE / variance)
        })
        .collect::<Result<Vec<Decimal>, RiskError>>()?;

    let weights = normalize_weights(&inverse)?;
    tracing::debug!(?weights, "Computed inverse-variance weights");
    Ok(weights)
}

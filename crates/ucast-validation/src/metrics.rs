//! Accuracy metrics over flattened prediction/target arrays.

use ucast_core::{Result, UcastError};

/// Guard against division by near-zero targets in MAPE.
const MAPE_EPSILON: f64 = 1e-8;

fn check_lengths(predictions: &[f32], targets: &[f32]) -> Result<()> {
    if predictions.len() != targets.len() || predictions.is_empty() {
        return Err(UcastError::numerical(format!(
            "Metric inputs must be non-empty and equal length ({} vs {})",
            predictions.len(),
            targets.len()
        )));
    }
    Ok(())
}

/// Root mean squared error.
pub fn rmse(predictions: &[f32], targets: &[f32]) -> Result<f64> {
    check_lengths(predictions, targets)?;
    let mse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| {
            let e = (p - t) as f64;
            e * e
        })
        .sum::<f64>()
        / predictions.len() as f64;
    Ok(mse.sqrt())
}

/// Mean absolute error.
pub fn mae(predictions: &[f32], targets: &[f32]) -> Result<f64> {
    check_lengths(predictions, targets)?;
    Ok(predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| ((p - t) as f64).abs())
        .sum::<f64>()
        / predictions.len() as f64)
}

/// Mean absolute percentage error, epsilon-guarded against near-zero
/// targets rather than raising.
pub fn mape(predictions: &[f32], targets: &[f32]) -> Result<f64> {
    check_lengths(predictions, targets)?;
    Ok(predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| ((p - t) as f64).abs() / ((t as f64).abs() + MAPE_EPSILON))
        .sum::<f64>()
        / predictions.len() as f64
        * 100.0)
}

/// Coefficient of determination against the mean-target baseline.
pub fn r_squared(predictions: &[f32], targets: &[f32]) -> Result<f64> {
    check_lengths(predictions, targets)?;
    let mean: f64 = targets.iter().map(|&t| t as f64).sum::<f64>() / targets.len() as f64;
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| {
            let e = t as f64 - p as f64;
            e * e
        })
        .sum();
    let ss_tot: f64 = targets
        .iter()
        .map(|&t| {
            let d = t as f64 - mean;
            d * d
        })
        .sum();
    if ss_tot == 0.0 {
        return Ok(0.0);
    }
    Ok(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse_known_value() {
        let predictions = [2.0f32, 4.0];
        let targets = [1.0f32, 2.0];
        // Errors 1 and 2 -> mse 2.5 -> rmse sqrt(2.5)
        assert!((rmse(&predictions, &targets).unwrap() - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mae_known_value() {
        let predictions = [2.0f32, 4.0];
        let targets = [1.0f32, 2.0];
        assert!((mae(&predictions, &targets).unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_mape_zero_target_is_guarded() {
        let predictions = [1.0f32];
        let targets = [0.0f32];
        // Epsilon keeps the division finite instead of raising.
        let value = mape(&predictions, &targets).unwrap();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn test_perfect_prediction() {
        let values = [3.0f32, 5.0, 7.0];
        assert_eq!(rmse(&values, &values).unwrap(), 0.0);
        assert_eq!(mae(&values, &values).unwrap(), 0.0);
        assert!((r_squared(&values, &values).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(rmse(&[1.0], &[1.0, 2.0]).is_err());
        assert!(mae(&[], &[]).is_err());
    }
}

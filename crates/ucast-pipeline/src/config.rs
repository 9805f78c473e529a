//! Pipeline configuration and validation.

use serde::{Deserialize, Serialize};
use ucast_core::{Result, UcastError};

/// Upper bound on zone count (safety guardrail).
pub const MAX_ZONES: usize = 1000;

/// Full training pipeline configuration.
///
/// Defaults match the reference deployment: 30 zones, 4 neighbors, a
/// 24-step input window forecasting 12 steps ahead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of spatial zones
    pub num_zones: usize,

    /// Outgoing K-NN edges per zone
    pub neighbors: usize,

    /// Input window length L
    pub sequence_length: usize,

    /// Forecast horizon H
    pub horizon: usize,

    /// Feature column every model forecasts
    pub target_feature: usize,

    /// Training epochs per variant
    pub epochs: usize,

    /// Samples per gradient update
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f32,

    /// Dropout rate for the regularized variants
    pub dropout: f32,

    /// Seed for weight init, dropout and intra-train shuffling
    pub seed: u64,

    /// Directory the winning artifact set and report are written to
    pub output_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_zones: 30,
            neighbors: 4,
            sequence_length: 24,
            horizon: 12,
            target_feature: 0,
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            dropout: 0.2,
            seed: 42,
            output_dir: "artifacts".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration.
    ///
    /// Returns an error if any constraints are violated.
    pub fn validate(&self) -> Result<()> {
        if self.num_zones == 0 {
            return Err(UcastError::config("num_zones must be greater than 0"));
        }
        if self.num_zones > MAX_ZONES {
            return Err(UcastError::config(format!(
                "num_zones ({}) exceeds MAX_ZONES ({})",
                self.num_zones, MAX_ZONES
            )));
        }
        if self.neighbors == 0 {
            return Err(UcastError::config("neighbors must be greater than 0"));
        }
        if self.sequence_length < 6 {
            // The hybrid variant's convolutional front end needs 6 steps.
            return Err(UcastError::config(
                "sequence_length must be at least 6",
            ));
        }
        if self.horizon == 0 {
            return Err(UcastError::config("horizon must be greater than 0"));
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(UcastError::config(
                "epochs and batch_size must be greater than 0",
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(UcastError::config("learning_rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(UcastError::config("dropout must be in [0, 1)"));
        }
        Ok(())
    }
}

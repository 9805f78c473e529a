//! Error types for ucast.
//!
//! One unified error enum shared by every pipeline stage, with helper
//! constructors so call sites stay terse.

use thiserror::Error;

/// Unified error type for all ucast operations.
#[derive(Error, Debug)]
pub enum UcastError {
    /// Client-caused request validation errors (missing field, coordinate
    /// out of range, too few waypoints). Surfaced immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fewer coordinate samples than requested zones at topology build time.
    #[error("Insufficient data: {actual} samples for {required} zones")]
    InsufficientData { required: usize, actual: usize },

    /// Aggregation was handed zero observations.
    #[error("Empty dataset: no observations to aggregate")]
    EmptyDataset,

    /// Tensor too short for the configured window geometry.
    #[error("Window underflow: {timesteps} timesteps, need at least {required}")]
    WindowUnderflow { timesteps: usize, required: usize },

    /// Model/scaler/metadata artifact missing or corrupt at startup.
    #[error("Load error: {0}")]
    Load(String),

    /// Serving context asked to predict before artifacts finished loading.
    #[error("Serving context not ready: model artifacts are not loaded")]
    NotReady,

    /// Failure during feature construction or model invocation for a
    /// single request. Caught per request; never poisons the context.
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mathematical/numerical errors (NaN loss, shape mismatch)
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// I/O errors (dataset reading, artifact writing)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UcastError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        UcastError::Validation(message.into())
    }

    /// Creates a load error.
    pub fn load(message: impl Into<String>) -> Self {
        UcastError::Load(message.into())
    }

    /// Creates a prediction error.
    pub fn prediction(message: impl Into<String>) -> Self {
        UcastError::Prediction(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        UcastError::Config(message.into())
    }

    /// Creates a numerical error.
    pub fn numerical(message: impl Into<String>) -> Self {
        UcastError::Numerical(message.into())
    }

    /// Checks whether the error was caused by the caller's request rather
    /// than by pipeline or serving state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, UcastError::Validation(_))
    }

    /// Checks whether the error is fatal to the current pipeline run.
    ///
    /// Data errors abort the run; they are not retried automatically.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            UcastError::InsufficientData { .. }
                | UcastError::EmptyDataset
                | UcastError::WindowUnderflow { .. }
        )
    }
}

/// Result type alias for ucast operations.
pub type Result<T> = std::result::Result<T, UcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let val = UcastError::validation("Missing required field: latitude");
        assert!(matches!(val, UcastError::Validation(_)));
        assert!(val.is_client_error());

        let load = UcastError::load("metadata.json not found");
        assert!(matches!(load, UcastError::Load(_)));
        assert!(!load.is_client_error());
    }

    #[test]
    fn test_data_errors() {
        let insufficient = UcastError::InsufficientData {
            required: 30,
            actual: 12,
        };
        assert!(insufficient.is_data_error());
        assert!(UcastError::EmptyDataset.is_data_error());
        assert!(UcastError::WindowUnderflow {
            timesteps: 10,
            required: 36
        }
        .is_data_error());
        assert!(!UcastError::NotReady.is_data_error());
    }

    #[test]
    fn test_display_messages() {
        let err = UcastError::WindowUnderflow {
            timesteps: 20,
            required: 36,
        };
        assert_eq!(
            err.to_string(),
            "Window underflow: 20 timesteps, need at least 36"
        );
    }
}

//! Artifact metadata and file layout.
//!
//! One trained deployment is a directory of four JSON files: the model
//! weights, the two scalers, and this metadata record. The layout is the
//! whole persistence contract — loaders treat anything missing or
//! unparseable as a `Load` error.

use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ucast_core::{Result, UcastError};

/// Model weights + architecture descriptor.
pub const MODEL_FILE: &str = "model.json";
/// Scaler fitted on the input feature matrix.
pub const FEATURE_SCALER_FILE: &str = "feature_scaler.json";
/// Scaler fitted on the target feature column.
pub const TARGET_SCALER_FILE: &str = "target_scaler.json";
/// This metadata record.
pub const METADATA_FILE: &str = "metadata.json";

/// Test-set performance stored with the artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Metadata describing one persisted deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub sequence_length: usize,
    pub n_features: usize,
    pub model_performance: ModelPerformance,
}

/// Reads a JSON artifact file, mapping every failure to a `Load` error.
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)
        .map_err(|e| UcastError::load(format!("Missing artifact {}: {e}", path.display())))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| UcastError::load(format!("Corrupt artifact {}: {e}", path.display())))
}

/// Writes a JSON artifact file, creating the directory if needed.
pub fn write_artifact<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);

        let metadata = ModelMetadata {
            model_type: "recurrent".to_string(),
            sequence_length: 24,
            n_features: 5,
            model_performance: ModelPerformance {
                rmse: 1.25,
                mae: 0.9,
                r2: 0.8,
            },
        };
        write_artifact(&metadata, &path).unwrap();

        let loaded: ModelMetadata = read_artifact(&path).unwrap();
        assert_eq!(loaded.model_type, "recurrent");
        assert_eq!(loaded.sequence_length, 24);
        assert!((loaded.model_performance.rmse - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_artifact_is_load_error() {
        let err = read_artifact::<ModelMetadata>(Path::new("/nonexistent/metadata.json"))
            .unwrap_err();
        assert!(matches!(err, UcastError::Load(_)));
    }
}

//! The serving context: one loaded model + scalers + metadata behind a
//! read-only handle.
//!
//! Replaces the mutable process-global pattern: the context is constructed
//! once at startup and passed by reference into every request handler.
//! Readiness is explicit — a context whose artifacts failed to load still
//! answers health checks (reporting `model_loaded: false`) but refuses
//! predictions with a not-ready error instead of blocking.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use ndarray::{Array1, Array3};
use ucast_core::{Result, UcastError};
use ucast_dataset::{MinMaxScaler, ModelData, SequenceDataset};
use ucast_models::artifact::{
    read_artifact, FEATURE_SCALER_FILE, METADATA_FILE, MODEL_FILE, TARGET_SCALER_FILE,
};
use ucast_models::{load_model, ModelKind, ModelMetadata, PredictiveModel};

use crate::adjust::adjust;
use crate::features;
use crate::requests::{
    HealthResponse, Location, PointRequest, PointResponse, RoutePointPrediction, RouteRequest,
    RouteResponse, RouteSummary,
};

/// Minutes assumed between consecutive route waypoints.
const WAYPOINT_SPACING_MINUTES: i64 = 5;

#[derive(Debug)]
struct LoadedArtifacts {
    model: Box<dyn PredictiveModel>,
    feature_scaler: MinMaxScaler,
    target_scaler: MinMaxScaler,
    metadata: ModelMetadata,
}

/// Read-only serving state, one per deployment.
#[derive(Debug)]
pub struct ServingContext {
    artifacts: Option<LoadedArtifacts>,
}

impl ServingContext {
    /// Loads the artifact set from a directory.
    ///
    /// Any missing or corrupt artifact is a `Load` error; the caller
    /// decides whether to abort startup or continue unready.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut metadata: ModelMetadata = read_artifact(&dir.join(METADATA_FILE))?;
        let kind = ModelKind::parse(&metadata.model_type)
            .map_err(|e| UcastError::load(e.to_string()))?;
        if kind == ModelKind::GraphRecurrent {
            return Err(UcastError::load(
                "graph_recurrent artifacts predict whole zone sets and cannot serve \
                 single-point requests",
            ));
        }

        let model = load_model(kind, &dir.join(MODEL_FILE))?;
        let feature_scaler: MinMaxScaler = read_artifact(&dir.join(FEATURE_SCALER_FILE))?;
        let target_scaler: MinMaxScaler = read_artifact(&dir.join(TARGET_SCALER_FILE))?;

        // Reconcile metadata with the loaded model; the weights win.
        let config = model.config();
        if metadata.sequence_length != config.sequence_length {
            warn!(
                "metadata sequence_length {} differs from model {}; using model value",
                metadata.sequence_length, config.sequence_length
            );
            metadata.sequence_length = config.sequence_length;
        }
        if metadata.n_features != config.num_features {
            warn!(
                "metadata n_features {} differs from model {}; using model value",
                metadata.n_features, config.num_features
            );
            metadata.n_features = config.num_features;
        }

        info!(
            "Loaded {} model (L={}, F={}) from {}",
            metadata.model_type,
            metadata.sequence_length,
            metadata.n_features,
            dir.display()
        );

        Ok(Self {
            artifacts: Some(LoadedArtifacts {
                model,
                feature_scaler,
                target_scaler,
                metadata,
            }),
        })
    }

    /// A context with no artifacts: health answers, predictions refuse.
    pub fn unready() -> Self {
        Self { artifacts: None }
    }

    /// Loads if possible, otherwise logs and stays unready.
    pub fn initialize(dir: &Path) -> Self {
        match Self::load(dir) {
            Ok(context) => context,
            Err(e) => {
                error!("Failed to load serving artifacts: {e}");
                Self::unready()
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Health is always answerable, loaded or not.
    pub fn health(&self, now: DateTime<Utc>) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            model_loaded: self.is_ready(),
            timestamp: now.to_rfc3339(),
        }
    }

    /// The persisted metadata record.
    pub fn model_info(&self) -> Result<&ModelMetadata> {
        self.artifacts
            .as_ref()
            .map(|a| &a.metadata)
            .ok_or(UcastError::NotReady)
    }

    /// Runs one (lat, lon, timestamp) through scaling, the model, and
    /// inverse scaling. Model failures come back as `Prediction` errors.
    fn predict_value(&self, lat: f64, lon: f64, timestamp: &DateTime<Utc>) -> Result<f64> {
        let artifacts = self.artifacts.as_ref().ok_or(UcastError::NotReady)?;

        let row = features::build_feature_row(lat, lon, timestamp);
        let fitted = features::fit_width(&row, artifacts.feature_scaler.num_features());
        let matrix = features::tile_sequence(&fitted, artifacts.metadata.sequence_length);
        let scaled = artifacts
            .feature_scaler
            .transform(matrix.view())
            .map_err(|e| UcastError::prediction(e.to_string()))?;

        // Trim to the model's input width; the scaler may carry more
        // columns than the model consumes.
        let width = artifacts.metadata.n_features;
        let steps = artifacts.metadata.sequence_length;
        let mut inputs = Array3::<f32>::zeros((1, steps, width));
        for t in 0..steps {
            for c in 0..width.min(scaled.ncols()) {
                inputs[[0, t, c]] = scaled[[t, c]];
            }
        }
        let data = ModelData::Sequence(SequenceDataset {
            inputs,
            targets: Array1::zeros(1),
        });

        let predictions = artifacts
            .model
            .predict(&data)
            .map_err(|e| UcastError::prediction(e.to_string()))?;
        let scaled_output = predictions
            .first()
            .copied()
            .ok_or_else(|| UcastError::prediction("model returned no output"))?;

        Ok(artifacts.target_scaler.inverse_value(0, scaled_output) as f64)
    }

    /// Single-point prediction: validate, predict, adjust.
    pub fn predict_point(&self, request: &PointRequest) -> Result<PointResponse> {
        let timestamp = request.validate()?;
        let raw = self.predict_value(request.latitude, request.longitude, &timestamp)?;
        let adjusted = adjust(raw, request.latitude, request.longitude, &timestamp);

        Ok(PointResponse {
            prediction: adjusted.prediction,
            confidence: adjusted.confidence.as_str().to_string(),
            timestamp: request.timestamp.clone(),
            location: Location {
                lat: request.latitude,
                lon: request.longitude,
            },
            factors: adjusted.factors,
        })
    }

    /// Route prediction: one point per waypoint, spaced 5 minutes apart
    /// from `base_time`. A failed waypoint is skipped with a warning; a
    /// route where every waypoint fails is an error.
    pub fn predict_route(
        &self,
        request: &RouteRequest,
        base_time: DateTime<Utc>,
    ) -> Result<RouteResponse> {
        request.validate()?;
        if !self.is_ready() {
            return Err(UcastError::NotReady);
        }

        let mut route_predictions = Vec::with_capacity(request.waypoints.len());
        for (i, waypoint) in request.waypoints.iter().enumerate() {
            let timestamp = base_time + Duration::minutes(WAYPOINT_SPACING_MINUTES * i as i64);
            match self.predict_value(waypoint.latitude, waypoint.longitude, &timestamp) {
                Ok(raw) => {
                    let adjusted =
                        adjust(raw, waypoint.latitude, waypoint.longitude, &timestamp);
                    route_predictions.push(RoutePointPrediction {
                        waypoint: i,
                        location: waypoint.clone(),
                        prediction: adjusted.prediction,
                        timestamp: timestamp.to_rfc3339(),
                    });
                }
                Err(e) => warn!("Waypoint {i} prediction failed: {e}"),
            }
        }

        if route_predictions.is_empty() {
            return Err(UcastError::prediction("No valid predictions"));
        }

        let values: Vec<f64> = route_predictions.iter().map(|p| p.prediction).collect();
        let summary = RouteSummary {
            average_traffic: values.iter().sum::<f64>() / values.len() as f64,
            max_traffic: values.iter().cloned().fold(f64::MIN, f64::max),
            min_traffic: values.iter().cloned().fold(f64::MAX, f64::min),
            total_waypoints: route_predictions.len(),
        };

        Ok(RouteResponse {
            route_predictions,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::Waypoint;
    use chrono::TimeZone;
    use ndarray::array;
    use ucast_models::artifact::write_artifact;
    use ucast_models::{build_model, ModelConfig, ModelPerformance};

    /// Writes a minimal but complete artifact set into `dir`.
    fn write_test_artifacts(dir: &Path) {
        let config = ModelConfig {
            sequence_length: 6,
            num_features: 2,
            num_zones: 1,
            dropout: 0.0,
            learning_rate: 1e-3,
            seed: 42,
        };
        let model = build_model(ModelKind::Recurrent, config, None).unwrap();
        model.save(&dir.join(MODEL_FILE)).unwrap();

        let feature_scaler =
            MinMaxScaler::fit(array![[-1.0f32, -1.0], [1.0, 1.0]].view()).unwrap();
        write_artifact(&feature_scaler, &dir.join(FEATURE_SCALER_FILE)).unwrap();

        let target_scaler = MinMaxScaler::fit(array![[0.0f32], [100.0]].view()).unwrap();
        write_artifact(&target_scaler, &dir.join(TARGET_SCALER_FILE)).unwrap();

        let metadata = ModelMetadata {
            model_type: "recurrent".to_string(),
            sequence_length: 6,
            n_features: 2,
            model_performance: ModelPerformance {
                rmse: 1.0,
                mae: 0.8,
                r2: 0.5,
            },
        };
        write_artifact(&metadata, &dir.join(METADATA_FILE)).unwrap();
    }

    fn point_request() -> PointRequest {
        PointRequest {
            latitude: 16.52,
            longitude: 80.61,
            timestamp: "2024-03-06T08:30:00Z".to_string(),
        }
    }

    #[test]
    fn test_unready_context_behavior() {
        let context = ServingContext::unready();
        let now = Utc::now();

        let health = context.health(now);
        assert!(!health.model_loaded);
        assert_eq!(health.status, "healthy");

        assert!(matches!(
            context.predict_point(&point_request()).unwrap_err(),
            UcastError::NotReady
        ));
        assert!(matches!(context.model_info().unwrap_err(), UcastError::NotReady));
    }

    #[test]
    fn test_load_missing_artifacts_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServingContext::load(dir.path()).unwrap_err();
        assert!(matches!(err, UcastError::Load(_)));

        // initialize() degrades to unready instead of failing.
        let context = ServingContext::initialize(dir.path());
        assert!(!context.is_ready());
    }

    #[test]
    fn test_point_prediction_in_bounds_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_test_artifacts(dir.path());
        let context = ServingContext::load(dir.path()).unwrap();
        assert!(context.is_ready());

        let request = point_request();
        let a = context.predict_point(&request).unwrap();
        let b = context.predict_point(&request).unwrap();

        assert!((0.0..=100.0).contains(&a.prediction));
        assert_eq!(a.prediction, b.prediction);
        assert!(a.confidence == "high" || a.confidence == "medium");
        assert_eq!(a.factors.hour, 8);
        assert!(a.factors.is_peak_hour);
        assert_eq!(a.location.lat, request.latitude);
    }

    #[test]
    fn test_point_request_validation_precedes_readiness() {
        let dir = tempfile::tempdir().unwrap();
        write_test_artifacts(dir.path());
        let context = ServingContext::load(dir.path()).unwrap();

        let bad = PointRequest {
            latitude: 120.0,
            longitude: 80.6,
            timestamp: "2024-03-06T08:30:00Z".to_string(),
        };
        assert!(context.predict_point(&bad).unwrap_err().is_client_error());
    }

    #[test]
    fn test_route_prediction_spacing_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_test_artifacts(dir.path());
        let context = ServingContext::load(dir.path()).unwrap();

        let request = RouteRequest {
            waypoints: vec![
                Waypoint {
                    latitude: 16.50,
                    longitude: 80.60,
                },
                Waypoint {
                    latitude: 16.55,
                    longitude: 80.65,
                },
                Waypoint {
                    latitude: 16.60,
                    longitude: 80.70,
                },
            ],
        };
        let base = Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap();
        let response = context.predict_route(&request, base).unwrap();

        assert_eq!(response.summary.total_waypoints, 3);
        assert_eq!(response.route_predictions[0].timestamp, base.to_rfc3339());
        assert_eq!(
            response.route_predictions[2].timestamp,
            (base + Duration::minutes(10)).to_rfc3339()
        );
        assert!(response.summary.min_traffic <= response.summary.average_traffic);
        assert!(response.summary.average_traffic <= response.summary.max_traffic);

        let short = RouteRequest {
            waypoints: vec![Waypoint {
                latitude: 16.5,
                longitude: 80.6,
            }],
        };
        assert!(context.predict_route(&short, base).unwrap_err().is_client_error());
    }
}

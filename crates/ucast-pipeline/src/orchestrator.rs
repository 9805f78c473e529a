//! End-to-end training orchestration.
//!
//! Runs the full chain on one raw dataset: zoning, neighbor graph,
//! aggregation, scaling, windowing, the chronological split, training of
//! all three variants, ranking, and persistence of the winning serving
//! artifact set plus a JSON run report.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use ucast_core::{Observation, Result, TrafficTensor, UcastError};
use ucast_dataset::{
    aggregate, build_windows, graph_samples, per_zone_samples, split_chronological, MinMaxScaler,
    ModelData, WindowConfig,
};
use ucast_io::RawDataset;
use ucast_models::artifact::{
    write_artifact, FEATURE_SCALER_FILE, METADATA_FILE, MODEL_FILE, TARGET_SCALER_FILE,
};
use ucast_models::{
    build_model, ModelConfig, ModelKind, ModelMetadata, PredictiveModel, TrainingHistory,
};
use ucast_topology::{build_neighbor_graph, build_zones, ZoningConfig};
use ucast_validation::{compare, evaluate_performance, EvaluationCase, MetricRecord};

use crate::config::PipelineConfig;

/// File the run report is written to, beside the artifacts.
pub const REPORT_FILE: &str = "pipeline_report.json";

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub num_zones: usize,
    pub graph_edges: usize,
    pub tensor_timesteps: usize,
    pub num_features: usize,
    pub num_windows: usize,
    /// (train, validation, test) window counts
    pub split: (usize, usize, usize),
    pub histories: HashMap<String, TrainingHistory>,
    pub validation_ranking: Vec<MetricRecord>,
    pub test_ranking: Vec<MetricRecord>,
    /// Lowest test RMSE overall
    pub best_model: String,
    /// Best variant that can serve single-point requests
    pub serving_model: String,
    pub completed_at: DateTime<Utc>,
}

/// The training pipeline. Construction validates the configuration; `run`
/// executes every stage and persists the outcome.
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn run(&self, dataset: &RawDataset) -> Result<PipelineReport> {
        let config = &self.config;

        // 1. Spatial topology.
        info!("Stage 1/6: zoning {} samples", dataset.len());
        let zoning = build_zones(
            &dataset.points,
            &ZoningConfig {
                num_zones: config.num_zones,
                ..Default::default()
            },
        )?;
        let graph = build_neighbor_graph(&zoning.zones, config.neighbors);

        // 2. Aggregation into the dense tensor.
        info!("Stage 2/6: aggregating observations");
        let observations: Vec<Observation> = dataset
            .timestamps
            .iter()
            .zip(&zoning.labels)
            .zip(&dataset.features)
            .map(|((&timestamp, &zone), features)| {
                Observation::new(timestamp, zone, features.clone())
            })
            .collect();
        let tensor = aggregate(&observations, config.num_zones)?;

        // 3. Scaling. The target scaler is the feature scaler's target
        // column, so window targets and serving-side inverse scaling agree.
        info!("Stage 3/6: fitting scalers");
        let (t, z, f) = (
            tensor.num_timesteps(),
            tensor.num_zones(),
            tensor.num_features(),
        );
        if config.target_feature >= f {
            return Err(UcastError::config(format!(
                "target_feature {} out of range for {} features",
                config.target_feature, f
            )));
        }
        let flat: Array2<f32> = tensor
            .data
            .clone()
            .into_shape((t * z, f))
            .map_err(|e| UcastError::numerical(e.to_string()))?;
        let feature_scaler = MinMaxScaler::fit(flat.view())?;
        let target_scaler = MinMaxScaler {
            mins: vec![feature_scaler.mins[config.target_feature]],
            maxs: vec![feature_scaler.maxs[config.target_feature]],
        };
        let scaled = TrafficTensor::new(
            feature_scaler.transform_tensor(&tensor.data)?,
            tensor.timestamps.clone(),
        )?;

        // 4. Windows and the chronological split.
        info!("Stage 4/6: carving windows");
        let window_config = WindowConfig {
            sequence_length: config.sequence_length,
            horizon: config.horizon,
            target_feature: config.target_feature,
        };
        let windows = build_windows(&scaled, &window_config)?;
        let split = split_chronological(&windows);
        if split.train.is_empty() || split.validation.is_empty() || split.test.is_empty() {
            return Err(UcastError::numerical(format!(
                "{} windows is too few for a 70/15/15 split",
                windows.windows.len()
            )));
        }
        info!(
            "Split: {} train / {} validation / {} test windows",
            split.train.len(),
            split.validation.len(),
            split.test.len()
        );

        let seq_train = ModelData::Sequence(per_zone_samples(split.train));
        let seq_val = ModelData::Sequence(per_zone_samples(split.validation));
        let seq_test = ModelData::Sequence(per_zone_samples(split.test));
        let graph_train = ModelData::Graph(graph_samples(split.train));
        let graph_val = ModelData::Graph(graph_samples(split.validation));
        let graph_test = ModelData::Graph(graph_samples(split.test));
        let data_for = |kind: ModelKind| match kind {
            ModelKind::GraphRecurrent => (&graph_train, &graph_val, &graph_test),
            _ => (&seq_train, &seq_val, &seq_test),
        };

        // 5. Train all three variants.
        info!("Stage 5/6: training {} variants", ModelKind::all().len());
        let model_config = ModelConfig {
            sequence_length: config.sequence_length,
            num_features: f,
            num_zones: config.num_zones,
            dropout: config.dropout,
            learning_rate: config.learning_rate,
            seed: config.seed,
        };
        let mut models: Vec<(ModelKind, Box<dyn PredictiveModel>)> = Vec::new();
        let mut histories = HashMap::new();
        for kind in ModelKind::all() {
            info!("Training {kind} model");
            let mut model = build_model(kind, model_config.clone(), Some(&graph))?;
            let history = model.train(data_for(kind).0, config.epochs, config.batch_size)?;
            histories.insert(kind.as_str().to_string(), history);
            models.push((kind, model));
        }

        // 6. Rank, persist the winner, write the report.
        info!("Stage 6/6: evaluating and persisting");
        let validation_cases: Vec<EvaluationCase<'_>> = models
            .iter()
            .map(|(kind, model)| EvaluationCase {
                name: kind.as_str().to_string(),
                model: model.as_ref(),
                data: data_for(*kind).1,
            })
            .collect();
        let validation_ranking = compare(&validation_cases)?;

        let test_cases: Vec<EvaluationCase<'_>> = models
            .iter()
            .map(|(kind, model)| EvaluationCase {
                name: kind.as_str().to_string(),
                model: model.as_ref(),
                data: data_for(*kind).2,
            })
            .collect();
        let test_ranking = compare(&test_cases)?;

        let best_model = test_ranking[0].model_name.clone();

        // The serving path predicts single points, which the graph variant
        // cannot do; deploy the best sequence-family variant.
        let serving_kind = test_ranking
            .iter()
            .filter_map(|record| ModelKind::parse(&record.model_name).ok())
            .find(|kind| *kind != ModelKind::GraphRecurrent)
            .ok_or_else(|| UcastError::numerical("no deployable variant was trained"))?;
        if serving_kind.as_str() != best_model {
            warn!(
                "Best model {best_model} is not single-point servable; deploying {serving_kind}"
            );
        }

        let output_dir = Path::new(&config.output_dir);
        let (_, serving_model) = models
            .iter()
            .find(|(kind, _)| *kind == serving_kind)
            .expect("ranked model missing from the trained set");
        serving_model.save(&output_dir.join(MODEL_FILE))?;
        write_artifact(&feature_scaler, &output_dir.join(FEATURE_SCALER_FILE))?;
        write_artifact(&target_scaler, &output_dir.join(TARGET_SCALER_FILE))?;
        let metadata = ModelMetadata {
            model_type: serving_kind.as_str().to_string(),
            sequence_length: config.sequence_length,
            n_features: f,
            model_performance: evaluate_performance(
                serving_model.as_ref(),
                data_for(serving_kind).2,
            )?,
        };
        write_artifact(&metadata, &output_dir.join(METADATA_FILE))?;

        let report = PipelineReport {
            num_zones: config.num_zones,
            graph_edges: graph.edge_count(),
            tensor_timesteps: t,
            num_features: f,
            num_windows: windows.windows.len(),
            split: (split.train.len(), split.validation.len(), split.test.len()),
            histories,
            validation_ranking,
            test_ranking,
            best_model,
            serving_model: serving_kind.as_str().to_string(),
            completed_at: Utc::now(),
        };
        write_artifact(&report, &output_dir.join(REPORT_FILE))?;
        info!(
            "Pipeline complete: best={} serving={} artifacts in {}",
            report.best_model,
            report.serving_model,
            output_dir.display()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ucast_core::GeoPoint;
    use ucast_serving::{PointRequest, ServingContext};

    /// Three well-separated location clusters reporting hourly.
    fn fixture_dataset(hours: usize) -> RawDataset {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let centers = [(16.50, 80.60), (16.70, 80.80), (16.30, 80.40)];

        let mut dataset = RawDataset {
            points: Vec::new(),
            timestamps: Vec::new(),
            features: Vec::new(),
            feature_names: vec!["speed".to_string(), "volume".to_string()],
        };
        for hour in 0..hours {
            let timestamp = base + Duration::hours(hour as i64);
            for (c, &(lat, lon)) in centers.iter().enumerate() {
                for jitter in 0..2 {
                    let offset = jitter as f64 * 0.001;
                    dataset.points.push(GeoPoint::new(lat + offset, lon - offset));
                    dataset.timestamps.push(timestamp);
                    dataset.features.push(vec![
                        30.0 + (hour % 24) as f32 + c as f32 * 5.0 + jitter as f32,
                        100.0 + (hour % 12) as f32 * 10.0,
                    ]);
                }
            }
        }
        dataset
    }

    fn fast_config(output_dir: &Path) -> PipelineConfig {
        PipelineConfig {
            num_zones: 3,
            neighbors: 2,
            sequence_length: 6,
            horizon: 2,
            target_feature: 0,
            epochs: 2,
            batch_size: 8,
            learning_rate: 1e-3,
            dropout: 0.1,
            seed: 42,
            output_dir: output_dir.to_string_lossy().to_string(),
        }
    }

    #[test]
    fn test_end_to_end_run_and_serving_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TrainingPipeline::new(fast_config(dir.path())).unwrap();
        let report = pipeline.run(&fixture_dataset(30)).unwrap();

        // 30 timesteps, L=6, H=2 -> 23 windows -> 16/3/4.
        assert_eq!(report.num_windows, 23);
        assert_eq!(report.split, (16, 3, 4));
        assert_eq!(report.test_ranking.len(), 3);
        assert_eq!(report.histories.len(), 3);
        assert_eq!(report.graph_edges, 3 * 2);
        // Ranking is ascending by rmse.
        assert!(report.test_ranking[0].rmse <= report.test_ranking[1].rmse);
        assert!(report.test_ranking[1].rmse <= report.test_ranking[2].rmse);
        // The deployed variant can serve single points.
        assert_ne!(report.serving_model, "graph_recurrent");

        // The artifact set loads into a working serving context.
        let context = ServingContext::load(dir.path()).unwrap();
        assert!(context.is_ready());
        let response = context
            .predict_point(&PointRequest {
                latitude: 16.52,
                longitude: 80.61,
                timestamp: "2024-03-06T08:30:00Z".to_string(),
            })
            .unwrap();
        assert!((0.0..=100.0).contains(&response.prediction));

        let report_path = dir.path().join(REPORT_FILE);
        assert!(report_path.exists());
    }

    #[test]
    fn test_run_fails_cleanly_on_thin_data() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TrainingPipeline::new(fast_config(dir.path())).unwrap();
        // 7 timesteps cannot host L=6, H=2 windows.
        let err = pipeline.run(&fixture_dataset(7)).unwrap_err();
        assert!(matches!(err, UcastError::WindowUnderflow { .. }));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = PipelineConfig::default();
        config.horizon = 0;
        assert!(TrainingPipeline::new(config).is_err());
    }
}

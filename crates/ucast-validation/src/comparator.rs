//! Model evaluation and ranking.
//!
//! `evaluate` scores one trained model on held-out data; `compare` scores
//! a set of models and ranks them by ascending RMSE. Ties keep the input
//! iteration order (stable sort), so the first-listed model wins.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use ucast_core::Result;
use ucast_dataset::ModelData;
use ucast_models::{ModelPerformance, PredictiveModel};

use crate::metrics;

/// One evaluation outcome. Ordering by rmse ascending defines "best".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub model_name: String,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub timestamp: DateTime<Utc>,
}

/// A model paired with the adapted inputs/targets it evaluates on. The
/// graph variant consumes a different sample shape than the sequence
/// variants, so each case carries its own data.
pub struct EvaluationCase<'a> {
    pub name: String,
    pub model: &'a dyn PredictiveModel,
    pub data: &'a ModelData,
}

/// Evaluates one model, producing a `MetricRecord`.
pub fn evaluate(
    model: &dyn PredictiveModel,
    data: &ModelData,
    name: &str,
) -> Result<MetricRecord> {
    let predictions = model.predict(data)?;
    let targets = data.flat_targets();

    let record = MetricRecord {
        model_name: name.to_string(),
        rmse: metrics::rmse(&predictions, &targets)?,
        mae: metrics::mae(&predictions, &targets)?,
        mape: metrics::mape(&predictions, &targets)?,
        timestamp: Utc::now(),
    };
    info!(
        "Evaluated {}: rmse={:.4} mae={:.4} mape={:.2}%",
        record.model_name, record.rmse, record.mae, record.mape
    );
    Ok(record)
}

/// Computes the performance block persisted with an artifact.
pub fn evaluate_performance(model: &dyn PredictiveModel, data: &ModelData) -> Result<ModelPerformance> {
    let predictions = model.predict(data)?;
    let targets = data.flat_targets();
    Ok(ModelPerformance {
        rmse: metrics::rmse(&predictions, &targets)?,
        mae: metrics::mae(&predictions, &targets)?,
        r2: metrics::r_squared(&predictions, &targets)?,
    })
}

/// Evaluates every case in iteration order, then stable-sorts ascending
/// by RMSE.
pub fn compare(cases: &[EvaluationCase<'_>]) -> Result<Vec<MetricRecord>> {
    let mut records = Vec::with_capacity(cases.len());
    for case in cases {
        records.push(evaluate(case.model, case.data, &case.name)?);
    }
    records.sort_by(|a, b| {
        a.rmse
            .partial_cmp(&b.rmse)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};
    use std::path::Path;
    use ucast_dataset::SequenceDataset;
    use ucast_models::{ModelConfig, ModelKind, TrainingHistory};

    /// Stub model that always predicts a constant.
    #[derive(Debug)]
    struct ConstantModel {
        config: ModelConfig,
        value: f32,
    }

    impl ConstantModel {
        fn new(value: f32) -> Self {
            Self {
                config: ModelConfig::default(),
                value,
            }
        }
    }

    impl PredictiveModel for ConstantModel {
        fn kind(&self) -> ModelKind {
            ModelKind::Recurrent
        }

        fn config(&self) -> &ModelConfig {
            &self.config
        }

        fn train(
            &mut self,
            _data: &ModelData,
            _epochs: usize,
            _batch_size: usize,
        ) -> Result<TrainingHistory> {
            Ok(TrainingHistory::default())
        }

        fn predict(&self, data: &ModelData) -> Result<Vec<f32>> {
            Ok(vec![self.value; data.flat_targets().len()])
        }

        fn save(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn zero_target_data(n: usize) -> ModelData {
        ModelData::Sequence(SequenceDataset {
            inputs: Array3::zeros((n, 4, 1)),
            targets: Array1::zeros(n),
        })
    }

    #[test]
    fn test_evaluate_constant_model() {
        let model = ConstantModel::new(2.0);
        let data = zero_target_data(5);
        let record = evaluate(&model, &data, "constant").unwrap();
        assert_eq!(record.model_name, "constant");
        assert!((record.rmse - 2.0).abs() < 1e-9);
        assert!((record.mae - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_orders_by_ascending_rmse() {
        // Constant predictions against zero targets make rmse equal the
        // absolute constant: 2.0, 0.5, 1.0.
        let worst = ConstantModel::new(2.0);
        let best = ConstantModel::new(0.5);
        let middle = ConstantModel::new(1.0);
        let data = zero_target_data(8);

        let cases = vec![
            EvaluationCase {
                name: "worst".into(),
                model: &worst,
                data: &data,
            },
            EvaluationCase {
                name: "best".into(),
                model: &best,
                data: &data,
            },
            EvaluationCase {
                name: "middle".into(),
                model: &middle,
                data: &data,
            },
        ];

        let ranked = compare(&cases).unwrap();
        let names: Vec<&str> = ranked.iter().map(|r| r.model_name.as_str()).collect();
        assert_eq!(names, vec!["best", "middle", "worst"]);
    }

    #[test]
    fn test_compare_ties_keep_iteration_order() {
        let first = ConstantModel::new(1.0);
        let second = ConstantModel::new(-1.0); // same rmse against zeros
        let data = zero_target_data(4);

        let cases = vec![
            EvaluationCase {
                name: "first".into(),
                model: &first,
                data: &data,
            },
            EvaluationCase {
                name: "second".into(),
                model: &second,
                data: &data,
            },
        ];

        let ranked = compare(&cases).unwrap();
        assert_eq!(ranked[0].model_name, "first");
        assert_eq!(ranked[1].model_name, "second");
    }
}

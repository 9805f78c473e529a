//! # ucast-validation
//!
//! Accuracy metrics and the model comparator: RMSE, MAE, MAPE (epsilon
//! guarded) and R², plus a stable RMSE-ascending ranking over trained
//! variants.

pub mod comparator;
pub mod metrics;

pub use comparator::{compare, evaluate, evaluate_performance, EvaluationCase, MetricRecord};
pub use metrics::{mae, mape, r_squared, rmse};

//! # ucast-pipeline
//!
//! Orchestrates one full training run: raw dataset in, ranked models and
//! a deployable artifact set out. Stages run strictly in sequence; any
//! data error aborts the run without retrying.

pub mod config;
pub mod orchestrator;

pub use config::PipelineConfig;
pub use orchestrator::{PipelineReport, TrainingPipeline, REPORT_FILE};

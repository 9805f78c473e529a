//! # ucast-models
//!
//! The three predictive model variants behind one contract:
//! - `RecurrentSequenceModel` — stacked GRUs over each zone's sequence,
//!   no spatial structure;
//! - `GraphConvRecurrentModel` — per-timestep graph convolution over the
//!   neighbor graph, then a per-zone temporal GRU;
//! - `ConvRecurrentHybridModel` — 1-D convolutional front end, then
//!   stacked GRUs.
//!
//! Every variant trains with squared-error loss and Adam, applying exactly
//! one sequential parameter update per batch; gradient work inside a batch
//! may be reordered, the updates may not. `predict` is side-effect-free
//! and fans out across samples with rayon.
//!
//! All layer arithmetic is hand-rolled on `ndarray` — no GPU, no runtime
//! graph framework — so artifacts are plain JSON and inference is fully
//! deterministic.

pub mod artifact;
pub mod conv_recurrent;
pub mod graph_conv;
pub mod layers;
pub mod recurrent;

use std::path::Path;

use serde::{Deserialize, Serialize};
use ucast_core::{NeighborGraph, Result, UcastError};
use ucast_dataset::ModelData;

pub use artifact::{ModelMetadata, ModelPerformance};
pub use conv_recurrent::ConvRecurrentHybridModel;
pub use graph_conv::GraphConvRecurrentModel;
pub use recurrent::RecurrentSequenceModel;

/// Variant tag used by the factory; no runtime type inspection anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Recurrent,
    GraphRecurrent,
    ConvRecurrent,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Recurrent => "recurrent",
            ModelKind::GraphRecurrent => "graph_recurrent",
            ModelKind::ConvRecurrent => "conv_recurrent",
        }
    }

    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "recurrent" => Ok(ModelKind::Recurrent),
            "graph_recurrent" => Ok(ModelKind::GraphRecurrent),
            "conv_recurrent" => Ok(ModelKind::ConvRecurrent),
            other => Err(UcastError::config(format!("Unknown model type: {other}"))),
        }
    }

    pub fn all() -> [ModelKind; 3] {
        [
            ModelKind::Recurrent,
            ModelKind::GraphRecurrent,
            ModelKind::ConvRecurrent,
        ]
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture hyperparameters shared by all variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub sequence_length: usize,
    pub num_features: usize,
    pub num_zones: usize,
    pub dropout: f32,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sequence_length: 24,
            num_features: 5,
            num_zones: 30,
            dropout: 0.2,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

/// Per-epoch mean training loss.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f32>,
}

/// The uniform contract every variant satisfies.
///
/// `predict` returns one scalar per sequence sample; the graph variant
/// returns Z scalars per window in sample-major order, matching
/// `ModelData::flat_targets`.
pub trait PredictiveModel: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ModelKind;

    fn config(&self) -> &ModelConfig;

    fn train(
        &mut self,
        data: &ModelData,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainingHistory>;

    fn predict(&self, data: &ModelData) -> Result<Vec<f32>>;

    fn save(&self, path: &Path) -> Result<()>;
}

/// Constructs a fresh, untrained model of the requested variant.
///
/// The graph variant needs the neighbor graph; the others ignore it.
pub fn build_model(
    kind: ModelKind,
    config: ModelConfig,
    graph: Option<&NeighborGraph>,
) -> Result<Box<dyn PredictiveModel>> {
    match kind {
        ModelKind::Recurrent => Ok(Box::new(RecurrentSequenceModel::new(config))),
        ModelKind::ConvRecurrent => Ok(Box::new(ConvRecurrentHybridModel::new(config)?)),
        ModelKind::GraphRecurrent => {
            let graph = graph.ok_or_else(|| {
                UcastError::config("graph_recurrent model requires a neighbor graph")
            })?;
            Ok(Box::new(GraphConvRecurrentModel::new(config, graph)?))
        }
    }
}

/// Loads a persisted model, dispatching on the variant tag.
pub fn load_model(kind: ModelKind, path: &Path) -> Result<Box<dyn PredictiveModel>> {
    let file = std::fs::File::open(path)
        .map_err(|e| UcastError::load(format!("Cannot open {}: {e}", path.display())))?;
    let reader = std::io::BufReader::new(file);
    match kind {
        ModelKind::Recurrent => {
            let model: RecurrentSequenceModel = serde_json::from_reader(reader)
                .map_err(|e| UcastError::load(format!("Corrupt model artifact: {e}")))?;
            Ok(Box::new(model))
        }
        ModelKind::GraphRecurrent => {
            let model: GraphConvRecurrentModel = serde_json::from_reader(reader)
                .map_err(|e| UcastError::load(format!("Corrupt model artifact: {e}")))?;
            Ok(Box::new(model))
        }
        ModelKind::ConvRecurrent => {
            let model: ConvRecurrentHybridModel = serde_json::from_reader(reader)
                .map_err(|e| UcastError::load(format!("Corrupt model artifact: {e}")))?;
            Ok(Box::new(model))
        }
    }
}

/// Serializes a model to pretty JSON at `path`.
pub(crate) fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), value)?;
    Ok(())
}

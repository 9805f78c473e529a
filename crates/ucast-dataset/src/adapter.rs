//! Typed shape adapters between the window tensors and model inputs.
//!
//! The two sequence variants consume one (window, zone) pair per sample;
//! the graph variant consumes one whole window per sample and predicts all
//! zones at once. These structs carry the adapted arrays with named fields
//! so the shape contract is visible at the type level.

use ndarray::{Array1, Array2, Array3, Array4};

use crate::windows::Window;

/// Per-zone samples for the recurrent and hybrid variants.
///
/// `inputs` is (N, L, F) with N = windows * zones, window-major then zone;
/// `targets` holds the matching scalar per sample.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    pub inputs: Array3<f32>,
    pub targets: Array1<f32>,
}

/// Whole-window samples for the graph-convolutional variant.
///
/// `inputs` is (N, L, Z, F) with N = windows; `targets` is (N, Z).
#[derive(Debug, Clone)]
pub struct GraphDataset {
    pub inputs: Array4<f32>,
    pub targets: Array2<f32>,
}

/// Adapted data in whichever shape a model variant expects.
#[derive(Debug, Clone)]
pub enum ModelData {
    Sequence(SequenceDataset),
    Graph(GraphDataset),
}

impl ModelData {
    /// Number of supervised samples.
    pub fn num_samples(&self) -> usize {
        match self {
            ModelData::Sequence(d) => d.inputs.shape()[0],
            ModelData::Graph(d) => d.inputs.shape()[0],
        }
    }

    /// Targets flattened to match `PredictiveModel::predict` output order:
    /// one scalar per sequence sample, or Z scalars per graph sample in
    /// sample-major order.
    pub fn flat_targets(&self) -> Vec<f32> {
        match self {
            ModelData::Sequence(d) => d.targets.to_vec(),
            ModelData::Graph(d) => d.targets.iter().copied().collect(),
        }
    }
}

/// Adapts windows into per-zone sequence samples.
pub fn per_zone_samples(windows: &[Window]) -> SequenceDataset {
    let (l, z, f) = match windows.first() {
        Some(w) => {
            let s = w.input.shape();
            (s[0], s[1], s[2])
        }
        None => (0, 0, 0),
    };
    let n = windows.len() * z;

    let mut inputs = Array3::<f32>::zeros((n, l, f));
    let mut targets = Array1::<f32>::zeros(n);
    for (w, window) in windows.iter().enumerate() {
        for zone in 0..z {
            let sample = w * z + zone;
            for t in 0..l {
                for feat in 0..f {
                    inputs[[sample, t, feat]] = window.input[[t, zone, feat]];
                }
            }
            targets[sample] = window.target[zone];
        }
    }

    SequenceDataset { inputs, targets }
}

/// Adapts windows into whole-window graph samples.
pub fn graph_samples(windows: &[Window]) -> GraphDataset {
    let (l, z, f) = match windows.first() {
        Some(w) => {
            let s = w.input.shape();
            (s[0], s[1], s[2])
        }
        None => (0, 0, 0),
    };
    let n = windows.len();

    let mut inputs = Array4::<f32>::zeros((n, l, z, f));
    let mut targets = Array2::<f32>::zeros((n, z));
    for (w, window) in windows.iter().enumerate() {
        inputs
            .index_axis_mut(ndarray::Axis(0), w)
            .assign(&window.input);
        targets.row_mut(w).assign(&window.target);
    }

    GraphDataset { inputs, targets }
}

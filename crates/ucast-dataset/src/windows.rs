//! Supervised window carving and the chronological split.
//!
//! A window pairs an input sub-tensor of `sequence_length` timesteps with
//! the per-zone target feature snapshot taken `horizon - 1` steps after
//! the input ends. Windows slide by one timestep, so a tensor with T
//! timesteps yields exactly `T - L - H + 1` windows.

use log::info;
use ndarray::{Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use ucast_core::{Result, TrafficTensor, UcastError};

/// Window geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of consecutive timesteps fed as model input (L)
    pub sequence_length: usize,
    /// Timesteps between the end of the input and the target (H)
    pub horizon: usize,
    /// Feature column forecast by every model
    pub target_feature: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sequence_length: 24,
            horizon: 12,
            target_feature: 0,
        }
    }
}

/// One supervised sample: input L x Z x F, target Z.
#[derive(Debug, Clone)]
pub struct Window {
    pub input: Array3<f32>,
    pub target: Array1<f32>,
}

/// All windows carved from one tensor, in chronological order.
#[derive(Debug, Clone)]
pub struct WindowSet {
    pub windows: Vec<Window>,
    pub config: WindowConfig,
    pub num_zones: usize,
    pub num_features: usize,
}

/// Chronological partition of a window set. No window crosses a split
/// boundary and the order inside each partition is preserved; shuffling is
/// only permitted later, inside the training partition, for batch
/// construction.
#[derive(Debug)]
pub struct DatasetSplit<'a> {
    pub train: &'a [Window],
    pub validation: &'a [Window],
    pub test: &'a [Window],
}

/// Carves the tensor into supervised windows.
///
/// Fails with `WindowUnderflow` when the tensor has fewer than `L + H`
/// timesteps, and with a config error when the target feature index is out
/// of range.
pub fn build_windows(tensor: &TrafficTensor, config: &WindowConfig) -> Result<WindowSet> {
    let t = tensor.num_timesteps();
    let l = config.sequence_length;
    let h = config.horizon;

    if l == 0 || h == 0 {
        return Err(UcastError::config(
            "sequence_length and horizon must be greater than 0",
        ));
    }
    if config.target_feature >= tensor.num_features() {
        return Err(UcastError::config(format!(
            "target_feature {} out of range for {} features",
            config.target_feature,
            tensor.num_features()
        )));
    }
    if t < l + h {
        return Err(UcastError::WindowUnderflow {
            timesteps: t,
            required: l + h,
        });
    }

    let count = t - l - h + 1;
    let mut windows = Vec::with_capacity(count);
    for start in 0..count {
        let input = tensor
            .data
            .slice(ndarray::s![start..start + l, .., ..])
            .to_owned();
        let target = tensor
            .data
            .index_axis(Axis(0), start + l + h - 1)
            .index_axis(Axis(1), config.target_feature)
            .to_owned();
        windows.push(Window { input, target });
    }

    info!(
        "Carved {} windows (T={}, L={}, H={})",
        windows.len(),
        t,
        l,
        h
    );

    Ok(WindowSet {
        windows,
        config: config.clone(),
        num_zones: tensor.num_zones(),
        num_features: tensor.num_features(),
    })
}

/// Splits the ordered window list 70/15/15, rounding toward train.
pub fn split_chronological(set: &WindowSet) -> DatasetSplit<'_> {
    let n = set.windows.len();
    let train_end = (n as f64 * 0.70) as usize;
    let val_end = (n as f64 * 0.85) as usize;

    DatasetSplit {
        train: &set.windows[..train_end],
        validation: &set.windows[train_end..val_end],
        test: &set.windows[val_end..],
    }
}

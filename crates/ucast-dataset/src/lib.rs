//! # ucast-dataset
//!
//! The data-shaping middle of the pipeline: collapses irregular
//! observations into the dense time x zone x feature tensor, carves that
//! tensor into supervised windows with a chronological split, scales
//! features into the unit range, and adapts window tensors into the exact
//! shapes each model family consumes.

pub mod adapter;
pub mod aggregate;
pub mod scaler;
pub mod windows;

pub use adapter::{graph_samples, per_zone_samples, GraphDataset, ModelData, SequenceDataset};
pub use aggregate::aggregate;
pub use scaler::MinMaxScaler;
pub use windows::{build_windows, split_chronological, DatasetSplit, Window, WindowConfig, WindowSet};

//! Graph-convolutional recurrent model.
//!
//! Each timestep's zone features pass through two shared graph-convolution
//! steps (dense transform, then aggregation over the fixed neighbor
//! adjacency), the resulting per-zone hidden sequences run through one
//! shared GRU over the time axis, and a shared dense head projects each
//! zone's final state to a scalar. One sample is one whole window; the
//! model predicts all zones at once.
//!
//! The adjacency is the directed K-NN edge set plus self-loops,
//! row-normalized over each zone's out-neighbors. It is built once at
//! construction, shared across every sample and batch, and never
//! symmetrized.

use std::path::Path;

use log::info;
use ndarray::{s, Array2, Array3, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use ucast_core::{NeighborGraph, Result, UcastError};
use ucast_dataset::{GraphDataset, ModelData};

use crate::layers::{Dense, Gru};
use crate::{save_json, ModelConfig, ModelKind, PredictiveModel, TrainingHistory};

const GC_HIDDEN: usize = 32;

/// Row-normalized adjacency-with-self-loops over the directed edge set.
pub fn normalized_adjacency(graph: &NeighborGraph) -> Array2<f32> {
    let z = graph.zone_count();
    let mut adj = Array2::<f32>::zeros((z, z));
    for zone in 0..z {
        adj[[zone, zone]] = 1.0;
        for neighbor in graph.neighbors(zone) {
            adj[[zone, neighbor]] = 1.0;
        }
    }
    for mut row in adj.rows_mut() {
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    adj
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphConvRecurrentModel {
    config: ModelConfig,
    adjacency: Array2<f32>,
    gc1: Dense,
    gc2: Dense,
    gru: Gru,
    fc: Dense,
    step: usize,
    #[serde(skip)]
    rng: Option<StdRng>,
}

/// Per-timestep activations kept for the backward pass.
struct StepCache {
    x_t: Array2<f32>,
    a1: Array2<f32>,
    h1: Array2<f32>,
    a2: Array2<f32>,
}

impl GraphConvRecurrentModel {
    pub fn new(config: ModelConfig, graph: &NeighborGraph) -> Result<Self> {
        if graph.zone_count() != config.num_zones {
            return Err(UcastError::config(format!(
                "Neighbor graph has {} zones, config says {}",
                graph.zone_count(),
                config.num_zones
            )));
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let gc1 = Dense::new(config.num_features, GC_HIDDEN, true, &mut rng);
        let gc2 = Dense::new(GC_HIDDEN, GC_HIDDEN, true, &mut rng);
        let gru = Gru::new(GC_HIDDEN, GC_HIDDEN, &mut rng);
        let fc = Dense::new(GC_HIDDEN, 1, false, &mut rng);
        Ok(Self {
            config,
            adjacency: normalized_adjacency(graph),
            gc1,
            gc2,
            gru,
            fc,
            step: 0,
            rng: Some(rng),
        })
    }

    /// Spatial stage: (L, Z, F) -> (L, Z, hidden), caching per timestep.
    fn spatial_forward(&self, x: &ArrayView3<'_, f32>) -> (Array3<f32>, Vec<StepCache>) {
        let (l, z, _) = (x.shape()[0], x.shape()[1], x.shape()[2]);
        let mut stacked = Array3::zeros((l, z, GC_HIDDEN));
        let mut caches = Vec::with_capacity(l);
        for t in 0..l {
            let x_t = x.index_axis(Axis(0), t).to_owned();
            let a1 = self.gc1.forward_batch(&x_t);
            let h1 = self.adjacency.dot(&a1);
            let a2 = self.gc2.forward_batch(&h1);
            let h2 = self.adjacency.dot(&a2);
            stacked.index_axis_mut(Axis(0), t).assign(&h2);
            caches.push(StepCache { x_t, a1, h1, a2 });
        }
        (stacked, caches)
    }

    fn forward_inference(&self, x: &ArrayView3<'_, f32>) -> Vec<f32> {
        let (stacked, _) = self.spatial_forward(x);
        let l = stacked.shape()[0];
        let z = stacked.shape()[1];
        (0..z)
            .map(|zone| {
                let seq = stacked.slice(s![.., zone, ..]).to_owned();
                let h = self.gru.forward(&seq);
                let last = h.row(l - 1).to_owned();
                self.fc.forward(&last)[0]
            })
            .collect()
    }

    fn check_shape(&self, dataset: &GraphDataset) -> Result<()> {
        let shape = dataset.inputs.shape();
        if shape[1] != self.config.sequence_length
            || shape[2] != self.config.num_zones
            || shape[3] != self.config.num_features
        {
            return Err(UcastError::numerical(format!(
                "Expected windows of shape {}x{}x{}, got {}x{}x{}",
                self.config.sequence_length,
                self.config.num_zones,
                self.config.num_features,
                shape[1],
                shape[2],
                shape[3]
            )));
        }
        Ok(())
    }

    fn zero_grads(&mut self) {
        self.gc1.zero_grad();
        self.gc2.zero_grad();
        self.gru.zero_grad();
        self.fc.zero_grad();
    }

    fn adam_step(&mut self) {
        let lr = self.config.learning_rate;
        self.gc1.adam_step(lr, self.step);
        self.gc2.adam_step(lr, self.step);
        self.gru.adam_step(lr, self.step);
        self.fc.adam_step(lr, self.step);
    }
}

impl PredictiveModel for GraphConvRecurrentModel {
    fn kind(&self) -> ModelKind {
        ModelKind::GraphRecurrent
    }

    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn train(
        &mut self,
        data: &ModelData,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainingHistory> {
        let ModelData::Graph(dataset) = data else {
            return Err(UcastError::numerical(
                "graph_recurrent model expects whole-window graph samples",
            ));
        };
        self.check_shape(dataset)?;
        let n = dataset.inputs.shape()[0];
        if n == 0 {
            return Err(UcastError::numerical("no training samples"));
        }
        let l = self.config.sequence_length;
        let z = self.config.num_zones;

        let mut rng = self
            .rng
            .take()
            .unwrap_or_else(|| StdRng::seed_from_u64(self.config.seed));

        let mut history = TrainingHistory::default();
        let mut indices: Vec<usize> = (0..n).collect();

        for epoch in 0..epochs {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;

            for batch in indices.chunks(batch_size.max(1)) {
                self.zero_grads();
                // Mean over every scalar output in the batch.
                let scale = 2.0 / (batch.len() * z) as f32;

                for &i in batch {
                    let x = dataset.inputs.index_axis(Axis(0), i);
                    let (stacked, step_caches) = self.spatial_forward(&x);

                    // Temporal stage forward + head, per zone.
                    let mut dstacked = Array3::<f32>::zeros((l, z, GC_HIDDEN));
                    for zone in 0..z {
                        let seq = stacked.slice(s![.., zone, ..]).to_owned();
                        let (h, cache) = self.gru.forward_cached(&seq);
                        let last = h.row(l - 1).to_owned();
                        let out = self.fc.forward(&last);

                        let err = out[0] - dataset.targets[[i, zone]];
                        epoch_loss += err * err;

                        let g_last =
                            self.fc.backward(&last, &out, &ndarray::arr1(&[scale * err]));
                        let mut g_h = Array2::zeros((l, GC_HIDDEN));
                        g_h.row_mut(l - 1).assign(&g_last);
                        let dseq = self.gru.backward(&seq, &cache, &g_h);
                        dstacked.slice_mut(s![.., zone, ..]).assign(&dseq);
                    }

                    // Spatial stage backward, per timestep.
                    for (t, step) in step_caches.iter().enumerate() {
                        let dh2 = dstacked.index_axis(Axis(0), t).to_owned();
                        let da2 = self.adjacency.t().dot(&dh2);
                        let dh1 = self.gc2.backward_batch(&step.h1, &step.a2, &da2);
                        let da1 = self.adjacency.t().dot(&dh1);
                        self.gc1.backward_batch(&step.x_t, &step.a1, &da1);
                    }
                }

                self.step += 1;
                self.adam_step();
            }

            let mean = epoch_loss / (n * z) as f32;
            if !mean.is_finite() {
                self.rng = Some(rng);
                return Err(UcastError::numerical("training diverged (non-finite loss)"));
            }
            history.train_loss.push(mean);
            info!(
                "graph_recurrent epoch {}/{}: train_loss={:.6}",
                epoch + 1,
                epochs,
                mean
            );
        }

        self.rng = Some(rng);
        Ok(history)
    }

    fn predict(&self, data: &ModelData) -> Result<Vec<f32>> {
        let ModelData::Graph(dataset) = data else {
            return Err(UcastError::numerical(
                "graph_recurrent model expects whole-window graph samples",
            ));
        };
        self.check_shape(dataset)?;
        let n = dataset.inputs.shape()[0];
        let per_sample: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let x = dataset.inputs.index_axis(Axis(0), i);
                self.forward_inference(&x)
            })
            .collect();
        Ok(per_sample.into_iter().flatten().collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array4};

    fn test_graph() -> NeighborGraph {
        let mut graph = NeighborGraph::new(3);
        graph.add_edge(0, 1, 0.1);
        graph.add_edge(1, 0, 0.1);
        graph.add_edge(2, 1, 0.2);
        graph
    }

    fn toy_config() -> ModelConfig {
        ModelConfig {
            sequence_length: 4,
            num_features: 2,
            num_zones: 3,
            dropout: 0.0,
            learning_rate: 5e-3,
            seed: 42,
        }
    }

    fn toy_data(n: usize) -> ModelData {
        let inputs = Array4::from_shape_fn((n, 4, 3, 2), |(i, t, z, f)| {
            ((i * 5 + t * 3 + z * 2 + f) % 13) as f32 / 13.0
        });
        let targets = Array2::from_shape_fn((n, 3), |(i, z)| inputs[[i, 3, z, 0]]);
        ModelData::Graph(GraphDataset { inputs, targets })
    }

    #[test]
    fn test_adjacency_row_normalized_and_asymmetric() {
        let adj = normalized_adjacency(&test_graph());
        for row in adj.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        // Edge 2 -> 1 exists, 1 -> 2 does not; the asymmetry survives.
        assert!(adj[[2, 1]] > 0.0);
        assert_eq!(adj[[1, 2]], 0.0);
        // Self-loops are added for aggregation only.
        assert!(adj[[0, 0]] > 0.0);
    }

    #[test]
    fn test_zone_count_mismatch_rejected() {
        let config = ModelConfig {
            num_zones: 5,
            ..toy_config()
        };
        assert!(GraphConvRecurrentModel::new(config, &test_graph()).is_err());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = GraphConvRecurrentModel::new(toy_config(), &test_graph()).unwrap();
        let data = toy_data(30);
        let history = model.train(&data, 25, 8).unwrap();
        let first = history.train_loss[0];
        let last = *history.train_loss.last().unwrap();
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_predict_flattens_sample_major() {
        let model = GraphConvRecurrentModel::new(toy_config(), &test_graph()).unwrap();
        let data = toy_data(7);
        let preds = model.predict(&data).unwrap();
        assert_eq!(preds.len(), 7 * 3);
        assert_eq!(preds, model.predict(&data).unwrap());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut model = GraphConvRecurrentModel::new(toy_config(), &test_graph()).unwrap();
        let data = toy_data(12);
        model.train(&data, 2, 4).unwrap();
        model.save(&path).unwrap();

        let loaded = crate::load_model(ModelKind::GraphRecurrent, &path).unwrap();
        assert_eq!(model.predict(&data).unwrap(), loaded.predict(&data).unwrap());
    }
}

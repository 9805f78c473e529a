//! Stacked recurrent model over per-zone sequences.
//!
//! GRU(F -> 64) -> dropout -> GRU(64 -> 32, final state) -> dropout ->
//! dense(16, ReLU) -> dense(1). Operates on one zone's sequence at a time
//! and never sees the spatial graph.

use std::path::Path;

use log::info;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use ucast_core::{Result, UcastError};
use ucast_dataset::{ModelData, SequenceDataset};

use crate::layers::{Dense, Dropout, Gru};
use crate::{save_json, ModelConfig, ModelKind, PredictiveModel, TrainingHistory};

const HIDDEN1: usize = 64;
const HIDDEN2: usize = 32;
const DENSE: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
pub struct RecurrentSequenceModel {
    config: ModelConfig,
    gru1: Gru,
    gru2: Gru,
    fc1: Dense,
    fc2: Dense,
    dropout: Dropout,
    step: usize,
    #[serde(skip)]
    rng: Option<StdRng>,
}

impl RecurrentSequenceModel {
    pub fn new(config: ModelConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let gru1 = Gru::new(config.num_features, HIDDEN1, &mut rng);
        let gru2 = Gru::new(HIDDEN1, HIDDEN2, &mut rng);
        let fc1 = Dense::new(HIDDEN2, DENSE, true, &mut rng);
        let fc2 = Dense::new(DENSE, 1, false, &mut rng);
        let dropout = Dropout::new(config.dropout);
        Self {
            config,
            gru1,
            gru2,
            fc1,
            fc2,
            dropout,
            step: 0,
            rng: Some(rng),
        }
    }

    fn forward_inference(&self, x: &Array2<f32>) -> f32 {
        let h1 = self.gru1.forward(x);
        let h2 = self.gru2.forward(&h1);
        let last = h2.row(h2.nrows() - 1).to_owned();
        let f1 = self.fc1.forward(&last);
        self.fc2.forward(&f1)[0]
    }

    fn check_shape(&self, dataset: &SequenceDataset) -> Result<()> {
        let shape = dataset.inputs.shape();
        if shape[1] != self.config.sequence_length || shape[2] != self.config.num_features {
            return Err(UcastError::numerical(format!(
                "Expected samples of shape {}x{}, got {}x{}",
                self.config.sequence_length, self.config.num_features, shape[1], shape[2]
            )));
        }
        Ok(())
    }

    fn zero_grads(&mut self) {
        self.gru1.zero_grad();
        self.gru2.zero_grad();
        self.fc1.zero_grad();
        self.fc2.zero_grad();
    }

    fn adam_step(&mut self) {
        let lr = self.config.learning_rate;
        self.gru1.adam_step(lr, self.step);
        self.gru2.adam_step(lr, self.step);
        self.fc1.adam_step(lr, self.step);
        self.fc2.adam_step(lr, self.step);
    }
}

impl PredictiveModel for RecurrentSequenceModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Recurrent
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
        let ModelData::Sequence(dataset) = data else {
            return Err(UcastError::numerical(
                "recurrent model expects per-zone sequence samples",
            ));
        };
        self.check_shape(dataset)?;
        let n = dataset.inputs.shape()[0];
        if n == 0 {
            return Err(UcastError::numerical("no training samples"));
        }

        // Own the RNG for the duration of the epoch loop so dropout masks
        // and shuffles draw from one deterministic stream.
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
                let scale = 2.0 / batch.len() as f32;

                for &i in batch {
                    let x = dataset.inputs.index_axis(Axis(0), i).to_owned();
                    let target = dataset.targets[i];

                    let (h1, c1) = self.gru1.forward_cached(&x);
                    let m1 = self.dropout.mask2((h1.nrows(), h1.ncols()), &mut rng);
                    let h1d = &h1 * &m1;
                    let (h2, c2) = self.gru2.forward_cached(&h1d);
                    let last = h2.row(h2.nrows() - 1).to_owned();
                    let m2 = self.dropout.mask1(last.len(), &mut rng);
                    let lastd = &last * &m2;
                    let f1 = self.fc1.forward(&lastd);
                    let out = self.fc2.forward(&f1);

                    let err = out[0] - target;
                    epoch_loss += err * err;

                    let g_out = ndarray::arr1(&[scale * err]);
                    let g_f1 = self.fc2.backward(&f1, &out, &g_out);
                    let g_lastd = self.fc1.backward(&lastd, &f1, &g_f1);
                    let g_last = &g_lastd * &m2;
                    let mut g_h2 = Array2::zeros(h2.raw_dim());
                    g_h2.row_mut(h2.nrows() - 1).assign(&g_last);
                    let g_h1d = self.gru2.backward(&h1d, &c2, &g_h2);
                    let g_h1 = &g_h1d * &m1;
                    self.gru1.backward(&x, &c1, &g_h1);
                }

                // One sequential parameter update per batch.
                self.step += 1;
                self.adam_step();
            }

            let mean = epoch_loss / n as f32;
            if !mean.is_finite() {
                self.rng = Some(rng);
                return Err(UcastError::numerical("training diverged (non-finite loss)"));
            }
            history.train_loss.push(mean);
            info!(
                "recurrent epoch {}/{}: train_loss={:.6}",
                epoch + 1,
                epochs,
                mean
            );
        }

        self.rng = Some(rng);
        Ok(history)
    }

    fn predict(&self, data: &ModelData) -> Result<Vec<f32>> {
        let ModelData::Sequence(dataset) = data else {
            return Err(UcastError::numerical(
                "recurrent model expects per-zone sequence samples",
            ));
        };
        self.check_shape(dataset)?;
        let n = dataset.inputs.shape()[0];
        Ok((0..n)
            .into_par_iter()
            .map(|i| {
                let x = dataset.inputs.index_axis(Axis(0), i).to_owned();
                self.forward_inference(&x)
            })
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

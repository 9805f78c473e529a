//! Convolutional-recurrent hybrid model.
//!
//! conv1d(F -> 64, k=3) -> conv1d(64 -> 32, k=3) -> max-pool(2) ->
//! dropout -> GRU(32 -> 64) -> dropout -> GRU(64 -> 32, final state) ->
//! dropout -> dense(16, ReLU) -> dense(1). The convolutional front end
//! extracts local temporal patterns and halves the sequence before the
//! recurrent stage. No spatial graph involved.

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

use crate::layers::{Conv1d, Dense, Dropout, Gru, MaxPool1d};
use crate::{save_json, ModelConfig, ModelKind, PredictiveModel, TrainingHistory};

const CONV1_FILTERS: usize = 64;
const CONV2_FILTERS: usize = 32;
const KERNEL: usize = 3;
const POOL: usize = 2;
const HIDDEN1: usize = 64;
const HIDDEN2: usize = 32;
const DENSE: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvRecurrentHybridModel {
    config: ModelConfig,
    conv1: Conv1d,
    conv2: Conv1d,
    pool: MaxPool1d,
    gru1: Gru,
    gru2: Gru,
    fc1: Dense,
    fc2: Dense,
    dropout: Dropout,
    step: usize,
    #[serde(skip)]
    rng: Option<StdRng>,
}

impl ConvRecurrentHybridModel {
    pub fn new(config: ModelConfig) -> Result<Self> {
        // Two valid k=3 convolutions plus pool-by-2 need at least 6 steps.
        let after_convs = config
            .sequence_length
            .checked_sub(2 * (KERNEL - 1))
            .unwrap_or(0);
        if after_convs / POOL == 0 {
            return Err(UcastError::config(format!(
                "sequence_length {} too short for the convolutional front end (need >= {})",
                config.sequence_length,
                2 * (KERNEL - 1) + POOL
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let conv1 = Conv1d::new(config.num_features, CONV1_FILTERS, KERNEL, &mut rng);
        let conv2 = Conv1d::new(CONV1_FILTERS, CONV2_FILTERS, KERNEL, &mut rng);
        let gru1 = Gru::new(CONV2_FILTERS, HIDDEN1, &mut rng);
        let gru2 = Gru::new(HIDDEN1, HIDDEN2, &mut rng);
        let fc1 = Dense::new(HIDDEN2, DENSE, true, &mut rng);
        let fc2 = Dense::new(DENSE, 1, false, &mut rng);
        let dropout = Dropout::new(config.dropout);
        Ok(Self {
            config,
            conv1,
            conv2,
            pool: MaxPool1d::new(POOL),
            gru1,
            gru2,
            fc1,
            fc2,
            dropout,
            step: 0,
            rng: Some(rng),
        })
    }

    fn forward_inference(&self, x: &Array2<f32>) -> f32 {
        let c1 = self.conv1.forward(x);
        let c2 = self.conv2.forward(&c1);
        let (p, _) = self.pool.forward(&c2);
        let h1 = self.gru1.forward(&p);
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
        self.conv1.zero_grad();
        self.conv2.zero_grad();
        self.gru1.zero_grad();
        self.gru2.zero_grad();
        self.fc1.zero_grad();
        self.fc2.zero_grad();
    }

    fn adam_step(&mut self) {
        let lr = self.config.learning_rate;
        self.conv1.adam_step(lr, self.step);
        self.conv2.adam_step(lr, self.step);
        self.gru1.adam_step(lr, self.step);
        self.gru2.adam_step(lr, self.step);
        self.fc1.adam_step(lr, self.step);
        self.fc2.adam_step(lr, self.step);
    }
}

impl PredictiveModel for ConvRecurrentHybridModel {
    fn kind(&self) -> ModelKind {
        ModelKind::ConvRecurrent
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
                "conv_recurrent model expects per-zone sequence samples",
            ));
        };
        self.check_shape(dataset)?;
        let n = dataset.inputs.shape()[0];
        if n == 0 {
            return Err(UcastError::numerical("no training samples"));
        }

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

                    let (c1, cc1) = self.conv1.forward_cached(&x);
                    let (c2, cc2) = self.conv2.forward_cached(&c1);
                    let (p, argmax) = self.pool.forward(&c2);
                    let m0 = self.dropout.mask2((p.nrows(), p.ncols()), &mut rng);
                    let pd = &p * &m0;
                    let (h1, ch1) = self.gru1.forward_cached(&pd);
                    let m1 = self.dropout.mask2((h1.nrows(), h1.ncols()), &mut rng);
                    let h1d = &h1 * &m1;
                    let (h2, ch2) = self.gru2.forward_cached(&h1d);
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
                    let g_h1d = self.gru2.backward(&h1d, &ch2, &g_h2);
                    let g_h1 = &g_h1d * &m1;
                    let g_pd = self.gru1.backward(&pd, &ch1, &g_h1);
                    let g_p = &g_pd * &m0;
                    let g_c2 = self.pool.backward(c2.nrows(), &argmax, &g_p);
                    let g_c1 = self.conv2.backward(c1.nrows(), &cc2, &g_c2);
                    self.conv1.backward(x.nrows(), &cc1, &g_c1);
                }

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
                "conv_recurrent epoch {}/{}: train_loss={:.6}",
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
                "conv_recurrent model expects per-zone sequence samples",
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    fn toy_config() -> ModelConfig {
        ModelConfig {
            sequence_length: 8,
            num_features: 2,
            num_zones: 1,
            dropout: 0.0,
            learning_rate: 5e-3,
            seed: 42,
        }
    }

    fn toy_data(n: usize) -> ModelData {
        let inputs = Array3::from_shape_fn((n, 8, 2), |(i, t, f)| {
            ((i * 3 + t * 5 + f) % 9) as f32 / 9.0
        });
        let targets = Array1::from_shape_fn(n, |i| inputs[[i, 7, 1]]);
        ModelData::Sequence(SequenceDataset { inputs, targets })
    }

    #[test]
    fn test_sequence_too_short_rejected() {
        let config = ModelConfig {
            sequence_length: 5,
            ..toy_config()
        };
        assert!(ConvRecurrentHybridModel::new(config).is_err());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = ConvRecurrentHybridModel::new(toy_config()).unwrap();
        let data = toy_data(48);
        let history = model.train(&data, 25, 8).unwrap();
        let first = history.train_loss[0];
        let last = *history.train_loss.last().unwrap();
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_predict_deterministic() {
        let model = ConvRecurrentHybridModel::new(toy_config()).unwrap();
        let data = toy_data(10);
        let a = model.predict(&data).unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(a, model.predict(&data).unwrap());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut model = ConvRecurrentHybridModel::new(toy_config()).unwrap();
        let data = toy_data(16);
        model.train(&data, 2, 8).unwrap();
        model.save(&path).unwrap();

        let loaded = crate::load_model(ModelKind::ConvRecurrent, &path).unwrap();
        assert_eq!(model.predict(&data).unwrap(), loaded.predict(&data).unwrap());
    }
}

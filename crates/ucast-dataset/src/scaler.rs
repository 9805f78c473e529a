//! Per-feature min/max scaling.
//!
//! Two scaler instances travel with every model artifact: one fitted on
//! the flattened (T*Z) x F feature matrix, one on the target feature
//! column. Zero-range columns map to 0 instead of dividing by zero.

use ndarray::{Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use ucast_core::{Result, UcastError};

/// Min/max scaler into [0, 1], one (min, max) pair per feature column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub mins: Vec<f32>,
    pub maxs: Vec<f32>,
}

impl MinMaxScaler {
    /// Fits the scaler on a samples x features matrix.
    pub fn fit(data: ArrayView2<'_, f32>) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(UcastError::numerical("Cannot fit scaler on empty matrix"));
        }

        let mut mins = vec![f32::MAX; data.ncols()];
        let mut maxs = vec![f32::MIN; data.ncols()];
        for row in data.rows() {
            for (c, &value) in row.iter().enumerate() {
                mins[c] = mins[c].min(value);
                maxs[c] = maxs[c].max(value);
            }
        }
        Ok(Self { mins, maxs })
    }

    pub fn num_features(&self) -> usize {
        self.mins.len()
    }

    /// Scales one value of column `col` into [0, 1].
    pub fn transform_value(&self, col: usize, value: f32) -> f32 {
        let range = self.maxs[col] - self.mins[col];
        if range > 0.0 {
            (value - self.mins[col]) / range
        } else {
            0.0
        }
    }

    /// Maps a scaled value of column `col` back to original units.
    pub fn inverse_value(&self, col: usize, value: f32) -> f32 {
        let range = self.maxs[col] - self.mins[col];
        if range > 0.0 {
            value * range + self.mins[col]
        } else {
            self.mins[col]
        }
    }

    /// Scales a samples x features matrix column-wise.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for mut row in out.rows_mut() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.transform_value(c, *value);
            }
        }
        Ok(out)
    }

    /// Scales a T x Z x F tensor feature-wise, treating (T, Z) as samples.
    pub fn transform_tensor(&self, data: &Array3<f32>) -> Result<Array3<f32>> {
        self.check_width(data.shape()[2])?;
        let mut out = data.clone();
        for value in out.indexed_iter_mut() {
            let ((_, _, f), v) = value;
            *v = self.transform_value(f, *v);
        }
        Ok(out)
    }

    fn check_width(&self, ncols: usize) -> Result<()> {
        if ncols != self.num_features() {
            return Err(UcastError::numerical(format!(
                "Scaler fitted on {} features, got {}",
                self.num_features(),
                ncols
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_roundtrip() {
        let data = array![[0.0, 10.0], [5.0, 20.0], [10.0, 30.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();

        let scaled = scaler.transform(data.view()).unwrap();
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[2, 0]], 1.0);
        assert_eq!(scaled[[1, 1]], 0.5);

        for r in 0..3 {
            for c in 0..2 {
                let back = scaler.inverse_value(c, scaled[[r, c]]);
                assert!((back - data[[r, c]]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_zero_range_column_maps_to_zero() {
        let data = array![[7.0, 1.0], [7.0, 2.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 0]], 0.0);
        // The inverse of a degenerate column is its constant value.
        assert_eq!(scaler.inverse_value(0, 0.0), 7.0);
    }

    #[test]
    fn test_width_mismatch() {
        let data = array![[0.0, 10.0], [5.0, 20.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();
        let wrong = array![[1.0], [2.0]];
        assert!(scaler.transform(wrong.view()).is_err());
    }
}

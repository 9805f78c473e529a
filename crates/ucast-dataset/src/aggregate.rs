//! Temporal aggregation of observations into a dense tensor.
//!
//! Groups observations by (timestamp, zone) and reduces each group with
//! the arithmetic mean per feature column. The sorted, deduplicated
//! timestamp list forms the T axis. Any (timestep, zone) pair with no
//! contributing observation stays at the zero vector — a documented
//! approximation the downstream models are calibrated against, so it must
//! not be replaced with interpolation.

use std::collections::BTreeSet;

use log::{info, warn};
use ndarray::{Array2, Array3};
use ucast_core::{Observation, Result, TrafficTensor, UcastError};

/// Aggregates observations into a T x Z x F tensor.
///
/// Fails with `EmptyDataset` when no observations are supplied.
pub fn aggregate(observations: &[Observation], num_zones: usize) -> Result<TrafficTensor> {
    if observations.is_empty() {
        return Err(UcastError::EmptyDataset);
    }

    let num_features = observations[0].features.len();
    if num_features == 0 {
        return Err(UcastError::numerical("Observations carry no features"));
    }

    for obs in observations {
        if obs.zone >= num_zones {
            return Err(UcastError::numerical(format!(
                "Observation zone label {} out of range for {} zones",
                obs.zone, num_zones
            )));
        }
        if obs.features.len() != num_features {
            return Err(UcastError::numerical(format!(
                "Inconsistent feature dimension: expected {}, got {}",
                num_features,
                obs.features.len()
            )));
        }
    }

    // Sorted, deduplicated timestamp axis.
    let timestamps: Vec<_> = observations
        .iter()
        .map(|obs| obs.timestamp)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let num_timesteps = timestamps.len();

    let mut data = Array3::<f32>::zeros((num_timesteps, num_zones, num_features));
    let mut counts = Array2::<u32>::zeros((num_timesteps, num_zones));

    for obs in observations {
        // Binary search is exact: every observation timestamp is on the axis.
        let t = timestamps
            .binary_search(&obs.timestamp)
            .expect("observation timestamp missing from axis");
        counts[[t, obs.zone]] += 1;
        for (f, &value) in obs.features.iter().enumerate() {
            data[[t, obs.zone, f]] += value;
        }
    }

    let mut empty_cells = 0usize;
    for t in 0..num_timesteps {
        for z in 0..num_zones {
            let n = counts[[t, z]];
            if n > 1 {
                for f in 0..num_features {
                    data[[t, z, f]] /= n as f32;
                }
            } else if n == 0 {
                // Cell stays zero-filled.
                empty_cells += 1;
            }
        }
    }

    if empty_cells > 0 {
        warn!(
            "{} of {} (timestep, zone) cells have no observations; zero-filled",
            empty_cells,
            num_timesteps * num_zones
        );
    }
    info!(
        "Aggregated {} observations into tensor {}x{}x{}",
        observations.len(),
        num_timesteps,
        num_zones,
        num_features
    );

    TrafficTensor::new(data, timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = aggregate(&[], 4).unwrap_err();
        assert!(matches!(err, UcastError::EmptyDataset));
    }

    #[test]
    fn test_group_mean_per_cell() {
        let observations = vec![
            Observation::new(ts(0), 0, vec![10.0, 100.0]),
            Observation::new(ts(0), 0, vec![20.0, 200.0]),
            Observation::new(ts(1), 1, vec![5.0, 50.0]),
        ];
        let tensor = aggregate(&observations, 2).unwrap();

        assert_eq!(tensor.num_timesteps(), 2);
        assert_eq!(tensor.num_zones(), 2);
        assert_eq!(tensor.num_features(), 2);
        assert_eq!(tensor.data[[0, 0, 0]], 15.0);
        assert_eq!(tensor.data[[0, 0, 1]], 150.0);
        assert_eq!(tensor.data[[1, 1, 0]], 5.0);
    }

    #[test]
    fn test_missing_cell_is_zero_filled() {
        // Zone 3 never reports at timestep 7; the cell must come back as
        // the zero vector without raising.
        let mut observations = Vec::new();
        for hour in 0..10 {
            for zone in 0..4 {
                if hour == 7 && zone == 3 {
                    continue;
                }
                observations.push(Observation::new(ts(hour), zone, vec![1.0, 2.0, 3.0]));
            }
        }
        let tensor = aggregate(&observations, 4).unwrap();

        assert_eq!(tensor.data[[7, 3, 0]], 0.0);
        assert_eq!(tensor.data[[7, 3, 1]], 0.0);
        assert_eq!(tensor.data[[7, 3, 2]], 0.0);
        // A populated neighbor cell is untouched.
        assert_eq!(tensor.data[[7, 2, 0]], 1.0);
    }

    #[test]
    fn test_timestamp_axis_sorted_and_deduplicated() {
        let observations = vec![
            Observation::new(ts(5), 0, vec![1.0]),
            Observation::new(ts(1), 0, vec![2.0]),
            Observation::new(ts(5), 1, vec![3.0]),
            Observation::new(ts(3), 0, vec![4.0]),
        ];
        let tensor = aggregate(&observations, 2).unwrap();

        assert_eq!(tensor.timestamps, vec![ts(1), ts(3), ts(5)]);
        assert_eq!(tensor.data[[0, 0, 0]], 2.0);
        assert_eq!(tensor.data[[2, 1, 0]], 3.0);
    }

    #[test]
    fn test_zone_label_out_of_range() {
        let observations = vec![Observation::new(ts(0), 9, vec![1.0])];
        assert!(aggregate(&observations, 4).is_err());
    }
}

//! K-means zoning of raw coordinate samples.
//!
//! Partitions the observation coordinates into a fixed number of zones by
//! iterative centroid refinement. Initialization is deterministic
//! farthest-point seeding rather than random restarts, so repeated runs on
//! identical input produce identical zones.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use ucast_core::{GeoPoint, Result, UcastError, Zone};

/// Zoning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoningConfig {
    /// Number of zones to partition samples into
    pub num_zones: usize,
    /// Iteration cap for centroid refinement
    pub max_iterations: usize,
    /// Convergence threshold on the largest centroid shift (degrees)
    pub tolerance: f64,
}

impl Default for ZoningConfig {
    fn default() -> Self {
        Self {
            num_zones: 30,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Result of a zoning run: Z zones plus a per-sample zone label.
#[derive(Debug, Clone)]
pub struct Zoning {
    pub zones: Vec<Zone>,
    pub labels: Vec<usize>,
}

/// Partitions coordinate samples into `config.num_zones` zones.
///
/// Fails with `InsufficientData` when there are fewer samples than zones.
pub fn build_zones(samples: &[GeoPoint], config: &ZoningConfig) -> Result<Zoning> {
    let k = config.num_zones;
    if k == 0 {
        return Err(UcastError::config("num_zones must be greater than 0"));
    }
    if samples.len() < k {
        return Err(UcastError::InsufficientData {
            required: k,
            actual: samples.len(),
        });
    }

    let mut centroids = init_centroids(samples, k);
    let mut labels = vec![0usize; samples.len()];

    for iteration in 0..config.max_iterations {
        // Assignment: nearest current centroid, ties to the lowest index.
        for (i, sample) in samples.iter().enumerate() {
            labels[i] = nearest_centroid(sample, &centroids);
        }

        // Update: group means; an empty zone keeps its previous centroid.
        let mut sums = vec![(0.0f64, 0.0f64); k];
        let mut counts = vec![0usize; k];
        for (sample, &label) in samples.iter().zip(labels.iter()) {
            sums[label].0 += sample.lat;
            sums[label].1 += sample.lon;
            counts[label] += 1;
        }

        let mut max_shift = 0.0f64;
        for z in 0..k {
            if counts[z] == 0 {
                continue;
            }
            let updated = GeoPoint::new(
                sums[z].0 / counts[z] as f64,
                sums[z].1 / counts[z] as f64,
            );
            max_shift = max_shift.max(centroids[z].distance_to(&updated));
            centroids[z] = updated;
        }

        if max_shift < config.tolerance {
            debug!("Zoning converged after {} iterations", iteration + 1);
            break;
        }
    }

    // Final assignment against the converged centroids.
    for (i, sample) in samples.iter().enumerate() {
        labels[i] = nearest_centroid(sample, &centroids);
    }

    info!(
        "Partitioned {} samples into {} zones",
        samples.len(),
        k
    );

    let zones = centroids
        .into_iter()
        .enumerate()
        .map(|(id, centroid)| Zone { id, centroid })
        .collect();

    Ok(Zoning { zones, labels })
}

/// Deterministic farthest-point seeding: the first sample seeds zone 0,
/// each further centroid is the sample farthest from all chosen so far.
fn init_centroids(samples: &[GeoPoint], k: usize) -> Vec<GeoPoint> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(samples[0]);

    let mut min_sq_dist = vec![f64::MAX; samples.len()];

    while centroids.len() < k {
        let last = *centroids.last().expect("at least one centroid");
        for (i, sample) in samples.iter().enumerate() {
            let d = last.distance_to(sample);
            let sq = d * d;
            if sq < min_sq_dist[i] {
                min_sq_dist[i] = sq;
            }
        }

        // With fewer distinct points than zones this picks a repeat, which
        // leaves the surplus zones empty but still labelled.
        let far_idx = min_sq_dist
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        centroids.push(samples[far_idx]);
    }

    centroids
}

/// Index of the nearest centroid; the strict `<` keeps ties at the lowest
/// zone index.
fn nearest_centroid(sample: &GeoPoint, centroids: &[GeoPoint]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::MAX;
    for (z, centroid) in centroids.iter().enumerate() {
        let d = sample.distance_to(centroid);
        if d < best_dist {
            best_dist = d;
            best = z;
        }
    }
    best
}

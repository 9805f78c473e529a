//! Core data model shared by every pipeline stage.
//!
//! The pipeline owns these types: raw `Observation`s flow in, the topology
//! builder produces `Zone`s and a `NeighborGraph`, and aggregation turns
//! the observation stream into a dense `TrafficTensor`.

use chrono::{DateTime, Utc};
use ndarray::Array3;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, UcastError};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Euclidean distance in degree space.
    ///
    /// The whole pipeline works in raw degree distance (zoning, K-NN,
    /// serving adjustments); conversion to km happens only at the response
    /// boundary.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }

    /// Validates coordinate ranges for client-supplied points.
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(UcastError::validation(format!(
                "Invalid coordinates: ({}, {})",
                self.lat, self.lon
            )));
        }
        Ok(())
    }
}

/// A single traffic observation after zone assignment.
///
/// Immutable once produced; consumed exactly once during aggregation. The
/// zone label is derived by the topology builder, not part of raw input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub zone: usize,
    pub features: Vec<f32>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, zone: usize, features: Vec<f32>) -> Self {
        Self {
            timestamp,
            zone,
            features,
        }
    }
}

/// A spatial partition unit: integer label plus centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: usize,
    pub centroid: GeoPoint,
}

/// Directed K-nearest-neighbor adjacency over zone centroids.
///
/// Each zone has exactly k outgoing edges when more than k+1 zones exist
/// (all-others otherwise). The relation is not symmetric and is never
/// symmetrized: z1 -> z2 does not imply z2 -> z1. The base edge set has no
/// self-loops. Edge weights carry the centroid distance.
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    graph: DiGraph<usize, f64>,
}

impl NeighborGraph {
    /// Creates a graph with one node per zone and no edges yet.
    ///
    /// Node indices coincide with zone ids because nodes are added in id
    /// order.
    pub fn new(zone_count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(zone_count, 0);
        for id in 0..zone_count {
            graph.add_node(id);
        }
        Self { graph }
    }

    pub fn add_edge(&mut self, from: usize, to: usize, distance: f64) {
        self.graph
            .add_edge(NodeIndex::new(from), NodeIndex::new(to), distance);
    }

    pub fn zone_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Out-neighbors of a zone, in insertion order.
    pub fn neighbors(&self, zone: usize) -> Vec<usize> {
        self.graph
            .neighbors(NodeIndex::new(zone))
            .map(|n| n.index())
            .collect()
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.graph
            .find_edge(NodeIndex::new(from), NodeIndex::new(to))
            .is_some()
    }

    pub fn has_self_loops(&self) -> bool {
        (0..self.zone_count()).any(|z| self.has_edge(z, z))
    }
}

/// Dense time-major tensor of aggregated observations, shape T x Z x F.
///
/// Every (timestep, zone) cell is populated; cells with no source
/// observation hold the zero vector. That silent fallback is part of the
/// data contract, not an error.
#[derive(Debug, Clone)]
pub struct TrafficTensor {
    pub data: Array3<f32>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl TrafficTensor {
    pub fn new(data: Array3<f32>, timestamps: Vec<DateTime<Utc>>) -> Result<Self> {
        if data.shape()[0] != timestamps.len() {
            return Err(UcastError::numerical(format!(
                "Tensor has {} timesteps but {} timestamps",
                data.shape()[0],
                timestamps.len()
            )));
        }
        Ok(Self { data, timestamps })
    }

    pub fn num_timesteps(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn num_zones(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn num_features(&self) -> usize {
        self.data.shape()[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::Array3;

    #[test]
    fn test_geo_distance() {
        let a = GeoPoint::new(16.5, 80.6);
        let b = GeoPoint::new(16.5, 80.6);
        assert_eq!(a.distance_to(&b), 0.0);

        let c = GeoPoint::new(16.5, 80.9);
        assert!((a.distance_to(&c) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_geo_validation() {
        assert!(GeoPoint::new(16.5, 80.6).validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
    }

    #[test]
    fn test_neighbor_graph_edges() {
        let mut graph = NeighborGraph::new(3);
        graph.add_edge(0, 1, 0.1);
        graph.add_edge(0, 2, 0.2);
        graph.add_edge(1, 0, 0.1);

        assert_eq!(graph.zone_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.has_edge(0, 1));
        // Directed: 2 -> 0 was never added even though 0 -> 2 was.
        assert!(!graph.has_edge(2, 0));
        assert!(!graph.has_self_loops());
    }

    #[test]
    fn test_tensor_timestamp_mismatch() {
        let data = Array3::<f32>::zeros((4, 2, 3));
        let timestamps = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(); 3];
        assert!(TrafficTensor::new(data, timestamps).is_err());
    }
}

//! Directed K-nearest-neighbor graph over zone centroids.
//!
//! For each zone the k closest other centroids (Euclidean degree distance)
//! get an outgoing edge. The relation is deliberately left asymmetric:
//! being someone's nearest neighbor says nothing about the reverse.

use log::info;
use ucast_core::{NeighborGraph, Zone};

/// Builds the K-NN graph over zone centroids.
///
/// Every zone gets exactly `min(k, zones - 1)` outgoing edges and no
/// self-loop. Distance ties resolve to the lower zone id.
pub fn build_neighbor_graph(zones: &[Zone], k: usize) -> NeighborGraph {
    let mut graph = NeighborGraph::new(zones.len());

    for zone in zones {
        let mut candidates: Vec<(f64, usize)> = zones
            .iter()
            .filter(|other| other.id != zone.id)
            .map(|other| (zone.centroid.distance_to(&other.centroid), other.id))
            .collect();
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        for &(distance, neighbor) in candidates.iter().take(k) {
            graph.add_edge(zone.id, neighbor, distance);
        }
    }

    info!(
        "Built neighbor graph: {} zones, {} directed edges (k={})",
        graph.zone_count(),
        graph.edge_count(),
        k
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucast_core::GeoPoint;

    fn zones_on_line(n: usize) -> Vec<Zone> {
        (0..n)
            .map(|id| Zone {
                id,
                centroid: GeoPoint::new(16.5, 80.0 + id as f64 * 0.1),
            })
            .collect()
    }

    #[test]
    fn test_edge_count_and_no_self_loops() {
        let zones = zones_on_line(10);
        let k = 4;
        let graph = build_neighbor_graph(&zones, k);

        assert_eq!(graph.edge_count(), 10 * k);
        assert!(!graph.has_self_loops());
        for z in 0..10 {
            assert_eq!(graph.neighbors(z).len(), k);
        }
    }

    #[test]
    fn test_small_zone_count_connects_to_all_others() {
        // Z <= k: each zone connects to every other zone.
        let zones = zones_on_line(3);
        let graph = build_neighbor_graph(&zones, 4);

        assert_eq!(graph.edge_count(), 3 * 2);
        for z in 0..3 {
            let mut neighbors = graph.neighbors(z);
            neighbors.sort_unstable();
            let expected: Vec<usize> = (0..3).filter(|&o| o != z).collect();
            assert_eq!(neighbors, expected);
        }
    }

    #[test]
    fn test_nearest_selection() {
        let zones = zones_on_line(5);
        let graph = build_neighbor_graph(&zones, 2);

        // Zone 0 sits at the end of the line: nearest are 1 and 2.
        let mut n0 = graph.neighbors(0);
        n0.sort_unstable();
        assert_eq!(n0, vec![1, 2]);

        // Zone 2 is in the middle: nearest are 1 and 3.
        let mut n2 = graph.neighbors(2);
        n2.sort_unstable();
        assert_eq!(n2, vec![1, 3]);
    }

    #[test]
    fn test_asymmetry_is_possible() {
        // Zone layout where 2 is close to the 0/1 pair but they prefer
        // each other: 2 -> 0 exists while 0 -> 2 does not.
        let zones = vec![
            Zone {
                id: 0,
                centroid: GeoPoint::new(0.0, 0.0),
            },
            Zone {
                id: 1,
                centroid: GeoPoint::new(0.0, 0.01),
            },
            Zone {
                id: 2,
                centroid: GeoPoint::new(0.0, 1.0),
            },
        ];
        let graph = build_neighbor_graph(&zones, 1);

        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(2, 1));
        assert!(!graph.has_edge(1, 2));
        assert_eq!(graph.edge_count(), 3);
    }
}

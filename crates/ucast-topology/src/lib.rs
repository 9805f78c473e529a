//! # ucast-topology
//!
//! Turns raw coordinate samples into the fixed spatial topology the rest
//! of the pipeline runs on: a k-means partition into zones plus a directed
//! K-nearest-neighbor graph over the zone centroids.
//!
//! Both steps are fully deterministic — no RNG anywhere — so a pipeline
//! run on the same observations always produces the same topology.

pub mod neighbors;
pub mod zoning;

pub use neighbors::build_neighbor_graph;
pub use zoning::{build_zones, Zoning, ZoningConfig};

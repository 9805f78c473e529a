//! # ucast-core
//!
//! Core types and errors for the ucast congestion forecasting platform.
//!
//! This crate defines the fundamental abstractions used across all ucast
//! components:
//! - **Types**: observations, zones, the neighbor graph, the aggregated
//!   traffic tensor
//! - **Errors**: unified error handling with `UcastError`
//!
//! ## Architecture
//!
//! ```text
//! observations ──> ucast-topology ──> (zones, neighbor graph)
//!       │                                    │
//!       ▼                                    ▼
//! ucast-dataset ──> tensor/windows ──> ucast-models ──> ucast-validation
//!                                            │
//!                                            ▼
//!                                     ucast-serving
//! ```

pub mod errors;
pub mod time;
pub mod types;

// Re-export commonly used items
pub use errors::{Result, UcastError};
pub use time::parse_timestamp;
pub use types::{GeoPoint, NeighborGraph, Observation, TrafficTensor, Zone};

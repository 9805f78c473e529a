//! # ucast-io
//!
//! Ingestion of the tabular observation schema: a CSV with required
//! `timestamp`, `latitude` and `longitude` columns plus any number of
//! numeric feature columns. The parser is hand-rolled and strict — ragged
//! rows and non-numeric cells are rejected with the offending row number
//! rather than silently skipped.

pub mod csv;

pub use csv::{load_csv, RawDataset};

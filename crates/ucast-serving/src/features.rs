//! Serving-side feature construction.
//!
//! At serving time there is no aggregation pipeline: a single feature row
//! is synthesized from (lat, lon, timestamp) alone, tiled across the
//! model's sequence length, scaled, and trimmed to the model's input
//! width. Slots the request cannot know (live counts, weather one-hots)
//! stay zero and rely on the scaler having seen real ranges at fit time.

use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::Array2;

/// Canonical serving feature layout width.
pub const FEATURE_COLUMNS: usize = 22;

/// Normalization center for the coordinate slots.
const NORM_LAT: f64 = 16.5;
const NORM_LON: f64 = 80.5;

/// Builds the canonical 22-slot feature row.
///
/// Layout: [lat_norm, lon_norm, vehicle count, speed, accident, sentiment,
/// ride demand, parking, emissions, energy, hour, day-of-week, is_weekend,
/// hour_sin, hour_cos, signal red, signal yellow, weather fog, weather
/// rain, weather snow, condition low, condition medium]. Unknowable slots
/// are zero.
pub fn build_feature_row(lat: f64, lon: f64, timestamp: &DateTime<Utc>) -> Vec<f32> {
    let hour = timestamp.hour() as f64;
    let dow = timestamp.weekday().num_days_from_monday() as f64;
    let is_weekend = if dow >= 5.0 { 1.0 } else { 0.0 };
    let hour_sin = (2.0 * std::f64::consts::PI * hour / 24.0).sin();
    let hour_cos = (2.0 * std::f64::consts::PI * hour / 24.0).cos();

    let lat_norm = (lat - NORM_LAT) / 2.0;
    let lon_norm = (lon - NORM_LON) / 2.0;

    let mut row = vec![0.0f32; FEATURE_COLUMNS];
    row[0] = lat_norm as f32;
    row[1] = lon_norm as f32;
    row[10] = hour as f32;
    row[11] = dow as f32;
    row[12] = is_weekend as f32;
    row[13] = hour_sin as f32;
    row[14] = hour_cos as f32;
    row
}

/// Fits a row to `width` columns: truncates a wider row, zero-pads a
/// narrower one. Artifacts trained on other feature sets still get a
/// well-formed input this way.
pub fn fit_width(row: &[f32], width: usize) -> Vec<f32> {
    let mut fitted = vec![0.0f32; width];
    let n = row.len().min(width);
    fitted[..n].copy_from_slice(&row[..n]);
    fitted
}

/// Tiles one row into a (sequence_length, width) matrix, mirroring how the
/// original request path repeats the current conditions across the input
/// window.
pub fn tile_sequence(row: &[f32], sequence_length: usize) -> Array2<f32> {
    Array2::from_shape_fn((sequence_length, row.len()), |(_, c)| row[c])
}

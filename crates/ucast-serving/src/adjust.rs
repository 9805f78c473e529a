//! Deterministic inference adjustment chain.
//!
//! Maps a raw model scalar plus the request's coordinates and timestamp to
//! the bounded, calibrated value returned to callers. Every factor is
//! derived purely from the inputs — no randomness, no clock reads — so
//! identical inputs always produce bit-identical output. The serving tests
//! treat this like a pricing function: ordering and bounds are contract.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Fixed reference point the distance adjustment measures from.
pub const REFERENCE_LAT: f64 = 16.5;
pub const REFERENCE_LON: f64 = 80.6;

/// Rough degree-to-kilometer conversion used only in the response payload.
const DEGREES_TO_KM: f64 = 111.0;

/// Coarse confidence label thresholded at 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
        }
    }
}

/// Auxiliary factors reported alongside the adjusted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFactors {
    pub hour: u32,
    pub is_peak_hour: bool,
    pub distance_from_center_km: f64,
}

/// Final adjusted output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedPrediction {
    pub prediction: f64,
    pub confidence: Confidence,
    pub factors: AdjustmentFactors,
}

/// Applies the full adjustment chain to a raw prediction in original units.
pub fn adjust(raw: f64, lat: f64, lon: f64, timestamp: &DateTime<Utc>) -> AdjustedPrediction {
    let mut p = raw.clamp(0.0, 100.0);

    let hour = timestamp.hour();
    let minute = timestamp.minute() as f64;
    let is_peak = (7..=9).contains(&hour) || (17..=19).contains(&hour);

    if is_peak {
        // Traffic builds toward the half hour and eases off after it.
        let minute_factor = 1.0 + (30.0 - (30.0 - minute).abs()) / 150.0;
        p = (p * 1.3 * minute_factor + 10.0).min(100.0);
    } else if (10..=16).contains(&hour) {
        let minute_factor = 1.0 + minute / 300.0;
        p = (p * 1.15 * minute_factor + 5.0).min(100.0);
    } else if hour <= 5 {
        p = (p * 0.3).max(0.0);
    } else {
        let minute_factor = 1.0 + minute / 600.0;
        p = (p * 1.05 * minute_factor).min(100.0);
    }

    let distance = ((lat - REFERENCE_LAT).powi(2) + (lon - REFERENCE_LON).powi(2)).sqrt();
    if distance < 0.05 {
        p = (p * 1.15 + 8.0).min(100.0);
    } else if distance > 0.2 {
        p = (p * 0.7 - 5.0).max(0.0);
    }

    // Coordinate-derived bucket: stands in for road-type diversity.
    let bucket = ((lat * 1000.0 + lon * 1000.0).rem_euclid(100.0)) as i64 % 3;
    match bucket {
        0 => p = (p * 0.85).max(0.0),
        1 => p = (p * 1.1).min(100.0),
        _ => {}
    }

    let confidence = if p > 50.0 {
        Confidence::High
    } else {
        Confidence::Medium
    };

    AdjustedPrediction {
        prediction: p,
        confidence,
        factors: AdjustmentFactors {
            hour,
            is_peak_hour: is_peak,
            distance_from_center_km: distance * DEGREES_TO_KM,
        },
    }
}

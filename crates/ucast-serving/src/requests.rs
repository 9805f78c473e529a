//! Serving request/response types with validation.
//!
//! Transport-agnostic: an HTTP layer (out of scope here) deserializes into
//! these types and calls `validate` before touching the model. Validation
//! failures are client errors, surfaced immediately and never retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ucast_core::{parse_timestamp, GeoPoint, Result, UcastError};

use crate::adjust::AdjustmentFactors;

/// Single-point prediction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl PointRequest {
    /// Validates coordinates and parses the timestamp.
    pub fn validate(&self) -> Result<DateTime<Utc>> {
        GeoPoint::new(self.latitude, self.longitude).validate()?;
        parse_timestamp(&self.timestamp)
    }
}

/// One route waypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Route prediction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub waypoints: Vec<Waypoint>,
}

impl RouteRequest {
    pub fn validate(&self) -> Result<()> {
        if self.waypoints.len() < 2 {
            return Err(UcastError::validation("At least 2 waypoints required"));
        }
        for (i, waypoint) in self.waypoints.iter().enumerate() {
            GeoPoint::new(waypoint.latitude, waypoint.longitude)
                .validate()
                .map_err(|_| UcastError::validation(format!("Invalid waypoint {i}")))?;
        }
        Ok(())
    }
}

/// Location echo in responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Single-point prediction response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointResponse {
    pub prediction: f64,
    pub confidence: String,
    pub timestamp: String,
    pub location: Location,
    pub factors: AdjustmentFactors,
}

/// One predicted waypoint along a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePointPrediction {
    pub waypoint: usize,
    pub location: Waypoint,
    pub prediction: f64,
    pub timestamp: String,
}

/// Aggregate route statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    pub average_traffic: f64,
    pub max_traffic: f64,
    pub min_traffic: f64,
    pub total_waypoints: usize,
}

/// Route prediction response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub route_predictions: Vec<RoutePointPrediction>,
    pub summary: RouteSummary,
}

/// Health check response; always answerable, even before artifacts load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_point_request_validation() {
        let ok = PointRequest {
            latitude: 16.5,
            longitude: 80.6,
            timestamp: "2024-03-06T08:30:00Z".to_string(),
        };
        let ts = ok.validate().unwrap();
        assert_eq!(ts.hour(), 8);
        assert_eq!(ts.minute(), 30);

        let bad_coords = PointRequest {
            latitude: 95.0,
            ..ok.clone()
        };
        assert!(bad_coords.validate().unwrap_err().is_client_error());

        let bad_ts = PointRequest {
            timestamp: "yesterday".to_string(),
            ..ok
        };
        assert!(bad_ts.validate().unwrap_err().is_client_error());
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-03-06T08:30:00Z").is_ok());
        assert!(parse_timestamp("2024-03-06T08:30:00+05:30").is_ok());
        assert!(parse_timestamp("2024-03-06T08:30:00").is_ok());
        assert!(parse_timestamp("2024-03-06 08:30:00").is_ok());
        assert!(parse_timestamp("not-a-time").is_err());
    }

    #[test]
    fn test_route_needs_two_waypoints() {
        let short = RouteRequest {
            waypoints: vec![Waypoint {
                latitude: 16.5,
                longitude: 80.6,
            }],
        };
        let err = short.validate().unwrap_err();
        assert!(err.is_client_error());

        let ok = RouteRequest {
            waypoints: vec![
                Waypoint {
                    latitude: 16.5,
                    longitude: 80.6,
                },
                Waypoint {
                    latitude: 16.52,
                    longitude: 80.63,
                },
            ],
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_route_invalid_waypoint_is_addressed() {
        let request = RouteRequest {
            waypoints: vec![
                Waypoint {
                    latitude: 16.5,
                    longitude: 80.6,
                },
                Waypoint {
                    latitude: 16.5,
                    longitude: 200.0,
                },
            ],
        };
        let message = request.validate().unwrap_err().to_string();
        assert!(message.contains("waypoint 1"));
    }
}

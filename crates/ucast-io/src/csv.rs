//! CSV observation loading.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use ucast_core::{parse_timestamp, GeoPoint, Result, UcastError};

/// One parsed dataset: row-aligned coordinates, timestamps and feature
/// vectors, plus the feature column names in input order.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub points: Vec<GeoPoint>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub features: Vec<Vec<f32>>,
    pub feature_names: Vec<String>,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Loads a dataset from a CSV file.
///
/// Required headers (case-insensitive): `timestamp`, `latitude`,
/// `longitude`. Every other column is treated as a numeric feature.
pub fn load_csv(path: &Path) -> Result<RawDataset> {
    let content = std::fs::read_to_string(path)?;
    parse_csv(&content)
}

fn parse_csv(content: &str) -> Result<RawDataset> {
    let mut lines = content.lines().enumerate();

    let (_, header) = lines
        .next()
        .ok_or_else(|| UcastError::validation("CSV file is empty"))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let find = |name: &str| -> Result<usize> {
        columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| UcastError::validation(format!("Missing required column: {name}")))
    };
    let ts_col = find("timestamp")?;
    let lat_col = find("latitude")?;
    let lon_col = find("longitude")?;

    let feature_cols: Vec<usize> = (0..columns.len())
        .filter(|&i| i != ts_col && i != lat_col && i != lon_col)
        .collect();
    let feature_names: Vec<String> = feature_cols
        .iter()
        .map(|&i| columns[i].to_string())
        .collect();

    let mut dataset = RawDataset {
        points: Vec::new(),
        timestamps: Vec::new(),
        features: Vec::new(),
        feature_names,
    };

    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row = line_no + 1; // 1-based, matching editor line numbers
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != columns.len() {
            return Err(UcastError::validation(format!(
                "Row {row}: expected {} cells, found {}",
                columns.len(),
                cells.len()
            )));
        }

        let timestamp = parse_timestamp(cells[ts_col])
            .map_err(|e| UcastError::validation(format!("Row {row}: {e}")))?;
        let lat: f64 = cells[lat_col]
            .parse()
            .map_err(|_| UcastError::validation(format!("Row {row}: non-numeric latitude")))?;
        let lon: f64 = cells[lon_col]
            .parse()
            .map_err(|_| UcastError::validation(format!("Row {row}: non-numeric longitude")))?;

        let mut features = Vec::with_capacity(feature_cols.len());
        for &col in &feature_cols {
            let value: f32 = cells[col].parse().map_err(|_| {
                UcastError::validation(format!(
                    "Row {row}: non-numeric value in column '{}'",
                    columns[col]
                ))
            })?;
            features.push(value);
        }

        dataset.points.push(GeoPoint::new(lat, lon));
        dataset.timestamps.push(timestamp);
        dataset.features.push(features);
    }

    info!(
        "Loaded {} rows with {} feature columns",
        dataset.len(),
        dataset.num_features()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
timestamp,latitude,longitude,speed,volume
2024-03-06T08:00:00Z,16.50,80.60,42.5,120
2024-03-06T09:00:00Z,16.52,80.61,38.0,150
2024-03-06T10:00:00Z,16.48,80.58,55.5,90
";

    #[test]
    fn test_parse_well_formed() {
        let dataset = parse_csv(GOOD).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.feature_names, vec!["speed", "volume"]);
        assert_eq!(dataset.features[0], vec![42.5, 120.0]);
        assert!((dataset.points[1].lat - 16.52).abs() < 1e-9);
    }

    #[test]
    fn test_missing_required_header() {
        let content = "time,latitude,longitude,speed\n2024-03-06T08:00:00Z,16.5,80.6,42.5\n";
        let err = parse_csv(content).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_ragged_row_is_addressed() {
        let content = "timestamp,latitude,longitude,speed\n2024-03-06T08:00:00Z,16.5,80.6\n";
        let err = parse_csv(content).unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }

    #[test]
    fn test_non_numeric_feature_is_addressed() {
        let content = "\
timestamp,latitude,longitude,speed
2024-03-06T08:00:00Z,16.5,80.6,42.5
2024-03-06T09:00:00Z,16.5,80.6,fast
";
        let err = parse_csv(content).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Row 3"));
        assert!(message.contains("speed"));
    }

    #[test]
    fn test_header_case_insensitive_and_blank_lines() {
        let content = "\
Timestamp,Latitude,Longitude,Speed
2024-03-06T08:00:00Z,16.5,80.6,42.5

2024-03-06T09:00:00Z,16.5,80.6,40.0
";
        let dataset = parse_csv(content).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.csv");
        std::fs::write(&path, GOOD).unwrap();
        let dataset = load_csv(&path).unwrap();
        assert_eq!(dataset.len(), 3);
    }
}

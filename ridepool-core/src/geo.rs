use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// A coordinate pair with an optional free-text address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64, address: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            address: Some(address.into()),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_coordinates(self.lat, self.lng)
    }
}

pub fn validate_coordinates(lat: f64, lng: f64) -> CoreResult<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::ValidationError(format!("latitude {} out of range", lat)));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(CoreError::ValidationError(format!("longitude {} out of range", lng)));
    }
    Ok(())
}

/// Coarse rectangular inclusion filter used by ride search.
///
/// This is deliberately not a distance query: a point matches when both of
/// its coordinates fall inside the box bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box extending `half_span` degrees in each direction from a centre point.
    pub fn around(lat: f64, lng: f64, half_span: f64) -> Self {
        Self {
            min_lat: lat - half_span,
            max_lat: lat + half_span,
            min_lng: lng - half_span,
            max_lng: lng + half_span,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_around_point() {
        let bbox = BoundingBox::around(40.0, -74.0, 0.5);
        assert!(bbox.contains(40.4, -73.6));
        assert!(!bbox.contains(40.6, -74.0));
        assert!(!bbox.contains(40.0, -74.51));
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(matches!(validate_coordinates(90.1, 0.0), Err(CoreError::ValidationError(_))));
        assert!(matches!(validate_coordinates(0.0, -180.5), Err(CoreError::ValidationError(_))));
    }
}

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::validate_coordinates;
use crate::{CoreError, CoreResult};

/// One position report for a ride. Append-only; the newest sample is the
/// ride's current location.
///
/// Serializes as the live-channel message `{latitude, longitude, speed,
/// heading, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    #[serde(skip)]
    pub ride_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// Stamps an update with the server clock, truncated to the storage precision.
    pub fn stamp(update: &LocationUpdate, now: DateTime<Utc>) -> Self {
        Self {
            ride_id: update.ride_id,
            latitude: update.latitude,
            longitude: update.longitude,
            speed: update.speed,
            heading: update.heading,
            timestamp: now.trunc_subsecs(6),
        }
    }
}

/// A driver's position report as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub ride_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
}

impl LocationUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        validate_coordinates(self.latitude, self.longitude)?;
        if let Some(speed) = self.speed {
            if speed.is_nan() || speed < 0.0 {
                return Err(CoreError::ValidationError("speed must not be negative".to_string()));
            }
        }
        if let Some(heading) = self.heading {
            if !(0.0..360.0).contains(&heading) {
                return Err(CoreError::ValidationError(format!("heading {} out of range", heading)));
            }
        }
        Ok(())
    }
}

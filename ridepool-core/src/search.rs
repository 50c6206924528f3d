use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;
use crate::ride::{Ride, RideStatus};

/// Filters for finding bookable rides.
#[derive(Debug, Clone)]
pub struct RideSearch {
    /// Calendar date (UTC) of departure.
    pub date: Option<NaiveDate>,
    pub seats_needed: i32,
    pub origin_box: Option<BoundingBox>,
    pub dest_box: Option<BoundingBox>,
}

impl Default for RideSearch {
    fn default() -> Self {
        Self {
            date: None,
            seats_needed: 1,
            origin_box: None,
            dest_box: None,
        }
    }
}

impl RideSearch {
    /// Eligibility predicate; SQL stores express the same filter in their query.
    pub fn matches(&self, ride: &Ride) -> bool {
        if ride.status != RideStatus::Scheduled || ride.available_seats < self.seats_needed {
            return false;
        }
        if let Some(date) = self.date {
            if ride.departure_time.date_naive() != date {
                return false;
            }
        }
        if let Some(bbox) = &self.origin_box {
            if !bbox.contains(ride.origin.lat, ride.origin.lng) {
                return false;
            }
        }
        if let Some(bbox) = &self.dest_box {
            if !bbox.contains(ride.destination.lat, ride.destination.lng) {
                return false;
            }
        }
        true
    }
}

/// Public driver details shown next to a search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverSummary {
    pub first_name: String,
    pub last_name: String,
    pub rating: Option<f64>,
    pub car_model: Option<String>,
    pub car_plate: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideListing {
    #[serde(flatten)]
    pub ride: Ride,
    pub driver: DriverSummary,
}

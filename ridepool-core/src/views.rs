use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::Booking;
use crate::ride::{Ride, RideStatus};
use crate::search::DriverSummary;

/// Profile columns of the gateway-owned users table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub car_model: Option<String>,
    pub car_plate: Option<String>,
}

impl UserProfile {
    pub fn driver_summary(&self) -> DriverSummary {
        DriverSummary {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            rating: self.rating,
            car_model: self.car_model.clone(),
            car_plate: self.car_plate.clone(),
        }
    }

    pub fn driver_contact(&self) -> DriverContact {
        DriverContact {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            car_model: self.car_model.clone(),
            car_plate: self.car_plate.clone(),
        }
    }

    pub fn passenger_summary(&self) -> PassengerSummary {
        PassengerSummary {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            rating: self.rating,
        }
    }
}

/// What a booking shows about the ride it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideSummary {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin_address: Option<String>,
    pub destination_address: Option<String>,
    pub departure_time: DateTime<Utc>,
    pub status: RideStatus,
}

impl From<&Ride> for RideSummary {
    fn from(ride: &Ride) -> Self {
        RideSummary {
            id: ride.id,
            driver_id: ride.driver_id,
            origin_address: ride.origin.address.clone(),
            destination_address: ride.destination.address.clone(),
            departure_time: ride.departure_time,
            status: ride.status,
        }
    }
}

/// Driver details a booked passenger needs to meet the car.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverContact {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub car_model: Option<String>,
    pub car_plate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassengerSummary {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub rating: Option<f64>,
}

/// One entry of a passenger's booking list.
#[derive(Debug, Clone, Serialize)]
pub struct PassengerBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub ride: RideSummary,
    pub driver: DriverContact,
}

/// One entry of a ride's booking list, as the driver sees it.
#[derive(Debug, Clone, Serialize)]
pub struct RideBooking {
    #[serde(flatten)]
    pub booking: Booking,
    pub passenger: PassengerSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub ride: RideSummary,
    pub driver: DriverContact,
    pub passenger: PassengerSummary,
}

pub mod access;
pub mod engine;

pub use access::ride_participant;
pub use engine::BookingReservationEngine;

pub mod inventory;
pub mod manager;
pub mod txn;

pub use inventory::{release_seats, reserve_seats};
pub use manager::{RideLifecycleManager, SearchParams};
pub use txn::finish;

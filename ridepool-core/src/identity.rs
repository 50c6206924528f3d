use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolved identity attached to every request by the auth gateway.
///
/// The core trusts it verbatim: credential checks happen before any core
/// operation is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub is_driver: bool,
}

impl Principal {
    pub fn driver(user_id: Uuid) -> Self {
        Self { user_id, is_driver: true }
    }

    pub fn passenger(user_id: Uuid) -> Self {
        Self { user_id, is_driver: false }
    }
}

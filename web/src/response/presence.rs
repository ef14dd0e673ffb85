use domain::Id;
use serde::Serialize;
use utoipa::ToSchema;

/// Live connectivity of one user, read from the connection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Presence {
    pub user_id: Id,
    /// True while at least one connection of the user is registered
    pub online: bool,
    /// Number of registered connections (one per device or tab)
    pub connections: usize,
}

//! Error type shared by every module of the engine.

use serde::{Deserialize, Serialize};

/// A zone that blocks a new zone until the caller picks a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictZoneInfo {
    pub id: i64,
    pub name: String,
    pub zone_type: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RingError {
    /// Caller supplied a request that can never succeed (bad radius, missing
    /// include flags, out-of-range floor, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A coordinate frame value contained NaN or infinity.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(String),

    #[error("subscription {subscription_id} does not belong to owner {owner_id}")]
    OwnershipMismatch {
        subscription_id: String,
        owner_id: i64,
    },

    /// Degenerate or non-reconstructible polygon, before or after a set
    /// operation.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("zone {0} not found")]
    ZoneNotFound(i64),

    #[error("zone {zone_id} does not belong to owner {owner_id}")]
    ZoneOwnershipMismatch { zone_id: i64, owner_id: i64 },

    #[error("zone conflicts with {} existing zone(s) - resolution required", conflicts.len())]
    ZoneConflict {
        conflicts: Vec<ConflictZoneInfo>,
        new_zone_type: String,
    },
}

impl RingError {
    /// Stable machine-readable code used in protocol error events.
    pub fn code(&self) -> &'static str {
        match self {
            RingError::InvalidRequest(_) => "invalid_request",
            RingError::InvalidCoordinate(_) => "invalid_coordinate",
            RingError::SubscriptionNotFound(_) => "subscription_not_found",
            RingError::OwnershipMismatch { .. } => "ownership_mismatch",
            RingError::InvalidGeometry(_) => "invalid_geometry",
            RingError::ZoneNotFound(_) => "zone_not_found",
            RingError::ZoneOwnershipMismatch { .. } => "zone_ownership_mismatch",
            RingError::ZoneConflict { .. } => "zone_conflict",
        }
    }

    /// Caller errors are surfaced to the requesting client without side
    /// effects.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RingError::InvalidRequest(_)
                | RingError::InvalidCoordinate(_)
                | RingError::OwnershipMismatch { .. }
                | RingError::ZoneOwnershipMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RingError>;

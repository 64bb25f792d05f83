//! `stream.*` and `zone.*` wire protocol.
//!
//! This module owns **every message that crosses the process boundary**
//! between the streaming engine and its clients.
//!
//! ## Channel namespaces
//!
//! | Namespace   | Direction        | Carried by                 |
//! |-------------|------------------|----------------------------|
//! | commands    | client → server  | one JSON envelope per line |
//! | `stream.*`  | server → client  | `StreamEvent<T>`           |
//! | `zone.*`    | server → client  | `StreamEvent<T>`           |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. Poses arrive in the flat wire form and are converted into the tagged
//!    [`CameraPose`] before reaching the manager.
//! 3. Every outbound event includes `frame: u64` and `session: String`.

use crate::chunk::ChunkMetadata;
use crate::coords::{RingArc, RingPolar};
use crate::error::{ConflictZoneInfo, RingError};
use crate::geometry::ZoneGeometry;
use crate::types::{
    CameraPose, ChunkDelta, OwnerId, PosePosition, SubscriptionRequest, ZoneDelta, ZoneId,
};
use crate::zones::{DezoneResult, Zone, ZoneCreateInput, ZoneCreateResult};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Common envelope
// ---------------------------------------------------------------------------

/// Every outbound message is wrapped in this envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent<T> {
    pub session: String,
    pub frame: u64,
    pub payload: T,
}

impl<T> StreamEvent<T> {
    pub fn new(session: impl Into<String>, frame: u64, payload: T) -> Self {
        Self {
            session: session.into(),
            frame,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Pose wire form
// ---------------------------------------------------------------------------

/// Flat pose as clients send it.  Exactly one frame is used:
/// `arc_length` wins over `theta`, which wins over `ring_position`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraPoseWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ring_position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arc_length: Option<f64>,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub active_floor: i32,
}

impl TryFrom<CameraPoseWire> for CameraPose {
    type Error = RingError;

    fn try_from(wire: CameraPoseWire) -> Result<Self, Self::Error> {
        let r = wire.r.unwrap_or(0.0);
        let z = wire.z.unwrap_or(0.0);
        let position = if let Some(s) = wire.arc_length {
            PosePosition::Arc(RingArc::new(s, r, z))
        } else if let Some(theta) = wire.theta {
            PosePosition::Polar(RingPolar::new(theta, r, z))
        } else if let Some(ring_position) = wire.ring_position {
            PosePosition::Legacy {
                ring_position,
                width_offset: wire.width_offset.unwrap_or(0.0),
            }
        } else {
            return Err(RingError::InvalidRequest(
                "pose needs arc_length, theta or ring_position".into(),
            ));
        };
        Ok(CameraPose {
            position,
            elevation: wire.elevation,
            active_floor: wire.active_floor,
        })
    }
}

impl From<CameraPose> for CameraPoseWire {
    fn from(pose: CameraPose) -> Self {
        let mut wire = CameraPoseWire {
            elevation: pose.elevation,
            active_floor: pose.active_floor,
            ..Default::default()
        };
        match pose.position {
            PosePosition::Legacy {
                ring_position,
                width_offset,
            } => {
                wire.ring_position = Some(ring_position);
                wire.width_offset = Some(width_offset);
            }
            PosePosition::Polar(polar) => {
                wire.theta = Some(polar.theta);
                wire.r = Some(polar.r);
                wire.z = Some(polar.z);
            }
            PosePosition::Arc(arc) => {
                wire.arc_length = Some(arc.s);
                wire.r = Some(arc.r);
                wire.z = Some(arc.z);
            }
        }
        wire
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequestWire {
    pub pose: CameraPoseWire,
    pub radius_meters: i64,
    #[serde(default)]
    pub width_meters: f64,
    #[serde(default)]
    pub include_chunks: bool,
    #[serde(default)]
    pub include_zones: bool,
}

impl TryFrom<SubscriptionRequestWire> for SubscriptionRequest {
    type Error = RingError;

    fn try_from(wire: SubscriptionRequestWire) -> Result<Self, Self::Error> {
        Ok(SubscriptionRequest {
            pose: wire.pose.try_into()?,
            radius_meters: wire.radius_meters,
            width_meters: wire.width_meters,
            include_chunks: wire.include_chunks,
            include_zones: wire.include_zones,
        })
    }
}

// ---------------------------------------------------------------------------
// Commands  (client → server)
// ---------------------------------------------------------------------------

/// One inbound line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Authenticated caller; the transport is trusted to fill this in.
    pub owner_id: OwnerId,
    pub command: StreamCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamCommand {
    Subscribe(SubscriptionRequestWire),
    UpdatePose {
        subscription_id: String,
        pose: CameraPoseWire,
    },
    Unsubscribe {
        subscription_id: String,
    },
    CreateZone(ZoneCreateInput),
    Dezone {
        floor: i32,
        geometry: ZoneGeometry,
    },
    DeleteZone {
        zone_id: ZoneId,
    },
    Stats,
}

impl StreamCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamCommand::Subscribe(_) => "subscribe",
            StreamCommand::UpdatePose { .. } => "update_pose",
            StreamCommand::Unsubscribe { .. } => "unsubscribe",
            StreamCommand::CreateZone(_) => "create_zone",
            StreamCommand::Dezone { .. } => "dezone",
            StreamCommand::DeleteZone { .. } => "delete_zone",
            StreamCommand::Stats => "stats",
        }
    }
}

// ---------------------------------------------------------------------------
// Event payloads  (server → client)
// ---------------------------------------------------------------------------

/// Chunk window change, with metadata for every added chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDeltaPayload {
    #[serde(flatten)]
    pub delta: ChunkDelta,
    pub added_chunks: Vec<ChunkMetadata>,
}

/// Zone set change, with the full record of every added zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneDeltaPayload {
    #[serde(flatten)]
    pub delta: ZoneDelta,
    pub added_zones: Vec<Zone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionClosed {
    pub subscription_id: String,
}

/// Zones created, updated or deleted by one edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneChanged {
    pub created: Vec<Zone>,
    pub updated: Vec<Zone>,
    pub deleted: Vec<ZoneId>,
}

impl From<ZoneCreateResult> for ZoneChanged {
    fn from(r: ZoneCreateResult) -> Self {
        Self {
            created: r.created,
            updated: r.updated,
            deleted: r.deleted,
        }
    }
}

impl From<DezoneResult> for ZoneChanged {
    fn from(r: DezoneResult) -> Self {
        Self {
            created: r.created,
            updated: r.updated,
            deleted: r.deleted,
        }
    }
}

/// A command failed.  `code` is [`RingError::code`] or `malformed_command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictZoneInfo>>,
}

impl From<&RingError> for StreamError {
    fn from(err: &RingError) -> Self {
        let conflicts = match err {
            RingError::ZoneConflict { conflicts, .. } => Some(conflicts.clone()),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            conflicts,
        }
    }
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

/// Every outbound subject, as constants.
pub mod subjects {
    pub const SUBSCRIPTION_PLANNED: &str = "stream.subscription.planned";
    pub const SUBSCRIPTION_CLOSED: &str = "stream.subscription.closed";

    pub const CHUNK_DELTA: &str = "stream.chunk.delta";
    pub const ZONE_DELTA: &str = "stream.zone.delta";

    pub const ZONE_CHANGED: &str = "zone.changed";

    pub const STATS: &str = "stream.stats";
    pub const ERROR: &str = "stream.error";
}

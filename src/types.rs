//! Core streaming types shared across all modules.

use crate::chunk::{arc_to_chunk_index, position_to_chunk_index, ChunkId};
use crate::coords::{ring_polar_to_ring_arc, validate_legacy, RingArc, RingPolar};
use crate::error::{Result, RingError};
use crate::wrap::{wrap_arc_length, wrap_position, RING_CIRCUMFERENCE, RING_CIRCUMFERENCE_F};
use serde::{Deserialize, Serialize};

pub type ZoneId = i64;
pub type OwnerId = i64;

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Where an observer is, in exactly one coordinate frame.
///
/// A zero value in any variant is a real position at the reference hub.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum PosePosition {
    Legacy {
        /// Absolute along-ring position in meters.
        ring_position: i64,
        /// Width offset in meters.
        width_offset: f64,
    },
    Polar(RingPolar),
    Arc(RingArc),
}

impl PosePosition {
    /// The position as a wrapped arc-length point.
    pub fn to_ring_arc(&self) -> RingArc {
        match *self {
            PosePosition::Legacy {
                ring_position,
                width_offset,
            } => RingArc::new(wrap_position(ring_position) as f64, width_offset, 0.0),
            PosePosition::Polar(polar) => ring_polar_to_ring_arc(polar),
            PosePosition::Arc(arc) => RingArc::new(wrap_arc_length(arc.s), arc.r, arc.z),
        }
    }

    pub fn center_chunk_index(&self) -> u32 {
        match *self {
            PosePosition::Legacy { ring_position, .. } => position_to_chunk_index(ring_position),
            PosePosition::Polar(polar) => arc_to_chunk_index(ring_polar_to_ring_arc(polar).s),
            PosePosition::Arc(arc) => arc_to_chunk_index(arc.s),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PosePosition::Legacy { width_offset, .. } => validate_legacy(0.0, *width_offset, 0.0),
            PosePosition::Polar(polar) => polar.validate(),
            PosePosition::Arc(arc) => arc.validate(),
        }
    }
}

/// The observer's viewing position used for streaming decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: PosePosition,
    /// Camera height in meters.
    #[serde(default)]
    pub elevation: f64,
    /// Player-selected floor.
    #[serde(default)]
    pub active_floor: i32,
}

impl CameraPose {
    pub fn legacy(ring_position: i64, width_offset: f64, active_floor: i32) -> Self {
        Self {
            position: PosePosition::Legacy {
                ring_position,
                width_offset,
            },
            elevation: 0.0,
            active_floor,
        }
    }

    pub fn polar(polar: RingPolar, active_floor: i32) -> Self {
        Self {
            position: PosePosition::Polar(polar),
            elevation: 0.0,
            active_floor,
        }
    }

    pub fn arc(arc: RingArc, active_floor: i32) -> Self {
        Self {
            position: PosePosition::Arc(arc),
            elevation: 0.0,
            active_floor,
        }
    }

    pub fn chunk_id(&self) -> ChunkId {
        ChunkId::new(self.active_floor, self.position.center_chunk_index() as i64)
    }

    pub fn validate(&self) -> Result<()> {
        self.position.validate()?;
        if !self.elevation.is_finite() {
            return Err(RingError::InvalidCoordinate(format!(
                "invalid elevation: {}",
                self.elevation
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub pose: CameraPose,
    /// Along-ring distance to include, in meters.
    pub radius_meters: i64,
    /// Radial width of the zone query window; `<= 0` means the default.
    #[serde(default)]
    pub width_meters: f64,
    #[serde(default)]
    pub include_chunks: bool,
    #[serde(default)]
    pub include_zones: bool,
}

/// Initial server response for a new subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub subscription_id: String,
    pub chunk_ids: Vec<ChunkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_bounding_box: Option<ZoneBoundingBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Created, initial window computed.
    Planned,
    /// Has received at least one pose update.
    Active,
}

/// Server-side record of one observer's streaming interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner_id: OwnerId,
    pub state: SubscriptionState,
    /// Latest request, with `pose` replaced on every update.
    pub request: SubscriptionRequest,
    /// Last delivered chunk window.
    pub chunk_ids: Vec<ChunkId>,
    /// Current zone query area, when zones are included.
    pub zone_bounding_box: Option<ZoneBoundingBox>,
    /// Last delivered zone ids.
    pub zone_ids: Vec<ZoneId>,
    pub pose_updates: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub subscription_id: String,
    pub added: Vec<ChunkId>,
    pub removed: Vec<ChunkId>,
    pub current: Vec<ChunkId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDelta {
    pub subscription_id: String,
    pub added: Vec<ZoneId>,
    pub removed: Vec<ZoneId>,
    pub current: Vec<ZoneId>,
}

// ---------------------------------------------------------------------------
// Zone query box
// ---------------------------------------------------------------------------

/// Area to query for zones, in arc-length coordinates.
///
/// When `min_s > max_s` the box is wrapped and covers
/// `[min_s, C) ∪ [0, max_s]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBoundingBox {
    pub floor: i32,
    pub min_s: f64,
    pub max_s: f64,
    pub min_r: f64,
    pub max_r: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl ZoneBoundingBox {
    pub fn is_wrapped(&self) -> bool {
        self.min_s > self.max_s
    }

    /// The box's along-ring extent as one or two canonical intervals.
    pub fn s_intervals(&self) -> Vec<(f64, f64)> {
        if self.is_wrapped() {
            vec![(self.min_s, RING_CIRCUMFERENCE_F), (0.0, self.max_s)]
        } else {
            vec![(self.min_s, self.max_s)]
        }
    }

    pub fn contains_s(&self, s: f64) -> bool {
        let s = wrap_arc_length(s);
        self.s_intervals()
            .iter()
            .any(|(lo, hi)| s >= *lo && s <= *hi)
    }

    /// Whether a contiguous along-ring range `[lo, hi]` touches the box.  The
    /// range may extend below 0 or past `C` (normalized zone extents do).
    pub fn intersects_s_range(&self, lo: f64, hi: f64) -> bool {
        self.s_intervals().iter().any(|(box_lo, box_hi)| {
            [-RING_CIRCUMFERENCE_F, 0.0, RING_CIRCUMFERENCE_F]
                .iter()
                .any(|shift| lo + shift <= *box_hi && hi + shift >= *box_lo)
        })
    }

    pub fn intersects_r_range(&self, lo: f64, hi: f64) -> bool {
        lo <= self.max_r && hi >= self.min_r
    }
}

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub planned_subscriptions: usize,
    pub active_subscriptions: usize,
    pub total_pose_updates: u64,
}

/// Zone query width used when a request gives none.
pub const DEFAULT_ZONE_WIDTH: f64 = 5_000.0;
/// Half the ring's usable width; zones never extend past it.
pub const MAX_HALF_WIDTH: f64 = 2_500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Zone query width used when a request does not give one.
    pub default_width_meters: f64,
    /// Zones never extend past this radial offset either side of center.
    pub max_half_width_meters: f64,
    /// Lowest floor a pose may select.
    pub min_floor: i32,
    /// Highest floor a pose may select.
    pub max_floor: i32,
    /// Largest subscription radius accepted.
    pub max_radius_meters: i64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_width_meters: DEFAULT_ZONE_WIDTH,
            max_half_width_meters: MAX_HALF_WIDTH,
            min_floor: -2,
            max_floor: 2,
            max_radius_meters: RING_CIRCUMFERENCE,
        }
    }
}

impl StreamingConfig {
    pub fn floor_range(&self) -> std::ops::RangeInclusive<i32> {
        self.min_floor..=self.max_floor
    }
}

//! Fixed reference points on the ring: the reference hub and the twelve
//! pillar hubs spaced evenly around it.

use crate::coords::{
    er0_to_ring_arc, ring_arc_to_er0, ring_arc_to_ring_polar, Er0Point, RingArc, RingPolar,
    REFERENCE_HUB_RADIUS,
};
use crate::error::{Result, RingError};
use crate::wrap::arc_length_distance;
use serde::{Deserialize, Serialize};

/// Number of pillar hubs.
pub const PILLAR_HUB_COUNT: usize = 12;
/// Arc-length spacing between neighbouring pillar hubs (22,000 km).
pub const PILLAR_HUB_SPACING: f64 = 22_000_000.0;

/// A station's position in arc-length coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StationPosition {
    pub arc_length: f64,
    /// Usually 0 (on the centerline).
    pub r: f64,
    /// Usually 0 (on the equatorial plane).
    pub z: f64,
}

impl StationPosition {
    pub const fn new(arc_length: f64, r: f64, z: f64) -> Self {
        Self { arc_length, r, z }
    }

    pub fn to_ring_arc(self) -> RingArc {
        RingArc::new(self.arc_length, self.r, self.z)
    }
}

impl From<RingArc> for StationPosition {
    fn from(arc: RingArc) -> Self {
        Self::new(arc.s, arc.r, arc.z)
    }
}

/// The reference hub sits at `s = 0`.
pub const REFERENCE_HUB_POSITION: StationPosition = StationPosition::new(0.0, 0.0, 0.0);

/// Earth-centered position of the reference hub.  This is the hub's own
/// altitude, not the ring's orbital radius.
pub const REFERENCE_HUB_ER0: Er0Point = Er0Point {
    x: REFERENCE_HUB_RADIUS,
    y: 0.0,
    z: 0.0,
};

/// Arc positions of all pillar hubs; hub 0 is the reference hub.
pub fn pillar_hub_positions() -> [StationPosition; PILLAR_HUB_COUNT] {
    std::array::from_fn(|i| StationPosition::new(i as f64 * PILLAR_HUB_SPACING, 0.0, 0.0))
}

pub fn station_position_to_er0(pos: StationPosition) -> Er0Point {
    ring_arc_to_er0(pos.to_ring_arc())
}

pub fn er0_to_station_position(er0: Er0Point) -> StationPosition {
    er0_to_ring_arc(er0).into()
}

fn pillar_hub(index: usize) -> Result<StationPosition> {
    pillar_hub_positions()
        .get(index)
        .copied()
        .ok_or_else(|| {
            RingError::InvalidRequest(format!(
                "invalid hub index: {} (must be 0-{})",
                index,
                PILLAR_HUB_COUNT - 1
            ))
        })
}

pub fn pillar_hub_er0(index: usize) -> Result<Er0Point> {
    pillar_hub(index).map(station_position_to_er0)
}

pub fn pillar_hub_ring_polar(index: usize) -> Result<RingPolar> {
    pillar_hub(index).map(|hub| ring_arc_to_ring_polar(hub.to_ring_arc()))
}

/// Nearest pillar hub to `pos` along the ring, with its cyclic distance.
pub fn find_nearest_pillar_hub(pos: StationPosition) -> (usize, f64) {
    pillar_hub_positions()
        .iter()
        .enumerate()
        .map(|(i, hub)| (i, arc_length_distance(pos.arc_length, hub.arc_length)))
        .fold((0, f64::MAX), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        })
}

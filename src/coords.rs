//! Coordinate frames and the transforms between them.
//!
//! ```text
//! Er0Point  (earth-centered x/y/z)
//!     ⇅  ring_polar_to_er0 / er0_to_ring_polar
//! RingPolar (theta, r, z)
//!     ⇅  ring_polar_to_ring_arc / ring_arc_to_ring_polar
//! RingArc   (s, r, z)
//!
//! legacy (x, y, z) ⇄ RingPolar   with x ~ s, y ~ r, z ~ z
//! ```
//!
//! Only `theta` and `s` wrap.  `r` and `z` are unbounded apart from the
//! finiteness checks in the `validate` methods.

use crate::error::{Result, RingError};
use crate::wrap::{wrap_arc_length, wrap_theta, RING_CIRCUMFERENCE_F};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

// ---------------------------------------------------------------------------
// Frame constants
// ---------------------------------------------------------------------------

/// Earth's equatorial radius in meters (WGS84).
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Radius of the ring's centerline from Earth's center (geostationary).
pub const RING_ORBITAL_RADIUS: f64 = 42_164_000.0;
/// Altitude of the reference hub above Earth's surface.
pub const REFERENCE_HUB_ALTITUDE: f64 = 500_000.0;
/// Distance of the reference hub from Earth's center.
pub const REFERENCE_HUB_RADIUS: f64 = EARTH_RADIUS + REFERENCE_HUB_ALTITUDE;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Earth-centered point.  +X is the prime meridian on the equator, +Y is
/// 90°E, +Z is the north pole.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Er0Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Ring-local polar position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RingPolar {
    /// Angle around the ring in `[-π, π)`; 0 at the reference hub, eastward.
    pub theta: f64,
    /// Radial offset from the ring centerline (positive = away from Earth).
    pub r: f64,
    /// Vertical offset from the equatorial plane (positive = north).
    pub z: f64,
}

/// Ring-local arc-length position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RingArc {
    /// Arc length along the ring in `[0, C)`; 0 at the reference hub.
    pub s: f64,
    pub r: f64,
    pub z: f64,
}

impl Er0Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn validate(&self) -> Result<()> {
        check_finite("X", self.x)?;
        check_finite("Y", self.y)?;
        check_finite("Z", self.z)
    }
}

impl RingPolar {
    pub fn new(theta: f64, r: f64, z: f64) -> Self {
        Self { theta, r, z }
    }

    pub fn validate(&self) -> Result<()> {
        check_finite("theta", self.theta)?;
        check_finite("r", self.r)?;
        check_finite("z", self.z)
    }
}

impl RingArc {
    pub fn new(s: f64, r: f64, z: f64) -> Self {
        Self { s, r, z }
    }

    pub fn validate(&self) -> Result<()> {
        check_finite("s", self.s)?;
        check_finite("r", self.r)?;
        check_finite("z", self.z)
    }
}

impl std::fmt::Display for RingArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(s={:.2}, r={:.2}, z={:.2})", self.s, self.r, self.z)
    }
}

/// Validate a legacy planar position.
pub fn validate_legacy(x: f64, y: f64, z: f64) -> Result<()> {
    check_finite("x", x)?;
    check_finite("y", y)?;
    check_finite("z", z)
}

fn check_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RingError::InvalidCoordinate(format!(
            "invalid {}: {}",
            field, value
        )))
    }
}

// ---------------------------------------------------------------------------
// ER0 <-> RingPolar
// ---------------------------------------------------------------------------

pub fn ring_polar_to_er0(polar: RingPolar) -> Er0Point {
    let radius = RING_ORBITAL_RADIUS + polar.r;
    Er0Point {
        x: radius * polar.theta.cos(),
        y: radius * polar.theta.sin(),
        z: polar.z,
    }
}

pub fn er0_to_ring_polar(er0: Er0Point) -> RingPolar {
    let rho = er0.x.hypot(er0.y);
    RingPolar {
        theta: wrap_theta(er0.y.atan2(er0.x)),
        r: rho - RING_ORBITAL_RADIUS,
        z: er0.z,
    }
}

// ---------------------------------------------------------------------------
// RingArc <-> RingPolar
// ---------------------------------------------------------------------------

pub fn ring_arc_to_ring_polar(arc: RingArc) -> RingPolar {
    RingPolar {
        theta: wrap_theta(arc.s / RING_CIRCUMFERENCE_F * TAU),
        r: arc.r,
        z: arc.z,
    }
}

pub fn ring_polar_to_ring_arc(polar: RingPolar) -> RingArc {
    RingArc {
        s: theta_to_arc_length(polar.theta),
        r: polar.r,
        z: polar.z,
    }
}

pub fn ring_arc_to_er0(arc: RingArc) -> Er0Point {
    ring_polar_to_er0(ring_arc_to_ring_polar(arc))
}

pub fn er0_to_ring_arc(er0: Er0Point) -> RingArc {
    ring_polar_to_ring_arc(er0_to_ring_polar(er0))
}

/// Shift theta into `[0, 2π)` and scale to an arc length in `[0, C)`.
fn theta_to_arc_length(theta: f64) -> f64 {
    let mut positive = wrap_theta(theta);
    if positive < 0.0 {
        positive += TAU;
    }
    wrap_arc_length(positive / TAU * RING_CIRCUMFERENCE_F)
}

// ---------------------------------------------------------------------------
// Legacy planar <-> RingPolar
// ---------------------------------------------------------------------------

/// Legacy `x` is arc length, `y` the width offset, `z` the floor/level.
pub fn legacy_to_ring_polar(x: f64, y: f64, z: f64) -> RingPolar {
    RingPolar {
        theta: wrap_theta(wrap_arc_length(x) / RING_CIRCUMFERENCE_F * TAU),
        r: y,
        z,
    }
}

pub fn ring_polar_to_legacy(polar: RingPolar) -> (f64, f64, f64) {
    (theta_to_arc_length(polar.theta), polar.r, polar.z)
}

//! Wraparound arithmetic over the ring's cyclic coordinate.
//!
//! Everything in the engine that touches an along-ring position goes through
//! these helpers.  They are total over finite inputs and idempotent; callers
//! reject NaN/Inf before reaching them.

use crate::error::{Result, RingError};
use std::f64::consts::{PI, TAU};

// ---------------------------------------------------------------------------
// Ring constants
// ---------------------------------------------------------------------------

/// Ring circumference in meters (264,000 km).
pub const RING_CIRCUMFERENCE: i64 = 264_000_000;
/// Length of one chunk along the ring in meters.
pub const CHUNK_LENGTH: i64 = 1_000;
/// Number of chunks around the ring.
pub const CHUNK_COUNT: i64 = RING_CIRCUMFERENCE / CHUNK_LENGTH;

/// Float form of [`RING_CIRCUMFERENCE`].
pub const RING_CIRCUMFERENCE_F: f64 = RING_CIRCUMFERENCE as f64;
/// Half the ring; the largest possible cyclic distance.
pub const HALF_RING_F: f64 = RING_CIRCUMFERENCE_F / 2.0;

// ---------------------------------------------------------------------------
// Integer positions
// ---------------------------------------------------------------------------

/// Wrap a ring position into `[0, C)`.
pub fn wrap_position(position: i64) -> i64 {
    position.rem_euclid(RING_CIRCUMFERENCE)
}

/// Wrap a chunk index into `[0, N)`.
pub fn wrap_chunk_index(chunk_index: i64) -> u32 {
    chunk_index.rem_euclid(CHUNK_COUNT) as u32
}

/// Shortest distance between two ring positions, going either way round.
pub fn distance(a: i64, b: i64) -> i64 {
    let direct = (wrap_position(a) - wrap_position(b)).abs();
    direct.min(RING_CIRCUMFERENCE - direct)
}

/// Wrap a chunk index that is expected to be near the valid range.
///
/// Indices further than one full lap away are almost certainly a caller bug
/// rather than a neighbour lookup, so they are rejected.
pub fn validate_chunk_index(chunk_index: i64) -> Result<u32> {
    if chunk_index < -CHUNK_COUNT || chunk_index >= CHUNK_COUNT * 2 {
        return Err(RingError::InvalidRequest(format!(
            "chunk index {} is too far from valid range (0-{})",
            chunk_index,
            CHUNK_COUNT - 1
        )));
    }
    Ok(wrap_chunk_index(chunk_index))
}

/// Positions are always valid once wrapped.
pub fn validate_position(position: i64) -> i64 {
    wrap_position(position)
}

// ---------------------------------------------------------------------------
// Float positions and angles
// ---------------------------------------------------------------------------

/// Wrap an angle into `[-π, π)`.
pub fn wrap_theta(theta: f64) -> f64 {
    if (-PI..PI).contains(&theta) {
        return theta;
    }
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    // rem_euclid may round up to exactly TAU.
    if wrapped >= PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Wrap an arc length into `[0, C)`.
pub fn wrap_arc_length(s: f64) -> f64 {
    if (0.0..RING_CIRCUMFERENCE_F).contains(&s) {
        return s;
    }
    let wrapped = s.rem_euclid(RING_CIRCUMFERENCE_F);
    if wrapped >= RING_CIRCUMFERENCE_F {
        0.0
    } else {
        wrapped
    }
}

/// Shortest distance between two arc lengths, going either way round.
pub fn arc_length_distance(a: f64, b: f64) -> f64 {
    let direct = (wrap_arc_length(a) - wrap_arc_length(b)).abs();
    direct.min(RING_CIRCUMFERENCE_F - direct)
}

/// Shortest distance between two chunk indices, in chunks.
pub fn chunk_distance(a: u32, b: u32) -> u32 {
    let direct = (a as i64 - b as i64).rem_euclid(CHUNK_COUNT);
    direct.min(CHUNK_COUNT - direct) as u32
}

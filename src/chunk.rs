//! Chunk indexing: arc position ↔ chunk index, chunk ids, and the chunk
//! store collaborator with its cached in-memory implementation.

use crate::coords::{ring_arc_to_ring_polar, ring_polar_to_ring_arc, RingArc, RingPolar};
use crate::error::{Result, RingError};
use crate::wrap::{
    chunk_distance, wrap_arc_length, wrap_chunk_index, wrap_position, CHUNK_COUNT, CHUNK_LENGTH,
    RING_CIRCUMFERENCE,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Index math
// ---------------------------------------------------------------------------

pub fn position_to_chunk_index(position: i64) -> u32 {
    wrap_chunk_index(wrap_position(position) / CHUNK_LENGTH)
}

pub fn arc_to_chunk_index(s: f64) -> u32 {
    wrap_chunk_index((wrap_arc_length(s) / CHUNK_LENGTH as f64).floor() as i64)
}

pub fn ring_arc_to_chunk_index(arc: RingArc) -> u32 {
    arc_to_chunk_index(arc.s)
}

pub fn ring_polar_to_chunk_index(polar: RingPolar) -> u32 {
    ring_arc_to_chunk_index(ring_polar_to_ring_arc(polar))
}

/// Half-open position range `[min, max)` owned by a chunk.
pub fn chunk_index_to_position_range(chunk_index: i64) -> (i64, i64) {
    let min = wrap_chunk_index(chunk_index) as i64 * CHUNK_LENGTH;
    (min, min + CHUNK_LENGTH)
}

/// Arc-length midpoint of a chunk, on the centerline.
pub fn chunk_index_to_center_arc(chunk_index: i64) -> RingArc {
    let s = (wrap_chunk_index(chunk_index) as f64 + 0.5) * CHUNK_LENGTH as f64;
    RingArc::new(wrap_arc_length(s), 0.0, 0.0)
}

pub fn chunk_index_to_ring_polar(chunk_index: i64) -> RingPolar {
    ring_arc_to_ring_polar(chunk_index_to_center_arc(chunk_index))
}

/// Every chunk index whose interval intersects `[center - d, center + d]`,
/// taken cyclically.  No duplicates; a distance of half the ring or more
/// returns every chunk.
pub fn chunks_in_range(center: i64, max_distance: i64) -> Vec<u32> {
    if max_distance < 0 {
        return Vec::new();
    }
    if max_distance >= RING_CIRCUMFERENCE / 2 {
        return (0..CHUNK_COUNT as u32).collect();
    }

    let center = wrap_position(center);
    let first = (center - max_distance).div_euclid(CHUNK_LENGTH);
    let last = (center + max_distance).div_euclid(CHUNK_LENGTH);

    let mut seen = HashSet::new();
    (first..=last)
        .map(wrap_chunk_index)
        .filter(|idx| seen.insert(*idx))
        .collect()
}

// ---------------------------------------------------------------------------
// Chunk id
// ---------------------------------------------------------------------------

/// `(floor, index)` pair, rendered as `"{floor}_{index}"` on the wire.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChunkId {
    pub floor: i32,
    pub index: u32,
}

impl ChunkId {
    /// Build an id, wrapping the index onto the ring.
    pub fn new(floor: i32, index: i64) -> Self {
        Self {
            floor,
            index: wrap_chunk_index(index),
        }
    }

    pub fn position_range(&self) -> (i64, i64) {
        chunk_index_to_position_range(self.index as i64)
    }

    pub fn center_arc(&self) -> RingArc {
        chunk_index_to_center_arc(self.index as i64)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.floor, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RingError::InvalidRequest(format!("invalid chunk id: {:?}", s));
        let (floor, index) = s.split_once('_').ok_or_else(invalid)?;
        let floor = floor.parse::<i32>().map_err(|_| invalid())?;
        let index = index.parse::<i64>().map_err(|_| invalid())?;
        if !(0..CHUNK_COUNT).contains(&index) {
            return Err(invalid());
        }
        Ok(Self::new(floor, index))
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ChunkId {
    type Error = RingError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Chunk store
// ---------------------------------------------------------------------------

/// What the streaming layer needs to know about a chunk.  Content itself
/// (buildings, terrain) lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: ChunkId,
    /// Half-open arc interval `[min_s, max_s)`.
    pub min_s: f64,
    pub max_s: f64,
    pub center: RingArc,
    /// Incremented whenever the chunk's content changes.
    pub version: u64,
}

/// Anything that can answer "does this chunk exist, and what is it".
pub trait ChunkStore: Send + Sync {
    fn chunk_metadata(&self, id: &ChunkId) -> Option<Arc<ChunkMetadata>>;
}

/// In-memory chunk store.  Floors outside the configured range do not
/// exist.  Lookups through [`ChunkStore`] never grow the cache; only
/// [`get_or_create`](Self::get_or_create) and version bumps insert.
pub struct ChunkCatalog {
    pub floors: RangeInclusive<i32>,
    cache: RwLock<HashMap<ChunkId, Arc<ChunkMetadata>>>,
}

impl ChunkCatalog {
    pub fn new(floors: RangeInclusive<i32>) -> Self {
        Self {
            floors,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn get_or_create(&self, id: ChunkId) -> Option<Arc<ChunkMetadata>> {
        if !self.floors.contains(&id.floor) {
            return None;
        }
        if let Some(meta) = self.cache.read().get(&id) {
            return Some(meta.clone());
        }

        let mut cache = self.cache.write();
        match cache.entry(id) {
            Entry::Occupied(e) => Some(e.get().clone()),
            Entry::Vacant(v) => {
                let meta = Arc::new(Self::describe(id, 1));
                v.insert(meta.clone());
                Some(meta)
            }
        }
    }

    /// Record a content change; returns the new version.
    pub fn bump_version(&self, id: ChunkId) -> Result<u64> {
        if !self.floors.contains(&id.floor) {
            return Err(RingError::InvalidRequest(format!(
                "floor {} outside {:?}",
                id.floor, self.floors
            )));
        }
        let mut cache = self.cache.write();
        let next = cache.get(&id).map(|m| m.version + 1).unwrap_or(2);
        cache.insert(id, Arc::new(Self::describe(id, next)));
        Ok(next)
    }

    /// Cached metadata, or a fresh version-1 description when the chunk was
    /// never cached.
    pub fn lookup(&self, id: ChunkId) -> Option<Arc<ChunkMetadata>> {
        if !self.floors.contains(&id.floor) {
            return None;
        }
        if let Some(meta) = self.cache.read().get(&id) {
            return Some(meta.clone());
        }
        Some(Arc::new(Self::describe(id, 1)))
    }

    /// Evict every unchanged cached chunk further than `max_chunks` from
    /// `center_index`, measured around the ring.  Bumped chunks stay so
    /// their versions survive.
    pub fn evict_distant_chunks(&self, center_index: u32, max_chunks: u32) {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|id, meta| {
            meta.version > 1 || chunk_distance(id.index, center_index) <= max_chunks
        });
        log::debug!(
            "Evicted {} chunk(s) beyond {} of chunk {}",
            before - cache.len(),
            max_chunks,
            center_index
        );
    }

    fn describe(id: ChunkId, version: u64) -> ChunkMetadata {
        let (min, max) = id.position_range();
        ChunkMetadata {
            chunk_id: id,
            min_s: min as f64,
            max_s: max as f64,
            center: id.center_arc(),
            version,
        }
    }
}

impl ChunkStore for ChunkCatalog {
    fn chunk_metadata(&self, id: &ChunkId) -> Option<Arc<ChunkMetadata>> {
        self.lookup(*id)
    }
}

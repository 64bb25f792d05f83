//! SubscriptionManager – per-observer streaming windows over the ring.
//!
//! The manager turns camera poses into chunk windows and zone query boxes
//! and reports what changed between successive poses.  It never loads chunk
//! or zone content itself; callers ask the stores for that.

use crate::chunk::ChunkId;
use crate::error::{Result, RingError};
use crate::types::{
    CameraPose, ChunkDelta, OwnerId, StreamStats, StreamingConfig, Subscription,
    SubscriptionPlan, SubscriptionRequest, SubscriptionState, ZoneBoundingBox, ZoneDelta, ZoneId,
};
use crate::wrap::{
    wrap_arc_length, CHUNK_COUNT, CHUNK_LENGTH, RING_CIRCUMFERENCE, RING_CIRCUMFERENCE_F,
};
use log::debug;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Window computation
// ---------------------------------------------------------------------------

/// Chunk ids within `radius_meters` of the pose, on the pose's floor, in
/// offset order from `-k` to `+k`.
pub fn compute_chunk_window(pose: &CameraPose, radius_meters: i64) -> Vec<ChunkId> {
    if radius_meters <= 0 {
        return Vec::new();
    }
    let center = pose.position.center_chunk_index() as i64;
    // Past half the ring every offset is already covered.
    let k = (radius_meters.min(RING_CIRCUMFERENCE) + CHUNK_LENGTH - 1) / CHUNK_LENGTH;
    let k = k.min(CHUNK_COUNT / 2);

    let mut seen = HashSet::new();
    (-k..=k)
        .map(|offset| ChunkId::new(pose.active_floor, center + offset))
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Zone query box around the pose using the default width limits.
pub fn compute_zone_bounding_box(
    pose: &CameraPose,
    radius_meters: i64,
    width_meters: f64,
) -> ZoneBoundingBox {
    compute_zone_bounding_box_with(pose, radius_meters, width_meters, &StreamingConfig::default())
}

pub fn compute_zone_bounding_box_with(
    pose: &CameraPose,
    radius_meters: i64,
    width_meters: f64,
    config: &StreamingConfig,
) -> ZoneBoundingBox {
    let arc = pose.position.to_ring_arc();
    let radius = radius_meters.max(0) as f64;

    let (min_s, max_s) = if 2.0 * radius >= RING_CIRCUMFERENCE_F {
        (0.0, RING_CIRCUMFERENCE_F)
    } else {
        (wrap_arc_length(arc.s - radius), wrap_arc_length(arc.s + radius))
    };

    let width = if width_meters > 0.0 {
        width_meters
    } else {
        config.default_width_meters
    };
    let half = width / 2.0;
    let limit = config.max_half_width_meters;
    // An observer off the deck still gets a non-empty box at the edge.
    let r = arc.r.max(-limit).min(limit);

    ZoneBoundingBox {
        floor: pose.active_floor,
        min_s,
        max_s,
        min_r: (r - half).max(-limit),
        max_r: (r + half).min(limit),
        min_z: arc.z - half,
        max_z: arc.z + half,
    }
}

/// Items of `next` missing from `prev`, and items of `prev` missing from
/// `next`, each in its source order.
fn diff<T: Eq + Hash + Copy>(prev: &[T], next: &[T]) -> (Vec<T>, Vec<T>) {
    let prev_set: HashSet<T> = prev.iter().copied().collect();
    let next_set: HashSet<T> = next.iter().copied().collect();
    let added = next.iter().filter(|x| !prev_set.contains(x)).copied().collect();
    let removed = prev.iter().filter(|x| !next_set.contains(x)).copied().collect();
    (added, removed)
}

// ---------------------------------------------------------------------------
// Subscription store
// ---------------------------------------------------------------------------

/// The live subscription table.  Shared with whatever else needs to look
/// subscriptions up.
#[derive(Default)]
pub struct SubscriptionStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.subscriptions.read().keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct SubscriptionManager {
    config: StreamingConfig,
    store: Arc<SubscriptionStore>,
    total_pose_updates: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(config: StreamingConfig, store: Arc<SubscriptionStore>) -> Self {
        Self {
            config,
            store,
            total_pose_updates: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    /// Bad coordinates are a bad request at this layer.
    fn validate_pose(&self, pose: &CameraPose) -> Result<()> {
        pose.validate().map_err(|e| RingError::InvalidRequest(e.to_string()))?;
        if !self.config.floor_range().contains(&pose.active_floor) {
            return Err(RingError::InvalidRequest(format!(
                "floor {} outside {:?}",
                pose.active_floor,
                self.config.floor_range()
            )));
        }
        Ok(())
    }

    fn window_for(&self, request: &SubscriptionRequest) -> Vec<ChunkId> {
        if request.include_chunks {
            compute_chunk_window(&request.pose, request.radius_meters)
        } else {
            Vec::new()
        }
    }

    fn bounding_box_for(&self, request: &SubscriptionRequest) -> Option<ZoneBoundingBox> {
        request.include_zones.then(|| {
            compute_zone_bounding_box_with(
                &request.pose,
                request.radius_meters,
                request.width_meters,
                &self.config,
            )
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Register a new subscription and compute its initial window.
    pub fn plan_subscription(
        &self,
        owner_id: OwnerId,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionPlan> {
        if request.radius_meters <= 0 {
            return Err(RingError::InvalidRequest(format!(
                "radius must be positive, got {}",
                request.radius_meters
            )));
        }
        if request.radius_meters > self.config.max_radius_meters {
            return Err(RingError::InvalidRequest(format!(
                "radius {} exceeds maximum {}",
                request.radius_meters, self.config.max_radius_meters
            )));
        }
        if !request.include_chunks && !request.include_zones {
            return Err(RingError::InvalidRequest(
                "subscription must include chunks or zones".into(),
            ));
        }
        self.validate_pose(&request.pose)?;

        let id = format!(
            "sub_{}_{}",
            request.pose.active_floor,
            uuid::Uuid::new_v4().simple()
        );
        let chunk_ids = self.window_for(&request);
        let zone_bounding_box = self.bounding_box_for(&request);

        debug!(
            "Planned subscription {} for owner {}: {} chunk(s), zones={}",
            id,
            owner_id,
            chunk_ids.len(),
            request.include_zones
        );

        let subscription = Subscription {
            id: id.clone(),
            owner_id,
            state: SubscriptionState::Planned,
            request,
            chunk_ids: chunk_ids.clone(),
            zone_bounding_box,
            zone_ids: Vec::new(),
            pose_updates: 0,
        };
        self.store.subscriptions.write().insert(id.clone(), subscription);

        Ok(SubscriptionPlan {
            subscription_id: id,
            chunk_ids,
            zone_bounding_box,
        })
    }

    /// Move a subscription to a new pose and report the chunk changes.
    pub fn update_pose(
        &self,
        owner_id: OwnerId,
        subscription_id: &str,
        pose: CameraPose,
    ) -> Result<ChunkDelta> {
        let mut subscriptions = self.store.subscriptions.write();
        let sub = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| RingError::SubscriptionNotFound(subscription_id.to_string()))?;
        if sub.owner_id != owner_id {
            return Err(RingError::OwnershipMismatch {
                subscription_id: subscription_id.to_string(),
                owner_id,
            });
        }
        self.validate_pose(&pose)?;

        let mut request = sub.request.clone();
        request.pose = pose;
        let window = self.window_for(&request);
        let (added, removed) = diff(&sub.chunk_ids, &window);

        sub.zone_bounding_box = self.bounding_box_for(&request);
        sub.request = request;
        sub.chunk_ids = window.clone();
        sub.state = SubscriptionState::Active;
        sub.pose_updates += 1;
        self.total_pose_updates.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Pose update on {}: +{} -{} chunk(s)",
            subscription_id,
            added.len(),
            removed.len()
        );

        Ok(ChunkDelta {
            subscription_id: subscription_id.to_string(),
            added,
            removed,
            current: window,
        })
    }

    /// Record the zones now visible to a subscription and report the change
    /// from the last delivered set.
    pub fn compute_zone_delta(
        &self,
        subscription_id: &str,
        zone_ids: &[ZoneId],
    ) -> Result<ZoneDelta> {
        let mut subscriptions = self.store.subscriptions.write();
        let sub = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| RingError::SubscriptionNotFound(subscription_id.to_string()))?;
        if !sub.request.include_zones {
            return Err(RingError::InvalidRequest(format!(
                "subscription {} does not include zones",
                subscription_id
            )));
        }

        let mut seen = HashSet::new();
        let current: Vec<ZoneId> = zone_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        let (added, removed) = diff(&sub.zone_ids, &current);
        sub.zone_ids = current.clone();

        Ok(ZoneDelta {
            subscription_id: subscription_id.to_string(),
            added,
            removed,
            current,
        })
    }

    pub fn get_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        self.store
            .subscriptions
            .read()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| RingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Remove a subscription; returns its final state.
    pub fn close_subscription(&self, owner_id: OwnerId, subscription_id: &str) -> Result<Subscription> {
        let mut subscriptions = self.store.subscriptions.write();
        match subscriptions.get(subscription_id) {
            None => Err(RingError::SubscriptionNotFound(subscription_id.to_string())),
            Some(sub) if sub.owner_id != owner_id => Err(RingError::OwnershipMismatch {
                subscription_id: subscription_id.to_string(),
                owner_id,
            }),
            Some(_) => {
                debug!("Closed subscription {}", subscription_id);
                subscriptions
                    .remove(subscription_id)
                    .ok_or_else(|| RingError::SubscriptionNotFound(subscription_id.to_string()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> StreamStats {
        let subscriptions = self.store.subscriptions.read();
        let mut stats = StreamStats {
            total_pose_updates: self.total_pose_updates.load(Ordering::Relaxed),
            ..StreamStats::default()
        };
        for sub in subscriptions.values() {
            match sub.state {
                SubscriptionState::Planned => stats.planned_subscriptions += 1,
                SubscriptionState::Active => stats.active_subscriptions += 1,
            }
        }
        stats
    }
}

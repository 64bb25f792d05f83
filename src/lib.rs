//! Ring Stream
//!
//! Wrap-aware spatial and streaming engine for a closed-loop ring world
//! 264,000 km around.
//!
//! ## Architecture
//!
//! ```text
//! StreamAgent  (agent.rs)
//!   ├── SubscriptionManager  (service.rs)  ← chunk windows, zone boxes, deltas
//!   │     └── SubscriptionStore
//!   ├── InMemoryZoneStore    (zones.rs)    ← merge / dezone / conflicts
//!   │     └── geometry.rs                  ← wrap-aware polygon ops
//!   └── ChunkCatalog         (chunk.rs)    ← chunk metadata cache
//!
//! wrap.rs / coords.rs / stations.rs        ← ring math, frames, hubs
//! ```
//!
//! Everything along the ring is cyclic: positions wrap at the circumference
//! and chunk indices at the chunk count.

// Core modules are always available (no server feature needed).
pub mod chunk;
pub mod coords;
pub mod error;
pub mod geometry;
pub mod protocol;
pub mod service;
pub mod stations;
pub mod types;
pub mod wrap;
pub mod zones;

// Runtime modules require the `server` feature.
#[cfg(feature = "server")]
pub mod agent;
#[cfg(feature = "server")]
pub mod settings;

// Convenience re-exports
#[cfg(feature = "server")]
pub use agent::{Outbound, StreamAgent, StreamAgentConfig};
pub use chunk::{ChunkCatalog, ChunkId, ChunkMetadata, ChunkStore};
pub use coords::{Er0Point, RingArc, RingPolar};
pub use error::{ConflictZoneInfo, Result, RingError};
pub use geometry::{Point, Polygon, ZoneGeometry};
pub use service::{SubscriptionManager, SubscriptionStore};
#[cfg(feature = "server")]
pub use settings::Settings;
pub use types::{
    CameraPose, ChunkDelta, PosePosition, StreamStats, StreamingConfig, Subscription,
    SubscriptionPlan, SubscriptionRequest, SubscriptionState, ZoneBoundingBox, ZoneDelta,
};
pub use zones::{InMemoryZoneStore, Zone, ZoneStore};

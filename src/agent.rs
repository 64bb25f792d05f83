//! StreamAgent – drives the subscription manager and stores from a
//! line-delimited command stream.
//!
//! ## Event contract (inbound)
//!
//! One [`CommandEnvelope`] JSON object per line.
//!
//! | `command.type` | Effect                                           |
//! |----------------|--------------------------------------------------|
//! | `subscribe`    | `plan_subscription`, initial zone delta          |
//! | `update_pose`  | `update_pose`, chunk delta, zone delta           |
//! | `unsubscribe`  | `close_subscription`                             |
//! | `create_zone`  | `InMemoryZoneStore::create_zone`                 |
//! | `dezone`       | `InMemoryZoneStore::dezone`                      |
//! | `delete_zone`  | `InMemoryZoneStore::delete_zone`                 |
//! | `stats`        | reply with `StreamStats`                         |
//!
//! ## Event contract (outbound)
//!
//! Each event is written as `{subject} {json}\n`.
//!
//! | Subject                       | Payload type                          |
//! |-------------------------------|---------------------------------------|
//! | `stream.subscription.planned` | `StreamEvent<SubscriptionPlan>`       |
//! | `stream.chunk.delta`          | `StreamEvent<ChunkDeltaPayload>`      |
//! | `stream.zone.delta`           | `StreamEvent<ZoneDeltaPayload>`       |
//! | `stream.subscription.closed`  | `StreamEvent<SubscriptionClosed>`     |
//! | `zone.changed`                | `StreamEvent<ZoneChanged>`            |
//! | `stream.stats`                | `StreamEvent<StreamStats>`            |
//! | `stream.error`                | `StreamEvent<StreamError>`            |

use crate::chunk::ChunkStore;
use crate::error::RingError;
use crate::protocol::{
    subjects, ChunkDeltaPayload, CommandEnvelope, StreamCommand, StreamError, StreamEvent,
    SubscriptionClosed, ZoneChanged, ZoneDeltaPayload,
};
use crate::service::SubscriptionManager;
use crate::types::{CameraPose, ChunkDelta, OwnerId, SubscriptionRequest};
use crate::zones::{InMemoryZoneStore, ZoneStore};
use anyhow::{Context, Result};
use bytes::Bytes;
use log::{info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StreamAgentConfig {
    /// Session stamped on every event.
    pub session: String,
}

impl Default for StreamAgentConfig {
    fn default() -> Self {
        Self {
            session: "default".into(),
        }
    }
}

/// One encoded event ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub subject: &'static str,
    pub payload: Bytes,
}

// ---------------------------------------------------------------------------
// StreamAgent
// ---------------------------------------------------------------------------

pub struct StreamAgent {
    config: StreamAgentConfig,
    manager: Arc<SubscriptionManager>,
    zones: Arc<InMemoryZoneStore>,
    chunks: Arc<dyn ChunkStore>,
    frame: AtomicU64,
}

impl StreamAgent {
    pub fn new(
        config: StreamAgentConfig,
        manager: Arc<SubscriptionManager>,
        zones: Arc<InMemoryZoneStore>,
        chunks: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            config,
            manager,
            zones,
            chunks,
            frame: AtomicU64::new(0),
        }
    }

    /// Read commands until EOF or `shutdown` resolves, writing every
    /// resulting event to `output`.
    pub async fn run<R, W, F>(&self, input: R, mut output: W, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        info!("StreamAgent running in session '{}'", self.config.session);
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read command stream")?,
                _ = &mut shutdown => {
                    info!("StreamAgent shutting down");
                    break;
                }
            };
            let Some(line) = line else {
                info!("Command stream closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            for out in self.handle_line(&line) {
                output
                    .write_all(out.subject.as_bytes())
                    .await
                    .context("failed to write event")?;
                output.write_all(b" ").await?;
                output.write_all(&out.payload).await?;
                output.write_all(b"\n").await?;
            }
            output.flush().await.context("failed to flush events")?;
        }

        Ok(())
    }

    /// Parse and handle one command line.
    pub fn handle_line(&self, line: &str) -> Vec<Outbound> {
        match serde_json::from_str::<CommandEnvelope>(line) {
            Ok(envelope) => self.handle(envelope),
            Err(e) => {
                let frame = self.next_frame();
                let error = StreamError {
                    code: "malformed_command".into(),
                    message: e.to_string(),
                    conflicts: None,
                };
                self.encode(subjects::ERROR, frame, &error).into_iter().collect()
            }
        }
    }

    /// Handle one command and return the events it produced.
    pub fn handle(&self, envelope: CommandEnvelope) -> Vec<Outbound> {
        let frame = self.next_frame();
        let owner_id = envelope.owner_id;
        let _span =
            tracing::debug_span!("command", owner_id, kind = envelope.command.kind(), frame)
                .entered();

        let mut out = Vec::new();
        if let Err(e) = self.dispatch(owner_id, envelope.command, frame, &mut out) {
            if e.is_caller_error() {
                tracing::debug!("Command rejected: {}", e);
            } else {
                warn!("Command failed: {}", e);
            }
            out.extend(self.encode(subjects::ERROR, frame, &StreamError::from(&e)));
        }
        out
    }

    fn dispatch(
        &self,
        owner_id: OwnerId,
        command: StreamCommand,
        frame: u64,
        out: &mut Vec<Outbound>,
    ) -> Result<(), RingError> {
        match command {
            StreamCommand::Subscribe(wire) => {
                let request = SubscriptionRequest::try_from(wire)?;
                let plan = self.manager.plan_subscription(owner_id, request)?;
                out.extend(self.encode(subjects::SUBSCRIPTION_PLANNED, frame, &plan));
                if plan.zone_bounding_box.is_some() {
                    self.publish_zone_delta(&plan.subscription_id, frame, out)?;
                }
            }
            StreamCommand::UpdatePose {
                subscription_id,
                pose,
            } => {
                let pose = CameraPose::try_from(pose)?;
                let delta = self.manager.update_pose(owner_id, &subscription_id, pose)?;
                self.publish_chunk_delta(delta, frame, out);
                let sub = self.manager.get_subscription(&subscription_id)?;
                if sub.request.include_zones {
                    self.publish_zone_delta(&subscription_id, frame, out)?;
                }
            }
            StreamCommand::Unsubscribe { subscription_id } => {
                self.manager.close_subscription(owner_id, &subscription_id)?;
                out.extend(self.encode(
                    subjects::SUBSCRIPTION_CLOSED,
                    frame,
                    &SubscriptionClosed { subscription_id },
                ));
            }
            StreamCommand::CreateZone(input) => {
                let result = self.zones.create_zone(input)?;
                out.extend(self.encode(subjects::ZONE_CHANGED, frame, &ZoneChanged::from(result)));
            }
            StreamCommand::Dezone { floor, geometry } => {
                let result = self.zones.dezone(floor, &geometry, owner_id)?;
                out.extend(self.encode(subjects::ZONE_CHANGED, frame, &ZoneChanged::from(result)));
            }
            StreamCommand::DeleteZone { zone_id } => {
                let zone = self.zones.get_zone(zone_id).ok_or(RingError::ZoneNotFound(zone_id))?;
                if zone.owner_id.is_some() && zone.owner_id != Some(owner_id) {
                    return Err(RingError::ZoneOwnershipMismatch { zone_id, owner_id });
                }
                self.zones.delete_zone(zone_id)?;
                let changed = ZoneChanged {
                    deleted: vec![zone_id],
                    ..Default::default()
                };
                out.extend(self.encode(subjects::ZONE_CHANGED, frame, &changed));
            }
            StreamCommand::Stats => {
                out.extend(self.encode(subjects::STATS, frame, &self.manager.stats()));
            }
        }
        Ok(())
    }

    fn publish_chunk_delta(&self, delta: ChunkDelta, frame: u64, out: &mut Vec<Outbound>) {
        let added_chunks = delta
            .added
            .iter()
            .filter_map(|id| self.chunks.chunk_metadata(id))
            .map(|meta| (*meta).clone())
            .collect();
        let payload = ChunkDeltaPayload {
            delta,
            added_chunks,
        };
        out.extend(self.encode(subjects::CHUNK_DELTA, frame, &payload));
    }

    fn publish_zone_delta(
        &self,
        subscription_id: &str,
        frame: u64,
        out: &mut Vec<Outbound>,
    ) -> Result<(), RingError> {
        let sub = self.manager.get_subscription(subscription_id)?;
        let Some(bbox) = sub.zone_bounding_box else {
            return Ok(());
        };
        let ids = self.zones.zones_in_box(&bbox);
        let delta = self.manager.compute_zone_delta(subscription_id, &ids)?;
        let added_zones = delta
            .added
            .iter()
            .filter_map(|id| self.zones.get_zone(*id))
            .collect();
        let payload = ZoneDeltaPayload { delta, added_zones };
        out.extend(self.encode(subjects::ZONE_DELTA, frame, &payload));
        Ok(())
    }

    fn next_frame(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Serialise `payload` inside a [`StreamEvent`].
    ///
    /// Errors are logged and swallowed: one unencodable event should not
    /// stop the stream.
    fn encode<T: serde::Serialize>(
        &self,
        subject: &'static str,
        frame: u64,
        payload: &T,
    ) -> Option<Outbound> {
        let event = StreamEvent::new(self.config.session.as_str(), frame, payload);
        match serde_json::to_vec(&event) {
            Ok(bytes) => Some(Outbound {
                subject,
                payload: Bytes::from(bytes),
            }),
            Err(e) => {
                warn!("Failed to serialise event for {}: {}", subject, e);
                None
            }
        }
    }
}

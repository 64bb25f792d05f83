//! Zone store: floor-scoped zone polygons with merge, dezone and conflict
//! policies on top of the wrap-aware geometry operations.

use crate::chunk::ChunkId;
use crate::error::{ConflictZoneInfo, Result, RingError};
use crate::geometry::{self, ZoneGeometry};
use crate::types::{OwnerId, StreamingConfig, ZoneBoundingBox, ZoneId};
use crate::wrap::RING_CIRCUMFERENCE_F;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Zone records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub zone_type: String,
    pub floor: i32,
    /// `None` for unowned zones.
    pub owner_id: Option<OwnerId>,
    pub is_system_zone: bool,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub geometry: ZoneGeometry,
    /// Area in m², measured in normalized space.
    pub area: f64,
    /// Bumped on every change.
    pub revision: u64,
}

impl Zone {
    fn merges_with(&self, zone_type: &str, owner_id: Option<OwnerId>, is_system_zone: bool) -> bool {
        self.zone_type == zone_type
            && self.owner_id == owner_id
            && self.is_system_zone == is_system_zone
    }

    fn conflict_info(&self) -> ConflictZoneInfo {
        ConflictZoneInfo {
            id: self.id,
            name: self.name.clone(),
            zone_type: self.zone_type.clone(),
        }
    }
}

/// How to settle a new zone overlapping the same owner's zone of another
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// The new shape is cut out of the existing zone.
    NewWins,
    /// The existing zone is cut out of the new shape.
    ExistingWins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneCreateInput {
    pub name: String,
    pub zone_type: String,
    pub floor: i32,
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(default)]
    pub is_system_zone: bool,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub geometry: ZoneGeometry,
    #[serde(default)]
    pub conflict_resolution: Option<ConflictResolution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdateInput {
    pub name: Option<String>,
    pub zone_type: Option<String>,
    pub properties: Option<HashMap<String, serde_json::Value>>,
    pub geometry: Option<ZoneGeometry>,
}

/// Every zone touched by a create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneCreateResult {
    pub created: Vec<Zone>,
    pub updated: Vec<Zone>,
    pub deleted: Vec<ZoneId>,
}

/// Every zone touched by a dezone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DezoneResult {
    pub updated: Vec<Zone>,
    pub created: Vec<Zone>,
    pub deleted: Vec<ZoneId>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// What the streaming layer reads from the zone store.
pub trait ZoneStore: Send + Sync {
    /// Ids of zones on the box's floor whose extent intersects it, ascending.
    fn zones_in_box(&self, bbox: &ZoneBoundingBox) -> Vec<ZoneId>;
    fn get_zone(&self, id: ZoneId) -> Option<Zone>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ZoneTable {
    zones: BTreeMap<ZoneId, Zone>,
    next_id: ZoneId,
}

impl ZoneTable {
    fn allocate_id(&mut self) -> ZoneId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn on_floor(&self, floor: i32) -> impl Iterator<Item = &Zone> {
        self.zones.values().filter(move |z| z.floor == floor)
    }

    /// Insert a zone built from `template` with a fresh id.
    fn insert_like(&mut self, template: &Zone, geometry: ZoneGeometry) -> Result<Zone> {
        let zone = Zone {
            id: self.allocate_id(),
            area: geometry::area(&geometry)?,
            geometry,
            revision: 1,
            ..template.clone()
        };
        self.zones.insert(zone.id, zone.clone());
        Ok(zone)
    }

    fn replace_geometry(&mut self, id: ZoneId, geometry: ZoneGeometry) -> Result<Zone> {
        let area = geometry::area(&geometry)?;
        let zone = self.zones.get_mut(&id).ok_or(RingError::ZoneNotFound(id))?;
        zone.geometry = geometry;
        zone.area = area;
        zone.revision += 1;
        Ok(zone.clone())
    }

    /// Cut `clip` out of zone `id`.  The zone keeps the first remaining
    /// piece, further pieces become new zones, and nothing left deletes it.
    fn subtract_from(
        &mut self,
        id: ZoneId,
        clip: &ZoneGeometry,
        updated: &mut Vec<Zone>,
        created: &mut Vec<Zone>,
        deleted: &mut Vec<ZoneId>,
    ) -> Result<()> {
        let zone = self.zones.get(&id).cloned().ok_or(RingError::ZoneNotFound(id))?;
        let mut pieces = geometry::difference(&zone.geometry, clip)?.into_iter();
        match pieces.next() {
            None => {
                self.zones.remove(&id);
                deleted.push(id);
            }
            Some(first) => {
                updated.push(self.replace_geometry(id, ZoneGeometry::Polygon(first))?);
                for piece in pieces {
                    created.push(self.insert_like(&zone, ZoneGeometry::Polygon(piece))?);
                }
            }
        }
        Ok(())
    }
}

/// Zones kept in memory behind one lock.  Every edit works on a copy of the
/// table and swaps it in only when the whole edit succeeded.
pub struct InMemoryZoneStore {
    config: StreamingConfig,
    table: RwLock<ZoneTable>,
}

impl InMemoryZoneStore {
    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            table: RwLock::new(ZoneTable {
                zones: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// A store holding `zones` exactly as given, for loading a saved table.
    /// New ids continue after the highest loaded id.
    pub fn with_zones(config: StreamingConfig, zones: impl IntoIterator<Item = Zone>) -> Self {
        let zones: BTreeMap<ZoneId, Zone> = zones.into_iter().map(|z| (z.id, z)).collect();
        let next_id = zones.keys().next_back().map_or(1, |id| id + 1);
        info!("Loaded {} zone(s)", zones.len());
        Self {
            config,
            table: RwLock::new(ZoneTable { zones, next_id }),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().zones.is_empty()
    }

    pub fn list_by_owner(&self, owner_id: OwnerId) -> Vec<Zone> {
        self.table
            .read()
            .zones
            .values()
            .filter(|z| z.owner_id == Some(owner_id))
            .cloned()
            .collect()
    }

    pub fn list_by_floor(&self, floor: i32) -> Vec<Zone> {
        self.table.read().on_floor(floor).cloned().collect()
    }

    /// Zones whose extent reaches into the chunk's half-open interval
    /// `[min, max)`.  A zone that only touches a chunk boundary is not
    /// reported for that chunk.
    pub fn zones_overlapping_chunk(&self, chunk: ChunkId) -> Vec<ZoneId> {
        let (min, max) = chunk.position_range();
        let (min, max) = (min as f64, max as f64);
        let table = self.table.read();
        table
            .on_floor(chunk.floor)
            .filter(|zone| {
                let Some(((x0, x1), _)) = extent(zone) else {
                    return false;
                };
                [-RING_CIRCUMFERENCE_F, 0.0, RING_CIRCUMFERENCE_F]
                    .iter()
                    .any(|shift| x0 + shift < max && x1 + shift > min)
            })
            .map(|zone| zone.id)
            .collect()
    }

    pub fn delete_zone(&self, id: ZoneId) -> Result<Zone> {
        let removed = self
            .table
            .write()
            .zones
            .remove(&id)
            .ok_or(RingError::ZoneNotFound(id))?;
        info!("Deleted zone {} ({})", id, removed.name);
        Ok(removed)
    }

    pub fn update_zone(&self, id: ZoneId, input: ZoneUpdateInput) -> Result<Zone> {
        let mut table = self.table.write();
        let mut zone = table.zones.get(&id).cloned().ok_or(RingError::ZoneNotFound(id))?;

        if let Some(name) = input.name {
            if name.trim().is_empty() {
                return Err(RingError::InvalidRequest("zone name is required".into()));
            }
            zone.name = name;
        }
        if let Some(zone_type) = input.zone_type {
            if zone_type.trim().is_empty() {
                return Err(RingError::InvalidRequest("zone type is required".into()));
            }
            zone.zone_type = zone_type;
        }
        if let Some(properties) = input.properties {
            zone.properties = properties;
        }
        if let Some(geometry) = input.geometry {
            geometry.validate_canonical(self.config.max_half_width_meters)?;
            zone.area = geometry::area(&geometry)?;
            zone.geometry = geometry;
        }
        zone.revision += 1;
        table.zones.insert(id, zone.clone());
        info!("Updated zone {} to revision {}", id, zone.revision);
        Ok(zone)
    }

    fn validate_input(&self, input: &ZoneCreateInput) -> Result<()> {
        if input.name.trim().is_empty() {
            return Err(RingError::InvalidRequest("zone name is required".into()));
        }
        if input.zone_type.trim().is_empty() {
            return Err(RingError::InvalidRequest("zone type is required".into()));
        }
        if !self.config.floor_range().contains(&input.floor) {
            return Err(RingError::InvalidRequest(format!(
                "floor {} outside {:?}",
                input.floor,
                self.config.floor_range()
            )));
        }
        input.geometry.validate_canonical(self.config.max_half_width_meters)?;
        geometry::normalize(&input.geometry)?;
        Ok(())
    }

    /// Add a zone, applying the system-zone, conflict and merge policies.
    pub fn create_zone(&self, input: ZoneCreateInput) -> Result<ZoneCreateResult> {
        self.validate_input(&input)?;

        let mut guard = self.table.write();
        let mut draft = guard.clone();
        let mut result = ZoneCreateResult::default();

        let mut overlapping = Vec::new();
        for zone in draft.on_floor(input.floor) {
            if geometry::overlaps(&zone.geometry, &input.geometry)? {
                overlapping.push(zone.clone());
            }
        }

        let mut shape = input.geometry.clone();

        // System zones always keep their area.
        if !input.is_system_zone {
            for system in overlapping.iter().filter(|z| z.is_system_zone) {
                shape = ZoneGeometry::from_polygons(geometry::difference(&shape, &system.geometry)?)
                    .ok_or_else(|| {
                        RingError::InvalidRequest(format!(
                            "zone is entirely covered by system zone {}",
                            system.id
                        ))
                    })?;
            }
        }

        // Same owner, different type.
        let mut conflicts = Vec::new();
        if let Some(owner) = input.owner_id {
            for zone in &overlapping {
                if zone.is_system_zone
                    || zone.owner_id != Some(owner)
                    || zone.zone_type == input.zone_type
                {
                    continue;
                }
                if geometry::overlaps(&zone.geometry, &shape)? {
                    conflicts.push(zone.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            match input.conflict_resolution {
                None => {
                    return Err(RingError::ZoneConflict {
                        conflicts: conflicts.iter().map(Zone::conflict_info).collect(),
                        new_zone_type: input.zone_type.clone(),
                    });
                }
                Some(ConflictResolution::NewWins) => {
                    for zone in &conflicts {
                        draft.subtract_from(
                            zone.id,
                            &shape,
                            &mut result.updated,
                            &mut result.created,
                            &mut result.deleted,
                        )?;
                    }
                }
                Some(ConflictResolution::ExistingWins) => {
                    for zone in &conflicts {
                        shape = ZoneGeometry::from_polygons(geometry::difference(
                            &shape,
                            &zone.geometry,
                        )?)
                        .ok_or_else(|| {
                            RingError::InvalidRequest(format!(
                                "zone is entirely covered by existing zone {}",
                                zone.id
                            ))
                        })?;
                    }
                }
            }
        }

        let template = Zone {
            id: 0,
            name: input.name.clone(),
            zone_type: input.zone_type.clone(),
            floor: input.floor,
            owner_id: input.owner_id,
            is_system_zone: input.is_system_zone,
            properties: input.properties.clone(),
            geometry: shape.clone(),
            area: 0.0,
            revision: 1,
        };

        let mut components = shape.components().into_iter();
        if let Some(first) = components.next() {
            let merged = merge_into(&mut draft, &template, first, &mut result.deleted)?;
            match merged {
                Merged::Existing(zone) => result.updated.push(zone),
                Merged::New(zone) => result.created.push(zone),
            }
        }
        for component in components {
            result.created.push(draft.insert_like(&template, component)?);
        }

        *guard = draft;
        info!(
            "Created zone {:?} on floor {}: {} created, {} updated, {} deleted",
            input.name,
            input.floor,
            result.created.len(),
            result.updated.len(),
            result.deleted.len()
        );
        Ok(result)
    }

    /// Subtract `shape` from every overlapping zone `editor` owns on
    /// `floor`.  Zones owned by others, unowned zones and system zones are
    /// left alone.
    pub fn dezone(&self, floor: i32, shape: &ZoneGeometry, editor: OwnerId) -> Result<DezoneResult> {
        shape.validate_canonical(self.config.max_half_width_meters)?;
        geometry::normalize(shape)?;

        let mut guard = self.table.write();
        let mut draft = guard.clone();
        let mut result = DezoneResult::default();

        let mut targets = Vec::new();
        for zone in draft.on_floor(floor) {
            if zone.owner_id != Some(editor) || zone.is_system_zone {
                continue;
            }
            if geometry::overlaps(&zone.geometry, shape)? {
                targets.push(zone.id);
            }
        }

        for id in targets {
            draft.subtract_from(
                id,
                shape,
                &mut result.updated,
                &mut result.created,
                &mut result.deleted,
            )?;
        }

        *guard = draft;
        info!(
            "Dezone on floor {} by {}: {} updated, {} created, {} deleted",
            floor,
            editor,
            result.updated.len(),
            result.created.len(),
            result.deleted.len()
        );
        Ok(result)
    }
}

enum Merged {
    Existing(Zone),
    New(Zone),
}

/// Merge `shape` with every zone of the same kind it overlaps, directly or
/// through other merged zones.  The oldest zone survives.
fn merge_into(
    table: &mut ZoneTable,
    template: &Zone,
    shape: ZoneGeometry,
    deleted: &mut Vec<ZoneId>,
) -> Result<Merged> {
    let candidates: Vec<Zone> = table
        .on_floor(template.floor)
        .filter(|z| z.merges_with(&template.zone_type, template.owner_id, template.is_system_zone))
        .cloned()
        .collect();

    let mut merged_ids: Vec<ZoneId> = Vec::new();
    let mut accumulated = shape;
    loop {
        let mut grew = false;
        for zone in &candidates {
            if merged_ids.contains(&zone.id) {
                continue;
            }
            if geometry::overlaps(&accumulated, &zone.geometry)? {
                accumulated = geometry::union(&[accumulated, zone.geometry.clone()])?;
                merged_ids.push(zone.id);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    let Some(&keep) = merged_ids.iter().min() else {
        return Ok(Merged::New(table.insert_like(template, accumulated)?));
    };
    for id in merged_ids.iter().filter(|id| **id != keep) {
        table.zones.remove(id);
        deleted.push(*id);
    }
    debug!("Merged {} zone(s) into zone {}", merged_ids.len(), keep);
    Ok(Merged::Existing(table.replace_geometry(keep, accumulated)?))
}

/// Normalized x and y bounds of a stored zone.  A zone that can't be
/// normalized is logged and skipped by the spatial queries.
fn extent(zone: &Zone) -> Option<((f64, f64), (f64, f64))> {
    match geometry::normalize(&zone.geometry) {
        Ok(normalized) => Some((normalized.x_bounds(), normalized.y_bounds())),
        Err(e) => {
            warn!("Zone {} has unusable geometry, skipped: {}", zone.id, e);
            None
        }
    }
}

impl ZoneStore for InMemoryZoneStore {
    fn zones_in_box(&self, bbox: &ZoneBoundingBox) -> Vec<ZoneId> {
        let table = self.table.read();
        table
            .on_floor(bbox.floor)
            .filter(|zone| match extent(zone) {
                Some(((x0, x1), (y0, y1))) => {
                    bbox.intersects_s_range(x0, x1) && bbox.intersects_r_range(y0, y1)
                }
                None => false,
            })
            .map(|zone| zone.id)
            .collect()
    }

    fn get_zone(&self, id: ZoneId) -> Option<Zone> {
        self.table.read().zones.get(&id).cloned()
    }
}


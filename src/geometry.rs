//! Zone polygons and wrap-aware boolean operations.
//!
//! Zone geometry is stored in canonical coordinates, `x` in `[0, C)` along
//! the ring and `y` the radial offset.  A zone that crosses the seam at
//! `x = 0` therefore has vertices near both ends of that range.  Before any
//! union, difference or overlap test the operands are normalized into a
//! contiguous x-space, aligned to each other, clipped, and the result is
//! wrapped back into canonical form.

use crate::error::{Result, RingError};
use crate::wrap::{wrap_arc_length, HALF_RING_F, RING_CIRCUMFERENCE_F};
use clipper2::{FillRule, Paths};
use serde::{Deserialize, Serialize};

/// Intersections smaller than this (m²) count as touching, not overlapping.
pub const OVERLAP_EPSILON: f64 = 0.01;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A vertex; `[x, y]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// A polygon with an outer ring and zero or more holes.  Rings are closed
/// (first point repeated at the end).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<Point>>", into = "Vec<Vec<Point>>")]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub interiors: Vec<Vec<Point>>,
}

impl From<Vec<Vec<Point>>> for Polygon {
    fn from(mut rings: Vec<Vec<Point>>) -> Self {
        if rings.is_empty() {
            return Self::default();
        }
        let exterior = rings.remove(0);
        Self {
            exterior,
            interiors: rings,
        }
    }
}

impl From<Polygon> for Vec<Vec<Point>> {
    fn from(polygon: Polygon) -> Self {
        let mut rings = Vec::with_capacity(polygon.interiors.len() + 1);
        rings.push(polygon.exterior);
        rings.extend(polygon.interiors);
        rings
    }
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Axis-aligned rectangle, counter-clockwise and closed.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            vec![
                Point::new(min_x, min_y),
                Point::new(max_x, min_y),
                Point::new(max_x, max_y),
                Point::new(min_x, max_y),
                Point::new(min_x, min_y),
            ],
            Vec::new(),
        )
    }

    /// Regular polygon approximating a circle, in canonical coordinates:
    /// a circle drawn over the seam comes out split across both ends of
    /// `[0, C)` like any stored zone.
    pub fn circle(center: Point, radius: f64, segments: usize) -> Self {
        Self::new(circle_ring(center, radius, segments, true), Vec::new())
    }

    /// Ring-shaped zone: an outer circle with one circular hole.
    pub fn torus(center: Point, outer_radius: f64, inner_radius: f64, segments: usize) -> Self {
        Self::new(
            circle_ring(center, outer_radius, segments, true),
            vec![circle_ring(center, inner_radius, segments, false)],
        )
    }

    pub fn rings(&self) -> impl Iterator<Item = &Vec<Point>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }

    fn rings_mut(&mut self) -> impl Iterator<Item = &mut Vec<Point>> {
        std::iter::once(&mut self.exterior).chain(self.interiors.iter_mut())
    }

    /// Outer area minus hole area.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| signed_area(r).abs()).sum();
        signed_area(&self.exterior).abs() - holes
    }
}

/// GeoJSON-style zone geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum ZoneGeometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl ZoneGeometry {
    /// `None` when there are no polygons left.
    pub fn from_polygons(mut polygons: Vec<Polygon>) -> Option<Self> {
        match polygons.len() {
            0 => None,
            1 => polygons.pop().map(ZoneGeometry::Polygon),
            _ => Some(ZoneGeometry::MultiPolygon(polygons)),
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        match self {
            ZoneGeometry::Polygon(p) => std::slice::from_ref(p),
            ZoneGeometry::MultiPolygon(ps) => ps,
        }
    }

    pub fn into_polygons(self) -> Vec<Polygon> {
        match self {
            ZoneGeometry::Polygon(p) => vec![p],
            ZoneGeometry::MultiPolygon(ps) => ps,
        }
    }

    /// Each polygon as its own geometry.
    pub fn components(&self) -> Vec<ZoneGeometry> {
        self.polygons()
            .iter()
            .cloned()
            .map(ZoneGeometry::Polygon)
            .collect()
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.polygons()
            .iter()
            .flat_map(|p| p.rings())
            .flat_map(|r| r.iter())
    }

    pub fn x_bounds(&self) -> (f64, f64) {
        bounds(self.points().map(|p| p.x))
    }

    pub fn y_bounds(&self) -> (f64, f64) {
        bounds(self.points().map(|p| p.y))
    }

    pub fn area(&self) -> f64 {
        self.polygons().iter().map(Polygon::area).sum()
    }

    /// Structural checks: at least one polygon, every ring closed with at
    /// least four finite points, and `|y|` within `max_half_width`.
    pub fn validate(&self, max_half_width: f64) -> Result<()> {
        if self.polygons().is_empty() {
            return Err(RingError::InvalidGeometry("geometry has no polygons".into()));
        }
        for ring in self.polygons().iter().flat_map(|p| p.rings()) {
            if ring.len() < 4 {
                return Err(RingError::InvalidGeometry(format!(
                    "ring has {} points, need at least 4",
                    ring.len()
                )));
            }
            if ring.first() != ring.last() {
                return Err(RingError::InvalidGeometry("ring is not closed".into()));
            }
            for p in ring {
                if !p.x.is_finite() || !p.y.is_finite() {
                    return Err(RingError::InvalidGeometry(format!(
                        "non-finite vertex [{}, {}]",
                        p.x, p.y
                    )));
                }
                if p.y.abs() > max_half_width {
                    return Err(RingError::InvalidGeometry(format!(
                        "vertex y={} exceeds ring half-width {}",
                        p.y, max_half_width
                    )));
                }
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the stored-form rule: every `x`
    /// lies in `[0, C]`.
    pub fn validate_canonical(&self, max_half_width: f64) -> Result<()> {
        self.validate(max_half_width)?;
        match self.points().find(|p| !(0.0..=RING_CIRCUMFERENCE_F).contains(&p.x)) {
            Some(p) => Err(RingError::InvalidGeometry(format!(
                "vertex x={} outside [0, {}]",
                p.x, RING_CIRCUMFERENCE_F
            ))),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Geometry moved into a contiguous x-space; `x` may be negative or exceed
/// `C` here.  Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGeometry {
    pub polygons: Vec<Polygon>,
    /// Whether the seam shift was applied.
    pub shifted: bool,
}

impl NormalizedGeometry {
    pub fn x_bounds(&self) -> (f64, f64) {
        bounds(self.all_points().map(|p| p.x))
    }

    pub fn y_bounds(&self) -> (f64, f64) {
        bounds(self.all_points().map(|p| p.y))
    }

    fn all_points(&self) -> impl Iterator<Item = &Point> {
        self.polygons
            .iter()
            .flat_map(|p| p.rings())
            .flat_map(|r| r.iter())
    }

    fn x_mid(&self) -> f64 {
        let (lo, hi) = self.x_bounds();
        (lo + hi) / 2.0
    }

    fn shift_x(&mut self, dx: f64) {
        if dx == 0.0 {
            return;
        }
        for polygon in &mut self.polygons {
            for ring in polygon.rings_mut() {
                for p in ring.iter_mut() {
                    p.x += dx;
                }
            }
        }
    }

    fn bbox_overlaps(&self, other: &NormalizedGeometry) -> bool {
        let (ax0, ax1) = self.x_bounds();
        let (bx0, bx1) = other.x_bounds();
        let (ay0, ay1) = self.y_bounds();
        let (by0, by1) = other.y_bounds();
        ax0 <= bx1 && bx0 <= ax1 && ay0 <= by1 && by0 <= ay1
    }

    /// Back to canonical coordinates.
    pub fn rewrap(mut self) -> Option<ZoneGeometry> {
        for polygon in &mut self.polygons {
            for ring in polygon.rings_mut() {
                for p in ring.iter_mut() {
                    p.x = wrap_arc_length(p.x);
                }
            }
        }
        ZoneGeometry::from_polygons(self.polygons)
    }
}

/// A geometry needs seam handling when it spans more than half the ring or
/// reaches past the ring's midpoint.
pub fn is_wrap_candidate(geometry: &ZoneGeometry) -> bool {
    let (min_x, max_x) = geometry.x_bounds();
    max_x - min_x > HALF_RING_F || max_x > HALF_RING_F
}

/// Move a canonical geometry into contiguous x-space.
///
/// Every vertex past `C/2` is pulled back by `C`.  The shift is only kept
/// when the result spans at most `C/2`, so a zone straddling the ring's
/// midpoint is left alone.
pub fn normalize(geometry: &ZoneGeometry) -> Result<NormalizedGeometry> {
    geometry.validate(f64::INFINITY)?;
    for polygon in geometry.polygons() {
        if signed_area(&polygon.exterior).abs() <= 0.0 {
            return Err(RingError::InvalidGeometry(
                "polygon exterior has zero area".into(),
            ));
        }
    }

    let raw = NormalizedGeometry {
        polygons: geometry.polygons().to_vec(),
        shifted: false,
    };
    if !is_wrap_candidate(geometry) {
        return Ok(raw);
    }

    let mut shifted = raw.clone();
    shifted.shifted = true;
    for polygon in &mut shifted.polygons {
        for ring in polygon.rings_mut() {
            for p in ring.iter_mut() {
                if p.x > HALF_RING_F {
                    p.x -= RING_CIRCUMFERENCE_F;
                }
            }
        }
    }

    let (lo, hi) = shifted.x_bounds();
    if hi - lo <= HALF_RING_F {
        Ok(shifted)
    } else {
        Ok(raw)
    }
}

/// Shift `other` by the multiple of `C` that brings its x-midpoint closest
/// to `reference`'s.
pub fn align(reference: &NormalizedGeometry, other: &mut NormalizedGeometry) {
    let laps = ((reference.x_mid() - other.x_mid()) / RING_CIRCUMFERENCE_F).round();
    other.shift_x(laps * RING_CIRCUMFERENCE_F);
}

/// Back to canonical coordinates.
pub fn rewrap(geometry: NormalizedGeometry) -> Option<ZoneGeometry> {
    geometry.rewrap()
}

fn normalize_pair(
    a: &ZoneGeometry,
    b: &ZoneGeometry,
) -> Result<(NormalizedGeometry, NormalizedGeometry)> {
    let a = normalize(a)?;
    let mut b = normalize(b)?;
    align(&a, &mut b);
    Ok((a, b))
}

// ---------------------------------------------------------------------------
// Boolean operations
// ---------------------------------------------------------------------------

/// Union of every geometry in `geometries`.  An empty result is an error:
/// valid zones can't union to nothing.
pub fn union(geometries: &[ZoneGeometry]) -> Result<ZoneGeometry> {
    let (first, rest) = geometries
        .split_first()
        .ok_or_else(|| RingError::InvalidGeometry("nothing to union".into()))?;
    let mut acc = normalize(first)?;
    if rest.is_empty() {
        return Ok(first.clone());
    }
    for geometry in rest {
        let mut next = normalize(geometry)?;
        align(&acc, &mut next);
        let result = clipper2::union(
            to_paths(&acc.polygons),
            to_paths(&next.polygons),
            FillRule::NonZero,
        )
        .map_err(|e| RingError::InvalidGeometry(format!("union failed: {:?}", e)))?;
        acc = NormalizedGeometry {
            polygons: from_paths(result),
            shifted: acc.shifted || next.shifted,
        };
    }
    acc.rewrap()
        .ok_or_else(|| RingError::InvalidGeometry("union produced empty geometry".into()))
}

/// `subject` minus `clip`, in canonical coordinates.  An empty vector means
/// the subject was consumed completely.
pub fn difference(subject: &ZoneGeometry, clip: &ZoneGeometry) -> Result<Vec<Polygon>> {
    let (a, b) = normalize_pair(subject, clip)?;
    if !a.bbox_overlaps(&b) {
        return Ok(subject.polygons().to_vec());
    }
    let result = clipper2::difference(
        to_paths(&a.polygons),
        to_paths(&b.polygons),
        FillRule::NonZero,
    )
    .map_err(|e| RingError::InvalidGeometry(format!("difference failed: {:?}", e)))?;
    let polygons: Vec<Polygon> = from_paths(result)
        .into_iter()
        .filter(|p| p.area() > OVERLAP_EPSILON)
        .collect();
    Ok(NormalizedGeometry {
        polygons,
        shifted: a.shifted || b.shifted,
    }
    .rewrap()
    .map(ZoneGeometry::into_polygons)
    .unwrap_or_default())
}

/// Area shared by `a` and `b`, in m².
pub fn intersection_area(a: &ZoneGeometry, b: &ZoneGeometry) -> Result<f64> {
    let (a, b) = normalize_pair(a, b)?;
    if !a.bbox_overlaps(&b) {
        return Ok(0.0);
    }
    let result = clipper2::intersect(
        to_paths(&a.polygons),
        to_paths(&b.polygons),
        FillRule::NonZero,
    )
    .map_err(|e| RingError::InvalidGeometry(format!("intersection failed: {:?}", e)))?;
    Ok(from_paths(result).iter().map(Polygon::area).sum())
}

/// Whether the two geometries share more than [`OVERLAP_EPSILON`] of area.
/// Shapes that only touch along an edge do not overlap.
pub fn overlaps(a: &ZoneGeometry, b: &ZoneGeometry) -> Result<bool> {
    Ok(intersection_area(a, b)? > OVERLAP_EPSILON)
}

/// Area of a geometry, measured in normalized space so seam-crossing zones
/// are not inflated by their canonical split.
pub fn area(geometry: &ZoneGeometry) -> Result<f64> {
    let normalized = normalize(geometry)?;
    Ok(normalized.polygons.iter().map(Polygon::area).sum())
}

// ---------------------------------------------------------------------------
// Clipper conversion
// ---------------------------------------------------------------------------

fn to_paths(polygons: &[Polygon]) -> Paths {
    let mut paths: Vec<Vec<(f64, f64)>> = Vec::new();
    for polygon in polygons {
        paths.push(open_ring(&polygon.exterior, true));
        for hole in &polygon.interiors {
            paths.push(open_ring(hole, false));
        }
    }
    paths.into()
}

/// Drop the closing point and orient the ring (outer CCW, holes CW).
fn open_ring(ring: &[Point], outer: bool) -> Vec<(f64, f64)> {
    let mut coords: Vec<(f64, f64)> = ring.iter().map(|p| (p.x, p.y)).collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    let ccw = signed_area(ring) > 0.0;
    if ccw != outer {
        coords.reverse();
    }
    coords
}

/// Rebuild polygons from clipper output.  Rings sharing the winding of the
/// largest ring are outers; the rest are holes and go to the smallest outer
/// that contains them.
fn from_paths(paths: Paths) -> Vec<Polygon> {
    let raw: Vec<Vec<(f64, f64)>> = paths.into();
    let rings: Vec<(Vec<Point>, f64)> = raw
        .into_iter()
        .filter(|r| r.len() >= 3)
        .map(|r| {
            let mut ring: Vec<Point> = r.into_iter().map(|(x, y)| Point::new(x, y)).collect();
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
            let area = signed_area(&ring);
            (ring, area)
        })
        .filter(|(_, area)| area.abs() > 0.0)
        .collect();

    let outer_sign = rings
        .iter()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(_, area)| area.signum())
        .unwrap_or(1.0);

    let (outers, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .partition(|(_, area)| area.signum() == outer_sign);

    let mut polygons: Vec<Polygon> = outers
        .into_iter()
        .map(|(mut ring, area)| {
            if area < 0.0 {
                ring.reverse();
            }
            Polygon::new(ring, Vec::new())
        })
        .collect();

    for (mut hole, area) in holes {
        if area > 0.0 {
            hole.reverse();
        }
        let owner = polygons
            .iter_mut()
            .filter(|p| hole.iter().any(|q| point_in_ring(*q, &p.exterior)))
            .min_by(|a, b| {
                signed_area(&a.exterior)
                    .abs()
                    .total_cmp(&signed_area(&b.exterior).abs())
            });
        match owner {
            Some(polygon) => polygon.interiors.push(hole),
            None => log::warn!("Dropping hole with no enclosing ring ({} points)", hole.len()),
        }
    }

    polygons
}

// ---------------------------------------------------------------------------
// Planar helpers
// ---------------------------------------------------------------------------

/// Shoelace area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Even-odd ray cast.  Points exactly on an edge may land either way.
pub fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Closed ring of `segments` vertices (at least 3), counter-clockwise when
/// `ccw`, x wrapped into `[0, C)`.
fn circle_ring(center: Point, radius: f64, segments: usize, ccw: bool) -> Vec<Point> {
    let n = segments.max(3);
    let step = std::f64::consts::TAU / n as f64;
    let mut ring: Vec<Point> = (0..n)
        .map(|i| {
            let a = if ccw { i as f64 * step } else { -(i as f64) * step };
            Point::new(
                wrap_arc_length(center.x + radius * a.cos()),
                center.y + radius * a.sin(),
            )
        })
        .collect();
    ring.push(ring[0]);
    ring
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

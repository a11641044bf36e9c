/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Footprint Extractor: a deterministic strategy ladder that turns an
//! element into a UV footprint (loops, plus whether it's a proxy) and a
//! depth, dispatching on a tagged `ElementKind` instead of runtime type
//! checks.

use glam::DVec3;

use crate::capability::{Bbox, CollectedElement, ElementKind, PlanarFace};
use crate::config::Config;
use crate::math_utils::{NORMAL_EPS, OFFSET_EPS};
use crate::view_basis::ViewBasis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Tiny,
    Linear,
    Areal,
}

/// Classifies by projected bbox extent in cells.
pub fn classify_size(width_cells: f64, height_cells: f64, cfg: &Config) -> SizeClass {
    let tiny_max = cfg.tiny_max as f64;
    let thin_max = cfg.thin_max as f64;

    if width_cells <= tiny_max && height_cells <= tiny_max {
        SizeClass::Tiny
    } else if width_cells.min(height_cells) <= thin_max {
        SizeClass::Linear
    } else {
        SizeClass::Areal
    }
}

/// A loop of UV points, plus whether it's a hole (interior exclusion).
pub type Loop = (Vec<(f64, f64)>, bool);

#[derive(Debug, Clone)]
pub struct FootprintResult {
    pub loops: Vec<Loop>,
    pub strategy: &'static str,
    /// True when the strategy produced an approximation (linear band, OBB,
    /// AABB) rather than real ink; governs which raster layer gets stamped.
    pub is_proxy: bool,
}

// ---------------------------------------------------------------------
// Plane canonicalization and grouping (planar-face strategy)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct CanonicalPlane {
    n: DVec3,
    d: f64,
}

/// Canonicalizes a plane's `(n, d)` so that `(-n, -d)` collapses to the same
/// representative: flips sign so the first component with magnitude above
/// `NORMAL_EPS` is positive.
fn canonicalize_plane(n: DVec3, d: f64) -> CanonicalPlane {
    let flip = if n.x.abs() > NORMAL_EPS {
        n.x < 0.0
    } else if n.y.abs() > NORMAL_EPS {
        n.y < 0.0
    } else {
        n.z < 0.0
    };
    if flip {
        CanonicalPlane { n: -n, d: -d }
    } else {
        CanonicalPlane { n, d }
    }
}

fn plane_from_face(face: &PlanarFace) -> CanonicalPlane {
    let n = face.normal.normalize_or_zero();
    let d = if let Some(p0) = face.outer_loop.first() {
        n.dot(*p0)
    } else {
        0.0
    };
    canonicalize_plane(n, d)
}

fn planes_close(a: &CanonicalPlane, b: &CanonicalPlane) -> bool {
    (a.n - b.n).length() <= NORMAL_EPS * 10.0 && (a.d - b.d).abs() <= OFFSET_EPS
}

/// Shoelace formula; positive for counter-clockwise loops.
pub fn signed_polygon_area_2d(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..points.len() {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % points.len()];
        acc += x0 * y1 - x1 * y0;
    }
    acc * 0.5
}

pub fn polygon_area_2d(points: &[(f64, f64)]) -> f64 {
    signed_polygon_area_2d(points).abs()
}

fn project_points_uv(elem: &CollectedElement, basis: &ViewBasis, pts: &[DVec3]) -> Vec<(f64, f64)> {
    pts.iter()
        .map(|&p| basis.to_uv(elem.to_world(p)))
        .collect()
}

/// Enumerates planar faces that face the viewer (`dot(normal, F) < -eps`),
/// in a deterministic order (by index — the caller's face list order is
/// already stable).
fn front_facing_faces<'a>(faces: &'a [PlanarFace], forward: DVec3, eps: f64) -> Vec<&'a PlanarFace> {
    faces
        .iter()
        .filter(|f| f.normal.normalize_or_zero().dot(forward) < -eps)
        .collect()
}

struct PlaneGroup<'a> {
    plane: CanonicalPlane,
    faces: Vec<&'a PlanarFace>,
}

fn group_faces_by_plane<'a>(faces: &[&'a PlanarFace]) -> Vec<PlaneGroup<'a>> {
    let mut groups: Vec<PlaneGroup> = Vec::new();
    for &face in faces {
        let plane = plane_from_face(face);
        if let Some(group) = groups.iter_mut().find(|g| planes_close(&g.plane, &plane)) {
            group.faces.push(face);
        } else {
            groups.push(PlaneGroup { plane, faces: vec![face] });
        }
    }
    groups
}

/// Within a plane group, keeps the face whose projected outer-loop area in
/// UV is largest.
fn select_dominant_face<'a>(
    group: &PlaneGroup<'a>,
    elem: &CollectedElement,
    basis: &ViewBasis,
) -> (&'a PlanarFace, f64) {
    group
        .faces
        .iter()
        .map(|&f| {
            let uv = project_points_uv(elem, basis, &f.outer_loop);
            (f, polygon_area_2d(&uv))
        })
        .fold((group.faces[0], -1.0), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
}

const MAX_PLANE_GROUPS: usize = 4;

/// Strategy 1: planar-face selection. Returns `None` if no front-facing
/// planar faces are available.
fn strategy_planar_face(
    elem: &CollectedElement,
    basis: &ViewBasis,
) -> Option<Vec<Loop>> {
    let faces = &elem.element.planar_faces;
    if faces.is_empty() {
        return None;
    }

    let front = front_facing_faces(faces, basis.forward, 1e-9);
    if front.is_empty() {
        return None;
    }

    let groups = group_faces_by_plane(&front);

    let mut candidates: Vec<(f64, f64, DVec3, usize, &PlanarFace)> = groups
        .iter()
        .enumerate()
        .map(|(idx, g)| {
            let (face, area) = select_dominant_face(g, elem, basis);
            (area, g.plane.d, g.plane.n, idx, face)
        })
        .collect();

    // Deterministic tie-break: area DESC, then d ASC, then n lexicographic
    // ASC, then a stable fallback id (group index, since input order is
    // already stable).
    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.2.x.partial_cmp(&b.2.x).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.2.y.partial_cmp(&b.2.y).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.2.z.partial_cmp(&b.2.z).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.3.cmp(&b.3))
    });

    let mut loops = Vec::new();
    for (area, _, _, _, face) in candidates.into_iter().take(MAX_PLANE_GROUPS) {
        if area <= 0.0 {
            continue;
        }
        let uv = project_points_uv(elem, basis, &face.outer_loop);
        if uv.len() >= 3 {
            loops.push((uv, false));
        }
    }

    if loops.is_empty() {
        None
    } else {
        Some(loops)
    }
}

/// Strategy 2: geometry polygon extraction. Uses the raw vertex list in
/// extraction order — never replaced with a convex hull, so concave shapes
/// (L-walls) survive.
fn strategy_geometry_polygon(elem: &CollectedElement, basis: &ViewBasis) -> Option<Vec<Loop>> {
    let verts = &elem.element.geometry_vertices;
    if verts.len() < 3 {
        return None;
    }
    let uv = project_points_uv(elem, basis, verts);
    Some(vec![(uv, false)])
}

/// Monotone-chain convex hull in UV.
fn convex_hull_2d(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

const COARSE_TRIANGULATION_SAMPLE_CAP: usize = 256;

/// Strategy 3: silhouette via coarse triangulation. Samples vertices at a
/// bounded rate per face and takes the convex hull in UV — used when
/// geometry vertices are too numerous to treat as an exact polygon (e.g.
/// meshes with no planar-face metadata).
fn strategy_coarse_triangulation(elem: &CollectedElement, basis: &ViewBasis) -> Option<Vec<Loop>> {
    let verts = &elem.element.geometry_vertices;
    if verts.is_empty() {
        return None;
    }
    let stride = (verts.len() / COARSE_TRIANGULATION_SAMPLE_CAP).max(1);
    let sampled: Vec<DVec3> = verts.iter().step_by(stride).copied().collect();
    let uv = project_points_uv(elem, basis, &sampled);
    let hull = convex_hull_2d(uv);
    if hull.len() >= 3 {
        Some(vec![(hull, false)])
    } else {
        None
    }
}

/// Closed-form 2D PCA: `theta = 0.5 * atan2(2*cxy, cxx - cyy)`. Falls back
/// to an AABB in the degenerate all-collinear case.
fn obb_from_points(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let n = points.len() as f64;
    if points.is_empty() {
        return Vec::new();
    }
    let (sx, sy) = points.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
    let (mx, my) = (sx / n, sy / n);

    let (mut cxx, mut cyy, mut cxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - mx;
        let dy = y - my;
        cxx += dx * dx;
        cyy += dy * dy;
        cxy += dx * dy;
    }
    cxx /= n;
    cyy /= n;
    cxy /= n;

    if cxx.abs() < 1e-12 && cyy.abs() < 1e-12 && cxy.abs() < 1e-12 {
        return aabb_corners(points);
    }

    let theta = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
    let (c, s) = (theta.cos(), theta.sin());

    let mut umin = f64::INFINITY;
    let mut umax = f64::NEG_INFINITY;
    let mut vmin = f64::INFINITY;
    let mut vmax = f64::NEG_INFINITY;
    for &(x, y) in points {
        let dx = x - mx;
        let dy = y - my;
        let u = dx * c + dy * s;
        let v = -dx * s + dy * c;
        umin = umin.min(u);
        umax = umax.max(u);
        vmin = vmin.min(v);
        vmax = vmax.max(v);
    }

    let corners_local = [(umin, vmin), (umax, vmin), (umax, vmax), (umin, vmax)];
    corners_local
        .iter()
        .map(|&(u, v)| {
            let x = mx + u * c - v * s;
            let y = my + u * s + v * c;
            (x, y)
        })
        .collect()
}

fn aabb_corners(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let xmin = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let xmax = points
        .iter()
        .map(|p| p.0)
        .fold(f64::NEG_INFINITY, f64::max);
    let ymin = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let ymax = points
        .iter()
        .map(|p| p.1)
        .fold(f64::NEG_INFINITY, f64::max);
    vec![(xmin, ymin), (xmax, ymin), (xmax, ymax), (xmin, ymax)]
}

fn bbox_uv_points(elem: &CollectedElement, basis: &ViewBasis, bbox: &Bbox) -> Vec<(f64, f64)> {
    let corners = bbox.corners();
    project_points_uv(elem, basis, &corners)
}

/// Strategy 4: oriented bounding box via 2D PCA of the 8 projected bbox
/// corners.
fn strategy_obb(elem: &CollectedElement, basis: &ViewBasis) -> Option<Vec<Loop>> {
    let bbox = elem.element.bbox.as_ref()?;
    let uv = bbox_uv_points(elem, basis, bbox);
    let obb = obb_from_points(&uv);
    if obb.len() >= 3 {
        Some(vec![(obb, false)])
    } else {
        None
    }
}

/// Strategy 5: axis-aligned UV bbox — the final fallback.
fn strategy_aabb(elem: &CollectedElement, basis: &ViewBasis) -> Option<Vec<Loop>> {
    let bbox = elem.element.bbox.as_ref()?;
    let uv = bbox_uv_points(elem, basis, bbox);
    let aabb = aabb_corners(&uv);
    Some(vec![(aabb, false)])
}

const PLAN_LIKE_SHORTCUT_KINDS: &[ElementKind] = &[
    ElementKind::Wall,
    ElementKind::Floor,
    ElementKind::Roof,
    ElementKind::Ceiling,
];

/// Category-specific shortcut for Walls/Floors/Roofs/Ceilings in plan-like
/// views: use the element's sketch boundary curves directly.
fn strategy_sketch_shortcut(
    elem: &CollectedElement,
    basis: &ViewBasis,
    is_plan_like: bool,
) -> Option<Vec<Loop>> {
    if !is_plan_like || !PLAN_LIKE_SHORTCUT_KINDS.contains(&elem.element.kind) {
        return None;
    }
    if elem.element.sketch_loops.is_empty() {
        return None;
    }
    let loops: Vec<Loop> = elem
        .element
        .sketch_loops
        .iter()
        .map(|loop_pts| (project_points_uv(elem, basis, loop_pts), false))
        .collect();
    if loops.iter().any(|(pts, _)| pts.len() >= 3) {
        Some(loops)
    } else {
        None
    }
}

/// Runs the full AREAL strategy ladder, returning the first strategy that
/// yields >= 3 valid UV points.
fn extract_areal_loops(
    elem: &CollectedElement,
    basis: &ViewBasis,
    is_plan_like: bool,
) -> (Vec<Loop>, &'static str) {
    if let Some(loops) = strategy_sketch_shortcut(elem, basis, is_plan_like) {
        return (loops, "sketch_shortcut");
    }
    if let Some(loops) = strategy_planar_face(elem, basis) {
        return (loops, "planar_face");
    }
    if let Some(loops) = strategy_geometry_polygon(elem, basis) {
        return (loops, "geometry_polygon");
    }
    if let Some(loops) = strategy_coarse_triangulation(elem, basis) {
        return (loops, "coarse_triangulation");
    }
    if let Some(loops) = strategy_obb(elem, basis) {
        return (loops, "obb");
    }
    if let Some(loops) = strategy_aabb(elem, basis) {
        return (loops, "aabb");
    }
    (Vec::new(), "none")
}

/// Reconstructs an oriented band polygon for the LINEAR strategy: the OBB of
/// the projected bbox corners, used directly as the band outline.
fn extract_linear_band(elem: &CollectedElement, basis: &ViewBasis) -> Vec<Loop> {
    match strategy_obb(elem, basis) {
        Some(loops) => loops,
        None => match strategy_aabb(elem, basis) {
            Some(loops) => loops,
            None => Vec::new(),
        },
    }
}

fn extract_tiny_aabb(elem: &CollectedElement, basis: &ViewBasis) -> Vec<Loop> {
    strategy_aabb(elem, basis).unwrap_or_default()
}

/// Entry point: classifies the element, runs the appropriate strategy, and
/// returns its footprint.
pub fn extract_footprint(
    elem: &CollectedElement,
    basis: &ViewBasis,
    size_class: SizeClass,
    is_plan_like: bool,
) -> FootprintResult {
    match size_class {
        SizeClass::Tiny => FootprintResult {
            loops: extract_tiny_aabb(elem, basis),
            strategy: "tiny_aabb",
            is_proxy: true,
        },
        SizeClass::Linear => FootprintResult {
            loops: extract_linear_band(elem, basis),
            strategy: "linear_band",
            is_proxy: true,
        },
        SizeClass::Areal => {
            let (loops, strategy) = extract_areal_loops(elem, basis, is_plan_like);
            let is_proxy = matches!(strategy, "obb" | "aabb");
            FootprintResult {
                loops,
                strategy,
                is_proxy,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{BboxSource, ElementInfo, ElementSourceType};
    use glam::DAffine3;

    fn basis_plan() -> ViewBasis {
        ViewBasis {
            origin: DVec3::ZERO,
            right: DVec3::X,
            up: DVec3::Y,
            forward: DVec3::NEG_Z,
        }
    }

    fn elem_with_bbox(min: DVec3, max: DVec3) -> CollectedElement {
        CollectedElement {
            element: ElementInfo {
                id: 1,
                category_id: 1,
                category_name: "Floors".to_string(),
                view_specific: false,
                kind: ElementKind::Floor,
                bbox: Some(Bbox {
                    min,
                    max,
                    source: BboxSource::Model,
                }),
                instance_transform: DAffine3::IDENTITY,
                planar_faces: vec![],
                geometry_vertices: vec![],
                sketch_loops: vec![],
            },
            world_transform: DAffine3::IDENTITY,
            source_type: ElementSourceType::Host,
            source_id: "HOST".to_string(),
            link_inst_id: None,
        }
    }

    #[test]
    fn classify_tiny_linear_areal() {
        let cfg = Config::default();
        assert_eq!(classify_size(1.0, 1.0, &cfg), SizeClass::Tiny);
        assert_eq!(classify_size(5.0, 1.0, &cfg), SizeClass::Linear);
        assert_eq!(classify_size(20.0, 20.0, &cfg), SizeClass::Areal);
    }

    #[test]
    fn aabb_fallback_for_plain_bbox() {
        let elem = elem_with_bbox(DVec3::new(0.0, 0.0, 0.0), DVec3::new(10.0, 10.0, 0.0));
        let basis = basis_plan();
        let result = extract_footprint(&elem, &basis, SizeClass::Areal, false);
        assert_eq!(result.strategy, "aabb");
        assert!(result.is_proxy);
        assert_eq!(result.loops.len(), 1);
        assert_eq!(polygon_area_2d(&result.loops[0].0), 100.0);
    }

    #[test]
    fn geometry_polygon_preserves_concave_shape() {
        let mut elem = elem_with_bbox(DVec3::ZERO, DVec3::new(10.0, 10.0, 0.0));
        // L-shape: concave polygon, would lose its notch under a hull.
        elem.element.geometry_vertices = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::new(10.0, 5.0, 0.0),
            DVec3::new(5.0, 5.0, 0.0),
            DVec3::new(5.0, 10.0, 0.0),
            DVec3::new(0.0, 10.0, 0.0),
        ];
        let basis = basis_plan();
        let result = extract_footprint(&elem, &basis, SizeClass::Areal, false);
        assert_eq!(result.strategy, "geometry_polygon");
        assert!(!result.is_proxy);
        assert_eq!(result.loops[0].0.len(), 6);
    }

    #[test]
    fn planar_face_picks_largest_area_per_group() {
        let mut elem = elem_with_bbox(DVec3::ZERO, DVec3::new(10.0, 10.0, 0.0));
        elem.element.planar_faces = vec![
            PlanarFace {
                normal: DVec3::new(0.0, 0.0, 1.0),
                outer_loop: vec![
                    DVec3::new(0.0, 0.0, 0.0),
                    DVec3::new(1.0, 0.0, 0.0),
                    DVec3::new(1.0, 1.0, 0.0),
                    DVec3::new(0.0, 1.0, 0.0),
                ],
            },
            PlanarFace {
                normal: DVec3::new(0.0, 0.0, 1.0),
                outer_loop: vec![
                    DVec3::new(0.0, 0.0, 0.0),
                    DVec3::new(10.0, 0.0, 0.0),
                    DVec3::new(10.0, 10.0, 0.0),
                    DVec3::new(0.0, 10.0, 0.0),
                ],
            },
        ];
        let basis = basis_plan();
        let result = extract_footprint(&elem, &basis, SizeClass::Areal, false);
        assert_eq!(result.strategy, "planar_face");
        assert_eq!(polygon_area_2d(&result.loops[0].0), 100.0);
    }

    #[test]
    fn obb_rotated_rectangle_has_expected_area() {
        // A 10x2 rectangle rotated 30 degrees.
        let theta = std::f64::consts::FRAC_PI_6;
        let (c, s) = (theta.cos(), theta.sin());
        let local = [(-5.0, -1.0), (5.0, -1.0), (5.0, 1.0), (-5.0, 1.0)];
        let rotated: Vec<(f64, f64)> = local
            .iter()
            .map(|&(x, y)| (x * c - y * s, x * s + y * c))
            .collect();
        let obb = obb_from_points(&rotated);
        assert_eq!(obb.len(), 4);
        assert!((polygon_area_2d(&obb) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn sketch_shortcut_used_for_floor_in_plan() {
        let mut elem = elem_with_bbox(DVec3::ZERO, DVec3::new(10.0, 10.0, 0.0));
        elem.element.sketch_loops = vec![vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(10.0, 0.0, 0.0),
            DVec3::new(10.0, 10.0, 0.0),
            DVec3::new(0.0, 10.0, 0.0),
        ]];
        let basis = basis_plan();
        let result = extract_footprint(&elem, &basis, SizeClass::Areal, true);
        assert_eq!(result.strategy, "sketch_shortcut");
    }
}

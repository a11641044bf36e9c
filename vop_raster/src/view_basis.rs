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

//! View-local coordinate basis and bounds resolution.

use glam::DVec3;

use crate::capability::{AnnotationInfo, Bbox, CollectedElement, ViewInfo, ViewKind};
use crate::config::Config;
use crate::diagnostics::{DiagArgs, Diagnostics};
use crate::math_utils::Bounds2D;

/// `(O, R, U, F)`: origin plus three orthonormal vectors. `F` points into
/// the screen — smaller `w = (p - O)·F` is nearer the viewer.
#[derive(Debug, Clone, Copy)]
pub struct ViewBasis {
    pub origin: DVec3,
    pub right: DVec3,
    pub up: DVec3,
    pub forward: DVec3,
}

impl ViewBasis {
    pub fn to_uv(&self, p: DVec3) -> (f64, f64) {
        let d = p - self.origin;
        (d.dot(self.right), d.dot(self.up))
    }

    pub fn to_uvw(&self, p: DVec3) -> (f64, f64, f64) {
        let d = p - self.origin;
        (d.dot(self.right), d.dot(self.up), d.dot(self.forward))
    }
}

const PLAN_LIKE_FORWARD_Z: f64 = 0.9;

/// Builds the view basis. `F` is the negated view direction; for plan-like
/// views the origin's Z is replaced by the cut-plane elevation when
/// available. Failure to resolve the cut plane is a correctness degradation
/// and must be diagnosed, never silent.
pub fn make_view_basis(view: &ViewInfo, diag: &mut Diagnostics) -> ViewBasis {
    let forward = -view.view_direction;
    let mut origin = view.origin;

    if forward.z.abs() > PLAN_LIKE_FORWARD_Z {
        match view.cut_plane_elevation {
            Some(z) => origin.z = z,
            None => {
                diag.warn(DiagArgs {
                    phase: "view_basis",
                    callsite: "make_view_basis",
                    message: "plan-like view has no cut-plane elevation; depth ordering may be biased",
                    view_id: Some(view.id),
                    ..Default::default()
                });
            }
        }
    }

    ViewBasis {
        origin,
        right: view.right,
        up: view.up,
        forward,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    ModelAndAnnotation,
    AnnotationOnly,
    Rejected,
}

pub fn supports_model_geometry(kind: ViewKind) -> bool {
    matches!(
        kind,
        ViewKind::FloorPlan
            | ViewKind::CeilingPlan
            | ViewKind::Section
            | ViewKind::Elevation
            | ViewKind::ThreeD
    )
}

fn supports_annotation_only(kind: ViewKind) -> bool {
    matches!(kind, ViewKind::Drafting | ViewKind::Legend)
}

pub fn supports_crop_bounds(kind: ViewKind) -> bool {
    supports_model_geometry(kind) || supports_annotation_only(kind)
}

pub fn supports_depth(kind: ViewKind) -> bool {
    supports_model_geometry(kind)
}

/// Gates a view into one of `{MODEL_AND_ANNOTATION, ANNOTATION_ONLY,
/// REJECTED}` from `view_type`/`is_template` alone — never from geometry
/// presence.
pub fn resolve_view_mode(view: &ViewInfo) -> (ViewMode, &'static str) {
    if view.is_template {
        return (ViewMode::Rejected, "template");
    }
    if supports_model_geometry(view.kind) {
        return (ViewMode::ModelAndAnnotation, "model_capable_kind");
    }
    if supports_annotation_only(view.kind) {
        return (ViewMode::AnnotationOnly, "annotation_only_kind");
    }
    (ViewMode::Rejected, "unsupported_kind")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Med,
    Low,
}

#[derive(Debug, Clone)]
pub struct BoundsResolution {
    pub basis: ViewBasis,
    pub bounds_uv: Bounds2D,
    /// Unbuffered crop bounds, if derived from a crop box: model ink clips
    /// to this so the buffer doesn't admit stray ink.
    pub model_bounds_uv: Option<Bounds2D>,
    pub width_cells: u32,
    pub height_cells: u32,
    pub cell_size_ft_requested: f64,
    pub cell_size_ft_effective: f64,
    pub reason: &'static str,
    pub confidence: Confidence,
    pub resolution_mode: &'static str,
    pub cap_triggered: bool,
    pub cap_before: Option<(u32, u32)>,
    pub cap_after: Option<(u32, u32)>,
}

const FALLBACK_BOUNDS_FT: f64 = 200.0;

fn inch_to_ft(inches: f64) -> f64 {
    inches / 12.0
}

fn aabb_of_points<'a>(points: impl Iterator<Item = &'a DVec3>) -> Option<Bounds2D> {
    let mut iter = points.peekable();
    iter.peek()?;
    let mut xmin = f64::INFINITY;
    let mut ymin = f64::INFINITY;
    let mut xmax = f64::NEG_INFINITY;
    let mut ymax = f64::NEG_INFINITY;
    for p in iter {
        xmin = xmin.min(p.x);
        ymin = ymin.min(p.y);
        xmax = xmax.max(p.x);
        ymax = ymax.max(p.y);
    }
    Some(Bounds2D::new(xmin, ymin, xmax, ymax))
}

fn project_bbox_corners_uv(basis: &ViewBasis, bbox: &Bbox) -> Vec<DVec3> {
    bbox.corners()
        .iter()
        .map(|&c| {
            let (u, v, w) = basis.to_uvw(c);
            DVec3::new(u, v, w)
        })
        .collect()
}

fn crop_box_bounds_uv(view: &ViewInfo, basis: &ViewBasis) -> Option<Bounds2D> {
    let crop = view.crop_box.as_ref().filter(|c| c.active)?;
    let bbox = Bbox {
        min: crop.min,
        max: crop.max,
        source: crate::capability::BboxSource::View,
    };
    let corners = bbox.corners().map(|c| match crop.transform {
        Some(t) => t.transform_point3(c),
        None => c,
    });
    let uv_points: Vec<DVec3> = corners
        .iter()
        .map(|&c| {
            let (u, v) = basis.to_uv(c);
            DVec3::new(u, v, 0.0)
        })
        .collect();
    aabb_of_points(uv_points.iter())
}

fn synthetic_bounds_from_visible_extents(
    basis: &ViewBasis,
    elements: &[CollectedElement],
    cfg: &Config,
    diag: &mut Diagnostics,
    view_id: i64,
) -> (Bounds2D, Confidence) {
    let budget = cfg.extents_scan_max_elements as usize;
    let mut budget_fired = elements.len() > budget;

    let mut xmin = f64::INFINITY;
    let mut ymin = f64::INFINITY;
    let mut xmax = f64::NEG_INFINITY;
    let mut ymax = f64::NEG_INFINITY;
    let mut any = false;

    for elem in elements.iter().take(budget) {
        let bbox = match &elem.element.bbox {
            Some(b) => b,
            None => continue,
        };
        for p in project_bbox_corners_uv(basis, bbox) {
            any = true;
            xmin = xmin.min(p.x);
            ymin = ymin.min(p.y);
            xmax = xmax.max(p.x);
            ymax = ymax.max(p.y);
        }
    }

    if !any {
        budget_fired = true;
        let half = FALLBACK_BOUNDS_FT / 2.0;
        diag.warn(DiagArgs {
            phase: "bounds",
            callsite: "synthetic_bounds_from_visible_extents",
            message: "no usable element bboxes; falling back to default square bounds",
            view_id: Some(view_id),
            ..Default::default()
        });
        return (
            Bounds2D::new(-half, -half, half, half),
            Confidence::Low,
        );
    }

    let confidence = if budget_fired {
        Confidence::Low
    } else {
        Confidence::Med
    };
    (Bounds2D::new(xmin, ymin, xmax, ymax), confidence)
}

fn annotation_extent_bounds(
    basis: &ViewBasis,
    annotations: &[AnnotationInfo],
) -> Option<Bounds2D> {
    let mut acc: Option<Bounds2D> = None;
    for anno in annotations {
        let bbox = match &anno.bbox {
            Some(b) => b,
            None => continue,
        };
        if let Some(b) = aabb_of_points(project_bbox_corners_uv(basis, bbox).iter()) {
            acc = Some(match acc {
                Some(existing) => existing.union(&b),
                None => b,
            });
        }
    }
    acc
}

/// Master bounds resolver: crop-or-extents base bounds, annotation
/// expansion, then the cap/adaptive-resolution policy.
pub fn resolve_view_bounds(
    view: &ViewInfo,
    elements: &[CollectedElement],
    annotations: &[AnnotationInfo],
    cfg: &Config,
    diag: &mut Diagnostics,
) -> BoundsResolution {
    let basis = make_view_basis(view, diag);

    let (mut bounds, model_bounds_uv, reason, confidence) =
        if let Some(crop_bounds) = crop_box_bounds_uv(view, &basis) {
            let buffer_ft = inch_to_ft(cfg.bounds_buffer_in);
            (
                crop_bounds.expand(buffer_ft),
                Some(crop_bounds),
                "crop",
                Confidence::High,
            )
        } else {
            let (b, c) =
                synthetic_bounds_from_visible_extents(&basis, elements, cfg, diag, view.id);
            let reason = if matches!(c, Confidence::Low) {
                "fallback"
            } else {
                "extents"
            };
            (b, None, reason, c)
        };

    if let Some(anno_bounds) = annotation_extent_bounds(&basis, annotations) {
        bounds = bounds.union(&anno_bounds);
        // Two-level clamp: always cap to a printed-inch envelope around the
        // base bounds, then pad outward by the configured margin.
        let cap_ft = inch_to_ft(cfg.anno_expand_cap_in).max(0.0);
        let capped_envelope = bounds.expand(cap_ft);
        bounds = capped_envelope;
        bounds = bounds.expand(inch_to_ft(cfg.anno_crop_margin_in));
    }

    let cell_size_ft_requested = inch_to_ft(cfg.cell_size_paper_in);
    let width = bounds.width();
    let height = bounds.height();

    let w_req = (width / cell_size_ft_requested).ceil().max(1.0) as u32;
    let h_req = (height / cell_size_ft_requested).ceil().max(1.0) as u32;

    let mut cell_size_ft_effective = cell_size_ft_requested;
    let mut resolution_mode = "fixed";
    let mut cap_triggered = false;
    let mut cap_before = None;
    let mut cap_after = None;
    let mut width_cells = w_req.min(cfg.max_w);
    let mut height_cells = h_req.min(cfg.max_h);

    if w_req > cfg.max_w || h_req > cfg.max_h {
        cap_before = Some((w_req, h_req));
        cell_size_ft_effective = cell_size_ft_requested
            .max(width / cfg.max_w as f64)
            .max(height / cfg.max_h as f64);
        width_cells = (width / cell_size_ft_effective).ceil().max(1.0) as u32;
        height_cells = (height / cell_size_ft_effective).ceil().max(1.0) as u32;
        cap_after = Some((width_cells, height_cells));
        resolution_mode = "adaptive";
        cap_triggered = true;

        diag.warn(DiagArgs {
            phase: "bounds",
            callsite: "resolve_view_bounds",
            message: "grid exceeds max_w/max_h; growing cell size instead of shrinking bounds",
            view_id: Some(view.id),
            ..Default::default()
        });
    }

    BoundsResolution {
        basis,
        bounds_uv: bounds,
        model_bounds_uv,
        width_cells,
        height_cells,
        cell_size_ft_requested,
        cell_size_ft_effective,
        reason,
        confidence,
        resolution_mode,
        cap_triggered,
        cap_before,
        cap_after,
    }
}

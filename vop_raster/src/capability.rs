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

//! `HostCapability`: the explicit interface the core needs from a host CAD
//! application. Injecting it as a trait object instead of binding directly
//! to a concrete host API means the whole pipeline can run against a plain
//! in-memory mock in tests or the demo CLI.

use glam::DVec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    FloorPlan,
    CeilingPlan,
    Section,
    Elevation,
    ThreeD,
    Drafting,
    Legend,
    Schedule,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct CropBox {
    pub min: DVec3,
    pub max: DVec3,
    /// Local-to-world transform applied to the 8 corners before use, if the
    /// crop box has one (rotated crop regions).
    pub transform: Option<glam::DAffine3>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ViewInfo {
    pub id: i64,
    pub name: String,
    pub kind: ViewKind,
    pub is_template: bool,
    pub scale: u32,
    pub discipline: String,
    pub phase: String,
    pub detail_level: String,
    pub template_id: i64,

    pub origin: DVec3,
    pub right: DVec3,
    pub up: DVec3,
    pub view_direction: DVec3,

    pub crop_box: Option<CropBox>,
    pub annotation_crop_active: bool,
    pub cut_plane_elevation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BboxSource {
    View,
    Model,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct Bbox {
    pub min: DVec3,
    pub max: DVec3,
    pub source: BboxSource,
}

impl Bbox {
    /// The 8 corners of the box in its own local space.
    pub fn corners(&self) -> [DVec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            DVec3::new(min.x, min.y, min.z),
            DVec3::new(max.x, min.y, min.z),
            DVec3::new(min.x, max.y, min.z),
            DVec3::new(max.x, max.y, min.z),
            DVec3::new(min.x, min.y, max.z),
            DVec3::new(max.x, min.y, max.z),
            DVec3::new(min.x, max.y, max.z),
            DVec3::new(max.x, max.y, max.z),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementSourceType {
    Host,
    Link,
    Dwg,
}

/// A planar face on a solid, already expressed in the element's local space.
#[derive(Debug, Clone)]
pub struct PlanarFace {
    pub normal: DVec3,
    /// Outer loop vertices, in local space, in extraction order.
    pub outer_loop: Vec<DVec3>,
}

/// Tagged element classification, used instead of a runtime type check at
/// every call site that needs to branch on what kind of element this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Wall,
    Floor,
    Roof,
    Ceiling,
    Generic,
    Text,
    Tag,
    Keynote,
    Dimension,
    FilledRegion,
    DetailLine,
    DetailComponent,
    Other,
}

#[derive(Debug, Clone)]
pub struct ElementInfo {
    pub id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub view_specific: bool,
    pub kind: ElementKind,
    pub bbox: Option<Bbox>,
    /// World-space instance transform (identity for simple host elements;
    /// non-identity for family instances nested in a `GeometryInstance`).
    pub instance_transform: glam::DAffine3,
    pub planar_faces: Vec<PlanarFace>,
    /// Geometry vertices for the polygon-extraction strategy, local space.
    pub geometry_vertices: Vec<DVec3>,
    /// Sketch/profile loops for the walls/floors/roofs/ceilings shortcut, in
    /// world space UV-ready points (already planar).
    pub sketch_loops: Vec<Vec<DVec3>>,
}

#[derive(Debug, Clone)]
pub struct CollectedElement {
    pub element: ElementInfo,
    pub world_transform: glam::DAffine3,
    pub source_type: ElementSourceType,
    pub source_id: String,
    pub link_inst_id: Option<i64>,
}

impl CollectedElement {
    /// Composes the three transforms in order: the point's own local
    /// (bbox-local / face-local) coordinates, then the
    /// element's instance transform (nested family instances), then the
    /// world/link-to-host transform. Getting this order wrong is the
    /// dominant source of projection bugs.
    pub fn to_world(&self, local: DVec3) -> DVec3 {
        self.world_transform
            .transform_point3(self.element.instance_transform.transform_point3(local))
    }
}

/// Annotation-specific info (separate from `ElementInfo` since the 2D
/// taxonomy and stamping rules differ completely from model elements).
#[derive(Debug, Clone)]
pub struct AnnotationInfo {
    pub id: i64,
    pub kind: ElementKind,
    pub bbox: Option<Bbox>,
    /// Endpoints for dimension/line-like annotations, in view UV-ready world
    /// space; empty when not applicable.
    pub curve_endpoints: Option<(DVec3, DVec3)>,
}

/// The capability surface the core consumes from a host CAD application.
/// Named per the module boundary described above.
pub trait HostCapability {
    fn view_info(&self, view_id: i64) -> Option<ViewInfo>;

    /// One broad-phase, view-scoped query returning every element
    /// potentially visible in the view (host + link + DWG), before policy
    /// filtering.
    fn query_visible_in_view(&self, view_id: i64) -> Vec<CollectedElement>;

    /// One broad-phase, view-scoped query for whitelisted annotation
    /// categories; only view-specific elements are returned.
    fn query_annotations_in_view(&self, view_id: i64) -> Vec<AnnotationInfo>;

    /// Open polyline geometry for an imported-CAD element.
    fn import_polylines(&self, element_id: i64) -> Vec<Vec<DVec3>>;
}

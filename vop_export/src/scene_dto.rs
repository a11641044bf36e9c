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

//! JSON scene format consumed by the demo CLI: a flat description of views,
//! elements, and annotations good enough to exercise the rasterizer without
//! a real host CAD application. Converts into `vop_raster`'s domain types at
//! the boundary rather than letting JSON shapes leak into the core crate.

use std::collections::HashMap;

use glam::{DAffine3, DVec3};
use serde::Deserialize;

use vop_raster::capability::{
    AnnotationInfo, Bbox, BboxSource, CollectedElement, CropBox, ElementInfo, ElementKind,
    ElementSourceType, HostCapability, PlanarFace, ViewInfo, ViewKind,
};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Vec3Dto(pub f64, pub f64, pub f64);

impl From<Vec3Dto> for DVec3 {
    fn from(v: Vec3Dto) -> DVec3 {
        DVec3::new(v.0, v.1, v.2)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BboxDto {
    pub min: Vec3Dto,
    pub max: Vec3Dto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CropBoxDto {
    pub min: Vec3Dto,
    pub max: Vec3Dto,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> u32 {
    96
}

fn default_template_id() -> i64 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewDto {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub discipline: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub detail_level: String,
    #[serde(default = "default_template_id")]
    pub template_id: i64,
    pub origin: Vec3Dto,
    pub right: Vec3Dto,
    pub up: Vec3Dto,
    pub view_direction: Vec3Dto,
    #[serde(default)]
    pub crop_box: Option<CropBoxDto>,
    #[serde(default)]
    pub annotation_crop_active: bool,
    #[serde(default)]
    pub cut_plane_elevation: Option<f64>,
    #[serde(default)]
    pub visible_element_ids: Vec<i64>,
    #[serde(default)]
    pub visible_annotation_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanarFaceDto {
    pub normal: Vec3Dto,
    pub outer_loop: Vec<Vec3Dto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementDto {
    pub id: i64,
    #[serde(default)]
    pub category_id: i64,
    pub category_name: String,
    #[serde(default)]
    pub view_specific: bool,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub bbox: Option<BboxDto>,
    /// Only a translation is modeled for the instance transform; the demo
    /// scene format doesn't carry full affine data for nested instances.
    #[serde(default)]
    pub instance_translation: Option<Vec3Dto>,
    #[serde(default)]
    pub world_translation: Option<Vec3Dto>,
    #[serde(default)]
    pub planar_faces: Vec<PlanarFaceDto>,
    #[serde(default)]
    pub geometry_vertices: Vec<Vec3Dto>,
    #[serde(default)]
    pub sketch_loops: Vec<Vec<Vec3Dto>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationDto {
    pub id: i64,
    pub kind: String,
    #[serde(default)]
    pub bbox: Option<BboxDto>,
    #[serde(default)]
    pub curve_endpoints: Option<(Vec3Dto, Vec3Dto)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub project_guid: String,
    pub views: Vec<ViewDto>,
    #[serde(default)]
    pub elements: Vec<ElementDto>,
    #[serde(default)]
    pub annotations: Vec<AnnotationDto>,
}

fn view_kind_from_str(s: &str) -> ViewKind {
    match s {
        "floor_plan" => ViewKind::FloorPlan,
        "ceiling_plan" => ViewKind::CeilingPlan,
        "section" => ViewKind::Section,
        "elevation" => ViewKind::Elevation,
        "three_d" | "3d" => ViewKind::ThreeD,
        "drafting" => ViewKind::Drafting,
        "legend" => ViewKind::Legend,
        "schedule" => ViewKind::Schedule,
        other => {
            log::warn!("unrecognized view kind '{}', treating as Unknown", other);
            ViewKind::Unknown
        }
    }
}

fn element_kind_from_str(s: &str) -> ElementKind {
    match s {
        "wall" => ElementKind::Wall,
        "floor" => ElementKind::Floor,
        "roof" => ElementKind::Roof,
        "ceiling" => ElementKind::Ceiling,
        "text" => ElementKind::Text,
        "tag" => ElementKind::Tag,
        "keynote" => ElementKind::Keynote,
        "dimension" => ElementKind::Dimension,
        "filled_region" => ElementKind::FilledRegion,
        "detail_line" => ElementKind::DetailLine,
        "detail_component" => ElementKind::DetailComponent,
        "" | "generic" => ElementKind::Generic,
        _ => ElementKind::Other,
    }
}

fn source_type_from_str(s: &str) -> ElementSourceType {
    match s {
        "link" => ElementSourceType::Link,
        "dwg" => ElementSourceType::Dwg,
        _ => ElementSourceType::Host,
    }
}

fn to_bbox(dto: &BboxDto) -> Bbox {
    Bbox {
        min: dto.min.into(),
        max: dto.max.into(),
        source: BboxSource::Model,
    }
}

fn to_view_info(dto: &ViewDto) -> ViewInfo {
    ViewInfo {
        id: dto.id,
        name: dto.name.clone(),
        kind: view_kind_from_str(&dto.kind),
        is_template: dto.is_template,
        scale: dto.scale,
        discipline: dto.discipline.clone(),
        phase: dto.phase.clone(),
        detail_level: dto.detail_level.clone(),
        template_id: dto.template_id,
        origin: dto.origin.into(),
        right: dto.right.into(),
        up: dto.up.into(),
        view_direction: dto.view_direction.into(),
        crop_box: dto.crop_box.as_ref().map(|c| CropBox {
            min: c.min.into(),
            max: c.max.into(),
            transform: None,
            active: c.active,
        }),
        annotation_crop_active: dto.annotation_crop_active,
        cut_plane_elevation: dto.cut_plane_elevation,
    }
}

fn to_collected_element(dto: &ElementDto) -> CollectedElement {
    let instance_translation: DVec3 = dto.instance_translation.map(Into::into).unwrap_or(DVec3::ZERO);
    let world_translation: DVec3 = dto.world_translation.map(Into::into).unwrap_or(DVec3::ZERO);

    CollectedElement {
        element: ElementInfo {
            id: dto.id,
            category_id: dto.category_id,
            category_name: dto.category_name.clone(),
            view_specific: dto.view_specific,
            kind: element_kind_from_str(&dto.kind),
            bbox: dto.bbox.as_ref().map(to_bbox),
            instance_transform: DAffine3::from_translation(instance_translation),
            planar_faces: dto
                .planar_faces
                .iter()
                .map(|f| PlanarFace {
                    normal: f.normal.into(),
                    outer_loop: f.outer_loop.iter().map(|&v| v.into()).collect(),
                })
                .collect(),
            geometry_vertices: dto.geometry_vertices.iter().map(|&v| v.into()).collect(),
            sketch_loops: dto
                .sketch_loops
                .iter()
                .map(|loop_pts| loop_pts.iter().map(|&v| v.into()).collect())
                .collect(),
        },
        world_transform: DAffine3::from_translation(world_translation),
        source_type: source_type_from_str(&dto.source),
        source_id: if dto.source_id.is_empty() {
            "HOST".to_string()
        } else {
            dto.source_id.clone()
        },
        link_inst_id: None,
    }
}

fn to_annotation_info(dto: &AnnotationDto) -> AnnotationInfo {
    AnnotationInfo {
        id: dto.id,
        kind: element_kind_from_str(&dto.kind),
        bbox: dto.bbox.as_ref().map(to_bbox),
        curve_endpoints: dto.curve_endpoints.map(|(a, b)| (a.into(), b.into())),
    }
}

/// An in-memory `HostCapability` backed by a parsed JSON scene file.
pub struct JsonHost {
    views_by_id: HashMap<i64, ViewDto>,
    elements_by_id: HashMap<i64, ElementDto>,
    annotations_by_id: HashMap<i64, AnnotationDto>,
}

impl JsonHost {
    pub fn from_scene(scene: SceneFile) -> Self {
        let views_by_id = scene.views.into_iter().map(|v| (v.id, v)).collect();
        let elements_by_id = scene.elements.into_iter().map(|e| (e.id, e)).collect();
        let annotations_by_id = scene.annotations.into_iter().map(|a| (a.id, a)).collect();
        JsonHost {
            views_by_id,
            elements_by_id,
            annotations_by_id,
        }
    }

    pub fn all_view_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.views_by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl HostCapability for JsonHost {
    fn view_info(&self, view_id: i64) -> Option<ViewInfo> {
        self.views_by_id.get(&view_id).map(to_view_info)
    }

    fn query_visible_in_view(&self, view_id: i64) -> Vec<CollectedElement> {
        let view = match self.views_by_id.get(&view_id) {
            Some(v) => v,
            None => return vec![],
        };
        view.visible_element_ids
            .iter()
            .filter_map(|id| self.elements_by_id.get(id))
            .map(to_collected_element)
            .collect()
    }

    fn query_annotations_in_view(&self, view_id: i64) -> Vec<AnnotationInfo> {
        let view = match self.views_by_id.get(&view_id) {
            Some(v) => v,
            None => return vec![],
        };
        view.visible_annotation_ids
            .iter()
            .filter_map(|id| self.annotations_by_id.get(id))
            .map(to_annotation_info)
            .collect()
    }

    fn import_polylines(&self, _element_id: i64) -> Vec<Vec<DVec3>> {
        // Not modeled in the demo scene format; the real host capability
        // would read this from the imported CAD link's open curve geometry.
        vec![]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_scene() {
        let json = r#"{
            "project_guid": "proj-1",
            "views": [{
                "id": 1, "kind": "floor_plan",
                "origin": [0,0,0], "right": [1,0,0], "up": [0,1,0],
                "view_direction": [0,0,-1],
                "cut_plane_elevation": 4.0,
                "visible_element_ids": [10]
            }],
            "elements": [{
                "id": 10, "category_name": "Floors", "kind": "floor",
                "bbox": {"min": [0,0,0], "max": [10,10,0]},
                "geometry_vertices": [[0,0,0],[10,0,0],[10,10,0],[0,10,0]]
            }]
        }"#;
        let scene: SceneFile = serde_json::from_str(json).unwrap();
        let host = JsonHost::from_scene(scene);
        assert_eq!(host.all_view_ids(), vec![1]);
        let info = host.view_info(1).unwrap();
        assert_eq!(info.kind, ViewKind::FloorPlan);
        let elements = host.query_visible_in_view(1);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].element.category_name, "Floors");
    }

    #[test]
    fn unknown_view_id_returns_empty() {
        let scene = SceneFile {
            project_guid: "p".to_string(),
            views: vec![],
            elements: vec![],
            annotations: vec![],
        };
        let host = JsonHost::from_scene(scene);
        assert!(host.view_info(42).is_none());
        assert!(host.query_visible_in_view(42).is_empty());
    }
}

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

//! Element Collector: one broad-phase query per view, policy-filtered.

use crate::capability::{CollectedElement, ElementSourceType, HostCapability};
use crate::policy::{should_include_element, PolicyStats};

pub struct CollectionResult {
    pub included: Vec<CollectedElement>,
    /// All element ids visible in the view, included or not — needed for
    /// the cache signature, which hashes every id seen.
    pub all_visible_ids: Vec<i64>,
    pub stats: PolicyStats,
}

/// Runs the single broad-phase query and applies category policy. This
/// never loops per-category; `host.query_visible_in_view` is expected to
/// already be a single view-scoped, multi-category query.
pub fn collect_elements(host: &dyn HostCapability, view_id: i64) -> CollectionResult {
    let candidates = host.query_visible_in_view(view_id);

    let mut stats = PolicyStats::default();
    let mut included = Vec::with_capacity(candidates.len());
    let mut all_visible_ids = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        all_visible_ids.push(candidate.element.id);

        let (include, _reason, _category) =
            should_include_element(&candidate.element, candidate.source_type, &mut stats);
        if include {
            included.push(candidate);
        }
    }

    CollectionResult {
        included,
        all_visible_ids,
        stats,
    }
}

/// Nearest projected depth over 8 bbox corners, used to sort front-to-back
///. `+inf` for elements missing a bbox — never 0 or -inf, to
/// avoid a false "nearest".
pub fn nearest_projected_depth(
    basis: &crate::view_basis::ViewBasis,
    elem: &CollectedElement,
) -> f64 {
    let bbox = match &elem.element.bbox {
        Some(b) => b,
        None => return f64::INFINITY,
    };
    bbox.corners()
        .iter()
        .map(|&c| basis.to_uvw(elem.to_world(c)).2)
        .fold(f64::INFINITY, f64::min)
}

/// Sorts collected elements strictly front-to-back: `(is_missing, depth)`,
/// ties broken by a stable numeric id so reversing input order yields
/// identical output.
pub fn sort_front_to_back(
    basis: &crate::view_basis::ViewBasis,
    elements: &mut Vec<CollectedElement>,
) {
    elements.sort_by(|a, b| {
        let da = nearest_projected_depth(basis, a);
        let db = nearest_projected_depth(basis, b);
        let missing_a = da.is_infinite();
        let missing_b = db.is_infinite();
        missing_a
            .cmp(&missing_b)
            .then(da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.element.id.cmp(&b.element.id))
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{
        AnnotationInfo, Bbox, BboxSource, ElementInfo, ElementKind, ElementSourceType,
    };
    use crate::view_basis::ViewBasis;
    use glam::{DAffine3, DVec3};

    struct FakeHost {
        elements: Vec<CollectedElement>,
    }

    impl HostCapability for FakeHost {
        fn view_info(&self, _view_id: i64) -> Option<crate::capability::ViewInfo> {
            None
        }
        fn query_visible_in_view(&self, _view_id: i64) -> Vec<CollectedElement> {
            self.elements.clone()
        }
        fn query_annotations_in_view(&self, _view_id: i64) -> Vec<AnnotationInfo> {
            vec![]
        }
        fn import_polylines(&self, _element_id: i64) -> Vec<Vec<DVec3>> {
            vec![]
        }
    }

    fn make_elem(id: i64, category: &str, z: f64) -> CollectedElement {
        CollectedElement {
            element: ElementInfo {
                id,
                category_id: 1,
                category_name: category.to_string(),
                view_specific: false,
                kind: ElementKind::Generic,
                bbox: Some(Bbox {
                    min: DVec3::new(0.0, 0.0, z),
                    max: DVec3::new(1.0, 1.0, z),
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
    fn policy_filters_rooms_but_keeps_ids() {
        let host = FakeHost {
            elements: vec![make_elem(1, "Walls", 0.0), make_elem(2, "Rooms", 0.0)],
        };
        let result = collect_elements(&host, 1);
        assert_eq!(result.included.len(), 1);
        assert_eq!(result.all_visible_ids, vec![1, 2]);
    }

    #[test]
    fn sort_is_front_to_back_and_order_independent() {
        let basis = ViewBasis {
            origin: DVec3::ZERO,
            right: DVec3::X,
            up: DVec3::Y,
            forward: DVec3::Z,
        };
        let mut a = vec![make_elem(1, "Walls", 5.0), make_elem(2, "Walls", 1.0)];
        let mut b = vec![make_elem(2, "Walls", 1.0), make_elem(1, "Walls", 5.0)];
        sort_front_to_back(&basis, &mut a);
        sort_front_to_back(&basis, &mut b);
        let ids_a: Vec<i64> = a.iter().map(|e| e.element.id).collect();
        let ids_b: Vec<i64> = b.iter().map(|e| e.element.id).collect();
        assert_eq!(ids_a, vec![2, 1]);
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn missing_bbox_sorts_last() {
        let basis = ViewBasis {
            origin: DVec3::ZERO,
            right: DVec3::X,
            up: DVec3::Y,
            forward: DVec3::Z,
        };
        let with_bbox = make_elem(1, "Walls", 5.0);
        let mut without_bbox = make_elem(2, "Walls", 1.0);
        without_bbox.element.bbox = None;
        let mut elems = vec![with_bbox.clone(), without_bbox.clone()];
        sort_front_to_back(&basis, &mut elems);
        assert_eq!(elems[0].element.id, with_bbox.element.id);
        assert_eq!(elems[1].element.id, without_bbox.element.id);
    }
}

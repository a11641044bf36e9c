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

//! Category policy (single source of truth): what counts as "model
//! geometry" for occupancy/edges, per source document. Collectors apply
//! this allowlist + global exclusions + per-source overrides.
//!
//! Per-source behavior:
//! - HOST: allowlist includes lines, but view-specific lines are excluded.
//! - LINK/DWG: exclude lines entirely by default, to avoid counting
//!   graphics-only content.

use std::collections::HashMap;

use crate::capability::{ElementInfo, ElementSourceType};

/// Aggregated counters for policy filtering.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PolicyStats {
    pub seen_total: u64,
    pub included_total: u64,
    pub excluded_total: u64,
    pub excluded_by_reason: HashMap<String, u64>,
    pub excluded_by_category: HashMap<String, u64>,
}

impl PolicyStats {
    pub fn mark_excluded(&mut self, reason: &str, category_name: &str) {
        self.excluded_total += 1;
        *self
            .excluded_by_reason
            .entry(reason.to_string())
            .or_insert(0) += 1;
        *self
            .excluded_by_category
            .entry(category_name.to_string())
            .or_insert(0) += 1;
    }

    pub fn mark_included(&mut self) {
        self.included_total += 1;
    }
}

/// Categories we intend to treat as "model geometry" for occupancy/edges.
const INCLUDED_CATEGORIES_BASE: &[&str] = &[
    "Walls",
    "Floors",
    "Roofs",
    "Doors",
    "Windows",
    "Columns",
    "Structural Framing",
    "Structural Columns",
    "Stairs",
    "Railings",
    "Ceilings",
    "Generic Models",
    "Furniture",
    "Casework",
    "Mechanical Equipment",
    "Electrical Equipment",
    "Plumbing Fixtures",
    "Ducts",
    "Pipes",
];

const CATEGORY_LINES: &str = "Lines";

/// Excluded even if a future caller attempts broad collection.
const EXCLUDED_CATEGORIES_GLOBAL: &[&str] = &[
    // Navigation / view mechanics
    "Grids",
    "Grid Heads",
    "Levels",
    "Level Heads",
    "Section Heads",
    "Section Marks",
    "Elevation Marks",
    "Callout Heads",
    "Reference Viewer",
    "Viewers",
    "Cameras",
    "Sun Path",
    "Section Box",
    "Adaptive Points",
    "Reveals",
    // Non-physical / analysis
    "Rooms",
    "Areas",
    "MEP Spaces",
    // Explicitly non-target
    "Detail Components",
    "Point Clouds",
];

pub fn included_categories_for_source(source: ElementSourceType) -> Vec<&'static str> {
    let mut cats: Vec<&'static str> = INCLUDED_CATEGORIES_BASE.to_vec();
    if matches!(source, ElementSourceType::Host) {
        cats.push(CATEGORY_LINES);
    }
    cats
}

pub fn excluded_categories_global() -> &'static [&'static str] {
    EXCLUDED_CATEGORIES_GLOBAL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    Included,
    NoCategory,
    ExcludedGlobal,
    NotInAllowlist,
    ViewSpecificLine,
    LinesExcludedForSource,
}

impl ExcludeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcludeReason::Included => "included",
            ExcludeReason::NoCategory => "no_category",
            ExcludeReason::ExcludedGlobal => "excluded_global",
            ExcludeReason::NotInAllowlist => "not_in_allowlist",
            ExcludeReason::ViewSpecificLine => "view_specific_line",
            ExcludeReason::LinesExcludedForSource => "lines_excluded_for_source",
        }
    }
}

/// Applies category policy to an element. Returns `(include, reason,
/// category_name)`.
pub fn should_include_element(
    elem: &ElementInfo,
    source: ElementSourceType,
    stats: &mut PolicyStats,
) -> (bool, ExcludeReason, String) {
    stats.seen_total += 1;

    let cname = elem.category_name.clone();
    if cname.is_empty() {
        stats.mark_excluded(ExcludeReason::NoCategory.as_str(), "<NO_CATEGORY>");
        return (false, ExcludeReason::NoCategory, "<NO_CATEGORY>".to_string());
    }

    let is_lines = cname == CATEGORY_LINES;

    match source {
        ElementSourceType::Host => {
            if is_lines && elem.view_specific {
                stats.mark_excluded(ExcludeReason::ViewSpecificLine.as_str(), &cname);
                return (false, ExcludeReason::ViewSpecificLine, cname);
            }
        }
        ElementSourceType::Link | ElementSourceType::Dwg => {
            if is_lines {
                stats.mark_excluded(ExcludeReason::LinesExcludedForSource.as_str(), &cname);
                return (false, ExcludeReason::LinesExcludedForSource, cname);
            }
        }
    }

    if EXCLUDED_CATEGORIES_GLOBAL.contains(&cname.as_str()) {
        stats.mark_excluded(ExcludeReason::ExcludedGlobal.as_str(), &cname);
        return (false, ExcludeReason::ExcludedGlobal, cname);
    }

    let allowlist = included_categories_for_source(source);
    if !allowlist.contains(&cname.as_str()) {
        stats.mark_excluded(ExcludeReason::NotInAllowlist.as_str(), &cname);
        return (false, ExcludeReason::NotInAllowlist, cname);
    }

    stats.mark_included();
    (true, ExcludeReason::Included, cname)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::ElementKind;
    use glam::DAffine3;

    fn elem(category: &str, view_specific: bool) -> ElementInfo {
        ElementInfo {
            id: 1,
            category_id: 1,
            category_name: category.to_string(),
            view_specific,
            kind: ElementKind::Generic,
            bbox: None,
            instance_transform: DAffine3::IDENTITY,
            planar_faces: vec![],
            geometry_vertices: vec![],
            sketch_loops: vec![],
        }
    }

    #[test]
    fn wall_is_included_for_host() {
        let mut stats = PolicyStats::default();
        let (include, reason, _) =
            should_include_element(&elem("Walls", false), ElementSourceType::Host, &mut stats);
        assert!(include);
        assert_eq!(reason, ExcludeReason::Included);
    }

    #[test]
    fn view_specific_line_excluded_for_host() {
        let mut stats = PolicyStats::default();
        let (include, reason, _) =
            should_include_element(&elem("Lines", true), ElementSourceType::Host, &mut stats);
        assert!(!include);
        assert_eq!(reason, ExcludeReason::ViewSpecificLine);
    }

    #[test]
    fn non_view_specific_line_included_for_host() {
        let mut stats = PolicyStats::default();
        let (include, _, _) =
            should_include_element(&elem("Lines", false), ElementSourceType::Host, &mut stats);
        assert!(include);
    }

    #[test]
    fn lines_always_excluded_for_link_and_dwg() {
        let mut stats = PolicyStats::default();
        let (include, reason, _) =
            should_include_element(&elem("Lines", false), ElementSourceType::Link, &mut stats);
        assert!(!include);
        assert_eq!(reason, ExcludeReason::LinesExcludedForSource);
    }

    #[test]
    fn rooms_excluded_globally() {
        let mut stats = PolicyStats::default();
        let (include, reason, _) =
            should_include_element(&elem("Rooms", false), ElementSourceType::Host, &mut stats);
        assert!(!include);
        assert_eq!(reason, ExcludeReason::ExcludedGlobal);
    }

    #[test]
    fn unknown_category_not_in_allowlist() {
        let mut stats = PolicyStats::default();
        let (include, reason, _) = should_include_element(
            &elem("SomeWeirdCategory", false),
            ElementSourceType::Host,
            &mut stats,
        );
        assert!(!include);
        assert_eq!(reason, ExcludeReason::NotInAllowlist);
    }

    #[test]
    fn stats_accumulate_across_calls() {
        let mut stats = PolicyStats::default();
        should_include_element(&elem("Walls", false), ElementSourceType::Host, &mut stats);
        should_include_element(&elem("Rooms", false), ElementSourceType::Host, &mut stats);
        assert_eq!(stats.seen_total, 2);
        assert_eq!(stats.included_total, 1);
        assert_eq!(stats.excluded_total, 1);
    }
}

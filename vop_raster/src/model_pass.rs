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

//! Interwoven Model Pass: walks elements front-to-back, classifies
//! each one's size, extracts a footprint, and rasterizes it — ink for real
//! AREAL geometry, proxy presence for TINY/LINEAR/approximate footprints.
//! "Interwoven" because occlusion, ink, and proxy layers are all updated in
//! the same single pass rather than three separate sweeps.

use std::collections::HashMap;

use crate::capability::CollectedElement;
use crate::collector::nearest_projected_depth;
use crate::config::{Config, ProxyMaskMode};
use crate::footprint::{classify_size, extract_footprint, SizeClass};
use crate::raster::{Source, ViewRaster};
use crate::view_basis::ViewBasis;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ModelPassStats {
    pub elements_considered: u64,
    pub elements_skipped_no_bbox: u64,
    pub by_strategy: HashMap<String, u64>,
    pub ink_cells: u64,
    pub proxy_cells: u64,
}

impl ModelPassStats {
    fn record_strategy(&mut self, strategy: &str) {
        *self.by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
    }
}

fn source_of(elem: &CollectedElement) -> Source {
    match elem.source_type {
        crate::capability::ElementSourceType::Host => Source::Host,
        crate::capability::ElementSourceType::Link => Source::Link,
        crate::capability::ElementSourceType::Dwg => Source::Dwg,
    }
}

/// Width/height of an element's projected bbox, in cells — drives TINY vs
/// LINEAR vs AREAL classification.
fn projected_extent_cells(
    elem: &CollectedElement,
    basis: &ViewBasis,
    cell_size_ft: f64,
) -> Option<(f64, f64)> {
    let bbox = elem.element.bbox.as_ref()?;
    let corners = bbox.corners();
    let mut umin = f64::INFINITY;
    let mut umax = f64::NEG_INFINITY;
    let mut vmin = f64::INFINITY;
    let mut vmax = f64::NEG_INFINITY;
    for &c in &corners {
        let (u, v) = basis.to_uv(elem.to_world(c));
        umin = umin.min(u);
        umax = umax.max(u);
        vmin = vmin.min(v);
        vmax = vmax.max(v);
    }
    if cell_size_ft <= 0.0 {
        return None;
    }
    Some(((umax - umin) / cell_size_ft, (vmax - vmin) / cell_size_ft))
}

/// Runs the model pass over already front-to-back-sorted elements. `is_plan_like`
/// gates the walls/floors/roofs/ceilings sketch-loop shortcut in
/// `footprint::extract_footprint`.
pub fn run_model_pass(
    raster: &mut ViewRaster,
    basis: &ViewBasis,
    elements: &[CollectedElement],
    cfg: &Config,
    is_plan_like: bool,
) -> ModelPassStats {
    let mut stats = ModelPassStats::default();

    for elem in elements {
        stats.elements_considered += 1;

        let (w_cells, h_cells) = match projected_extent_cells(elem, basis, raster.cell_size_ft) {
            Some(v) => v,
            None => {
                stats.elements_skipped_no_bbox += 1;
                continue;
            }
        };

        let depth = nearest_projected_depth(basis, elem);
        if depth.is_infinite() {
            stats.elements_skipped_no_bbox += 1;
            continue;
        }

        let size_class = classify_size(w_cells, h_cells, cfg);
        let footprint = extract_footprint(elem, basis, size_class, is_plan_like);
        stats.record_strategy(footprint.strategy);

        if footprint.loops.is_empty() {
            continue;
        }

        let source = source_of(elem);
        let key_index = raster.get_or_create_element_meta_index(
            elem.element.id,
            &elem.element.category_name,
            source,
            source.as_str(),
            Some(&elem.source_id),
        );

        if size_class == SizeClass::Areal && !footprint.is_proxy {
            let filled = raster.rasterize_silhouette_loops(&footprint.loops, key_index, depth, source);
            stats.ink_cells += filled as u64;
            continue;
        }

        match cfg.proxy_mask_mode {
            ProxyMaskMode::Off => {
                // Still occlude via bbox/footprint depth, just skip presence
                // marking — callers asked for occlusion-only proxies.
                for (points_uv, is_hole) in &footprint.loops {
                    if *is_hole {
                        continue;
                    }
                    for &(u, v) in points_uv {
                        let (i, j) = raster.uv_to_ij(u, v);
                        raster.try_write_cell(i, j, depth, source);
                    }
                }
            }
            ProxyMaskMode::Minmask => {
                for (points_uv, is_hole) in &footprint.loops {
                    if *is_hole {
                        continue;
                    }
                    let points_ij: Vec<(i64, i64)> =
                        points_uv.iter().map(|&(u, v)| raster.uv_to_ij(u, v)).collect();
                    let stamped =
                        raster.stamp_proxy_minmask(&points_ij, key_index, depth, source);
                    stats.proxy_cells += stamped as u64;
                }
            }
            ProxyMaskMode::Fill => {
                for (points_uv, is_hole) in &footprint.loops {
                    if *is_hole {
                        continue;
                    }
                    let points_ij: Vec<(i64, i64)> =
                        points_uv.iter().map(|&(u, v)| raster.uv_to_ij(u, v)).collect();
                    let stamped = raster.stamp_proxy_fill(&points_ij, key_index, depth, source);
                    stats.proxy_cells += stamped as u64;
                }
            }
        }
    }

    stats
}

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

//! Metrics Aggregator: classifies every cell into
//! `{Empty, ModelOnly, AnnoOnly, Overlap}` under a configurable
//! `model_presence_mode`, checks that the four counts sum to
//! `total_cells`, and rolls up external-source and per-type annotation
//! counts.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{VopError, VopResult};
use crate::raster::ViewRaster;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ViewMetrics {
    pub total_cells: u64,
    pub empty_cells: u64,
    pub model_only_cells: u64,
    pub anno_only_cells: u64,
    pub overlap_cells: u64,

    /// Cells whose winning occluder came from a link or DWG import.
    pub ext_cells_any: u64,
    /// Cells occluded by a link/DWG source with no host geometry sharing
    /// the cell (`occ_host` unset).
    pub ext_cells_only: u64,
    pub ext_cells_dwg: u64,
    pub ext_cells_rvt_link: u64,

    pub anno_counts_by_type: HashMap<String, u64>,

    pub depth_test_attempted: u64,
    pub depth_test_wins: u64,
    pub depth_test_rejects: u64,

    /// Resolution provenance, filled in by `run_view` from the
    /// `BoundsResolution` that produced this view's raster.
    pub cell_size_ft_requested: f64,
    pub cell_size_ft_effective: f64,
    pub resolution_mode: String,
    pub cap_triggered: bool,
}

/// Computes the full metrics set for a finished view raster. `view_id` is
/// only used to label the invariant error if the classification ever fails
/// to partition the grid. Resolution-provenance fields are left at their
/// defaults here; the caller fills them in from the `BoundsResolution` that
/// produced `raster`.
pub fn compute_metrics(raster: &ViewRaster, cfg: &Config, view_id: i64) -> VopResult<ViewMetrics> {
    let n = raster.w as usize * raster.h as usize;
    let mut m = ViewMetrics {
        total_cells: n as u64,
        ..Default::default()
    };

    for idx in 0..n {
        let has_model = raster.model_present(idx, cfg.model_presence_mode);
        let has_anno = raster.anno_key[idx] != -1;

        match (has_model, has_anno) {
            (false, false) => m.empty_cells += 1,
            (true, false) => m.model_only_cells += 1,
            (false, true) => m.anno_only_cells += 1,
            (true, true) => m.overlap_cells += 1,
        }

        if raster.occ_dwg[idx] {
            m.ext_cells_any += 1;
            m.ext_cells_dwg += 1;
        } else if raster.occ_link[idx] {
            m.ext_cells_any += 1;
            m.ext_cells_rvt_link += 1;
        }
        if (raster.occ_dwg[idx] || raster.occ_link[idx]) && !raster.occ_host[idx] {
            m.ext_cells_only += 1;
        }
    }

    for anno in &raster.anno_meta {
        *m.anno_counts_by_type.entry(anno.anno_type.clone()).or_insert(0) += 1;
    }

    m.depth_test_attempted = raster.depth_test_stats.attempted;
    m.depth_test_wins = raster.depth_test_stats.wins;
    m.depth_test_rejects = raster.depth_test_stats.rejects;

    let sum_of_parts = m.empty_cells + m.model_only_cells + m.anno_only_cells + m.overlap_cells;
    if sum_of_parts != m.total_cells {
        return Err(VopError::MetricsInvariantViolated {
            view_id,
            total: m.total_cells,
            sum_of_parts,
        });
    }

    Ok(m)
}

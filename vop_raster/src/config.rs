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

//! Pipeline configuration, shared by every host integration and the demo
//! CLI. Deserializes directly from JSON so downstream config loaders
//! (out of scope for this crate) can hand it a file or an inline value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMaskMode {
    Off,
    Minmask,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPresenceMode {
    Ink,
    Edge,
    Proxy,
    Occ,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    // --- grid / resolution ---
    pub cell_size_paper_in: f64,
    pub max_sheet_width_in: f64,
    pub max_sheet_height_in: f64,
    pub max_w: u32,
    pub max_h: u32,
    pub tile_size: u32,
    pub adaptive_tile_size: bool,

    // --- bounds ---
    pub bounds_buffer_in: f64,
    pub anno_crop_margin_in: f64,
    pub anno_expand_cap_in: f64,
    pub anno_expand_cap_cells: u32,

    // --- depth / classification ---
    pub depth_eps_ft: f64,
    pub tiny_max: u32,
    pub thin_max: u32,

    // --- layer semantics ---
    pub proxy_mask_mode: ProxyMaskMode,
    pub model_presence_mode: ModelPresenceMode,

    // --- extents scan budgets ---
    pub extents_scan_max_elements: u32,
    pub extents_scan_time_budget_s: f64,

    // --- collection ---
    pub coarse_spatial_filter_enabled: bool,
    pub coarse_spatial_filter_pad_ft: f64,
    pub enable_multicategory_filter: bool,

    // --- cache (excluded from config_hash; see cache.rs) ---
    pub view_cache_enabled: bool,
    pub view_cache_dir: String,
    pub view_cache_require_doc_unmodified: bool,

    // --- diagnostics ---
    pub diagnostics_max_events: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cell_size_paper_in: 1.0 / 8.0,
            max_sheet_width_in: 36.0,
            max_sheet_height_in: 24.0,
            max_w: 4000,
            max_h: 4000,
            tile_size: 16,
            adaptive_tile_size: false,

            bounds_buffer_in: 0.25,
            anno_crop_margin_in: 0.5,
            anno_expand_cap_in: 6.0,
            anno_expand_cap_cells: 64,

            depth_eps_ft: 1e-6,
            tiny_max: 2,
            thin_max: 10,

            proxy_mask_mode: ProxyMaskMode::Minmask,
            model_presence_mode: ModelPresenceMode::Ink,

            extents_scan_max_elements: 50_000,
            extents_scan_time_budget_s: 5.0,

            coarse_spatial_filter_enabled: true,
            coarse_spatial_filter_pad_ft: 5.0,
            enable_multicategory_filter: true,

            view_cache_enabled: true,
            view_cache_dir: "vop_cache".to_string(),
            view_cache_require_doc_unmodified: true,

            diagnostics_max_events: 5_000,
        }
    }
}

impl Config {
    /// Validates range/type constraints, returning a list of human-readable
    /// problems instead of panicking — callers decide whether any problem is
    /// fatal for their run.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.cell_size_paper_in <= 0.0 {
            errors.push("cell_size_paper_in must be > 0".to_string());
        }
        if self.max_sheet_width_in <= 0.0 || self.max_sheet_height_in <= 0.0 {
            errors.push("max_sheet_{width,height}_in must be > 0".to_string());
        }
        if self.max_w == 0 || self.max_h == 0 {
            errors.push("max_w and max_h must be > 0".to_string());
        }
        if self.tile_size == 0 {
            errors.push("tile_size must be > 0".to_string());
        }
        if self.bounds_buffer_in < 0.0 {
            errors.push("bounds_buffer_in must be >= 0".to_string());
        }
        if self.tiny_max == 0 {
            errors.push("tiny_max must be > 0".to_string());
        }
        if self.thin_max < self.tiny_max {
            errors.push("thin_max must be >= tiny_max".to_string());
        }
        if self.extents_scan_max_elements == 0 {
            errors.push("extents_scan_max_elements must be > 0".to_string());
        }
        if self.extents_scan_time_budget_s <= 0.0 {
            errors.push("extents_scan_time_budget_s must be > 0".to_string());
        }
        if self.diagnostics_max_events == 0 {
            errors.push("diagnostics_max_events must be > 0".to_string());
        }

        errors
    }

    /// Canonical JSON for config hashing — cache-location fields are excluded
    /// so relocating the cache directory doesn't invalidate it (see cache.rs).
    pub fn to_hashable_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).expect("Config always serializes");
        if let Some(obj) = v.as_object_mut() {
            obj.remove("view_cache_enabled");
            obj.remove("view_cache_dir");
            obj.remove("view_cache_require_doc_unmodified");
        }
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn invalid_config_reports_problems() {
        let mut cfg = Config::default();
        cfg.cell_size_paper_in = -1.0;
        cfg.thin_max = 0;
        cfg.tiny_max = 5;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("cell_size_paper_in")));
        assert!(errors.iter().any(|e| e.contains("thin_max")));
    }

    #[test]
    fn hashable_json_excludes_cache_fields() {
        let cfg = Config::default();
        let v = cfg.to_hashable_json();
        let obj = v.as_object().unwrap();
        assert!(!obj.contains_key("view_cache_dir"));
        assert!(obj.contains_key("tiny_max"));
    }
}

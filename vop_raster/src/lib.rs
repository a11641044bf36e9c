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

//! Interwoven occlusion-aware rasterizer: turns a view plus its visible
//! elements into per-cell occupancy, ink, proxy, and annotation layers, then
//! rolls those into per-view metrics. [`run_view`] is the single entry point
//! that ties every component together; everything else is composable on its
//! own for testing.

pub mod annotation;
pub mod cache;
pub mod capability;
pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod footprint;
pub mod math_utils;
pub mod metrics;
pub mod model_pass;
pub mod policy;
pub mod raster;
pub mod view_basis;

pub use error::{VopError, VopResult};

use capability::{HostCapability, ViewKind};
use config::Config;
use diagnostics::{Diagnostics, DiagnosticsSummary};
use raster::ViewRaster;
use view_basis::ViewMode;

/// Everything the CLI (or any other caller) needs from one view's run: the
/// metrics, why the bounds were resolved the way they were, and every
/// per-phase stat bundle for a diagnostic dump.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ViewReport {
    pub view_id: i64,
    pub mode: &'static str,
    pub from_cache: bool,
    pub metrics: Option<metrics::ViewMetrics>,
    pub bounds_reason: String,
    pub cap_triggered: bool,
    pub collection_stats: policy::PolicyStats,
    pub model_pass_stats: model_pass::ModelPassStats,
    pub annotation_pass_stats: annotation::AnnotationPassStats,
    pub diagnostics: DiagnosticsSummary,
}

fn rejected_report(view_id: i64, reason: &'static str, diag: &Diagnostics) -> ViewReport {
    ViewReport {
        view_id,
        mode: "rejected",
        from_cache: false,
        metrics: None,
        bounds_reason: reason.to_string(),
        cap_triggered: false,
        collection_stats: policy::PolicyStats::default(),
        model_pass_stats: model_pass::ModelPassStats::default(),
        annotation_pass_stats: annotation::AnnotationPassStats::default(),
        diagnostics: diag.to_summary(),
    }
}

fn mode_label(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::ModelAndAnnotation => "model_and_annotation",
        ViewMode::AnnotationOnly => "annotation_only",
        ViewMode::Rejected => "rejected",
    }
}

/// Runs the whole per-view pipeline: mode gate, bounds resolution, element
/// collection, the interwoven model pass, the annotation pass, then
/// metrics. A rejected or unresolvable view still returns `Ok` with
/// `metrics: None`; only a structural host failure is a hard
/// `VopError` the caller must handle per-view, never a panic.
pub fn run_view(
    host: &dyn HostCapability,
    view_id: i64,
    cfg: &Config,
    view_cache: Option<&cache::ViewCache>,
) -> VopResult<ViewReport> {
    let pipeline_start = std::time::Instant::now();
    let mut diag = Diagnostics::new(cfg.diagnostics_max_events);

    let view = host
        .view_info(view_id)
        .ok_or(VopError::StructuralHostBreakage { view_id })?;

    let (mode, mode_reason) = view_basis::resolve_view_mode(&view);
    if mode == ViewMode::Rejected {
        return Ok(rejected_report(view_id, mode_reason, &diag));
    }

    let collection = collector::collect_elements(host, view_id);
    let annotations = host.query_annotations_in_view(view_id);

    if let Some(cache) = view_cache.filter(|_| cfg.view_cache_enabled) {
        let signature = cache::compute_view_signature(&view, &collection.all_visible_ids);
        let (status, entry) = cache.lookup(view_id, &signature);
        if status == cache::CacheLookup::Hit {
            if let Some(entry) = entry {
                if let Ok(cached_metrics) = serde_json::from_value(entry.metrics) {
                    // A hit restores provenance from the cached row instead of
                    // guessing; elapsed time on a hit is reported as zero.
                    let bounds_reason = entry
                        .row_payload
                        .get("bounds_reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("cache")
                        .to_string();
                    let cap_triggered = entry
                        .row_payload
                        .get("cap_triggered")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    return Ok(ViewReport {
                        view_id,
                        mode: mode_label(mode),
                        from_cache: true,
                        metrics: Some(cached_metrics),
                        bounds_reason,
                        cap_triggered,
                        collection_stats: collection.stats,
                        model_pass_stats: model_pass::ModelPassStats::default(),
                        annotation_pass_stats: annotation::AnnotationPassStats::default(),
                        diagnostics: diag.to_summary(),
                    });
                }
            }
        }
    }

    let mut elements = collection.included;
    let bounds = view_basis::resolve_view_bounds(&view, &elements, &annotations, cfg, &mut diag);

    let mut raster = ViewRaster::new(
        bounds.width_cells,
        bounds.height_cells,
        bounds.cell_size_ft_effective,
        bounds.bounds_uv,
        cfg.tile_size,
    );

    let is_plan_like = matches!(view.kind, ViewKind::FloorPlan | ViewKind::CeilingPlan);

    let model_pass_stats = if mode == ViewMode::ModelAndAnnotation {
        collector::sort_front_to_back(&bounds.basis, &mut elements);
        model_pass::run_model_pass(&mut raster, &bounds.basis, &elements, cfg, is_plan_like)
    } else {
        model_pass::ModelPassStats::default()
    };

    let annotation_pass_stats = annotation::run_annotation_pass(
        &mut raster,
        &bounds.basis,
        &annotations,
        cfg,
        &mut diag,
        view_id,
    );

    let mut view_metrics = metrics::compute_metrics(&raster, cfg, view_id)?;
    view_metrics.cell_size_ft_requested = bounds.cell_size_ft_requested;
    view_metrics.cell_size_ft_effective = bounds.cell_size_ft_effective;
    view_metrics.resolution_mode = bounds.resolution_mode.to_string();
    view_metrics.cap_triggered = bounds.cap_triggered;

    if let Some(cache) = view_cache.filter(|_| cfg.view_cache_enabled) {
        let signature = cache::compute_view_signature(&view, &collection.all_visible_ids);
        if let Ok(metrics_payload) = serde_json::to_value(&view_metrics) {
            let row_payload = serde_json::json!({
                "bounds_reason": bounds.reason,
                "cap_triggered": bounds.cap_triggered,
            });
            let timings = serde_json::json!({
                "total_s": pipeline_start.elapsed().as_secs_f64(),
            });
            // Best-effort: a cache write failure degrades to "recompute next
            // time", never fails the view that just succeeded.
            if let Err(e) = cache.store(view_id, &signature, row_payload, metrics_payload, timings) {
                diag.warn(diagnostics::DiagArgs {
                    phase: "cache",
                    callsite: "run_view",
                    message: "failed to persist view cache entry",
                    exc_message: Some(&e.to_string()),
                    view_id: Some(view_id),
                    ..Default::default()
                });
            }
        }
    }

    Ok(ViewReport {
        view_id,
        mode: mode_label(mode),
        from_cache: false,
        metrics: Some(view_metrics),
        bounds_reason: bounds.reason.to_string(),
        cap_triggered: bounds.cap_triggered,
        collection_stats: collection.stats,
        model_pass_stats,
        annotation_pass_stats,
        diagnostics: diag.to_summary(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{
        AnnotationInfo, Bbox, BboxSource, CollectedElement, ElementInfo, ElementKind,
        ElementSourceType, ViewInfo,
    };
    use glam::{DAffine3, DVec3};

    struct FakeHost {
        view: ViewInfo,
        elements: Vec<CollectedElement>,
        annotations: Vec<AnnotationInfo>,
    }

    impl HostCapability for FakeHost {
        fn view_info(&self, _view_id: i64) -> Option<ViewInfo> {
            Some(self.view.clone())
        }
        fn query_visible_in_view(&self, _view_id: i64) -> Vec<CollectedElement> {
            self.elements.clone()
        }
        fn query_annotations_in_view(&self, _view_id: i64) -> Vec<AnnotationInfo> {
            self.annotations.clone()
        }
        fn import_polylines(&self, _element_id: i64) -> Vec<Vec<DVec3>> {
            vec![]
        }
    }

    fn base_view() -> ViewInfo {
        ViewInfo {
            id: 1,
            name: "Level 1".to_string(),
            kind: ViewKind::FloorPlan,
            is_template: false,
            scale: 96,
            discipline: "Architectural".to_string(),
            phase: "New".to_string(),
            detail_level: "Medium".to_string(),
            template_id: -1,
            origin: DVec3::ZERO,
            right: DVec3::X,
            up: DVec3::Y,
            view_direction: DVec3::new(0.0, 0.0, -1.0),
            crop_box: Some(capability::CropBox {
                min: DVec3::new(0.0, 0.0, 0.0),
                max: DVec3::new(20.0, 20.0, 0.0),
                transform: None,
                active: true,
            }),
            annotation_crop_active: false,
            cut_plane_elevation: Some(4.0),
        }
    }

    fn floor(id: i64) -> CollectedElement {
        CollectedElement {
            element: ElementInfo {
                id,
                category_id: 1,
                category_name: "Floors".to_string(),
                view_specific: false,
                kind: ElementKind::Floor,
                bbox: Some(Bbox {
                    min: DVec3::new(2.0, 2.0, 0.0),
                    max: DVec3::new(15.0, 15.0, 0.0),
                    source: BboxSource::Model,
                }),
                instance_transform: DAffine3::IDENTITY,
                planar_faces: vec![],
                geometry_vertices: vec![
                    DVec3::new(2.0, 2.0, 0.0),
                    DVec3::new(15.0, 2.0, 0.0),
                    DVec3::new(15.0, 15.0, 0.0),
                    DVec3::new(2.0, 15.0, 0.0),
                ],
                sketch_loops: vec![],
            },
            world_transform: DAffine3::IDENTITY,
            source_type: ElementSourceType::Host,
            source_id: "HOST".to_string(),
            link_inst_id: None,
        }
    }

    #[test]
    fn template_view_is_rejected_before_any_geometry_work() {
        let mut view = base_view();
        view.is_template = true;
        let host = FakeHost {
            view,
            elements: vec![],
            annotations: vec![],
        };
        let cfg = Config::default();
        let report = run_view(&host, 1, &cfg, None).unwrap();
        assert_eq!(report.mode, "rejected");
        assert!(report.metrics.is_none());
    }

    #[test]
    fn model_and_annotation_view_produces_metrics() {
        let host = FakeHost {
            view: base_view(),
            elements: vec![floor(1)],
            annotations: vec![],
        };
        let cfg = Config::default();
        let report = run_view(&host, 1, &cfg, None).unwrap();
        assert_eq!(report.mode, "model_and_annotation");
        let metrics = report.metrics.unwrap();
        assert!(metrics.total_cells > 0);
        assert_eq!(
            metrics.empty_cells + metrics.model_only_cells + metrics.anno_only_cells + metrics.overlap_cells,
            metrics.total_cells
        );
    }

    #[test]
    fn missing_view_is_structural_breakage() {
        struct EmptyHost;
        impl HostCapability for EmptyHost {
            fn view_info(&self, _view_id: i64) -> Option<ViewInfo> {
                None
            }
            fn query_visible_in_view(&self, _view_id: i64) -> Vec<CollectedElement> {
                vec![]
            }
            fn query_annotations_in_view(&self, _view_id: i64) -> Vec<AnnotationInfo> {
                vec![]
            }
            fn import_polylines(&self, _element_id: i64) -> Vec<Vec<DVec3>> {
                vec![]
            }
        }
        let cfg = Config::default();
        let result = run_view(&EmptyHost, 99, &cfg, None);
        assert!(matches!(result, Err(VopError::StructuralHostBreakage { view_id: 99 })));
    }

    #[test]
    fn cache_hit_skips_recomputation() {
        let tmp = std::env::temp_dir().join(format!("vop_lib_cache_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&tmp);
        let mut cfg = Config::default();
        cfg.view_cache_dir = tmp.display().to_string();

        let host = FakeHost {
            view: base_view(),
            elements: vec![floor(1)],
            annotations: vec![],
        };

        let cache = cache::ViewCache::new(&cfg, "proj-guid");
        let first = run_view(&host, 1, &cfg, Some(&cache)).unwrap();
        assert!(!first.from_cache);

        let second = run_view(&host, 1, &cfg, Some(&cache)).unwrap();
        assert!(second.from_cache);
        assert_eq!(
            second.metrics.unwrap().total_cells,
            first.metrics.unwrap().total_cells
        );

        std::fs::remove_dir_all(&tmp).ok();
    }
}

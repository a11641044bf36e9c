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

//! Per-view cache: a SHA-1 signature over canonical view metadata
//! plus the sorted set of visible element ids, stored alongside a
//! SHA-256 config hash that invalidates the *whole* cache file on any
//! config change — a stale partial cache is worse than no cache.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::capability::ViewInfo;
use crate::config::Config;
use crate::error::{VopError, VopResult};

pub const EXPORTER_VERSION: &str = "1.0.0";

fn hex_prefix(digest: &[u8], n: usize) -> String {
    let full: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    full[..n.min(full.len())].to_string()
}

fn view_kind_label(kind: crate::capability::ViewKind) -> &'static str {
    use crate::capability::ViewKind::*;
    match kind {
        FloorPlan => "floor_plan",
        CeilingPlan => "ceiling_plan",
        Section => "section",
        Elevation => "elevation",
        ThreeD => "three_d",
        Drafting => "drafting",
        Legend => "legend",
        Schedule => "schedule",
        Unknown => "unknown",
    }
}

/// Crop geometry folded into the signature at 2-decimal precision: small
/// floating jitter from re-derived transforms shouldn't force a cache miss.
fn crop_fingerprint(view: &ViewInfo) -> String {
    match &view.crop_box {
        Some(c) if c.active => format!(
            "{:.2},{:.2},{:.2}-{:.2},{:.2},{:.2}",
            c.min.x, c.min.y, c.min.z, c.max.x, c.max.y, c.max.z
        ),
        _ => "none".to_string(),
    }
}

/// SHA-256, first 8 hex chars, of the config's hashable JSON projection.
pub fn compute_config_hash(cfg: &Config) -> String {
    let json = cfg.to_hashable_json();
    let bytes = serde_json::to_vec(&json).expect("config json always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex_prefix(&hasher.finalize(), 8)
}

/// SHA-1, first 8 hex chars, of canonical view metadata plus every visible
/// element id (included or not — a newly-excluded element still changes
/// what the view would render once policy catches up).
pub fn compute_view_signature(view: &ViewInfo, visible_element_ids: &[i64]) -> String {
    let mut sorted_ids = visible_element_ids.to_vec();
    sorted_ids.sort_unstable();
    let ids_str = sorted_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let canonical = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        view_kind_label(view.kind),
        view.scale,
        view.detail_level,
        view.template_id,
        view.discipline,
        view.phase,
        crop_fingerprint(view),
        ids_str,
    );

    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    hex_prefix(&hasher.finalize(), 8)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CachedViewEntry {
    pub view_signature: String,
    /// Non-metrics provenance for the view (bounds resolution reason, cap
    /// state, ...); restored verbatim on a cache hit instead of guessed.
    pub row_payload: serde_json::Value,
    pub metrics: serde_json::Value,
    pub timings: serde_json::Value,
    pub cached_utc: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CacheFile {
    exporter_version: String,
    config_hash: String,
    project_guid: String,
    #[serde(default)]
    views: HashMap<String, CachedViewEntry>,
}

/// A lookup result, distinguishing a clean hit from every flavor of miss so
/// callers can log *why* they recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    MissNoFile,
    MissWholeCacheInvalidated,
    MissViewNotCached,
    MissSignatureChanged,
}

pub struct ViewCache {
    dir: PathBuf,
    project_guid: String,
    config_hash: String,
}

impl ViewCache {
    pub fn new(cfg: &Config, project_guid: &str) -> Self {
        ViewCache {
            dir: PathBuf::from(&cfg.view_cache_dir),
            project_guid: project_guid.to_string(),
            config_hash: compute_config_hash(cfg),
        }
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join("view_cache.json")
    }

    fn load_file(&self) -> Result<CacheFile, CacheLookup> {
        let path = self.file_path();
        let data = fs::read_to_string(&path).map_err(|_| CacheLookup::MissNoFile)?;
        let file: CacheFile =
            serde_json::from_str(&data).map_err(|_| CacheLookup::MissWholeCacheInvalidated)?;

        if file.exporter_version != EXPORTER_VERSION
            || file.config_hash != self.config_hash
            || file.project_guid != self.project_guid
        {
            return Err(CacheLookup::MissWholeCacheInvalidated);
        }
        Ok(file)
    }

    /// Looks up a cached result, returning both the classification and (on
    /// a hit) the full cached entry, including row payload and timings.
    pub fn lookup(&self, view_id: i64, signature: &str) -> (CacheLookup, Option<CachedViewEntry>) {
        let file = match self.load_file() {
            Ok(f) => f,
            Err(miss) => return (miss, None),
        };

        match file.views.get(&view_id.to_string()) {
            None => (CacheLookup::MissViewNotCached, None),
            Some(entry) if entry.view_signature == signature => {
                (CacheLookup::Hit, Some(entry.clone()))
            }
            Some(_) => (CacheLookup::MissSignatureChanged, None),
        }
    }

    /// Writes (or updates) one view's entry, atomically: a temp file plus a
    /// rename, so a crash mid-write never leaves a half-written cache.
    pub fn store(
        &self,
        view_id: i64,
        signature: &str,
        row_payload: serde_json::Value,
        metrics: serde_json::Value,
        timings: serde_json::Value,
    ) -> VopResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| VopError::CacheSave {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        let mut file = self.load_file().unwrap_or_else(|_| CacheFile {
            exporter_version: EXPORTER_VERSION.to_string(),
            config_hash: self.config_hash.clone(),
            project_guid: self.project_guid.clone(),
            views: HashMap::new(),
        });

        let cached_utc = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        file.views.insert(
            view_id.to_string(),
            CachedViewEntry {
                view_signature: signature.to_string(),
                row_payload,
                metrics,
                timings,
                cached_utc,
            },
        );

        let path = self.file_path();
        let tmp_path = self.dir.join(format!(".view_cache.json.{}.tmp", std::process::id()));

        let json = serde_json::to_string_pretty(&file)?;
        {
            let mut f = fs::File::create(&tmp_path).map_err(|e| VopError::CacheSave {
                path: tmp_path.display().to_string(),
                source: e,
            })?;
            f.write_all(json.as_bytes())
                .map_err(|e| VopError::CacheSave {
                    path: tmp_path.display().to_string(),
                    source: e,
                })?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| VopError::CacheSave {
            path: path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::{CropBox, ViewKind};
    use glam::DVec3;

    fn view() -> ViewInfo {
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
            crop_box: None,
            annotation_crop_active: false,
            cut_plane_elevation: Some(4.0),
        }
    }

    #[test]
    fn signature_is_stable_for_same_input() {
        let v = view();
        let a = compute_view_signature(&v, &[3, 1, 2]);
        let b = compute_view_signature(&v, &[1, 2, 3]);
        assert_eq!(a, b, "id order must not affect the signature");
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn signature_changes_with_crop() {
        let mut v = view();
        let base = compute_view_signature(&v, &[1]);
        v.crop_box = Some(CropBox {
            min: DVec3::ZERO,
            max: DVec3::new(10.0, 10.0, 0.0),
            transform: None,
            active: true,
        });
        let cropped = compute_view_signature(&v, &[1]);
        assert_ne!(base, cropped);
    }

    #[test]
    fn config_hash_changes_with_config() {
        let a = compute_config_hash(&Config::default());
        let mut cfg = Config::default();
        cfg.tiny_max = 99;
        let b = compute_config_hash(&cfg);
        assert_ne!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn config_hash_ignores_cache_location_fields() {
        let mut cfg = Config::default();
        let a = compute_config_hash(&cfg);
        cfg.view_cache_dir = "/somewhere/else".to_string();
        let b = compute_config_hash(&cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn store_then_lookup_roundtrips_and_detects_signature_change() {
        let tmp = std::env::temp_dir().join(format!("vop_cache_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let mut cfg = Config::default();
        cfg.view_cache_dir = tmp.display().to_string();

        let cache = ViewCache::new(&cfg, "guid-1");
        let v = view();
        let sig = compute_view_signature(&v, &[1, 2, 3]);
        cache
            .store(
                1,
                &sig,
                serde_json::json!({"bounds_reason": "crop"}),
                serde_json::json!({"total_cells": 42}),
                serde_json::json!({"total_s": 0.01}),
            )
            .unwrap();

        let (status, entry) = cache.lookup(1, &sig);
        assert_eq!(status, CacheLookup::Hit);
        let entry = entry.unwrap();
        assert_eq!(entry.metrics["total_cells"], 42);
        assert_eq!(entry.row_payload["bounds_reason"], "crop");
        assert!(entry.cached_utc > 0.0);

        let other_sig = compute_view_signature(&v, &[1, 2, 3, 4]);
        let (status2, entry2) = cache.lookup(1, &other_sig);
        assert_eq!(status2, CacheLookup::MissSignatureChanged);
        assert!(entry2.is_none());

        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn config_change_invalidates_whole_cache() {
        let tmp = std::env::temp_dir().join(format!("vop_cache_test2_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let mut cfg = Config::default();
        cfg.view_cache_dir = tmp.display().to_string();

        let cache = ViewCache::new(&cfg, "guid-1");
        let v = view();
        let sig = compute_view_signature(&v, &[1]);
        cache
            .store(
                1,
                &sig,
                serde_json::json!({}),
                serde_json::json!({"total_cells": 1}),
                serde_json::json!({}),
            )
            .unwrap();

        let mut cfg2 = cfg.clone();
        cfg2.tiny_max = 77;
        let cache2 = ViewCache::new(&cfg2, "guid-1");
        let (status, _) = cache2.lookup(1, &sig);
        assert_eq!(status, CacheLookup::MissWholeCacheInvalidated);

        fs::remove_dir_all(&tmp).ok();
    }
}

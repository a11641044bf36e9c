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

//! `export` subcommand: loads a JSON scene file, runs every (or a chosen
//! subset of) view through the rasterizer, and writes the resulting
//! per-view reports as JSON.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use structopt::StructOpt;

use vop_raster::cache::ViewCache;
use vop_raster::config::Config;
use vop_raster::run_view;

use crate::scene_dto::{JsonHost, SceneFile};

#[derive(StructOpt)]
pub struct ExportArgs {
    /// JSON scene file describing views, elements, and annotations.
    #[structopt(long, parse(from_os_str))]
    pub(crate) scene: PathBuf,

    /// JSON config file; any field left out falls back to the built-in default.
    #[structopt(long, parse(from_os_str))]
    pub(crate) config: Option<PathBuf>,

    /// Where to write the per-view JSON report array; stdout if omitted.
    #[structopt(long, parse(from_os_str))]
    pub(crate) out: Option<PathBuf>,

    /// Restrict the run to these view ids; defaults to every view in the scene.
    #[structopt(long)]
    pub(crate) view_id: Vec<i64>,
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        None => Ok(Config::default()),
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("reading config file {:?}", p))?;
            let cfg: Config =
                serde_json::from_str(&text).with_context(|| format!("parsing config file {:?}", p))?;
            Ok(cfg)
        }
    }
}

pub fn export(args: &ExportArgs) -> Result<()> {
    let scene_text =
        fs::read_to_string(&args.scene).with_context(|| format!("reading scene file {:?}", args.scene))?;
    let scene: SceneFile =
        serde_json::from_str(&scene_text).with_context(|| format!("parsing scene file {:?}", args.scene))?;
    let project_guid = scene.project_guid.clone();

    let cfg = load_config(&args.config)?;
    let problems = cfg.validate();
    if !problems.is_empty() {
        bail!("invalid config: {}", problems.join("; "));
    }

    let host = JsonHost::from_scene(scene);
    let view_ids = if args.view_id.is_empty() {
        host.all_view_ids()
    } else {
        args.view_id.clone()
    };
    if view_ids.is_empty() {
        bail!("scene has no views to export");
    }

    let view_cache = if cfg.view_cache_enabled {
        Some(ViewCache::new(&cfg, &project_guid))
    } else {
        None
    };

    let mut reports = Vec::new();
    for view_id in &view_ids {
        match run_view(&host, *view_id, &cfg, view_cache.as_ref()) {
            Ok(report) => reports.push(report),
            Err(e) => log::error!("view {} failed: {}", view_id, e),
        }
    }

    let json = serde_json::to_string_pretty(&reports)?;
    match &args.out {
        Some(path) => fs::write(path, json).with_context(|| format!("writing report to {:?}", path))?,
        None => println!("{}", json),
    }

    Ok(())
}

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

//! Typed errors for the core rasterizer. Host-API glue and the demo CLI use
//! `anyhow` instead; these variants are reserved for conditions the core
//! itself must detect and cannot paper over.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VopError {
    #[error("metrics invariant violated for view {view_id}: total {total} != sum of parts {sum_of_parts}")]
    MetricsInvariantViolated {
        view_id: i64,
        total: u64,
        sum_of_parts: u64,
    },

    #[error("view {view_id} has no usable id/type and cannot be processed")]
    StructuralHostBreakage { view_id: i64 },

    #[error("cache file at {path} failed to load: {source}")]
    CacheLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file at {path} failed to save: {source}")]
    CacheSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization failed: {0}")]
    CacheSerde(#[from] serde_json::Error),

    #[error("view {view_id} rejected: {reason}")]
    ViewRejected { view_id: i64, reason: String },
}

pub type VopResult<T> = Result<T, VopError>;

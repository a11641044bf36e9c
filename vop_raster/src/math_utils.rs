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

//! Bounds and rectangle primitives shared across the rasterizer.

use serde::{Deserialize, Serialize};

/// Tolerance for plane normal comparisons when grouping planar faces.
pub const NORMAL_EPS: f64 = 1e-6;
/// Tolerance for plane offset comparisons when grouping planar faces.
pub const OFFSET_EPS: f64 = 1e-4;

/// Axis-aligned bounding box in view-local UV space.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Bounds2D {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bounds2D {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Bounds2D { xmin, ymin, xmax, ymax }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.xmin <= x && x <= self.xmax && self.ymin <= y && y <= self.ymax
    }

    pub fn intersects(&self, other: &Bounds2D) -> bool {
        if self.xmax < other.xmin || other.xmax < self.xmin {
            return false;
        }
        if self.ymax < other.ymin || other.ymax < self.ymin {
            return false;
        }
        true
    }

    /// Returns a new Bounds2D expanded by `margin` on all sides.
    pub fn expand(&self, margin: f64) -> Bounds2D {
        Bounds2D::new(
            self.xmin - margin,
            self.ymin - margin,
            self.xmax + margin,
            self.ymax + margin,
        )
    }

    /// Union of two bounds (smallest box containing both).
    pub fn union(&self, other: &Bounds2D) -> Bounds2D {
        Bounds2D::new(
            self.xmin.min(other.xmin),
            self.ymin.min(other.ymin),
            self.xmax.max(other.xmax),
            self.ymax.max(other.ymax),
        )
    }
}

/// Inclusive rectangle of grid cell indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub i_min: i64,
    pub j_min: i64,
    pub i_max: i64,
    pub j_max: i64,
    pub width_cells: i64,
    pub height_cells: i64,
    pub empty: bool,
}

impl CellRect {
    pub fn new(i_min: i64, j_min: i64, i_max: i64, j_max: i64) -> Self {
        let width_cells = (i_max - i_min + 1).max(0);
        let height_cells = (j_max - j_min + 1).max(0);
        CellRect {
            i_min,
            j_min,
            i_max,
            j_max,
            width_cells,
            height_cells,
            empty: width_cells == 0 || height_cells == 0,
        }
    }

    /// Iterates all (i, j) cell indices in this rectangle, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.i_min..=self.i_max)
            .flat_map(move |i| (self.j_min..=self.j_max).map(move |j| (i, j)))
    }

    pub fn cell_count(&self) -> i64 {
        self.width_cells * self.height_cells
    }

    pub fn center_cell(&self) -> (i64, i64) {
        ((self.i_min + self.i_max) / 2, (self.j_min + self.j_max) / 2)
    }
}

pub fn rect_intersects_bounds(
    rect_xmin: f64,
    rect_ymin: f64,
    rect_xmax: f64,
    rect_ymax: f64,
    bounds: &Bounds2D,
) -> bool {
    if rect_xmax < bounds.xmin || rect_xmin > bounds.xmax {
        return false;
    }
    if rect_ymax < bounds.ymin || rect_ymin > bounds.ymax {
        return false;
    }
    true
}

pub fn clamp(value: f64, min_val: f64, max_val: f64) -> f64 {
    value.max(min_val).min(max_val)
}

pub fn point_in_rect(x: f64, y: f64, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> bool {
    xmin <= x && x <= xmax && ymin <= y && y <= ymax
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounds_basic() {
        let b = Bounds2D::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 10.0);
        assert!(b.contains_point(5.0, 5.0));
        assert!(!b.contains_point(11.0, 5.0));
    }

    #[test]
    fn bounds_intersects() {
        let b = Bounds2D::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect_intersects_bounds(5.0, 5.0, 15.0, 15.0, &b));
        assert!(!rect_intersects_bounds(20.0, 20.0, 30.0, 30.0, &b));
    }

    #[test]
    fn cell_rect_dims() {
        let rect = CellRect::new(0, 0, 4, 6);
        assert_eq!(rect.width_cells, 5);
        assert_eq!(rect.height_cells, 7);
        assert!(!rect.empty);
        assert_eq!(rect.cell_count(), 35);
    }

    #[test]
    fn cell_rect_center() {
        let rect = CellRect::new(0, 0, 4, 4);
        assert_eq!(rect.center_cell(), (2, 2));
    }
}

//! Grid dimensions and the pixel mapping.

use serde::{Deserialize, Serialize};

use crate::config::GridConfig;
use dashgrid_core::{GridRect, Size};

/// Rows needed to show every rectangle: `max(1, max(y + height))`.
#[must_use]
pub fn required_rows<'a>(rects: impl IntoIterator<Item = &'a GridRect>) -> u16 {
    rects.into_iter().map(GridRect::bottom).max().unwrap_or(0).max(1)
}

/// Grid dimensions.
///
/// `columns` and `row_limit` are fixed for the engine's lifetime. `rows`
/// follows the layout: it grows while a gesture displaces widgets downward
/// and is recomputed after every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    columns: u16,
    rows: u16,
    min_rows: u16,
    row_limit: Option<u16>,
}

impl Grid {
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        Self {
            columns: config.max_columns,
            rows: config.min_rows.max(1),
            min_rows: config.min_rows,
            row_limit: config.max_rows_cap,
        }
    }

    #[inline]
    #[must_use]
    pub const fn columns(&self) -> u16 {
        self.columns
    }

    #[inline]
    #[must_use]
    pub const fn rows(&self) -> u16 {
        self.rows
    }

    #[inline]
    #[must_use]
    pub const fn min_rows(&self) -> u16 {
        self.min_rows
    }

    /// Hard row cap, if any.
    #[inline]
    #[must_use]
    pub const fn row_limit(&self) -> Option<u16> {
        self.row_limit
    }

    /// Visible grid area.
    #[must_use]
    pub const fn area(&self) -> GridRect {
        GridRect::from_size(self.columns, self.rows)
    }

    /// Set `rows = max(required, min_rows)`. Returns whether `rows` changed.
    pub fn resize(&mut self, required: u16) -> bool {
        let rows = required.max(self.min_rows).max(1);
        let changed = rows != self.rows;
        self.rows = rows;
        changed
    }

    /// Raise `rows` to `bottom` during a gesture. Never shrinks.
    pub fn grow_to(&mut self, bottom: u16) -> bool {
        if bottom > self.rows {
            self.rows = bottom;
            true
        } else {
            false
        }
    }
}

/// A rectangle in pixels, relative to the grid container's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    #[must_use]
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// How [`CellMetrics::from_pixels`] snaps a rectangle to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapMode {
    /// Round the top-left corner; size follows from the far edges.
    #[default]
    Drag,
    /// Round sizes with a 0.49 px bias. A dragged left or top edge keeps the
    /// opposite edge anchored.
    Resize { left_edge: bool, top_edge: bool },
}

/// Pixel size of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    cell_width: f64,
    cell_height: f64,
    columns: u16,
    row_limit: u16,
    min_size: Size,
}

/// Sub-pixel bias applied to sizes while resizing.
const RESIZE_BIAS: f64 = 0.49;

fn half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

impl CellMetrics {
    /// Metrics for a container `container_width` pixels wide.
    #[must_use]
    pub fn new(container_width: f64, config: &GridConfig) -> Self {
        let columns = config.max_columns.max(1);
        Self {
            cell_width: container_width / f64::from(columns),
            cell_height: f64::from(config.widget_height_px.max(1)),
            columns,
            row_limit: config.row_limit(),
            min_size: config.min_widget_size(),
        }
    }

    #[must_use]
    pub const fn cell_width(&self) -> f64 {
        self.cell_width
    }

    #[must_use]
    pub const fn cell_height(&self) -> f64 {
        self.cell_height
    }

    /// Pixel rectangle covering `rect`.
    #[must_use]
    pub fn to_pixels(&self, rect: GridRect) -> PixelRect {
        PixelRect::new(
            f64::from(rect.x) * self.cell_width,
            f64::from(rect.y) * self.cell_height,
            f64::from(rect.width) * self.cell_width,
            f64::from(rect.height) * self.cell_height,
        )
    }

    /// Snap a pixel rectangle to grid cells.
    ///
    /// The result always lies inside the grid and honours the minimum widget
    /// size.
    #[must_use]
    pub fn from_pixels(&self, px: PixelRect, mode: SnapMode) -> GridRect {
        let (cw, ch) = (self.cell_width, self.cell_height);
        let cols = i64::from(self.columns);
        let rows = i64::from(self.row_limit);

        let (mut x, mut y, mut w, mut h) = match mode {
            SnapMode::Resize {
                left_edge,
                top_edge,
            } => {
                let w = half_up(px.width / cw - RESIZE_BIAS);
                let h = half_up(px.height / ch - RESIZE_BIAS);
                let x = if left_edge {
                    half_up((px.left + px.width) / cw) - w
                } else {
                    half_up(px.left / cw)
                };
                let y = if top_edge {
                    half_up((px.top + px.height) / ch) - h
                } else {
                    half_up(px.top / ch)
                };
                (
                    x,
                    y,
                    w.min(w + x).min(cols - x),
                    h.min(h + y).min(rows - y),
                )
            }
            SnapMode::Drag => {
                let x = half_up(px.left / cw);
                let y = half_up(px.top / ch);
                let w = half_up((px.width + px.left - x as f64 * cw) / cw);
                let h = half_up((px.height + px.top - y as f64 * ch) / ch);
                (x, y, w, h)
            }
        };

        x = x.min(cols - w).max(0);
        y = y.min(rows - h).max(0);
        w = w.max(1);
        h = h.max(i64::from(self.min_size.height));

        let to_cell = |v: i64| u16::try_from(v.clamp(0, i64::from(u16::MAX))).unwrap_or(u16::MAX);
        GridRect::new(to_cell(x), to_cell(y), to_cell(w), to_cell(h))
            .clamp(GridRect::from_size(self.columns, self.row_limit), self.min_size)
    }
}

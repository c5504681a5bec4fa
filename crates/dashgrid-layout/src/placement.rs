//! Placement of new widgets.
//!
//! [`find_empty_position`] is a first-fit raster scan and the cell it picks
//! is part of the observable contract: rows top to bottom, columns left to
//! right, the first free candidate wins. It never tries a different shape.

use crate::error::{GridError, Result};
use dashgrid_core::{GridRect, Size};

/// First free rectangle of `size`, scanning rows from the top.
///
/// Fails with [`GridError::Exhausted`] when no row up to
/// `row_limit - size.height` has room, or when `size` is wider than the grid.
pub fn find_empty_position(
    occupied: &[GridRect],
    size: Size,
    columns: u16,
    row_limit: u16,
) -> Result<GridRect> {
    let exhausted = GridError::Exhausted { size };
    if size.width == 0 || size.height == 0 || size.width > columns || size.height > row_limit {
        return Err(exhausted);
    }
    let max_x = columns - size.width;
    let max_y = row_limit - size.height;

    for y in 0..=max_y {
        for x in 0..=max_x {
            let candidate = GridRect::new(x, y, size.width, size.height);
            if !occupied.iter().any(|rect| rect.overlaps(&candidate)) {
                return Ok(candidate);
            }
        }
    }

    tracing::info!(
        target: "dashgrid.engine",
        width = size.width,
        height = size.height,
        row_limit,
        "no free space for widget"
    );
    Err(exhausted)
}

/// Adjust an explicit placement so it fits without moving anyone.
///
/// For each overlapping rectangle, in order, the request loses its width
/// when the obstacle starts to the right of the request's origin, else its
/// height when the obstacle starts below it. The result is then clamped to
/// `bounds`. Fails with [`GridError::Exhausted`] when that leaves it below
/// `min` or still overlapping.
pub fn fit_requested(
    rect: GridRect,
    occupied: &[GridRect],
    bounds: GridRect,
    min: Size,
) -> Result<GridRect> {
    let exhausted = GridError::Exhausted { size: rect.size() };
    let mut pos = rect;

    for other in occupied.iter().filter(|other| other.overlaps(&rect)) {
        if pos.right() > other.x && pos.x < other.x {
            pos.width = other.x - pos.x;
        } else if pos.bottom() > other.y && pos.y < other.y {
            pos.height = other.y - pos.y;
        }
    }

    pos.width = pos.width.min(bounds.right().saturating_sub(pos.x));
    pos.height = pos.height.min(bounds.bottom().saturating_sub(pos.y));

    if pos.width < min.width || pos.height < min.height {
        tracing::info!(
            target: "dashgrid.engine",
            x = rect.x,
            y = rect.y,
            width = pos.width,
            height = pos.height,
            "requested placement shrank below minimum"
        );
        return Err(exhausted);
    }

    let pos = pos.clamp_anchored(bounds, min);
    if !bounds.contains_rect(&pos) || occupied.iter().any(|other| other.overlaps(&pos)) {
        return Err(exhausted);
    }
    Ok(pos)
}

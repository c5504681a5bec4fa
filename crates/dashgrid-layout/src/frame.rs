//! Signed, axis-indexed rectangles used inside the repacking passes.
//!
//! Passes push, compact and mirror rectangles along one axis at a time.
//! Working in `i32` with `[x, y]` arrays keeps that code axis-generic and
//! lets intermediate values step outside the grid before validation rejects
//! them.

use crate::error::OverflowReason;
use crate::registry::WidgetId;
use dashgrid_core::{Axis, GridRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Frame {
    pub start: [i32; 2],
    pub size: [i32; 2],
}

impl Frame {
    pub fn from_rect(rect: GridRect) -> Self {
        Self {
            start: [i32::from(rect.x), i32::from(rect.y)],
            size: [i32::from(rect.width), i32::from(rect.height)],
        }
    }

    /// Convert back to grid cells, saturating into `u16`.
    ///
    /// Callers validate the frame first, so saturation never triggers on
    /// committed data.
    pub fn to_rect(self) -> GridRect {
        let cell = |v: i32| u16::try_from(v.max(0)).unwrap_or(u16::MAX);
        GridRect::new(
            cell(self.start[0]),
            cell(self.start[1]),
            cell(self.size[0]),
            cell(self.size[1]),
        )
    }

    #[inline]
    pub fn start(&self, axis: Axis) -> i32 {
        self.start[axis.index()]
    }

    #[inline]
    pub fn size(&self, axis: Axis) -> i32 {
        self.size[axis.index()]
    }

    #[inline]
    pub fn end(&self, axis: Axis) -> i32 {
        self.start(axis) + self.size(axis)
    }

    #[inline]
    pub fn set_start(&mut self, axis: Axis, value: i32) {
        self.start[axis.index()] = value;
    }

    #[inline]
    pub fn set_size(&mut self, axis: Axis, value: i32) {
        self.size[axis.index()] = value;
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.end(Axis::Y)
    }

    /// Interior overlap. Shared edges do not count.
    #[inline]
    pub fn overlaps(&self, other: &Frame) -> bool {
        Axis::ALL.iter().all(|&axis| {
            self.start(axis) < other.end(axis) && self.end(axis) > other.start(axis)
        })
    }

    /// Reflect along `axis` inside `[0, extent)`.
    #[inline]
    pub fn mirrored(mut self, axis: Axis, extent: i32) -> Self {
        let start = extent - self.end(axis);
        self.set_start(axis, start);
        self
    }

    pub fn is_inside(&self, columns: i32, rows: i32) -> bool {
        self.start[0] >= 0
            && self.start[1] >= 0
            && self.size[0] >= 1
            && self.size[1] >= 1
            && self.end(Axis::X) <= columns
            && self.end(Axis::Y) <= rows
    }
}

/// Check that every frame lies inside the grid and no two overlap.
pub(crate) fn validate(
    frames: &[(WidgetId, Frame)],
    columns: i32,
    rows: i32,
) -> Result<(), OverflowReason> {
    for (i, (_, frame)) in frames.iter().enumerate() {
        if !frame.is_inside(columns, rows) {
            if frame.bottom() > rows && frame.end(Axis::X) <= columns && frame.start[1] >= 0 {
                return Err(OverflowReason::RowLimit {
                    limit: u16::try_from(rows).unwrap_or(u16::MAX),
                });
            }
            return Err(OverflowReason::OutOfBounds);
        }
        if let Some((other, _)) = frames[i + 1..].iter().find(|(_, f)| f.overlaps(frame)) {
            return Err(OverflowReason::Collision(*other));
        }
    }
    Ok(())
}

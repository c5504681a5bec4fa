#![forbid(unsafe_code)]

//! Geometric primitives.

use serde::{Deserialize, Serialize};

/// One of the two grid axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Columns, growing to the right.
    X,
    /// Rows, growing downward.
    Y,
}

impl Axis {
    /// Both axes in canonical order.
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    /// The perpendicular axis.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    /// Stable array index (`X = 0`, `Y = 1`).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

/// A width/height pair in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    /// Create a new size.
    #[inline]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Size along one axis.
    #[inline]
    #[must_use]
    pub const fn along(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Size) -> Size {
        Size::new(self.width.max(other.width), self.height.max(other.height))
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }
}

/// A rectangle of grid cells.
///
/// Uses grid coordinates (0-indexed, origin at top-left). Right and bottom
/// edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct GridRect {
    /// Left edge (inclusive).
    pub x: u16,
    /// Top edge (inclusive).
    pub y: u16,
    /// Width in cells.
    pub width: u16,
    /// Height in cells.
    pub height: u16,
}

impl GridRect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from origin with given size.
    #[inline]
    pub const fn from_size(width: u16, height: u16) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    /// Area in cells.
    #[inline]
    pub const fn area(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    /// Check if the rectangle has zero area.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width and height.
    #[inline]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Leading edge along `axis`.
    #[inline]
    pub const fn start(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// Length along `axis`.
    #[inline]
    pub const fn extent(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }

    /// Trailing edge (exclusive) along `axis`.
    #[inline]
    pub const fn end(&self, axis: Axis) -> u16 {
        self.start(axis).saturating_add(self.extent(axis))
    }

    /// Copy with the top-left corner moved.
    #[inline]
    #[must_use]
    pub const fn with_origin(self, x: u16, y: u16) -> Self {
        Self::new(x, y, self.width, self.height)
    }

    /// Copy with a new size, keeping the top-left corner.
    #[inline]
    #[must_use]
    pub const fn with_size(self, size: Size) -> Self {
        Self::new(self.x, self.y, size.width, size.height)
    }

    /// Whether a cell lies inside the rectangle.
    #[inline]
    pub const fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether `other` lies fully inside this rectangle.
    #[inline]
    pub const fn contains_rect(&self, other: &GridRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Interior overlap test. Rectangles that only share an edge do not overlap.
    #[inline]
    pub const fn overlaps(&self, other: &GridRect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Compute the intersection with another rectangle, returning `None` if no overlap.
    #[inline]
    pub fn intersection_opt(&self, other: &GridRect) -> Option<GridRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(GridRect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &GridRect) -> GridRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        GridRect {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    /// Fit inside `bounds`, shifting first.
    ///
    /// Width and height are only reduced when the rectangle is larger than
    /// `bounds` itself, and never below `min`. If `min` does not fit in
    /// `bounds` the result is pinned to the bounds origin and still carries
    /// `min`, so callers must check containment.
    #[must_use]
    pub fn clamp(&self, bounds: GridRect, min: Size) -> GridRect {
        let (x, width) = clamp_shift(self.x, self.width, bounds.x, bounds.width, min.width);
        let (y, height) = clamp_shift(self.y, self.height, bounds.y, bounds.height, min.height);
        GridRect::new(x, y, width, height)
    }

    /// Fit inside `bounds`, keeping the top-left corner.
    ///
    /// Width and height shrink to the room left after the anchor; the corner
    /// only moves when `min` would not fit there.
    #[must_use]
    pub fn clamp_anchored(&self, bounds: GridRect, min: Size) -> GridRect {
        let (x, width) = clamp_anchor(self.x, self.width, bounds.x, bounds.width, min.width);
        let (y, height) = clamp_anchor(self.y, self.height, bounds.y, bounds.height, min.height);
        GridRect::new(x, y, width, height)
    }
}

fn clamp_shift(start: u16, len: u16, lo: u16, room: u16, min: u16) -> (u16, u16) {
    let len = len.min(room).max(min);
    let hi = lo.saturating_add(room);
    let start = start.max(lo);
    if start.saturating_add(len) > hi {
        (hi.saturating_sub(len).max(lo), len)
    } else {
        (start, len)
    }
}

fn clamp_anchor(start: u16, len: u16, lo: u16, room: u16, min: u16) -> (u16, u16) {
    let hi = lo.saturating_add(room);
    let start = start.clamp(lo, hi);
    let len = len.min(hi - start).max(min);
    if start.saturating_add(len) > hi {
        (hi.saturating_sub(len).max(lo), len)
    } else {
        (start, len)
    }
}

#[cfg(test)]
mod tests {
    use super::{Axis, GridRect, Size};
    use proptest::prelude::*;

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = GridRect::new(0, 0, 2, 2);
        assert!(!a.overlaps(&GridRect::new(2, 0, 2, 2)));
        assert!(!a.overlaps(&GridRect::new(0, 2, 2, 2)));
        assert!(a.overlaps(&GridRect::new(1, 1, 2, 2)));
    }

    #[test]
    fn overlap_requires_both_axes() {
        let a = GridRect::new(0, 0, 4, 1);
        let b = GridRect::new(1, 1, 1, 3);
        assert!(!a.overlaps(&b));
        assert!(a.union(&b).overlaps(&b));
    }

    #[test]
    fn intersection_matches_overlap() {
        let a = GridRect::new(0, 0, 4, 4);
        let b = GridRect::new(2, 2, 4, 4);
        assert_eq!(a.intersection_opt(&b), Some(GridRect::new(2, 2, 2, 2)));
        assert_eq!(a.intersection_opt(&GridRect::new(4, 0, 1, 1)), None);
    }

    #[test]
    fn axis_accessors() {
        let r = GridRect::new(1, 2, 3, 4);
        assert_eq!(r.start(Axis::X), 1);
        assert_eq!(r.end(Axis::X), 4);
        assert_eq!(r.start(Axis::Y), 2);
        assert_eq!(r.end(Axis::Y), 6);
        assert_eq!(Axis::X.other(), Axis::Y);
        assert_eq!(r.size().along(Axis::Y), 4);
    }

    #[test]
    fn clamp_shifts_before_shrinking() {
        let bounds = GridRect::from_size(12, 64);
        let clamped = GridRect::new(10, 0, 4, 2).clamp(bounds, Size::new(1, 2));
        assert_eq!(clamped, GridRect::new(8, 0, 4, 2));
    }

    #[test]
    fn clamp_shrinks_only_when_larger_than_bounds() {
        let bounds = GridRect::from_size(4, 8);
        let clamped = GridRect::new(3, 1, 9, 2).clamp(bounds, Size::new(1, 2));
        assert_eq!(clamped, GridRect::new(0, 1, 4, 2));
    }

    #[test]
    fn clamp_honours_minimum() {
        let bounds = GridRect::from_size(4, 8);
        let clamped = GridRect::new(0, 7, 1, 1).clamp(bounds, Size::new(1, 2));
        assert_eq!(clamped, GridRect::new(0, 6, 1, 2));
    }

    #[test]
    fn clamp_anchored_keeps_corner() {
        let bounds = GridRect::from_size(12, 64);
        let clamped = GridRect::new(10, 60, 4, 6).clamp_anchored(bounds, Size::new(1, 2));
        assert_eq!(clamped, GridRect::new(10, 60, 2, 4));
    }

    #[test]
    fn clamp_anchored_moves_corner_for_minimum() {
        let bounds = GridRect::from_size(12, 64);
        let clamped = GridRect::new(11, 63, 1, 1).clamp_anchored(bounds, Size::new(1, 2));
        assert_eq!(clamped, GridRect::new(11, 62, 1, 2));
    }

    #[test]
    fn serializes_as_plain_object() {
        let json = serde_json::to_string(&GridRect::new(1, 2, 3, 4)).expect("serialize");
        assert_eq!(json, r#"{"x":1,"y":2,"width":3,"height":4}"#);
    }

    proptest! {
        #[test]
        fn clamp_result_fits_bounds(
            x in 0u16..40, y in 0u16..80, w in 1u16..40, h in 1u16..80,
            cols in 2u16..24, rows in 2u16..64,
        ) {
            let bounds = GridRect::from_size(cols, rows);
            let min = Size::new(1, 2);
            for clamped in [
                GridRect::new(x, y, w, h).clamp(bounds, min),
                GridRect::new(x, y, w, h).clamp_anchored(bounds, min),
            ] {
                prop_assert!(bounds.contains_rect(&clamped));
                prop_assert!(clamped.width >= 1);
                prop_assert!(clamped.height >= 2);
            }
        }

        #[test]
        fn overlap_is_symmetric(
            ax in 0u16..10, ay in 0u16..10, aw in 1u16..6, ah in 1u16..6,
            bx in 0u16..10, by in 0u16..10, bw in 1u16..6, bh in 1u16..6,
        ) {
            let a = GridRect::new(ax, ay, aw, ah);
            let b = GridRect::new(bx, by, bw, bh);
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
            prop_assert_eq!(a.overlaps(&b), a.intersection_opt(&b).is_some());
        }
    }
}

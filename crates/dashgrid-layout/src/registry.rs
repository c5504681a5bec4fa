//! Widget table owned by one engine instance.
//!
//! Widgets are stored by [`WidgetId`]. Ids are allocated monotonically and
//! never reused, so id order is insertion order. [`WidgetRegistry::ordered`]
//! yields the layout order every repacking pass depends on: ascending
//! committed `y`, ties broken by id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GridConfig;
use crate::error::{GridError, OverflowReason, Result};
use crate::grid::required_rows;
use dashgrid_core::{GridRect, Size};

/// Errors constructing a [`WidgetId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WidgetIdError {
    #[error("widget id 0 is reserved")]
    Zero,
    #[error("widget id space exhausted after {}", .current.get())]
    Overflow { current: WidgetId },
}

/// Stable identifier for widgets.
///
/// `0` is reserved/invalid so IDs are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(u64);

impl WidgetId {
    /// Lowest valid widget ID.
    pub const MIN: Self = Self(1);

    /// Create a new widget ID, rejecting 0.
    pub fn new(raw: u64) -> std::result::Result<Self, WidgetIdError> {
        if raw == 0 {
            return Err(WidgetIdError::Zero);
        }
        Ok(Self(raw))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the next ID, or an error on overflow.
    pub fn checked_next(self) -> std::result::Result<Self, WidgetIdError> {
        let Some(next) = self.0.checked_add(1) else {
            return Err(WidgetIdError::Overflow { current: self });
        };
        Self::new(next)
    }
}

impl Default for WidgetId {
    fn default() -> Self {
        Self::MIN
    }
}

impl std::fmt::Display for WidgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One placed widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: WidgetId,
    /// Widget type key. Selects the default size.
    pub kind: String,
    /// Committed rectangle.
    pub pos: GridRect,
    /// In-progress rectangle. Present only while a gesture is active.
    #[serde(skip)]
    pub current_pos: Option<GridRect>,
    pub min_size: Size,
    pub max_size: Size,
    /// Opaque handle for the external content provider.
    pub content_key: Option<String>,
    /// Widget configuration fields.
    pub fields: BTreeMap<String, String>,
}

impl Widget {
    /// The rectangle currently shown: `current_pos` during a gesture, else `pos`.
    #[must_use]
    pub fn live_rect(&self) -> GridRect {
        self.current_pos.unwrap_or(self.pos)
    }

    /// Whether the in-progress rectangle differs from the committed one.
    #[must_use]
    pub fn is_displaced(&self) -> bool {
        self.current_pos.is_some_and(|current| current != self.pos)
    }
}

/// Description of a widget to add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewWidget {
    pub kind: String,
    /// Explicit placement. `None` asks the placement solver for a slot.
    pub pos: Option<GridRect>,
    pub min_size: Option<Size>,
    pub max_size: Option<Size>,
    pub content_key: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl NewWidget {
    /// Widget of `kind` placed by the solver at its default size.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Request an explicit rectangle.
    #[must_use]
    pub fn at(mut self, pos: GridRect) -> Self {
        self.pos = Some(pos);
        self
    }

    #[must_use]
    pub fn min_size(mut self, size: Size) -> Self {
        self.min_size = Some(size);
        self
    }

    #[must_use]
    pub fn max_size(mut self, size: Size) -> Self {
        self.max_size = Some(size);
        self
    }

    #[must_use]
    pub fn content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.fields.insert(key.into(), value.into());
        self
    }
}

/// The widget table.
#[derive(Debug, Clone)]
pub struct WidgetRegistry {
    widgets: BTreeMap<WidgetId, Widget>,
    next_id: WidgetId,
    bounds: GridRect,
    min_size: Size,
    max_size: Size,
}

impl WidgetRegistry {
    /// Empty table for a grid described by `config`.
    #[must_use]
    pub fn new(config: &GridConfig) -> Self {
        Self {
            widgets: BTreeMap::new(),
            next_id: WidgetId::MIN,
            bounds: config.bounds(),
            min_size: config.min_widget_size(),
            max_size: config.max_widget_size(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Bounding rectangle of every legal placement.
    #[must_use]
    pub fn bounds(&self) -> GridRect {
        self.bounds
    }

    /// Size bounds given to widgets that do not ask for their own.
    #[must_use]
    pub fn default_size_limits(&self) -> (Size, Size) {
        (self.min_size, self.max_size)
    }

    #[must_use]
    pub fn get(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        self.widgets.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: WidgetId) -> bool {
        self.widgets.contains_key(&id)
    }

    /// Widgets in id (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &Widget> + '_ {
        self.widgets.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Widget> + '_ {
        self.widgets.values_mut()
    }

    /// Widgets in layout order: committed `y` ascending, ties by id.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Widget> {
        let mut widgets: Vec<&Widget> = self.widgets.values().collect();
        widgets.sort_by_key(|w| (w.pos.y, w.id));
        widgets
    }

    /// Ids in layout order.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<WidgetId> {
        self.ordered().into_iter().map(|w| w.id).collect()
    }

    /// First committed widget overlapping `rect`, in layout order.
    #[must_use]
    pub fn collision(&self, rect: &GridRect, exclude: Option<WidgetId>) -> Option<WidgetId> {
        self.ordered()
            .into_iter()
            .find(|w| Some(w.id) != exclude && w.pos.overlaps(rect))
            .map(|w| w.id)
    }

    /// Rows needed to show every committed widget.
    #[must_use]
    pub fn required_rows(&self) -> u16 {
        required_rows(self.widgets.values().map(|w| &w.pos))
    }

    /// Check that `pos` may be committed for a widget.
    pub(crate) fn check_placement(
        &self,
        widget: Option<WidgetId>,
        pos: &GridRect,
        exclude: Option<WidgetId>,
    ) -> Result<()> {
        if pos.width == 0 || pos.height < self.min_size.height || !self.bounds.contains_rect(pos) {
            return Err(GridError::overflow(widget, OverflowReason::OutOfBounds));
        }
        if let Some(other) = self.collision(pos, exclude) {
            return Err(GridError::overflow(widget, OverflowReason::Collision(other)));
        }
        Ok(())
    }

    /// Insert a widget at `pos`.
    ///
    /// Fails with [`GridError::Overflow`] when `pos` leaves the grid or
    /// overlaps a committed widget.
    pub fn insert(&mut self, spec: NewWidget, pos: GridRect) -> Result<WidgetId> {
        self.check_placement(None, &pos, None)?;
        let id = self.next_id;
        // Exhausting u64 ids is unreachable in practice; report it as overflow.
        let next = id
            .checked_next()
            .map_err(|_| GridError::overflow(None, OverflowReason::OutOfBounds))?;
        let widget = self.build(id, spec, pos);
        let _ = self.widgets.insert(id, widget);
        self.next_id = next;
        Ok(id)
    }

    /// Insert a widget keeping a caller-provided id.
    ///
    /// Used when restoring a snapshot. The caller validates placement.
    pub(crate) fn insert_with_id(&mut self, id: WidgetId, spec: NewWidget, pos: GridRect) {
        let widget = self.build(id, spec, pos);
        let _ = self.widgets.insert(id, widget);
        if id >= self.next_id {
            self.next_id = id.checked_next().unwrap_or(id);
        }
    }

    fn build(&self, id: WidgetId, spec: NewWidget, pos: GridRect) -> Widget {
        let min_size = spec.min_size.unwrap_or(self.min_size).max(self.min_size);
        let max_size = spec.max_size.unwrap_or(self.max_size).min(self.max_size).max(min_size);
        Widget {
            id,
            kind: spec.kind,
            pos,
            current_pos: None,
            min_size,
            max_size,
            content_key: spec.content_key,
            fields: spec.fields,
        }
    }

    /// Remove a widget by id.
    pub fn remove(&mut self, id: WidgetId) -> Result<Widget> {
        self.widgets.remove(&id).ok_or(GridError::unknown(id))
    }

    /// Replace the table with `base`'s widgets. The id allocator only moves
    /// forward, so ids handed out since `base` was taken stay retired.
    pub(crate) fn restore_widgets(&mut self, base: &WidgetRegistry) {
        self.widgets = base.widgets.clone();
        self.next_id = self.next_id.max(base.next_id);
    }

    /// Committed rectangles keyed by id.
    #[must_use]
    pub fn positions(&self) -> BTreeMap<WidgetId, GridRect> {
        self.widgets.iter().map(|(id, w)| (*id, w.pos)).collect()
    }

    /// Deterministic structural hash of the committed table.
    ///
    /// Transient `current_pos` values are excluded, so an in-progress gesture
    /// does not change the hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0001_0000_01b3;

        fn mix(hash: &mut u64, byte: u8) {
            *hash ^= u64::from(byte);
            *hash = hash.wrapping_mul(PRIME);
        }

        fn mix_bytes(hash: &mut u64, bytes: &[u8]) {
            for byte in bytes {
                mix(hash, *byte);
            }
        }

        fn mix_u16(hash: &mut u64, value: u16) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_u64(hash: &mut u64, value: u64) {
            mix_bytes(hash, &value.to_le_bytes());
        }

        fn mix_str(hash: &mut u64, value: &str) {
            mix_u64(hash, value.len() as u64);
            mix_bytes(hash, value.as_bytes());
        }

        fn mix_rect(hash: &mut u64, rect: &GridRect) {
            mix_u16(hash, rect.x);
            mix_u16(hash, rect.y);
            mix_u16(hash, rect.width);
            mix_u16(hash, rect.height);
        }

        let mut hash = OFFSET_BASIS;
        mix_u64(&mut hash, self.widgets.len() as u64);
        for widget in self.widgets.values() {
            mix_u64(&mut hash, widget.id.get());
            mix_str(&mut hash, &widget.kind);
            mix_rect(&mut hash, &widget.pos);
            match &widget.content_key {
                Some(key) => {
                    mix(&mut hash, 1);
                    mix_str(&mut hash, key);
                }
                None => mix(&mut hash, 0),
            }
            mix_u64(&mut hash, widget.fields.len() as u64);
            for (key, value) in &widget.fields {
                mix_str(&mut hash, key);
                mix_str(&mut hash, value);
            }
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> WidgetId {
        WidgetId::new(raw).expect("test ID must be non-zero")
    }

    fn registry() -> WidgetRegistry {
        WidgetRegistry::new(&GridConfig::with_columns(4).rows_cap(Some(8)))
    }

    #[test]
    fn widget_id_rejects_zero() {
        assert_eq!(WidgetId::new(0), Err(WidgetIdError::Zero));
        assert_eq!(WidgetId::MIN.checked_next().map(WidgetId::get), Ok(2));
        let max = id(u64::MAX);
        assert_eq!(
            max.checked_next(),
            Err(WidgetIdError::Overflow { current: max })
        );
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut reg = registry();
        let a = reg
            .insert(NewWidget::new("clock"), GridRect::new(0, 0, 2, 2))
            .expect("insert a");
        let b = reg
            .insert(NewWidget::new("clock"), GridRect::new(2, 0, 2, 2))
            .expect("insert b");
        assert!(a < b);
        let _ = reg.remove(b).expect("remove b");
        let c = reg
            .insert(NewWidget::new("clock"), GridRect::new(2, 0, 2, 2))
            .expect("insert c");
        assert!(c > b);
    }

    #[test]
    fn insert_rejects_out_of_bounds_and_collision() {
        let mut reg = registry();
        let a = reg
            .insert(NewWidget::new("graph"), GridRect::new(0, 0, 2, 2))
            .expect("insert");
        assert_eq!(
            reg.insert(NewWidget::new("graph"), GridRect::new(3, 0, 2, 2)),
            Err(GridError::overflow(None, OverflowReason::OutOfBounds))
        );
        assert_eq!(
            reg.insert(NewWidget::new("graph"), GridRect::new(0, 7, 2, 2)),
            Err(GridError::overflow(None, OverflowReason::OutOfBounds))
        );
        assert_eq!(
            reg.insert(NewWidget::new("graph"), GridRect::new(1, 1, 2, 2)),
            Err(GridError::overflow(None, OverflowReason::Collision(a)))
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_unknown_is_invalid_state() {
        let mut reg = registry();
        assert_eq!(reg.remove(id(7)), Err(GridError::unknown(id(7))));
    }

    #[test]
    fn ordered_sorts_by_row_then_id() {
        let mut reg = registry();
        let low = reg
            .insert(NewWidget::new("a"), GridRect::new(0, 4, 2, 2))
            .expect("low");
        let right = reg
            .insert(NewWidget::new("b"), GridRect::new(2, 0, 2, 2))
            .expect("right");
        let left = reg
            .insert(NewWidget::new("c"), GridRect::new(0, 0, 2, 2))
            .expect("left");
        assert_eq!(reg.ordered_ids(), vec![right, left, low]);
        assert_eq!(reg.required_rows(), 6);
    }

    #[test]
    fn sizes_default_from_config() {
        let mut reg = registry();
        let id = reg
            .insert(
                NewWidget::new("map").max_size(Size::new(10, 3)),
                GridRect::new(0, 0, 2, 2),
            )
            .expect("insert");
        let widget = reg.get(id).expect("present");
        assert_eq!(widget.min_size, Size::new(1, 2));
        assert_eq!(widget.max_size, Size::new(4, 3));
    }

    #[test]
    fn state_hash_tracks_committed_state_only() {
        let mut reg = registry();
        let base = reg.state_hash();
        let id = reg
            .insert(NewWidget::new("a").field("k", "v"), GridRect::new(0, 0, 2, 2))
            .expect("insert");
        let with_widget = reg.state_hash();
        assert_ne!(base, with_widget);

        reg.get_mut(id).expect("present").current_pos = Some(GridRect::new(2, 0, 2, 2));
        assert_eq!(reg.state_hash(), with_widget);

        reg.get_mut(id)
            .expect("present")
            .fields
            .insert("k".into(), "w".into());
        assert_ne!(reg.state_hash(), with_widget);
    }

    #[test]
    fn restore_ids_advance_allocator() {
        let mut reg = registry();
        reg.insert_with_id(id(10), NewWidget::new("a"), GridRect::new(0, 0, 2, 2));
        let next = reg
            .insert(NewWidget::new("b"), GridRect::new(2, 0, 2, 2))
            .expect("insert");
        assert_eq!(next, id(11));
    }
}

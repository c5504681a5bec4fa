//! The layout mutation API.
//!
//! [`LayoutEngine`] owns the widget table of one dashboard. External code
//! reads widgets and snapshots; every write goes through the methods here.
//!
//! # Gestures
//!
//! A drag or resize is driven as `begin_*`, any number of steps, then
//! [`LayoutEngine::end_gesture`] or [`LayoutEngine::cancel_gesture`]. While a
//! gesture is active every widget carries a `current_pos`; committed `pos`
//! values only change at the end. Steps that would overflow the grid are
//! rejected and the previous accepted state stays on screen.
//!
//! Only one gesture runs at a time. Starting a second one, or calling a
//! one-shot mutation while a gesture is active, fails with
//! [`InvalidStateKind::GestureInProgress`]; nothing is queued.
//!
//! # Edit mode
//!
//! Mutations require edit mode. Entering it records the committed layout so
//! [`LayoutEngine::discard_edit`] can roll the whole session back.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GridConfig};
use crate::drag::DragSession;
use crate::error::{GestureKind, GridError, InvalidStateKind, OverflowReason, Result};
use crate::grid::{CellMetrics, Grid};
use crate::placement::{find_empty_position, fit_requested};
use crate::registry::{NewWidget, Widget, WidgetId, WidgetRegistry};
use crate::resize::{ResizeEntry, ResizeHandle, ResizeSession};
use crate::snapshot::{LayoutSnapshot, SnapshotError};
use dashgrid_core::{Axis, GridRect, Size};

/// Receives layout notifications at commit time.
///
/// Both methods default to no-ops.
pub trait LayoutObserver {
    /// Committed rectangles changed.
    fn on_layout_changed(&mut self, _changes: &[WidgetChange]) {}

    /// A widget's box changed at the end of a resize gesture.
    fn on_resize_end(&mut self, _widget: &Widget) {}
}

/// Committed rectangle of one widget before and after a mutation.
///
/// `before` is `None` for added widgets, `after` is `None` for removed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetChange {
    pub id: WidgetId,
    pub before: Option<GridRect>,
    pub after: Option<GridRect>,
}

/// Result of one gesture step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureStep {
    /// The request matches the last accepted state.
    Unchanged,
    /// The layout follows the request. `rows` is the grid height now shown.
    Accepted { rows: u16 },
    /// The request would overflow; the previous state is kept.
    Rejected { reason: OverflowReason },
}

/// What a finished gesture committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureOutcome {
    pub kind: GestureKind,
    pub changes: Vec<WidgetChange>,
    /// Widgets notified through [`LayoutObserver::on_resize_end`].
    pub resized: Vec<WidgetId>,
    /// Grid height after the commit.
    pub rows: u16,
}

impl GestureOutcome {
    /// Whether the gesture committed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A copied widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetTemplate {
    pub kind: String,
    pub size: Size,
    pub min_size: Size,
    pub max_size: Size,
    pub fields: BTreeMap<String, String>,
}

/// Where [`LayoutEngine::paste_widget`] puts the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteTarget {
    /// First free slot of the template's size.
    Anywhere,
    /// A requested rectangle. A 2x2 request stands for a click and takes the
    /// template's size.
    At(GridRect),
    /// Take over an existing widget's rectangle.
    Replace(WidgetId),
}

#[derive(Debug)]
enum Gesture {
    Drag(DragSession),
    Resize(ResizeSession),
}

impl Gesture {
    fn kind(&self) -> GestureKind {
        match self {
            Self::Drag(_) => GestureKind::Drag,
            Self::Resize(_) => GestureKind::Resize,
        }
    }
}

#[derive(Debug, Clone)]
struct EditBase {
    registry: WidgetRegistry,
    grid: Grid,
}

/// Layout engine for one dashboard.
pub struct LayoutEngine {
    config: GridConfig,
    grid: Grid,
    registry: WidgetRegistry,
    edit_base: Option<EditBase>,
    gesture: Option<Gesture>,
    observers: Vec<Box<dyn LayoutObserver>>,
    persisted_hash: u64,
    queried_hash: u64,
}

impl std::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("grid", &self.grid)
            .field("widgets", &self.registry.len())
            .field("editing", &self.edit_base.is_some())
            .field("gesture", &self.gesture.as_ref().map(Gesture::kind))
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl LayoutEngine {
    /// Empty engine. Fails when `config` does not validate.
    pub fn new(config: GridConfig) -> std::result::Result<Self, ConfigError> {
        let config = config.validated()?;
        let registry = WidgetRegistry::new(&config);
        let hash = registry.state_hash();
        tracing::debug!(
            target: "dashgrid.engine",
            columns = config.max_columns,
            row_cap = ?config.max_rows_cap,
            "layout engine created"
        );
        Ok(Self {
            grid: Grid::new(&config),
            registry,
            config,
            edit_base: None,
            gesture: None,
            observers: Vec::new(),
            persisted_hash: hash,
            queried_hash: hash,
        })
    }

    /// Rebuild an engine from a persisted snapshot.
    ///
    /// The restored layout counts as persisted, so the engine starts clean.
    pub fn restore(
        config: GridConfig,
        snapshot: &LayoutSnapshot,
    ) -> std::result::Result<Self, SnapshotError> {
        let mut engine = Self::new(config)?;
        snapshot.validate(&engine.config)?;
        for record in &snapshot.widgets {
            let spec = NewWidget {
                kind: record.kind.clone(),
                pos: Some(record.pos),
                min_size: record.min_size,
                max_size: record.max_size,
                content_key: record.content_key.clone(),
                fields: record.fields.clone(),
            };
            engine.registry.insert_with_id(record.id, spec, record.pos);
        }
        let _ = engine.grid.resize(engine.registry.required_rows());
        let hash = engine.registry.state_hash();
        engine.persisted_hash = hash;
        engine.queried_hash = hash;
        tracing::debug!(
            target: "dashgrid.engine",
            widgets = engine.registry.len(),
            rows = engine.grid.rows(),
            "layout restored"
        );
        Ok(engine)
    }

    /// Register an observer. Observers are called in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn LayoutObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Current grid height in rows.
    #[must_use]
    pub fn rows(&self) -> u16 {
        self.grid.rows()
    }

    #[must_use]
    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.registry.get(id)
    }

    /// Widgets in layout order.
    #[must_use]
    pub fn widgets(&self) -> Vec<&Widget> {
        self.registry.ordered()
    }

    #[must_use]
    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    /// Pixel mapping for a container `container_width` pixels wide.
    #[must_use]
    pub fn cell_metrics(&self, container_width: f64) -> CellMetrics {
        CellMetrics::new(container_width, &self.config)
    }

    /// Committed layout, in layout order.
    #[must_use]
    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot::from_registry(&self.registry, self.config.max_columns)
    }

    // ---------------------------------------------------------------------
    // Dirty tracking
    // ---------------------------------------------------------------------

    /// Whether the committed layout differs from the last persisted one.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.registry.state_hash() != self.persisted_hash
    }

    /// Whether the committed layout changed since the previous call.
    pub fn take_dirty(&mut self) -> bool {
        let hash = self.registry.state_hash();
        let changed = hash != self.queried_hash;
        self.queried_hash = hash;
        changed
    }

    /// Acknowledge that the current layout has been persisted.
    pub fn mark_persisted(&mut self) {
        self.persisted_hash = self.registry.state_hash();
    }

    // ---------------------------------------------------------------------
    // Edit session
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.edit_base.is_some()
    }

    /// Active gesture, if any.
    #[must_use]
    pub fn gesture(&self) -> Option<GestureKind> {
        self.gesture.as_ref().map(Gesture::kind)
    }

    /// The dragged or resized widget and its rectangle in the last accepted
    /// step.
    #[must_use]
    pub fn gesture_widget(&self) -> Option<(WidgetId, GridRect)> {
        match self.gesture.as_ref()? {
            Gesture::Drag(session) => Some((session.mover(), session.mover_rect())),
            Gesture::Resize(session) => Some((session.target(), session.target_rect())),
        }
    }

    /// Handle grabbed by the active resize.
    #[must_use]
    pub fn resize_handle(&self) -> Option<ResizeHandle> {
        match self.gesture.as_ref()? {
            Gesture::Resize(session) => session.handle(),
            Gesture::Drag(_) => None,
        }
    }

    /// Cells the resized widget gave up along `axis` in the last accepted
    /// step because its neighbours could not make room.
    #[must_use]
    pub fn resize_correction(&self, axis: Axis) -> Option<u16> {
        match self.gesture.as_ref()? {
            Gesture::Resize(session) => Some(session.correction(axis)),
            Gesture::Drag(_) => None,
        }
    }

    /// Enter edit mode, recording the committed layout as the session base.
    ///
    /// Entering again while editing keeps the original base.
    pub fn enter_edit_mode(&mut self) -> Result<()> {
        if !self.config.editable {
            return Err(GridError::InvalidState(InvalidStateKind::ReadOnly));
        }
        if self.edit_base.is_none() {
            self.edit_base = Some(EditBase {
                registry: self.registry.clone(),
                grid: self.grid,
            });
            tracing::debug!(
                target: "dashgrid.engine",
                widgets = self.registry.len(),
                "edit mode entered"
            );
        }
        Ok(())
    }

    /// Leave edit mode keeping every change.
    pub fn exit_edit_mode(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if self.edit_base.take().is_none() {
            return Err(GridError::InvalidState(InvalidStateKind::NotEditing));
        }
        tracing::debug!(
            target: "dashgrid.engine",
            widgets = self.registry.len(),
            "edit mode left"
        );
        Ok(())
    }

    /// Leave edit mode restoring the layout recorded on entry.
    pub fn discard_edit(&mut self) -> Result<Vec<WidgetChange>> {
        self.ensure_idle()?;
        let Some(base) = self.edit_base.take() else {
            return Err(GridError::InvalidState(InvalidStateKind::NotEditing));
        };
        let before = self.registry.positions();
        self.registry.restore_widgets(&base.registry);
        self.grid = base.grid;
        let _ = self.grid.resize(self.registry.required_rows());
        let changes = diff(&before, &self.registry.positions());
        tracing::debug!(
            target: "dashgrid.engine",
            changes = changes.len(),
            "edit discarded"
        );
        self.notify_layout(&changes);
        Ok(changes)
    }

    // ---------------------------------------------------------------------
    // One-shot mutations
    // ---------------------------------------------------------------------

    /// Add a widget.
    ///
    /// An explicit `pos` is shrunk against existing widgets and clamped to
    /// the grid; existing widgets never move. Without one, the kind's
    /// default size goes to the first free slot.
    pub fn add_widget(&mut self, spec: NewWidget) -> Result<&Widget> {
        self.ensure_mutable()?;
        let min = spec
            .min_size
            .unwrap_or(self.config.min_widget_size())
            .max(self.config.min_widget_size());
        let max = spec
            .max_size
            .unwrap_or(self.config.max_widget_size())
            .min(self.config.max_widget_size())
            .max(min);
        let occupied: Vec<GridRect> = self.registry.ordered().iter().map(|w| w.pos).collect();

        let pos = match spec.pos {
            Some(rect) => {
                let rect = rect.with_size(rect.size().min(max));
                fit_requested(rect, &occupied, self.config.bounds(), min)?
            }
            None => {
                let size = self.config.default_size(&spec.kind).min(max).max(min);
                find_empty_position(
                    &occupied,
                    size,
                    self.config.max_columns,
                    self.config.row_limit(),
                )?
            }
        };

        let kind = spec.kind.clone();
        let id = self.registry.insert(spec, pos)?;
        let _ = self.grid.resize(self.registry.required_rows());
        tracing::debug!(
            target: "dashgrid.engine",
            widget = id.get(),
            kind = %kind,
            x = pos.x,
            y = pos.y,
            width = pos.width,
            height = pos.height,
            "widget added"
        );
        self.notify_layout(&[WidgetChange {
            id,
            before: None,
            after: Some(pos),
        }]);
        self.registry.get(id).ok_or(GridError::unknown(id))
    }

    /// Remove a widget. Rows are recomputed and may shrink.
    pub fn remove_widget(&mut self, id: WidgetId) -> Result<Widget> {
        self.ensure_mutable()?;
        let widget = self.registry.remove(id)?;
        let _ = self.grid.resize(self.registry.required_rows());
        tracing::debug!(
            target: "dashgrid.engine",
            widget = id.get(),
            rows = self.grid.rows(),
            "widget removed"
        );
        self.notify_layout(&[WidgetChange {
            id,
            before: Some(widget.pos),
            after: None,
        }]);
        Ok(widget)
    }

    /// Move a widget's top-left corner: a drag start, one move and stop.
    ///
    /// A rejected move fails with [`GridError::Overflow`] and leaves the
    /// layout untouched.
    pub fn move_widget(&mut self, id: WidgetId, x: u16, y: u16) -> Result<GestureOutcome> {
        self.ensure_mutable()?;
        let pos = self.committed(id)?;
        if (pos.x, pos.y) == (x, y) {
            return Ok(self.noop_outcome(GestureKind::Drag));
        }
        self.begin_drag(id)?;
        match self.drag_to(x, y)? {
            GestureStep::Rejected { reason } => {
                self.cancel_gesture()?;
                Err(GridError::overflow(Some(id), reason))
            }
            GestureStep::Unchanged | GestureStep::Accepted { .. } => self.end_gesture(),
        }
    }

    /// Resize a widget keeping its top-left corner: a resize start, one step
    /// and stop.
    pub fn resize_widget(
        &mut self,
        id: WidgetId,
        width: u16,
        height: u16,
    ) -> Result<GestureOutcome> {
        self.ensure_mutable()?;
        let pos = self.committed(id)?;
        if pos.size() == Size::new(width, height) {
            return Ok(self.noop_outcome(GestureKind::Resize));
        }
        self.begin_resize(id, ResizeHandle::BottomRight)?;
        match self.resize_to(GridRect::new(pos.x, pos.y, width, height))? {
            GestureStep::Rejected { reason } => {
                self.cancel_gesture()?;
                Err(GridError::overflow(Some(id), reason))
            }
            GestureStep::Unchanged | GestureStep::Accepted { .. } => self.end_gesture(),
        }
    }

    // ---------------------------------------------------------------------
    // Copy / paste / reconfigure
    // ---------------------------------------------------------------------

    /// Capture a widget's kind, size and fields.
    pub fn copy_widget(&self, id: WidgetId) -> Result<WidgetTemplate> {
        let widget = self.registry.get(id).ok_or(GridError::unknown(id))?;
        Ok(WidgetTemplate {
            kind: widget.kind.clone(),
            size: widget.pos.size(),
            min_size: widget.min_size,
            max_size: widget.max_size,
            fields: widget.fields.clone(),
        })
    }

    /// Paste a copied widget.
    pub fn paste_widget(&mut self, template: &WidgetTemplate, target: PasteTarget) -> Result<&Widget> {
        self.ensure_mutable()?;
        let spec = NewWidget {
            kind: template.kind.clone(),
            pos: None,
            min_size: Some(template.min_size),
            max_size: Some(template.max_size),
            content_key: None,
            fields: template.fields.clone(),
        };
        let occupied: Vec<GridRect> = self.registry.ordered().iter().map(|w| w.pos).collect();
        let min = template.min_size.max(self.config.min_widget_size());

        match target {
            PasteTarget::Anywhere => {
                let pos = find_empty_position(
                    &occupied,
                    template.size,
                    self.config.max_columns,
                    self.config.row_limit(),
                )?;
                self.add_widget(NewWidget {
                    pos: Some(pos),
                    ..spec
                })
            }
            PasteTarget::At(rect) => {
                let rect = if rect.size() == Size::new(2, 2) {
                    rect.with_size(template.size)
                } else {
                    rect
                };
                let pos = fit_requested(rect, &occupied, self.config.bounds(), min)?;
                self.add_widget(NewWidget {
                    pos: Some(pos),
                    ..spec
                })
            }
            PasteTarget::Replace(id) => {
                let old = self.committed(id)?;
                self.replace_widget(id, spec, old)
            }
        }
    }

    /// Update a widget's configuration.
    ///
    /// The same kind updates fields in place. A different kind replaces the
    /// widget with a new id at the same rectangle.
    pub fn reconfigure_widget(
        &mut self,
        id: WidgetId,
        kind: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) -> Result<&Widget> {
        self.ensure_mutable()?;
        let kind = kind.into();
        let widget = self.registry.get(id).ok_or(GridError::unknown(id))?;
        if widget.kind == kind {
            let widget = self.registry.get_mut(id).ok_or(GridError::unknown(id))?;
            widget.fields = fields;
            tracing::debug!(
                target: "dashgrid.engine",
                widget = id.get(),
                "widget fields updated"
            );
            return self.registry.get(id).ok_or(GridError::unknown(id));
        }
        let pos = widget.pos;
        let spec = NewWidget {
            kind,
            pos: None,
            min_size: None,
            max_size: None,
            content_key: widget.content_key.clone(),
            fields,
        };
        self.replace_widget(id, spec, pos)
    }

    fn replace_widget(&mut self, old: WidgetId, spec: NewWidget, pos: GridRect) -> Result<&Widget> {
        let removed = self.registry.remove(old)?;
        let new_id = match self.registry.insert(spec, pos) {
            Ok(new_id) => new_id,
            Err(err) => {
                self.registry.insert_with_id(old, restore_spec(&removed), removed.pos);
                return Err(err);
            }
        };
        let _ = self.grid.resize(self.registry.required_rows());
        tracing::debug!(
            target: "dashgrid.engine",
            old = old.get(),
            new = new_id.get(),
            "widget replaced"
        );
        self.notify_layout(&[
            WidgetChange {
                id: old,
                before: Some(pos),
                after: None,
            },
            WidgetChange {
                id: new_id,
                before: None,
                after: Some(pos),
            },
        ]);
        self.registry.get(new_id).ok_or(GridError::unknown(new_id))
    }

    // ---------------------------------------------------------------------
    // Gestures
    // ---------------------------------------------------------------------

    /// Start dragging `id`.
    pub fn begin_drag(&mut self, id: WidgetId) -> Result<()> {
        self.ensure_mutable()?;
        let layout: Vec<(WidgetId, GridRect)> =
            self.registry.ordered().iter().map(|w| (w.id, w.pos)).collect();
        let session = DragSession::begin(
            &layout,
            id,
            self.config.max_columns,
            self.config.row_limit(),
        )
        .ok_or(GridError::unknown(id))?;
        let current: Vec<(WidgetId, GridRect)> = session.current().collect();
        self.gesture = Some(Gesture::Drag(session));
        self.show(&current);
        Ok(())
    }

    /// Move the dragged widget's top-left corner to `(x, y)`.
    pub fn drag_to(&mut self, x: u16, y: u16) -> Result<GestureStep> {
        let session = self.drag_session()?;
        let candidate = session.mover_rect().with_origin(x, y);
        let result = session.step(candidate);
        let (current, bottom) = (session.current().collect::<Vec<_>>(), session.max_bottom());
        Ok(self.apply_step(result, &current, bottom))
    }

    /// Move the dragged widget by `(dx, dy)` cells from its current spot.
    pub fn drag_by(&mut self, dx: i32, dy: i32) -> Result<GestureStep> {
        let rect = self.drag_session()?.mover_rect();
        let shift = |v: u16, d: i32| {
            u16::try_from((i32::from(v) + d).clamp(0, i32::from(u16::MAX))).unwrap_or(u16::MAX)
        };
        self.drag_to(shift(rect.x, dx), shift(rect.y, dy))
    }

    /// Start resizing `id` from `handle`.
    pub fn begin_resize(&mut self, id: WidgetId, handle: ResizeHandle) -> Result<()> {
        self.ensure_mutable()?;
        let layout: Vec<ResizeEntry> = self
            .registry
            .ordered()
            .iter()
            .map(|w| ResizeEntry {
                id: w.id,
                pos: w.pos,
                min_size: w.min_size,
                max_size: w.max_size,
            })
            .collect();
        let session = ResizeSession::begin(
            &layout,
            id,
            Some(handle),
            self.config.max_columns,
            self.config.row_limit(),
        )
        .ok_or(GridError::unknown(id))?;
        let current: Vec<(WidgetId, GridRect)> = session.current().collect();
        self.gesture = Some(Gesture::Resize(session));
        self.show(&current);
        Ok(())
    }

    /// Request `rect` for the resized widget.
    ///
    /// A request whose left or top edge differs from the committed one is
    /// treated as growth or shrink of that edge, keeping the far edge.
    pub fn resize_to(&mut self, rect: GridRect) -> Result<GestureStep> {
        let session = self.resize_session()?;
        let result = session.step(rect);
        let (current, bottom) = (session.current().collect::<Vec<_>>(), session.max_bottom());
        Ok(self.apply_step(result, &current, bottom))
    }

    /// Move the grabbed edges by `(dx, dy)` cells from the previous request.
    pub fn resize_by(&mut self, dx: i32, dy: i32) -> Result<GestureStep> {
        let session = self.resize_session()?;
        let result = session.step_by(dx, dy);
        let (current, bottom) = (session.current().collect::<Vec<_>>(), session.max_bottom());
        Ok(self.apply_step(result, &current, bottom))
    }

    /// Commit the active gesture.
    pub fn end_gesture(&mut self) -> Result<GestureOutcome> {
        let Some(gesture) = self.gesture.take() else {
            return Err(GridError::InvalidState(InvalidStateKind::NoGesture));
        };
        let kind = gesture.kind();
        let before = self.registry.positions();
        for widget in self.registry.iter_mut() {
            if let Some(current) = widget.current_pos.take() {
                widget.pos = current;
            }
        }
        let _ = self.grid.resize(self.registry.required_rows());
        let after = self.registry.positions();
        let changes = diff(&before, &after);

        let mut resized = Vec::new();
        if let Gesture::Resize(session) = &gesture
            && !changes.is_empty()
        {
            let mut seen = BTreeSet::new();
            let size_changed = changes.iter().filter(|c| {
                c.before.map(|r| r.size()) != c.after.map(|r| r.size())
            });
            for id in std::iter::once(session.target())
                .chain(session.affected())
                .chain(size_changed.map(|c| c.id))
            {
                if seen.insert(id) {
                    resized.push(id);
                }
            }
        }

        tracing::debug!(
            target: "dashgrid.engine",
            gesture = %kind,
            changes = changes.len(),
            resized = resized.len(),
            rows = self.grid.rows(),
            "gesture committed"
        );

        for id in &resized {
            if let Some(widget) = self.registry.get(*id) {
                for observer in &mut self.observers {
                    observer.on_resize_end(widget);
                }
            }
        }
        self.notify_layout(&changes);

        Ok(GestureOutcome {
            kind,
            changes,
            resized,
            rows: self.grid.rows(),
        })
    }

    /// Abandon the active gesture, restoring committed rectangles exactly.
    pub fn cancel_gesture(&mut self) -> Result<()> {
        let Some(gesture) = self.gesture.take() else {
            return Err(GridError::InvalidState(InvalidStateKind::NoGesture));
        };
        for widget in self.registry.iter_mut() {
            widget.current_pos = None;
        }
        let _ = self.grid.resize(self.registry.required_rows());
        tracing::debug!(
            target: "dashgrid.engine",
            gesture = %gesture.kind(),
            "gesture cancelled"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<()> {
        match &self.gesture {
            Some(gesture) => Err(GridError::InvalidState(
                InvalidStateKind::GestureInProgress(gesture.kind()),
            )),
            None => Ok(()),
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.edit_base.is_none() {
            return Err(GridError::InvalidState(InvalidStateKind::NotEditing));
        }
        self.ensure_idle()
    }

    fn committed(&self, id: WidgetId) -> Result<GridRect> {
        self.registry
            .get(id)
            .map(|w| w.pos)
            .ok_or(GridError::unknown(id))
    }

    fn drag_session(&mut self) -> Result<&mut DragSession> {
        match &mut self.gesture {
            Some(Gesture::Drag(session)) => Ok(session),
            Some(Gesture::Resize(_)) => Err(GridError::InvalidState(
                InvalidStateKind::GestureMismatch {
                    active: GestureKind::Resize,
                    requested: GestureKind::Drag,
                },
            )),
            None => Err(GridError::InvalidState(InvalidStateKind::NoGesture)),
        }
    }

    fn resize_session(&mut self) -> Result<&mut ResizeSession> {
        match &mut self.gesture {
            Some(Gesture::Resize(session)) => Ok(session),
            Some(Gesture::Drag(_)) => Err(GridError::InvalidState(
                InvalidStateKind::GestureMismatch {
                    active: GestureKind::Drag,
                    requested: GestureKind::Resize,
                },
            )),
            None => Err(GridError::InvalidState(InvalidStateKind::NoGesture)),
        }
    }

    fn apply_step(
        &mut self,
        result: std::result::Result<bool, OverflowReason>,
        current: &[(WidgetId, GridRect)],
        bottom: u16,
    ) -> GestureStep {
        match result {
            Ok(false) => GestureStep::Unchanged,
            Ok(true) => {
                self.show(current);
                let _ = self.grid.grow_to(bottom);
                GestureStep::Accepted {
                    rows: self.grid.rows(),
                }
            }
            Err(reason) => GestureStep::Rejected { reason },
        }
    }

    /// Publish in-progress rectangles as `current_pos`.
    fn show(&mut self, current: &[(WidgetId, GridRect)]) {
        for (id, rect) in current {
            if let Some(widget) = self.registry.get_mut(*id) {
                widget.current_pos = Some(*rect);
            }
        }
    }

    fn noop_outcome(&self, kind: GestureKind) -> GestureOutcome {
        GestureOutcome {
            kind,
            changes: Vec::new(),
            resized: Vec::new(),
            rows: self.grid.rows(),
        }
    }

    fn notify_layout(&mut self, changes: &[WidgetChange]) {
        if changes.is_empty() {
            return;
        }
        for observer in &mut self.observers {
            observer.on_layout_changed(changes);
        }
    }
}

fn restore_spec(widget: &Widget) -> NewWidget {
    NewWidget {
        kind: widget.kind.clone(),
        pos: Some(widget.pos),
        min_size: Some(widget.min_size),
        max_size: Some(widget.max_size),
        content_key: widget.content_key.clone(),
        fields: widget.fields.clone(),
    }
}

fn diff(
    before: &BTreeMap<WidgetId, GridRect>,
    after: &BTreeMap<WidgetId, GridRect>,
) -> Vec<WidgetChange> {
    let ids: BTreeSet<WidgetId> = before.keys().chain(after.keys()).copied().collect();
    ids.into_iter()
        .filter_map(|id| {
            let (b, a) = (before.get(&id).copied(), after.get(&id).copied());
            (b != a).then_some(WidgetChange {
                id,
                before: b,
                after: a,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn engine(columns: u16) -> LayoutEngine {
        let mut engine =
            LayoutEngine::new(GridConfig::with_columns(columns)).expect("valid config");
        engine.enter_edit_mode().expect("editable");
        engine
    }

    fn add(engine: &mut LayoutEngine, rect: GridRect) -> WidgetId {
        engine
            .add_widget(NewWidget::new("clock").at(rect))
            .expect("room")
            .id
    }

    fn pos(engine: &LayoutEngine, id: WidgetId) -> GridRect {
        engine.widget(id).expect("present").pos
    }

    #[derive(Default)]
    struct Log {
        layout: Vec<Vec<WidgetChange>>,
        resized: Vec<WidgetId>,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl LayoutObserver for Recorder {
        fn on_layout_changed(&mut self, changes: &[WidgetChange]) {
            self.0.borrow_mut().layout.push(changes.to_vec());
        }

        fn on_resize_end(&mut self, widget: &Widget) {
            self.0.borrow_mut().resized.push(widget.id);
        }
    }

    #[test]
    fn mutations_require_edit_mode() {
        let mut engine = LayoutEngine::new(GridConfig::default()).expect("valid config");
        assert_eq!(
            engine.add_widget(NewWidget::new("clock")).map(|w| w.id),
            Err(GridError::InvalidState(InvalidStateKind::NotEditing))
        );
        let mut config = GridConfig::default();
        config.editable = false;
        let mut readonly = LayoutEngine::new(config).expect("valid config");
        assert_eq!(
            readonly.enter_edit_mode(),
            Err(GridError::InvalidState(InvalidStateKind::ReadOnly))
        );
    }

    #[test]
    fn add_without_position_uses_first_fit() {
        let mut engine = engine(4);
        let first = engine.add_widget(NewWidget::new("clock")).expect("room").pos;
        assert_eq!(first, GridRect::new(0, 0, 2, 2));
        let second = engine.add_widget(NewWidget::new("clock")).expect("room").pos;
        assert_eq!(second, GridRect::new(2, 0, 2, 2));
        assert_eq!(engine.rows(), 2);
    }

    #[test]
    fn add_uses_kind_default_size() {
        let config = GridConfig::with_columns(6).widget_default("graph", Size::new(4, 3));
        let mut engine = LayoutEngine::new(config).expect("valid config");
        engine.enter_edit_mode().expect("editable");
        let pos = engine.add_widget(NewWidget::new("graph")).expect("room").pos;
        assert_eq!(pos, GridRect::new(0, 0, 4, 3));
    }

    #[test]
    fn second_gesture_is_rejected() {
        let mut engine = engine(4);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        engine.begin_drag(a).expect("drag");
        assert_eq!(
            engine.begin_resize(a, ResizeHandle::Right),
            Err(GridError::InvalidState(InvalidStateKind::GestureInProgress(
                GestureKind::Drag
            )))
        );
        assert_eq!(
            engine.move_widget(a, 2, 0).map(|_| ()),
            Err(GridError::InvalidState(InvalidStateKind::GestureInProgress(
                GestureKind::Drag
            )))
        );
        assert_eq!(
            engine.resize_by(1, 0),
            Err(GridError::InvalidState(InvalidStateKind::GestureMismatch {
                active: GestureKind::Drag,
                requested: GestureKind::Resize,
            }))
        );
        engine.cancel_gesture().expect("cancel");
        assert_eq!(
            engine.end_gesture().map(|_| ()),
            Err(GridError::InvalidState(InvalidStateKind::NoGesture))
        );
    }

    #[test]
    fn gesture_exposes_current_pos_until_commit() {
        let mut engine = engine(4);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let b = add(&mut engine, GridRect::new(2, 0, 2, 2));
        engine.mark_persisted();
        engine.begin_drag(a).expect("drag");
        assert_eq!(
            engine.drag_by(1, 0),
            Ok(GestureStep::Accepted { rows: 4 })
        );
        let widget = engine.widget(b).expect("present");
        assert_eq!(widget.pos, GridRect::new(2, 0, 2, 2));
        assert_eq!(widget.current_pos, Some(GridRect::new(2, 2, 2, 2)));
        assert!(!engine.is_dirty());

        let outcome = engine.end_gesture().expect("commit");
        assert_eq!(outcome.changes.len(), 2);
        assert_eq!(pos(&engine, b), GridRect::new(2, 2, 2, 2));
        assert_eq!(engine.widget(b).expect("present").current_pos, None);
        assert!(engine.is_dirty());
    }

    #[test]
    fn cancel_restores_committed_layout() {
        let mut engine = engine(4);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let b = add(&mut engine, GridRect::new(2, 0, 2, 2));
        let before = engine.snapshot();
        engine.begin_drag(a).expect("drag");
        let _ = engine.drag_to(1, 0).expect("step");
        assert_eq!(engine.rows(), 4);
        engine.cancel_gesture().expect("cancel");
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.rows(), 2);
        assert_eq!(engine.widget(b).expect("present").current_pos, None);
    }

    #[test]
    fn observers_see_commits() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut engine = engine(4);
        engine.add_observer(Box::new(Recorder(Rc::clone(&log))));
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let b = add(&mut engine, GridRect::new(2, 0, 2, 2));
        let outcome = engine.resize_widget(a, 3, 2).expect("resize");
        assert_eq!(outcome.resized, vec![a, b]);

        let log = log.borrow();
        assert_eq!(log.layout.len(), 3);
        assert_eq!(log.resized, vec![a, b]);
        assert_eq!(
            log.layout[2],
            vec![
                WidgetChange {
                    id: a,
                    before: Some(GridRect::new(0, 0, 2, 2)),
                    after: Some(GridRect::new(0, 0, 3, 2)),
                },
                WidgetChange {
                    id: b,
                    before: Some(GridRect::new(2, 0, 2, 2)),
                    after: Some(GridRect::new(3, 0, 1, 2)),
                },
            ]
        );
    }

    #[test]
    fn discard_edit_rolls_back_session() {
        let mut engine = engine(4);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        engine.exit_edit_mode().expect("exit");
        engine.mark_persisted();

        engine.enter_edit_mode().expect("enter");
        let b = add(&mut engine, GridRect::new(2, 0, 2, 2));
        let _ = engine.move_widget(a, 0, 2).expect("move");
        let changes = engine.discard_edit().expect("discard");
        assert_eq!(changes.len(), 2);
        assert!(engine.widget(b).is_none());
        assert_eq!(pos(&engine, a), GridRect::new(0, 0, 2, 2));
        assert!(!engine.is_dirty());
        assert!(!engine.is_editing());

        // Ids handed out during the discarded session stay retired.
        engine.enter_edit_mode().expect("enter");
        let c = add(&mut engine, GridRect::new(2, 0, 2, 2));
        assert!(c > b);
    }

    #[test]
    fn copy_and_paste() {
        let mut engine = engine(6);
        let a = engine
            .add_widget(
                NewWidget::new("graph")
                    .at(GridRect::new(0, 0, 3, 2))
                    .field("itemid", "42"),
            )
            .expect("room")
            .id;
        let template = engine.copy_widget(a).expect("copy");
        assert_eq!(template.size, Size::new(3, 2));

        let pasted = engine
            .paste_widget(&template, PasteTarget::Anywhere)
            .expect("room");
        assert_eq!(pasted.pos, GridRect::new(3, 0, 3, 2));
        assert_eq!(pasted.fields.get("itemid").map(String::as_str), Some("42"));

        // A click-sized request adopts the template size.
        let pasted = engine
            .paste_widget(&template, PasteTarget::At(GridRect::new(0, 2, 2, 2)))
            .expect("room");
        assert_eq!(pasted.pos, GridRect::new(0, 2, 3, 2));

        let replaced = engine
            .paste_widget(&template, PasteTarget::Replace(a))
            .expect("replace");
        assert_eq!(replaced.pos, GridRect::new(0, 0, 3, 2));
        assert!(engine.widget(a).is_none());
    }

    #[test]
    fn reconfigure_keeps_or_replaces_id() {
        let mut engine = engine(4);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let mut fields = BTreeMap::new();
        fields.insert("rf_rate".to_string(), "30".to_string());

        let same = engine
            .reconfigure_widget(a, "clock", fields.clone())
            .expect("same kind");
        assert_eq!(same.id, a);
        assert_eq!(same.fields, fields);

        let other = engine
            .reconfigure_widget(a, "graph", BTreeMap::new())
            .expect("new kind");
        assert_ne!(other.id, a);
        assert_eq!(other.kind, "graph");
        assert_eq!(other.pos, GridRect::new(0, 0, 2, 2));
        assert!(engine.widget(a).is_none());
    }

    #[test]
    fn gesture_accessors_follow_active_session() {
        let mut engine = engine(3);
        let a = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let _ = add(&mut engine, GridRect::new(2, 0, 1, 2));
        assert_eq!(engine.gesture_widget(), None);

        engine.begin_resize(a, ResizeHandle::Right).expect("resize");
        assert_eq!(engine.resize_handle(), Some(ResizeHandle::Right));
        let _ = engine.resize_by(1, 0).expect("resize active");
        // The neighbour is already minimal, so the target keeps its width.
        assert_eq!(engine.resize_correction(Axis::X), Some(1));
        assert_eq!(
            engine.gesture_widget(),
            Some((a, GridRect::new(0, 0, 2, 2)))
        );
        engine.cancel_gesture().expect("cancel");

        engine.begin_drag(a).expect("drag");
        assert_eq!(engine.resize_handle(), None);
        assert_eq!(engine.resize_correction(Axis::X), None);
        let _ = engine.drag_to(0, 2).expect("drag active");
        assert_eq!(
            engine.gesture_widget(),
            Some((a, GridRect::new(0, 2, 2, 2)))
        );
        engine.cancel_gesture().expect("cancel");
    }

    #[test]
    fn take_dirty_reports_changes_once() {
        let mut engine = engine(4);
        assert!(!engine.take_dirty());
        let _ = add(&mut engine, GridRect::new(0, 0, 2, 2));
        assert!(engine.take_dirty());
        assert!(!engine.take_dirty());
        assert!(engine.is_dirty());
        engine.mark_persisted();
        assert!(!engine.is_dirty());
    }

    #[test]
    fn restore_round_trips_snapshot() {
        let mut engine = engine(4);
        let _ = add(&mut engine, GridRect::new(0, 0, 2, 2));
        let _ = add(&mut engine, GridRect::new(2, 1, 2, 3));
        let snapshot = engine.snapshot();
        let restored =
            LayoutEngine::restore(GridConfig::with_columns(4), &snapshot).expect("valid snapshot");
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.rows(), 4);
        assert!(!restored.is_dirty());
        assert!(!restored.is_editing());
    }

    #[test]
    fn restore_keeps_per_widget_size_limits() {
        let mut engine = engine(4);
        let bounded = engine
            .add_widget(
                NewWidget::new("chart")
                    .at(GridRect::new(0, 0, 3, 3))
                    .min_size(Size::new(2, 3))
                    .max_size(Size::new(3, 4)),
            )
            .expect("room")
            .id;
        let plain = add(&mut engine, GridRect::new(0, 3, 2, 2));
        let snapshot = engine.snapshot();
        assert!(snapshot.widgets.iter().any(|r| r.id == plain && r.min_size.is_none()));

        let restored =
            LayoutEngine::restore(GridConfig::with_columns(4), &snapshot).expect("valid snapshot");
        let widget = restored.widget(bounded).expect("restored");
        assert_eq!(widget.min_size, Size::new(2, 3));
        assert_eq!(widget.max_size, Size::new(3, 4));
        assert_eq!(restored.snapshot(), snapshot);
    }
}

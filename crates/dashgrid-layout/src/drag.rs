//! Drag repacking.
//!
//! A [`DragSession`] holds the bookkeeping for one drag gesture: the tile
//! order captured at start, the prepared *base* rectangles every move resets
//! to, the `affected_by` links and the last accepted state. Nothing is stored
//! on the widgets themselves and the committed rectangles are never touched,
//! so dropping the session cancels the gesture exactly.
//!
//! On every move the mover takes its candidate rectangle and a cascade pushes
//! each overlapped widget, and each chained `affected_by` child of a pushed
//! widget, down to the pusher's bottom edge. The cascade is depth-first in the
//! tile order. If any widget ends past the row limit, or the result does not
//! validate, the step is rejected and the last accepted state stays in force.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::OverflowReason;
use crate::frame::{Frame, validate};
use crate::registry::WidgetId;
use dashgrid_core::{Axis, GridRect};

/// Upper bound on rows a single cascade is budgeted for.
const MAX_CASCADE_ROWS: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) struct DragSession {
    mover: WidgetId,
    /// Tile order for the whole gesture: layout order at start.
    order: Vec<WidgetId>,
    committed: FxHashMap<WidgetId, Frame>,
    base: FxHashMap<WidgetId, Frame>,
    affected_by: FxHashMap<WidgetId, WidgetId>,
    current: FxHashMap<WidgetId, Frame>,
    columns: i32,
    row_limit: i32,
}

impl DragSession {
    /// Prepare a drag of `mover` over `layout`, given in layout order.
    ///
    /// Returns `None` when `mover` is not part of `layout`.
    pub fn begin(
        layout: &[(WidgetId, GridRect)],
        mover: WidgetId,
        columns: u16,
        row_limit: u16,
    ) -> Option<Self> {
        let committed: FxHashMap<WidgetId, Frame> = layout
            .iter()
            .map(|(id, rect)| (*id, Frame::from_rect(*rect)))
            .collect();
        let mover_frame = *committed.get(&mover)?;
        let order: Vec<WidgetId> = layout.iter().map(|(id, _)| *id).collect();

        let mut session = Self {
            mover,
            order,
            base: committed.clone(),
            current: committed.clone(),
            committed,
            affected_by: FxHashMap::default(),
            columns: i32::from(columns),
            row_limit: i32::from(row_limit),
        };

        let stacked = session.stacked_under_mover();
        session.affected_by = session.upstairs_links();
        session.pre_shift(&stacked, mover_frame);

        if session.realign(mover_frame).is_err() {
            // Base could not be restored around the mover; fall back to the
            // committed layout so the gesture starts from a valid state.
            session.base = session.committed.clone();
            session.current = session.committed.clone();
        }

        tracing::debug!(
            target: "dashgrid.drag",
            mover = mover.get(),
            widgets = session.order.len(),
            stacked = stacked.len(),
            links = session.affected_by.len(),
            "drag prepared"
        );
        Some(session)
    }

    #[must_use]
    pub fn mover(&self) -> WidgetId {
        self.mover
    }

    /// Rectangle of the mover in the last accepted state.
    pub fn mover_rect(&self) -> GridRect {
        self.current
            .get(&self.mover)
            .copied()
            .unwrap_or(Frame::from_rect(GridRect::default()))
            .to_rect()
    }

    /// Move the mover to `candidate`.
    ///
    /// The candidate is clamped to the grid first. Returns `Ok(false)` when
    /// it matches the last accepted mover rectangle. On `Err` the previous
    /// accepted state is kept.
    pub fn step(&mut self, candidate: GridRect) -> Result<bool, OverflowReason> {
        let current = self.mover_rect();
        let candidate = candidate.with_size(current.size());
        let max_x = self.columns - i32::from(candidate.width);
        let max_y = self.row_limit - i32::from(candidate.height);
        let mut frame = Frame::from_rect(candidate);
        frame.set_start(Axis::X, frame.start(Axis::X).clamp(0, max_x.max(0)));
        frame.set_start(Axis::Y, frame.start(Axis::Y).clamp(0, max_y.max(0)));

        if frame.to_rect() == current {
            return Ok(false);
        }

        match self.realign(frame) {
            Ok(()) => {
                tracing::debug!(
                    target: "dashgrid.drag",
                    mover = self.mover.get(),
                    x = frame.start(Axis::X),
                    y = frame.start(Axis::Y),
                    rows = self.max_bottom(),
                    "drag step accepted"
                );
                Ok(true)
            }
            Err(reason) => {
                tracing::debug!(
                    target: "dashgrid.drag",
                    mover = self.mover.get(),
                    x = frame.start(Axis::X),
                    y = frame.start(Axis::Y),
                    %reason,
                    "drag step rejected"
                );
                Err(reason)
            }
        }
    }

    /// Accepted rectangles in tile order.
    pub fn current(&self) -> impl Iterator<Item = (WidgetId, GridRect)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.current.get(id).map(|frame| (*id, frame.to_rect())))
    }

    /// Lowest bottom edge of the accepted state.
    pub fn max_bottom(&self) -> u16 {
        let bottom = self.current.values().map(Frame::bottom).max().unwrap_or(0);
        u16::try_from(bottom.max(0)).unwrap_or(u16::MAX)
    }

    /// Widgets stacked directly under the mover, transitively.
    ///
    /// A widget is stacked when its committed rectangle overlaps the marker's
    /// rectangle grown by one row.
    fn stacked_under_mover(&self) -> Vec<WidgetId> {
        let mut marked = FxHashSet::default();
        let mut stacked = Vec::new();
        let mut stack = vec![self.mover];
        while let Some(marker) = stack.pop() {
            let hits = self.probe_hits(marker, &marked);
            for id in hits.iter().rev() {
                stack.push(*id);
            }
            for id in hits {
                if marked.insert(id) {
                    stacked.push(id);
                }
            }
        }
        // Pre-shift runs top-down.
        stacked.sort_by_key(|id| self.position(*id));
        stacked
    }

    /// First upstairs neighbour of every widget, scanning each widget as a
    /// root in tile order. The first marker wins.
    fn upstairs_links(&self) -> FxHashMap<WidgetId, WidgetId> {
        let mut links = FxHashMap::default();
        let mut marked = FxHashSet::default();
        for root in &self.order {
            let mut stack = vec![*root];
            while let Some(marker) = stack.pop() {
                let hits = self.probe_hits(marker, &marked);
                for id in &hits {
                    let _ = marked.insert(*id);
                    let _ = links.insert(*id, marker);
                }
                stack.extend(hits.into_iter().rev());
            }
        }
        links
    }

    /// Unmarked widgets, other than the mover, overlapping `marker` grown by
    /// one row. Committed rectangles, tile order.
    fn probe_hits(&self, marker: WidgetId, marked: &FxHashSet<WidgetId>) -> Vec<WidgetId> {
        let Some(mut probe) = self.committed.get(&marker).copied() else {
            return Vec::new();
        };
        probe.set_size(Axis::Y, probe.size(Axis::Y) + 1);
        self.order
            .iter()
            .copied()
            .filter(|id| *id != self.mover && *id != marker && !marked.contains(id))
            .filter(|id| self.committed.get(id).is_some_and(|f| f.overlaps(&probe)))
            .collect()
    }

    /// Lift the stacked widgets into the room the mover is about to vacate.
    fn pre_shift(&mut self, stacked: &[WidgetId], mover: Frame) {
        for id in stacked {
            let Some(frame) = self.base.get(id).copied() else {
                continue;
            };
            let mut top = (frame.start(Axis::Y) - mover.size(Axis::Y)).max(0);
            for other in &self.order {
                if other == id || *other == self.mover {
                    continue;
                }
                let Some(obstacle) = self.base.get(other) else {
                    continue;
                };
                let mut strip = frame;
                strip.set_start(Axis::Y, top);
                strip.set_size(Axis::Y, frame.start(Axis::Y) - top);
                if strip.size(Axis::Y) > 0 && obstacle.overlaps(&strip) {
                    top = obstacle.bottom();
                }
            }
            if top < frame.start(Axis::Y) {
                let mut lifted = frame;
                lifted.set_start(Axis::Y, top);
                let _ = self.base.insert(*id, lifted);
            }
        }
    }

    fn position(&self, id: WidgetId) -> (i32, WidgetId) {
        let y = self.committed.get(&id).map_or(0, |f| f.start(Axis::Y));
        (y, id)
    }

    /// Reset to base, place the mover and cascade. Commits into `current`
    /// only when the result validates.
    fn realign(&mut self, mover: Frame) -> Result<(), OverflowReason> {
        let mut next = self.base.clone();
        let _ = next.insert(self.mover, mover);

        let budget = (self.order.len() + 1)
            * (usize::try_from(self.row_limit).unwrap_or(0).min(MAX_CASCADE_ROWS) + 1);
        let mut steps = 0usize;
        let mut stack = vec![self.mover];

        while let Some(pusher) = stack.pop() {
            steps += 1;
            if steps > budget {
                return Err(OverflowReason::Unsettled);
            }
            let Some(pusher_frame) = next.get(&pusher).copied() else {
                continue;
            };
            let mut pushed = Vec::new();
            for id in &self.order {
                if *id == self.mover || *id == pusher {
                    continue;
                }
                let Some(frame) = next.get_mut(id) else {
                    continue;
                };
                let chained = pusher != self.mover && self.affected_by.get(id) == Some(&pusher);
                if frame.overlaps(&pusher_frame) || chained {
                    let y = frame.start(Axis::Y).max(pusher_frame.bottom());
                    frame.set_start(Axis::Y, y);
                    if frame.bottom() > self.row_limit {
                        return Err(OverflowReason::RowLimit {
                            limit: u16::try_from(self.row_limit).unwrap_or(u16::MAX),
                        });
                    }
                    pushed.push(*id);
                }
            }
            stack.extend(pushed.into_iter().rev());
        }

        let frames: Vec<(WidgetId, Frame)> = self
            .order
            .iter()
            .filter_map(|id| next.get(id).map(|f| (*id, *f)))
            .collect();
        validate(&frames, self.columns, self.row_limit)?;
        self.current = next;
        Ok(())
    }
}

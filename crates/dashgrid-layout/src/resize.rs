//! Resize repacking.
//!
//! Every step recomputes from the committed layout and the requested target
//! rectangle, so undoing a growth within the same gesture restores the
//! neighbours it displaced or shrank.
//!
//! Each axis is processed separately, the axis that changed more since the
//! previous step first. Growth of the trailing edge pushes neighbours toward
//! the end of the axis; growth of the leading edge runs the same pass on a
//! grid mirrored along that axis. A pass has three parts:
//!
//! 1. Compaction. The affected widgets are slid after the target, closing
//!    gaps, but never before their own pre-pass position.
//! 2. Shrinking. While the chain still runs past the axis extent, every
//!    line crossing the extent gets one affected widget shrunk by a unit,
//!    the closest that can lose it without colliding with an unaffected
//!    widget. If some line has none, the target itself gives up the
//!    remaining overflow.
//! 3. Spring-back. Affected widgets smaller than their committed size regrow
//!    into whatever room is left.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::OverflowReason;
use crate::frame::{Frame, validate};
use crate::registry::WidgetId;
use dashgrid_core::{Axis, GridRect, Size};

/// The edge or corner a resize grabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeHandle {
    Top,
    Right,
    Bottom,
    Left,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ResizeHandle {
    /// Whether the handle moves the leading edge along `axis`.
    #[must_use]
    pub const fn moves_leading(self, axis: Axis) -> bool {
        match axis {
            Axis::X => matches!(self, Self::Left | Self::TopLeft | Self::BottomLeft),
            Axis::Y => matches!(self, Self::Top | Self::TopLeft | Self::TopRight),
        }
    }

    /// Whether the handle moves the trailing edge along `axis`.
    #[must_use]
    pub const fn moves_trailing(self, axis: Axis) -> bool {
        match axis {
            Axis::X => matches!(self, Self::Right | Self::TopRight | Self::BottomRight),
            Axis::Y => matches!(self, Self::Bottom | Self::BottomLeft | Self::BottomRight),
        }
    }

    /// Move the grabbed edges of `frame` by `delta` cells.
    pub(crate) fn apply(self, mut frame: Frame, delta: [i32; 2]) -> Frame {
        for axis in Axis::ALL {
            let d = delta[axis.index()];
            if self.moves_leading(axis) {
                frame.set_start(axis, frame.start(axis) + d);
                frame.set_size(axis, frame.size(axis) - d);
            } else if self.moves_trailing(axis) {
                frame.set_size(axis, frame.size(axis) + d);
            }
        }
        frame
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResizeSession {
    target: WidgetId,
    handle: Option<ResizeHandle>,
    order: Vec<WidgetId>,
    committed: FxHashMap<WidgetId, Frame>,
    min_size: FxHashMap<WidgetId, [i32; 2]>,
    target_max: [i32; 2],
    current: FxHashMap<WidgetId, Frame>,
    /// Last request, for axis ordering and relative steps.
    requested: Frame,
    /// Last request that produced an accepted layout.
    accepted: Frame,
    /// Cells the target gave up per axis in the last accepted step.
    correction: [i32; 2],
    affected: FxHashSet<WidgetId>,
    extent: [i32; 2],
}

/// Per-session widget data needed by the resize passes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResizeEntry {
    pub id: WidgetId,
    pub pos: GridRect,
    pub min_size: Size,
    pub max_size: Size,
}

impl ResizeSession {
    /// Prepare a resize of `target` over `layout`, given in layout order.
    ///
    /// Returns `None` when `target` is not part of `layout`.
    pub fn begin(
        layout: &[ResizeEntry],
        target: WidgetId,
        handle: Option<ResizeHandle>,
        columns: u16,
        row_limit: u16,
    ) -> Option<Self> {
        let entry = layout.iter().find(|e| e.id == target)?;
        let committed: FxHashMap<WidgetId, Frame> = layout
            .iter()
            .map(|e| (e.id, Frame::from_rect(e.pos)))
            .collect();
        let min_size = layout
            .iter()
            .map(|e| {
                (
                    e.id,
                    [
                        i32::from(e.min_size.width.max(1)),
                        i32::from(e.min_size.height.max(1)),
                    ],
                )
            })
            .collect();
        let start = Frame::from_rect(entry.pos);
        tracing::debug!(
            target: "dashgrid.resize",
            widget = target.get(),
            ?handle,
            widgets = layout.len(),
            "resize started"
        );
        Some(Self {
            target,
            handle,
            order: layout.iter().map(|e| e.id).collect(),
            current: committed.clone(),
            committed,
            min_size,
            target_max: [
                i32::from(entry.max_size.width),
                i32::from(entry.max_size.height),
            ],
            requested: start,
            accepted: start,
            correction: [0, 0],
            affected: FxHashSet::default(),
            extent: [i32::from(columns), i32::from(row_limit)],
        })
    }

    #[must_use]
    pub fn target(&self) -> WidgetId {
        self.target
    }

    #[must_use]
    pub fn handle(&self) -> Option<ResizeHandle> {
        self.handle
    }

    /// Cells the target gave up along `axis` in the last accepted step.
    #[must_use]
    pub fn correction(&self, axis: Axis) -> u16 {
        u16::try_from(self.correction[axis.index()].max(0)).unwrap_or(u16::MAX)
    }

    /// Widgets any pass displaced in the last accepted step.
    pub fn affected(&self) -> impl Iterator<Item = WidgetId> + '_ {
        self.order.iter().copied().filter(|id| self.affected.contains(id))
    }

    /// Accepted rectangles in tile order.
    pub fn current(&self) -> impl Iterator<Item = (WidgetId, GridRect)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.current.get(id).map(|frame| (*id, frame.to_rect())))
    }

    /// Target rectangle in the last accepted state.
    pub fn target_rect(&self) -> GridRect {
        self.current
            .get(&self.target)
            .copied()
            .unwrap_or(self.accepted)
            .to_rect()
    }

    /// Lowest bottom edge of the accepted state.
    pub fn max_bottom(&self) -> u16 {
        let bottom = self.current.values().map(Frame::bottom).max().unwrap_or(0);
        u16::try_from(bottom.max(0)).unwrap_or(u16::MAX)
    }

    /// Move the grabbed edges by `dx`/`dy` cells from the previous request.
    ///
    /// Without a handle the bottom-right corner moves.
    pub fn step_by(&mut self, dx: i32, dy: i32) -> Result<bool, OverflowReason> {
        let handle = self.handle.unwrap_or(ResizeHandle::BottomRight);
        let request = handle.apply(self.requested, [dx, dy]);
        self.step_frame(request)
    }

    /// Request `rect` for the target.
    pub fn step(&mut self, rect: GridRect) -> Result<bool, OverflowReason> {
        self.step_frame(Frame::from_rect(rect))
    }

    fn step_frame(&mut self, request: Frame) -> Result<bool, OverflowReason> {
        let request = self.normalize(request);
        let previous = self.requested;
        self.requested = request;
        if request == self.accepted {
            return Ok(false);
        }

        let changed = |axis: Axis| {
            (request.start(axis) - previous.start(axis)).abs()
                + (request.size(axis) - previous.size(axis)).abs()
        };
        let first = if changed(Axis::X) >= changed(Axis::Y) {
            Axis::X
        } else {
            Axis::Y
        };

        let mut pass = Pass {
            session: self,
            frames: self.committed.clone(),
            marks: FxHashMap::default(),
            affected: FxHashSet::default(),
            correction: [0, 0],
        };
        let _ = pass.frames.insert(self.target, request);
        pass.premark(first);
        for axis in [first, first.other()] {
            pass.run_axis(axis);
        }

        let frames: Vec<(WidgetId, Frame)> = self
            .order
            .iter()
            .filter_map(|id| pass.frames.get(id).map(|f| (*id, *f)))
            .collect();

        match validate(&frames, self.extent[0], self.extent[1]) {
            Ok(()) => {
                let Pass {
                    frames,
                    affected,
                    correction,
                    ..
                } = pass;
                self.current = frames;
                self.affected = affected;
                self.correction = correction;
                self.accepted = request;
                tracing::debug!(
                    target: "dashgrid.resize",
                    widget = self.target.get(),
                    first_axis = ?first,
                    affected = self.affected.len(),
                    correction_x = self.correction[0],
                    correction_y = self.correction[1],
                    "resize step accepted"
                );
                Ok(true)
            }
            Err(reason) => {
                tracing::debug!(
                    target: "dashgrid.resize",
                    widget = self.target.get(),
                    width = request.size(Axis::X),
                    height = request.size(Axis::Y),
                    %reason,
                    "resize step rejected"
                );
                Err(reason)
            }
        }
    }

    /// Clamp a request to the target's size limits and the grid. A moved
    /// leading edge keeps the far edge fixed.
    fn normalize(&self, request: Frame) -> Frame {
        let base = self.committed.get(&self.target).copied().unwrap_or(request);
        let min = self.min_size.get(&self.target).copied().unwrap_or([1, 1]);
        let mut out = request;
        for axis in Axis::ALL {
            let i = axis.index();
            let extent = self.extent[i];
            let lo = min[i].min(extent);
            let hi = self.target_max[i].min(extent).max(lo);
            let size = request.size(axis).clamp(lo, hi);
            let (start, size) = if request.start(axis) != base.start(axis) {
                let end = request.end(axis).clamp(lo, extent);
                let start = (end - size).max(0);
                (start, (end - start).max(lo))
            } else {
                let start = request.start(axis).clamp(0, (extent - lo).max(0));
                (start, size.min(extent - start).max(lo))
            };
            out.set_start(axis, start);
            out.set_size(axis, size);
        }
        out
    }
}

/// Working state of one resize step.
struct Pass<'a> {
    session: &'a ResizeSession,
    frames: FxHashMap<WidgetId, Frame>,
    /// Axis each widget has been claimed by in this step.
    marks: FxHashMap<WidgetId, Axis>,
    affected: FxHashSet<WidgetId>,
    correction: [i32; 2],
}

impl Pass<'_> {
    fn frame(&self, id: WidgetId) -> Frame {
        self.frames
            .get(&id)
            .copied()
            .unwrap_or(Frame::from_rect(GridRect::default()))
    }

    fn committed(&self, id: WidgetId) -> Frame {
        self.session
            .committed
            .get(&id)
            .copied()
            .unwrap_or(Frame::from_rect(GridRect::default()))
    }

    fn min(&self, id: WidgetId, axis: Axis) -> i32 {
        self.session
            .min_size
            .get(&id)
            .map_or(1, |m| m[axis.index()])
    }

    /// When X goes first and Y also changed, widgets hit only by the
    /// vertical growth belong to the Y pass.
    fn premark(&mut self, first: Axis) {
        let target = self.session.target;
        let request = self.frame(target);
        let base = self.committed(target);
        if first != Axis::X
            || (request.start(Axis::Y) == base.start(Axis::Y)
                && request.size(Axis::Y) == base.size(Axis::Y))
        {
            return;
        }
        let mut probe = request;
        probe.set_start(Axis::X, base.start(Axis::X));
        probe.set_size(Axis::X, base.size(Axis::X));
        for id in &self.session.order {
            if *id == target {
                continue;
            }
            let frame = self.frame(*id);
            if frame.overlaps(&request) && frame.overlaps(&probe) {
                let _ = self.marks.insert(*id, Axis::Y);
            }
        }
    }

    fn run_axis(&mut self, axis: Axis) {
        self.marks.retain(|_, marked| *marked != axis);
        let target = self.session.target;
        let request = self.frame(target);
        let base = self.committed(target);
        if request.end(axis) > base.end(axis) {
            self.grow(axis, false);
        }
        let request = self.frame(target);
        if request.start(axis) < base.start(axis) {
            self.grow(axis, true);
        }
    }

    fn mirror_all(&mut self, axis: Axis, extent: i32) {
        for frame in self.frames.values_mut() {
            *frame = frame.mirrored(axis, extent);
        }
    }

    /// One growth pass toward the end of `axis`, optionally on the mirrored
    /// grid.
    fn grow(&mut self, axis: Axis, mirrored: bool) {
        let extent = self.session.extent[axis.index()];
        let target = self.session.target;
        if mirrored {
            self.mirror_all(axis, extent);
        }
        let committed_target = if mirrored {
            self.committed(target).mirrored(axis, extent)
        } else {
            self.committed(target)
        };

        let mut pusher = self.frame(target);
        let start = pusher.start(axis).max(committed_target.start(axis));
        pusher.set_size(axis, pusher.end(axis) - start);
        pusher.set_start(axis, start);

        let affected = self.mark(axis, pusher);
        if !affected.is_empty() {
            self.settle(axis, extent, &affected, mirrored);
        }

        if mirrored {
            self.mirror_all(axis, extent);
        }
    }

    /// Claim for `axis` every unclaimed widget overlapping the growth,
    /// transitively through boundaries extended by the penetration depth.
    /// Returns the claimed widgets in tile order.
    fn mark(&mut self, axis: Axis, pusher: Frame) -> Vec<WidgetId> {
        let target = self.session.target;
        let mut claimed = Vec::new();
        let mut stack = vec![pusher];
        while let Some(bounds) = stack.pop() {
            let hits: Vec<WidgetId> = self
                .session
                .order
                .iter()
                .copied()
                .filter(|id| *id != target && !self.marks.contains_key(id))
                .filter(|id| self.frame(*id).overlaps(&bounds))
                .collect();
            for id in hits.iter().rev() {
                let _ = self.marks.insert(*id, axis);
                let mut boundary = self.frame(*id);
                let depth = bounds.end(axis) - boundary.start(axis);
                boundary.set_size(axis, boundary.size(axis) + depth);
                stack.push(boundary);
            }
            claimed.extend(hits);
        }
        let rank: FxHashMap<WidgetId, usize> = self
            .session
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        claimed.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
        claimed
    }

    /// Compact, shrink and spring back the affected chain of one pass.
    fn settle(&mut self, axis: Axis, extent: i32, affected: &[WidgetId], mirrored: bool) {
        let target = self.session.target;
        let rank: FxHashMap<WidgetId, usize> = self
            .session
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let mut chain: Vec<(WidgetId, Frame)> =
            affected.iter().map(|id| (*id, self.frame(*id))).collect();
        chain.sort_by_key(|(id, f)| (f.start(axis), rank.get(id).copied().unwrap_or(usize::MAX)));
        let mut sizes: Vec<i32> = chain.iter().map(|(_, f)| f.size(axis)).collect();

        let mut target_frame = self.frame(target);
        let (mut placed, end) = compact(&chain, &sizes, axis, target_frame.end(axis));
        let mut overlap = end - extent;

        while overlap > 0 {
            let Some(batch) =
                self.shrink_batch(axis, extent, &chain, &sizes, &placed, target_frame.end(axis))
            else {
                break;
            };
            let mut trial = sizes.clone();
            for &i in &batch {
                trial[i] -= 1;
            }
            let (frames, end) = compact(&chain, &trial, axis, target_frame.end(axis));
            if end - extent >= overlap {
                break;
            }
            sizes = trial;
            placed = frames;
            overlap = end - extent;
        }

        if overlap > 0 {
            let min = self.min(target, axis);
            let size = (target_frame.size(axis) - overlap).max(min);
            self.correction[axis.index()] += target_frame.size(axis) - size;
            target_frame.set_size(axis, size);
            let _ = self.frames.insert(target, target_frame);
            let (frames, end) = compact(&chain, &sizes, axis, target_frame.end(axis));
            placed = frames;
            tracing::debug!(
                target: "dashgrid.resize",
                widget = target.get(),
                axis = ?axis,
                mirrored,
                overflow = overlap,
                end,
                "target absorbed overflow"
            );
        }

        for ((id, _), frame) in chain.iter().zip(&placed) {
            let _ = self.frames.insert(*id, *frame);
            let _ = self.affected.insert(*id);
        }

        self.spring_back(axis, extent, affected, mirrored);
    }

    /// Pick one widget to lose a unit on every line that runs past `extent`,
    /// the closest compacted start first and then chain order. A widget
    /// already picked covers every line it crosses. Returns `None` when some
    /// overflowing line has no widget that can shrink.
    fn shrink_batch(
        &self,
        axis: Axis,
        extent: i32,
        chain: &[(WidgetId, Frame)],
        sizes: &[i32],
        placed: &[Frame],
        target_end: i32,
    ) -> Option<Vec<usize>> {
        let across = axis.other();
        let mut lines: Vec<i32> = placed
            .iter()
            .filter(|f| f.end(axis) > extent)
            .flat_map(|f| f.start(across)..f.end(across))
            .collect();
        lines.sort_unstable();
        lines.dedup();

        let crosses = |i: usize, line: i32| {
            (placed[i].start(across)..placed[i].end(across)).contains(&line)
        };
        let mut batch: Vec<usize> = Vec::new();
        for line in lines {
            if batch.iter().any(|&i| crosses(i, line)) {
                continue;
            }
            let mut candidates: Vec<usize> = (0..chain.len())
                .filter(|&i| crosses(i, line) && sizes[i] > self.min(chain[i].0, axis))
                .collect();
            candidates.sort_by_key(|&i| (placed[i].start(axis), i));
            let pick = candidates.into_iter().find(|&i| {
                let mut trial = sizes.to_vec();
                for &j in batch.iter().chain(std::iter::once(&i)) {
                    trial[j] -= 1;
                }
                let (frames, _) = compact(chain, &trial, axis, target_end);
                !self.collides_outside(chain, &frames)
            })?;
            batch.push(pick);
        }
        (!batch.is_empty()).then_some(batch)
    }

    fn collides_outside(&self, chain: &[(WidgetId, Frame)], placed: &[Frame]) -> bool {
        let inside: FxHashSet<WidgetId> = chain.iter().map(|(id, _)| *id).collect();
        self.session
            .order
            .iter()
            .filter(|id| !inside.contains(id))
            .map(|id| self.frame(*id))
            .any(|other| placed.iter().any(|frame| frame.overlaps(&other)))
    }

    /// Regrow shrunk widgets toward their committed size, furthest first.
    fn spring_back(&mut self, axis: Axis, extent: i32, affected: &[WidgetId], mirrored: bool) {
        let mut order: Vec<WidgetId> = affected.to_vec();
        order.sort_by_key(|id| std::cmp::Reverse(self.frame(*id).start(axis)));
        for id in order {
            let frame = self.frame(id);
            let committed = self.committed(id);
            let committed = if mirrored {
                committed.mirrored(axis, extent)
            } else {
                committed
            };
            if committed.size(axis) <= frame.size(axis) {
                continue;
            }
            let mut size = committed.size(axis).min(extent - frame.start(axis));
            let mut grown = frame;
            grown.set_size(axis, size);
            for other in &self.session.order {
                if *other == id {
                    continue;
                }
                let other = self.frame(*other);
                if other.overlaps(&grown) && other.start(axis) >= frame.start(axis) {
                    size = size.min(other.start(axis) - frame.start(axis));
                }
            }
            let mut regrown = frame;
            regrown.set_size(axis, size.max(frame.size(axis)));
            let _ = self.frames.insert(id, regrown);
        }
    }
}

/// Place `chain` after `target_end`, closing gaps along `axis` but never
/// moving a widget before its own position. Returns the placed frames and
/// the furthest end reached.
fn compact(
    chain: &[(WidgetId, Frame)],
    sizes: &[i32],
    axis: Axis,
    target_end: i32,
) -> (Vec<Frame>, i32) {
    let across = axis.other();
    let mut margins: FxHashMap<i32, i32> = FxHashMap::default();
    let mut placed = Vec::with_capacity(chain.len());
    let mut max_end = 0;

    for ((_, frame), size) in chain.iter().zip(sizes) {
        let mut frame = *frame;
        frame.set_size(axis, *size);
        let lines = frame.start(across)..frame.end(across);
        let floor = lines
            .clone()
            .filter_map(|line| margins.get(&line).copied())
            .fold(target_end, i32::max);
        let start = frame.start(axis).max(floor);
        frame.set_start(axis, start);
        for line in lines {
            let _ = margins.insert(line, frame.end(axis));
        }
        max_end = max_end.max(frame.end(axis));
        placed.push(frame);
    }

    (placed, max_end)
}

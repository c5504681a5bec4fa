#![forbid(unsafe_code)]

//! Dashboard widget grid.
//!
//! A fixed number of columns, a row count that follows the content, and a
//! set of non-overlapping widgets placed on integer cells. [`LayoutEngine`]
//! is the single mutation API: it places new widgets, drives drag and
//! resize gestures with collision repacking, and produces
//! [`LayoutSnapshot`]s for persistence.
//!
//! Every committed layout satisfies the same invariants: rectangles stay
//! inside the grid, have at least the minimum size and never overlap. A
//! gesture step that cannot keep them is rejected, and the previous state
//! stays on screen.
//!
//! ```
//! use dashgrid_layout::{GridConfig, GridRect, LayoutEngine, NewWidget};
//!
//! let mut engine = LayoutEngine::new(GridConfig::with_columns(4))?;
//! engine.enter_edit_mode()?;
//! let a = engine.add_widget(NewWidget::new("clock"))?.id;
//! let b = engine.add_widget(NewWidget::new("clock"))?.id;
//! assert_eq!(engine.widget(b).map(|w| w.pos), Some(GridRect::new(2, 0, 2, 2)));
//!
//! // Dragging `a` onto `b` pushes `b` down.
//! engine.move_widget(a, 1, 0)?;
//! assert_eq!(engine.widget(b).map(|w| w.pos), Some(GridRect::new(2, 2, 2, 2)));
//! assert_eq!(engine.rows(), 4);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
mod drag;
pub mod engine;
pub mod error;
mod frame;
pub mod grid;
pub mod placement;
pub mod registry;
mod resize;
pub mod snapshot;

pub use config::{ConfigError, GridConfig};
pub use dashgrid_core::{Axis, GridRect, Size};
pub use engine::{
    GestureOutcome, GestureStep, LayoutEngine, LayoutObserver, PasteTarget, WidgetChange,
    WidgetTemplate,
};
pub use error::{GestureKind, GridError, InvalidStateKind, OverflowReason, Result};
pub use grid::{CellMetrics, Grid, PixelRect, SnapMode, required_rows};
pub use placement::{find_empty_position, fit_requested};
pub use registry::{NewWidget, Widget, WidgetId, WidgetIdError, WidgetRegistry};
pub use resize::ResizeHandle;
pub use snapshot::{LAYOUT_SNAPSHOT_SCHEMA_VERSION, LayoutSnapshot, SnapshotError, WidgetRecord};

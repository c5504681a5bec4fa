//! Error types for the layout engine.
//!
//! Every fallible mutation returns [`GridError`]. The engine guarantees that
//! the committed layout is unchanged whenever an error is returned.

use thiserror::Error;

use crate::registry::WidgetId;
use dashgrid_core::Size;

pub type Result<T> = std::result::Result<T, GridError>;

/// Errors surfaced by the layout mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A placement, move or resize cannot be satisfied inside the grid
    /// bounds even after cascading, compaction and shrinking.
    #[error("layout overflow for {}: {reason}", widget_label(.widget))]
    Overflow {
        widget: Option<WidgetId>,
        reason: OverflowReason,
    },

    /// No free space exists for a new widget of the requested size.
    #[error("not enough free space for a {}x{} widget", .size.width, .size.height)]
    Exhausted { size: Size },

    /// The call violates the engine's usage contract.
    #[error("invalid state: {0}")]
    InvalidState(InvalidStateKind),
}

impl GridError {
    pub(crate) fn overflow(widget: Option<WidgetId>, reason: OverflowReason) -> Self {
        Self::Overflow { widget, reason }
    }

    pub(crate) fn unknown(id: WidgetId) -> Self {
        Self::InvalidState(InvalidStateKind::UnknownWidget { id })
    }
}

fn widget_label(widget: &Option<WidgetId>) -> String {
    match widget {
        Some(id) => format!("widget {}", id.get()),
        None => "new widget".to_string(),
    }
}

/// Why a layout could not be made to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OverflowReason {
    #[error("rectangle exceeds the grid bounds")]
    OutOfBounds,
    #[error("rectangle overlaps widget {}", .0.get())]
    Collision(WidgetId),
    #[error("cascade pushed a widget past row limit {limit}")]
    RowLimit { limit: u16 },
    #[error("displacement did not settle")]
    Unsettled,
}

/// Contract violations reported through [`GridError::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidStateKind {
    #[error("layout is not in edit mode")]
    NotEditing,
    #[error("dashboard is read-only")]
    ReadOnly,
    #[error("a {0} gesture is already in progress")]
    GestureInProgress(GestureKind),
    #[error("no gesture in progress")]
    NoGesture,
    #[error("active gesture is a {active}, not a {requested}")]
    GestureMismatch {
        active: GestureKind,
        requested: GestureKind,
    },
    #[error("widget {} does not exist", .id.get())]
    UnknownWidget { id: WidgetId },
}

/// The two interactive gesture families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Drag,
    Resize,
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drag => f.write_str("drag"),
            Self::Resize => f.write_str("resize"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> WidgetId {
        WidgetId::new(raw).expect("test ID must be non-zero")
    }

    #[test]
    fn messages_name_the_widget() {
        let err = GridError::overflow(Some(id(3)), OverflowReason::RowLimit { limit: 64 });
        assert_eq!(
            err.to_string(),
            "layout overflow for widget 3: cascade pushed a widget past row limit 64"
        );
        let err = GridError::overflow(None, OverflowReason::OutOfBounds);
        assert_eq!(
            err.to_string(),
            "layout overflow for new widget: rectangle exceeds the grid bounds"
        );
    }

    #[test]
    fn exhausted_reports_size() {
        let err = GridError::Exhausted {
            size: Size::new(4, 3),
        };
        assert_eq!(err.to_string(), "not enough free space for a 4x3 widget");
    }

    #[test]
    fn invalid_state_nests_kind() {
        let err = GridError::InvalidState(InvalidStateKind::GestureMismatch {
            active: GestureKind::Drag,
            requested: GestureKind::Resize,
        });
        assert_eq!(
            err.to_string(),
            "invalid state: active gesture is a drag, not a resize"
        );
        assert_eq!(
            GridError::unknown(id(9)).to_string(),
            "invalid state: widget 9 does not exist"
        );
    }
}

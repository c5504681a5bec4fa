//! Persistable layout snapshots.
//!
//! The engine has no storage of its own. A [`LayoutSnapshot`] is what the
//! persistence layer saves, and [`LayoutEngine::restore`](crate::LayoutEngine::restore)
//! rebuilds an engine from one after validating it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, GridConfig};
use crate::registry::{WidgetId, WidgetRegistry};
use dashgrid_core::{GridRect, Size};

/// Current schema version for layout snapshots.
///
/// Breaking field or semantic changes must bump this version.
pub const LAYOUT_SNAPSHOT_SCHEMA_VERSION: u16 = 1;

/// One persisted widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetRecord {
    pub id: WidgetId,
    pub kind: String,
    pub pos: GridRect,
    /// Only set when the widget's bounds differ from the grid defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// The committed layout in layout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    pub columns: u16,
    pub widgets: Vec<WidgetRecord>,
}

fn default_schema_version() -> u16 {
    LAYOUT_SNAPSHOT_SCHEMA_VERSION
}

/// Why a snapshot cannot be restored.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported layout schema version {found}, expected {expected}")]
    UnsupportedSchemaVersion { found: u16, expected: u16 },
    #[error("snapshot has {snapshot} columns but the grid has {config}")]
    ColumnMismatch { snapshot: u16, config: u16 },
    #[error("widget id {} appears more than once", .0.get())]
    DuplicateId(WidgetId),
    #[error("widget {} at {pos:?} lies outside the grid", .id.get())]
    OutOfBounds { id: WidgetId, pos: GridRect },
    #[error("widget {} is smaller than the minimum widget size", .id.get())]
    BelowMinimum { id: WidgetId },
    #[error("widgets {} and {} overlap", .first.get(), .second.get())]
    Overlap { first: WidgetId, second: WidgetId },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[cfg(feature = "config-files")]
    #[error("invalid layout snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl LayoutSnapshot {
    pub(crate) fn from_registry(registry: &WidgetRegistry, columns: u16) -> Self {
        let (default_min, default_max) = registry.default_size_limits();
        Self {
            schema_version: LAYOUT_SNAPSHOT_SCHEMA_VERSION,
            columns,
            widgets: registry
                .ordered()
                .into_iter()
                .map(|w| WidgetRecord {
                    id: w.id,
                    kind: w.kind.clone(),
                    pos: w.pos,
                    min_size: (w.min_size != default_min).then_some(w.min_size),
                    max_size: (w.max_size != default_max).then_some(w.max_size),
                    content_key: w.content_key.clone(),
                    fields: w.fields.clone(),
                })
                .collect(),
        }
    }

    /// Check the snapshot against `config`.
    pub fn validate(&self, config: &GridConfig) -> Result<(), SnapshotError> {
        if self.schema_version != LAYOUT_SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchemaVersion {
                found: self.schema_version,
                expected: LAYOUT_SNAPSHOT_SCHEMA_VERSION,
            });
        }
        if self.columns != config.max_columns {
            return Err(SnapshotError::ColumnMismatch {
                snapshot: self.columns,
                config: config.max_columns,
            });
        }

        let bounds = config.bounds();
        let min = config.min_widget_size();
        let mut seen = BTreeSet::new();
        for (i, record) in self.widgets.iter().enumerate() {
            if !seen.insert(record.id) {
                return Err(SnapshotError::DuplicateId(record.id));
            }
            let min = record.min_size.map_or(min, |own| own.max(min));
            if record.pos.width < min.width || record.pos.height < min.height {
                return Err(SnapshotError::BelowMinimum { id: record.id });
            }
            if !bounds.contains_rect(&record.pos) {
                return Err(SnapshotError::OutOfBounds {
                    id: record.id,
                    pos: record.pos,
                });
            }
            if let Some(other) = self.widgets[..i]
                .iter()
                .find(|other| other.pos.overlaps(&record.pos))
            {
                return Err(SnapshotError::Overlap {
                    first: other.id,
                    second: record.id,
                });
            }
        }
        Ok(())
    }

    /// Serialize as pretty-printed JSON.
    #[cfg(feature = "config-files")]
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON. Validation happens on restore.
    #[cfg(feature = "config-files")]
    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(s)?)
    }
}

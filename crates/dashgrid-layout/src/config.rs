//! Engine configuration.
//!
//! [`GridConfig`] is supplied once when a [`LayoutEngine`](crate::LayoutEngine)
//! is built and never changes afterwards. It can be loaded from TOML or JSON:
//!
//! ```toml
//! max_columns = 24
//! min_widget_rows = 2
//! max_rows_cap = 64
//!
//! [widget_defaults.clock]
//! width = 4
//! height = 3
//! ```
//!
//! ```rust,ignore
//! let config = GridConfig::from_toml_file("dashboard.toml")?;
//! let config = GridConfig::from_json_str(json)?;
//! ```
//!
//! Every field has a default, so a partial file only overrides what it names.

use std::collections::BTreeMap;
#[cfg(feature = "config-files")]
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dashgrid_core::{GridRect, Size};

/// Default number of grid columns.
pub const DEFAULT_MAX_COLUMNS: u16 = 12;
/// Default minimum widget height in rows.
pub const DEFAULT_MIN_WIDGET_ROWS: u16 = 2;
/// Default maximum widget height in rows.
pub const DEFAULT_WIDGET_MAX_ROWS: u16 = 32;
/// Default pixel height of one grid row.
pub const DEFAULT_WIDGET_HEIGHT_PX: u16 = 70;
/// Default hard cap on the number of rows.
pub const DEFAULT_MAX_ROWS_CAP: u16 = 64;

/// Immutable grid parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fixed column count.
    pub max_columns: u16,
    /// Minimum widget height in rows.
    pub min_widget_rows: u16,
    /// Maximum widget height in rows.
    pub widget_max_rows: u16,
    /// Pixel height of one row.
    pub widget_height_px: u16,
    /// Hard cap on the grid height. `None` lets the grid grow without bound.
    pub max_rows_cap: Option<u16>,
    /// Minimum number of visible rows, even for an empty layout.
    pub min_rows: u16,
    /// Whether the dashboard may enter edit mode at all.
    pub editable: bool,
    /// Size used for kinds missing from `widget_defaults`.
    pub default_widget_size: Size,
    /// Default size per widget kind.
    pub widget_defaults: BTreeMap<String, Size>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_columns: DEFAULT_MAX_COLUMNS,
            min_widget_rows: DEFAULT_MIN_WIDGET_ROWS,
            widget_max_rows: DEFAULT_WIDGET_MAX_ROWS,
            widget_height_px: DEFAULT_WIDGET_HEIGHT_PX,
            max_rows_cap: Some(DEFAULT_MAX_ROWS_CAP),
            min_rows: 1,
            editable: true,
            default_widget_size: Size::new(2, 2),
            widget_defaults: BTreeMap::new(),
        }
    }
}

impl GridConfig {
    /// Config with `columns` columns and every other field defaulted.
    #[must_use]
    pub fn with_columns(columns: u16) -> Self {
        Self {
            max_columns: columns,
            ..Self::default()
        }
    }

    /// Set the row cap.
    #[must_use]
    pub fn rows_cap(mut self, cap: Option<u16>) -> Self {
        self.max_rows_cap = cap;
        self
    }

    /// Set the minimum visible rows.
    #[must_use]
    pub fn min_rows(mut self, rows: u16) -> Self {
        self.min_rows = rows;
        self
    }

    /// Register a default size for a widget kind.
    #[must_use]
    pub fn widget_default(mut self, kind: impl Into<String>, size: Size) -> Self {
        let _ = self.widget_defaults.insert(kind.into(), size);
        self
    }

    /// Effective row limit used for overflow detection and the placement scan.
    #[must_use]
    pub fn row_limit(&self) -> u16 {
        self.max_rows_cap.unwrap_or(u16::MAX)
    }

    /// Bounding rectangle of every legal placement.
    #[must_use]
    pub fn bounds(&self) -> GridRect {
        GridRect::from_size(self.max_columns, self.row_limit())
    }

    /// Smallest legal widget size.
    #[must_use]
    pub fn min_widget_size(&self) -> Size {
        Size::new(1, self.min_widget_rows)
    }

    /// Largest legal widget size.
    #[must_use]
    pub fn max_widget_size(&self) -> Size {
        Size::new(
            self.max_columns,
            self.widget_max_rows.min(self.row_limit()),
        )
    }

    /// Default size for a widget kind, clamped to the legal range.
    #[must_use]
    pub fn default_size(&self, kind: &str) -> Size {
        self.widget_defaults
            .get(kind)
            .copied()
            .unwrap_or(self.default_widget_size)
            .min(self.max_widget_size())
            .max(self.min_widget_size())
    }

    /// Load from a TOML string.
    #[cfg(feature = "config-files")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Self>(s)?.validated()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-files")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "config-files")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Self>(s)?.validated()
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "config-files")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_columns == 0 {
            errors.push("max_columns must be > 0".into());
        }
        if self.min_widget_rows == 0 {
            errors.push("min_widget_rows must be > 0".into());
        }
        if self.widget_max_rows < self.min_widget_rows {
            errors.push(format!(
                "widget_max_rows ({}) must be >= min_widget_rows ({})",
                self.widget_max_rows, self.min_widget_rows
            ));
        }
        if self.widget_height_px == 0 {
            errors.push("widget_height_px must be > 0".into());
        }
        if let Some(cap) = self.max_rows_cap {
            if cap < self.min_widget_rows {
                errors.push(format!(
                    "max_rows_cap ({cap}) must fit one widget of min_widget_rows ({})",
                    self.min_widget_rows
                ));
            }
            if self.min_rows > cap {
                errors.push(format!(
                    "min_rows ({}) must be <= max_rows_cap ({cap})",
                    self.min_rows
                ));
            }
        }
        for (kind, size) in std::iter::once(("<default>", &self.default_widget_size))
            .chain(self.widget_defaults.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if size.width == 0 || size.height == 0 {
                errors.push(format!("default size for {kind} must be non-empty"));
            }
        }

        errors
    }

    /// Return `self` if valid, else every validation message.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            tracing::warn!(
                target: "dashgrid.config",
                error_count = errors.len(),
                first = %errors[0],
                "grid config rejected"
            );
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors from loading or validating a [`GridConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a file.
    #[error("failed to read grid config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config-files")]
    #[error("invalid TOML grid config: {0}")]
    Toml(#[from] toml::de::Error),
    /// JSON parse error.
    #[cfg(feature = "config-files")]
    #[error("invalid JSON grid config: {0}")]
    Json(#[from] serde_json::Error),
    /// Validation errors.
    #[error("grid config failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),
}

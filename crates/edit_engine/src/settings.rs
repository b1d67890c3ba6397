//! Table editor settings
//!
//! Settings are stored as JSON. A file that fails to parse falls back to
//! the defaults.

use crate::undo::{DEFAULT_BATCH_THRESHOLD, DEFAULT_UNDO_LIMIT};
use crate::viewport::{DEFAULT_HEIGHT_THRESHOLD, DEFAULT_SETTLE_WINDOW_MS};
use crate::Result;
use doc_model::DEFAULT_COLUMN_WIDTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default delay before captured formats are stamped onto new cells
pub const DEFAULT_FORMAT_REAPPLY_DELAY_MS: u64 = 10;

/// Tunables for the table editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableEditorSettings {
    /// Delay before formats are reapplied to cells created by a structural insert
    pub format_reapply_delay_ms: u64,
    /// How long the viewport counts as settling after a significant resize
    pub viewport_settle_window_ms: u64,
    /// Height change in pixels that counts as significant
    pub viewport_height_threshold: f32,
    /// Whether the host runs on a touch platform
    pub touch_platform: bool,
    /// Width in points of columns in new tables
    pub default_column_width: f32,
    /// Maximum number of undo entries
    pub undo_limit: usize,
    /// Typing closer together than this is undone as one step
    pub undo_batch_threshold_ms: u64,
}

impl Default for TableEditorSettings {
    fn default() -> Self {
        Self {
            format_reapply_delay_ms: DEFAULT_FORMAT_REAPPLY_DELAY_MS,
            viewport_settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
            viewport_height_threshold: DEFAULT_HEIGHT_THRESHOLD,
            touch_platform: false,
            default_column_width: DEFAULT_COLUMN_WIDTH,
            undo_limit: DEFAULT_UNDO_LIMIT,
            undo_batch_threshold_ms: DEFAULT_BATCH_THRESHOLD.as_millis() as u64,
        }
    }
}

impl TableEditorSettings {
    /// Parse settings from JSON, using defaults if the text does not parse
    pub fn from_json_str(json: &str) -> Self {
        match serde_json::from_str::<TableEditorSettings>(json) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to parse table editor settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Load settings from a file. A missing file yields the defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&content))
    }

    /// Write settings to a file as pretty JSON
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn with_touch_platform(mut self, touch: bool) -> Self {
        self.touch_platform = touch;
        self
    }

    pub fn undo_batch_threshold(&self) -> Duration {
        Duration::from_millis(self.undo_batch_threshold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = TableEditorSettings::default();
        assert_eq!(settings.format_reapply_delay_ms, 10);
        assert_eq!(settings.viewport_settle_window_ms, 300);
        assert!(!settings.touch_platform);
        assert_eq!(settings.undo_limit, 100);
        assert_eq!(settings.undo_batch_threshold(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "touch_platform": true, "undo_limit": 5 }"#;
        let settings = TableEditorSettings::from_json_str(json);
        assert!(settings.touch_platform);
        assert_eq!(settings.undo_limit, 5);
        assert_eq!(settings.default_column_width, DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let settings = TableEditorSettings::from_json_str("{ not json");
        assert_eq!(settings, TableEditorSettings::default());
    }

    #[test]
    fn test_load_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("table_editor.json");

        // Missing file gives defaults
        let loaded = TableEditorSettings::load_from_path(&path).unwrap();
        assert_eq!(loaded, TableEditorSettings::default());

        let settings = TableEditorSettings::default().with_touch_platform(true);
        settings.save_to_path(&path).unwrap();
        assert_eq!(TableEditorSettings::load_from_path(&path).unwrap(), settings);

        std::fs::write(&path, "garbage").unwrap();
        let loaded = TableEditorSettings::load_from_path(&path).unwrap();
        assert_eq!(loaded, TableEditorSettings::default());
    }
}

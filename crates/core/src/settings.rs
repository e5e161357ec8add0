use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application settings persisted as `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Most recent history records kept
    pub max_history: usize,
    /// Upper bound of one cooperative sleep slice
    pub sleep_slice_ms: u64,
    /// Default hold for `press()` when the script gives none
    pub press_hold_secs: f64,
    /// Gaps at or below this are not turned into `sleep()` by the recorder
    pub recorder_min_delay_secs: f64,
    /// Per-axis distance under which pointer moves are merged
    pub recorder_move_threshold: i32,
    /// Key that logs the pointer position regardless of bindings
    pub position_key: Option<String>,
    /// Start the hotkey listener as soon as the app comes up
    pub listen_on_start: bool,
    pub scripts_file: PathBuf,
    pub history_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history: 100,
            sleep_slice_ms: 100,
            press_hold_secs: 0.05,
            recorder_min_delay_secs: 0.05,
            recorder_move_threshold: 10,
            position_key: Some("f2".into()),
            listen_on_start: true,
            scripts_file: PathBuf::from("scripts/scripts.json"),
            history_file: PathBuf::from("scripts/history.json"),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults on a missing or unreadable file.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn sleep_slice(&self) -> Duration {
        Duration::from_millis(self.sleep_slice_ms.clamp(1, 100))
    }

    /// Resolve a configured path against `base` unless it is absolute.
    pub fn resolve(&self, base: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

use serde::{Deserialize, Serialize};

/// One stored script definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub hotkey: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// Partial update for a stored script; `None` leaves the field alone
#[derive(Debug, Clone, Default)]
pub struct ScriptPatch {
    pub name: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` removes the hotkey.
    pub hotkey: Option<Option<String>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "middle" => Some(Self::Middle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

/// Engine run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Idle,
    Running,
    Paused,
}

/// Snapshot of the engine, safe to hand to any observer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub status: RunState,
    pub script_id: Option<String>,
    pub script_name: Option<String>,
    pub current_line: Option<usize>,
}

impl EngineStatus {
    pub fn idle() -> Self {
        Self { status: RunState::Idle, script_id: None, script_name: None, current_line: None }
    }

    pub fn is_idle(&self) -> bool {
        self.status == RunState::Idle
    }
}

/// Result of `Engine::execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteReply {
    Accepted,
    Busy,
}

/// Result of the stop/pause/resume controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlReply {
    Ok,
    NothingRunning,
    NotApplicable,
}

impl ControlReply {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NothingRunning => "no script is running",
            Self::NotApplicable => "not applicable in the current state",
        }
    }
}

/// Terminal outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub script_id: String,
    pub timestamp: String,
    pub status: Outcome,
    pub duration: f64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub recording: bool,
    pub event_count: usize,
    pub duration: f64,
}

/// Command from TUI to the app loop
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(String),
    Stop,
    TogglePause,
    ToggleEnabled(String),
    Delete(String),
    ToggleListener,
    ToggleRecording,
    ClearHistory,
    Quit,
}

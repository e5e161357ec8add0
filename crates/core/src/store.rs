//! JSON-file backed history log and script store.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::logger;
use crate::types::{HistoryRecord, Script, ScriptPatch};

/// Where the engine reports finished executions.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: HistoryRecord) -> Result<()>;
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            logger::warn_p("store", &format!("ignoring unreadable {}: {}", path.display(), e));
            T::default()
        }),
        Err(_) => T::default(),
    }
}

fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

/// Most-recent-N execution records, optionally mirrored to a JSON file.
pub struct HistoryLog {
    path: Option<PathBuf>,
    max: usize,
    records: Mutex<VecDeque<HistoryRecord>>,
}

impl HistoryLog {
    pub fn in_memory(max: usize) -> Self {
        Self { path: None, max: max.max(1), records: Mutex::new(VecDeque::new()) }
    }

    /// Open (or start) a history file. Existing records beyond `max` are dropped.
    pub fn open(path: &Path, max: usize) -> Self {
        let log = Self { path: Some(path.to_path_buf()), ..Self::in_memory(max) };
        let loaded: Vec<HistoryRecord> = load_json(path);
        {
            let mut records = log.records.lock();
            records.extend(loaded);
            while records.len() > log.max {
                records.pop_front();
            }
        }
        log
    }

    pub fn all(&self) -> Vec<HistoryRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn clear(&self) -> Result<()> {
        let mut records = self.records.lock();
        records.clear();
        self.persist(&records)
    }

    fn persist(&self, records: &VecDeque<HistoryRecord>) -> Result<()> {
        match &self.path {
            Some(path) => save_json(path, records),
            None => Ok(()),
        }
    }
}

impl HistorySink for HistoryLog {
    fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.max {
            records.pop_front();
        }
        self.persist(&records)
    }
}

/// Script definitions kept in one JSON array file.
pub struct ScriptStore {
    path: PathBuf,
    scripts: Mutex<Vec<Script>>,
}

impl ScriptStore {
    pub fn open(path: &Path) -> Self {
        logger::register_prefix("store", logger::COLOR_GRAY);
        let scripts: Vec<Script> = load_json(path);
        logger::info_p("store", &format!("loaded {} script(s) from {}", scripts.len(), path.display()));
        Self { path: path.to_path_buf(), scripts: Mutex::new(scripts) }
    }

    pub fn all(&self) -> Vec<Script> {
        self.scripts.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Script> {
        self.scripts.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Enabled scripts that carry a hotkey.
    pub fn enabled_with_hotkey(&self) -> Vec<Script> {
        self.scripts
            .lock()
            .iter()
            .filter(|s| s.enabled && s.hotkey.as_deref().is_some_and(|h| !h.trim().is_empty()))
            .cloned()
            .collect()
    }

    pub fn create(&self, name: &str, content: &str, hotkey: Option<&str>) -> Result<Script> {
        if name.trim().is_empty() {
            return Err(anyhow!("script name must not be empty"));
        }
        let mut scripts = self.scripts.lock();
        let next = scripts
            .iter()
            .filter_map(|s| s.id.strip_prefix("script_")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let script = Script {
            id: format!("script_{}", next),
            name: name.to_string(),
            content: content.to_string(),
            hotkey: hotkey.map(str::to_string),
            enabled: true,
        };
        scripts.push(script.clone());
        save_json(&self.path, &*scripts)?;
        logger::info_p("store", &format!("created {} '{}'", script.id, script.name));
        Ok(script)
    }

    pub fn update(&self, id: &str, patch: ScriptPatch) -> Result<Option<Script>> {
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            script.name = name;
        }
        if let Some(content) = patch.content {
            script.content = content;
        }
        if let Some(hotkey) = patch.hotkey {
            script.hotkey = hotkey.filter(|h| !h.trim().is_empty());
        }
        if let Some(enabled) = patch.enabled {
            script.enabled = enabled;
        }
        let updated = script.clone();
        save_json(&self.path, &*scripts)?;
        Ok(Some(updated))
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut scripts = self.scripts.lock();
        let before = scripts.len();
        scripts.retain(|s| s.id != id);
        if scripts.len() == before {
            return Ok(false);
        }
        save_json(&self.path, &*scripts)?;
        Ok(true)
    }
}

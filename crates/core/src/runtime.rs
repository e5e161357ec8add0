//! Composition root: wires settings, platform, engine, detector, recorder
//! and the stores, and serves commands from the UI.

use std::path::Path;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;

use crate::engine::{Engine, EngineConfig};
use crate::hotkey::{sync_hotkeys, HotkeyDetector};
use crate::logger;
use crate::platform::Platform;
use crate::recorder::{Recorder, RecorderConfig};
use crate::settings::Settings;
use crate::store::{HistoryLog, ScriptStore};
use crate::types::*;

const QUIT_GRACE: Duration = Duration::from_secs(1);

pub struct Runtime {
    pub settings: Settings,
    pub platform: Platform,
    pub engine: Engine,
    pub detector: HotkeyDetector,
    pub recorder: Recorder,
    pub store: Arc<ScriptStore>,
    pub history: Arc<HistoryLog>,
}

impl Runtime {
    /// Build every component. Relative store paths resolve against `base`.
    pub fn new(settings: Settings, base: &Path, platform: Platform) -> Result<Self> {
        let store = Arc::new(ScriptStore::open(&settings.resolve(base, &settings.scripts_file)));
        let history = Arc::new(HistoryLog::open(
            &settings.resolve(base, &settings.history_file),
            settings.max_history,
        ));
        let engine = Engine::new(
            Arc::clone(&platform.driver),
            history.clone(),
            EngineConfig {
                sleep_slice: settings.sleep_slice(),
                press_hold_secs: settings.press_hold_secs,
            },
        );
        let detector = HotkeyDetector::new(
            Arc::clone(&platform.source),
            Arc::clone(&platform.driver),
            engine.clone(),
            settings.position_key.as_deref(),
        )?;
        let recorder = Recorder::new(
            Arc::clone(&platform.source),
            RecorderConfig {
                move_threshold: settings.recorder_move_threshold,
                min_delay: settings.recorder_min_delay_secs,
            },
        );
        Ok(Self { settings, platform, engine, detector, recorder, store, history })
    }

    /// Rebind hotkeys from the store and (re)start the listener.
    pub fn start_listener(&self) -> Result<usize> {
        let bound = sync_hotkeys(&self.store, &self.detector);
        self.detector.start()?;
        Ok(bound)
    }

    pub fn run_script(&self, id: &str) -> Result<ExecuteReply> {
        let script = self.store.get(id).ok_or_else(|| anyhow!("no script with id {}", id))?;
        Ok(self.engine.execute(&script.content, &script.id, &script.name))
    }

    /// Pause a running script or resume a paused one.
    pub fn toggle_pause(&self) -> ControlReply {
        match self.engine.status().status {
            RunState::Running => self.engine.pause(),
            RunState::Paused => self.engine.resume(),
            RunState::Idle => ControlReply::NothingRunning,
        }
    }

    /// Stop recording and save the result as a new script. Nothing is saved
    /// when no input was captured.
    pub fn finish_recording(&self) -> Result<Option<Script>> {
        let captured = self.recorder.status().event_count;
        let text = self.recorder.stop_recording();
        if text.is_empty() || captured == 0 {
            return Ok(None);
        }
        let name = format!("Recording {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        self.store.create(&name, &text, None).map(Some)
    }

    /// Apply one command. Returns false once the app should exit.
    pub fn handle(&self, cmd: Command) -> bool {
        match cmd {
            Command::Run(id) => match self.run_script(&id) {
                Ok(ExecuteReply::Accepted) => {}
                Ok(ExecuteReply::Busy) => logger::warn("engine busy, stop the running script first"),
                Err(e) => logger::error(&format!("{:#}", e)),
            },
            Command::Stop => self.report(self.engine.stop()),
            Command::TogglePause => self.report(self.toggle_pause()),
            Command::ToggleEnabled(id) => {
                let Some(script) = self.store.get(&id) else { return true };
                let patch = ScriptPatch { enabled: Some(!script.enabled), ..ScriptPatch::default() };
                match self.store.update(&id, patch) {
                    Ok(_) => self.resync(),
                    Err(e) => logger::error(&format!("update {}: {:#}", id, e)),
                }
            }
            Command::Delete(id) => match self.store.delete(&id) {
                Ok(true) => self.resync(),
                Ok(false) => logger::warn(&format!("no script with id {}", id)),
                Err(e) => logger::error(&format!("delete {}: {:#}", id, e)),
            },
            Command::ToggleListener => {
                if self.detector.is_running() {
                    self.detector.stop();
                } else if let Err(e) = self.start_listener() {
                    logger::error(&format!("hotkey listener: {:#}", e));
                }
            }
            Command::ToggleRecording => {
                if self.recorder.is_recording() {
                    match self.finish_recording() {
                        Ok(Some(s)) => logger::info(&format!("saved {} as {}", s.name, s.id)),
                        Ok(None) => logger::info("nothing recorded"),
                        Err(e) => logger::error(&format!("saving recording: {:#}", e)),
                    }
                } else if let Err(e) = self.recorder.start_recording() {
                    logger::error(&format!("recorder: {:#}", e));
                }
            }
            Command::ClearHistory => {
                if let Err(e) = self.history.clear() {
                    logger::error(&format!("clearing history: {:#}", e));
                }
            }
            Command::Quit => {
                logger::info("shutting down");
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Serve commands until `Quit` or the sender goes away.
    pub fn serve(&self, cmd_rx: mpsc::Receiver<Command>) {
        for cmd in cmd_rx {
            if !self.handle(cmd) {
                return;
            }
        }
        self.shutdown();
    }

    pub fn shutdown(&self) {
        self.detector.stop();
        if self.recorder.is_recording() {
            self.recorder.stop_recording();
        }
        if self.engine.stop().is_ok() && !self.engine.wait_idle(QUIT_GRACE) {
            logger::warn("script still running at exit");
        }
    }

    fn resync(&self) {
        if self.detector.is_running() {
            sync_hotkeys(&self.store, &self.detector);
        }
    }

    fn report(&self, reply: ControlReply) {
        if !reply.is_ok() {
            logger::warn(reply.message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;
    use crate::platform::stub::Action as Did;
    use crate::platform::InputEvent;
    use std::thread;
    use std::time::Instant;

    fn runtime(dir: &Path) -> (Runtime, Arc<crate::platform::stub::StubPlatform>) {
        let (platform, stub) = Platform::stub();
        let settings = Settings { sleep_slice_ms: 10, ..Settings::default() };
        (Runtime::new(settings, dir, platform).unwrap(), stub)
    }

    fn wait_history(rt: &Runtime, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while rt.history.all().len() < n {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn run_by_id_uses_store_content() {
        let dir = tempfile::tempdir().unwrap();
        let (rt, stub) = runtime(dir.path());
        let s = rt.store.create("hello", "typeText('hello')", None).unwrap();
        assert!(rt.handle(Command::Run(s.id.clone())));
        wait_history(&rt, 1);
        assert_eq!(stub.actions(), vec![Did::Type("hello".into())]);
        assert!(rt.run_script("missing").is_err());
        assert!(dir.path().join("scripts/history.json").is_file());
    }

    #[test]
    fn toggling_enabled_rebinds_hotkeys() {
        let dir = tempfile::tempdir().unwrap();
        let (rt, stub) = runtime(dir.path());
        let s = rt.store.create("hk", "typeText('k')", Some("ctrl+f3")).unwrap();
        assert_eq!(rt.start_listener().unwrap(), 1);
        rt.handle(Command::ToggleEnabled(s.id.clone()));
        assert!(rt.detector.bindings().is_empty());
        stub.emit(InputEvent::KeyDown(Key::Ctrl));
        stub.emit(InputEvent::KeyDown(Key::F(3)));
        thread::sleep(Duration::from_millis(50));
        assert!(rt.history.all().is_empty());
        rt.handle(Command::ToggleEnabled(s.id));
        assert_eq!(rt.detector.bindings().len(), 1);
    }

    #[test]
    fn recording_is_saved_as_script() {
        let dir = tempfile::tempdir().unwrap();
        let (rt, stub) = runtime(dir.path());
        rt.handle(Command::ToggleRecording);
        stub.emit(InputEvent::MouseDown { x: 3, y: 4, button: MouseButton::Right });
        rt.handle(Command::ToggleRecording);
        let scripts = rt.store.all();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].content.contains("click(button='right')"));
        assert!(scripts[0].hotkey.is_none());

        rt.handle(Command::ToggleRecording);
        rt.handle(Command::ToggleRecording);
        assert_eq!(rt.store.all().len(), 1);
    }

    #[test]
    fn toggle_pause_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let (rt, _stub) = runtime(dir.path());
        assert_eq!(rt.toggle_pause(), ControlReply::NothingRunning);
        let s = rt.store.create("long", "sleep(60)", None).unwrap();
        rt.run_script(&s.id).unwrap();
        assert!(rt.toggle_pause().is_ok());
        assert_eq!(rt.engine.status().status, RunState::Paused);
        assert!(rt.toggle_pause().is_ok());
        assert!(!rt.handle(Command::Quit));
        assert!(rt.engine.status().is_idle());
        assert_eq!(rt.history.all()[0].status, Outcome::Stopped);
    }
}

//! Global hotkey detection: tracks held keys and fires registered combos.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};

use crate::dispatch::Dispatcher;
use crate::engine::Engine;
use crate::keys::{canonical_combo, normalize_combo, Key};
use crate::logger;
use crate::platform::{InputDriver, InputEvent, InputSource, Subscription};
use crate::store::ScriptStore;
use crate::types::ExecuteReply;

const DISPATCH_QUEUE: usize = 16;

/// What a combination runs. The body is a snapshot taken at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub script_id: String,
    pub script_name: String,
    pub body: String,
}

struct Inner {
    pressed: Mutex<Vec<String>>,
    bindings: RwLock<HashMap<String, Binding>>,
    position_key: Option<String>,
    engine: Engine,
    driver: Arc<dyn InputDriver>,
    dispatcher: Dispatcher,
}

pub struct HotkeyDetector {
    inner: Arc<Inner>,
    source: Arc<dyn InputSource>,
    subscription: Mutex<Option<Subscription>>,
}

impl HotkeyDetector {
    pub fn new(
        source: Arc<dyn InputSource>,
        driver: Arc<dyn InputDriver>,
        engine: Engine,
        position_key: Option<&str>,
    ) -> Result<Self> {
        logger::register_prefix("hotkey", logger::COLOR_BLUE);
        let position_key = position_key.map(normalize_combo).filter(|k| !k.is_empty());
        Ok(Self {
            inner: Arc::new(Inner {
                pressed: Mutex::new(Vec::new()),
                bindings: RwLock::new(HashMap::new()),
                position_key,
                engine,
                driver,
                dispatcher: Dispatcher::new("hotkey", DISPATCH_QUEUE)?,
            }),
            source,
            subscription: Mutex::new(None),
        })
    }

    pub fn register(&self, combo: &str, script_id: &str, body: &str) {
        self.register_named(combo, script_id, script_id, body);
    }

    /// Like `register`, with a display name for the engine status.
    pub fn register_named(&self, combo: &str, script_id: &str, script_name: &str, body: &str) {
        let combo = normalize_combo(combo);
        if combo.is_empty() {
            logger::warn_p("hotkey", &format!("empty combo for {}, ignored", script_id));
            return;
        }
        let binding = Binding {
            script_id: script_id.to_string(),
            script_name: script_name.to_string(),
            body: body.to_string(),
        };
        if let Some(old) = self.inner.bindings.write().insert(combo.clone(), binding) {
            if old.script_id != script_id {
                logger::warn_p("hotkey", &format!("{} rebound from {} to {}", combo, old.script_id, script_id));
            }
        }
        logger::info_p("hotkey", &format!("registered {} -> {}", combo, script_id));
    }

    pub fn unregister(&self, combo: &str) {
        if self.inner.bindings.write().remove(&normalize_combo(combo)).is_some() {
            logger::info_p("hotkey", &format!("unregistered {}", combo));
        }
    }

    pub fn clear_all(&self) {
        self.inner.bindings.write().clear();
    }

    pub fn bindings(&self) -> Vec<(String, Binding)> {
        let mut all: Vec<_> = self
            .inner
            .bindings
            .read()
            .iter()
            .map(|(c, b)| (c.clone(), b.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Subscribe to key events. A failed subscription leaves the detector stopped.
    pub fn start(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        self.inner.pressed.lock().clear();
        let inner = Arc::clone(&self.inner);
        let sub = self.source.subscribe(Arc::new(move |event: &InputEvent| inner.handle(event)))?;
        *subscription = Some(sub);
        logger::info_p("hotkey", "listener started");
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(sub) = self.subscription.lock().take() {
            sub.unsubscribe();
            logger::info_p("hotkey", "listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Canonical combination of the keys currently held.
    pub fn held(&self) -> String {
        canonical_combo(self.inner.pressed.lock().as_slice())
    }
}

impl Drop for HotkeyDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn handle(&self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown(key) => self.key_down(*key),
            InputEvent::KeyUp(key) => {
                let token = key.hotkey_token();
                self.pressed.lock().retain(|t| *t != token);
            }
            _ => {}
        }
    }

    fn key_down(&self, key: Key) {
        let token = key.hotkey_token();
        let combo = {
            let mut pressed = self.pressed.lock();
            if !pressed.contains(&token) {
                pressed.push(token.clone());
            }
            canonical_combo(pressed.as_slice())
        };

        if self.position_key.as_deref() == Some(token.as_str()) {
            let driver = Arc::clone(&self.driver);
            self.dispatcher.submit(move || match driver.position() {
                Ok((x, y)) => logger::info_p("hotkey", &format!("pointer at ({}, {})", x, y)),
                Err(e) => logger::warn_p("hotkey", &format!("pointer position unavailable: {:#}", e)),
            });
            return;
        }

        let Some(binding) = self.bindings.read().get(&combo).cloned() else {
            return;
        };
        logger::info_p("hotkey", &format!("{} fired {}", combo, binding.script_id));
        let engine = self.engine.clone();
        self.dispatcher.submit(move || {
            if engine.execute(&binding.body, &binding.script_id, &binding.script_name) == ExecuteReply::Busy {
                logger::warn_p("hotkey", &format!("engine busy, {} not started", binding.script_id));
            }
        });
    }
}

/// Rebuild the registry from the store: every enabled script with a hotkey.
pub fn sync_hotkeys(store: &ScriptStore, detector: &HotkeyDetector) -> usize {
    detector.clear_all();
    let scripts = store.enabled_with_hotkey();
    for s in &scripts {
        if let Some(hotkey) = &s.hotkey {
            detector.register_named(hotkey, &s.id, &s.name, &s.content);
        }
    }
    logger::info_p("hotkey", &format!("{} hotkey(s) bound", scripts.len()));
    scripts.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::platform::stub::{Action as Did, StubPlatform};
    use crate::store::HistoryLog;
    use std::thread;
    use std::time::{Duration, Instant};

    struct Rig {
        stub: Arc<StubPlatform>,
        history: Arc<HistoryLog>,
        engine: Engine,
        detector: HotkeyDetector,
    }

    fn rig() -> Rig {
        let stub = Arc::new(StubPlatform::new());
        let history = Arc::new(HistoryLog::in_memory(100));
        let engine = Engine::new(stub.clone(), history.clone(), EngineConfig::default());
        let detector = HotkeyDetector::new(stub.clone(), stub.clone(), engine.clone(), Some("f2")).unwrap();
        Rig { stub, history, engine, detector }
    }

    impl Rig {
        fn tap(&self, keys: &[Key]) {
            for k in keys {
                self.stub.emit(InputEvent::KeyDown(*k));
            }
            for k in keys.iter().rev() {
                self.stub.emit(InputEvent::KeyUp(*k));
            }
        }

        fn runs_after(&self, settle: Duration) -> usize {
            thread::sleep(settle);
            assert!(self.engine.wait_idle(Duration::from_secs(5)));
            self.history.all().len()
        }

        fn wait_runs(&self, n: usize) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.history.all().len() < n {
                assert!(Instant::now() < deadline, "expected {} run(s)", n);
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    #[test]
    fn modifier_order_does_not_matter() {
        let r = rig();
        r.detector.start().unwrap();
        r.stub.emit(InputEvent::KeyDown(Key::ShiftLeft));
        r.stub.emit(InputEvent::KeyDown(Key::CtrlRight));
        r.stub.emit(InputEvent::KeyDown(Key::Char('A')));
        assert_eq!(r.detector.held(), "ctrl+shift+a");
        for k in [Key::Char('A'), Key::CtrlRight, Key::ShiftLeft] {
            r.stub.emit(InputEvent::KeyUp(k));
        }
        r.stub.emit(InputEvent::KeyDown(Key::Ctrl));
        r.stub.emit(InputEvent::KeyDown(Key::Shift));
        r.stub.emit(InputEvent::KeyDown(Key::Char('a')));
        assert_eq!(r.detector.held(), "ctrl+shift+a");
    }

    #[test]
    fn registered_combo_dispatches_once() {
        let r = rig();
        r.detector.register("Ctrl+F1", "s1", "typeText('hi')");
        r.detector.start().unwrap();
        r.tap(&[Key::CtrlLeft, Key::F(1)]);
        r.wait_runs(1);
        assert_eq!(r.runs_after(Duration::from_millis(50)), 1);
        assert_eq!(r.history.all()[0].script_id, "s1");
        assert_eq!(r.stub.actions(), vec![Did::Type("hi".into())]);

        r.detector.clear_all();
        r.tap(&[Key::CtrlLeft, Key::F(1)]);
        assert_eq!(r.runs_after(Duration::from_millis(50)), 1);
    }

    #[test]
    fn released_keys_leave_the_combo() {
        let r = rig();
        r.detector.register("ctrl+f1", "s1", "");
        r.detector.start().unwrap();
        r.stub.emit(InputEvent::KeyDown(Key::Ctrl));
        r.stub.emit(InputEvent::KeyUp(Key::Ctrl));
        r.stub.emit(InputEvent::KeyDown(Key::F(1)));
        assert_eq!(r.detector.held(), "f1");
        assert_eq!(r.runs_after(Duration::from_millis(50)), 0);
    }

    #[test]
    fn last_registration_wins_and_unregister_is_quiet() {
        let r = rig();
        r.detector.register("alt+x", "a", "typeText('a')");
        r.detector.register("X + Option", "b", "typeText('b')");
        assert_eq!(r.detector.bindings().len(), 1);
        r.detector.start().unwrap();
        r.tap(&[Key::AltRight, Key::Char('x')]);
        r.wait_runs(1);
        assert_eq!(r.history.all()[0].script_id, "b");
        r.detector.unregister("alt+x");
        r.detector.unregister("alt+x");
        assert!(r.detector.bindings().is_empty());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let r = rig();
        r.detector.start().unwrap();
        r.detector.start().unwrap();
        assert_eq!(r.stub.subscriber_count(), 1);
        r.detector.stop();
        r.detector.stop();
        assert!(!r.detector.is_running());
        assert_eq!(r.stub.subscriber_count(), 0);
    }

    #[test]
    fn restart_forgets_held_keys() {
        let r = rig();
        r.detector.start().unwrap();
        r.stub.emit(InputEvent::KeyDown(Key::Ctrl));
        r.detector.stop();
        r.detector.start().unwrap();
        assert_eq!(r.detector.held(), "");
    }

    #[test]
    fn subscription_failure_leaves_detector_stopped() {
        let r = rig();
        r.stub.set_refuse_subscribe(true);
        assert!(r.detector.start().is_err());
        assert!(!r.detector.is_running());
    }

    #[test]
    fn position_key_reads_pointer_without_running_scripts() {
        let r = rig();
        r.detector.register("f2", "s", "typeText('no')");
        r.detector.start().unwrap();
        r.tap(&[Key::F(2)]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while r.stub.position_reads() == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(r.runs_after(Duration::from_millis(50)), 0);
    }

    #[test]
    fn sync_binds_enabled_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScriptStore::open(&dir.path().join("scripts.json"));
        store.create("one", "typeText('1')", Some("ctrl+f5")).unwrap();
        store.create("two", "", None).unwrap();
        let r = rig();
        r.detector.register("f9", "stale", "");
        assert_eq!(sync_hotkeys(&store, &r.detector), 1);
        let bound = r.detector.bindings();
        assert_eq!(bound[0].0, "ctrl+f5");
        assert_eq!(bound[0].1.script_name, "one");
    }
}

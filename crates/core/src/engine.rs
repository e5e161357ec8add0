//! Script execution engine: one script at a time, with pause/resume/stop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::{Condvar, Mutex};

use crate::control::Control;
use crate::logger;
use crate::platform::InputDriver;
use crate::script::{self, Interpreter, ScriptError};
use crate::store::HistorySink;
use crate::types::*;

/// Engine tuning, normally taken from `Settings`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sleep_slice: Duration,
    pub press_hold_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sleep_slice: Duration::from_millis(100), press_hold_secs: 0.05 }
    }
}

struct Shared {
    status: Mutex<EngineStatus>,
    idle: Condvar,
    control: Control,
}

/// Runs action scripts against an input driver.
///
/// `execute` hands the body to a dedicated thread and returns at once. The
/// state guard in `status` is the only thing serializing executions; the
/// driver is never locked.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    driver: Arc<dyn InputDriver>,
    history: Arc<dyn HistorySink>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(driver: Arc<dyn InputDriver>, history: Arc<dyn HistorySink>, config: EngineConfig) -> Self {
        logger::register_prefix("engine", logger::COLOR_GREEN);
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(EngineStatus::idle()),
                idle: Condvar::new(),
                control: Control::new(),
            }),
            driver,
            history,
            config,
        }
    }

    /// Start running `body`. Returns `Busy` without side effects unless idle.
    pub fn execute(&self, body: &str, script_id: &str, script_name: &str) -> ExecuteReply {
        {
            let mut status = self.shared.status.lock();
            if !status.is_idle() {
                logger::warn_p(
                    "engine",
                    &format!("busy with {:?}, refusing {}", status.script_id, script_id),
                );
                return ExecuteReply::Busy;
            }
            *status = EngineStatus {
                status: RunState::Running,
                script_id: Some(script_id.to_string()),
                script_name: Some(script_name.to_string()),
                current_line: None,
            };
            self.shared.control.reset();
        }
        logger::info_p("engine", &format!("run {} ({})", script_name, script_id));

        let engine = self.clone();
        let body = body.to_string();
        let id = script_id.to_string();
        let spawned = thread::Builder::new()
            .name("xxscript-exec".into())
            .spawn({
                let id = id.clone();
                move || engine.run(&body, &id)
            });
        if let Err(e) = spawned {
            self.finish(&id, Duration::ZERO, Err(ScriptError::Runtime {
                line: 0,
                msg: format!("could not start execution thread: {}", e),
            }));
        }
        ExecuteReply::Accepted
    }

    /// Raise stop; a paused script is released so it can observe it.
    pub fn stop(&self) -> ControlReply {
        let status = self.shared.status.lock();
        if status.is_idle() {
            return ControlReply::NothingRunning;
        }
        self.shared.control.request_stop();
        logger::info_p("engine", "stop requested");
        ControlReply::Ok
    }

    pub fn pause(&self) -> ControlReply {
        let mut status = self.shared.status.lock();
        if status.status != RunState::Running {
            return ControlReply::NotApplicable;
        }
        status.status = RunState::Paused;
        self.shared.control.pause();
        logger::info_p("engine", "paused");
        ControlReply::Ok
    }

    pub fn resume(&self) -> ControlReply {
        let mut status = self.shared.status.lock();
        if status.status != RunState::Paused || self.shared.control.is_stopped() {
            return ControlReply::NotApplicable;
        }
        status.status = RunState::Running;
        self.shared.control.resume();
        logger::info_p("engine", "resumed");
        ControlReply::Ok
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.status.lock().clone()
    }

    /// Current pointer position, readable in any state.
    pub fn mouse_position(&self) -> anyhow::Result<(i32, i32)> {
        self.driver.position()
    }

    /// Block until the engine is idle or `timeout` elapses. Returns whether it is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.shared.status.lock();
        while !status.is_idle() {
            if self.shared.idle.wait_until(&mut status, deadline).timed_out() {
                return status.is_idle();
            }
        }
        true
    }

    fn run(&self, body: &str, script_id: &str) {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let program = script::parse(body)?;
            let mut interp = Interpreter::new(self.driver.as_ref(), &self.shared.control)
                .with_slice(self.config.sleep_slice)
                .with_press_hold(self.config.press_hold_secs)
                .on_line(|line| self.shared.status.lock().current_line = Some(line));
            interp.run(&program)
        }))
        .unwrap_or_else(|payload| {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(ScriptError::Runtime { line: 0, msg: format!("internal error: {}", msg) })
        });
        self.finish(script_id, started.elapsed(), result);
    }

    /// Single termination path: one history record, then back to idle.
    fn finish(&self, script_id: &str, elapsed: Duration, result: Result<(), ScriptError>) {
        let (outcome, error) = match result {
            Ok(()) => (Outcome::Success, None),
            Err(ScriptError::Stopped) => (Outcome::Stopped, None),
            Err(e) => (Outcome::Error, Some(e.to_string())),
        };
        let duration = (elapsed.as_secs_f64() * 1000.0).round() / 1000.0;
        match &error {
            Some(e) => logger::error_p("engine", &format!("{} failed after {:.3}s: {}", script_id, duration, e)),
            None => logger::info_p("engine", &format!("{} {:?} after {:.3}s", script_id, outcome, duration)),
        }
        let record = HistoryRecord {
            script_id: script_id.to_string(),
            timestamp: Local::now().to_rfc3339(),
            status: outcome,
            duration,
            error,
        };
        if let Err(e) = self.history.append(record) {
            logger::error_p("engine", &format!("history append failed: {:#}", e));
        }

        let mut status = self.shared.status.lock();
        *status = EngineStatus::idle();
        self.shared.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::{Action as Did, StubPlatform};
    use crate::store::HistoryLog;
    use rand::Rng;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup() -> (Engine, Arc<StubPlatform>, Arc<HistoryLog>) {
        let stub = Arc::new(StubPlatform::new());
        let history = Arc::new(HistoryLog::in_memory(100));
        let config = EngineConfig { sleep_slice: Duration::from_millis(20), press_hold_secs: 0.0 };
        let engine = Engine::new(stub.clone(), history.clone(), config);
        (engine, stub, history)
    }

    fn wait_for(engine: &Engine, state: RunState) {
        let deadline = Instant::now() + WAIT;
        while engine.status().status != state {
            assert!(Instant::now() < deadline, "never reached {:?}", state);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn successful_run_records_history() {
        let (engine, stub, history) = setup();
        assert_eq!(engine.execute("move(5, 6)\nclick()", "s1", "first"), ExecuteReply::Accepted);
        assert!(engine.wait_idle(WAIT));
        let records = history.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].script_id, "s1");
        assert_eq!(records[0].status, Outcome::Success);
        assert_eq!(records[0].error, None);
        assert_eq!(stub.actions().len(), 2);
        assert_eq!(engine.status(), EngineStatus::idle());
    }

    #[test]
    fn second_execute_while_busy_is_refused() {
        let (engine, stub, history) = setup();
        engine.execute("sleep(0.3)\ntypeText('a')", "long", "long");
        assert_eq!(engine.execute("typeText('b')", "other", "other"), ExecuteReply::Busy);
        assert_eq!(engine.status().script_id.as_deref(), Some("long"));
        assert!(engine.wait_idle(WAIT));
        assert_eq!(stub.actions(), vec![Did::Type("a".into())]);
        assert_eq!(history.all().len(), 1);
    }

    #[test]
    fn runtime_error_is_recorded() {
        let (engine, _stub, history) = setup();
        engine.execute("move(1, 1)\nexplode()", "bad", "bad");
        assert!(engine.wait_idle(WAIT));
        let rec = &history.all()[0];
        assert_eq!(rec.status, Outcome::Error);
        assert!(rec.error.as_deref().unwrap().contains("explode"));
    }

    #[test]
    fn syntax_error_runs_nothing() {
        let (engine, stub, history) = setup();
        engine.execute("move(1, 1)\nclick(", "bad", "bad");
        assert!(engine.wait_idle(WAIT));
        assert!(stub.actions().is_empty());
        assert_eq!(history.all()[0].status, Outcome::Error);
    }

    #[test]
    fn deeply_nested_body_is_an_error() {
        let (engine, stub, history) = setup();
        let body = format!("move(1, 1)\na = {}1{}", "-(".repeat(200_000), ")".repeat(200_000));
        engine.execute(&body, "deep", "deep");
        assert!(engine.wait_idle(WAIT));
        let rec = &history.all()[0];
        assert_eq!(rec.status, Outcome::Error);
        assert!(rec.error.as_deref().unwrap().contains("nested too deeply"));
        assert!(stub.actions().is_empty());
    }

    struct PanickingDriver;

    impl InputDriver for PanickingDriver {
        fn move_to(&self, _: i32, _: i32) -> anyhow::Result<()> {
            panic!("driver blew up")
        }
        fn button_down(&self, _: MouseButton) -> anyhow::Result<()> {
            Ok(())
        }
        fn button_up(&self, _: MouseButton) -> anyhow::Result<()> {
            Ok(())
        }
        fn click(&self, _: MouseButton, _: u32) -> anyhow::Result<()> {
            Ok(())
        }
        fn scroll(&self, _: i32, _: i32) -> anyhow::Result<()> {
            Ok(())
        }
        fn key_down(&self, _: crate::keys::Key) -> anyhow::Result<()> {
            Ok(())
        }
        fn key_up(&self, _: crate::keys::Key) -> anyhow::Result<()> {
            Ok(())
        }
        fn type_text(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn position(&self) -> anyhow::Result<(i32, i32)> {
            Ok((0, 0))
        }
    }

    #[test]
    fn driver_panic_ends_in_error_and_idle() {
        let history = Arc::new(HistoryLog::in_memory(10));
        let engine = Engine::new(Arc::new(PanickingDriver), history.clone(), EngineConfig::default());
        assert_eq!(engine.execute("typeText('a')\nmove(1, 2)", "boom", "boom"), ExecuteReply::Accepted);
        assert!(engine.wait_idle(WAIT));
        assert_eq!(engine.status(), EngineStatus::idle());
        let records = history.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Outcome::Error);
        assert!(records[0].error.as_deref().unwrap().contains("driver blew up"));

        assert_eq!(engine.execute("typeText('b')", "after", "after"), ExecuteReply::Accepted);
        assert!(engine.wait_idle(WAIT));
        assert_eq!(history.all()[1].status, Outcome::Success);
    }

    #[test]
    fn controls_on_idle_engine_are_warnings() {
        let (engine, _stub, history) = setup();
        assert_eq!(engine.stop(), ControlReply::NothingRunning);
        assert_eq!(engine.pause(), ControlReply::NotApplicable);
        assert_eq!(engine.resume(), ControlReply::NotApplicable);
        assert!(history.all().is_empty());
    }

    #[test]
    fn resume_only_from_paused() {
        let (engine, _stub, _history) = setup();
        engine.execute("sleep(10)", "s", "s");
        assert_eq!(engine.resume(), ControlReply::NotApplicable);
        assert_eq!(engine.pause(), ControlReply::Ok);
        assert_eq!(engine.pause(), ControlReply::NotApplicable);
        assert_eq!(engine.status().status, RunState::Paused);
        assert_eq!(engine.resume(), ControlReply::Ok);
        assert_eq!(engine.stop(), ControlReply::Ok);
        assert!(engine.wait_idle(WAIT));
    }

    #[test]
    fn stop_while_paused_terminates_promptly() {
        let (engine, _stub, history) = setup();
        engine.execute("sleep(3600)", "s", "s");
        thread::sleep(Duration::from_millis(30));
        assert!(engine.pause().is_ok());
        thread::sleep(Duration::from_millis(30));
        let t = Instant::now();
        assert!(engine.stop().is_ok());
        assert!(engine.wait_idle(Duration::from_millis(150)));
        assert!(t.elapsed() <= Duration::from_millis(150));
        let rec = &history.all()[0];
        assert_eq!(rec.status, Outcome::Stopped);
        assert_eq!(rec.error, None);
    }

    #[test]
    fn pause_holds_later_actions_until_resume() {
        let (engine, stub, _history) = setup();
        engine.execute("typeText('before')\nsleep(0.1)\ntypeText('after')", "s", "s");
        // let the first action land, then pause inside the sleep
        let deadline = Instant::now() + WAIT;
        while stub.actions().is_empty() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(engine.pause().is_ok());
        thread::sleep(Duration::from_millis(250));
        assert_eq!(stub.actions(), vec![Did::Type("before".into())]);
        assert!(engine.resume().is_ok());
        assert!(engine.wait_idle(WAIT));
        assert_eq!(stub.actions(), vec![Did::Type("before".into()), Did::Type("after".into())]);
    }

    #[test]
    fn position_query_works_while_paused() {
        let (engine, stub, _history) = setup();
        stub.set_pointer(7, 8);
        engine.execute("sleep(5)", "s", "s");
        engine.pause();
        assert_eq!(engine.mouse_position().unwrap(), (7, 8));
        engine.stop();
        assert!(engine.wait_idle(WAIT));
    }

    #[test]
    fn current_line_tracks_progress() {
        let (engine, _stub, _history) = setup();
        engine.execute("typeText('x')\n\nsleep(5)", "s", "named");
        wait_for(&engine, RunState::Running);
        let deadline = Instant::now() + WAIT;
        while engine.status().current_line != Some(3) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(engine.status().script_name.as_deref(), Some("named"));
        engine.stop();
        assert!(engine.wait_idle(WAIT));
        assert_eq!(engine.status().current_line, None);
    }

    #[test]
    fn random_control_sequences_keep_one_execution() {
        let (engine, _stub, history) = setup();
        let mut rng = rand::thread_rng();
        let mut accepted = 0;
        for _ in 0..200 {
            match rng.gen_range(0..5) {
                0 => {
                    if engine.execute("sleep(0.01)", "r", "r") == ExecuteReply::Accepted {
                        accepted += 1;
                    }
                }
                1 => {
                    engine.stop();
                }
                2 => {
                    engine.pause();
                }
                3 => {
                    engine.resume();
                }
                _ => thread::sleep(Duration::from_millis(rng.gen_range(0..5))),
            }
            let s = engine.status();
            assert_eq!(s.status == RunState::Idle, s.script_id.is_none());
        }
        engine.stop();
        assert!(engine.wait_idle(WAIT));
        assert_eq!(history.all().len(), accepted);
    }
}

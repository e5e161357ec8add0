use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use libtest_mimic::{Arguments, Failed, Trial};

use xxscript_core::keys::Key;
use xxscript_core::platform::stub::Action;
use xxscript_core::platform::InputEvent;
use xxscript_core::types::{ExecuteReply, MouseButton, Outcome, RunState};
use xxscript_test::{ensure_eq, Rig, WAIT};

fn record_then_replay() -> Result<()> {
    let rig = Rig::new()?;
    rig.runtime.recorder.start_recording()?;
    rig.stub.emit(InputEvent::MouseMove { x: 50, y: 60 });
    rig.stub.emit(InputEvent::MouseDown { x: 50, y: 60, button: MouseButton::Left });
    rig.stub.emit(InputEvent::MouseUp { x: 50, y: 60, button: MouseButton::Left });
    let script = rig.runtime.finish_recording()?.ok_or_else(|| anyhow::anyhow!("nothing saved"))?;
    ensure!(script.content.contains("click(button='left')"), "{}", script.content);

    rig.stub.set_pointer(300, 400);
    rig.stub.clear_actions();
    ensure_eq!(rig.runtime.run_script(&script.id)?, ExecuteReply::Accepted);
    let history = rig.wait_history(1)?;
    ensure_eq!(history[0].status, Outcome::Success);
    let clicks: Vec<_> = rig
        .stub
        .actions()
        .into_iter()
        .filter(|a| matches!(a, Action::Click { .. }))
        .collect();
    ensure_eq!(clicks, vec![Action::Click { button: MouseButton::Left, count: 1, at: (50, 60) }]);
    Ok(())
}

fn hotkey_drives_engine() -> Result<()> {
    let rig = Rig::new()?;
    rig.runtime.store.create("greet", "typeText('hi')", Some("Ctrl+F1"))?;
    ensure_eq!(rig.runtime.start_listener()?, 1);
    rig.stub.emit(InputEvent::KeyDown(Key::CtrlLeft));
    rig.stub.emit(InputEvent::KeyDown(Key::F(1)));
    rig.stub.emit(InputEvent::KeyUp(Key::F(1)));
    rig.stub.emit(InputEvent::KeyUp(Key::CtrlLeft));
    let history = rig.wait_history(1)?;
    ensure_eq!(history[0].status, Outcome::Success);

    rig.runtime.detector.clear_all();
    rig.stub.emit(InputEvent::KeyDown(Key::CtrlLeft));
    rig.stub.emit(InputEvent::KeyDown(Key::F(1)));
    thread::sleep(Duration::from_millis(100));
    ensure!(rig.runtime.engine.wait_idle(WAIT));
    ensure_eq!(rig.runtime.history.all().len(), 1);
    ensure_eq!(rig.stub.actions(), vec![Action::Type("hi".into())]);
    Ok(())
}

fn stop_while_paused() -> Result<()> {
    let rig = Rig::new()?;
    let engine = &rig.runtime.engine;
    ensure_eq!(engine.execute("move(1, 1)\nsleep(3600)\nmove(2, 2)", "s", "long"), ExecuteReply::Accepted);
    ensure_eq!(engine.execute("move(9, 9)", "t", "other"), ExecuteReply::Busy);
    thread::sleep(Duration::from_millis(40));
    ensure!(engine.pause().is_ok());
    ensure_eq!(engine.status().status, RunState::Paused);
    thread::sleep(Duration::from_millis(40));

    let t = Instant::now();
    ensure!(engine.stop().is_ok());
    ensure!(engine.wait_idle(Duration::from_millis(150)), "still {:?}", engine.status());
    ensure!(t.elapsed() <= Duration::from_millis(150));
    let history = rig.runtime.history.all();
    ensure_eq!(history.len(), 1);
    ensure_eq!(history[0].status, Outcome::Stopped);
    ensure_eq!(rig.stub.actions(), vec![Action::Move(1, 1)]);
    Ok(())
}

fn driver_failure_is_skipped() -> Result<()> {
    let rig = Rig::new()?;
    rig.stub.set_failing(true);
    rig.runtime.engine.execute("press('nosuchkey')\nclick()", "s", "s");
    let history = rig.wait_history(1)?;
    ensure_eq!(history[0].status, Outcome::Success);
    ensure!(rig.stub.actions().is_empty());
    Ok(())
}

fn trial(name: &'static str, f: fn() -> Result<()>) -> Trial {
    Trial::test(name, move || f().map_err(|e| Failed::from(format!("{:#}", e))))
}

fn main() {
    let args = Arguments::from_args();
    let trials = vec![
        trial("record_then_replay", record_then_replay),
        trial("hotkey_drives_engine", hotkey_drives_engine),
        trial("stop_while_paused", stop_while_paused),
        trial("driver_failure_is_skipped", driver_failure_is_skipped),
    ];
    libtest_mimic::run(&args, trials).exit();
}

use std::io;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use xxscript_core::platform::create_platform;
use xxscript_core::runtime::Runtime;
use xxscript_core::settings::Settings;
use xxscript_core::types::{Command, ExecuteReply};
use xxscript_core::logger;

enum Mode {
    Tui,
    Run(String),
    Record(f64),
}

struct Args {
    force_stub: bool,
    mode: Mode,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut force_stub = false;
    let mut mode = Mode::Tui;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stub" => force_stub = true,
            "--run" => mode = Mode::Run(args.next().context("--run needs a script id")?),
            "--record" => {
                let secs = args.next().context("--record needs a number of seconds")?;
                mode = Mode::Record(secs.parse().with_context(|| format!("bad duration '{}'", secs))?);
            }
            other => bail!("unknown argument '{}' (expected --stub, --run <id>, --record <secs>)", other),
        }
    }
    Ok(Args { force_stub, mode })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    logger::init(&cwd.join("logs"))?;

    let settings_path = cwd.join("settings.json");
    let settings = Settings::load(&settings_path);
    if !settings_path.exists() {
        settings.save(&settings_path).ok();
    }
    let listen = settings.listen_on_start;

    let runtime = Arc::new(Runtime::new(settings, &cwd, create_platform(args.force_stub))?);
    logger::info(&format!("loaded {} script(s)", runtime.store.all().len()));

    match args.mode {
        Mode::Run(id) => run_once(&runtime, &id),
        Mode::Record(secs) => record_once(&runtime, secs),
        Mode::Tui => run_tui(runtime, listen),
    }
}

/// Headless: run one stored script to completion and print its record.
fn run_once(runtime: &Runtime, id: &str) -> Result<()> {
    if runtime.run_script(id)? == ExecuteReply::Busy {
        bail!("engine busy");
    }
    while !runtime.engine.wait_idle(Duration::from_secs(1)) {}
    if let Some(record) = runtime.history.all().last() {
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}

/// Headless: record for `secs` seconds and save the result as a script.
fn record_once(runtime: &Runtime, secs: f64) -> Result<()> {
    runtime.recorder.start_recording()?;
    eprintln!("recording for {:.1}s...", secs);
    thread::sleep(Duration::from_secs_f64(secs.max(0.0)));
    match runtime.finish_recording()? {
        Some(script) => println!("saved {} ({})\n{}", script.name, script.id, script.content),
        None => println!("nothing recorded"),
    }
    Ok(())
}

fn run_tui(runtime: Arc<Runtime>, listen: bool) -> Result<()> {
    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

    logger::set_tui_sender(log_tx);
    logger::info("xxscript started");

    if listen {
        if let Err(e) = runtime.start_listener() {
            logger::error(&format!("hotkey listener: {:#}", e));
        }
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = xxscript_tui::App::new(Arc::clone(&runtime), log_rx, cmd_tx);

    let serving = Arc::clone(&runtime);
    let server = thread::spawn(move || serving.serve(cmd_rx));

    let result = xxscript_tui::event::run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    drop(app);
    server.join().ok();
    result
}

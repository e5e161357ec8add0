//! Records live input and turns it into a runnable script.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use parking_lot::Mutex;

use crate::keys::Key;
use crate::logger;
use crate::platform::{InputEvent, InputSource, Subscription};
use crate::types::{MouseButton, RecorderStatus};

/// One captured input, stamped relative to the start of recording.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Move { x: i32, y: i32, at: Duration },
    Click { x: i32, y: i32, button: MouseButton, at: Duration },
    Key { key: Key, at: Duration },
}

impl RecordedEvent {
    pub fn at(&self) -> Duration {
        match self {
            Self::Move { at, .. } | Self::Click { at, .. } | Self::Key { at, .. } => *at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Moves closer than this on both axes to the last logged move are merged into it.
    pub move_threshold: i32,
    /// Gaps at or below this many seconds produce no `sleep`.
    pub min_delay: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { move_threshold: 10, min_delay: 0.05 }
    }
}

/// Chronological event log with move coalescing.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<RecordedEvent>,
    move_threshold: i32,
}

impl EventLog {
    pub fn new(move_threshold: i32) -> Self {
        Self { events: Vec::new(), move_threshold }
    }

    pub fn push(&mut self, event: RecordedEvent) {
        if let RecordedEvent::Move { x, y, at } = event {
            if let Some(RecordedEvent::Move { x: lx, y: ly, at: lat }) = self.events.last_mut() {
                if (*lx - x).abs() < self.move_threshold && (*ly - y).abs() < self.move_threshold {
                    *lx = x;
                    *ly = y;
                    *lat = at;
                    return;
                }
            }
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<RecordedEvent> {
        std::mem::take(&mut self.events)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render events as script text. An empty log yields a comment-only body.
pub fn synthesize(events: &[RecordedEvent], min_delay: f64, recorded_at: &str) -> String {
    if events.is_empty() {
        return "# No input was recorded\n".to_string();
    }
    let mut lines = vec![
        "# Recorded script".to_string(),
        format!("# Recorded at: {}", recorded_at),
        String::new(),
    ];
    let mut last = Duration::ZERO;
    for event in events {
        let gap = event.at().saturating_sub(last).as_secs_f64();
        if gap > min_delay {
            lines.push(format!("sleep({:.2})", gap));
        }
        lines.push(match event {
            RecordedEvent::Move { x, y, .. } => format!("move({}, {})", x, y),
            RecordedEvent::Click { button, .. } => format!("click(button='{}')", button.name()),
            RecordedEvent::Key { key: Key::Char(c), .. } if !c.is_control() => {
                format!("typeText({})", quote(&c.to_string()))
            }
            RecordedEvent::Key { key, .. } => format!("press({})", quote(&key.token())),
        });
        last = event.at();
    }
    lines.join("\n")
}

struct Session {
    recording: bool,
    started: Instant,
    log: EventLog,
}

impl Session {
    fn capture(&mut self, event: &InputEvent) {
        if !self.recording {
            return;
        }
        let at = self.started.elapsed();
        match *event {
            InputEvent::MouseMove { x, y } => self.log.push(RecordedEvent::Move { x, y, at }),
            InputEvent::MouseDown { x, y, button } => self.log.push(RecordedEvent::Click { x, y, button, at }),
            InputEvent::KeyDown(key) => self.log.push(RecordedEvent::Key { key, at }),
            InputEvent::MouseUp { .. } | InputEvent::KeyUp(_) => {}
        }
    }
}

pub struct Recorder {
    source: Arc<dyn InputSource>,
    config: RecorderConfig,
    session: Arc<Mutex<Session>>,
    subscription: Mutex<Option<Subscription>>,
}

impl Recorder {
    pub fn new(source: Arc<dyn InputSource>, config: RecorderConfig) -> Self {
        logger::register_prefix("recorder", logger::COLOR_MAGENTA);
        let session = Session {
            recording: false,
            started: Instant::now(),
            log: EventLog::new(config.move_threshold),
        };
        Self { source, config, session: Arc::new(Mutex::new(session)), subscription: Mutex::new(None) }
    }

    /// Arm the recorder. A no-op while already recording.
    pub fn start_recording(&self) -> Result<()> {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        {
            let mut session = self.session.lock();
            session.log = EventLog::new(self.config.move_threshold);
            session.started = Instant::now();
            session.recording = true;
        }
        let session = Arc::clone(&self.session);
        match self.source.subscribe(Arc::new(move |event: &InputEvent| session.lock().capture(event))) {
            Ok(sub) => {
                *subscription = Some(sub);
                logger::info_p("recorder", "recording started");
                Ok(())
            }
            Err(e) => {
                self.session.lock().recording = false;
                logger::error_p("recorder", &format!("cannot record: {:#}", e));
                Err(e)
            }
        }
    }

    /// Disarm and return the synthesized script, or an empty string if not recording.
    pub fn stop_recording(&self) -> String {
        let Some(sub) = self.subscription.lock().take() else {
            return String::new();
        };
        sub.unsubscribe();
        let events = {
            let mut session = self.session.lock();
            session.recording = false;
            session.log.take()
        };
        logger::info_p("recorder", &format!("recording stopped, {} event(s)", events.len()));
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        synthesize(&events, self.config.min_delay, &stamp)
    }

    pub fn status(&self) -> RecorderStatus {
        let session = self.session.lock();
        RecorderStatus {
            recording: session.recording,
            event_count: session.log.len(),
            duration: if session.recording { session.started.elapsed().as_secs_f64() } else { 0.0 },
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().recording
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.lock().take() {
            sub.unsubscribe();
        }
    }
}

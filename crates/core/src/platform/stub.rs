use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::keys::Key;
use crate::logger;
use crate::types::MouseButton;
use super::{InputCallback, InputDriver, InputEvent, InputSource, Subscription};

/// One call that reached the stub driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move(i32, i32),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    Click { button: MouseButton, count: u32, at: (i32, i32) },
    Scroll(i32, i32),
    KeyDown(Key),
    KeyUp(Key),
    Type(String),
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    list: Vec<(u64, InputCallback)>,
}

/// In-process platform: logs every call, keeps a virtual pointer, and lets
/// callers inject input events synchronously.
pub struct StubPlatform {
    pointer: Mutex<(i32, i32)>,
    actions: Mutex<Vec<Action>>,
    subscribers: Arc<Mutex<Subscribers>>,
    failing: AtomicBool,
    refuse_subscribe: AtomicBool,
    position_reads: AtomicU64,
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl StubPlatform {
    pub fn new() -> Self {
        Self {
            pointer: Mutex::new((0, 0)),
            actions: Mutex::new(Vec::new()),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            failing: AtomicBool::new(false),
            refuse_subscribe: AtomicBool::new(false),
            position_reads: AtomicU64::new(0),
        }
    }

    /// Everything injected so far, in order.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().clone()
    }

    pub fn clear_actions(&self) {
        self.actions.lock().clear();
    }

    /// Make every injection call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `subscribe` fail, as a missing input permission would.
    pub fn set_refuse_subscribe(&self, refuse: bool) {
        self.refuse_subscribe.store(refuse, Ordering::SeqCst);
    }

    pub fn set_pointer(&self, x: i32, y: i32) {
        *self.pointer.lock() = (x, y);
    }

    pub fn position_reads(&self) -> u64 {
        self.position_reads.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().list.len()
    }

    /// Deliver an event to every subscriber on the calling thread.
    pub fn emit(&self, event: InputEvent) {
        if let InputEvent::MouseMove { x, y }
        | InputEvent::MouseDown { x, y, .. }
        | InputEvent::MouseUp { x, y, .. } = event
        {
            self.set_pointer(x, y);
        }
        // snapshot so callbacks may (un)subscribe without deadlocking
        let callbacks: Vec<InputCallback> =
            self.subscribers.lock().list.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in callbacks {
            cb(&event);
        }
    }

    fn record(&self, action: Action) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            logger::warn_p("stub", &format!("refusing {:?}", action));
            bail!("stub driver refused {:?}", action);
        }
        logger::info_p("stub", &format!("{:?}", action));
        self.actions.lock().push(action);
        Ok(())
    }
}

impl InputDriver for StubPlatform {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.record(Action::Move(x, y))?;
        self.set_pointer(x, y);
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        self.record(Action::ButtonDown(button))
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        self.record(Action::ButtonUp(button))
    }

    fn click(&self, button: MouseButton, count: u32) -> Result<()> {
        let at = *self.pointer.lock();
        self.record(Action::Click { button, count, at })
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        self.record(Action::Scroll(dx, dy))
    }

    fn key_down(&self, key: Key) -> Result<()> {
        self.record(Action::KeyDown(key))
    }

    fn key_up(&self, key: Key) -> Result<()> {
        self.record(Action::KeyUp(key))
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.record(Action::Type(text.to_string()))
    }

    fn position(&self) -> Result<(i32, i32)> {
        self.position_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.pointer.lock())
    }
}

impl InputSource for StubPlatform {
    fn subscribe(&self, callback: InputCallback) -> Result<Subscription> {
        if self.refuse_subscribe.load(Ordering::SeqCst) {
            bail!("input monitoring not permitted");
        }
        let id = {
            let mut subs = self.subscribers.lock();
            subs.next_id += 1;
            let id = subs.next_id;
            subs.list.push((id, callback));
            id
        };
        logger::info_p("stub", &format!("subscribe #{}", id));
        let subscribers = Arc::clone(&self.subscribers);
        Ok(Subscription::new(move || {
            subscribers.lock().list.retain(|(sid, _)| *sid != id);
            logger::info_p("stub", &format!("unsubscribe #{}", id));
        }))
    }
}

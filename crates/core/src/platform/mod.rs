pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

use std::sync::Arc;

use anyhow::Result;

use crate::keys::Key;
use crate::logger;
use crate::types::MouseButton;

/// Injects input and reads the pointer. Calls are synchronous and short.
pub trait InputDriver: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> Result<()>;
    fn button_down(&self, button: MouseButton) -> Result<()>;
    fn button_up(&self, button: MouseButton) -> Result<()>;
    fn click(&self, button: MouseButton, count: u32) -> Result<()>;
    fn scroll(&self, dx: i32, dy: i32) -> Result<()>;
    fn key_down(&self, key: Key) -> Result<()>;
    fn key_up(&self, key: Key) -> Result<()>;
    fn type_text(&self, text: &str) -> Result<()>;
    fn position(&self) -> Result<(i32, i32)>;
}

/// Raw global input notification.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MouseMove { x: i32, y: i32 },
    MouseDown { x: i32, y: i32, button: MouseButton },
    MouseUp { x: i32, y: i32, button: MouseButton },
}

/// Called on the platform's event thread; must not block.
pub type InputCallback = Arc<dyn Fn(&InputEvent) + Send + Sync>;

/// Source of global input notifications.
pub trait InputSource: Send + Sync {
    fn subscribe(&self, callback: InputCallback) -> Result<Subscription>;
}

/// Live subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

/// Driver and event source of one platform.
#[derive(Clone)]
pub struct Platform {
    pub driver: Arc<dyn InputDriver>,
    pub source: Arc<dyn InputSource>,
}

impl Platform {
    pub fn stub() -> (Self, Arc<stub::StubPlatform>) {
        let stub = Arc::new(stub::StubPlatform::new());
        let platform = Self {
            driver: Arc::clone(&stub) as Arc<dyn InputDriver>,
            source: Arc::clone(&stub) as Arc<dyn InputSource>,
        };
        (platform, stub)
    }
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Platform {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Platform::stub().0;
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        let darwin = Arc::new(darwin::DarwinPlatform::new());
        Platform {
            driver: Arc::clone(&darwin) as Arc<dyn InputDriver>,
            source: darwin as Arc<dyn InputSource>,
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("no native input backend on this OS, using stub");
        Platform::stub().0
    }
}

use std::ffi::c_void;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use core_foundation::base::TCFType;
use core_foundation::mach_port::CFMachPort;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGKeyCode, CGMouseButton, EventField,
    ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;

use crate::keys::Key;
use crate::logger;
use crate::types::MouseButton;
use super::{InputCallback, InputDriver, InputEvent, InputSource, Subscription};

// ANSI layout virtual key codes
const KEY_CODES: &[(CGKeyCode, Key)] = &[
    (36, Key::Enter),
    (53, Key::Esc),
    (48, Key::Tab),
    (49, Key::Space),
    (51, Key::Backspace),
    (117, Key::Delete),
    (126, Key::Up),
    (125, Key::Down),
    (123, Key::Left),
    (124, Key::Right),
    (115, Key::Home),
    (119, Key::End),
    (116, Key::PageUp),
    (121, Key::PageDown),
    (114, Key::Insert),
    (57, Key::CapsLock),
    (59, Key::CtrlLeft),
    (62, Key::CtrlRight),
    (56, Key::ShiftLeft),
    (60, Key::ShiftRight),
    (58, Key::AltLeft),
    (61, Key::AltRight),
    (55, Key::CmdLeft),
    (54, Key::CmdRight),
    (122, Key::F(1)),
    (120, Key::F(2)),
    (99, Key::F(3)),
    (118, Key::F(4)),
    (96, Key::F(5)),
    (97, Key::F(6)),
    (98, Key::F(7)),
    (100, Key::F(8)),
    (101, Key::F(9)),
    (109, Key::F(10)),
    (103, Key::F(11)),
    (111, Key::F(12)),
    (105, Key::F(13)),
    (107, Key::F(14)),
    (113, Key::F(15)),
    (106, Key::F(16)),
    (64, Key::F(17)),
    (79, Key::F(18)),
    (80, Key::F(19)),
    (90, Key::F(20)),
];

const CHAR_CODES: &[(CGKeyCode, char)] = &[
    (0, 'a'), (11, 'b'), (8, 'c'), (2, 'd'), (14, 'e'), (3, 'f'), (5, 'g'), (4, 'h'),
    (34, 'i'), (38, 'j'), (40, 'k'), (37, 'l'), (46, 'm'), (45, 'n'), (31, 'o'), (35, 'p'),
    (12, 'q'), (15, 'r'), (1, 's'), (17, 't'), (32, 'u'), (9, 'v'), (13, 'w'), (7, 'x'),
    (16, 'y'), (6, 'z'), (29, '0'), (18, '1'), (19, '2'), (20, '3'), (21, '4'), (23, '5'),
    (22, '6'), (26, '7'), (28, '8'), (25, '9'), (27, '-'), (24, '='), (33, '['), (30, ']'),
    (42, '\\'), (41, ';'), (39, '\''), (43, ','), (47, '.'), (44, '/'), (50, '`'),
];

fn code_for(key: Key) -> Option<(CGKeyCode, bool)> {
    let key = match key {
        Key::Ctrl => Key::CtrlLeft,
        Key::Shift => Key::ShiftLeft,
        Key::Alt => Key::AltLeft,
        Key::Cmd => Key::CmdLeft,
        other => other,
    };
    if let Key::Char(c) = key {
        let lower = c.to_ascii_lowercase();
        return CHAR_CODES
            .iter()
            .find(|(_, ch)| *ch == lower)
            .map(|(code, _)| (*code, c.is_ascii_uppercase()));
    }
    KEY_CODES.iter().find(|(_, k)| *k == key).map(|(code, _)| (*code, false))
}

fn key_for(code: CGKeyCode) -> Option<Key> {
    KEY_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, k)| *k)
        .or_else(|| CHAR_CODES.iter().find(|(c, _)| *c == code).map(|(_, ch)| Key::Char(*ch)))
}

/// Flag bit that is set while a modifier key is held.
fn modifier_flag(key: Key) -> Option<u64> {
    match key {
        Key::CtrlLeft | Key::CtrlRight => Some(0x0004_0000),
        Key::ShiftLeft | Key::ShiftRight => Some(0x0002_0000),
        Key::AltLeft | Key::AltRight => Some(0x0008_0000),
        Key::CmdLeft | Key::CmdRight => Some(0x0010_0000),
        Key::CapsLock => Some(0x0001_0000),
        _ => None,
    }
}

pub struct DarwinPlatform;

impl Default for DarwinPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl DarwinPlatform {
    pub fn new() -> Self {
        DarwinPlatform
    }

    fn source(&self) -> Result<CGEventSource> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| anyhow!("cannot create event source"))
    }

    fn post_mouse(&self, kind: CGEventType, button: CGMouseButton, clicks: i64) -> Result<()> {
        let at = self.location()?;
        let event = CGEvent::new_mouse_event(self.source()?, kind, at, button)
            .map_err(|_| anyhow!("cannot create mouse event"))?;
        if clicks > 0 {
            event.set_integer_value_field(EventField::MOUSE_EVENT_CLICK_STATE, clicks);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn post_key(&self, key: Key, down: bool) -> Result<()> {
        let (code, shifted) = code_for(key).with_context(|| format!("no key code for '{}'", key))?;
        let event = CGEvent::new_keyboard_event(self.source()?, code, down)
            .map_err(|_| anyhow!("cannot create key event"))?;
        if shifted {
            event.set_flags(CGEventFlags::CGEventFlagShift);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn location(&self) -> Result<CGPoint> {
        let event = CGEvent::new(self.source()?).map_err(|_| anyhow!("cannot read pointer"))?;
        Ok(event.location())
    }
}

fn button_events(button: MouseButton) -> (CGEventType, CGEventType, CGMouseButton) {
    match button {
        MouseButton::Left => (CGEventType::LeftMouseDown, CGEventType::LeftMouseUp, CGMouseButton::Left),
        MouseButton::Right => (CGEventType::RightMouseDown, CGEventType::RightMouseUp, CGMouseButton::Right),
        MouseButton::Middle => (CGEventType::OtherMouseDown, CGEventType::OtherMouseUp, CGMouseButton::Center),
    }
}

impl InputDriver for DarwinPlatform {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        let point = CGPoint::new(x as f64, y as f64);
        let event = CGEvent::new_mouse_event(self.source()?, CGEventType::MouseMoved, point, CGMouseButton::Left)
            .map_err(|_| anyhow!("cannot create move event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> Result<()> {
        let (down, _, b) = button_events(button);
        self.post_mouse(down, b, 0)
    }

    fn button_up(&self, button: MouseButton) -> Result<()> {
        let (_, up, b) = button_events(button);
        self.post_mouse(up, b, 0)
    }

    fn click(&self, button: MouseButton, count: u32) -> Result<()> {
        let (down, up, b) = button_events(button);
        for n in 1..=count as i64 {
            self.post_mouse(down, b, n)?;
            self.post_mouse(up, b, n)?;
        }
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        let event = CGEvent::new_scroll_event(self.source()?, ScrollEventUnit::LINE, 2, dy, dx, 0)
            .map_err(|_| anyhow!("cannot create scroll event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn key_down(&self, key: Key) -> Result<()> {
        self.post_key(key, true)
    }

    fn key_up(&self, key: Key) -> Result<()> {
        self.post_key(key, false)
    }

    fn type_text(&self, text: &str) -> Result<()> {
        let source = self.source()?;
        for ch in text.chars() {
            let s = ch.to_string();
            for down in [true, false] {
                let event = CGEvent::new_keyboard_event(source.clone(), 0, down)
                    .map_err(|_| anyhow!("cannot create key event"))?;
                event.set_string(&s);
                event.post(CGEventTapLocation::HID);
            }
        }
        Ok(())
    }

    fn position(&self) -> Result<(i32, i32)> {
        let p = self.location()?;
        Ok((p.x.round() as i32, p.y.round() as i32))
    }
}

// --- global event tap ---

type CGEventTapProxy = *mut c_void;
type CGEventRef = *mut c_void;
type CFMachPortRef = *mut c_void;
type CGEventMask = u64;
type RawEventType = u32;

type CGEventTapCallBack =
    unsafe extern "C" fn(CGEventTapProxy, RawEventType, CGEventRef, *mut c_void) -> CGEventRef;

const K_CG_HID_EVENT_TAP: u32 = 0;
const K_CG_HEAD_INSERT_EVENT_TAP: u32 = 0;
const K_CG_EVENT_TAP_OPTION_LISTEN_ONLY: u32 = 1;
const K_CG_KEYBOARD_EVENT_KEYCODE: u32 = 9;

const EV_LEFT_DOWN: u32 = 1;
const EV_LEFT_UP: u32 = 2;
const EV_RIGHT_DOWN: u32 = 3;
const EV_RIGHT_UP: u32 = 4;
const EV_MOVED: u32 = 5;
const EV_LEFT_DRAGGED: u32 = 6;
const EV_RIGHT_DRAGGED: u32 = 7;
const EV_KEY_DOWN: u32 = 10;
const EV_KEY_UP: u32 = 11;
const EV_FLAGS_CHANGED: u32 = 12;
const EV_OTHER_DOWN: u32 = 25;
const EV_OTHER_UP: u32 = 26;
const EV_OTHER_DRAGGED: u32 = 27;
const EV_TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
const EV_TAP_DISABLED_BY_USER: u32 = 0xFFFF_FFFF;

extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: CGEventMask,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventGetFlags(event: CGEventRef) -> u64;
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetLocation(event: CGEventRef) -> CGPoint;
}

struct TapContext {
    callback: InputCallback,
    tap: CFMachPortRef,
}

/// Run loop handle handed back to the subscribing thread.
struct RunLoop(CFRunLoop);

// CFRunLoopStop may be called from any thread.
unsafe impl Send for RunLoop {}

fn translate(kind: RawEventType, event: CGEventRef) -> Option<InputEvent> {
    let at = || {
        let p = unsafe { CGEventGetLocation(event) };
        (p.x.round() as i32, p.y.round() as i32)
    };
    let button = |b| {
        let (x, y) = at();
        (x, y, b)
    };
    match kind {
        EV_KEY_DOWN | EV_KEY_UP | EV_FLAGS_CHANGED => {
            let code = unsafe { CGEventGetIntegerValueField(event, K_CG_KEYBOARD_EVENT_KEYCODE) };
            let key = key_for(code as CGKeyCode)?;
            Some(match kind {
                EV_KEY_DOWN => InputEvent::KeyDown(key),
                EV_KEY_UP => InputEvent::KeyUp(key),
                _ => {
                    let flags = unsafe { CGEventGetFlags(event) };
                    if flags & modifier_flag(key)? != 0 {
                        InputEvent::KeyDown(key)
                    } else {
                        InputEvent::KeyUp(key)
                    }
                }
            })
        }
        EV_MOVED | EV_LEFT_DRAGGED | EV_RIGHT_DRAGGED | EV_OTHER_DRAGGED => {
            let (x, y) = at();
            Some(InputEvent::MouseMove { x, y })
        }
        EV_LEFT_DOWN | EV_RIGHT_DOWN | EV_OTHER_DOWN => {
            let (x, y, button) = button(match kind {
                EV_LEFT_DOWN => MouseButton::Left,
                EV_RIGHT_DOWN => MouseButton::Right,
                _ => MouseButton::Middle,
            });
            Some(InputEvent::MouseDown { x, y, button })
        }
        EV_LEFT_UP | EV_RIGHT_UP | EV_OTHER_UP => {
            let (x, y, button) = button(match kind {
                EV_LEFT_UP => MouseButton::Left,
                EV_RIGHT_UP => MouseButton::Right,
                _ => MouseButton::Middle,
            });
            Some(InputEvent::MouseUp { x, y, button })
        }
        _ => None,
    }
}

unsafe extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    kind: RawEventType,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    let ctx = unsafe { &*(user_info as *const TapContext) };
    if kind == EV_TAP_DISABLED_BY_TIMEOUT || kind == EV_TAP_DISABLED_BY_USER {
        unsafe { CGEventTapEnable(ctx.tap, true) };
        return event;
    }
    if let Some(ev) = translate(kind, event) {
        (ctx.callback)(&ev);
    }
    event
}

fn event_mask() -> CGEventMask {
    [
        EV_LEFT_DOWN, EV_LEFT_UP, EV_RIGHT_DOWN, EV_RIGHT_UP, EV_MOVED, EV_LEFT_DRAGGED,
        EV_RIGHT_DRAGGED, EV_KEY_DOWN, EV_KEY_UP, EV_FLAGS_CHANGED, EV_OTHER_DOWN, EV_OTHER_UP,
        EV_OTHER_DRAGGED,
    ]
    .iter()
    .fold(0, |mask, ev| mask | (1u64 << ev))
}

impl InputSource for DarwinPlatform {
    fn subscribe(&self, callback: InputCallback) -> Result<Subscription> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<RunLoop>>();
        let handle = thread::Builder::new()
            .name("xxscript-event-tap".into())
            .spawn(move || unsafe {
                let ctx = Box::into_raw(Box::new(TapContext { callback, tap: std::ptr::null_mut() }));
                let tap = CGEventTapCreate(
                    K_CG_HID_EVENT_TAP,
                    K_CG_HEAD_INSERT_EVENT_TAP,
                    K_CG_EVENT_TAP_OPTION_LISTEN_ONLY,
                    event_mask(),
                    tap_callback,
                    ctx as *mut c_void,
                );
                if tap.is_null() {
                    drop(Box::from_raw(ctx));
                    ready_tx
                        .send(Err(anyhow!(
                            "failed to create event tap, grant Input Monitoring / Accessibility permission to your terminal"
                        )))
                        .ok();
                    return;
                }
                (*ctx).tap = tap;
                let port = CFMachPort::wrap_under_create_rule(tap as _);
                let Ok(source) = port.create_runloop_source(0) else {
                    drop(port);
                    drop(Box::from_raw(ctx));
                    ready_tx.send(Err(anyhow!("cannot create run loop source for event tap"))).ok();
                    return;
                };
                let run_loop = CFRunLoop::get_current();
                run_loop.add_source(&source, kCFRunLoopCommonModes);
                CGEventTapEnable(tap, true);
                ready_tx.send(Ok(RunLoop(run_loop.clone()))).ok();

                CFRunLoop::run_current();

                CGEventTapEnable(tap, false);
                run_loop.remove_source(&source, kCFRunLoopCommonModes);
                drop(source);
                drop(port);
                drop(Box::from_raw(ctx));
            })
            .context("spawning event tap thread")?;

        let run_loop = match ready_rx.recv() {
            Ok(Ok(rl)) => rl,
            Ok(Err(e)) => {
                handle.join().ok();
                logger::error_p("darwin", &format!("{:#}", e));
                return Err(e);
            }
            Err(_) => bail!("event tap thread exited early"),
        };
        logger::info_p("darwin", "event tap installed");
        Ok(Subscription::new(move || {
            run_loop.0.stop();
            handle.join().ok();
            logger::info_p("darwin", "event tap removed");
        }))
    }
}

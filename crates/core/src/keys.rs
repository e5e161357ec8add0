//! Key identities and their canonical text tokens.
//!
//! Platforms report physical keys (left/right modifier variants included);
//! everything above the platform layer talks in tokens: `ctrl`, `shift`,
//! `alt`, `cmd`, `f1`..`f24`, `enter`, single characters, and so on.

use std::fmt;

use regex::Regex;
use std::sync::OnceLock;

/// Modifier tokens in canonical combination order.
pub const MODIFIER_ORDER: [&str; 3] = ["ctrl", "shift", "alt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Ctrl,
    CtrlLeft,
    CtrlRight,
    Shift,
    ShiftLeft,
    ShiftRight,
    Alt,
    AltLeft,
    AltRight,
    Cmd,
    CmdLeft,
    CmdRight,
    Enter,
    Esc,
    Tab,
    Space,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    CapsLock,
    F(u8),
    Char(char),
}

impl Key {
    /// Parse a key name as a script or hotkey would write it.
    ///
    /// Single characters map to `Char` with case preserved; names are
    /// case-insensitive and accept the left/right variant spellings.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(Self::Char(c));
        }
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => Self::Ctrl,
            "ctrl_l" | "lctrl" => Self::CtrlLeft,
            "ctrl_r" | "rctrl" => Self::CtrlRight,
            "shift" => Self::Shift,
            "shift_l" | "lshift" => Self::ShiftLeft,
            "shift_r" | "rshift" => Self::ShiftRight,
            "alt" | "option" => Self::Alt,
            "alt_l" | "lalt" => Self::AltLeft,
            "alt_r" | "ralt" | "alt_gr" => Self::AltRight,
            "cmd" | "command" | "meta" | "super" | "win" => Self::Cmd,
            "cmd_l" => Self::CmdLeft,
            "cmd_r" => Self::CmdRight,
            "enter" | "return" => Self::Enter,
            "esc" | "escape" => Self::Esc,
            "tab" => Self::Tab,
            "space" => Self::Space,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "page_up" | "pageup" => Self::PageUp,
            "page_down" | "pagedown" => Self::PageDown,
            "insert" => Self::Insert,
            "caps_lock" | "capslock" => Self::CapsLock,
            other => {
                let n: u8 = other.strip_prefix('f')?.parse().ok()?;
                if !(1..=24).contains(&n) {
                    return None;
                }
                Self::F(n)
            }
        };
        Some(key)
    }

    /// Canonical token. Modifier variants collapse to one token each.
    pub fn token(self) -> String {
        match self {
            Self::Ctrl | Self::CtrlLeft | Self::CtrlRight => "ctrl".into(),
            Self::Shift | Self::ShiftLeft | Self::ShiftRight => "shift".into(),
            Self::Alt | Self::AltLeft | Self::AltRight => "alt".into(),
            Self::Cmd | Self::CmdLeft | Self::CmdRight => "cmd".into(),
            Self::Enter => "enter".into(),
            Self::Esc => "esc".into(),
            Self::Tab => "tab".into(),
            Self::Space => "space".into(),
            Self::Backspace => "backspace".into(),
            Self::Delete => "delete".into(),
            Self::Up => "up".into(),
            Self::Down => "down".into(),
            Self::Left => "left".into(),
            Self::Right => "right".into(),
            Self::Home => "home".into(),
            Self::End => "end".into(),
            Self::PageUp => "page_up".into(),
            Self::PageDown => "page_down".into(),
            Self::Insert => "insert".into(),
            Self::CapsLock => "caps_lock".into(),
            Self::F(n) => format!("f{}", n),
            Self::Char(c) => c.to_string(),
        }
    }

    /// Token used for hotkey matching: like `token` but characters lowercased.
    pub fn hotkey_token(self) -> String {
        match self {
            Self::Char(c) => c.to_lowercase().collect(),
            other => other.token(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Build the canonical combination string for a set of held tokens.
///
/// Modifiers come first in `ctrl, shift, alt` order, then every other token
/// in the order given.
pub fn canonical_combo<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(tokens.len());
    for m in MODIFIER_ORDER {
        if tokens.iter().any(|t| t.as_ref() == m) {
            parts.push(m);
        }
    }
    for t in tokens {
        let t = t.as_ref();
        if !MODIFIER_ORDER.contains(&t) && !parts.contains(&t) {
            parts.push(t);
        }
    }
    parts.join("+")
}

fn combo_separator() -> &'static Regex {
    static SEP: OnceLock<Regex> = OnceLock::new();
    SEP.get_or_init(|| Regex::new(r"\s*\+\s*").expect("static regex"))
}

/// Normalize a user-written combination such as `"Shift + Ctrl+A"` into
/// canonical form (`"ctrl+shift+a"`). Unknown key names are kept lowercased.
pub fn normalize_combo(combo: &str) -> String {
    let tokens: Vec<String> = combo_separator()
        .split(combo.trim())
        .filter(|part| !part.is_empty())
        .map(|part| match Key::parse(part) {
            Some(key) => key.hotkey_token(),
            None => part.to_lowercase(),
        })
        .collect();
    canonical_combo(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_variants_share_a_token() {
        assert_eq!(Key::CtrlLeft.token(), Key::CtrlRight.token());
        assert_eq!(Key::ShiftRight.token(), "shift");
        assert_eq!(Key::AltLeft.token(), "alt");
    }

    #[test]
    fn parse_names_and_chars() {
        assert_eq!(Key::parse("F1"), Some(Key::F(1)));
        assert_eq!(Key::parse("f24"), Some(Key::F(24)));
        assert_eq!(Key::parse("f25"), None);
        assert_eq!(Key::parse("Enter"), Some(Key::Enter));
        assert_eq!(Key::parse("ctrl_l"), Some(Key::CtrlLeft));
        assert_eq!(Key::parse("A"), Some(Key::Char('A')));
        assert_eq!(Key::parse("nonsense"), None);
    }

    #[test]
    fn combo_orders_modifiers_first() {
        assert_eq!(canonical_combo(&["shift", "ctrl", "a"]), "ctrl+shift+a");
        assert_eq!(canonical_combo(&["a", "alt"]), "alt+a");
        assert_eq!(canonical_combo::<&str>(&[]), "");
    }

    #[test]
    fn normalize_user_combos() {
        assert_eq!(normalize_combo("Ctrl+F1"), "ctrl+f1");
        assert_eq!(normalize_combo("Shift + Control + A"), "ctrl+shift+a");
        assert_eq!(normalize_combo("alt_r+x"), "alt+x");
    }
}

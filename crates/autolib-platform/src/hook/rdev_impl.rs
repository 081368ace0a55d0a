//! Linux key hook built on rdev's global listener.
//!
//! rdev reports neither modifier state nor autorepeat, so both are
//! synthesized here: a running modifier bitmask updated on modifier
//! presses/releases, and a held-key set that marks repeated presses.
//!
//! rdev's `listen` cannot be cancelled once running. Stopping the hook
//! flips an atomic flag that makes the callback drop everything; the
//! listener thread itself stays parked inside rdev until process exit.

use super::now_ms;
use autolib_core::linux::{
    FLAG_ALT, FLAG_CAPSLOCK, FLAG_CTRL, FLAG_META, FLAG_SHIFT, KEY_CAPSLOCK, KEY_LEFT_ALT,
    KEY_LEFT_CTRL, KEY_LEFT_META, KEY_LEFT_SHIFT, KEY_RIGHT_ALT, KEY_RIGHT_CTRL, KEY_RIGHT_META,
    KEY_RIGHT_SHIFT,
};
use autolib_core::{HookError, KeyEvent, KeyEventKind, KeyHook};
use crossbeam_channel::{bounded, Sender};
use rdev::{Event, EventType, Key};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn install(events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError> {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    let (ready_tx, ready_rx) = bounded::<HookError>(1);

    thread::Builder::new()
        .name("autolib-rdev".into())
        .spawn(move || {
            let mut state = ListenerState::new(events, flag);
            if let Err(err) = rdev::listen(move |event| state.on_event(event)) {
                let _ = ready_tx.send(HookError::Install(format!(
                    "rdev listener failed: {err:?}"
                )));
            }
        })
        .map_err(|err| HookError::Install(format!("could not spawn listener thread: {err}")))?;

    // listen() never returns on success, so a quiet handshake window is the
    // only way to observe an immediate setup failure.
    match ready_rx.recv_timeout(Duration::from_millis(250)) {
        Ok(err) => Err(err),
        Err(_) => Ok(Box::new(RdevHook { stopped })),
    }
}

struct RdevHook {
    stopped: Arc<AtomicBool>,
}

impl KeyHook for RdevHook {
    fn stop(self: Box<Self>) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

struct ListenerState {
    events: Sender<KeyEvent>,
    stopped: Arc<AtomicBool>,
    modifier_flags: u64,
    held: HashSet<u16>,
}

impl ListenerState {
    fn new(events: Sender<KeyEvent>, stopped: Arc<AtomicBool>) -> Self {
        Self {
            events,
            stopped,
            modifier_flags: 0,
            held: HashSet::new(),
        }
    }

    fn on_event(&mut self, event: Event) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        match event.event_type {
            EventType::KeyPress(key) => self.on_key(key, true),
            EventType::KeyRelease(key) => self.on_key(key, false),
            // Pointer events are not part of the key stream.
            _ => {}
        }
    }

    fn on_key(&mut self, key: Key, pressed: bool) {
        let Some(code) = key_to_code(key) else {
            return;
        };
        let timestamp_ms = now_ms();

        if let Some(flag) = modifier_flag(code) {
            if pressed {
                self.modifier_flags |= flag;
            } else {
                self.modifier_flags &= !flag;
            }
            self.emit(KeyEventKind::FlagsChanged, code, timestamp_ms, false);
            return;
        }

        if pressed {
            let is_repeat = !self.held.insert(code);
            self.emit(KeyEventKind::Down, code, timestamp_ms, is_repeat);
        } else {
            self.held.remove(&code);
            self.emit(KeyEventKind::Up, code, timestamp_ms, false);
        }
    }

    fn emit(&self, kind: KeyEventKind, key_code: u16, timestamp_ms: u64, is_repeat: bool) {
        let event = KeyEvent {
            kind,
            key_code,
            flags: self.modifier_flags,
            timestamp_ms,
            is_repeat,
        };
        if self.events.try_send(event).is_err() {
            tracing::warn!(key_code, "key event dropped, consumer not keeping up");
        }
    }
}

fn modifier_flag(code: u16) -> Option<u64> {
    match code {
        KEY_LEFT_SHIFT | KEY_RIGHT_SHIFT => Some(FLAG_SHIFT),
        KEY_LEFT_CTRL | KEY_RIGHT_CTRL => Some(FLAG_CTRL),
        KEY_LEFT_ALT | KEY_RIGHT_ALT => Some(FLAG_ALT),
        KEY_LEFT_META | KEY_RIGHT_META => Some(FLAG_META),
        KEY_CAPSLOCK => Some(FLAG_CAPSLOCK),
        _ => None,
    }
}

/// rdev key -> Linux input-event code.
fn key_to_code(key: Key) -> Option<u16> {
    let code = match key {
        Key::Escape => 1,
        Key::Num1 => 2,
        Key::Num2 => 3,
        Key::Num3 => 4,
        Key::Num4 => 5,
        Key::Num5 => 6,
        Key::Num6 => 7,
        Key::Num7 => 8,
        Key::Num8 => 9,
        Key::Num9 => 10,
        Key::Num0 => 11,
        Key::Minus => 12,
        Key::Equal => 13,
        Key::Backspace => 14,
        Key::Tab => 15,
        Key::KeyQ => 16,
        Key::KeyW => 17,
        Key::KeyE => 18,
        Key::KeyR => 19,
        Key::KeyT => 20,
        Key::KeyY => 21,
        Key::KeyU => 22,
        Key::KeyI => 23,
        Key::KeyO => 24,
        Key::KeyP => 25,
        Key::LeftBracket => 26,
        Key::RightBracket => 27,
        Key::Return => 28,
        Key::ControlLeft => KEY_LEFT_CTRL,
        Key::KeyA => 30,
        Key::KeyS => 31,
        Key::KeyD => 32,
        Key::KeyF => 33,
        Key::KeyG => 34,
        Key::KeyH => 35,
        Key::KeyJ => 36,
        Key::KeyK => 37,
        Key::KeyL => 38,
        Key::SemiColon => 39,
        Key::Quote => 40,
        Key::BackQuote => 41,
        Key::ShiftLeft => KEY_LEFT_SHIFT,
        Key::BackSlash => 43,
        Key::KeyZ => 44,
        Key::KeyX => 45,
        Key::KeyC => 46,
        Key::KeyV => 47,
        Key::KeyB => 48,
        Key::KeyN => 49,
        Key::KeyM => 50,
        Key::Comma => 51,
        Key::Dot => 52,
        Key::Slash => 53,
        Key::ShiftRight => KEY_RIGHT_SHIFT,
        Key::KpMultiply => 55,
        Key::Alt => KEY_LEFT_ALT,
        Key::Space => 57,
        Key::CapsLock => KEY_CAPSLOCK,
        Key::F1 => 59,
        Key::F2 => 60,
        Key::F3 => 61,
        Key::F4 => 62,
        Key::F5 => 63,
        Key::F6 => 64,
        Key::F7 => 65,
        Key::F8 => 66,
        Key::F9 => 67,
        Key::F10 => 68,
        Key::NumLock => 69,
        Key::ScrollLock => 70,
        Key::Kp7 => 71,
        Key::Kp8 => 72,
        Key::Kp9 => 73,
        Key::KpMinus => 74,
        Key::Kp4 => 75,
        Key::Kp5 => 76,
        Key::Kp6 => 77,
        Key::KpPlus => 78,
        Key::Kp1 => 79,
        Key::Kp2 => 80,
        Key::Kp3 => 81,
        Key::Kp0 => 82,
        Key::KpDelete => 83,
        Key::F11 => 87,
        Key::F12 => 88,
        Key::KpReturn => 96,
        Key::ControlRight => KEY_RIGHT_CTRL,
        Key::KpDivide => 98,
        Key::PrintScreen => 99,
        Key::AltGr => KEY_RIGHT_ALT,
        Key::Home => 102,
        Key::UpArrow => 103,
        Key::PageUp => 104,
        Key::LeftArrow => 105,
        Key::RightArrow => 106,
        Key::End => 107,
        Key::DownArrow => 108,
        Key::PageDown => 109,
        Key::Insert => 110,
        Key::Delete => 111,
        Key::Pause => 119,
        Key::MetaLeft => KEY_LEFT_META,
        Key::MetaRight => KEY_RIGHT_META,
        Key::Function => return None,
        Key::IntlBackslash => 86,
        Key::Unknown(raw) => u16::try_from(raw).ok()?,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    fn listener() -> (ListenerState, Receiver<KeyEvent>) {
        let (tx, rx) = bounded(16);
        let state = ListenerState::new(tx, Arc::new(AtomicBool::new(false)));
        (state, rx)
    }

    #[test]
    fn test_caps_lock_sets_flag_on_down_and_clears_on_up() {
        let (mut state, rx) = listener();

        state.on_key(Key::CapsLock, true);
        let down = rx.try_recv().unwrap();
        assert_eq!(down.kind, KeyEventKind::FlagsChanged);
        assert_eq!(down.flags & FLAG_CAPSLOCK, FLAG_CAPSLOCK);

        state.on_key(Key::CapsLock, false);
        let up = rx.try_recv().unwrap();
        assert_eq!(up.kind, KeyEventKind::FlagsChanged);
        assert_eq!(up.flags & FLAG_CAPSLOCK, 0);
    }

    #[test]
    fn test_modifier_keys_emit_flags_changed_with_running_mask() {
        let (mut state, rx) = listener();

        state.on_key(Key::ShiftLeft, true);
        let shift = rx.try_recv().unwrap();
        assert_eq!(shift.kind, KeyEventKind::FlagsChanged);
        assert_eq!(shift.key_code, KEY_LEFT_SHIFT);
        assert_eq!(shift.flags, FLAG_SHIFT);

        // A regular key carries the active modifier mask.
        state.on_key(Key::KeyA, true);
        let a = rx.try_recv().unwrap();
        assert_eq!(a.kind, KeyEventKind::Down);
        assert_eq!(a.flags, FLAG_SHIFT);

        state.on_key(Key::ShiftLeft, false);
        let released = rx.try_recv().unwrap();
        assert_eq!(released.flags, 0);
    }

    #[test]
    fn test_held_key_marks_repeat() {
        let (mut state, rx) = listener();

        state.on_key(Key::KeyA, true);
        assert!(!rx.try_recv().unwrap().is_repeat);
        state.on_key(Key::KeyA, true);
        assert!(rx.try_recv().unwrap().is_repeat);
        state.on_key(Key::KeyA, false);
        assert_eq!(rx.try_recv().unwrap().kind, KeyEventKind::Up);
        state.on_key(Key::KeyA, true);
        assert!(!rx.try_recv().unwrap().is_repeat);
    }
}

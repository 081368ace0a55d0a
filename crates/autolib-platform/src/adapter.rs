//! The platform adapter: one normalized interface over the per-OS
//! primitives, implemented once per target OS.

use crate::{process, selection, window};
use autolib_core::{CapabilityError, CapabilityResult};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use crate::window::WindowInfo;
use std::sync::Mutex;
use tracing::debug;

/// Modifier keys that can accompany an injected key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Control,
    Shift,
    Alt,
    Meta,
}

impl Modifier {
    fn to_enigo(self) -> Key {
        match self {
            Modifier::Control => Key::Control,
            Modifier::Shift => Key::Shift,
            Modifier::Alt => Key::Alt,
            Modifier::Meta => Key::Meta,
        }
    }
}

/// Mouse buttons supported for injected clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn to_enigo(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }
}

/// Per-OS primitive operations behind identical signatures.
///
/// All OS-specific failures are mapped to the common error kinds here, at
/// the adapter boundary; callers never see raw OS codes.
pub trait PlatformAdapter: Send + Sync {
    /// Synthesize a press+release of `key_code` (a native platform code)
    /// with the given modifiers applied. Returns once the OS has accepted
    /// the synthetic event.
    fn send_key(&self, key_code: u16, modifiers: &[Modifier]) -> CapabilityResult<()>;

    /// Convenience for the most common combo.
    fn send_ctrl_key(&self, key_code: u16) -> CapabilityResult<()> {
        self.send_key(key_code, &[Modifier::Control])
    }

    fn mouse_click(&self, x: i32, y: i32, button: MouseButton) -> CapabilityResult<()>;

    fn foremost_window(&self) -> CapabilityResult<WindowInfo>;

    fn foremost_pid(&self) -> CapabilityResult<u32>;

    fn activate_window(&self, handle: usize) -> CapabilityResult<()>;

    fn product_name(&self, pid: u32) -> CapabilityResult<String>;

    /// Application icon as image bytes (ICO on Windows).
    fn application_icon(&self, pid: u32) -> CapabilityResult<Vec<u8>>;

    /// Active selection via the OS accessibility API. Empty string when
    /// nothing is selected.
    fn selected_text(&self) -> CapabilityResult<String>;
}

/// Real adapter: injection via `enigo`, queries via the per-OS modules.
pub struct NativeAdapter {
    enigo: Mutex<Enigo>,
}

impl NativeAdapter {
    /// Initialize the native backend. Failure here means the capability
    /// layer is unavailable for the process lifetime.
    pub fn new() -> CapabilityResult<Self> {
        let settings = Settings::default();
        let enigo = Enigo::new(&settings).map_err(|_| CapabilityError::NotLoaded)?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }
}

/// Press the modifiers, click the key, release the modifiers in reverse.
///
/// Every modifier that was actually pressed gets a release attempt on every
/// exit path, including failures mid-press and failures of an earlier
/// release, so no modifier is left stuck down. The first error wins.
fn press_click_release<F>(key: Key, modifiers: &[Modifier], mut apply: F) -> CapabilityResult<()>
where
    F: FnMut(Key, Direction) -> CapabilityResult<()>,
{
    let mut pressed = Vec::with_capacity(modifiers.len());
    let mut first_error = None;

    for modifier in modifiers {
        match apply(modifier.to_enigo(), Direction::Press) {
            Ok(()) => pressed.push(modifier.to_enigo()),
            Err(err) => {
                first_error = Some(err);
                break;
            }
        }
    }
    if first_error.is_none() {
        first_error = apply(key, Direction::Click).err();
    }
    for modifier in pressed.into_iter().rev() {
        if let Err(err) = apply(modifier, Direction::Release) {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl PlatformAdapter for NativeAdapter {
    fn send_key(&self, key_code: u16, modifiers: &[Modifier]) -> CapabilityResult<()> {
        debug!(key_code, ?modifiers, "injecting key");
        let mut enigo = self.enigo.lock().unwrap();
        press_click_release(Key::Other(key_code as u32), modifiers, |key, direction| {
            enigo
                .key(key, direction)
                .map_err(|e| CapabilityError::Injection(e.to_string()))
        })
    }

    fn mouse_click(&self, x: i32, y: i32, button: MouseButton) -> CapabilityResult<()> {
        debug!(x, y, ?button, "injecting click");
        let mut enigo = self.enigo.lock().unwrap();
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| CapabilityError::Injection(e.to_string()))?;
        enigo
            .button(button.to_enigo(), Direction::Click)
            .map_err(|e| CapabilityError::Injection(e.to_string()))
    }

    fn foremost_window(&self) -> CapabilityResult<WindowInfo> {
        window::foremost_window()
    }

    fn foremost_pid(&self) -> CapabilityResult<u32> {
        window::foremost_pid()
    }

    fn activate_window(&self, handle: usize) -> CapabilityResult<()> {
        window::activate_window(handle)
    }

    fn product_name(&self, pid: u32) -> CapabilityResult<String> {
        process::product_name(pid)
    }

    fn application_icon(&self, pid: u32) -> CapabilityResult<Vec<u8>> {
        process::application_icon(pid)
    }

    fn selected_text(&self) -> CapabilityResult<String> {
        selection::selected_text()
    }
}

/// No-op adapter for early development and tests. Injection succeeds
/// without touching the OS; queries fail because there is no window state
/// to report.
pub struct NoopAdapter;

impl PlatformAdapter for NoopAdapter {
    fn send_key(&self, key_code: u16, modifiers: &[Modifier]) -> CapabilityResult<()> {
        debug!(key_code, ?modifiers, "NoopAdapter: would inject key");
        Ok(())
    }

    fn mouse_click(&self, x: i32, y: i32, button: MouseButton) -> CapabilityResult<()> {
        debug!(x, y, ?button, "NoopAdapter: would inject click");
        Ok(())
    }

    fn foremost_window(&self) -> CapabilityResult<WindowInfo> {
        Err(CapabilityError::Query("noop adapter has no window state".into()))
    }

    fn foremost_pid(&self) -> CapabilityResult<u32> {
        Err(CapabilityError::Query("noop adapter has no window state".into()))
    }

    fn activate_window(&self, _handle: usize) -> CapabilityResult<()> {
        Ok(())
    }

    fn product_name(&self, _pid: u32) -> CapabilityResult<String> {
        Err(CapabilityError::Query("noop adapter has no process state".into()))
    }

    fn application_icon(&self, _pid: u32) -> CapabilityResult<Vec<u8>> {
        Err(CapabilityError::Query("noop adapter has no process state".into()))
    }

    fn selected_text(&self) -> CapabilityResult<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_ctrl_key_default_delegates_to_send_key() {
        struct Recorder(Mutex<Vec<(u16, Vec<Modifier>)>>);
        impl PlatformAdapter for Recorder {
            fn send_key(&self, key_code: u16, modifiers: &[Modifier]) -> CapabilityResult<()> {
                self.0.lock().unwrap().push((key_code, modifiers.to_vec()));
                Ok(())
            }
            fn mouse_click(&self, _: i32, _: i32, _: MouseButton) -> CapabilityResult<()> {
                Ok(())
            }
            fn foremost_window(&self) -> CapabilityResult<WindowInfo> {
                unreachable!()
            }
            fn foremost_pid(&self) -> CapabilityResult<u32> {
                unreachable!()
            }
            fn activate_window(&self, _: usize) -> CapabilityResult<()> {
                unreachable!()
            }
            fn product_name(&self, _: u32) -> CapabilityResult<String> {
                unreachable!()
            }
            fn application_icon(&self, _: u32) -> CapabilityResult<Vec<u8>> {
                unreachable!()
            }
            fn selected_text(&self) -> CapabilityResult<String> {
                unreachable!()
            }
        }

        let recorder = Recorder(Mutex::new(Vec::new()));
        recorder.send_ctrl_key(0x43).unwrap();
        let calls = recorder.0.lock().unwrap();
        assert_eq!(*calls, vec![(0x43, vec![Modifier::Control])]);
    }

    #[test]
    fn test_failed_modifier_press_releases_prior_modifiers() {
        let mut calls = Vec::new();
        let result = press_click_release(
            Key::Other(40),
            &[Modifier::Control, Modifier::Shift],
            |key, direction| {
                calls.push((key, direction));
                if key == Key::Shift && direction == Direction::Press {
                    return Err(CapabilityError::Injection("shift rejected".into()));
                }
                Ok(())
            },
        );
        assert!(matches!(result, Err(CapabilityError::Injection(_))));
        // Control was pressed, so it must be released; the key itself is
        // never clicked.
        assert_eq!(
            calls,
            vec![
                (Key::Control, Direction::Press),
                (Key::Shift, Direction::Press),
                (Key::Control, Direction::Release),
            ]
        );
    }

    #[test]
    fn test_modifiers_released_in_reverse_when_click_fails() {
        let mut calls = Vec::new();
        let result = press_click_release(
            Key::Other(40),
            &[Modifier::Control, Modifier::Shift],
            |key, direction| {
                calls.push((key, direction));
                if key == Key::Other(40) {
                    return Err(CapabilityError::Injection("no focused target".into()));
                }
                Ok(())
            },
        );
        assert!(matches!(result, Err(CapabilityError::Injection(_))));
        assert_eq!(
            calls,
            vec![
                (Key::Control, Direction::Press),
                (Key::Shift, Direction::Press),
                (Key::Other(40), Direction::Click),
                (Key::Shift, Direction::Release),
                (Key::Control, Direction::Release),
            ]
        );
    }

    #[test]
    fn test_release_error_does_not_skip_remaining_releases() {
        let mut calls = Vec::new();
        let result = press_click_release(
            Key::Other(40),
            &[Modifier::Control, Modifier::Shift],
            |key, direction| {
                calls.push((key, direction));
                if key == Key::Shift && direction == Direction::Release {
                    return Err(CapabilityError::Injection("release rejected".into()));
                }
                Ok(())
            },
        );
        assert!(matches!(result, Err(CapabilityError::Injection(_))));
        assert_eq!(
            *calls.last().unwrap(),
            (Key::Control, Direction::Release)
        );
    }

    #[test]
    fn test_noop_adapter_injection_succeeds() {
        let adapter = NoopAdapter;
        adapter.send_key(54, &[Modifier::Meta]).unwrap();
        adapter.mouse_click(10, 10, MouseButton::Left).unwrap();
        assert!(adapter.foremost_window().is_err());
    }
}

//! Canonical key event record delivered by the monitor.
//!
//! Key codes are NOT remapped to a universal code space: each hook backend
//! reports the native code of its platform (macOS virtual key codes, Windows
//! virtual-key codes, Linux input-event codes). Only the event *shape* is
//! normalized. Cross-platform code mapping is the host's job.

use serde::{Deserialize, Serialize};

/// What kind of key notification this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    /// Regular key pressed.
    #[serde(rename = "down")]
    Down,
    /// Regular key released.
    #[serde(rename = "up")]
    Up,
    /// Modifier state changed (press or release of a modifier key).
    #[serde(rename = "flagsChanged")]
    FlagsChanged,
}

/// A normalized key event. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Event kind, serialized as `"down" | "up" | "flagsChanged"`.
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
    /// Platform-scoped key code.
    #[serde(rename = "keyCode")]
    pub key_code: u16,
    /// Bitmask of active modifiers at the time of the event.
    pub flags: u64,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// Whether this is an OS autorepeat of a held key.
    #[serde(rename = "isRepeat")]
    pub is_repeat: bool,
}

/// macOS modifier masks and modifier key codes.
///
/// Family masks are the coarse CGEventFlags bits ("some side of this
/// modifier is active"); device masks are the per-side bits reported in the
/// low byte of the flags when the hook delivers combined state. A side bit
/// implies its family bit, never the other way around.
pub mod mac {
    /// Command family active.
    pub const MASK_COMMAND: u64 = 0x100000;
    /// Shift family active.
    pub const MASK_SHIFT: u64 = 0x20000;
    /// Control family active.
    pub const MASK_CONTROL: u64 = 0x40000;
    /// Option family active.
    pub const MASK_ALTERNATE: u64 = 0x80000;

    pub const DEVICE_LEFT_CTRL: u64 = 0x1;
    pub const DEVICE_LEFT_SHIFT: u64 = 0x2;
    pub const DEVICE_RIGHT_SHIFT: u64 = 0x4;
    pub const DEVICE_LEFT_CMD: u64 = 0x8;
    pub const DEVICE_RIGHT_CMD: u64 = 0x10;
    pub const DEVICE_LEFT_ALT: u64 = 0x20;
    pub const DEVICE_RIGHT_ALT: u64 = 0x40;
    pub const DEVICE_RIGHT_CTRL: u64 = 0x2000;

    // Modifier virtual key codes.
    pub const KEY_RIGHT_COMMAND: u16 = 54;
    pub const KEY_LEFT_COMMAND: u16 = 55;
    pub const KEY_LEFT_SHIFT: u16 = 56;
    pub const KEY_LEFT_OPTION: u16 = 58;
    pub const KEY_LEFT_CONTROL: u16 = 59;
    pub const KEY_RIGHT_SHIFT: u16 = 60;
    pub const KEY_RIGHT_OPTION: u16 = 61;
    pub const KEY_RIGHT_CONTROL: u16 = 62;
}

/// Linux synthesized modifier flags. The Linux hook maintains this bitmask
/// itself since evdev-level events carry no modifier state.
pub mod linux {
    pub const FLAG_SHIFT: u64 = 1 << 0;
    pub const FLAG_CTRL: u64 = 1 << 2;
    pub const FLAG_ALT: u64 = 1 << 3;
    pub const FLAG_META: u64 = 1 << 6;
    pub const FLAG_CAPSLOCK: u64 = 1 << 16;

    // Input-event codes for the modifier keys.
    pub const KEY_LEFT_CTRL: u16 = 29;
    pub const KEY_LEFT_SHIFT: u16 = 42;
    pub const KEY_RIGHT_SHIFT: u16 = 54;
    pub const KEY_LEFT_ALT: u16 = 56;
    pub const KEY_CAPSLOCK: u16 = 58;
    pub const KEY_RIGHT_CTRL: u16 = 97;
    pub const KEY_RIGHT_ALT: u16 = 100;
    pub const KEY_LEFT_META: u16 = 125;
    pub const KEY_RIGHT_META: u16 = 126;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_wire_shape() {
        let event = KeyEvent {
            kind: KeyEventKind::FlagsChanged,
            key_code: mac::KEY_RIGHT_COMMAND,
            flags: mac::MASK_COMMAND | mac::DEVICE_RIGHT_CMD,
            timestamp_ms: 1_000,
            is_repeat: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "flagsChanged");
        assert_eq!(json["keyCode"], 54);
        assert_eq!(json["flags"], 0x100010);
        assert_eq!(json["timestamp"], 1_000);
        assert_eq!(json["isRepeat"], false);
    }

    #[test]
    fn test_side_bit_implies_family_bit() {
        let flags = mac::MASK_COMMAND | mac::DEVICE_RIGHT_CMD;
        assert_ne!(flags & mac::MASK_COMMAND, 0);
        // Family bit alone is a valid combination too.
        let coarse_only = mac::MASK_COMMAND;
        assert_eq!(coarse_only & mac::DEVICE_RIGHT_CMD, 0);
    }
}

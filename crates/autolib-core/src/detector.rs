//! Modifier-tap detection: "modifier pressed and released alone within a
//! time window".
//!
//! The detector is a pure, stateful consumer of the monitor's event stream.
//! It relies on the monitor's serialized, in-order delivery; feed it every
//! event and it emits a decision for each completed press/release cycle of a
//! tracked modifier. Call [`ModifierTapDetector::reset`] whenever the
//! monitor is restarted so no `pressed_at` value spans monitor sessions.

use crate::event::{mac, KeyEvent, KeyEventKind};
use std::time::Duration;
use tracing::trace;

/// Default hold-time threshold.
pub const DEFAULT_TAP_THRESHOLD: Duration = Duration::from_millis(500);

/// One modifier side to watch.
#[derive(Debug, Clone, Copy)]
pub struct TrackedModifier {
    /// Platform key code of the specific side (e.g. 54 for right command
    /// on macOS).
    pub key_code: u16,
    /// Coarse "family active" bit for this modifier.
    pub family_mask: u64,
    /// Side-specific device bit, when the platform reports one. Purely
    /// informational for the press/release logic: the hook may report the
    /// family bit without the side bit, never the inverse.
    pub side_mask: u64,
}

/// Outcome of a completed press/release cycle of a tracked modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapDecision {
    pub key_code: u16,
    /// True iff the modifier was pressed alone and released within the
    /// threshold.
    pub tapped: bool,
    /// How long the modifier was held.
    pub held_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct TapState {
    pressed_at_ms: u64,
    other_key_intervening: bool,
}

#[derive(Debug)]
struct Tracked {
    spec: TrackedModifier,
    /// Last observed family-bit value for this key code, used to turn the
    /// level-coded flags into transitions. Duplicate FlagsChanged events
    /// (family bit unchanged) are no-ops.
    family_down: bool,
    state: Option<TapState>,
}

/// Recognizes taps of one or more tracked modifier sides. Each detector
/// instance owns its state exclusively; independent instances fed from the
/// same monitor do not affect each other.
pub struct ModifierTapDetector {
    threshold: Duration,
    tracked: Vec<Tracked>,
}

impl ModifierTapDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            tracked: Vec::new(),
        }
    }

    /// Detector for the macOS "right command pressed alone" gesture with
    /// the default threshold.
    pub fn right_command() -> Self {
        let mut detector = Self::new(DEFAULT_TAP_THRESHOLD);
        detector.track(TrackedModifier {
            key_code: mac::KEY_RIGHT_COMMAND,
            family_mask: mac::MASK_COMMAND,
            side_mask: mac::DEVICE_RIGHT_CMD,
        });
        detector
    }

    /// Watch an additional modifier side. Overlapping presses of different
    /// tracked modifiers are handled independently per key code.
    pub fn track(&mut self, spec: TrackedModifier) {
        self.tracked.push(Tracked {
            spec,
            family_down: false,
            state: None,
        });
    }

    /// Consume one event from the monitor stream. Returns a decision when
    /// the event completed a tracked press/release cycle, `None` otherwise.
    pub fn on_event(&mut self, event: &KeyEvent) -> Option<TapDecision> {
        match event.kind {
            KeyEventKind::Down => {
                // Any other key pressed during a hold disqualifies a
                // "pressed alone" classification for every tracked state.
                for tracked in &mut self.tracked {
                    if let Some(state) = tracked.state.as_mut() {
                        state.other_key_intervening = true;
                    }
                }
                None
            }
            KeyEventKind::Up => None,
            KeyEventKind::FlagsChanged => self.on_flags_changed(event),
        }
    }

    fn on_flags_changed(&mut self, event: &KeyEvent) -> Option<TapDecision> {
        let tracked = self
            .tracked
            .iter_mut()
            .find(|t| t.spec.key_code == event.key_code)?;

        let family_active = event.flags & tracked.spec.family_mask != 0;
        if family_active == tracked.family_down {
            // Duplicate notification, family bit unchanged.
            return None;
        }
        tracked.family_down = family_active;

        if family_active {
            // Press. Overwrites any stale state left by a missed release.
            trace!(key_code = event.key_code, "tracked modifier pressed");
            tracked.state = Some(TapState {
                pressed_at_ms: event.timestamp_ms,
                other_key_intervening: false,
            });
            return None;
        }

        // Release: decide and destroy the state unconditionally.
        let state = tracked.state.take()?;
        let held_ms = event.timestamp_ms.saturating_sub(state.pressed_at_ms);
        let tapped = !state.other_key_intervening
            && held_ms < self.threshold.as_millis() as u64;
        trace!(key_code = event.key_code, held_ms, tapped, "tracked modifier released");
        Some(TapDecision {
            key_code: event.key_code,
            tapped,
            held_ms,
        })
    }

    /// Clear all per-key state and transition memory. Call on monitor
    /// restart so stale `pressed_at` values never span sessions.
    pub fn reset(&mut self) {
        for tracked in &mut self.tracked {
            tracked.family_down = false;
            tracked.state = None;
        }
    }
}

impl Default for ModifierTapDetector {
    fn default() -> Self {
        Self::new(DEFAULT_TAP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags_changed(key_code: u16, flags: u64, timestamp_ms: u64) -> KeyEvent {
        KeyEvent {
            kind: KeyEventKind::FlagsChanged,
            key_code,
            flags,
            timestamp_ms,
            is_repeat: false,
        }
    }

    fn key_down(key_code: u16, timestamp_ms: u64) -> KeyEvent {
        KeyEvent {
            kind: KeyEventKind::Down,
            key_code,
            flags: 0,
            timestamp_ms,
            is_repeat: false,
        }
    }

    fn press(detector: &mut ModifierTapDetector, ts: u64) -> Option<TapDecision> {
        detector.on_event(&flags_changed(
            mac::KEY_RIGHT_COMMAND,
            mac::MASK_COMMAND | mac::DEVICE_RIGHT_CMD,
            ts,
        ))
    }

    fn release(detector: &mut ModifierTapDetector, ts: u64) -> Option<TapDecision> {
        detector.on_event(&flags_changed(mac::KEY_RIGHT_COMMAND, 0, ts))
    }

    #[test]
    fn test_quick_release_is_a_tap() {
        let mut detector = ModifierTapDetector::right_command();
        assert!(press(&mut detector, 1_000).is_none());
        let decision = release(&mut detector, 1_100).unwrap();
        assert!(decision.tapped);
        assert_eq!(decision.held_ms, 100);
        assert_eq!(decision.key_code, mac::KEY_RIGHT_COMMAND);
    }

    #[test]
    fn test_long_hold_is_not_a_tap() {
        let mut detector = ModifierTapDetector::right_command();
        press(&mut detector, 1_000);
        let decision = release(&mut detector, 1_600).unwrap();
        assert!(!decision.tapped);
        assert_eq!(decision.held_ms, 600);
    }

    #[test]
    fn test_intervening_key_disqualifies() {
        let mut detector = ModifierTapDetector::right_command();
        press(&mut detector, 1_000);
        assert!(detector.on_event(&key_down(8, 1_020)).is_none());
        let decision = release(&mut detector, 1_050).unwrap();
        assert!(!decision.tapped);
    }

    #[test]
    fn test_key_down_without_tracked_state_is_ignored() {
        let mut detector = ModifierTapDetector::right_command();
        detector.on_event(&key_down(8, 500));
        press(&mut detector, 1_000);
        let decision = release(&mut detector, 1_100).unwrap();
        assert!(decision.tapped);
    }

    #[test]
    fn test_overlapping_modifiers_decide_independently() {
        let mut detector = ModifierTapDetector::right_command();
        detector.track(TrackedModifier {
            key_code: mac::KEY_RIGHT_SHIFT,
            family_mask: mac::MASK_SHIFT,
            side_mask: mac::DEVICE_RIGHT_SHIFT,
        });

        press(&mut detector, 1_000);
        detector.on_event(&flags_changed(
            mac::KEY_RIGHT_SHIFT,
            mac::MASK_SHIFT | mac::MASK_COMMAND,
            1_050,
        ));

        // Shift released quickly, command held past the threshold.
        let shift = detector
            .on_event(&flags_changed(mac::KEY_RIGHT_SHIFT, mac::MASK_COMMAND, 1_150))
            .unwrap();
        assert!(shift.tapped);

        let command = release(&mut detector, 1_700).unwrap();
        assert!(!command.tapped);
    }

    #[test]
    fn test_duplicate_flags_changed_is_noop() {
        let mut detector = ModifierTapDetector::right_command();
        press(&mut detector, 1_000);
        // Same family bit again must not restart the hold timer.
        assert!(press(&mut detector, 1_400).is_none());
        let decision = release(&mut detector, 1_600).unwrap();
        assert!(!decision.tapped);
        assert_eq!(decision.held_ms, 600);
    }

    #[test]
    fn test_release_without_press_is_noop() {
        let mut detector = ModifierTapDetector::right_command();
        assert!(release(&mut detector, 1_000).is_none());
    }

    #[test]
    fn test_untracked_flags_changed_is_ignored() {
        let mut detector = ModifierTapDetector::right_command();
        let event = flags_changed(mac::KEY_LEFT_COMMAND, mac::MASK_COMMAND, 1_000);
        assert!(detector.on_event(&event).is_none());
    }

    #[test]
    fn test_reset_clears_state_across_sessions() {
        let mut detector = ModifierTapDetector::right_command();
        press(&mut detector, 1_000);
        detector.reset();
        // The release from the prior session can no longer produce a
        // decision, and a fresh cycle works normally.
        assert!(release(&mut detector, 1_050).is_none());
        press(&mut detector, 2_000);
        assert!(release(&mut detector, 2_100).unwrap().tapped);
    }

    #[test]
    fn test_family_bit_without_side_bit_still_counts() {
        let mut detector = ModifierTapDetector::right_command();
        detector.on_event(&flags_changed(mac::KEY_RIGHT_COMMAND, mac::MASK_COMMAND, 1_000));
        let decision = release(&mut detector, 1_100).unwrap();
        assert!(decision.tapped);
    }
}

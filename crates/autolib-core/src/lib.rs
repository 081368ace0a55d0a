//! autolib-core: platform-agnostic domain for the OS automation layer.
//!
//! Design goal: keep this crate free of OS bindings. It defines the
//! canonical key event record, the common error taxonomy, the monitor
//! state machine (generic over a [`HookBackend`] so it is testable with
//! fakes), and the modifier-tap detector. Platform-specific I/O
//! (injection, hooks, window queries) lives in `autolib-platform`.

mod detector;
mod error;
mod event;
mod monitor;

pub use detector::{
    ModifierTapDetector, TapDecision, TrackedModifier, DEFAULT_TAP_THRESHOLD,
};
pub use error::{CapabilityError, CapabilityResult};
pub use event::{linux, mac, KeyEvent, KeyEventKind};
pub use monitor::{
    in_event_delivery, HookBackend, HookError, KeyCallback, KeyHook, KeyMonitor,
    START_FAILED, START_OK, START_PERMISSION_DENIED,
};

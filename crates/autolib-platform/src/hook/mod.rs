//! OS key hook backends feeding the key monitor.
//!
//! Each platform installs its hook on a dedicated thread and reports the
//! installation outcome back through a handshake channel, so `install`
//! returns `PermissionDenied` synchronously when the OS refuses the hook.

use autolib_core::{HookBackend, HookError, KeyEvent, KeyHook};
use crossbeam_channel::Sender;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(target_os = "linux")]
mod rdev_impl;

#[cfg(windows)]
mod windows_native;

#[cfg(target_os = "macos")]
mod macos;

/// The real OS hook backend. Stateless; all state lives in the hook it
/// hands back.
pub struct NativeHookBackend;

impl HookBackend for NativeHookBackend {
    fn install(&self, events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError> {
        #[cfg(target_os = "linux")]
        {
            rdev_impl::install(events)
        }
        #[cfg(windows)]
        {
            windows_native::install(events)
        }
        #[cfg(target_os = "macos")]
        {
            macos::install(events)
        }
        #[cfg(not(any(target_os = "linux", windows, target_os = "macos")))]
        {
            let _ = events;
            Err(HookError::Install(
                "no key hook backend for this platform".into(),
            ))
        }
    }
}

/// Milliseconds since the Unix epoch, for event timestamps.
#[cfg_attr(
    not(any(target_os = "linux", windows, target_os = "macos")),
    allow(dead_code)
)]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

//! Capability facade and the process-wide monitor surface.
//!
//! The facade validates arguments, guards against injection from the event
//! delivery path, and guarantees that every operation fails with
//! [`CapabilityError::NotLoaded`] when the native backend failed to
//! initialize, without attempting the adapter call.

use crate::adapter::{Modifier, MouseButton, NativeAdapter, PlatformAdapter};
use crate::hook::NativeHookBackend;
use crate::window::WindowInfo;
use autolib_core::{in_event_delivery, CapabilityError, CapabilityResult, KeyEvent, KeyMonitor};
use std::sync::{Arc, OnceLock};
use tracing::error;

/// Synchronous facade over the platform adapter.
pub struct Capability {
    adapter: Option<Arc<dyn PlatformAdapter>>,
}

impl Capability {
    /// Initialize the native backend. On failure the capability stays
    /// usable but every operation reports `NotLoaded`.
    pub fn load() -> Self {
        match NativeAdapter::new() {
            Ok(adapter) => Self {
                adapter: Some(Arc::new(adapter)),
            },
            Err(err) => {
                error!(%err, "native capability backend failed to load");
                Self { adapter: None }
            }
        }
    }

    /// A capability whose backend never loaded.
    pub fn unavailable() -> Self {
        Self { adapter: None }
    }

    /// Build over a caller-supplied adapter (tests, custom backends).
    pub fn with_adapter(adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.adapter.is_some()
    }

    fn adapter(&self) -> CapabilityResult<&dyn PlatformAdapter> {
        self.adapter.as_deref().ok_or(CapabilityError::NotLoaded)
    }

    /// Some OS hook contexts forbid synchronous injection from within the
    /// hook callback (deadlock / self-feedback risk), so injection from
    /// the delivery thread is refused outright.
    fn injection_context(&self) -> CapabilityResult<()> {
        if in_event_delivery() {
            return Err(CapabilityError::Injection(
                "injection is not allowed from the event delivery callback".into(),
            ));
        }
        Ok(())
    }

    pub fn send_key(&self, key_code: u16, modifiers: &[Modifier]) -> CapabilityResult<()> {
        let adapter = self.adapter()?;
        self.injection_context()?;
        adapter.send_key(key_code, modifiers)
    }

    pub fn send_ctrl_key(&self, key_code: u16) -> CapabilityResult<()> {
        let adapter = self.adapter()?;
        self.injection_context()?;
        adapter.send_ctrl_key(key_code)
    }

    pub fn mouse_click(&self, x: i32, y: i32, button: MouseButton) -> CapabilityResult<()> {
        let adapter = self.adapter()?;
        self.injection_context()?;
        if x < 0 || y < 0 {
            return Err(CapabilityError::Injection(format!(
                "coordinates out of range: ({x}, {y})"
            )));
        }
        adapter.mouse_click(x, y, button)
    }

    pub fn foremost_window(&self) -> CapabilityResult<WindowInfo> {
        self.adapter()?.foremost_window()
    }

    pub fn foremost_pid(&self) -> CapabilityResult<u32> {
        self.adapter()?.foremost_pid()
    }

    pub fn activate_window(&self, handle: usize) -> CapabilityResult<()> {
        self.adapter()?.activate_window(handle)
    }

    pub fn product_name(&self, pid: u32) -> CapabilityResult<String> {
        self.adapter()?.product_name(pid)
    }

    pub fn application_icon(&self, pid: u32) -> CapabilityResult<Vec<u8>> {
        self.adapter()?.application_icon(pid)
    }

    pub fn selected_text(&self) -> CapabilityResult<String> {
        self.adapter()?.selected_text()
    }
}

// ============================================================================
// Process-wide key monitor
// ============================================================================

static MONITOR: OnceLock<KeyMonitor<NativeHookBackend>> = OnceLock::new();

fn global_monitor() -> &'static KeyMonitor<NativeHookBackend> {
    MONITOR.get_or_init(|| KeyMonitor::new(NativeHookBackend))
}

/// Install the process-wide key hook and register `callback` as the single
/// consumer. Returns `0` on success, `3` on permission denial, another
/// non-zero code on generic failure. Starting while running replaces the
/// callback and returns `0`.
pub fn start_key_monitor<F>(callback: F) -> i32
where
    F: FnMut(KeyEvent) + Send + 'static,
{
    global_monitor().start(callback)
}

/// Remove the process-wide key hook. Always succeeds; no-op when the
/// monitor is not running.
pub fn stop_key_monitor() {
    global_monitor().stop();
}

pub fn is_key_monitor_running() -> bool {
    global_monitor().is_running()
}

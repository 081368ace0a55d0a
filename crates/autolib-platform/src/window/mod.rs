//! Window and focus queries.
//!
//! Platform implementations:
//! - Windows: Win32 API (`windows.rs`)
//! - macOS: CGWindowList via core-foundation (`macos.rs`)
//! - elsewhere: every query fails with `QueryError`

use autolib_core::{CapabilityError, CapabilityResult};
use serde::{Deserialize, Serialize};

#[cfg(windows)]
mod windows;

#[cfg(target_os = "macos")]
pub(crate) mod macos;

/// Snapshot of a top-level window. Read-only; not owned by this layer
/// beyond the call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Platform-specific window identifier (HWND on Windows, window
    /// number on macOS).
    pub handle: usize,
    /// Window title, possibly empty.
    pub title: String,
    /// Owning process name.
    pub process_name: String,
    /// Owning process ID.
    pub pid: u32,
}

/// The OS's currently focused top-level window.
pub fn foremost_window() -> CapabilityResult<WindowInfo> {
    #[cfg(windows)]
    {
        windows::foremost_window()
    }
    #[cfg(target_os = "macos")]
    {
        macos::foremost_window()
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Err(unsupported())
    }
}

/// PID of the foreground application.
pub fn foremost_pid() -> CapabilityResult<u32> {
    #[cfg(windows)]
    {
        windows::foremost_pid()
    }
    #[cfg(target_os = "macos")]
    {
        macos::foremost_pid()
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Err(unsupported())
    }
}

/// Bring the window to the foreground and focus it.
pub fn activate_window(handle: usize) -> CapabilityResult<()> {
    #[cfg(windows)]
    {
        windows::activate_window(handle)
    }
    #[cfg(not(windows))]
    {
        let _ = handle;
        Err(unsupported())
    }
}

// Live on every target except Windows, which implements all the queries.
#[cfg_attr(windows, allow(dead_code))]
fn unsupported() -> CapabilityError {
    CapabilityError::Query("window queries are not supported on this platform".into())
}

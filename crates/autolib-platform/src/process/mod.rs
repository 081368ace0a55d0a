//! Process metadata queries: product name and application icon.
//!
//! Platform implementations:
//! - Windows: executable metadata + icon extraction (`windows.rs`)
//! - macOS: owner name from the window list (`macos.rs`); icons are not
//!   available at this layer
//! - elsewhere: every query fails with `QueryError`

use autolib_core::{CapabilityError, CapabilityResult};

#[cfg(windows)]
mod windows;

#[cfg(target_os = "macos")]
mod macos;

/// Human-readable product name for the process. Falls back to the
/// executable name without extension when no richer metadata exists.
pub fn product_name(pid: u32) -> CapabilityResult<String> {
    #[cfg(windows)]
    {
        windows::product_name(pid)
    }
    #[cfg(target_os = "macos")]
    {
        macos::product_name(pid)
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        let _ = pid;
        Err(unsupported())
    }
}

/// Application icon as image bytes (single-image ICO on Windows).
pub fn application_icon(pid: u32) -> CapabilityResult<Vec<u8>> {
    #[cfg(windows)]
    {
        windows::application_icon(pid)
    }
    #[cfg(not(windows))]
    {
        let _ = pid;
        Err(unsupported())
    }
}

// Live on every target except Windows, which implements both queries.
#[cfg_attr(windows, allow(dead_code))]
fn unsupported() -> CapabilityError {
    CapabilityError::Query("process metadata is not supported on this platform".into())
}

//! Selected-text query.
//!
//! Only macOS exposes a usable cross-application selection API
//! (Accessibility); everywhere else the query fails with `QueryError`.

use autolib_core::{CapabilityError, CapabilityResult};

#[cfg(target_os = "macos")]
mod macos;

/// Text currently selected in the focused UI element of the frontmost
/// application. An empty string means "no selection", not an error.
pub fn selected_text() -> CapabilityResult<String> {
    #[cfg(target_os = "macos")]
    {
        macos::selected_text()
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(CapabilityError::Query(
            "selected-text queries are not supported on this platform".into(),
        ))
    }
}

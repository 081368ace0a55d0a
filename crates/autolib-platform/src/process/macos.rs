//! macOS process metadata. The owning application name comes from the
//! window list, which already carries kCGWindowOwnerName per window.

use crate::window::macos::window_list;
use autolib_core::{CapabilityError, CapabilityResult};

pub fn product_name(pid: u32) -> CapabilityResult<String> {
    window_list()?
        .into_iter()
        .find(|window| window.pid == pid && !window.process_name.is_empty())
        .map(|window| window.process_name)
        .ok_or_else(|| {
            CapabilityError::Query(format!("no on-screen window owned by process {pid}"))
        })
}

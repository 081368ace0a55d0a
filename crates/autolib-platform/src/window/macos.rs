//! macOS implementation of window/focus queries.
//!
//! Uses CGWindowListCopyWindowInfo rather than the Accessibility API: the
//! first layer-0 on-screen window in the list is the frontmost one, and the
//! call needs no permission grant.

use super::WindowInfo;
use autolib_core::{CapabilityError, CapabilityResult};
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly,
};

pub fn foremost_window() -> CapabilityResult<WindowInfo> {
    window_list()?
        .into_iter()
        .next()
        .ok_or_else(|| CapabilityError::Query("no foreground window".into()))
}

pub fn foremost_pid() -> CapabilityResult<u32> {
    foremost_window().map(|window| window.pid)
}

/// On-screen windows in front-to-back order, normal layer only.
pub(crate) fn window_list() -> CapabilityResult<Vec<WindowInfo>> {
    let info = copy_window_info(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    )
    .ok_or_else(|| CapabilityError::Query("CGWindowListCopyWindowInfo failed".into()))?;

    let mut windows = Vec::new();
    for item in info.iter() {
        let dict: CFDictionary<CFString, CFType> =
            unsafe { CFDictionary::wrap_under_get_rule((*item).cast()) };

        // Skip menu bar items, overlays and other non-normal layers.
        if dict_i64(&dict, "kCGWindowLayer").unwrap_or(-1) != 0 {
            continue;
        }
        let Some(pid) = dict_i64(&dict, "kCGWindowOwnerPID") else {
            continue;
        };
        let handle = dict_i64(&dict, "kCGWindowNumber").unwrap_or(0) as usize;
        let title = dict_string(&dict, "kCGWindowName").unwrap_or_default();
        let process_name = dict_string(&dict, "kCGWindowOwnerName").unwrap_or_default();

        windows.push(WindowInfo {
            handle,
            title,
            process_name,
            pid: pid as u32,
        });
    }
    Ok(windows)
}

fn dict_i64(dict: &CFDictionary<CFString, CFType>, key: &'static str) -> Option<i64> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|number| number.to_i64())
}

fn dict_string(dict: &CFDictionary<CFString, CFType>, key: &'static str) -> Option<String> {
    dict.find(CFString::from_static_string(key))
        .and_then(|value| value.downcast::<CFString>())
        .map(|s| s.to_string())
}

//! macOS selected-text query via the Accessibility (AX) API.
//!
//! Chain: frontmost pid -> AXUIElementCreateApplication -> focused UI
//! element -> AXSelectedText. WebKit views do not implement
//! AXSelectedText, so a text-marker-range fallback covers them.

use crate::window;
use autolib_core::{CapabilityError, CapabilityResult};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::string::{CFString, CFStringRef};
use tracing::debug;

type AXUIElementRef = CFTypeRef;
type AXError = i32;

const AX_SUCCESS: AXError = 0;
const AX_ERROR_API_DISABLED: AXError = -25211;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementSetAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: CFTypeRef,
    ) -> AXError;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> AXError;
    fn AXUIElementCopyParameterizedAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        parameter: CFTypeRef,
        value: *mut CFTypeRef,
    ) -> AXError;
}

pub fn selected_text() -> CapabilityResult<String> {
    let pid = window::foremost_pid()?;

    unsafe {
        let raw = AXUIElementCreateApplication(pid as i32);
        if raw.is_null() {
            return Err(CapabilityError::Query(format!(
                "could not create AX element for process {pid}"
            )));
        }
        let app = CFType::wrap_under_create_rule(raw);

        // Chromium and Electron apps only expose AX content once asked to.
        set_flag(app.as_CFTypeRef(), "AXManualAccessibility");
        set_flag(app.as_CFTypeRef(), "AXEnhancedUserInterface");

        let focused = match copy_attribute(app.as_CFTypeRef(), "AXFocusedUIElement") {
            Ok(Some(element)) => element,
            Ok(None) => return Ok(String::new()),
            Err(err) => return Err(err),
        };

        match copy_attribute(focused.as_CFTypeRef(), "AXSelectedText") {
            Ok(Some(value)) => Ok(as_string(&value)),
            Ok(None) => webkit_selected_text(focused.as_CFTypeRef()),
            Err(err) => Err(err),
        }
    }
}

/// Fallback for WebKit views, which report selections only through text
/// marker ranges.
unsafe fn webkit_selected_text(element: CFTypeRef) -> CapabilityResult<String> {
    let range = match copy_attribute(element, "AXSelectedTextMarkerRange") {
        Ok(Some(range)) => range,
        Ok(None) => return Ok(String::new()),
        Err(err) => return Err(err),
    };

    let attribute = CFString::from_static_string("AXStringForTextMarkerRange");
    let mut value: CFTypeRef = std::ptr::null();
    let err = AXUIElementCopyParameterizedAttributeValue(
        element,
        attribute.as_concrete_TypeRef(),
        range.as_CFTypeRef(),
        &mut value,
    );
    match err {
        AX_SUCCESS if !value.is_null() => Ok(as_string(&CFType::wrap_under_create_rule(value))),
        AX_ERROR_API_DISABLED => Err(permission_denied()),
        _ => Ok(String::new()),
    }
}

unsafe fn set_flag(element: CFTypeRef, attribute: &'static str) {
    let name = CFString::from_static_string(attribute);
    let err = AXUIElementSetAttributeValue(
        element,
        name.as_concrete_TypeRef(),
        CFBoolean::true_value().as_CFTypeRef(),
    );
    if err != AX_SUCCESS {
        debug!(attribute, code = err, "AX attribute flag not accepted");
    }
}

/// Copy an AX attribute. `Ok(None)` covers "attribute absent or
/// unsupported on this element"; only a disabled AX API is an error.
unsafe fn copy_attribute(element: CFTypeRef, attribute: &'static str) -> CapabilityResult<Option<CFType>> {
    let name = CFString::from_static_string(attribute);
    let mut value: CFTypeRef = std::ptr::null();
    let err = AXUIElementCopyAttributeValue(element, name.as_concrete_TypeRef(), &mut value);
    match err {
        AX_SUCCESS if !value.is_null() => Ok(Some(CFType::wrap_under_create_rule(value))),
        AX_SUCCESS => Ok(None),
        AX_ERROR_API_DISABLED => Err(permission_denied()),
        _ => Ok(None),
    }
}

fn as_string(value: &CFType) -> String {
    value
        .downcast::<CFString>()
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn permission_denied() -> CapabilityError {
    CapabilityError::PermissionDenied(
        "accessibility access is not granted to this process".into(),
    )
}

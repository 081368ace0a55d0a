//! macOS key hook: a listen-only session CGEventTap on a dedicated
//! CFRunLoop thread.
//!
//! The tap callback reads event fields through raw FFI only (keycode,
//! autorepeat, flags); no CGEvent ownership is taken. Tap creation fails
//! with null when the process lacks accessibility/input-monitoring
//! permission, which surfaces as `PermissionDenied` from `install`.

use super::now_ms;
use autolib_core::{HookError, KeyEvent, KeyEventKind, KeyHook};
use core_foundation::base::TCFType;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopSource};
use core_graphics::event::{CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType};
use crossbeam_channel::{bounded, Sender};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type CFMachPortRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CFRunLoopRef = *mut c_void;
type CFAllocatorRef = *const c_void;
type CFIndex = i64;
type CGEventRef = *mut c_void;

// CGEventField values.
const KEYBOARD_EVENT_AUTOREPEAT: u32 = 8;
const KEYBOARD_EVENT_KEYCODE: u32 = 9;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetFlags(event: CGEventRef) -> u64;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortCreateRunLoopSource(
        allocator: CFAllocatorRef,
        port: CFMachPortRef,
        order: CFIndex,
    ) -> CFRunLoopSourceRef;

    fn CFRunLoopStop(run_loop: CFRunLoopRef);
}

type CGEventTapCallback = extern "C" fn(
    proxy: *mut c_void,
    event_type: CGEventType,
    cg_event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

thread_local! {
    // The tap callback runs on the run-loop thread that created the tap.
    static EVENT_SENDER: RefCell<Option<Sender<KeyEvent>>> = const { RefCell::new(None) };
    static TAP: Cell<CFMachPortRef> = const { Cell::new(ptr::null_mut()) };
}

pub fn install(events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError> {
    let (ready_tx, ready_rx) = bounded::<Result<usize, HookError>>(1);

    let handle = thread::Builder::new()
        .name("autolib-eventtap".into())
        .spawn(move || run_event_tap(events, ready_tx))
        .map_err(|err| HookError::Install(format!("could not spawn tap thread: {err}")))?;

    let run_loop = ready_rx
        .recv()
        .map_err(|_| HookError::Install("tap thread exited before handshake".into()))??;

    Ok(Box::new(MacHook {
        run_loop,
        handle: Some(handle),
    }))
}

struct MacHook {
    // CFRunLoopRef of the tap thread, valid while that thread runs.
    run_loop: usize,
    handle: Option<JoinHandle<()>>,
}

impl KeyHook for MacHook {
    fn stop(mut self: Box<Self>) {
        unsafe { CFRunLoopStop(self.run_loop as CFRunLoopRef) };
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

extern "C" fn event_tap_callback(
    _proxy: *mut c_void,
    event_type: CGEventType,
    cg_event: CGEventRef,
    _user_info: *mut c_void,
) -> CGEventRef {
    // The OS disables taps that stall; re-enable and carry on.
    if matches!(
        event_type,
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
    ) {
        warn!("event tap was disabled by the OS, re-enabling");
        TAP.with(|tap| {
            let port = tap.get();
            if !port.is_null() {
                unsafe { CGEventTapEnable(port, true) };
            }
        });
        return cg_event;
    }

    let kind = match event_type {
        CGEventType::KeyDown => KeyEventKind::Down,
        CGEventType::KeyUp => KeyEventKind::Up,
        CGEventType::FlagsChanged => KeyEventKind::FlagsChanged,
        _ => return cg_event,
    };

    let (key_code, is_repeat, flags) = unsafe {
        (
            CGEventGetIntegerValueField(cg_event, KEYBOARD_EVENT_KEYCODE) as u16,
            CGEventGetIntegerValueField(cg_event, KEYBOARD_EVENT_AUTOREPEAT) != 0,
            CGEventGetFlags(cg_event),
        )
    };

    let event = KeyEvent {
        kind,
        key_code,
        flags,
        timestamp_ms: now_ms(),
        is_repeat,
    };
    EVENT_SENDER.with(|sender| {
        if let Some(ref tx) = *sender.borrow() {
            if tx.try_send(event).is_err() {
                warn!(key_code, "key event dropped, consumer not keeping up");
            }
        }
    });

    // Listen-only tap: the event continues unchanged.
    cg_event
}

fn run_event_tap(events: Sender<KeyEvent>, ready_tx: Sender<Result<usize, HookError>>) {
    EVENT_SENDER.with(|sender| *sender.borrow_mut() = Some(events));

    let event_mask: u64 = (1 << CGEventType::KeyDown as u64)
        | (1 << CGEventType::KeyUp as u64)
        | (1 << CGEventType::FlagsChanged as u64);

    let tap = unsafe {
        CGEventTapCreate(
            CGEventTapLocation::Session as u32,
            CGEventTapPlacement::HeadInsertEventTap as u32,
            CGEventTapOptions::ListenOnly as u32,
            event_mask,
            event_tap_callback,
            ptr::null_mut(),
        )
    };
    if tap.is_null() {
        let _ = ready_tx.send(Err(HookError::PermissionDenied(
            "event tap creation refused; accessibility permission not granted".into(),
        )));
        return;
    }
    TAP.with(|cell| cell.set(tap));

    let run_loop_source = unsafe { CFMachPortCreateRunLoopSource(ptr::null(), tap, 0) };
    if run_loop_source.is_null() {
        let _ = ready_tx.send(Err(HookError::Install(
            "could not create run loop source for event tap".into(),
        )));
        return;
    }
    let cf_source = unsafe { CFRunLoopSource::wrap_under_create_rule(run_loop_source as *mut _) };

    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&cf_source, unsafe { kCFRunLoopCommonModes });
    unsafe { CGEventTapEnable(tap, true) };

    debug!("event tap installed, entering run loop");
    let _ = ready_tx.send(Ok(run_loop.as_concrete_TypeRef() as usize));

    CFRunLoop::run_current();

    // Stopped from MacHook::stop; disable the tap before unwinding.
    unsafe { CGEventTapEnable(tap, false) };
    TAP.with(|cell| cell.set(ptr::null_mut()));
    EVENT_SENDER.with(|sender| *sender.borrow_mut() = None);
    debug!("event tap run loop exited");
}

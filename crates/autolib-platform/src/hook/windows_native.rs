//! Windows key hook: a low-level keyboard hook (WH_KEYBOARD_LL) on a
//! dedicated message-loop thread.
//!
//! Windows reports modifier keys as ordinary key events, so this backend
//! never emits `FlagsChanged`. Autorepeat is detected with a per-key down
//! table because the low-level hook does not carry a repeat bit.

use super::now_ms;
use autolib_core::{HookError, KeyEvent, KeyEventKind, KeyHook};
use crossbeam_channel::{bounded, Sender};
use std::cell::{Cell, RefCell};
use std::thread::{self, JoinHandle};
use windows_sys::Win32::Foundation::{GetLastError, ERROR_ACCESS_DENIED, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, SetWindowsHookExW, UnhookWindowsHookEx, KBDLLHOOKSTRUCT, MSG,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

thread_local! {
    // Hook callbacks run on the installing thread, inside GetMessageW.
    static SENDER: RefCell<Option<Sender<KeyEvent>>> = const { RefCell::new(None) };
    static KEY_DOWN: Cell<[bool; 256]> = const { Cell::new([false; 256]) };
}

pub fn install(events: Sender<KeyEvent>) -> Result<Box<dyn KeyHook>, HookError> {
    let (ready_tx, ready_rx) = bounded::<Result<u32, HookError>>(1);

    let handle = thread::Builder::new()
        .name("autolib-winhook".into())
        .spawn(move || unsafe {
            SENDER.with(|slot| *slot.borrow_mut() = Some(events));

            let hook =
                SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), std::ptr::null_mut(), 0);
            if hook.is_null() {
                let code = GetLastError();
                let err = if code == ERROR_ACCESS_DENIED {
                    HookError::PermissionDenied(
                        "low-level keyboard hook refused by the OS".into(),
                    )
                } else {
                    HookError::Install(format!("SetWindowsHookExW failed, error {code}"))
                };
                let _ = ready_tx.send(Err(err));
                return;
            }
            let _ = ready_tx.send(Ok(GetCurrentThreadId()));

            let mut msg: MSG = std::mem::zeroed();
            while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {}

            UnhookWindowsHookEx(hook);
            SENDER.with(|slot| *slot.borrow_mut() = None);
        })
        .map_err(|err| HookError::Install(format!("could not spawn hook thread: {err}")))?;

    let thread_id = ready_rx
        .recv()
        .map_err(|_| HookError::Install("hook thread exited before handshake".into()))??;

    Ok(Box::new(WindowsHook {
        thread_id,
        handle: Some(handle),
    }))
}

struct WindowsHook {
    thread_id: u32,
    handle: Option<JoinHandle<()>>,
}

impl KeyHook for WindowsHook {
    fn stop(mut self: Box<Self>) {
        unsafe {
            windows_sys::Win32::UI::WindowsAndMessaging::PostThreadMessageW(
                self.thread_id,
                WM_QUIT,
                0,
                0,
            );
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = &*(lparam as *const KBDLLHOOKSTRUCT);
        let vk = (info.vkCode & 0xff) as usize;

        let (kind, is_repeat) = match wparam as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                let repeat = KEY_DOWN.with(|table| {
                    let mut keys = table.get();
                    let already = keys[vk];
                    keys[vk] = true;
                    table.set(keys);
                    already
                });
                (Some(KeyEventKind::Down), repeat)
            }
            WM_KEYUP | WM_SYSKEYUP => {
                KEY_DOWN.with(|table| {
                    let mut keys = table.get();
                    keys[vk] = false;
                    table.set(keys);
                });
                (Some(KeyEventKind::Up), false)
            }
            _ => (None, false),
        };

        if let Some(kind) = kind {
            let event = KeyEvent {
                kind,
                key_code: info.vkCode as u16,
                flags: info.flags as u64,
                timestamp_ms: now_ms(),
                is_repeat,
            };
            SENDER.with(|slot| {
                if let Some(sender) = slot.borrow().as_ref() {
                    if sender.try_send(event).is_err() {
                        tracing::warn!(vk, "key event dropped, consumer not keeping up");
                    }
                }
            });
        }
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

//! Windows implementation of window/focus queries using Win32.

use super::WindowInfo;
use autolib_core::{CapabilityError, CapabilityResult};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use windows_sys::Win32::Foundation::{CloseHandle, HWND};
use windows_sys::Win32::System::ProcessStatus::GetModuleBaseNameW;
use windows_sys::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
    SendMessageW, SetForegroundWindow, WA_ACTIVE, WM_ACTIVATE, WM_ACTIVATEAPP, WM_SETFOCUS,
};

pub fn foremost_window() -> CapabilityResult<WindowInfo> {
    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.is_null() {
            return Err(CapabilityError::Query("no foreground window".into()));
        }
        window_info(hwnd)
    }
}

pub fn foremost_pid() -> CapabilityResult<u32> {
    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.is_null() {
            return Err(CapabilityError::Query("no foreground window".into()));
        }
        let mut pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);
        if pid == 0 {
            return Err(CapabilityError::Query(
                "could not resolve foreground process".into(),
            ));
        }
        Ok(pid)
    }
}

pub fn activate_window(handle: usize) -> CapabilityResult<()> {
    if handle == 0 {
        return Err(CapabilityError::Query("invalid window handle".into()));
    }
    unsafe {
        let hwnd = handle as HWND;
        SendMessageW(hwnd, WM_ACTIVATEAPP, 1, 0);
        SendMessageW(hwnd, WM_ACTIVATE, WA_ACTIVE as usize, 0);
        SendMessageW(hwnd, WM_SETFOCUS, 0, 0);
        if SetForegroundWindow(hwnd) == 0 {
            return Err(CapabilityError::Query(
                "SetForegroundWindow was refused".into(),
            ));
        }
    }
    Ok(())
}

unsafe fn window_info(hwnd: HWND) -> CapabilityResult<WindowInfo> {
    let title_len = GetWindowTextLengthW(hwnd);
    let title = if title_len > 0 {
        let mut buf: Vec<u16> = vec![0; (title_len + 1) as usize];
        let copied = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
        buf.truncate(copied as usize);
        OsString::from_wide(&buf).to_string_lossy().into_owned()
    } else {
        String::new()
    };

    let mut pid: u32 = 0;
    GetWindowThreadProcessId(hwnd, &mut pid);
    let process_name = process_name(pid).unwrap_or_default();

    Ok(WindowInfo {
        handle: hwnd as usize,
        title,
        process_name,
        pid,
    })
}

pub(crate) fn process_name(pid: u32) -> Option<String> {
    unsafe {
        let process = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, 0, pid);
        if process.is_null() {
            return None;
        }
        let mut buf: Vec<u16> = vec![0; 260];
        let len = GetModuleBaseNameW(process, std::ptr::null_mut(), buf.as_mut_ptr(), buf.len() as u32);
        CloseHandle(process);
        if len == 0 {
            return None;
        }
        buf.truncate(len as usize);
        Some(OsString::from_wide(&buf).to_string_lossy().into_owned())
    }
}

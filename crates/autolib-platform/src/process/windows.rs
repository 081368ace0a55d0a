//! Windows process metadata: product name and icon extraction.
//!
//! The icon path goes executable path -> ExtractIconExW -> GDI bitmaps ->
//! a single-image ICO buffer, so callers get bytes any image decoder
//! understands.

use autolib_core::{CapabilityError, CapabilityResult};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Graphics::Gdi::{
    DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO, BITMAPINFOHEADER,
    BI_RGB, DIB_RGB_COLORS, HBITMAP,
};
use windows_sys::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows_sys::Win32::UI::Shell::ExtractIconExW;
use windows_sys::Win32::UI::WindowsAndMessaging::{DestroyIcon, GetIconInfo, ICONINFO};

pub fn product_name(pid: u32) -> CapabilityResult<String> {
    let path = executable_path(pid)?;
    let file_name = path
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(path.as_str());
    // Strip the .exe extension; the base name is the closest thing to a
    // product name without reading version resources.
    let name = file_name
        .strip_suffix(".exe")
        .or_else(|| file_name.strip_suffix(".EXE"))
        .unwrap_or(file_name);
    if name.is_empty() {
        return Err(CapabilityError::Query(format!(
            "process {pid} has no resolvable name"
        )));
    }
    Ok(name.to_string())
}

pub fn application_icon(pid: u32) -> CapabilityResult<Vec<u8>> {
    let path = executable_path(pid)?;
    let mut wide: Vec<u16> = path.encode_utf16().collect();
    wide.push(0);

    unsafe {
        let mut icon = std::ptr::null_mut();
        let extracted = ExtractIconExW(wide.as_ptr(), 0, &mut icon, std::ptr::null_mut(), 1);
        if extracted == 0 || icon.is_null() {
            return Err(CapabilityError::Query(format!(
                "no icon in executable of process {pid}"
            )));
        }
        let result = icon_to_ico(icon);
        DestroyIcon(icon);
        result
    }
}

fn executable_path(pid: u32) -> CapabilityResult<String> {
    unsafe {
        let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if process.is_null() {
            return Err(CapabilityError::Query(format!(
                "could not open process {pid}"
            )));
        }
        let mut buf: Vec<u16> = vec![0; 1024];
        let mut len = buf.len() as u32;
        let ok = QueryFullProcessImageNameW(process, 0, buf.as_mut_ptr(), &mut len);
        CloseHandle(process);
        if ok == 0 {
            return Err(CapabilityError::Query(format!(
                "could not resolve executable path of process {pid}"
            )));
        }
        buf.truncate(len as usize);
        Ok(OsString::from_wide(&buf).to_string_lossy().into_owned())
    }
}

/// Serialize an HICON as a one-image ICO file: ICONDIR + ICONDIRENTRY +
/// BITMAPINFOHEADER (doubled height) + 32bpp color pixels + 1bpp AND mask.
unsafe fn icon_to_ico(icon: windows_sys::Win32::UI::WindowsAndMessaging::HICON) -> CapabilityResult<Vec<u8>> {
    let mut info: ICONINFO = std::mem::zeroed();
    if GetIconInfo(icon, &mut info) == 0 {
        return Err(CapabilityError::Query("GetIconInfo failed".into()));
    }

    let result = build_ico(info.hbmColor, info.hbmMask);

    if !info.hbmColor.is_null() {
        DeleteObject(info.hbmColor as _);
    }
    if !info.hbmMask.is_null() {
        DeleteObject(info.hbmMask as _);
    }
    result
}

unsafe fn build_ico(color: HBITMAP, mask: HBITMAP) -> CapabilityResult<Vec<u8>> {
    if color.is_null() {
        return Err(CapabilityError::Query("icon has no color bitmap".into()));
    }
    let mut bitmap: BITMAP = std::mem::zeroed();
    if GetObjectW(
        color as _,
        std::mem::size_of::<BITMAP>() as i32,
        (&mut bitmap as *mut BITMAP).cast(),
    ) == 0
    {
        return Err(CapabilityError::Query("GetObjectW failed".into()));
    }
    let width = bitmap.bmWidth;
    let height = bitmap.bmHeight;
    if width <= 0 || height <= 0 || width > 512 || height > 512 {
        return Err(CapabilityError::Query(format!(
            "unexpected icon dimensions {width}x{height}"
        )));
    }

    let dc = GetDC(std::ptr::null_mut());
    if dc.is_null() {
        return Err(CapabilityError::Query("GetDC failed".into()));
    }

    // Positive height: bottom-up rows, which is what the ICO payload wants.
    let mut header: BITMAPINFO = std::mem::zeroed();
    header.bmiHeader.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
    header.bmiHeader.biWidth = width;
    header.bmiHeader.biHeight = height;
    header.bmiHeader.biPlanes = 1;
    header.bmiHeader.biBitCount = 32;
    header.bmiHeader.biCompression = BI_RGB as u32;

    let pixel_bytes = (width as usize) * (height as usize) * 4;
    let mut pixels = vec![0u8; pixel_bytes];
    let copied = GetDIBits(
        dc,
        color,
        0,
        height as u32,
        pixels.as_mut_ptr().cast(),
        &mut header,
        DIB_RGB_COLORS,
    );

    // 1bpp AND mask, rows padded to 4 bytes.
    let mask_stride = ((width as usize + 31) / 32) * 4;
    let mask_bytes = mask_stride * height as usize;
    let mut mask_bits = vec![0u8; mask_bytes];
    if !mask.is_null() {
        let mut mask_header: BITMAPINFO = std::mem::zeroed();
        mask_header.bmiHeader.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
        mask_header.bmiHeader.biWidth = width;
        mask_header.bmiHeader.biHeight = height;
        mask_header.bmiHeader.biPlanes = 1;
        mask_header.bmiHeader.biBitCount = 1;
        mask_header.bmiHeader.biCompression = BI_RGB as u32;
        GetDIBits(
            dc,
            mask,
            0,
            height as u32,
            mask_bits.as_mut_ptr().cast(),
            &mut mask_header,
            DIB_RGB_COLORS,
        );
    }
    ReleaseDC(std::ptr::null_mut(), dc);

    if copied == 0 {
        return Err(CapabilityError::Query("GetDIBits failed".into()));
    }

    let image_size = 40 + pixel_bytes + mask_bytes;
    let mut ico = Vec::with_capacity(6 + 16 + image_size);

    // ICONDIR
    ico.extend_from_slice(&0u16.to_le_bytes()); // reserved
    ico.extend_from_slice(&1u16.to_le_bytes()); // type: icon
    ico.extend_from_slice(&1u16.to_le_bytes()); // image count

    // ICONDIRENTRY; 0 width/height bytes mean 256.
    ico.push(if width >= 256 { 0 } else { width as u8 });
    ico.push(if height >= 256 { 0 } else { height as u8 });
    ico.push(0); // palette size
    ico.push(0); // reserved
    ico.extend_from_slice(&1u16.to_le_bytes()); // color planes
    ico.extend_from_slice(&32u16.to_le_bytes()); // bits per pixel
    ico.extend_from_slice(&(image_size as u32).to_le_bytes());
    ico.extend_from_slice(&22u32.to_le_bytes()); // image data offset

    // BITMAPINFOHEADER with doubled height covering color + mask.
    ico.extend_from_slice(&40u32.to_le_bytes());
    ico.extend_from_slice(&width.to_le_bytes());
    ico.extend_from_slice(&(height * 2).to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&32u16.to_le_bytes());
    ico.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    ico.extend_from_slice(&((pixel_bytes + mask_bytes) as u32).to_le_bytes());
    ico.extend_from_slice(&0i32.to_le_bytes());
    ico.extend_from_slice(&0i32.to_le_bytes());
    ico.extend_from_slice(&0u32.to_le_bytes());
    ico.extend_from_slice(&0u32.to_le_bytes());

    ico.extend_from_slice(&pixels);
    ico.extend_from_slice(&mask_bits);
    Ok(ico)
}

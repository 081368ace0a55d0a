//! autolib-platform: OS boundary of the automation capability layer.
//!
//! This crate provides:
//! - Input injection (keyboard/mouse synthesis) via `enigo`
//! - Window and focus queries (Win32 / CGWindowList)
//! - Process metadata: product name and application icon
//! - Selected-text query via the macOS Accessibility API
//! - Native key hook backends feeding the key monitor in `autolib-core`
//!
//! ## Module Structure
//!
//! - `adapter` - the `PlatformAdapter` trait plus its native/no-op impls
//! - `capability` - validated facade and the process-wide monitor surface
//! - `hook` - per-OS key hook backends
//! - `window`, `process`, `selection` - per-OS query primitives

mod adapter;
mod capability;
mod hook;
mod process;
mod selection;
mod window;

// Re-export the adapter seam
pub use adapter::{Modifier, MouseButton, NativeAdapter, NoopAdapter, PlatformAdapter};

// Re-export the facade and the monitor surface
pub use capability::{
    is_key_monitor_running, start_key_monitor, stop_key_monitor, Capability,
};

// Re-export the hook backend for callers wiring their own monitor
pub use hook::NativeHookBackend;

// Re-export query types
pub use window::WindowInfo;

//! Foreground application lookup for capture provenance.
//!
//! Best effort: any failure yields an empty [`SourceInfo`], never an error.

use super::types::SourceInfo;

/// Resolves the application and window that owned the foreground at copy time.
pub trait SourceResolver: Send {
    fn resolve(&self) -> SourceInfo;
}

/// Platform resolver for the current foreground window.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForegroundResolver;

impl SourceResolver for ForegroundResolver {
    fn resolve(&self) -> SourceInfo {
        let info = platform::foreground_source();
        tracing::trace!(app = ?info.app, window = ?info.window, "Resolved clipboard source");
        info
    }
}

#[cfg(windows)]
mod platform {
    use super::SourceInfo;
    use sysinfo::{Pid, ProcessesToUpdate, System};
    use winapi::shared::minwindef::DWORD;
    use winapi::um::winuser::{
        GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
    };

    pub(super) fn foreground_source() -> SourceInfo {
        // SAFETY: GetForegroundWindow has no preconditions; a null handle means no foreground window.
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_null() {
            return SourceInfo::default();
        }

        let window = window_title(hwnd);

        let mut pid: DWORD = 0;
        // SAFETY: hwnd came from GetForegroundWindow and pid is a valid out pointer.
        unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
        let app = (pid != 0).then(|| process_name(pid)).flatten();

        SourceInfo { app, window }
    }

    fn window_title(hwnd: winapi::shared::windef::HWND) -> Option<String> {
        // SAFETY: hwnd is a window handle; the buffer is sized from the reported length.
        unsafe {
            let len = GetWindowTextLengthW(hwnd);
            if len <= 0 {
                return None;
            }
            let mut buf = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
            if copied <= 0 {
                return None;
            }
            Some(String::from_utf16_lossy(&buf[..copied as usize]))
        }
    }

    fn process_name(pid: DWORD) -> Option<String> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::SourceInfo;
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};

    pub(super) fn foreground_source() -> SourceInfo {
        // Window titles need accessibility permission; only the app name is resolved.
        SourceInfo {
            app: frontmost_app_name(),
            window: None,
        }
    }

    fn frontmost_app_name() -> Option<String> {
        // SAFETY: plain AppKit getters on the shared workspace; nil results are checked.
        unsafe {
            let workspace_class = Class::get("NSWorkspace")?;
            let workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
            if workspace.is_null() {
                return None;
            }
            let app: *mut Object = msg_send![workspace, frontmostApplication];
            if app.is_null() {
                return None;
            }
            get_nsstring(msg_send![app, localizedName])
        }
    }

    unsafe fn get_nsstring(nsstring: *mut Object) -> Option<String> {
        if nsstring.is_null() {
            return None;
        }
        let utf8: *const std::os::raw::c_char = msg_send![nsstring, UTF8String];
        if utf8.is_null() {
            return None;
        }
        std::ffi::CStr::from_ptr(utf8)
            .to_str()
            .ok()
            .map(|s| s.to_string())
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
mod platform {
    use super::SourceInfo;

    pub(super) fn foreground_source() -> SourceInfo {
        SourceInfo::default()
    }
}

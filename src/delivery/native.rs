//! Direct OS clipboard writes, one implementation per platform.
//!
//! - Windows: raw Win32 calls (open, empty, `GlobalAlloc`, copy, commit, close).
//! - macOS: `pbcopy`.
//! - Other Unix: `wl-copy` under Wayland, otherwise `xclip` or `xsel`.

use std::sync::Arc;

use scancatch_core::ClipboardError;

/// Lowest-level clipboard write available on this platform.
///
/// A write either fully succeeds or leaves nothing allocated behind.
pub trait NativeClipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The native clipboard for the current target.
#[cfg(windows)]
pub fn platform_clipboard() -> Arc<dyn NativeClipboard> {
    Arc::new(win32::Win32Clipboard)
}

/// The native clipboard for the current target.
#[cfg(not(windows))]
pub fn platform_clipboard() -> Arc<dyn NativeClipboard> {
    Arc::new(command::CommandClipboard::detect())
}

#[cfg(windows)]
mod win32 {
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::DataExchange::{
        CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
    };
    use windows::Win32::System::Memory::{
        GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock, GMEM_MOVEABLE,
    };

    use scancatch_core::ClipboardError;

    use super::NativeClipboard;

    const CF_UNICODETEXT: u32 = 13;

    pub struct Win32Clipboard;

    /// Closes the clipboard on every exit path once it has been opened.
    struct OpenGuard;

    impl Drop for OpenGuard {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseClipboard();
            }
        }
    }

    impl NativeClipboard for Win32Clipboard {
        fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            // UTF-16 plus the terminating NUL.
            let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
            let size = wide.len() * std::mem::size_of::<u16>();

            unsafe {
                OpenClipboard(None)
                    .map_err(|e| ClipboardError::Busy(format!("OpenClipboard: {}", e)))?;
                let _open = OpenGuard;

                EmptyClipboard()
                    .map_err(|e| ClipboardError::Busy(format!("EmptyClipboard: {}", e)))?;

                let hglobal = GlobalAlloc(GMEM_MOVEABLE, size)
                    .map_err(|e| ClipboardError::Unavailable(format!("GlobalAlloc: {}", e)))?;

                let ptr = GlobalLock(hglobal) as *mut u16;
                if ptr.is_null() {
                    let _ = GlobalFree(Some(hglobal));
                    return Err(ClipboardError::Unavailable("GlobalLock failed".to_string()));
                }
                std::ptr::copy_nonoverlapping(wide.as_ptr(), ptr, wide.len());
                let _ = GlobalUnlock(hglobal);

                // On success the system owns the allocation.
                if let Err(e) = SetClipboardData(CF_UNICODETEXT, Some(HANDLE(hglobal.0))) {
                    let _ = GlobalFree(Some(hglobal));
                    return Err(ClipboardError::Busy(format!("SetClipboardData: {}", e)));
                }
            }

            Ok(())
        }
    }
}

#[cfg(not(windows))]
mod command {
    use std::io::{ErrorKind, Write};
    use std::process::{Command, Stdio};

    use scancatch_core::ClipboardError;

    use super::NativeClipboard;

    type Tool = (&'static str, &'static [&'static str]);

    const PBCOPY: Tool = ("pbcopy", &[]);
    const WL_COPY: Tool = ("wl-copy", &[]);
    const XCLIP: Tool = ("xclip", &["-selection", "clipboard"]);
    const XSEL: Tool = ("xsel", &["--clipboard", "--input"]);

    /// Pipes the payload into the platform's clipboard tool.
    pub struct CommandClipboard {
        candidates: Vec<Tool>,
    }

    impl CommandClipboard {
        pub fn detect() -> Self {
            let candidates = if cfg!(target_os = "macos") {
                vec![PBCOPY]
            } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
                vec![WL_COPY, XCLIP, XSEL]
            } else {
                vec![XCLIP, XSEL]
            };
            Self { candidates }
        }

        fn run(program: &str, args: &[&str], text: &str) -> Result<(), ClipboardError> {
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| match e.kind() {
                    ErrorKind::NotFound => {
                        ClipboardError::Unavailable(format!("{} not installed", program))
                    }
                    _ => ClipboardError::Busy(format!("{}: {}", program, e)),
                })?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(text.as_bytes())
                    .map_err(|e| ClipboardError::Busy(format!("{}: {}", program, e)))?;
            }

            let output = child
                .wait_with_output()
                .map_err(|e| ClipboardError::Busy(format!("{}: {}", program, e)))?;
            if output.status.success() {
                Ok(())
            } else {
                Err(ClipboardError::Busy(format!(
                    "{} exited with {}: {}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
        }
    }

    impl NativeClipboard for CommandClipboard {
        fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
            // No helper installed only rules out this strategy; later
            // strategies may still reach the clipboard.
            let mut last = ClipboardError::Busy("no clipboard tool found on PATH".to_string());
            for (program, args) in &self.candidates {
                match Self::run(program, args, text) {
                    Ok(()) => return Ok(()),
                    // Missing tool: try the next one.
                    Err(ClipboardError::Unavailable(reason)) => {
                        tracing::debug!(program, %reason, "clipboard tool unavailable");
                    }
                    Err(e) => last = e,
                }
            }
            Err(last)
        }
    }

}

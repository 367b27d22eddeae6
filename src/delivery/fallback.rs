//! Manual copy fallback: show the payload so the operator can copy it by hand.

use std::io::Write;
use std::path::PathBuf;

/// Last resort after every strategy has failed.
pub trait ManualFallback: Send + Sync {
    /// Present `payload` to the operator. Returns the artifact shown.
    fn present(&self, payload: &str) -> std::io::Result<PathBuf>;
}

/// Writes the payload to a temp file and opens it in the default text viewer.
///
/// The file is deliberately kept on disk; the viewer may still be reading it
/// after this returns.
pub struct TextViewerFallback {
    open_viewer: bool,
}

impl TextViewerFallback {
    pub fn new() -> Self {
        Self { open_viewer: true }
    }

    /// Write the file but do not launch a viewer.
    pub fn headless() -> Self {
        Self { open_viewer: false }
    }
}

impl Default for TextViewerFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFallback for TextViewerFallback {
    fn present(&self, payload: &str) -> std::io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix("scancatch-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        if self.open_viewer {
            open::that(&path)?;
        }
        tracing::info!(path = %path.display(), "clipboard unavailable, payload opened for manual copy");
        Ok(path)
    }
}

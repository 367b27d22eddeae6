//! Toolkit-level clipboard access through `arboard`.

use std::sync::Mutex;

use scancatch_core::ClipboardError;

/// Clipboard writes at the UI-toolkit level.
///
/// Calls may block; strategies run them on a blocking worker.
pub trait FrameworkClipboard: Send + Sync {
    /// Plain text write.
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Multi-format write: HTML with a plain-text alternative.
    fn set_rich(&self, text: &str) -> Result<(), ClipboardError>;
}

/// [`FrameworkClipboard`] backed by `arboard`.
///
/// The handle is created lazily and kept alive, since on X11 and Wayland
/// the owning handle must outlive the write for the content to stay
/// available to other applications.
#[derive(Default)]
pub struct ArboardClipboard {
    inner: Mutex<Option<arboard::Clipboard>>,
}

impl ArboardClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_clipboard<F>(&self, f: F) -> Result<(), ClipboardError>
    where
        F: FnOnce(&mut arboard::Clipboard) -> Result<(), arboard::Error>,
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClipboardError::Busy("clipboard handle lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(arboard::Clipboard::new().map_err(classify)?);
        }
        match guard.as_mut() {
            Some(clipboard) => f(clipboard).map_err(classify),
            None => Err(ClipboardError::Unavailable(
                "clipboard handle missing".to_string(),
            )),
        }
    }
}

impl FrameworkClipboard for ArboardClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.with_clipboard(|c| c.set_text(text.to_string()))
    }

    fn set_rich(&self, text: &str) -> Result<(), ClipboardError> {
        let html = format!("<pre>{}</pre>", escape_html(text));
        self.with_clipboard(|c| c.set_html(html, Some(text.to_string())))
    }
}

fn classify(err: arboard::Error) -> ClipboardError {
    match err {
        arboard::Error::ClipboardOccupied => ClipboardError::Busy(err.to_string()),
        other => ClipboardError::Unavailable(other.to_string()),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupied_is_busy() {
        assert!(matches!(
            classify(arboard::Error::ClipboardOccupied),
            ClipboardError::Busy(_)
        ));
        assert!(matches!(
            classify(arboard::Error::ClipboardNotSupported),
            ClipboardError::Unavailable(_)
        ));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"if a < b && c > "d" {}"#),
            "if a &lt; b &amp;&amp; c &gt; &quot;d&quot; {}"
        );
    }
}

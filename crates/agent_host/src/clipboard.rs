//! Clipboard access for the copy-code buttons.

use anyhow::Result;
use parking_lot::Mutex;

pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<()>;
}

/// System clipboard via `arboard`.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        Ok(())
    }
}

/// Keeps the last copied text in memory (headless runs and tests).
#[derive(Default)]
pub struct MemoryClipboard {
    last: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn contents(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        *self.last.lock() = Some(text.to_string());
        Ok(())
    }
}

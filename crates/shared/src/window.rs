//! Browser window model: location, cookies, local storage, `postMessage`
//! channel and custom in-page signals, plus the `Document` it hosts.

use crate::dom::Document;
use crate::events::{BridgeMessage, Envelope, FrameId, PageSignal};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

static NEXT_FRAME: AtomicU64 = AtomicU64::new(1);

/// A change notification from local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

/// Same-origin key/value store with change notifications
#[derive(Clone)]
pub struct Storage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Default for Storage {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }
}

impl Storage {
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value: Some(value.to_string()),
        });
    }

    pub fn remove_item(&self, key: &str) {
        if self.entries.lock().remove(key).is_some() {
            let _ = self.changes.send(StorageChange {
                key: key.to_string(),
                new_value: None,
            });
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

struct WindowInner {
    frame: FrameId,
    origin: String,
    document: Document,
    location: Mutex<String>,
    cookies: Mutex<Vec<(String, String)>>,
    storage: Storage,
    messages: broadcast::Sender<Envelope>,
    signals: broadcast::Sender<PageSignal>,
}

/// Handle to one browsing context. Clones share state.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

impl Window {
    pub fn new(origin: &str) -> Self {
        let (messages, _) = broadcast::channel(64);
        let (signals, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(WindowInner {
                frame: FrameId(NEXT_FRAME.fetch_add(1, Ordering::Relaxed)),
                origin: origin.trim_end_matches('/').to_string(),
                document: Document::new(),
                location: Mutex::new("/".to_string()),
                cookies: Mutex::new(Vec::new()),
                storage: Storage::default(),
                messages,
                signals,
            }),
        }
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    pub fn frame_id(&self) -> FrameId {
        self.inner.frame
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn location_path(&self) -> String {
        self.inner.location.lock().clone()
    }

    /// Client-side route change; like `history.pushState` it fires no event.
    pub fn push_state(&self, path: &str) {
        *self.inner.location.lock() = path.to_string();
    }

    /// Set one cookie from a `name=value` pair.
    pub fn set_cookie(&self, pair: &str) {
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim().to_string();
        let mut cookies = self.inner.cookies.lock();
        cookies.retain(|(n, _)| *n != name);
        cookies.push((name, value.trim().to_string()));
    }

    /// `document.cookie` style string.
    pub fn cookie(&self) -> String {
        self.inner
            .cookies
            .lock()
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn cookie_value(&self, name: &str) -> Option<String> {
        cookie_value(&self.cookie(), name)
    }

    pub fn local_storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Post from this window to itself (`window.postMessage(msg, origin)`).
    pub fn post_message(&self, payload: BridgeMessage) {
        self.post_message_from(self.frame_id(), self.origin(), payload);
    }

    /// Post with an explicit source; used for messages arriving from other frames.
    pub fn post_message_from(&self, source: FrameId, origin: &str, payload: BridgeMessage) {
        let _ = self.inner.messages.send(Envelope::new(source, origin, payload));
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<Envelope> {
        self.inner.messages.subscribe()
    }

    /// Dispatch a custom in-page event.
    pub fn dispatch_signal(&self, signal: PageSignal) {
        tracing::debug!(event = signal.event_name(), "dispatching page signal");
        let _ = self.inner.signals.send(signal);
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<PageSignal> {
        self.inner.signals.subscribe()
    }
}

/// Pull one cookie out of a `document.cookie` string.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (n, v) = pair.split_once('=')?;
            (n == name).then(|| v.to_string())
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_lookup() {
        let cookies = "theme=dark; access_token=abc.def=; other=1";
        assert_eq!(cookie_value(cookies, "access_token"), Some("abc.def=".into()));
        assert_eq!(cookie_value(cookies, "missing"), None);
        assert_eq!(cookie_value("access_token=", "access_token"), None);
    }

    #[test]
    fn test_set_cookie_replaces_existing() {
        let window = Window::new("https://maang.in");
        window.set_cookie("access_token=one");
        window.set_cookie("access_token=two");
        assert_eq!(window.cookie_value("access_token"), Some("two".into()));
        assert_eq!(window.cookie(), "access_token=two");
    }

    #[tokio::test]
    async fn test_storage_notifies_changes() {
        let storage = Storage::default();
        let mut rx = storage.subscribe();
        storage.set_item("course_1_2_cpp", "int main() {}");
        storage.remove_item("course_1_2_cpp");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.new_value.as_deref(), Some("int main() {}"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.new_value, None);
    }

    #[test]
    fn test_windows_get_distinct_frames() {
        let a = Window::new("https://maang.in");
        let b = Window::new("https://maang.in");
        assert_ne!(a.frame_id(), b.frame_id());
    }
}

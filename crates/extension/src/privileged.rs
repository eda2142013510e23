//! Privileged half of the credential bridge.
//!
//! Answers `GET_KEY` from the page with the stored key. Messages are only
//! honoured when they come from this window's own frame and origin and speak
//! the current protocol version.

use services::CredentialStore;
use shared::events::{BridgeMessage, Envelope, BRIDGE_PROTOCOL_VERSION};
use shared::window::Window;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct KeyResponder {
    window: Window,
    store: Arc<CredentialStore>,
}

impl KeyResponder {
    pub fn new(window: Window, store: Arc<CredentialStore>) -> Self {
        Self { window, store }
    }

    fn trusted(&self, envelope: &Envelope) -> bool {
        envelope.version == BRIDGE_PROTOCOL_VERSION
            && envelope.source == self.window.frame_id()
            && envelope.origin == self.window.origin()
    }

    /// Reply for one incoming envelope, if it warrants one.
    pub fn handle(&self, envelope: &Envelope) -> Option<BridgeMessage> {
        if envelope.payload != BridgeMessage::GetKey {
            return None;
        }
        if !self.trusted(envelope) {
            tracing::warn!(
                origin = %envelope.origin,
                version = envelope.version,
                "ignoring key request from untrusted sender"
            );
            return None;
        }
        let key = match self.store.api_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(error = %e, "failed to read credential store");
                None
            }
        };
        Some(BridgeMessage::KeyResult { key })
    }

    /// Serve requests until the window's message channel closes.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.window.subscribe_messages();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Some(reply) = self.handle(&envelope) {
                            self.window.post_message(reply);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "bridge channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::events::FrameId;
    use tempfile::tempdir;

    fn responder(key: Option<&str>) -> (KeyResponder, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = CredentialStore::at_path(dir.path().join("credentials.json"));
        if let Some(key) = key {
            store.set_api_key(key).unwrap();
        }
        let window = Window::new("https://maang.in");
        (KeyResponder::new(window, Arc::new(store)), dir)
    }

    #[test]
    fn test_answers_own_frame_with_stored_key() {
        let (responder, _dir) = responder(Some("AIza-1"));
        let window = responder.window.clone();
        let envelope = Envelope::new(window.frame_id(), window.origin(), BridgeMessage::GetKey);

        assert_eq!(
            responder.handle(&envelope),
            Some(BridgeMessage::KeyResult {
                key: Some("AIza-1".into())
            })
        );
    }

    #[test]
    fn test_missing_key_answers_none() {
        let (responder, _dir) = responder(None);
        let window = responder.window.clone();
        let envelope = Envelope::new(window.frame_id(), window.origin(), BridgeMessage::GetKey);

        assert_eq!(
            responder.handle(&envelope),
            Some(BridgeMessage::KeyResult { key: None })
        );
    }

    #[test]
    fn test_rejects_foreign_frame_origin_and_version() {
        let (responder, _dir) = responder(Some("AIza-1"));
        let window = responder.window.clone();

        let foreign_frame = Envelope::new(FrameId(u64::MAX), window.origin(), BridgeMessage::GetKey);
        let foreign_origin =
            Envelope::new(window.frame_id(), "https://evil.example", BridgeMessage::GetKey);
        let mut old_version = Envelope::new(window.frame_id(), window.origin(), BridgeMessage::GetKey);
        old_version.version = 0;

        assert_eq!(responder.handle(&foreign_frame), None);
        assert_eq!(responder.handle(&foreign_origin), None);
        assert_eq!(responder.handle(&old_version), None);
    }

    #[test]
    fn test_ignores_key_results() {
        let (responder, _dir) = responder(Some("AIza-1"));
        let window = responder.window.clone();
        let envelope = Envelope::new(
            window.frame_id(),
            window.origin(),
            BridgeMessage::KeyResult { key: None },
        );
        assert_eq!(responder.handle(&envelope), None);
    }
}

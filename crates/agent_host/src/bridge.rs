//! Page-side half of the credential bridge.
//!
//! Posts `GET_KEY` on the window channel and waits for the privileged side's
//! `KEY_RESULT`. Correlation is by message type only, so at most one request
//! should be outstanding; the session's send serialization guarantees that.

use shared::agent_api::ApiKey;
use shared::error::AssistantError;
use shared::events::{BridgeMessage, BRIDGE_PROTOCOL_VERSION};
use shared::window::Window;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
pub struct CredentialBridge {
    window: Window,
    timeout: Duration,
}

impl CredentialBridge {
    pub fn new(window: Window, timeout: Duration) -> Self {
        Self { window, timeout }
    }

    /// Ask for a fresh key. The key is never cached here.
    pub async fn request_key(&self) -> Result<ApiKey, AssistantError> {
        // Subscribe before posting so the answer cannot slip past.
        let mut rx = self.window.subscribe_messages();
        let own_frame = self.window.frame_id();
        self.window.post_message(BridgeMessage::GetKey);

        let answer = async {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.version != BRIDGE_PROTOCOL_VERSION
                            || envelope.source != own_frame
                        {
                            continue;
                        }
                        if let BridgeMessage::KeyResult { key } = envelope.payload {
                            return Some(key);
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Some(key)) => key.and_then(ApiKey::new).ok_or(AssistantError::MissingApiKey),
            Ok(None) | Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "credential bridge did not answer");
                Err(AssistantError::CredentialTimeout { timeout_ms })
            }
        }
    }
}

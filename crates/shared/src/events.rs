//! Message vocabulary shared by the content side and the page side.
//!
//! The two sides only talk through custom in-page signals and the window
//! message channel, so everything they exchange is defined here.

use serde::{Deserialize, Serialize};

/// Current version of the bridge envelope
pub const BRIDGE_PROTOCOL_VERSION: u32 = 1;

/// Custom in-page signals (dispatched as named DOM events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageSignal {
    /// Widget DOM is ready, safe to construct a session
    InitChat,
    /// Same route, force a context refresh
    ResetChat,
    /// Session construction acknowledged
    ChatCreated,
    /// Route left the problem page
    TeardownChat,
}

impl PageSignal {
    pub fn event_name(&self) -> &'static str {
        match self {
            PageSignal::InitChat => "initAIChat",
            PageSignal::ResetChat => "resetAIChat",
            PageSignal::ChatCreated => "aiChatCreated",
            PageSignal::TeardownChat => "teardownAIChat",
        }
    }
}

/// Credential bridge payloads, tagged the way they travel over `postMessage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "GET_KEY")]
    GetKey,
    #[serde(rename = "KEY_RESULT")]
    KeyResult { key: Option<String> },
}

/// Identifies the browsing context a message was posted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// One message on the window channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub source: FrameId,
    pub origin: String,
    pub payload: BridgeMessage,
}

impl Envelope {
    pub fn new(source: FrameId, origin: impl Into<String>, payload: BridgeMessage) -> Self {
        Self {
            version: BRIDGE_PROTOCOL_VERSION,
            source,
            origin: origin.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_event_names() {
        assert_eq!(PageSignal::InitChat.event_name(), "initAIChat");
        assert_eq!(PageSignal::ResetChat.event_name(), "resetAIChat");
        assert_eq!(PageSignal::ChatCreated.event_name(), "aiChatCreated");
        assert_eq!(PageSignal::TeardownChat.event_name(), "teardownAIChat");
    }

    #[test]
    fn test_bridge_messages_use_type_tags() {
        let json = serde_json::to_value(&BridgeMessage::GetKey).unwrap();
        assert_eq!(json, serde_json::json!({"type": "GET_KEY"}));

        let result: BridgeMessage =
            serde_json::from_str(r#"{"type": "KEY_RESULT", "key": "abc"}"#).unwrap();
        assert_eq!(
            result,
            BridgeMessage::KeyResult {
                key: Some("abc".into())
            }
        );
    }
}

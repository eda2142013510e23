//! Error taxonomy for the assistant.
//!
//! Every failure is caught at the boundary of the operation that started it and
//! turned into a no-op, a log entry, or one chat bubble. `ErrorKind` decides which.

/// Broad failure classes, each with its own handling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-actionable (no API key); surfaced as a specific chat message
    Configuration,
    /// Profile/problem/model fetch failed; logged, degrade gracefully
    TransientNetwork,
    /// Expected host element missing; retried, then abandoned silently
    Environment,
    /// Markdown library unavailable; downgraded with a one-time notice
    Rendering,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("No API key configured")]
    MissingApiKey,

    #[error("Credential bridge did not answer within {timeout_ms}ms")]
    CredentialTimeout { timeout_ms: u64 },

    #[error("Request failed: {0}")]
    Network(#[from] anyhow::Error),

    #[error("{what} not found in page")]
    EnvironmentNotReady { what: String },

    #[error("Markdown renderer unavailable after {attempts} attempts")]
    RendererUnavailable { attempts: u32 },

    #[error("Session is no longer live")]
    SessionClosed,
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::MissingApiKey | AssistantError::CredentialTimeout { .. } => {
                ErrorKind::Configuration
            }
            AssistantError::Network(_) | AssistantError::SessionClosed => {
                ErrorKind::TransientNetwork
            }
            AssistantError::EnvironmentNotReady { .. } => ErrorKind::Environment,
            AssistantError::RendererUnavailable { .. } => ErrorKind::Rendering,
        }
    }

    /// Text for the chat bubble shown when a send fails.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Configuration => {
                "I need an API key before I can answer. Open the extension settings, paste your key and save it, then ask again."
            }
            _ => "Sorry, I encountered an error. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_distinct_from_network() {
        let missing = AssistantError::MissingApiKey;
        let network = AssistantError::Network(anyhow::anyhow!("connection reset"));

        assert_eq!(missing.kind(), ErrorKind::Configuration);
        assert_eq!(network.kind(), ErrorKind::TransientNetwork);
        assert_ne!(missing.user_message(), network.user_message());
    }

    #[test]
    fn test_bridge_timeout_counts_as_configuration() {
        let err = AssistantError::CredentialTimeout { timeout_ms: 5000 };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn test_page_environment_errors() {
        let host = AssistantError::EnvironmentNotReady {
            what: "scroll host".into(),
        };
        let renderer = AssistantError::RendererUnavailable { attempts: 50 };

        assert_eq!(host.kind(), ErrorKind::Environment);
        assert_eq!(host.to_string(), "scroll host not found in page");
        assert_eq!(renderer.kind(), ErrorKind::Rendering);
        assert!(renderer.to_string().contains("50 attempts"));
    }
}

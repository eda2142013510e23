pub mod dom;
pub mod error;
pub mod events;
pub mod route;
pub mod wait;
pub mod window;

/// Well-known ids and classes of the injected widget
pub mod widget {
    pub const WRAPPER_CLASS: &str = "ai-chat-wrapper";
    pub const CONTAINER_ID: &str = "chat-container";
    pub const HEADER_ID: &str = "chat-header";
    pub const CLOSE_BUTTON_ID: &str = "close-chat";
    pub const MESSAGES_ID: &str = "chat-messages";
    pub const INPUT_ROW_ID: &str = "chat-input-container";
    pub const INPUT_ID: &str = "user-input";
    pub const SEND_BUTTON_ID: &str = "send-message";
    pub const TRIGGER_ID: &str = "ask-ai-btn";
    pub const HIDDEN_CLASS: &str = "hidden";
    pub const COPY_BUTTON_CLASS: &str = "copy-code-btn";
}

pub mod settings {
    use serde::{Deserialize, Serialize};

    /// Selectors the host page is expected to expose on a problem page.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PageSelectors {
        /// Scrollable left panel the widget is appended to
        pub scroll_host: String,
        /// Element whose text is the selected programming language
        pub language_indicator: String,
    }

    /// Site REST endpoints used for personalization
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PlatformEndpoints {
        pub api_base: String,       // e.g., "https://api2.maang.in"
        pub profile_path: String,   // e.g., "/users/profile/private"
        pub problem_path: String,   // e.g., "/problems/user/"
        pub auth_cookie: String,    // cookie holding the bearer token
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ModelProvider {
        pub gemini_base_url: String,
        pub gemini_model: String, // e.g., "gemini-pro"
        pub request_timeout_secs: u64,
    }

    /// Retry and timeout knobs for the bounded waits
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct TimingSettings {
        pub mount_retry_interval_ms: u64,
        pub mount_timeout_ms: u64,
        pub renderer_poll_interval_ms: u64,
        pub renderer_max_attempts: u32,
        pub credential_timeout_ms: u64,
        pub copy_ack_ms: u64,
    }

    /// Markers used to find (and avoid duplicating) injected assets
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AssetSettings {
        pub stylesheet_id: String,
        pub stylesheet_href: String,
        pub renderer_script_src: String,
        pub session_script_src: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct AssistantSettings {
        pub problem_route_prefix: String,
        pub selectors: PageSelectors,
        pub platform: PlatformEndpoints,
        pub model: ModelProvider,
        pub timing: TimingSettings,
        pub assets: AssetSettings,
    }

    impl Default for PageSelectors {
        fn default() -> Self {
            Self {
                scroll_host: ".coding_leftside_scroll__CMpky.pb-5".into(),
                language_indicator: ".d-flex.align-items-center.gap-1.text-blue-dark".into(),
            }
        }
    }

    impl Default for PlatformEndpoints {
        fn default() -> Self {
            Self {
                api_base: "https://api2.maang.in".into(),
                profile_path: "/users/profile/private".into(),
                problem_path: "/problems/user/".into(),
                auth_cookie: "access_token".into(),
            }
        }
    }

    impl Default for ModelProvider {
        fn default() -> Self {
            Self {
                gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
                gemini_model: "gemini-pro".into(),
                request_timeout_secs: 45,
            }
        }
    }

    impl Default for TimingSettings {
        fn default() -> Self {
            Self {
                mount_retry_interval_ms: 500,
                mount_timeout_ms: 10_000,
                renderer_poll_interval_ms: 100,
                renderer_max_attempts: 50,
                credential_timeout_ms: 5_000,
                copy_ack_ms: 2_000,
            }
        }
    }

    impl Default for AssetSettings {
        fn default() -> Self {
            Self {
                stylesheet_id: "ai-assistant-styles".into(),
                stylesheet_href: "style.css".into(),
                renderer_script_src: "marked.min.js".into(),
                session_script_src: "script.js".into(),
            }
        }
    }

    impl Default for AssistantSettings {
        fn default() -> Self {
            Self {
                problem_route_prefix: "/problems/".into(),
                selectors: PageSelectors::default(),
                platform: PlatformEndpoints::default(),
                model: ModelProvider::default(),
                timing: TimingSettings::default(),
                assets: AssetSettings::default(),
            }
        }
    }

    /// Base URL injected asset paths resolve against
    pub const EXTENSION_BASE_URL: &str = "chrome-extension://problem-assistant/";

    impl AssetSettings {
        pub fn asset_url(file: &str) -> String {
            format!("{}{}", EXTENSION_BASE_URL, file.trim_start_matches('/'))
        }
    }

    impl TimingSettings {
        /// Number of mount attempts that fit in the mount timeout.
        pub fn mount_attempts(&self) -> u32 {
            let interval = self.mount_retry_interval_ms.max(1);
            (self.mount_timeout_ms / interval).max(1) as u32
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use zeroize::Zeroizing;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    impl Role {
        pub fn label(&self) -> &'static str {
            match self {
                Role::User => "User",
                Role::Assistant => "Assistant",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: Role::User,
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: Role::Assistant,
                content: content.into(),
            }
        }
    }

    /// Problem metadata fetched once per session
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProblemContext {
        pub title: String,
        pub body: String,
        pub input_format: String,
        pub output_format: String,
        pub constraints: String,
        pub solution_hint: String,
        pub reference_solution: String,
    }

    /// API key handed out for a single request (zeroed on drop)
    #[derive(Clone)]
    pub struct ApiKey(Zeroizing<String>);

    impl ApiKey {
        /// Returns `None` for blank input.
        pub fn new(raw: impl Into<String>) -> Option<Self> {
            let raw = Zeroizing::new(raw.into());
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Self(Zeroizing::new(trimmed.to_string())))
            }
        }

        pub fn expose(&self) -> &str {
            self.0.as_str()
        }
    }

    impl fmt::Debug for ApiKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("ApiKey(<redacted>)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::agent_api::ApiKey;
    use super::settings::{AssistantSettings, TimingSettings};

    #[test]
    fn test_api_key_rejects_blank_and_redacts() {
        assert!(ApiKey::new("   ").is_none());
        let key = ApiKey::new(" abc123 ").unwrap();
        assert_eq!(key.expose(), "abc123");
        assert_eq!(format!("{:?}", key), "ApiKey(<redacted>)");
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let json = r#"{"problem_route_prefix": "/practice/", "timing": {"mount_timeout_ms": 2000}}"#;
        let settings: AssistantSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.problem_route_prefix, "/practice/");
        assert_eq!(settings.timing.mount_timeout_ms, 2000);
        assert_eq!(settings.timing.mount_retry_interval_ms, 500);
        assert_eq!(settings.platform.auth_cookie, "access_token");
    }

    #[test]
    fn test_mount_attempts_cover_timeout() {
        assert_eq!(TimingSettings::default().mount_attempts(), 20);
    }
}

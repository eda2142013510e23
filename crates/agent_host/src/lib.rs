//! Agent Host - page-side chat sessions for the coding assistant
//!
//! This crate provides:
//! - The per-page chat session (history, problem context, request cycle)
//! - The session manager that reacts to page signals
//! - The page half of the credential bridge
//! - Prompt construction and markdown rendering for replies

pub mod bridge;
pub mod clipboard;
pub mod manager;
pub mod prompts;
pub mod renderer;
pub mod session;

pub use bridge::CredentialBridge;
pub use clipboard::{Clipboard, MemoryClipboard, SystemClipboard};
pub use manager::{ManagerHandle, SessionManager};
pub use prompts::{build_prompt, greeting, Preamble};
pub use renderer::{MarkdownEngine, PulldownEngine, RendererGate, RendererState};
pub use session::{ChatSession, SessionDeps, SessionState, SubmitOutcome};

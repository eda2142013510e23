//! Services the assistant talks to outside the session itself:
//! the site's REST API, the extension's credential storage and the page's
//! local code cache.

pub mod code_cache;
pub mod credential_store;
pub mod platform;

pub use code_cache::CodeCache;
pub use credential_store::CredentialStore;
pub use platform::{PlatformClient, ProblemSource, StudentProfile};

//! Problem Assistant - content side of the extension
//!
//! Wires the pieces that live next to the host page:
//! - the navigation watcher and widget mounter
//! - the privileged key responder
//! - the page-side session manager (from `agent_host`)

pub mod config;
pub mod host_page;
pub mod mounter;
pub mod privileged;
pub mod watcher;

use agent_host::{ManagerHandle, SessionDeps};
use services::CredentialStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use watcher::NavigationWatcher;

/// Everything running for one page
pub struct Extension {
    pub watcher: Arc<NavigationWatcher>,
    pub sessions: ManagerHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Extension {
    /// Start all page-side and privileged pieces. Needs a tokio runtime.
    ///
    /// The session manager subscribes before the watcher's eager first run,
    /// so an immediate `initAIChat` is never missed.
    pub fn launch(deps: SessionDeps, store: Arc<CredentialStore>) -> Self {
        let window = deps.window.clone();
        let settings = deps.settings.clone();

        let responder = privileged::KeyResponder::new(window.clone(), store).spawn();
        let sessions = ManagerHandle::spawn(deps);
        let watcher = NavigationWatcher::new(window, &settings);
        let watch_task = watcher.spawn();

        tracing::debug!("extension launched");
        Self {
            watcher,
            sessions,
            tasks: vec![responder, watch_task],
        }
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        self.sessions.shutdown();
    }
}

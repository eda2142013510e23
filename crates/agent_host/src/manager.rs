//! Owns the page's single live chat session.
//!
//! The manager reacts to page signals: `InitChat` replaces the session,
//! `ResetChat` restarts the conversation in place and `TeardownChat` drops it.
//! The old session is always torn down before the new one attaches.

use crate::session::{ChatSession, SessionDeps};
use parking_lot::Mutex;
use shared::events::PageSignal;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct SessionManager {
    deps: SessionDeps,
    current: Option<ChatSession>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&ChatSession> {
        self.current.as_ref()
    }

    /// Tear down whichever session was live, then install the one `make` builds.
    pub fn replace(&mut self, make: impl FnOnce(SessionDeps) -> ChatSession) -> ChatSession {
        self.teardown();
        let session = make(self.deps.clone());
        self.current = Some(session.clone());
        session
    }

    /// Tear down the live session (if any) and start a fresh one.
    pub fn start_new(&mut self) -> ChatSession {
        self.replace(ChatSession::start)
    }

    pub fn teardown(&mut self) {
        if let Some(old) = self.current.take() {
            old.teardown();
        }
    }

    pub fn handle_signal(&mut self, signal: PageSignal) {
        match signal {
            PageSignal::InitChat => {
                let session = self.start_new();
                tracing::info!(session = %session.id(), "chat session started");
                self.deps.window.dispatch_signal(PageSignal::ChatCreated);
            }
            PageSignal::ResetChat => match self.current.clone() {
                Some(session) => {
                    tokio::spawn(async move { session.reset_in_place().await });
                }
                None => tracing::debug!("reset requested without a live session"),
            },
            PageSignal::TeardownChat => self.teardown(),
            PageSignal::ChatCreated => {}
        }
    }
}

/// Running manager listening to the window's signals
pub struct ManagerHandle {
    manager: Arc<Mutex<SessionManager>>,
    task: JoinHandle<()>,
}

impl ManagerHandle {
    /// Start listening. The subscription exists when this returns.
    pub fn spawn(deps: SessionDeps) -> Self {
        let mut signals = deps.window.subscribe_signals();
        let manager = Arc::new(Mutex::new(SessionManager::new(deps)));
        let task = tokio::spawn({
            let manager = manager.clone();
            async move {
                loop {
                    match signals.recv().await {
                        Ok(signal) => manager.lock().handle_signal(signal),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "page signals lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
        Self { manager, task }
    }

    pub fn current(&self) -> Option<ChatSession> {
        self.manager.lock().current().cloned()
    }

    pub fn shutdown(self) {
        self.task.abort();
        self.manager.lock().teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{deps, problem_page, FakeModel};
    use crate::session::SessionState;
    use shared::widget;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_init_replaces_previous_session() {
        let window = problem_page();
        let mut manager = SessionManager::new(deps(&window, FakeModel::replying("ok")));

        let first = manager.start_new();
        let second = manager.start_new();
        settle().await;

        assert_eq!(first.state(), SessionState::TornDown);
        assert!(second.is_live());
        assert_eq!(manager.current().unwrap().id(), second.id());
        assert_eq!(window.document().listener_count(widget::SEND_BUTTON_ID), 1);
    }

    #[tokio::test]
    async fn test_replace_detaches_old_session_before_building() {
        let window = problem_page();
        let mut manager = SessionManager::new(deps(&window, FakeModel::replying("ok")));
        let old = manager.start_new();

        let mut listeners_while_building = None;
        let new = manager.replace(|deps| {
            assert_eq!(old.state(), SessionState::TornDown);
            listeners_while_building = Some(window.document().listener_count(widget::SEND_BUTTON_ID));
            ChatSession::start(deps)
        });
        settle().await;

        assert_eq!(listeners_while_building, Some(0));
        assert_eq!(manager.current().unwrap().id(), new.id());
        assert_eq!(window.document().listener_count(widget::SEND_BUTTON_ID), 1);
    }

    #[tokio::test]
    async fn test_signals_drive_session_lifecycle() {
        let window = problem_page();
        let mut created = window.subscribe_signals();
        let handle = ManagerHandle::spawn(deps(&window, FakeModel::replying("ok")));

        window.dispatch_signal(PageSignal::InitChat);
        settle().await;
        let session = handle.current().expect("session after init");
        let mut saw_created = false;
        while let Ok(signal) = created.try_recv() {
            saw_created |= signal == PageSignal::ChatCreated;
        }
        assert!(saw_created);

        window.dispatch_signal(PageSignal::TeardownChat);
        settle().await;
        assert!(handle.current().is_none());
        assert!(!session.is_live());
        assert_eq!(window.document().listener_count(widget::INPUT_ID), 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_reset_keeps_same_session() {
        let window = problem_page();
        let handle = ManagerHandle::spawn(deps(&window, FakeModel::replying("ok")));
        window.dispatch_signal(PageSignal::InitChat);
        settle().await;
        let before = handle.current().unwrap().id();

        window.dispatch_signal(PageSignal::ResetChat);
        settle().await;

        assert_eq!(handle.current().unwrap().id(), before);
        handle.shutdown();
    }
}

//! Route tracking for a single-page app that never fires navigation events.
//!
//! Every DOM mutation batch is treated as a potential navigation: the current
//! path is compared with the recorded one, and a difference tears the widget
//! down and (on a problem route) starts a bounded mount attempt. Batches on
//! an unchanged route only keep the widget anchored at the end of its host.

use crate::mounter::WidgetMounter;
use parking_lot::Mutex;
use shared::dom::DomEventKind;
use shared::error::AssistantError;
use shared::events::PageSignal;
use shared::route::ProblemRoutes;
use shared::settings::AssistantSettings;
use shared::wait::{await_condition, RetryPolicy, WaitOutcome};
use shared::widget;
use shared::window::Window;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub current_path: Option<String>,
    pub mounted: bool,
}

pub struct NavigationWatcher {
    window: Window,
    mounter: WidgetMounter,
    routes: ProblemRoutes,
    mount_policy: RetryPolicy,
    state: Mutex<NavigationState>,
    pending_mount: Mutex<Option<JoinHandle<()>>>,
}

impl NavigationWatcher {
    pub fn new(window: Window, settings: &AssistantSettings) -> Arc<Self> {
        let timing = &settings.timing;
        Arc::new(Self {
            mounter: WidgetMounter::new(window.document().clone(), settings.clone()),
            routes: ProblemRoutes::new(&settings.problem_route_prefix),
            mount_policy: RetryPolicy::fixed(
                Duration::from_millis(timing.mount_retry_interval_ms),
                timing.mount_attempts(),
            ),
            window,
            state: Mutex::new(NavigationState::default()),
            pending_mount: Mutex::new(None),
        })
    }

    pub fn mounter(&self) -> &WidgetMounter {
        &self.mounter
    }

    pub fn state(&self) -> NavigationState {
        self.state.lock().clone()
    }

    /// Re-check the location. Returns whether a route transition happened.
    pub fn on_potential_navigation(self: &Arc<Self>) -> bool {
        let path = self.window.location_path();
        let was_mounted = {
            let mut state = self.state.lock();
            if state.current_path.as_deref() == Some(path.as_str()) {
                let mounted = state.mounted;
                drop(state);
                if mounted {
                    self.keep_anchored();
                }
                return false;
            }
            state.current_path = Some(path.clone());
            std::mem::replace(&mut state.mounted, false)
        };

        tracing::info!(%path, "route changed");
        self.cancel_pending_mount();
        if was_mounted {
            self.window.dispatch_signal(PageSignal::TeardownChat);
        }
        self.mounter.unmount();

        if self.routes.is_problem_route(&path) {
            self.spawn_mount(path);
        }
        true
    }

    fn keep_anchored(self: &Arc<Self>) {
        match (self.mounter.find_host(), self.mounter.is_mounted()) {
            (Some(host), true) => {
                self.mounter.reanchor(host);
            }
            (_, false) => {
                // The page re-rendered the widget away on the same route
                let path = {
                    let mut state = self.state.lock();
                    state.mounted = false;
                    state.current_path.clone()
                };
                tracing::info!("chat widget disappeared, remounting");
                self.window.dispatch_signal(PageSignal::TeardownChat);
                if let Some(path) = path {
                    self.spawn_mount(path);
                }
            }
            (None, true) => {}
        }
    }

    fn cancel_pending_mount(&self) {
        if let Some(handle) = self.pending_mount.lock().take() {
            handle.abort();
        }
    }

    fn spawn_mount(self: &Arc<Self>, path: String) {
        let watcher = self.clone();
        let handle = tokio::spawn(async move {
            let outcome =
                await_condition(watcher.mount_policy, || watcher.mounter.find_host().is_some())
                    .await;
            if outcome == WaitOutcome::TimedOut {
                let e = AssistantError::EnvironmentNotReady {
                    what: "scroll host".into(),
                };
                tracing::warn!(
                    %path,
                    attempts = watcher.mount_policy.max_attempts,
                    error = %e,
                    "widget not mounted"
                );
                return;
            }
            watcher.finish_mount(&path);
        });
        if let Some(previous) = self.pending_mount.lock().replace(handle) {
            previous.abort();
        }
    }

    fn finish_mount(&self, path: &str) {
        {
            let mut state = self.state.lock();
            if state.current_path.as_deref() != Some(path) || state.mounted {
                return;
            }
            let Some(host) = self.mounter.find_host() else {
                return;
            };
            self.mounter.mount(host);
            state.mounted = true;
        }
        self.window.dispatch_signal(PageSignal::InitChat);
    }

    /// Ask the live session to start over on the same route.
    pub fn request_reset(&self) -> bool {
        if !self.state.lock().mounted {
            return false;
        }
        self.window.dispatch_signal(PageSignal::ResetChat);
        true
    }

    /// Run once now, then follow mutations and widget button clicks.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let document = self.window.document();
        let mut observer = document.observe();
        let mut trigger = document.listen(widget::TRIGGER_ID);
        let mut close = document.listen(widget::CLOSE_BUTTON_ID);
        self.on_potential_navigation();

        let watcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    batch = observer.next_batch() => match batch {
                        Some(_) => {
                            watcher.on_potential_navigation();
                        }
                        None => break,
                    },
                    Some(ev) = trigger.recv() => {
                        if ev.kind == DomEventKind::Click {
                            watcher.mounter.expand();
                        }
                    }
                    Some(ev) = close.recv() => {
                        if ev.kind == DomEventKind::Click {
                            watcher.mounter.collapse();
                        }
                    }
                    else => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_page::HostPage;
    use crate::mounter::Visibility;

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<PageSignal>) -> Vec<PageSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_problem_route_mounts_and_inits() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let mut signals = page.window.subscribe_signals();
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());

        assert!(watcher.on_potential_navigation());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(watcher.state().mounted);
        assert!(watcher.mounter().is_mounted());
        assert_eq!(drain(&mut signals), vec![PageSignal::InitChat]);
        assert!(!watcher.on_potential_navigation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_problem_route_tears_down() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());
        watcher.on_potential_navigation();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut signals = page.window.subscribe_signals();

        page.push_route_only("/dashboard");
        assert!(watcher.on_potential_navigation());

        assert!(!watcher.mounter().is_mounted());
        assert_eq!(drain(&mut signals), vec![PageSignal::TeardownChat]);
        assert_eq!(
            watcher.state(),
            NavigationState {
                current_path: Some("/dashboard".into()),
                mounted: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_gives_up_without_host() {
        let page = HostPage::new();
        page.push_route_only("/problems/two-sum-1234");
        let mut signals = page.window.subscribe_signals();
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());

        watcher.on_potential_navigation();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!watcher.state().mounted);
        assert!(drain(&mut signals).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_appearing_late_is_picked_up() {
        let page = HostPage::new();
        page.push_route_only("/problems/two-sum-1234");
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());
        watcher.on_potential_navigation();

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(!watcher.state().mounted);
        page.navigate("/problems/two-sum-1234", Some("cpp"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(watcher.state().mounted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_only_when_mounted() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());
        assert!(!watcher.request_reset());

        watcher.on_potential_navigation();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut signals = page.window.subscribe_signals();
        assert!(watcher.request_reset());
        assert_eq!(drain(&mut signals), vec![PageSignal::ResetChat]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_and_close_buttons() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let watcher = NavigationWatcher::new(page.window.clone(), &AssistantSettings::default());
        let task = watcher.spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let doc = page.window.document();

        doc.click(widget::TRIGGER_ID);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher.mounter().visibility(), Visibility::Expanded);

        doc.click(widget::CLOSE_BUTTON_ID);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher.mounter().visibility(), Visibility::Collapsed);
        task.abort();
    }
}

//! One chat session bound to the widget currently in the page.
//!
//! A session owns the conversation history, the problem context and the
//! student id. It attaches its own listeners to the widget on start and drops
//! every one of them on teardown, so a replaced session can never answer a
//! click meant for its successor. Replies that arrive after teardown are
//! discarded.

use crate::bridge::CredentialBridge;
use crate::clipboard::Clipboard;
use crate::prompts::{build_prompt, greeting, Preamble, APOLOGY, DEGRADED_NOTICE};
use crate::renderer::{MarkdownEngine, RenderedMessage, RendererGate, RendererState};
use parking_lot::Mutex;
use providers::LanguageModel;
use services::code_cache::{CodeCache, CodeKey};
use services::ProblemSource;
use shared::agent_api::{ChatMessage, ProblemContext, Role};
use shared::dom::{DomEvent, DomEventKind, ElementSpec, NodeId};
use shared::error::{AssistantError, ErrorKind};
use shared::route::ProblemRoutes;
use shared::settings::AssistantSettings;
use shared::wait::RetryPolicy;
use shared::widget;
use shared::window::Window;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    FetchingProfile,
    FetchingProblem,
    Ready,
    Sending,
    TornDown,
}

/// What happened to a submitted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A request cycle ran for it
    Sent,
    /// Parked until the session is idle again
    Queued,
    /// Blank input, full queue, or a dead session
    Ignored,
}

/// Everything a session needs from its surroundings
#[derive(Clone)]
pub struct SessionDeps {
    pub window: Window,
    pub settings: AssistantSettings,
    pub problems: Arc<dyn ProblemSource>,
    pub model: Arc<dyn LanguageModel>,
    pub engine: Arc<dyn MarkdownEngine>,
    pub clipboard: Arc<dyn Clipboard>,
}

struct SessionData {
    state: SessionState,
    history: Vec<ChatMessage>,
    problem: Option<ProblemContext>,
    student_id: Option<String>,
    current_code: Option<String>,
    code_key: Option<String>,
    preamble_delivered: bool,
    queued: Option<String>,
    degraded_notice_shown: bool,
    /// Bumped on reset so replies to the old conversation are dropped
    epoch: u64,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            history: Vec::new(),
            problem: None,
            student_id: None,
            current_code: None,
            code_key: None,
            preamble_delivered: false,
            queued: None,
            degraded_notice_shown: false,
            epoch: 0,
        }
    }
}

struct SessionShared {
    id: Uuid,
    deps: SessionDeps,
    routes: ProblemRoutes,
    bridge: CredentialBridge,
    gate: RendererGate,
    code_cache: CodeCache,
    data: Mutex<SessionData>,
    alive: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap handle; clones share one session.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<SessionShared>,
}

impl ChatSession {
    /// Create a session, attach its listeners and start loading context.
    ///
    /// Must be called inside a tokio runtime. Listeners are registered before
    /// this returns.
    pub fn start(deps: SessionDeps) -> Self {
        let timing = deps.settings.timing.clone();
        let document = deps.window.document().clone();
        let gate = RendererGate::new(
            deps.engine.clone(),
            document.clone(),
            &deps.settings.assets.renderer_script_src,
            RetryPolicy::fixed(
                Duration::from_millis(timing.renderer_poll_interval_ms),
                timing.renderer_max_attempts,
            ),
        );
        let shared = Arc::new(SessionShared {
            id: Uuid::new_v4(),
            routes: ProblemRoutes::new(&deps.settings.problem_route_prefix),
            bridge: CredentialBridge::new(
                deps.window.clone(),
                Duration::from_millis(timing.credential_timeout_ms),
            ),
            gate,
            code_cache: CodeCache::new(deps.window.local_storage().clone()),
            deps,
            data: Mutex::new(SessionData::default()),
            alive: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        });
        let session = Self { shared };
        tracing::debug!(session = %session.id(), "chat session created");

        let handles = vec![
            session.spawn_event_loop(),
            session.spawn_code_watch(),
            session.spawn_renderer_wait(),
            tokio::spawn({
                let session = session.clone();
                async move { session.initialize().await }
            }),
        ];
        session.shared.tasks.lock().extend(handles);
        session
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.data.lock().state
    }

    pub fn is_live(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.shared.data.lock().history.clone()
    }

    pub fn problem(&self) -> Option<ProblemContext> {
        self.shared.data.lock().problem.clone()
    }

    pub fn student_id(&self) -> Option<String> {
        self.shared.data.lock().student_id.clone()
    }

    pub fn current_code(&self) -> Option<String> {
        self.shared.data.lock().current_code.clone()
    }

    pub fn renderer_state(&self) -> RendererState {
        self.shared.gate.state()
    }

    fn window(&self) -> &Window {
        &self.shared.deps.window
    }

    fn settings(&self) -> &AssistantSettings {
        &self.shared.deps.settings
    }

    fn thinking_id(&self) -> String {
        format!("thinking-{}", self.shared.id)
    }

    fn spawn_event_loop(&self) -> JoinHandle<()> {
        let document = self.window().document().clone();
        // Registered here, not inside the task, so no early event is missed.
        let mut send_button = document.listen(widget::SEND_BUTTON_ID);
        let mut input = document.listen(widget::INPUT_ID);
        let mut messages = document.listen(widget::MESSAGES_ID);
        let weak = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(ev) = send_button.recv() => Trigger::Submit(ev),
                    Some(ev) = input.recv() => Trigger::Input(ev),
                    Some(ev) = messages.recv() => Trigger::Messages(ev),
                    else => break,
                };
                let Some(session) = upgrade(&weak) else { break };
                match event {
                    Trigger::Submit(ev) if ev.kind == DomEventKind::Click => {
                        tokio::spawn(async move {
                            session.submit().await;
                        });
                    }
                    Trigger::Input(ev) if ev.is_enter_without_shift() => {
                        tokio::spawn(async move {
                            session.submit().await;
                        });
                    }
                    Trigger::Messages(ev) if ev.kind == DomEventKind::Click => {
                        session.handle_copy_click(ev.target);
                    }
                    _ => {}
                }
            }
        })
    }

    fn spawn_code_watch(&self) -> JoinHandle<()> {
        let mut changes = self.shared.code_cache.watch();
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                let Some(session) = upgrade(&weak) else { break };
                let mut data = session.shared.data.lock();
                if data.code_key.as_deref() == Some(change.key.as_str()) {
                    tracing::trace!(key = %change.key, "cached code changed");
                    data.current_code = change.new_value;
                }
            }
        })
    }

    fn spawn_renderer_wait(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let Some(session) = upgrade(&weak) else { return };
            let state = session.shared.gate.wait_until_ready().await;
            if state == RendererState::Degraded && session.is_live() {
                session.show_degraded_notice();
            }
        })
    }

    /// Load identity, problem metadata and code, then become ready.
    async fn initialize(&self) {
        self.set_state(SessionState::FetchingProfile);
        let token = self.auth_token();

        if let Some(token) = token.as_deref() {
            match self.shared.deps.problems.fetch_profile(token).await {
                Ok(profile) => self.shared.data.lock().student_id = Some(profile.id),
                Err(e) => tracing::warn!(error = %e, "failed to fetch student profile"),
            }
        } else {
            tracing::info!("no access token cookie, skipping personalization");
        }
        if !self.is_live() {
            return;
        }

        self.set_state(SessionState::FetchingProblem);
        let problem = self.fetch_problem(token.as_deref()).await;
        if !self.is_live() {
            return;
        }
        self.shared.data.lock().problem = problem;
        self.refresh_code();

        self.set_state(SessionState::Ready);
        tracing::debug!(session = %self.id(), "chat session ready");
        self.drain_queue().await;
    }

    fn auth_token(&self) -> Option<String> {
        self.window()
            .cookie_value(&self.settings().platform.auth_cookie)
            .filter(|t| !t.is_empty())
    }

    async fn fetch_problem(&self, token: Option<&str>) -> Option<ProblemContext> {
        let path = self.window().location_path();
        let problem_id = self.shared.routes.problem_id(&path);
        let (Some(token), Some(problem_id)) = (token, problem_id) else {
            tracing::debug!(%path, "problem context unavailable");
            return None;
        };
        match self
            .shared
            .deps
            .problems
            .fetch_problem(token, &problem_id)
            .await
        {
            Ok(problem) => Some(problem),
            Err(e) => {
                tracing::warn!(problem_id = %problem_id, error = %e, "failed to fetch problem");
                None
            }
        }
    }

    /// Re-resolve the code cache key and read the latest draft.
    pub fn refresh_code(&self) -> Option<String> {
        let path = self.window().location_path();
        let problem_id = self.shared.routes.problem_id(&path);
        let document = self.window().document();
        let language = document
            .query_selector(&self.settings().selectors.language_indicator)
            .map(|node| document.text_content(node));

        let mut data = self.shared.data.lock();
        match CodeKey::resolve(
            data.student_id.as_deref(),
            problem_id.as_deref(),
            language.as_deref(),
        ) {
            Ok(key) => {
                let code = self.shared.code_cache.lookup(&key);
                data.code_key = Some(key.storage_key());
                data.current_code = code.clone();
                code
            }
            Err(missing) => {
                tracing::debug!(?missing, "code cache key incomplete");
                data.code_key = None;
                data.current_code = None;
                None
            }
        }
    }

    /// Send whatever is in the input field.
    pub async fn submit(&self) -> SubmitOutcome {
        let document = self.window().document();
        let Some(input) = document.get_element_by_id(widget::INPUT_ID) else {
            return SubmitOutcome::Ignored;
        };
        let text = document.value(input);
        self.send_message(&text).await
    }

    /// Run one request cycle for `text`, or queue it while the session is busy.
    ///
    /// At most one request is in flight per session and at most one message
    /// waits behind it; further submissions are ignored until it drains.
    pub async fn send_message(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }
        {
            let mut data = self.shared.data.lock();
            if !self.is_live() {
                return SubmitOutcome::Ignored;
            }
            match data.state {
                SessionState::Ready => data.state = SessionState::Sending,
                SessionState::TornDown => return SubmitOutcome::Ignored,
                _ if data.queued.is_none() => {
                    data.queued = Some(text.to_string());
                    drop(data);
                    self.clear_input();
                    tracing::debug!("session busy, message queued");
                    return SubmitOutcome::Queued;
                }
                _ => {
                    tracing::debug!("session busy and queue full, message ignored");
                    return SubmitOutcome::Ignored;
                }
            }
        }

        self.run_cycle(text.to_string()).await;
        self.drain_queue().await;
        SubmitOutcome::Sent
    }

    async fn drain_queue(&self) {
        loop {
            let next = {
                let mut data = self.shared.data.lock();
                if data.state != SessionState::Ready || !self.is_live() {
                    return;
                }
                let Some(next) = data.queued.take() else { return };
                data.state = SessionState::Sending;
                next
            };
            self.run_cycle(next).await;
        }
    }

    /// One full request cycle. Expects the state to already be `Sending`.
    async fn run_cycle(&self, text: String) {
        let epoch = {
            let mut data = self.shared.data.lock();
            data.history.push(ChatMessage::user(text.clone()));
            data.epoch
        };
        self.append_bubble(Role::User, &text);
        self.clear_input();
        self.show_thinking();

        let result = self.request_reply().await;

        if !self.is_live() {
            tracing::debug!("session torn down, dropping reply");
            return;
        }
        self.remove_thinking();

        let current = {
            let mut data = self.shared.data.lock();
            if data.state == SessionState::Sending {
                data.state = SessionState::Ready;
            }
            data.epoch == epoch
        };
        if !current {
            tracing::debug!("conversation was reset, dropping reply");
            return;
        }

        match result {
            Ok(reply) => {
                {
                    let mut data = self.shared.data.lock();
                    data.history.push(ChatMessage::assistant(reply.clone()));
                    data.preamble_delivered = true;
                }
                self.append_assistant(&reply);
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Configuration => tracing::warn!(error = %e, "cannot reach the model"),
                    _ => tracing::error!(error = %e, "model request failed"),
                }
                self.append_error(&e);
            }
        }
    }

    async fn request_reply(&self) -> Result<String, AssistantError> {
        self.refresh_code();
        let key = self.shared.bridge.request_key().await?;
        if !self.is_live() {
            return Err(AssistantError::SessionClosed);
        }

        let prompt = {
            let data = self.shared.data.lock();
            let code = data.current_code.as_deref();
            let preamble = if data.preamble_delivered {
                Preamble::Reminder { code }
            } else {
                Preamble::Full {
                    problem: data.problem.as_ref(),
                    code,
                }
            };
            build_prompt(&preamble, &data.history)
        };

        let reply = self.shared.deps.model.generate(&key, &prompt).await?;
        Ok(reply)
    }

    /// Start the conversation over without rebuilding the widget.
    pub async fn reset_in_place(&self) {
        if !self.is_live() {
            return;
        }
        {
            let mut data = self.shared.data.lock();
            data.history.clear();
            data.problem = None;
            data.queued = None;
            data.preamble_delivered = false;
            data.epoch += 1;
            if data.state != SessionState::Sending {
                data.state = SessionState::FetchingProblem;
            }
        }
        let document = self.window().document();
        if let Some(messages) = document.get_element_by_id(widget::MESSAGES_ID) {
            document.set_text(messages, "");
        }
        tracing::info!(session = %self.id(), "conversation reset");

        let token = self.auth_token();
        let problem = self.fetch_problem(token.as_deref()).await;
        if !self.is_live() {
            return;
        }
        {
            let mut data = self.shared.data.lock();
            data.problem = problem.clone();
            if data.state == SessionState::FetchingProblem {
                data.state = SessionState::Ready;
            }
        }
        self.refresh_code();
        self.append_assistant(&greeting(problem.as_ref()));
        self.drain_queue().await;
    }

    /// Detach every listener and stop all background work. Idempotent.
    pub fn teardown(&self) {
        if !self.shared.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.shared.tasks.lock().drain(..) {
            handle.abort();
        }
        *self.shared.data.lock() = SessionData {
            state: SessionState::TornDown,
            ..SessionData::default()
        };
        self.remove_thinking();
        tracing::debug!(session = %self.id(), "chat session torn down");
    }

    fn set_state(&self, state: SessionState) {
        let mut data = self.shared.data.lock();
        if data.state != SessionState::TornDown {
            data.state = state;
        }
    }

    fn clear_input(&self) {
        let document = self.window().document();
        if let Some(input) = document.get_element_by_id(widget::INPUT_ID) {
            document.set_value(input, "");
        }
    }

    fn append_to_messages(&self, node: NodeId) {
        let document = self.window().document();
        let Some(messages) = document.get_element_by_id(widget::MESSAGES_ID) else {
            tracing::debug!("message list missing, bubble dropped");
            return;
        };
        document.append_child(messages, node);
        document.scroll_to_bottom(messages);
    }

    fn bubble(class: &str) -> ElementSpec {
        ElementSpec::new("div")
            .class("message")
            .class(class)
            .attr("data-time", &chrono::Utc::now().format("%H:%M").to_string())
    }

    fn append_bubble(&self, role: Role, text: &str) {
        let class = match role {
            Role::User => "user-message",
            Role::Assistant => "ai-message",
        };
        let node = self
            .window()
            .document()
            .create_element(Self::bubble(class).text(text));
        self.append_to_messages(node);
    }

    fn append_assistant(&self, text: &str) {
        let document = self.window().document();
        let node = document.create_element(Self::bubble("ai-message"));
        match self.shared.gate.render(text) {
            RenderedMessage::Text(text) => document.set_text(node, &text),
            RenderedMessage::Html { html, code_blocks } => {
                document.set_inner_html(node, &html);
                for code in code_blocks {
                    let button = document.create_element(
                        ElementSpec::new("button")
                            .class(widget::COPY_BUTTON_CLASS)
                            .attr("data-code", &code)
                            .text("Copy"),
                    );
                    document.append_child(node, button);
                }
            }
        }
        self.append_to_messages(node);
    }

    fn append_error(&self, error: &AssistantError) {
        let text = match error.kind() {
            ErrorKind::Configuration => error.user_message(),
            _ => APOLOGY,
        };
        let node = self
            .window()
            .document()
            .create_element(Self::bubble("ai-message").class("error-message").text(text));
        self.append_to_messages(node);
    }

    fn show_degraded_notice(&self) {
        {
            let mut data = self.shared.data.lock();
            if data.degraded_notice_shown {
                return;
            }
            data.degraded_notice_shown = true;
        }
        let node = self
            .window()
            .document()
            .create_element(Self::bubble("system-message").text(DEGRADED_NOTICE));
        self.append_to_messages(node);
    }

    fn show_thinking(&self) {
        let document = self.window().document();
        let mut spec = ElementSpec::new("div")
            .id(&self.thinking_id())
            .class("thinking-bubble");
        for _ in 0..3 {
            spec = spec.child(ElementSpec::new("span").class("thinking-dot"));
        }
        let node = document.create_element(spec);
        self.append_to_messages(node);
    }

    fn remove_thinking(&self) {
        let document = self.window().document();
        if let Some(node) = document.get_element_by_id(&self.thinking_id()) {
            document.remove(node);
        }
    }

    fn handle_copy_click(&self, target: NodeId) {
        let document = self.window().document().clone();
        if !document.has_class(target, widget::COPY_BUTTON_CLASS) {
            return;
        }
        let Some(code) = document.attr(target, "data-code") else {
            return;
        };
        if let Err(e) = self.shared.deps.clipboard.set_text(&code) {
            tracing::warn!(error = %e, "copy to clipboard failed");
            return;
        }
        document.set_text(target, "Copied!");
        document.add_class(target, "copied");

        let ack = Duration::from_millis(self.settings().timing.copy_ack_ms);
        tokio::spawn(async move {
            tokio::time::sleep(ack).await;
            if document.contains(target) {
                document.set_text(target, "Copy");
                document.remove_class(target, "copied");
            }
        });
    }
}

enum Trigger {
    Submit(DomEvent),
    Input(DomEvent),
    Messages(DomEvent),
}

fn upgrade(weak: &Weak<SessionShared>) -> Option<ChatSession> {
    let shared = weak.upgrade()?;
    if !shared.alive.load(Ordering::SeqCst) {
        return None;
    }
    Some(ChatSession { shared })
}

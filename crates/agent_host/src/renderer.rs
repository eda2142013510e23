//! Markdown rendering with a readiness gate.
//!
//! The library may load late or not at all. The gate polls for it a bounded
//! number of times, reinjecting its script tag when the page dropped it, and
//! otherwise falls back to an escape-everything renderer that only keeps
//! fenced code blocks.

use parking_lot::Mutex;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use shared::dom::{Document, ElementSpec};
use shared::error::AssistantError;
use shared::settings::AssetSettings;
use shared::wait::{await_condition, RetryPolicy, WaitOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Pending,
    Ready,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Single newlines become line breaks
    pub breaks: bool,
    /// Tables, strikethrough, task lists and friends
    pub permissive: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            breaks: true,
            permissive: true,
        }
    }
}

pub trait MarkdownEngine: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn configure(&self, options: RenderOptions);
    fn render(&self, markdown: &str) -> String;
}

/// `pulldown-cmark`, considered loaded while its script tag is in the page.
pub struct PulldownEngine {
    document: Document,
    script_src: String,
    options: Mutex<RenderOptions>,
}

impl PulldownEngine {
    pub fn new(document: Document, script_src: &str) -> Self {
        Self {
            document,
            script_src: script_src.to_string(),
            options: Mutex::new(RenderOptions {
                breaks: false,
                permissive: false,
            }),
        }
    }
}

impl MarkdownEngine for PulldownEngine {
    fn is_loaded(&self) -> bool {
        script_present(&self.document, &self.script_src)
    }

    fn configure(&self, options: RenderOptions) {
        *self.options.lock() = options;
    }

    fn render(&self, markdown: &str) -> String {
        let options = *self.options.lock();
        let mut parser_options = Options::empty();
        if options.permissive {
            parser_options.insert(Options::ENABLE_TABLES);
            parser_options.insert(Options::ENABLE_STRIKETHROUGH);
            parser_options.insert(Options::ENABLE_TASKLISTS);
        }
        let parser = Parser::new_ext(markdown, parser_options).map(|event| match event {
            Event::SoftBreak if options.breaks => Event::HardBreak,
            other => other,
        });
        let mut out = String::new();
        html::push_html(&mut out, parser);
        out
    }
}

fn script_present(document: &Document, src_marker: &str) -> bool {
    document
        .query_selector(&format!("script[src*=\"{}\"]", src_marker))
        .is_some()
}

/// Contents of every code block in a markdown message, in order.
pub fn code_blocks(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => current = Some(String::new()),
            Event::Text(text) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(buf) = current.take() {
                    blocks.push(buf);
                }
            }
            _ => {}
        }
    }
    blocks
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

/// Degraded-mode rendering: everything escaped, ``` fences become `<pre><code>`.
pub fn fallback_render(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    loop {
        let Some(open) = rest.find("```") else {
            out.push_str(&escape_html(rest).replace('\n', "<br>"));
            break;
        };
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            // Unterminated fence stays as text
            out.push_str(&escape_html(rest).replace('\n', "<br>"));
            break;
        };
        out.push_str(&escape_html(&rest[..open]).replace('\n', "<br>"));
        let block = &after_open[..close];
        // Drop the language tag on the opening line
        let code = match block.split_once('\n') {
            Some((first, body)) if !first.trim().contains(' ') => body,
            _ => block,
        };
        out.push_str("<pre><code>");
        out.push_str(&escape_html(code.trim_end_matches('\n')));
        out.push_str("</code></pre>");
        rest = &after_open[close + 3..];
    }
    out
}

/// What to put into an assistant bubble
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMessage {
    /// Plain text content (renderer still pending)
    Text(String),
    /// Rendered markup; `code_blocks` get copy buttons
    Html {
        html: String,
        code_blocks: Vec<String>,
    },
}

pub struct RendererGate {
    engine: Arc<dyn MarkdownEngine>,
    document: Document,
    script_src: String,
    policy: RetryPolicy,
    state: Mutex<RendererState>,
    configured: AtomicBool,
}

impl RendererGate {
    pub fn new(
        engine: Arc<dyn MarkdownEngine>,
        document: Document,
        script_src: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            document,
            script_src: script_src.to_string(),
            policy,
            state: Mutex::new(RendererState::Pending),
            configured: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> RendererState {
        *self.state.lock()
    }

    fn reinject_script(&self) {
        tracing::warn!(src = %self.script_src, "renderer script missing, reinjecting");
        let script = self.document.create_element(
            ElementSpec::new("script")
                .attr("type", "text/javascript")
                .attr("src", &AssetSettings::asset_url(&self.script_src)),
        );
        self.document.append_child(self.document.head(), script);
    }

    /// Poll until the library is usable; settles on `Ready` or `Degraded`.
    pub async fn wait_until_ready(&self) -> RendererState {
        let current = self.state();
        if current != RendererState::Pending {
            return current;
        }

        let outcome = await_condition(self.policy, || {
            if self.engine.is_loaded() {
                return true;
            }
            if !script_present(&self.document, &self.script_src) {
                self.reinject_script();
            }
            false
        })
        .await;

        let next = match outcome {
            WaitOutcome::Ready => {
                if !self.configured.swap(true, Ordering::SeqCst) {
                    self.engine.configure(RenderOptions::default());
                }
                tracing::debug!("markdown renderer ready");
                RendererState::Ready
            }
            WaitOutcome::TimedOut => {
                let e = AssistantError::RendererUnavailable {
                    attempts: self.policy.max_attempts,
                };
                tracing::warn!(error = %e, "using fallback renderer");
                RendererState::Degraded
            }
        };
        *self.state.lock() = next;
        next
    }

    pub fn render(&self, text: &str) -> RenderedMessage {
        match self.state() {
            RendererState::Pending => RenderedMessage::Text(text.to_string()),
            RendererState::Ready => RenderedMessage::Html {
                html: self.engine.render(text),
                code_blocks: code_blocks(text),
            },
            RendererState::Degraded => RenderedMessage::Html {
                html: fallback_render(text),
                code_blocks: Vec::new(),
            },
        }
    }
}

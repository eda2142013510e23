//! A stand-in for the practice site's single-page app.
//!
//! Routes are switched the way the site does it: history push plus a re-render
//! of the app root, with no navigation event.

use shared::dom::{ElementSpec, NodeId};
use shared::window::Window;

const SITE_ORIGIN: &str = "https://maang.in";
const APP_ROOT_ID: &str = "app-root";

pub struct HostPage {
    pub window: Window,
}

impl HostPage {
    /// Empty app shell at `/`.
    pub fn new() -> Self {
        let window = Window::new(SITE_ORIGIN);
        let doc = window.document();
        let root = doc.create_element(ElementSpec::new("div").id(APP_ROOT_ID));
        doc.append_child(doc.body(), root);
        Self { window }
    }

    /// Shell already showing the problem at `path`.
    pub fn problem(path: &str, language: &str) -> Self {
        let page = Self::new();
        page.navigate(path, Some(language));
        page
    }

    fn app_root(&self) -> Option<NodeId> {
        self.window.document().get_element_by_id(APP_ROOT_ID)
    }

    /// Client-side route change. `language` set means a problem view.
    pub fn navigate(&self, path: &str, language: Option<&str>) {
        let doc = self.window.document();
        self.window.push_state(path);
        let Some(root) = self.app_root() else {
            return;
        };
        for child in doc.children(root) {
            doc.remove(child);
        }

        let view = match language {
            Some(language) => ElementSpec::new("div")
                .class("problem-view")
                .child(
                    ElementSpec::new("div")
                        .class("coding_leftside_scroll__CMpky")
                        .class("pb-5")
                        .child(ElementSpec::new("div").class("problem-statement").text(path)),
                )
                .child(
                    ElementSpec::new("div")
                        .class("d-flex")
                        .class("align-items-center")
                        .class("gap-1")
                        .class("text-blue-dark")
                        .text(language),
                ),
            None => ElementSpec::new("div").class("dashboard").text(path),
        };
        let view = doc.create_element(view);
        doc.append_child(root, view);
    }

    /// Route change that leaves the rendered view alone (history only).
    pub fn push_route_only(&self, path: &str) {
        self.window.push_state(path);
    }

    /// Add a late-rendered panel to the end of the scroll host.
    pub fn append_to_host(&self, spec: ElementSpec) -> Option<NodeId> {
        let doc = self.window.document();
        let host = doc.query_selector(".coding_leftside_scroll__CMpky.pb-5")?;
        let node = doc.create_element(spec);
        doc.append_child(host, node);
        Some(node)
    }

    pub fn set_language(&self, language: &str) {
        let doc = self.window.document();
        if let Some(node) = doc.query_selector(".d-flex.align-items-center.gap-1.text-blue-dark") {
            doc.set_text(node, language);
        }
    }
}

impl Default for HostPage {
    fn default() -> Self {
        Self::new()
    }
}

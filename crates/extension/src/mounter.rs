//! Builds, moves and removes the chat widget inside the host page.
//!
//! Every operation is an existence check first, so calling any of them twice
//! leaves the page exactly as calling it once.

use parking_lot::Mutex;
use shared::dom::{Document, ElementSpec, NodeId};
use shared::settings::{AssetSettings, AssistantSettings};
use shared::widget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Collapsed,
    Expanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
}

pub struct WidgetMounter {
    document: Document,
    settings: AssistantSettings,
    visibility: Mutex<Visibility>,
}

impl WidgetMounter {
    pub fn new(document: Document, settings: AssistantSettings) -> Self {
        Self {
            document,
            settings,
            visibility: Mutex::new(Visibility::Collapsed),
        }
    }

    pub fn find_host(&self) -> Option<NodeId> {
        self.document
            .query_selector(&self.settings.selectors.scroll_host)
    }

    pub fn is_mounted(&self) -> bool {
        self.document
            .get_element_by_id(widget::CONTAINER_ID)
            .is_some()
    }

    fn wrapper(&self) -> Option<NodeId> {
        self.document
            .query_selector(&format!(".{}", widget::WRAPPER_CLASS))
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.lock()
    }

    /// Stylesheet, markdown library and session script, each at most once.
    fn ensure_assets(&self) {
        let assets = &self.settings.assets;
        let doc = &self.document;

        if doc.get_element_by_id(&assets.stylesheet_id).is_none() {
            let link = doc.create_element(
                ElementSpec::new("link")
                    .id(&assets.stylesheet_id)
                    .attr("rel", "stylesheet")
                    .attr("href", &AssetSettings::asset_url(&assets.stylesheet_href)),
            );
            doc.append_child(doc.head(), link);
        }

        if !self.script_present(&assets.renderer_script_src) {
            let script = doc.create_element(
                ElementSpec::new("script")
                    .attr("type", "text/javascript")
                    .attr("src", &AssetSettings::asset_url(&assets.renderer_script_src)),
            );
            doc.append_child(doc.head(), script);
        }

        if !self.script_present(&assets.session_script_src) {
            let script = doc.create_element(
                ElementSpec::new("script")
                    .attr("type", "text/javascript")
                    .attr("src", &AssetSettings::asset_url(&assets.session_script_src)),
            );
            doc.append_child(doc.body(), script);
        }
    }

    fn script_present(&self, src_marker: &str) -> bool {
        self.document
            .query_selector(&script_selector(src_marker))
            .is_some()
    }

    fn build_widget(&self) -> NodeId {
        let container = ElementSpec::new("div")
            .id(widget::CONTAINER_ID)
            .class(widget::HIDDEN_CLASS)
            .child(
                ElementSpec::new("div")
                    .id(widget::HEADER_ID)
                    .child(ElementSpec::new("h3").text("AI Coding Assistant"))
                    .child(
                        ElementSpec::new("button")
                            .id(widget::CLOSE_BUTTON_ID)
                            .text("×"),
                    ),
            )
            .child(ElementSpec::new("div").id(widget::MESSAGES_ID))
            .child(
                ElementSpec::new("div")
                    .id(widget::INPUT_ROW_ID)
                    .child(
                        ElementSpec::new("textarea")
                            .id(widget::INPUT_ID)
                            .attr("placeholder", "Ask about this problem..."),
                    )
                    .child(
                        ElementSpec::new("button")
                            .id(widget::SEND_BUTTON_ID)
                            .text("Send"),
                    ),
            );

        self.document.create_element(
            ElementSpec::new("div")
                .class(widget::WRAPPER_CLASS)
                .child(
                    ElementSpec::new("button")
                        .id(widget::TRIGGER_ID)
                        .text("Ask AI"),
                )
                .child(container),
        )
    }

    /// Build the widget under `host`. No-op when it already exists.
    pub fn mount(&self, host: NodeId) -> MountOutcome {
        if self.is_mounted() {
            return MountOutcome::AlreadyMounted;
        }
        self.ensure_assets();
        let wrapper = self.build_widget();
        self.document.append_child(host, wrapper);
        *self.visibility.lock() = Visibility::Collapsed;
        tracing::info!("chat widget mounted");
        MountOutcome::Mounted
    }

    /// Remove the widget and the per-session script. Returns whether anything was removed.
    pub fn unmount(&self) -> bool {
        let doc = &self.document;
        let mut removed = false;
        if let Some(wrapper) = self.wrapper() {
            removed |= doc.remove(wrapper);
        }
        // Stray pieces left behind by a page that re-parented them
        for id in [widget::CONTAINER_ID, widget::TRIGGER_ID] {
            while let Some(node) = doc.get_element_by_id(id) {
                removed |= doc.remove(node);
            }
        }
        for script in doc.query_selector_all(&script_selector(&self.settings.assets.session_script_src)) {
            doc.remove(script);
        }
        *self.visibility.lock() = Visibility::Collapsed;
        if removed {
            tracing::info!("chat widget unmounted");
        }
        removed
    }

    /// Move the wrapper back to the end of `host`. Returns whether it moved.
    pub fn reanchor(&self, host: NodeId) -> bool {
        let Some(wrapper) = self.wrapper() else {
            return false;
        };
        if self.document.last_element_child(host) == Some(wrapper) {
            return false;
        }
        let moved = self.document.append_child(host, wrapper);
        if moved {
            tracing::debug!("chat widget re-anchored");
        }
        moved
    }

    pub fn expand(&self) {
        self.set_visibility(Visibility::Expanded);
        if let Some(host) = self.find_host() {
            self.document.scroll_to_bottom(host);
        }
        if let Some(messages) = self.document.get_element_by_id(widget::MESSAGES_ID) {
            self.document.scroll_to_bottom(messages);
        }
    }

    pub fn collapse(&self) {
        self.set_visibility(Visibility::Collapsed);
    }

    pub fn toggle(&self) {
        match self.visibility() {
            Visibility::Collapsed => self.expand(),
            Visibility::Expanded => self.collapse(),
        }
    }

    fn set_visibility(&self, visibility: Visibility) {
        *self.visibility.lock() = visibility;
        let doc = &self.document;
        let (container, trigger) = (
            doc.get_element_by_id(widget::CONTAINER_ID),
            doc.get_element_by_id(widget::TRIGGER_ID),
        );
        match visibility {
            Visibility::Expanded => {
                if let Some(c) = container {
                    doc.remove_class(c, widget::HIDDEN_CLASS);
                }
                if let Some(t) = trigger {
                    doc.add_class(t, widget::HIDDEN_CLASS);
                }
            }
            Visibility::Collapsed => {
                if let Some(c) = container {
                    doc.add_class(c, widget::HIDDEN_CLASS);
                }
                if let Some(t) = trigger {
                    doc.remove_class(t, widget::HIDDEN_CLASS);
                }
            }
        }
    }
}

fn script_selector(src_marker: &str) -> String {
    format!("script[src*=\"{}\"]", src_marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_page::HostPage;

    fn mounter(page: &HostPage) -> WidgetMounter {
        WidgetMounter::new(page.window.document().clone(), AssistantSettings::default())
    }

    #[test]
    fn test_mount_is_idempotent() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let mounter = mounter(&page);
        let host = mounter.find_host().unwrap();

        assert_eq!(mounter.mount(host), MountOutcome::Mounted);
        assert_eq!(mounter.mount(host), MountOutcome::AlreadyMounted);

        let doc = page.window.document();
        assert_eq!(doc.count_by_id(widget::CONTAINER_ID), 1);
        assert_eq!(doc.count_by_id(widget::TRIGGER_ID), 1);
        assert_eq!(doc.count_by_id("ai-assistant-styles"), 1);
        assert_eq!(doc.query_selector_all(r#"script[src*="marked.min.js"]"#).len(), 1);
        assert_eq!(doc.query_selector_all(r#"script[src*="script.js"]"#).len(), 1);
    }

    #[test]
    fn test_unmount_keeps_stylesheet_and_library() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let mounter = mounter(&page);
        mounter.mount(mounter.find_host().unwrap());

        assert!(mounter.unmount());
        assert!(!mounter.unmount());

        let doc = page.window.document();
        assert_eq!(doc.count_by_id(widget::CONTAINER_ID), 0);
        assert_eq!(doc.count_by_id(widget::TRIGGER_ID), 0);
        assert_eq!(doc.count_by_id("ai-assistant-styles"), 1);
        assert_eq!(doc.query_selector_all(r#"script[src*="marked.min.js"]"#).len(), 1);
        assert!(doc.query_selector(r#"script[src*="script.js"]"#).is_none());
    }

    #[test]
    fn test_reanchor_moves_existing_wrapper() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let mounter = mounter(&page);
        let host = mounter.find_host().unwrap();
        mounter.mount(host);
        let doc = page.window.document();
        let messages = doc.get_element_by_id(widget::MESSAGES_ID).unwrap();

        page.append_to_host(ElementSpec::new("div").class("late-panel"));
        assert!(mounter.reanchor(host));
        assert!(!mounter.reanchor(host));

        let last = doc.last_element_child(host).unwrap();
        assert!(doc.has_class(last, widget::WRAPPER_CLASS));
        assert_eq!(doc.get_element_by_id(widget::MESSAGES_ID), Some(messages));
    }

    #[test]
    fn test_visibility_projects_onto_hidden_class() {
        let page = HostPage::problem("/problems/two-sum-1234", "cpp");
        let mounter = mounter(&page);
        mounter.mount(mounter.find_host().unwrap());
        let doc = page.window.document();
        let container = doc.get_element_by_id(widget::CONTAINER_ID).unwrap();
        let trigger = doc.get_element_by_id(widget::TRIGGER_ID).unwrap();

        assert_eq!(mounter.visibility(), Visibility::Collapsed);
        assert!(doc.has_class(container, widget::HIDDEN_CLASS));

        mounter.toggle();
        assert_eq!(mounter.visibility(), Visibility::Expanded);
        assert!(!doc.has_class(container, widget::HIDDEN_CLASS));
        assert!(doc.has_class(trigger, widget::HIDDEN_CLASS));
        assert!(doc.is_scrolled_to_bottom(mounter.find_host().unwrap()));

        mounter.collapse();
        assert!(doc.has_class(container, widget::HIDDEN_CLASS));
        assert!(!doc.has_class(trigger, widget::HIDDEN_CLASS));
    }
}

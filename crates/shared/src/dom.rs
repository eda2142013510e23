//! In-memory document tree standing in for the host page DOM.
//!
//! Supports the subset the assistant needs:
//! - element creation from an `ElementSpec` builder
//! - id lookup and compound selectors (`tag#id.a.b[src*="x"]`)
//! - structural mutation notifications (child list changes only)
//! - DOM events that bubble through ancestor ids, with listener registration counts

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Builder for an element subtree
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        for c in class.split_whitespace() {
            self.classes.push(c.to_string());
        }
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: BTreeMap<String, String>,
    text: String,
    inner_html: Option<String>,
    value: String,
    scroll_top: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
        };
        let root = tree.build(ElementSpec::new("html"));
        let head = tree.build(ElementSpec::new("head"));
        let body = tree.build(ElementSpec::new("body"));
        tree.attach(root, head);
        tree.attach(root, body);
        tree.root = root;
        tree.head = head;
        tree.body = body;
        tree
    }

    fn build(&mut self, spec: ElementSpec) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let node = Node {
            tag: spec.tag,
            id: spec.id,
            classes: spec.classes,
            attrs: spec.attrs.into_iter().collect(),
            text: spec.text,
            inner_html: None,
            value: String::new(),
            scroll_top: 0,
            parent: None,
            children: Vec::new(),
        };
        self.nodes.insert(id, node);
        for child in spec.children {
            let child_id = self.build(child);
            self.attach(id, child_id);
        }
        id
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        Some(parent)
    }

    fn drop_subtree(&mut self, node: NodeId) {
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                self.drop_subtree(child);
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(&node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node) && self.is_ancestor(self.root, node)
    }

    /// Attached nodes in document order.
    fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn text_content(&self, node: NodeId, out: &mut String) {
        if let Some(n) = self.nodes.get(&node) {
            out.push_str(&n.text);
            for child in &n.children {
                self.text_content(*child, out);
            }
        }
    }

    /// Ids of `node` and its ancestors, innermost first.
    fn id_path(&self, node: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            match self.nodes.get(&id) {
                Some(n) => {
                    if let Some(elem_id) = &n.id {
                        path.push(elem_id.clone());
                    }
                    current = n.parent;
                }
                None => break,
            }
        }
        path
    }
}

/// Compound selector: optional tag, id, classes and attribute tests.
#[derive(Debug, Default)]
struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug)]
enum AttrTest {
    Present(String),
    Equals(String, String),
    Contains(String, String),
}

impl Selector {
    fn parse(input: &str) -> Self {
        let mut sel = Selector::default();
        let mut rest = input.trim();

        let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        if tag_end > 0 {
            sel.tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let body = &rest[1..];
                    let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                    let name = body[..end].to_string();
                    if first == '#' {
                        sel.id = Some(name);
                    } else {
                        sel.classes.push(name);
                    }
                    rest = &body[end..];
                }
                '[' => {
                    let end = rest.find(']').unwrap_or(rest.len());
                    let inner = &rest[1..end];
                    sel.attrs.push(Self::parse_attr(inner));
                    rest = if end < rest.len() { &rest[end + 1..] } else { "" };
                }
                _ => break,
            }
        }
        sel
    }

    fn parse_attr(inner: &str) -> AttrTest {
        let unquote = |v: &str| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        if let Some((name, value)) = inner.split_once("*=") {
            AttrTest::Contains(name.trim().to_string(), unquote(value))
        } else if let Some((name, value)) = inner.split_once('=') {
            AttrTest::Equals(name.trim().to_string(), unquote(value))
        } else {
            AttrTest::Present(inner.trim().to_string())
        }
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if &node.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| node.classes.contains(c)) {
            return false;
        }
        self.attrs.iter().all(|test| match test {
            AttrTest::Present(name) => node.attrs.contains_key(name),
            AttrTest::Equals(name, value) => node.attrs.get(name) == Some(value),
            AttrTest::Contains(name, value) => node
                .attrs
                .get(name)
                .map_or(false, |v| v.contains(value.as_str())),
        })
    }
}

/// A structural change to some element's child list
#[derive(Debug, Clone)]
pub struct Mutation {
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEventKind {
    Click,
    KeyDown { key: String, shift: bool },
}

#[derive(Debug, Clone)]
pub struct DomEvent {
    pub target: NodeId,
    pub kind: DomEventKind,
    /// Element ids from the target up to the root (bubbling order)
    pub path: Vec<String>,
}

impl DomEvent {
    pub fn is_enter_without_shift(&self) -> bool {
        matches!(&self.kind, DomEventKind::KeyDown { key, shift } if key == "Enter" && !*shift)
    }
}

struct DocumentInner {
    tree: Mutex<Tree>,
    mutations: broadcast::Sender<Mutation>,
    events: broadcast::Sender<DomEvent>,
    listeners: Mutex<HashMap<String, usize>>,
}

/// Shared handle to the page document; clones point at the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let (mutations, _) = broadcast::channel(256);
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DocumentInner {
                tree: Mutex::new(Tree::new()),
                mutations,
                events,
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn head(&self) -> NodeId {
        self.inner.tree.lock().head
    }

    pub fn body(&self) -> NodeId {
        self.inner.tree.lock().body
    }

    fn notify(&self, target: NodeId) {
        // No observers is fine
        let _ = self.inner.mutations.send(Mutation { target });
    }

    /// Build a detached subtree.
    pub fn create_element(&self, spec: ElementSpec) -> NodeId {
        self.inner.tree.lock().build(spec)
    }

    /// Append (or move) `child` to the end of `parent`.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let old_parent = {
            let mut tree = self.inner.tree.lock();
            if !tree.nodes.contains_key(&parent)
                || !tree.nodes.contains_key(&child)
                || tree.is_ancestor(child, parent)
            {
                return false;
            }
            let old = tree.detach(child);
            tree.attach(parent, child);
            old
        };
        if let Some(old) = old_parent {
            if old != parent {
                self.notify(old);
            }
        }
        self.notify(parent);
        true
    }

    /// Detach and discard a node with its subtree. Returns false if unknown.
    pub fn remove(&self, node: NodeId) -> bool {
        let parent = {
            let mut tree = self.inner.tree.lock();
            if !tree.nodes.contains_key(&node) {
                return false;
            }
            let parent = tree.detach(node);
            tree.drop_subtree(node);
            parent
        };
        if let Some(parent) = parent {
            self.notify(parent);
        }
        true
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.inner.tree.lock().is_attached(node)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        let tree = self.inner.tree.lock();
        tree.walk()
            .into_iter()
            .find(|n| tree.nodes.get(n).and_then(|node| node.id.as_deref()) == Some(id))
    }

    /// Number of attached elements carrying `id` (should never exceed one).
    pub fn count_by_id(&self, id: &str) -> usize {
        let tree = self.inner.tree.lock();
        tree.walk()
            .into_iter()
            .filter(|n| tree.nodes.get(n).and_then(|node| node.id.as_deref()) == Some(id))
            .count()
    }

    pub fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    pub fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        let sel = Selector::parse(selector);
        let tree = self.inner.tree.lock();
        tree.walk()
            .into_iter()
            .filter(|n| tree.nodes.get(n).map_or(false, |node| sel.matches(node)))
            .collect()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.lock().nodes.get(&node)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .tree
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn last_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.lock().nodes.get(&node)?.children.last().copied()
    }

    pub fn element_id(&self, node: NodeId) -> Option<String> {
        self.inner.tree.lock().nodes.get(&node)?.id.clone()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.inner.tree.lock().text_content(node, &mut out);
        out
    }

    /// Replace the node's children with plain text.
    pub fn set_text(&self, node: NodeId, text: &str) {
        {
            let mut tree = self.inner.tree.lock();
            let children = match tree.nodes.get_mut(&node) {
                Some(n) => {
                    n.text = text.to_string();
                    n.inner_html = None;
                    std::mem::take(&mut n.children)
                }
                None => return,
            };
            for child in children {
                tree.drop_subtree(child);
            }
        }
        self.notify(node);
    }

    pub fn set_inner_html(&self, node: NodeId, html: &str) {
        {
            let mut tree = self.inner.tree.lock();
            let Some(n) = tree.nodes.get_mut(&node) else {
                return;
            };
            n.inner_html = Some(html.to_string());
        }
        self.notify(node);
    }

    pub fn inner_html(&self, node: NodeId) -> Option<String> {
        self.inner.tree.lock().nodes.get(&node)?.inner_html.clone()
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner.tree.lock().nodes.get(&node)?.attrs.get(name).cloned()
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.inner.tree.lock().nodes.get_mut(&node) {
            n.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.inner
            .tree
            .lock()
            .nodes
            .get(&node)
            .map_or(false, |n| n.classes.iter().any(|c| c == class))
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        if let Some(n) = self.inner.tree.lock().nodes.get_mut(&node) {
            if !n.classes.iter().any(|c| c == class) {
                n.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&self, node: NodeId, class: &str) {
        if let Some(n) = self.inner.tree.lock().nodes.get_mut(&node) {
            n.classes.retain(|c| c != class);
        }
    }

    /// Form control value (textarea/input).
    pub fn value(&self, node: NodeId) -> String {
        self.inner
            .tree
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.value.clone())
            .unwrap_or_default()
    }

    pub fn set_value(&self, node: NodeId, value: &str) {
        if let Some(n) = self.inner.tree.lock().nodes.get_mut(&node) {
            n.value = value.to_string();
        }
    }

    pub fn scroll_to_bottom(&self, node: NodeId) {
        if let Some(n) = self.inner.tree.lock().nodes.get_mut(&node) {
            n.scroll_top = n.children.len();
        }
    }

    pub fn is_scrolled_to_bottom(&self, node: NodeId) -> bool {
        self.inner
            .tree
            .lock()
            .nodes
            .get(&node)
            .map_or(false, |n| n.scroll_top == n.children.len())
    }

    /// Subscribe to child-list mutations anywhere in the document.
    pub fn observe(&self) -> MutationObserver {
        MutationObserver {
            rx: self.inner.mutations.subscribe(),
        }
    }

    /// Fire an event at `target`; it bubbles through every ancestor id.
    pub fn dispatch(&self, target: NodeId, kind: DomEventKind) {
        let path = self.inner.tree.lock().id_path(target);
        let _ = self.inner.events.send(DomEvent { target, kind, path });
    }

    pub fn click(&self, id: &str) -> bool {
        match self.get_element_by_id(id) {
            Some(node) => {
                self.dispatch(node, DomEventKind::Click);
                true
            }
            None => false,
        }
    }

    pub fn key_down(&self, id: &str, key: &str, shift: bool) -> bool {
        match self.get_element_by_id(id) {
            Some(node) => {
                self.dispatch(
                    node,
                    DomEventKind::KeyDown {
                        key: key.to_string(),
                        shift,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Register a listener for events reaching the element with `target_id`.
    pub fn listen(&self, target_id: &str) -> Listener {
        *self
            .inner
            .listeners
            .lock()
            .entry(target_id.to_string())
            .or_insert(0) += 1;
        Listener {
            target_id: target_id.to_string(),
            rx: self.inner.events.subscribe(),
            doc: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self, target_id: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(target_id)
            .copied()
            .unwrap_or(0)
    }
}

/// Receives batches of child-list mutations
pub struct MutationObserver {
    rx: broadcast::Receiver<Mutation>,
}

impl MutationObserver {
    /// Wait for the next mutation and drain whatever else is queued with it.
    pub async fn next_batch(&mut self) -> Option<Vec<Mutation>> {
        let mut batch = Vec::new();
        match self.rx.recv().await {
            Ok(m) => batch.push(m),
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return None,
        }
        loop {
            match self.rx.try_recv() {
                Ok(m) => batch.push(m),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        Some(batch)
    }
}

/// Event subscription for one element id; deregisters on drop.
pub struct Listener {
    target_id: String,
    rx: broadcast::Receiver<DomEvent>,
    doc: std::sync::Weak<DocumentInner>,
}

impl Listener {
    pub async fn recv(&mut self) -> Option<DomEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.path.iter().any(|id| id == &self.target_id) => {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target_id = %self.target_id, skipped, "listener lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.upgrade() {
            let mut listeners = doc.listeners.lock();
            if let Some(count) = listeners.get_mut(&self.target_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    listeners.remove(&self.target_id);
                }
            }
        }
    }
}

//! # View Tree
//!
//! A retained element/text tree standing in for the live editing surface.
//! The engine renders into it; the platform (or a test acting as one) may
//! also edit it directly, the way native text editing would.
//!
//! ## Observation
//!
//! Every change made while the observer is running is queued as a
//! [`ViewMutation`]. The renderer pauses the observer around its own work, so
//! the queue only ever holds foreign edits waiting to be absorbed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct ViewNode {
    kind: ViewKind,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
}

/// A change to the view made outside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMutation {
    /// Text content of a text node changed
    CharacterData { target: ViewId },
    /// Children were added to or removed from `target`
    ChildList {
        target: ViewId,
        added: Vec<ViewId>,
        removed: Vec<ViewId>,
    },
}

impl ViewMutation {
    pub fn target(&self) -> ViewId {
        match self {
            ViewMutation::CharacterData { target } | ViewMutation::ChildList { target, .. } => *target,
        }
    }
}

/// A view coordinate: a char offset into a text node, or a child index
/// into an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPoint {
    pub node: ViewId,
    pub offset: usize,
}

impl ViewPoint {
    pub fn new(node: ViewId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSelection {
    pub anchor: ViewPoint,
    pub focus: ViewPoint,
}

impl ViewSelection {
    pub fn collapsed(point: ViewPoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug)]
pub struct ViewTree {
    next_id: u64,
    nodes: HashMap<ViewId, ViewNode>,
    root: ViewId,
    observing: bool,
    pending: Vec<ViewMutation>,
    selection: Option<ViewSelection>,
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTree {
    /// A tree holding only the editable root element
    pub fn new() -> Self {
        let mut tree = Self {
            next_id: 0,
            nodes: HashMap::new(),
            root: ViewId(0),
            observing: true,
            pending: Vec::new(),
            selection: None,
        };
        let root = tree.create_element("div");
        tree.set_attribute(root, "contenteditable", "true");
        tree.root = root;
        tree
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    fn alloc(&mut self, kind: ViewKind) -> ViewId {
        let id = ViewId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            ViewNode {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: impl Into<String>) -> ViewId {
        self.alloc(ViewKind::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> ViewId {
        self.alloc(ViewKind::Text(text.into()))
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// True when `id` is connected to the root
    pub fn is_attached(&self, id: ViewId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|n| n.parent);
        }
        false
    }

    pub fn kind(&self, id: ViewId) -> Option<&ViewKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn tag(&self, id: ViewId) -> Option<&str> {
        match self.kind(id)? {
            ViewKind::Element { tag, .. } => Some(tag),
            ViewKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: ViewId) -> Option<&str> {
        match self.kind(id)? {
            ViewKind::Text(text) => Some(text),
            ViewKind::Element { .. } => None,
        }
    }

    pub fn is_text(&self, id: ViewId) -> bool {
        matches!(self.kind(id), Some(ViewKind::Text(_)))
    }

    pub fn attribute(&self, id: ViewId, name: &str) -> Option<&str> {
        match self.kind(id)? {
            ViewKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            ViewKind::Text(_) => None,
        }
    }

    pub fn attributes(&self, id: ViewId) -> Option<&BTreeMap<String, String>> {
        match self.kind(id)? {
            ViewKind::Element { attributes, .. } => Some(attributes),
            ViewKind::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, id: ViewId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(ViewNode {
            kind: ViewKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            attributes.insert(name.into(), value.into());
        }
    }

    pub fn remove_attribute(&mut self, id: ViewId, name: &str) {
        if let Some(ViewNode {
            kind: ViewKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            attributes.remove(name);
        }
    }

    /// Replace text content, recording a character-data mutation
    pub fn set_text(&mut self, id: ViewId, text: impl Into<String>) {
        let text = text.into();
        let changed = match self.nodes.get_mut(&id) {
            Some(ViewNode {
                kind: ViewKind::Text(current),
                ..
            }) if *current != text => {
                *current = text;
                true
            }
            _ => false,
        };
        if changed {
            self.record(ViewMutation::CharacterData { target: id });
        }
    }

    pub fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ViewId) -> &[ViewId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_at(&self, id: ViewId, index: usize) -> Option<ViewId> {
        self.children(id).get(index).copied()
    }

    pub fn index_of(&self, id: ViewId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn next_sibling(&self, id: ViewId) -> Option<ViewId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        self.child_at(parent, index + 1)
    }

    pub fn prev_sibling(&self, id: ViewId) -> Option<ViewId> {
        let parent = self.parent(id)?;
        let index = self.index_of(id)?;
        index.checked_sub(1).and_then(|i| self.child_at(parent, i))
    }

    /// True when `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: ViewId, node: ViewId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Insert `child` into `parent` before `before` (or at the end), moving it
    /// out of its current parent first
    pub fn insert_before(&mut self, parent: ViewId, child: ViewId, before: Option<ViewId>) {
        if !self.contains(parent) || !self.contains(child) || self.is_inclusive_ancestor(child, parent) {
            return;
        }
        self.detach(child);

        let index = before
            .and_then(|b| self.children(parent).iter().position(|c| *c == b))
            .unwrap_or_else(|| self.children(parent).len());
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(index, child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        self.record(ViewMutation::ChildList {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
    }

    pub fn append_child(&mut self, parent: ViewId, child: ViewId) {
        self.insert_before(parent, child, None);
    }

    /// Unlink `id` from its parent without dropping it
    pub fn detach(&mut self, id: ViewId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
        self.record(ViewMutation::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        });
    }

    /// Detach and drop `id` with its whole subtree; false if it was unknown
    pub fn remove(&mut self, id: ViewId) -> bool {
        if !self.contains(id) || id == self.root {
            return false;
        }
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        true
    }

    /// Drop every child of `id`
    pub fn clear_children(&mut self, id: ViewId) {
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
    }

    /// Concatenated text of every text node under `id`
    pub fn text_content(&self, id: ViewId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: ViewId, out: &mut String) {
        match self.kind(id) {
            Some(ViewKind::Text(text)) => out.push_str(text),
            Some(ViewKind::Element { .. }) => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// `id` and its descendants in document order
    pub fn descendants(&self, id: ViewId) -> Vec<ViewId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// First text node under `id` whose content contains `needle`
    pub fn find_text(&self, id: ViewId, needle: &str) -> Option<ViewId> {
        self.descendants(id)
            .into_iter()
            .find(|n| self.text(*n).is_some_and(|t| t.contains(needle)))
    }

    // ---------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------

    fn record(&mut self, mutation: ViewMutation) {
        if self.observing {
            self.pending.push(mutation);
        }
    }

    pub(crate) fn pause_observer(&mut self) {
        self.observing = false;
    }

    pub(crate) fn resume_observer(&mut self) {
        self.observing = true;
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take_mutations(&mut self) -> Vec<ViewMutation> {
        std::mem::take(&mut self.pending)
    }

    pub fn selection(&self) -> Option<ViewSelection> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Option<ViewSelection>) {
        self.selection = selection;
    }

    // ---------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------

    /// HTML-like serialization of the subtree at `id`
    pub fn to_markup(&self, id: ViewId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: ViewId, out: &mut String) {
        match self.kind(id) {
            Some(ViewKind::Text(text)) => out.push_str(&escape(text)),
            Some(ViewKind::Element { tag, attributes }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, escape(value)));
                }
                if is_void(tag) {
                    out.push('>');
                    return;
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_markup(*child, out);
                }
                out.push_str(&format!("</{}>", tag));
            }
            None => {}
        }
    }
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "br" | "img" | "hr")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

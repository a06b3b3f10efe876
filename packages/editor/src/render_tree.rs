//! # Render Tree
//!
//! Shadow tree mirroring the document, keyed by [`NodeRef`]. The document
//! knows nothing about the view; this side table owns the mapping in both
//! directions:
//!
//! ```text
//! NodeRef ──► RenderNode { element: ViewId, children, parts, teardowns }
//! ViewId  ──► NodeRef          (section elements, marker text, atom/card wrappers)
//! ```
//!
//! Child lists use the model's [`LinkedList`] with an [`Orphans`] hook: when a
//! parent's children are reset, every render node that was freed and not
//! re-adopted is reported back so its view can be torn down.

use crate::cards::{CardMode, Teardown};
use crate::view::{ViewId, ViewTree};
use quire_model::{LinkedList, ListHooks, NodeRef, SectionId};
use std::collections::{HashMap, HashSet};

/// Collects children freed from a render node's child list
#[derive(Debug, Default)]
pub struct Orphans {
    freed: HashSet<NodeRef>,
}

impl ListHooks<NodeRef> for Orphans {
    fn adopted(&mut self, item: NodeRef) {
        self.freed.remove(&item);
    }

    fn freed(&mut self, item: NodeRef) {
        self.freed.insert(item);
    }
}

/// Extra view nodes owned by card and atom render nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderParts {
    Plain,
    /// `wrapper > [cursor_before, content, cursor_after]`
    Card {
        mode: CardMode,
        cursor_before: ViewId,
        content: ViewId,
        cursor_after: ViewId,
    },
    /// `wrapper > [cursor_before, holder, cursor_after]`
    Atom {
        cursor_before: ViewId,
        holder: ViewId,
        cursor_after: ViewId,
    },
}

#[derive(Debug)]
pub struct RenderNode {
    pub node: NodeRef,
    pub element: Option<ViewId>,
    pub parent: Option<NodeRef>,
    pub children: LinkedList<NodeRef, Orphans>,
    pub parts: RenderParts,
    pub is_dirty: bool,
    /// Marker text as last written to the view
    rendered_text: Option<String>,
    teardowns: Vec<Teardown>,
}

impl RenderNode {
    fn new(node: NodeRef, parent: Option<NodeRef>) -> Self {
        Self {
            node,
            element: None,
            parent,
            children: LinkedList::default(),
            parts: RenderParts::Plain,
            is_dirty: true,
            rendered_text: None,
            teardowns: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RenderTree {
    nodes: HashMap<NodeRef, RenderNode>,
    by_view: HashMap<ViewId, NodeRef>,
    card_modes: HashMap<SectionId, CardMode>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn get(&self, node: NodeRef) -> Option<&RenderNode> {
        self.nodes.get(&node)
    }

    pub(crate) fn get_mut(&mut self, node: NodeRef) -> Option<&mut RenderNode> {
        self.nodes.get_mut(&node)
    }

    pub fn element(&self, node: NodeRef) -> Option<ViewId> {
        self.nodes.get(&node).and_then(|n| n.element)
    }

    pub fn parts(&self, node: NodeRef) -> RenderParts {
        self.nodes
            .get(&node)
            .map(|n| n.parts)
            .unwrap_or(RenderParts::Plain)
    }

    /// Text the last render pass wrote for a marker
    pub fn rendered_text(&self, node: NodeRef) -> Option<&str> {
        self.nodes.get(&node).and_then(|n| n.rendered_text.as_deref())
    }

    pub(crate) fn set_rendered_text(&mut self, node: NodeRef, text: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.rendered_text = Some(text.into());
        }
    }

    /// Document node a view node was rendered for
    pub fn node_for(&self, view: ViewId) -> Option<NodeRef> {
        self.by_view.get(&view).copied()
    }

    /// Closest mapped document node at or above `id`
    pub fn nearest(&self, view: &ViewTree, id: ViewId) -> Option<NodeRef> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(node) = self.by_view.get(&current) {
                return Some(*node);
            }
            cursor = view.parent(current);
        }
        None
    }

    /// Create a render node if none exists; returns true when created
    pub(crate) fn ensure(&mut self, node: NodeRef, parent: Option<NodeRef>) -> bool {
        if let Some(existing) = self.nodes.get_mut(&node) {
            existing.parent = parent;
            return false;
        }
        self.nodes.insert(node, RenderNode::new(node, parent));
        true
    }

    /// Point `node` at a new element, forgetting the previous mapping
    pub(crate) fn bind_element(&mut self, node: NodeRef, element: ViewId) {
        if let Some(render) = self.nodes.get_mut(&node) {
            if let Some(old) = render.element.replace(element) {
                self.by_view.remove(&old);
            }
            self.by_view.insert(element, node);
        }
    }

    pub(crate) fn set_parts(&mut self, node: NodeRef, parts: RenderParts) {
        if let Some(render) = self.nodes.get_mut(&node) {
            render.parts = parts;
        }
    }

    pub(crate) fn add_teardowns(&mut self, node: NodeRef, teardowns: Vec<Teardown>) {
        if let Some(render) = self.nodes.get_mut(&node) {
            render.teardowns.extend(teardowns);
        }
    }

    /// Run and drop teardown callbacks without destroying the node
    pub(crate) fn run_teardowns(&mut self, node: NodeRef) {
        let teardowns = match self.nodes.get_mut(&node) {
            Some(render) => std::mem::take(&mut render.teardowns),
            None => return,
        };
        for teardown in teardowns {
            teardown.run();
        }
    }

    pub(crate) fn mark_dirty(&mut self, node: NodeRef) {
        if let Some(render) = self.nodes.get_mut(&node) {
            render.is_dirty = true;
        }
    }

    pub(crate) fn clear_dirty(&mut self, node: NodeRef) {
        if let Some(render) = self.nodes.get_mut(&node) {
            render.is_dirty = false;
        }
    }

    pub fn is_dirty(&self, node: NodeRef) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.is_dirty)
    }

    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.nodes
            .get(&node)
            .map(|n| n.children.to_vec())
            .unwrap_or_default()
    }

    /// Reset `parent`'s child list to `desired`, returning the former
    /// children that were not kept and still belong to `parent`
    pub(crate) fn set_children(&mut self, parent: NodeRef, desired: &[NodeRef]) -> Vec<NodeRef> {
        let Some(render) = self.nodes.get_mut(&parent) else {
            return Vec::new();
        };
        render.children.clear();
        for child in desired {
            // a duplicate id cannot occur in a well-formed post; skip it if it does
            let _ = render.children.append(*child);
        }
        let freed: Vec<NodeRef> = render.children.hooks_mut().freed.drain().collect();

        freed
            .into_iter()
            .filter(|orphan| {
                self.nodes
                    .get(orphan)
                    .is_some_and(|n| n.parent == Some(parent))
            })
            .collect()
    }

    /// Tear down `node` and its descendants: detach the view, run teardown
    /// callbacks, forget every mapping. Returns the number of nodes removed.
    pub(crate) fn destroy(&mut self, node: NodeRef, view: &mut ViewTree) -> usize {
        let Some(render) = self.nodes.remove(&node) else {
            return 0;
        };
        let mut removed = 1;
        for child in render.children.iter() {
            removed += self.destroy(child, view);
        }
        if let Some(element) = render.element {
            self.by_view.remove(&element);
            if element != view.root() {
                view.remove(element);
            }
        }
        for teardown in render.teardowns {
            teardown.run();
        }
        if let NodeRef::Section(section) = node {
            self.card_modes.remove(&section);
        }
        removed
    }

    /// Destroy every render node and empty the root element
    pub(crate) fn clear(&mut self, view: &mut ViewTree) {
        if self.contains(NodeRef::Post) {
            self.destroy(NodeRef::Post, view);
        }
        for node in self.nodes.keys().copied().collect::<Vec<_>>() {
            self.destroy(node, view);
        }
        let root = view.root();
        view.clear_children(root);
        self.by_view.clear();
        self.card_modes.clear();
    }

    pub fn card_mode(&self, section: SectionId) -> CardMode {
        self.card_modes.get(&section).copied().unwrap_or_default()
    }

    pub(crate) fn set_card_mode(&mut self, section: SectionId, mode: CardMode) {
        self.card_modes.insert(section, mode);
    }
}

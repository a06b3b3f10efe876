//! # Renderer
//!
//! Brings the view in line with the post, touching only what the change log
//! says is stale.
//!
//! ## Pass
//!
//! 1. Destroy render nodes whose document node was removed
//! 2. Mark render nodes for dirty document nodes
//! 3. Walk the post: create missing render nodes, redraw dirty ones, and
//!    re-place a container's children only when that container is dirty or
//!    one of its children got a new element
//!
//! A dirty marker whose text changed is patched in place; anything that
//! changes a section's wrapper structure redraws that section alone.
//!
//! ## View shapes
//!
//! ```text
//! markup section  <p|h1..|blockquote>  markup wrappers  text
//! blank section   <p><br></p>
//! list            <ul|ol> <li> ...
//! image           <img src>
//! card            <div class="__quire-card" data-card>  ZWNJ <div contenteditable=false>…</div> ZWNJ
//! atom            <span class="__quire-atom" data-atom> ZWNJ <span contenteditable=false>…</span> ZWNJ
//! ```

use crate::cards::{ActionQueue, AtomArgs, AtomEnv, CardArgs, CardEnv, CardHooks, CardMode, Registry};
use crate::config::EditorConfig;
use crate::errors::{EditorResult, RenderError};
use crate::render_tree::{RenderParts, RenderTree};
use crate::view::{ViewId, ViewTree};
use quire_model::markup::nest_markups;
use quire_model::section::CardSection;
use quire_model::{Atom, ChangeLog, Inline, MarkupRef, NodeRef, Post, Section, SectionId};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub const CARD_CLASS: &str = "__quire-card";
pub const ATOM_CLASS: &str = "__quire-atom";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl RenderStats {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Run one render pass with the view observer paused
#[instrument(skip_all)]
pub(crate) fn render(
    post: &Post,
    changes: &ChangeLog,
    view: &mut ViewTree,
    tree: &mut RenderTree,
    registry: &Registry,
    config: &EditorConfig,
    actions: &ActionQueue,
) -> EditorResult<RenderStats> {
    view.pause_observer();
    let result = Renderer {
        post,
        view: &mut *view,
        tree,
        registry,
        config,
        actions,
        stats: RenderStats::default(),
    }
    .run(changes);
    view.resume_observer();

    if let Ok(stats) = &result {
        debug!(
            created = stats.created,
            updated = stats.updated,
            removed = stats.removed,
            "render pass"
        );
    }
    result
}

struct Renderer<'a> {
    post: &'a Post,
    view: &'a mut ViewTree,
    tree: &'a mut RenderTree,
    registry: &'a Registry,
    config: &'a EditorConfig,
    actions: &'a ActionQueue,
    stats: RenderStats,
}

impl Renderer<'_> {
    fn run(mut self, changes: &ChangeLog) -> EditorResult<RenderStats> {
        for node in changes.removed() {
            self.stats.removed += self.tree.destroy(*node, self.view);
        }
        for node in changes.dirty() {
            self.tree.mark_dirty(node);
        }

        if self.tree.ensure(NodeRef::Post, None) {
            self.stats.created += 1;
            let root = self.view.root();
            self.tree.bind_element(NodeRef::Post, root);
        }
        self.render_root()?;
        Ok(self.stats)
    }

    fn render_root(&mut self) -> EditorResult<()> {
        let post = self.post;
        let root = NodeRef::Post;
        let dirty = self.tree.is_dirty(root);

        let sections: Vec<SectionId> = post.sections().collect();
        let mut replaced = false;
        for id in &sections {
            replaced |= self.visit_section(*id, root)?;
        }

        if dirty || replaced {
            let desired: Vec<NodeRef> = sections.iter().map(|s| NodeRef::Section(*s)).collect();
            let root_element = self.view.root();
            self.reconcile_children(root, root_element, &desired);
            if dirty {
                self.stats.updated += 1;
            }
        }

        self.update_placeholder();
        self.tree.clear_dirty(root);
        Ok(())
    }

    /// Render one section if needed; true when its element changed
    fn visit_section(&mut self, id: SectionId, parent: NodeRef) -> EditorResult<bool> {
        let post = self.post;
        let node = NodeRef::Section(id);
        let section = post.get_section(id)?;

        let created = self.tree.ensure(node, Some(parent));
        if created {
            self.stats.created += 1;
        }
        let dirty = self.tree.is_dirty(node);
        let before = self.tree.element(node);

        match section {
            Section::Markup(_) | Section::ListItem(_) => {
                if dirty {
                    self.render_markerable(id)?;
                } else {
                    self.update_markers(id)?;
                }
            }
            Section::List(_) => self.render_list(id, dirty)?,
            Section::Card(card) => {
                if dirty {
                    self.render_card(id, card)?;
                }
            }
            Section::Image(image) => {
                if dirty {
                    let element = self.element_for(node, "img", false);
                    self.view.set_attribute(element, "src", image.src.clone());
                }
            }
        }

        if dirty && !created {
            self.stats.updated += 1;
        }
        self.tree.clear_dirty(node);
        Ok(self.tree.element(node) != before)
    }

    /// Reset `parent`'s render children and view children to `desired`
    fn reconcile_children(&mut self, parent: NodeRef, container: ViewId, desired: &[NodeRef]) {
        for orphan in self.tree.set_children(parent, desired) {
            self.stats.removed += self.tree.destroy(orphan, self.view);
        }

        let elements: Vec<ViewId> = desired
            .iter()
            .filter_map(|node| self.tree.element(*node))
            .collect();
        for (index, element) in elements.iter().enumerate() {
            let current = self.view.child_at(container, index);
            if current != Some(*element) {
                self.view.insert_before(container, *element, current);
            }
        }

        // anything left past the desired children is stale
        while let Some(extra) = self.view.child_at(container, elements.len()) {
            match self.tree.node_for(extra) {
                Some(node) => {
                    self.stats.removed += self.tree.destroy(node, self.view);
                    self.view.remove(extra);
                }
                None => {
                    self.view.remove(extra);
                }
            }
        }
    }

    /// Element for `node` with the given tag, replacing the current one in
    /// place when the tag differs
    fn element_for(&mut self, node: NodeRef, tag: &str, keep_children: bool) -> ViewId {
        let existing = self
            .tree
            .element(node)
            .filter(|el| self.view.contains(*el));

        match existing {
            Some(el) if self.view.tag(el) == Some(tag) => el,
            Some(old) => {
                let element = self.view.create_element(tag);
                if keep_children {
                    for child in self.view.children(old).to_vec() {
                        self.view.append_child(element, child);
                    }
                }
                if let Some(parent) = self.view.parent(old) {
                    self.view.insert_before(parent, element, Some(old));
                }
                self.view.remove(old);
                self.tree.bind_element(node, element);
                element
            }
            None => {
                let element = self.view.create_element(tag);
                self.tree.bind_element(node, element);
                element
            }
        }
    }

    fn sync_attributes(&mut self, element: ViewId, attributes: Option<&BTreeMap<String, String>>) {
        let empty = BTreeMap::new();
        let wanted = attributes.unwrap_or(&empty);
        let stale: Vec<String> = self
            .view
            .attributes(element)
            .map(|current| {
                current
                    .keys()
                    .filter(|k| !wanted.contains_key(*k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for name in stale {
            self.view.remove_attribute(element, &name);
        }
        for (name, value) in wanted {
            if self.view.attribute(element, name) != Some(value.as_str()) {
                self.view.set_attribute(element, name.clone(), value.clone());
            }
        }
    }

    // -----------------------------------------------------------------
    // Markerable sections
    // -----------------------------------------------------------------

    fn render_markerable(&mut self, id: SectionId) -> EditorResult<()> {
        let post = self.post;
        let node = NodeRef::Section(id);
        let section = post.get_section(id)?;

        for child in self.tree.children(node) {
            self.tree.destroy(child, self.view);
        }
        self.tree.set_children(node, &[]);

        let element = self.element_for(node, section.tag(), false);
        self.sync_attributes(element, section.attributes());
        self.view.clear_children(element);

        let inlines: Vec<(quire_model::InlineId, &Inline)> = post.inlines(id).collect();
        let children: Vec<NodeRef> = inlines.iter().map(|(i, _)| NodeRef::Inline(*i)).collect();
        for child in &children {
            if self.tree.ensure(*child, Some(node)) {
                self.stats.created += 1;
            }
        }

        if post.is_section_blank(id) {
            let br = self.view.create_element("br");
            self.view.append_child(element, br);
            if let Some(first) = children.first() {
                self.tree.bind_element(*first, br);
                self.tree.set_rendered_text(*first, "");
            }
        } else {
            let runs: Vec<&[MarkupRef]> = inlines.iter().map(|(_, i)| i.markups()).collect();
            let nesting = nest_markups(&runs);
            let mut stack = vec![element];

            for (((inline_id, inline), nest), child) in inlines.iter().zip(nesting).zip(&children) {
                for markup in &nest.opened {
                    let wrapper = self.view.create_element(markup.tag());
                    for (name, value) in markup.attributes() {
                        self.view.set_attribute(wrapper, name.clone(), value.clone());
                    }
                    let top = stack.last().copied().unwrap_or(element);
                    self.view.append_child(top, wrapper);
                    stack.push(wrapper);
                }

                let container = stack.last().copied().unwrap_or(element);
                match inline {
                    Inline::Marker(marker) => {
                        let text = self.view.create_text(marker.value.clone());
                        self.view.append_child(container, text);
                        self.tree.bind_element(*child, text);
                        self.tree.set_rendered_text(*child, marker.value.clone());
                    }
                    Inline::Atom(atom) => self.render_atom(*child, atom, container)?,
                }
                self.tree.clear_dirty(NodeRef::Inline(*inline_id));

                for _ in 0..nest.closed {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
            }
        }

        for child in &children {
            self.tree.clear_dirty(*child);
        }
        self.tree.set_children(node, &children);
        Ok(())
    }

    /// Patch dirty markers of a clean section, escalating to a full redraw
    /// when the wrapper structure would change
    fn update_markers(&mut self, id: SectionId) -> EditorResult<()> {
        let post = self.post;
        let mut rebuild = false;

        for (inline_id, inline) in post.inlines(id) {
            let node = NodeRef::Inline(inline_id);
            if !self.tree.contains(node) {
                rebuild = true;
                break;
            }
            if !self.tree.is_dirty(node) {
                continue;
            }
            match (inline, self.tree.element(node)) {
                (Inline::Marker(marker), Some(text)) if self.view.is_text(text) && !marker.value.is_empty() => {
                    if self.view.text(text) != Some(marker.value.as_str()) {
                        self.view.set_text(text, marker.value.clone());
                    }
                    self.tree.set_rendered_text(node, marker.value.clone());
                    self.stats.updated += 1;
                    self.tree.clear_dirty(node);
                }
                _ => {
                    rebuild = true;
                    break;
                }
            }
        }

        if rebuild {
            self.stats.updated += 1;
            self.render_markerable(id)?;
        }
        Ok(())
    }

    fn render_atom(&mut self, node: NodeRef, atom: &Atom, container: ViewId) -> EditorResult<()> {
        let wrapper = self.view.create_element("span");
        self.view.set_attribute(wrapper, "class", ATOM_CLASS);
        self.view.set_attribute(wrapper, "data-atom", atom.name.clone());
        let cursor_before = self.view.create_text(self.config.cursor_placeholder.clone());
        let holder = self.view.create_element("span");
        self.view.set_attribute(holder, "contenteditable", "false");
        let cursor_after = self.view.create_text(self.config.cursor_placeholder.clone());
        self.view.append_child(wrapper, cursor_before);
        self.view.append_child(wrapper, holder);
        self.view.append_child(wrapper, cursor_after);
        self.view.append_child(container, wrapper);

        let renderer = self.registry.atom(&atom.name)?;
        let mut args = AtomArgs {
            env: AtomEnv {
                name: &atom.name,
                teardowns: Vec::new(),
            },
            options: self.registry.options(),
            value: &atom.value,
            payload: &atom.payload,
        };
        let output = renderer.render(self.view, &mut args);
        let output = check_output(self.view, output).map_err(|reason| RenderError::AtomContract {
            name: atom.name.clone(),
            reason,
        })?;
        self.view.append_child(holder, output);

        self.tree.bind_element(node, wrapper);
        self.tree.set_parts(
            node,
            RenderParts::Atom {
                cursor_before,
                holder,
                cursor_after,
            },
        );
        self.tree.add_teardowns(node, args.env.teardowns);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Containers and opaque sections
    // -----------------------------------------------------------------

    fn render_list(&mut self, id: SectionId, dirty: bool) -> EditorResult<()> {
        let post = self.post;
        let node = NodeRef::Section(id);
        let section = post.get_section(id)?;

        let element = match self.tree.element(node) {
            Some(el) if !dirty => el,
            _ => {
                let el = self.element_for(node, section.tag(), true);
                self.sync_attributes(el, section.attributes());
                el
            }
        };

        let items = post.items(id);
        let mut replaced = false;
        for item in &items {
            replaced |= self.visit_section(*item, node)?;
        }

        if dirty || replaced {
            let desired: Vec<NodeRef> = items.iter().map(|i| NodeRef::Section(*i)).collect();
            self.reconcile_children(node, element, &desired);
        }
        Ok(())
    }

    fn render_card(&mut self, id: SectionId, card: &CardSection) -> EditorResult<()> {
        let node = NodeRef::Section(id);
        self.tree.run_teardowns(node);
        let mode = self.tree.card_mode(id);

        let wrapper = self.view.create_element("div");
        self.view.set_attribute(wrapper, "class", CARD_CLASS);
        self.view.set_attribute(wrapper, "data-card", card.name.clone());
        let cursor_before = self.view.create_text(self.config.cursor_placeholder.clone());
        let content = self.view.create_element("div");
        self.view.set_attribute(content, "contenteditable", "false");
        let cursor_after = self.view.create_text(self.config.cursor_placeholder.clone());
        self.view.append_child(wrapper, cursor_before);
        self.view.append_child(wrapper, content);
        self.view.append_child(wrapper, cursor_after);

        let renderer = self.registry.card(&card.name)?;
        let mut args = CardArgs {
            env: CardEnv {
                name: &card.name,
                section: id,
                hooks: CardHooks::new(id, self.actions.clone()),
                teardowns: Vec::new(),
            },
            options: self.registry.options(),
            payload: &card.payload,
        };
        let output = match mode {
            CardMode::Display => renderer.display(self.view, &mut args),
            CardMode::Edit => renderer.edit(self.view, &mut args),
        };
        let output = match (mode, output) {
            (CardMode::Edit, None) => Err("edit mode requested but the card has no edit view".to_string()),
            (_, output) => check_output(self.view, output),
        }
        .map_err(|reason| RenderError::CardContract {
            name: card.name.clone(),
            reason,
        })?;
        self.view.append_child(content, output);

        if let Some(old) = self.tree.element(node).filter(|el| self.view.contains(*el)) {
            if let Some(parent) = self.view.parent(old) {
                self.view.insert_before(parent, wrapper, Some(old));
            }
            self.view.remove(old);
        }
        self.tree.bind_element(node, wrapper);
        self.tree.set_parts(
            node,
            RenderParts::Card {
                mode,
                cursor_before,
                content,
                cursor_after,
            },
        );
        self.tree.add_teardowns(node, args.env.teardowns);
        Ok(())
    }

    fn update_placeholder(&mut self) {
        let root = self.view.root();
        if self.config.placeholder.is_empty() {
            return;
        }
        if self.post.is_blank() {
            self.view
                .set_attribute(root, "data-placeholder", self.config.placeholder.clone());
        } else {
            self.view.remove_attribute(root, "data-placeholder");
        }
    }
}

/// A renderer must hand back a node it just created and has not attached
fn check_output(view: &ViewTree, output: Option<ViewId>) -> Result<ViewId, String> {
    let node = output.ok_or_else(|| "renderer returned no view node".to_string())?;
    if !view.contains(node) {
        return Err(format!("renderer returned unknown view node {node}"));
    }
    if view.parent(node).is_some() {
        return Err(format!("renderer returned view node {node} that is already attached"));
    }
    Ok(node)
}

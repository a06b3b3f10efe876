//! # Post
//!
//! The root of the document tree. A post owns every section and inline by id
//! and keeps the ordered child sequences in [`LinkedList`]s:
//!
//! ```text
//! Post ─ sections ─┬─ MarkupSection ─ inlines ─ Marker | Atom ...
//!                  ├─ ListSection ─ items ─ ListItem ─ inlines ─ ...
//!                  ├─ CardSection
//!                  └─ ImageSection
//! ```
//!
//! ## Structural primitives
//!
//! The mutating methods in this module are the building blocks of a
//! transaction. They keep ids and parent links consistent and record what
//! they touched in a [`ChangeLog`], but they do not enforce steady-state
//! invariants on their own: a transaction calls [`Post::normalize_changed`]
//! before it commits, which coalesces markers, restores blank markers and
//! prunes empty lists. Application code should edit through a transaction
//! rather than calling these directly.

use crate::error::{ModelError, ModelResult};
use crate::ids::{IdGenerator, InlineId, NodeRef, SectionId};
use crate::inline::{split_chars, Inline, Marker};
use crate::linked_list::LinkedList;
use crate::markup::MarkupRef;
use crate::position::Position;
use crate::range::Range;
use crate::section::{
    normalize_tag, ListItem, ListSection, MarkupSection, NewSection, Section, SectionKind,
    LIST_SECTION_TAGS, MARKUP_SECTION_TAGS,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Nodes touched since the log was last taken
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    dirty: HashSet<NodeRef>,
    removed: Vec<NodeRef>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.removed.is_empty()
    }

    /// Nodes whose own representation (or child list) changed
    pub fn dirty(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.dirty.iter().copied()
    }

    pub fn is_dirty(&self, node: NodeRef) -> bool {
        self.dirty.contains(&node)
    }

    /// Roots of removed subtrees, in removal order
    pub fn removed(&self) -> &[NodeRef] {
        &self.removed
    }

    pub fn merge(&mut self, other: ChangeLog) {
        self.dirty.extend(other.dirty);
        self.removed.extend(other.removed);
    }

    fn mark(&mut self, node: NodeRef) {
        self.dirty.insert(node);
    }

    fn record_removed(&mut self, node: NodeRef) {
        self.dirty.remove(&node);
        self.removed.push(node);
    }
}

#[derive(Debug, Clone)]
struct InlineNode {
    section: SectionId,
    inline: Inline,
}

#[derive(Debug, Clone, Default)]
pub struct Post {
    ids: IdGenerator,
    sections: LinkedList<SectionId>,
    nodes: HashMap<SectionId, Section>,
    inlines: HashMap<InlineId, InlineNode>,
    changes: ChangeLog,
}

impl Post {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a post from detached sections
    pub fn from_sections(sections: Vec<NewSection>) -> ModelResult<Self> {
        let mut post = Post::new();
        for section in sections {
            post.insert_section(None, section, None)?;
        }
        post.changes = ChangeLog::default();
        Ok(post)
    }

    /// Copy of this post with an empty change log, for history and snapshots
    pub fn snapshot(&self) -> Post {
        let mut copy = self.clone();
        copy.changes = ChangeLog::default();
        copy
    }

    // ---------------------------------------------------------------------
    // Read traversal
    // ---------------------------------------------------------------------

    /// A post is blank when it has no sections at all
    pub fn is_blank(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> impl Iterator<Item = SectionId> + '_ {
        self.sections.iter()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn first_section(&self) -> Option<SectionId> {
        self.sections.head()
    }

    pub fn last_section(&self) -> Option<SectionId> {
        self.sections.tail()
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.nodes.get(&id)
    }

    pub fn get_section(&self, id: SectionId) -> ModelResult<&Section> {
        self.nodes.get(&id).ok_or(ModelError::UnknownSection(id))
    }

    pub fn contains_section(&self, id: SectionId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: SectionId) -> ModelResult<SectionKind> {
        self.get_section(id).map(Section::kind)
    }

    pub fn is_markerable(&self, id: SectionId) -> bool {
        self.section(id).is_some_and(Section::is_markerable)
    }

    /// The list that owns a list item; `None` for top-level sections
    pub fn parent(&self, id: SectionId) -> Option<SectionId> {
        match self.nodes.get(&id) {
            Some(Section::ListItem(item)) => Some(item.list),
            _ => None,
        }
    }

    /// Next sibling within the same parent
    pub fn next_sibling(&self, id: SectionId) -> Option<SectionId> {
        match self.parent(id) {
            Some(list) => self.section(list)?.item_list()?.next(id),
            None => self.sections.next(id),
        }
    }

    /// Previous sibling within the same parent
    pub fn prev_sibling(&self, id: SectionId) -> Option<SectionId> {
        match self.parent(id) {
            Some(list) => self.section(list)?.item_list()?.prev(id),
            None => self.sections.prev(id),
        }
    }

    pub fn items(&self, list: SectionId) -> Vec<SectionId> {
        self.section(list)
            .and_then(Section::item_list)
            .map(LinkedList::to_vec)
            .unwrap_or_default()
    }

    pub fn inline_ids(&self, section: SectionId) -> Vec<InlineId> {
        self.section(section)
            .and_then(Section::inline_list)
            .map(LinkedList::to_vec)
            .unwrap_or_default()
    }

    pub fn inlines(&self, section: SectionId) -> impl Iterator<Item = (InlineId, &Inline)> + '_ {
        self.section(section)
            .and_then(Section::inline_list)
            .into_iter()
            .flat_map(|list| list.iter())
            .filter_map(move |id| self.inlines.get(&id).map(|node| (id, &node.inline)))
    }

    pub fn inline(&self, id: InlineId) -> Option<&Inline> {
        self.inlines.get(&id).map(|n| &n.inline)
    }

    pub fn get_inline(&self, id: InlineId) -> ModelResult<&Inline> {
        self.inline(id).ok_or(ModelError::UnknownInline(id))
    }

    /// Section that owns an inline
    pub fn inline_section(&self, id: InlineId) -> Option<SectionId> {
        self.inlines.get(&id).map(|n| n.section)
    }

    pub fn next_inline(&self, id: InlineId) -> Option<InlineId> {
        let section = self.inline_section(id)?;
        self.section(section)?.inline_list()?.next(id)
    }

    pub fn prev_inline(&self, id: InlineId) -> Option<InlineId> {
        let section = self.inline_section(id)?;
        self.section(section)?.inline_list()?.prev(id)
    }

    /// Number of offset units in an addressable section
    pub fn section_len(&self, id: SectionId) -> ModelResult<usize> {
        let section = self.get_section(id)?;
        match section {
            Section::Markup(_) | Section::ListItem(_) => {
                Ok(self.inlines(id).map(|(_, inline)| inline.len()).sum())
            }
            Section::Card(_) | Section::Image(_) => Ok(1),
            Section::List(_) => Err(ModelError::NotAddressable {
                section: id,
                kind: SectionKind::List,
            }),
        }
    }

    /// True when a markerable section holds no text or atoms
    pub fn is_section_blank(&self, id: SectionId) -> bool {
        match self.section(id) {
            Some(Section::Markup(_)) | Some(Section::ListItem(_)) => {
                self.inlines(id).all(|(_, inline)| inline.is_empty())
            }
            Some(Section::List(list)) => list.items.is_empty(),
            _ => false,
        }
    }

    /// Plain text of one section (atoms contribute their text value)
    pub fn section_text(&self, id: SectionId) -> String {
        self.inlines(id).map(|(_, inline)| inline.text()).collect()
    }

    /// Plain text of the whole post, one line per addressable section
    pub fn text(&self) -> String {
        self.leaf_sections()
            .into_iter()
            .map(|id| self.section_text(id))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Addressable sections in document order (list items replace their list)
    pub fn leaf_sections(&self) -> Vec<SectionId> {
        let mut leaves = Vec::new();
        for id in self.sections.iter() {
            match self.nodes.get(&id) {
                Some(Section::List(list)) => leaves.extend(list.items.iter()),
                Some(_) => leaves.push(id),
                None => {}
            }
        }
        leaves
    }

    pub fn markerable_sections(&self) -> Vec<SectionId> {
        self.leaf_sections()
            .into_iter()
            .filter(|id| self.is_markerable(*id))
            .collect()
    }

    fn first_leaf_from(&self, start: Option<SectionId>) -> Option<SectionId> {
        let mut cursor = start;
        while let Some(id) = cursor {
            match self.nodes.get(&id) {
                Some(Section::List(list)) => {
                    if let Some(head) = list.items.head() {
                        return Some(head);
                    }
                }
                Some(_) => return Some(id),
                None => return None,
            }
            cursor = self.sections.next(id);
        }
        None
    }

    fn last_leaf_from(&self, start: Option<SectionId>) -> Option<SectionId> {
        let mut cursor = start;
        while let Some(id) = cursor {
            match self.nodes.get(&id) {
                Some(Section::List(list)) => {
                    if let Some(tail) = list.items.tail() {
                        return Some(tail);
                    }
                }
                Some(_) => return Some(id),
                None => return None,
            }
            cursor = self.sections.prev(id);
        }
        None
    }

    pub fn first_leaf(&self) -> Option<SectionId> {
        self.first_leaf_from(self.sections.head())
    }

    pub fn last_leaf(&self) -> Option<SectionId> {
        self.last_leaf_from(self.sections.tail())
    }

    /// Next addressable section in document order
    pub fn next_leaf(&self, id: SectionId) -> Option<SectionId> {
        match self.nodes.get(&id)? {
            Section::ListItem(item) => {
                let list = self.nodes.get(&item.list)?.item_list()?;
                list.next(id)
                    .or_else(|| self.first_leaf_from(self.sections.next(item.list)))
            }
            Section::List(list) => list
                .items
                .head()
                .or_else(|| self.first_leaf_from(self.sections.next(id))),
            _ => self.first_leaf_from(self.sections.next(id)),
        }
    }

    /// Previous addressable section in document order
    pub fn prev_leaf(&self, id: SectionId) -> Option<SectionId> {
        match self.nodes.get(&id)? {
            Section::ListItem(item) => {
                let list = self.nodes.get(&item.list)?.item_list()?;
                list.prev(id)
                    .or_else(|| self.last_leaf_from(self.sections.prev(item.list)))
            }
            _ => self.last_leaf_from(self.sections.prev(id)),
        }
    }

    pub fn next_markerable(&self, id: SectionId) -> Option<SectionId> {
        let mut cursor = self.next_leaf(id);
        while let Some(next) = cursor {
            if self.is_markerable(next) {
                return Some(next);
            }
            cursor = self.next_leaf(next);
        }
        None
    }

    pub fn prev_markerable(&self, id: SectionId) -> Option<SectionId> {
        let mut cursor = self.prev_leaf(id);
        while let Some(prev) = cursor {
            if self.is_markerable(prev) {
                return Some(prev);
            }
            cursor = self.prev_leaf(prev);
        }
        None
    }

    /// Document-order index of an addressable section
    pub fn leaf_index(&self, id: SectionId) -> Option<usize> {
        self.leaf_sections().iter().position(|s| *s == id)
    }

    /// Order two positions by document order, then by offset.
    ///
    /// Walks outward from `a` in both directions, so nearby positions
    /// compare in time proportional to the sections between them.
    /// Positions in unknown sections compare equal.
    pub fn compare(&self, a: &Position, b: &Position) -> Ordering {
        if a.section == b.section {
            return a.offset.cmp(&b.offset);
        }
        let mut forward = self.next_leaf(a.section);
        let mut backward = self.prev_leaf(a.section);
        while forward.is_some() || backward.is_some() {
            if forward == Some(b.section) {
                return Ordering::Less;
            }
            if backward == Some(b.section) {
                return Ordering::Greater;
            }
            forward = forward.and_then(|id| self.next_leaf(id));
            backward = backward.and_then(|id| self.prev_leaf(id));
        }
        Ordering::Equal
    }

    /// Inline covering the unit just before `offset`, with the offset inside it
    pub fn inline_before(&self, section: SectionId, offset: usize) -> Option<(InlineId, usize)> {
        if offset == 0 {
            return None;
        }
        let mut start = 0;
        for (id, inline) in self.inlines(section) {
            let end = start + inline.len();
            if offset > start && offset <= end {
                return Some((id, offset - start));
            }
            start = end;
        }
        None
    }

    /// Inline covering the unit just after `offset`, with the offset inside it
    pub fn inline_after(&self, section: SectionId, offset: usize) -> Option<(InlineId, usize)> {
        let mut start = 0;
        for (id, inline) in self.inlines(section) {
            let end = start + inline.len();
            if offset >= start && offset < end {
                return Some((id, offset - start));
            }
            start = end;
        }
        None
    }

    /// Offset at which an inline starts within its section
    pub fn inline_offset(&self, id: InlineId) -> Option<usize> {
        let section = self.inline_section(id)?;
        let mut start = 0;
        for (inline_id, inline) in self.inlines(section) {
            if inline_id == id {
                return Some(start);
            }
            start += inline.len();
        }
        None
    }

    /// Inline a caret at `position` is attached to: the one before it, or
    /// the first one when the caret sits at the section head
    pub fn inline_at(&self, position: &Position) -> Option<InlineId> {
        self.inline_before(position.section, position.offset)
            .or_else(|| self.inline_after(position.section, position.offset))
            .map(|(id, _)| id)
    }

    /// Markups that text typed at `position` would inherit
    pub fn markups_at(&self, position: &Position) -> Vec<MarkupRef> {
        self.inline_at(position)
            .and_then(|id| self.inline(id))
            .map(|inline| inline.markups().to_vec())
            .unwrap_or_default()
    }

    /// Detached copy of one section subtree
    pub fn extract_section(&self, id: SectionId) -> ModelResult<NewSection> {
        let section = self.get_section(id)?;
        Ok(match section {
            Section::Markup(s) => NewSection::Markup {
                tag: s.tag.clone(),
                attributes: s.attributes.clone(),
                inlines: self.inlines(id).map(|(_, i)| i.clone()).collect(),
            },
            Section::List(s) => NewSection::List {
                tag: s.tag.clone(),
                attributes: s.attributes.clone(),
                items: s
                    .items
                    .iter()
                    .map(|item| self.inlines(item).map(|(_, i)| i.clone()).collect())
                    .collect(),
            },
            Section::ListItem(_) => NewSection::ListItem {
                inlines: self.inlines(id).map(|(_, i)| i.clone()).collect(),
            },
            Section::Card(c) => NewSection::Card {
                name: c.name.clone(),
                payload: c.payload.clone(),
            },
            Section::Image(i) => NewSection::Image { src: i.src.clone() },
        })
    }

    /// Detached copy of every top-level section
    pub fn to_sections(&self) -> Vec<NewSection> {
        self.sections
            .iter()
            .filter_map(|id| self.extract_section(id).ok())
            .collect()
    }

    /// Structural equality: same section kinds, tags, text and markup sets
    pub fn same_content(&self, other: &Post) -> bool {
        self.to_sections() == other.to_sections()
    }

    /// Copy the content covered by `range` into a standalone post
    pub fn slice(&self, range: &Range) -> ModelResult<Post> {
        let mut out: Vec<NewSection> = Vec::new();
        let mut open_list: Option<SectionId> = None;

        for leaf in range.leaf_sections(self)? {
            let section = self.get_section(leaf)?;
            let (from, to) = range.offsets_in(self, leaf)?;
            let clipped = match section {
                Section::Markup(_) | Section::ListItem(_) => self.clip_inlines(leaf, from, to),
                _ => Vec::new(),
            };
            match section {
                Section::Markup(s) => {
                    open_list = None;
                    out.push(NewSection::Markup {
                        tag: s.tag.clone(),
                        attributes: s.attributes.clone(),
                        inlines: clipped,
                    });
                }
                Section::ListItem(item) => {
                    let continues = open_list == Some(item.list);
                    match out.last_mut() {
                        Some(NewSection::List { items, .. }) if continues => items.push(clipped),
                        _ => {
                            let list = match self.get_section(item.list)? {
                                Section::List(l) => l,
                                _ => return Err(ModelError::invalid_structure("item outside list")),
                            };
                            out.push(NewSection::List {
                                tag: list.tag.clone(),
                                attributes: list.attributes.clone(),
                                items: vec![clipped],
                            });
                            open_list = Some(item.list);
                        }
                    }
                }
                Section::Card(_) | Section::Image(_) => {
                    open_list = None;
                    if from < to {
                        out.push(self.extract_section(leaf)?);
                    }
                }
                Section::List(_) => {}
            }
        }

        Post::from_sections(out)
    }

    fn clip_inlines(&self, section: SectionId, from: usize, to: usize) -> Vec<Inline> {
        let mut out = Vec::new();
        let mut start = 0;
        for (_, inline) in self.inlines(section) {
            let end = start + inline.len();
            let lo = from.max(start);
            let hi = to.min(end);
            if lo < hi {
                match inline {
                    Inline::Marker(m) => {
                        let (_, rest) = split_chars(&m.value, lo - start);
                        let (mid, _) = split_chars(rest, hi - lo);
                        out.push(Inline::Marker(Marker {
                            value: mid.to_string(),
                            markups: m.markups.clone(),
                        }));
                    }
                    Inline::Atom(_) => out.push(inline.clone()),
                }
            }
            start = end;
        }
        out
    }

    // ---------------------------------------------------------------------
    // Change tracking
    // ---------------------------------------------------------------------

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    pub fn take_changes(&mut self) -> ChangeLog {
        std::mem::take(&mut self.changes)
    }

    /// Mark a node as needing a re-render
    pub fn mark_dirty(&mut self, node: NodeRef) {
        self.changes.mark(node);
    }

    fn mark_parent_dirty(&mut self, id: SectionId) {
        match self.parent(id) {
            Some(list) => self.changes.mark(NodeRef::Section(list)),
            None => self.changes.mark(NodeRef::Post),
        }
    }

    // ---------------------------------------------------------------------
    // Structural primitives
    // ---------------------------------------------------------------------

    /// Adopt `section` as a child of `parent` (a list, or the post when
    /// `None`), before `before` or at the end
    pub fn insert_section(
        &mut self,
        parent: Option<SectionId>,
        section: NewSection,
        before: Option<SectionId>,
    ) -> ModelResult<SectionId> {
        match parent {
            None => {
                if matches!(section, NewSection::ListItem { .. }) {
                    return Err(ModelError::invalid_structure(
                        "list items must be inserted into a list section",
                    ));
                }
                if let Some(b) = before {
                    if !self.sections.contains(b) {
                        return Err(ModelError::UnknownSection(b));
                    }
                }
                let id = self.adopt_section(section, None)?;
                self.sections.insert_before(id, before)?;
                self.changes.mark(NodeRef::Post);
                Ok(id)
            }
            Some(list) => {
                if self.kind(list)? != SectionKind::List {
                    return Err(ModelError::invalid_structure(format!(
                        "{} is not a list section",
                        list
                    )));
                }
                if !matches!(section, NewSection::ListItem { .. }) {
                    return Err(ModelError::invalid_structure(
                        "only list items may be inserted into a list section",
                    ));
                }
                let id = self.adopt_section(section, Some(list))?;
                if let Some(items) = self.nodes.get_mut(&list).and_then(Section::item_list_mut) {
                    items.insert_before(id, before)?;
                }
                self.changes.mark(NodeRef::Section(list));
                Ok(id)
            }
        }
    }

    /// Insert a sibling directly after `after` in the same parent
    pub fn insert_section_after(
        &mut self,
        after: SectionId,
        section: NewSection,
    ) -> ModelResult<SectionId> {
        let parent = self.parent(after);
        let before = self.next_sibling(after);
        self.insert_section(parent, section, before)
    }

    fn adopt_section(&mut self, section: NewSection, list: Option<SectionId>) -> ModelResult<SectionId> {
        let id = self.ids.next_section();
        match section {
            NewSection::Markup {
                tag,
                attributes,
                inlines,
            } => {
                let tag = normalize_tag("markup section", &tag, MARKUP_SECTION_TAGS)?;
                self.nodes.insert(
                    id,
                    Section::Markup(MarkupSection {
                        tag,
                        attributes,
                        inlines: LinkedList::new(),
                    }),
                );
                self.adopt_inlines(id, inlines)?;
            }
            NewSection::List {
                tag,
                attributes,
                items,
            } => {
                let tag = normalize_tag("list section", &tag, LIST_SECTION_TAGS)?;
                self.nodes.insert(
                    id,
                    Section::List(ListSection {
                        tag,
                        attributes,
                        items: LinkedList::new(),
                    }),
                );
                for inlines in items {
                    let item = self.adopt_section(NewSection::ListItem { inlines }, Some(id))?;
                    if let Some(list) = self.nodes.get_mut(&id).and_then(Section::item_list_mut) {
                        list.append(item)?;
                    }
                }
            }
            NewSection::ListItem { inlines } => {
                let list = list.ok_or_else(|| {
                    ModelError::invalid_structure("list item adopted without a list")
                })?;
                self.nodes.insert(
                    id,
                    Section::ListItem(ListItem {
                        list,
                        inlines: LinkedList::new(),
                    }),
                );
                self.adopt_inlines(id, inlines)?;
            }
            NewSection::Card { name, payload } => {
                self.nodes
                    .insert(id, Section::Card(crate::section::CardSection { name, payload }));
            }
            NewSection::Image { src } => {
                self.nodes
                    .insert(id, Section::Image(crate::section::ImageSection { src }));
            }
        }
        Ok(id)
    }

    fn adopt_inlines(&mut self, section: SectionId, inlines: Vec<Inline>) -> ModelResult<()> {
        let inlines = if inlines.is_empty() {
            vec![Inline::Marker(Marker {
                value: String::new(),
                markups: Vec::new(),
            })]
        } else {
            inlines
        };
        for inline in inlines {
            let id = self.ids.next_inline();
            self.inlines.insert(id, InlineNode { section, inline });
            if let Some(list) = self.nodes.get_mut(&section).and_then(Section::inline_list_mut) {
                list.append(id)?;
            }
        }
        Ok(())
    }

    /// Detach and drop a section subtree, returning its content
    pub fn remove_section(&mut self, id: SectionId) -> ModelResult<NewSection> {
        let content = self.extract_section(id)?;
        self.mark_parent_dirty(id);
        match self.parent(id) {
            Some(list) => {
                if let Some(items) = self.nodes.get_mut(&list).and_then(Section::item_list_mut) {
                    items.remove(id);
                }
            }
            None => {
                self.sections.remove(id);
            }
        }
        self.release_section(id);
        self.changes.record_removed(NodeRef::Section(id));
        Ok(content)
    }

    fn release_section(&mut self, id: SectionId) {
        let Some(section) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(list) = section.inline_list() {
            for inline in list.iter() {
                self.inlines.remove(&inline);
                self.changes.dirty.remove(&NodeRef::Inline(inline));
            }
        }
        if let Some(items) = section.item_list() {
            for item in items.iter() {
                self.release_section(item);
                self.changes.dirty.remove(&NodeRef::Section(item));
            }
        }
    }

    /// Replace a section with new content at the same place
    pub fn replace_section(&mut self, id: SectionId, section: NewSection) -> ModelResult<SectionId> {
        let parent = self.parent(id);
        let new_id = self.insert_section(parent, section, Some(id))?;
        self.remove_section(id)?;
        Ok(new_id)
    }

    /// Move a section before `before` within its current parent
    pub fn move_section(&mut self, id: SectionId, before: Option<SectionId>) -> ModelResult<()> {
        if before == Some(id) {
            return Ok(());
        }
        self.get_section(id)?;
        match self.parent(id) {
            Some(list) => {
                let items = self
                    .nodes
                    .get_mut(&list)
                    .and_then(Section::item_list_mut)
                    .ok_or(ModelError::UnknownSection(list))?;
                if let Some(b) = before {
                    if !items.contains(b) {
                        return Err(ModelError::invalid_structure("cannot move an item out of its list"));
                    }
                }
                items.remove(id);
                items.insert_before(id, before)?;
                self.changes.mark(NodeRef::Section(list));
            }
            None => {
                if let Some(b) = before {
                    if !self.sections.contains(b) {
                        return Err(ModelError::invalid_structure("cannot move a section into a list"));
                    }
                }
                self.sections.remove(id);
                self.sections.insert_before(id, before)?;
                self.changes.mark(NodeRef::Post);
            }
        }
        Ok(())
    }

    /// Reassign a list item to another list (or another place in its own)
    pub fn move_list_item(
        &mut self,
        item: SectionId,
        to_list: SectionId,
        before: Option<SectionId>,
    ) -> ModelResult<()> {
        let from_list = self
            .parent(item)
            .ok_or_else(|| ModelError::invalid_structure(format!("{} is not a list item", item)))?;
        if self.kind(to_list)? != SectionKind::List {
            return Err(ModelError::invalid_structure(format!("{} is not a list", to_list)));
        }
        if let Some(items) = self.nodes.get_mut(&from_list).and_then(Section::item_list_mut) {
            items.remove(item);
        }
        if let Some(items) = self.nodes.get_mut(&to_list).and_then(Section::item_list_mut) {
            items.insert_before(item, before)?;
        }
        if let Some(Section::ListItem(li)) = self.nodes.get_mut(&item) {
            li.list = to_list;
        }
        self.changes.mark(NodeRef::Section(from_list));
        self.changes.mark(NodeRef::Section(to_list));
        Ok(())
    }

    pub fn set_section_tag(&mut self, id: SectionId, tag: &str) -> ModelResult<()> {
        let section = self.nodes.get_mut(&id).ok_or(ModelError::UnknownSection(id))?;
        match section {
            Section::Markup(s) => s.tag = normalize_tag("markup section", tag, MARKUP_SECTION_TAGS)?,
            Section::List(s) => s.tag = normalize_tag("list section", tag, LIST_SECTION_TAGS)?,
            other => {
                return Err(ModelError::invalid_structure(format!(
                    "{:?} sections have no tag",
                    other.kind()
                )))
            }
        }
        self.changes.mark(NodeRef::Section(id));
        Ok(())
    }

    pub fn set_section_attribute(
        &mut self,
        id: SectionId,
        name: &str,
        value: Option<String>,
    ) -> ModelResult<()> {
        let section = self.nodes.get_mut(&id).ok_or(ModelError::UnknownSection(id))?;
        let attributes = match section {
            Section::Markup(s) => &mut s.attributes,
            Section::List(s) => &mut s.attributes,
            other => {
                return Err(ModelError::invalid_structure(format!(
                    "{:?} sections have no attributes",
                    other.kind()
                )))
            }
        };
        match value {
            Some(v) => attributes.insert(name.to_string(), v),
            None => attributes.remove(name),
        };
        self.changes.mark(NodeRef::Section(id));
        Ok(())
    }

    /// Swap a card's payload in place, keeping its identity
    pub fn set_card_payload(&mut self, id: SectionId, payload: serde_json::Value) -> ModelResult<()> {
        match self.nodes.get_mut(&id) {
            Some(Section::Card(card)) => card.payload = payload,
            Some(other) => {
                return Err(ModelError::invalid_structure(format!(
                    "{:?} section {} is not a card",
                    other.kind(),
                    id
                )))
            }
            None => return Err(ModelError::UnknownSection(id)),
        }
        self.changes.mark(NodeRef::Section(id));
        Ok(())
    }

    /// Adopt an inline into a markerable section, before `before` or at the end
    pub fn insert_inline(
        &mut self,
        section: SectionId,
        inline: Inline,
        before: Option<InlineId>,
    ) -> ModelResult<InlineId> {
        let kind = self.kind(section)?;
        let id = self.ids.next_inline();
        let list = self
            .nodes
            .get_mut(&section)
            .and_then(Section::inline_list_mut)
            .ok_or_else(|| {
                ModelError::invalid_structure(format!("{:?} section {} holds no markers", kind, section))
            })?;
        list.insert_before(id, before)?;
        self.inlines.insert(id, InlineNode { section, inline });
        self.changes.mark(NodeRef::Section(section));
        Ok(id)
    }

    pub fn remove_inline(&mut self, id: InlineId) -> ModelResult<Inline> {
        let node = self.inlines.remove(&id).ok_or(ModelError::UnknownInline(id))?;
        if let Some(list) = self
            .nodes
            .get_mut(&node.section)
            .and_then(Section::inline_list_mut)
        {
            list.remove(id);
        }
        self.changes.mark(NodeRef::Section(node.section));
        self.changes.record_removed(NodeRef::Inline(id));
        Ok(node.inline)
    }

    /// Replace a marker's text; only the marker itself needs re-rendering
    pub fn set_marker_value(&mut self, id: InlineId, value: String) -> ModelResult<()> {
        let node = self.inlines.get_mut(&id).ok_or(ModelError::UnknownInline(id))?;
        match &mut node.inline {
            Inline::Marker(m) => m.value = value,
            Inline::Atom(_) => {
                return Err(ModelError::invalid_structure("atoms have no editable text"))
            }
        }
        self.changes.mark(NodeRef::Inline(id));
        Ok(())
    }

    /// Change the markups on an inline; wrapper structure is section-level
    pub fn set_inline_markups(&mut self, id: InlineId, markups: Vec<MarkupRef>) -> ModelResult<()> {
        let node = self.inlines.get_mut(&id).ok_or(ModelError::UnknownInline(id))?;
        *node.inline.markups_mut() = markups;
        let section = node.section;
        self.changes.mark(NodeRef::Section(section));
        Ok(())
    }

    /// Ensure an inline boundary at `position`, splitting a marker if needed.
    /// Returns the inlines on either side of the boundary.
    pub fn split_at(&mut self, position: Position) -> ModelResult<(Option<InlineId>, Option<InlineId>)> {
        let len = self.section_len(position.section)?;
        if !self.is_markerable(position.section) {
            return Err(ModelError::invalid_structure(format!(
                "{} holds no markers",
                position.section
            )));
        }
        if position.offset > len {
            return Err(ModelError::InvalidPosition {
                section: position.section,
                offset: position.offset,
                len,
            });
        }

        let mut start = 0;
        let mut prev = None;
        for id in self.inline_ids(position.section) {
            let inline = self.get_inline(id)?;
            let end = start + inline.len();
            if position.offset == start {
                return Ok((prev, Some(id)));
            }
            if position.offset < end {
                let (left, right) = inline
                    .split(position.offset - start)
                    .ok_or_else(|| ModelError::invalid_structure("cannot split an atom"))?;
                if let Inline::Marker(m) = left {
                    self.set_marker_value(id, m.value)?;
                }
                let next = self.next_inline(id);
                let right_id = self.insert_inline(position.section, right, next)?;
                return Ok((Some(id), Some(right_id)));
            }
            start = end;
            prev = Some(id);
        }
        Ok((prev, None))
    }

    /// Split a markerable section in two at `position`.
    ///
    /// Splitting at offset 0 of a non-blank section inserts a new blank
    /// section before it, so the original keeps its identity and content.
    /// Returns `(first, second)` in document order.
    pub fn split_section(&mut self, position: Position) -> ModelResult<(SectionId, SectionId)> {
        let id = position.section;
        let section = self.get_section(id)?;
        if !section.is_markerable() {
            return Err(ModelError::NotAddressable {
                section: id,
                kind: section.kind(),
            });
        }
        let blank_twin = match section {
            Section::Markup(s) => NewSection::Markup {
                tag: s.tag.clone(),
                attributes: s.attributes.clone(),
                inlines: Vec::new(),
            },
            _ => NewSection::ListItem { inlines: Vec::new() },
        };

        if position.offset == 0 && !self.is_section_blank(id) {
            let parent = self.parent(id);
            let before = self.insert_section(parent, blank_twin, Some(id))?;
            return Ok((before, id));
        }

        let (_, next) = self.split_at(position)?;
        let mut moved = Vec::new();
        let mut cursor = next;
        while let Some(inline_id) = cursor {
            cursor = self.next_inline(inline_id);
            moved.push(self.remove_inline(inline_id)?);
        }

        let twin = match blank_twin {
            NewSection::Markup { tag, attributes, .. } => NewSection::Markup {
                tag,
                attributes,
                inlines: moved,
            },
            _ => NewSection::ListItem { inlines: moved },
        };
        let after = self.insert_section_after(id, twin)?;
        self.ensure_blank_marker(id)?;
        Ok((id, after))
    }

    /// Append the content of `second` to `first` and remove `second`.
    /// Returns the position at the seam.
    pub fn join_sections(&mut self, first: SectionId, second: SectionId) -> ModelResult<Position> {
        for id in [first, second] {
            if !self.get_section(id)?.is_markerable() {
                return Err(ModelError::invalid_structure(format!(
                    "{} cannot be joined; it holds no markers",
                    id
                )));
            }
        }
        let seam = self.section_len(first)?;
        let content = self.remove_section(second)?;
        for inline in content.into_inlines().unwrap_or_default() {
            if !inline.is_blank_marker() {
                self.insert_inline(first, inline, None)?;
            }
        }
        Ok(Position {
            section: first,
            offset: seam,
        })
    }

    fn ensure_blank_marker(&mut self, section: SectionId) -> ModelResult<()> {
        if self.is_markerable(section) && self.inline_ids(section).is_empty() {
            self.insert_inline(
                section,
                Inline::Marker(Marker {
                    value: String::new(),
                    markups: Vec::new(),
                }),
                None,
            )?;
        }
        Ok(())
    }

    /// Coalesce adjacent equal-markup markers, drop stray empty markers and
    /// make sure the section keeps at least one marker
    pub fn normalize_section(&mut self, section: SectionId) -> ModelResult<()> {
        if !self.is_markerable(section) {
            return Ok(());
        }

        let ids = self.inline_ids(section);
        if ids.len() > 1 {
            for id in &ids {
                if self.inline(*id).is_some_and(Inline::is_blank_marker) {
                    self.remove_inline(*id)?;
                }
            }
        }

        let mut cursor = self.section(section).and_then(Section::inline_list).and_then(|l| l.head());
        while let Some(id) = cursor {
            let next = self.next_inline(id);
            let Some(next_id) = next else {
                break;
            };
            let joinable = match (self.inline(id), self.inline(next_id)) {
                (Some(a), Some(b)) => a.can_join(b),
                _ => false,
            };
            if joinable {
                let tail = self.remove_inline(next_id)?;
                let merged = format!("{}{}", self.get_inline(id)?.text(), tail.text());
                self.set_marker_value(id, merged)?;
                // the merged marker stays put; look at its new neighbour
                continue;
            }
            cursor = Some(next_id);
        }

        self.ensure_blank_marker(section)
    }

    /// Drop lists that lost all their items
    pub fn prune_empty_lists(&mut self) -> ModelResult<()> {
        let empty: Vec<SectionId> = self
            .sections
            .iter()
            .filter(|id| matches!(self.nodes.get(id), Some(Section::List(l)) if l.items.is_empty()))
            .collect();
        for id in empty {
            self.remove_section(id)?;
        }
        Ok(())
    }

    /// Restore steady-state invariants for every section the change log
    /// touched since it was last taken
    pub fn normalize_changed(&mut self) -> ModelResult<()> {
        let mut touched: Vec<SectionId> = Vec::new();
        for node in self.changes.dirty().collect::<Vec<_>>() {
            match node {
                NodeRef::Section(id) => touched.push(id),
                NodeRef::Inline(id) => {
                    if let Some(section) = self.inline_section(id) {
                        touched.push(section);
                    }
                }
                NodeRef::Post => {}
            }
        }
        touched.sort();
        touched.dedup();
        for id in touched {
            if self.contains_section(id) {
                match self.kind(id)? {
                    SectionKind::List => {
                        for item in self.items(id) {
                            self.normalize_section(item)?;
                        }
                    }
                    _ => self.normalize_section(id)?,
                }
            }
        }
        self.prune_empty_lists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn post_of(texts: &[&str]) -> Post {
        let b = Builder::new();
        Post::from_sections(
            texts
                .iter()
                .map(|t| b.paragraph(vec![b.marker(*t, vec![])]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_blank_post_has_no_sections() {
        let post = Post::new();
        assert!(post.is_blank());
        assert_eq!(post.text(), "");
    }

    #[test]
    fn test_empty_markerable_section_gets_blank_marker() {
        let b = Builder::new();
        let post = Post::from_sections(vec![b.paragraph(vec![])]).unwrap();
        let s = post.first_section().unwrap();
        let inlines: Vec<_> = post.inlines(s).collect();
        assert_eq!(inlines.len(), 1);
        assert!(inlines[0].1.is_blank_marker());
        assert!(post.is_section_blank(s));
    }

    #[test]
    fn test_leaf_traversal_descends_into_lists() {
        let b = Builder::new();
        let post = Post::from_sections(vec![
            b.paragraph(vec![b.marker("a", vec![])]),
            b.list_section("ul", vec![vec![b.marker("1", vec![])], vec![b.marker("2", vec![])]])
                .unwrap(),
            b.card_section("hr", serde_json::json!({})),
        ])
        .unwrap();

        let leaves = post.leaf_sections();
        assert_eq!(leaves.len(), 4);
        assert_eq!(post.next_leaf(leaves[0]), Some(leaves[1]));
        assert_eq!(post.next_leaf(leaves[2]), Some(leaves[3]));
        assert_eq!(post.prev_leaf(leaves[1]), Some(leaves[0]));
        assert_eq!(post.prev_leaf(leaves[3]), Some(leaves[2]));
        assert_eq!(post.next_markerable(leaves[2]), None);
        assert_eq!(post.text(), "a\n1\n2\n");
    }

    #[test]
    fn test_list_section_is_not_addressable() {
        let b = Builder::new();
        let post = Post::from_sections(vec![b
            .list_section("ol", vec![vec![b.marker("x", vec![])]])
            .unwrap()])
        .unwrap();
        let list = post.first_section().unwrap();
        assert!(matches!(
            post.section_len(list),
            Err(ModelError::NotAddressable { kind: SectionKind::List, .. })
        ));
    }

    #[test]
    fn test_split_at_splits_marker_once() {
        let mut post = post_of(&["hihey"]);
        let s = post.first_section().unwrap();
        let (before, after) = post.split_at(Position { section: s, offset: 2 }).unwrap();

        assert_eq!(post.get_inline(before.unwrap()).unwrap().text(), "hi");
        assert_eq!(post.get_inline(after.unwrap()).unwrap().text(), "hey");

        // a second split at the same offset finds the existing boundary
        let again = post.split_at(Position { section: s, offset: 2 }).unwrap();
        assert_eq!(again, (before, after));
        assert_eq!(post.inline_ids(s).len(), 2);
    }

    #[test]
    fn test_split_at_rejects_out_of_bounds() {
        let mut post = post_of(&["abc"]);
        let s = post.first_section().unwrap();
        let err = post.split_at(Position { section: s, offset: 4 }).unwrap_err();
        assert_eq!(err, ModelError::InvalidPosition { section: s, offset: 4, len: 3 });
    }

    #[test]
    fn test_split_section_in_middle() {
        let mut post = post_of(&["hihey"]);
        let s = post.first_section().unwrap();
        let (first, second) = post.split_section(Position { section: s, offset: 2 }).unwrap();

        assert_eq!(first, s);
        assert_eq!(post.section_text(first), "hi");
        assert_eq!(post.section_text(second), "hey");
        assert_eq!(post.section_count(), 2);
    }

    #[test]
    fn test_split_section_at_head_keeps_original_identity() {
        let mut post = post_of(&["abc"]);
        let s = post.first_section().unwrap();
        let (first, second) = post.split_section(Position { section: s, offset: 0 }).unwrap();

        assert_eq!(second, s);
        assert!(post.is_section_blank(first));
        assert_eq!(post.section_text(s), "abc");
    }

    #[test]
    fn test_join_sections_appends_content() {
        let mut post = post_of(&["ab", "cd"]);
        let ids: Vec<_> = post.sections().collect();
        let seam = post.join_sections(ids[0], ids[1]).unwrap();
        post.normalize_changed().unwrap();

        assert_eq!(seam, Position { section: ids[0], offset: 2 });
        assert_eq!(post.section_count(), 1);
        assert_eq!(post.section_text(ids[0]), "abcd");
        assert_eq!(post.inline_ids(ids[0]).len(), 1, "coalesced into one marker");
    }

    #[test]
    fn test_normalize_coalesces_equal_markups_but_not_atoms() {
        let mut builder = Builder::new();
        let bold = builder.markup("b", Vec::<(String, String)>::new()).unwrap();
        let b = &builder;
        let mut post = Post::from_sections(vec![b.paragraph(vec![
            b.marker("a", vec![]),
            b.marker("b", vec![]),
            b.marker("c", vec![bold.clone()]),
            b.marker("d", vec![bold.clone()]),
            b.atom("mention", "@x", serde_json::Value::Null, vec![bold.clone()]),
            b.marker("e", vec![bold]),
        ])])
        .unwrap();
        let s = post.first_section().unwrap();
        post.mark_dirty(NodeRef::Section(s));
        post.normalize_changed().unwrap();

        let texts: Vec<_> = post.inlines(s).map(|(_, i)| i.text().to_string()).collect();
        assert_eq!(texts, vec!["ab", "cd", "@x", "e"]);
    }

    #[test]
    fn test_remove_section_records_change() {
        let mut post = post_of(&["a", "b"]);
        let first = post.first_section().unwrap();
        post.take_changes();
        post.remove_section(first).unwrap();

        let changes = post.take_changes();
        assert!(changes.is_dirty(NodeRef::Post));
        assert_eq!(changes.removed(), &[NodeRef::Section(first)]);
        assert!(!post.contains_section(first));
    }

    #[test]
    fn test_move_list_item_reassigns_owner() {
        let b = Builder::new();
        let mut post = Post::from_sections(vec![
            b.list_section("ul", vec![vec![b.marker("1", vec![])]]).unwrap(),
            b.list_section("ol", vec![vec![b.marker("2", vec![])]]).unwrap(),
        ])
        .unwrap();
        let lists: Vec<_> = post.sections().collect();
        let item = post.items(lists[0])[0];
        post.move_list_item(item, lists[1], None).unwrap();

        assert_eq!(post.parent(item), Some(lists[1]));
        assert_eq!(post.items(lists[1]).len(), 2);
        post.prune_empty_lists().unwrap();
        assert_eq!(post.section_count(), 1);
    }

    #[test]
    fn test_compare_positions_in_document_order() {
        let post = post_of(&["ab", "cd"]);
        let ids: Vec<_> = post.sections().collect();
        let a = Position { section: ids[0], offset: 2 };
        let b = Position { section: ids[1], offset: 0 };
        assert_eq!(post.compare(&a, &b), Ordering::Less);
        assert_eq!(post.compare(&b, &a), Ordering::Greater);
        assert_eq!(post.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_compare_walks_across_list_items() {
        let b = Builder::new();
        let post = Post::from_sections(vec![
            b.paragraph(vec![b.marker("ab", vec![])]),
            b.list_section("ul", vec![vec![b.marker("one", vec![])], vec![b.marker("two", vec![])]])
                .unwrap(),
            b.card_section("embed", serde_json::json!({})),
        ])
        .unwrap();
        let leaves = post.leaf_sections();
        let at = |index: usize| Position { section: leaves[index], offset: 0 };

        assert_eq!(post.compare(&at(0), &at(3)), Ordering::Less);
        assert_eq!(post.compare(&at(3), &at(0)), Ordering::Greater);
        assert_eq!(post.compare(&at(2), &at(1)), Ordering::Greater);
        assert_eq!(post.compare(&at(1), &at(3)), Ordering::Less);

        let mut other = post.snapshot();
        let stray = other
            .insert_section(None, b.paragraph(vec![b.marker("x", vec![])]), None)
            .unwrap();
        let unknown = Position { section: stray, offset: 0 };
        assert_eq!(post.compare(&at(0), &unknown), Ordering::Equal);
    }
}

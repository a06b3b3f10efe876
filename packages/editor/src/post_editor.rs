//! # Post Editor
//!
//! The editing transaction. Every programmatic edit goes through a
//! [`PostEditor`] handed out by [`Editor::run`](crate::Editor::run); it
//! works on a private copy of the post, so an error anywhere leaves the
//! committed document untouched.
//!
//! ## Semantics
//!
//! ### delete_range
//! - Inside one section: substring delete
//! - Across sections: interior sections go, the boundary sections are
//!   trimmed and joined into one
//! - An endpoint on a card or image consumes it when the range covers it
//!
//! ### insert_markers / insert_text
//! - Split the marker under the position, splice, coalesce
//! - A blank target loses its placeholder marker
//! - Text typed on a card lands in a new paragraph beside it
//!
//! ### insert_post
//! - A fragment of one markerable section merges into the target
//! - Otherwise the target is split; the fragment's first and last
//!   markerable sections merge with the two halves and everything in
//!   between becomes sections of its own
//!
//! ### toggle_markup
//! - Strip when every covered inline carries the markup, add otherwise
//! - Collapsed ranges are left alone
//!
//! Operations return the position they imply. The transaction's range only
//! changes through [`PostEditor::set_range`]; [`complete`](PostEditor::complete)
//! normalises the post and validates that range.

use crate::errors::{EditorError, EditorResult};
use quire_model::section::{LIST_SECTION_TAGS, MARKUP_SECTION_TAGS};
use quire_model::{
    Builder, Direction, Inline, InlineId, MarkupRef, ModelError, NewSection, Position, Post, Range,
    Section, SectionId,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// What to do when an edit leaves the post without any section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlankPolicy {
    /// Put a single blank paragraph back
    #[default]
    KeepOneSection,
    /// Leave the post blank
    AllowEmpty,
}

/// A leaf of an inserted fragment
#[derive(Debug, Clone)]
enum Unit {
    Markup(NewSection),
    Item {
        tag: String,
        attributes: BTreeMap<String, String>,
        inlines: Vec<Inline>,
    },
    Opaque(NewSection),
}

impl Unit {
    fn inlines(&self) -> Option<&[Inline]> {
        match self {
            Unit::Markup(section) => section.inlines(),
            Unit::Item { inlines, .. } => Some(inlines),
            Unit::Opaque(_) => None,
        }
    }
}

pub struct PostEditor<'a> {
    post: &'a mut Post,
    builder: &'a mut Builder,
    range: Option<Range>,
    blank_policy: BlankPolicy,
}

impl<'a> PostEditor<'a> {
    pub fn new(post: &'a mut Post, builder: &'a mut Builder, range: Option<Range>) -> Self {
        Self {
            post,
            builder,
            range,
            blank_policy: BlankPolicy::default(),
        }
    }

    pub fn post(&self) -> &Post {
        self.post
    }

    pub fn builder(&mut self) -> &mut Builder {
        self.builder
    }

    pub fn range(&self) -> Option<Range> {
        self.range
    }

    /// Range to restore into the view after commit
    pub fn set_range(&mut self, range: Range) {
        self.range = Some(range);
    }

    pub fn set_position(&mut self, position: Position) {
        self.range = Some(Range::collapsed(position));
    }

    pub fn set_blank_policy(&mut self, policy: BlankPolicy) {
        self.blank_policy = policy;
    }

    // -----------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------

    /// Delete the content of `range`; `None` when nothing addressable is left
    pub fn delete_range(&mut self, range: Range) -> EditorResult<Option<Position>> {
        range.validate(self.post)?;
        if range.is_collapsed() {
            return Ok(Some(range.head));
        }
        let (head, tail) = (range.head, range.tail);

        if head.section == tail.section {
            if self.post.is_markerable(head.section) {
                self.delete_in_section(head.section, head.offset, tail.offset)?;
                return Ok(Some(head));
            }
            return self.remove_leaf_with_neighbour(head.section);
        }

        let leaves = range.leaf_sections(self.post)?;
        if let [_, interior @ .., _] = leaves.as_slice() {
            for section in interior {
                self.post.remove_section(*section)?;
            }
        }

        let head_markerable = self.post.is_markerable(head.section);
        let tail_markerable = self.post.is_markerable(tail.section);
        if head_markerable {
            let len = self.post.section_len(head.section)?;
            self.delete_in_section(head.section, head.offset, len)?;
        }
        if tail_markerable {
            self.delete_in_section(tail.section, 0, tail.offset)?;
        }

        let consume_head = !head_markerable && head.offset == 0;
        let consume_tail = !tail_markerable && tail.offset == 1;

        match (head_markerable, tail_markerable) {
            (true, true) => return Ok(Some(self.post.join_sections(head.section, tail.section)?)),
            (true, false) => {
                if consume_tail {
                    self.post.remove_section(tail.section)?;
                }
                return Ok(Some(head));
            }
            (false, true) => {
                if consume_head {
                    self.post.remove_section(head.section)?;
                }
                return Ok(Some(Position::head(self.post, tail.section)?));
            }
            (false, false) => {}
        }

        match (consume_head, consume_tail) {
            (false, false) => Ok(Some(head)),
            (true, false) => {
                let prev = self.post.prev_leaf(head.section);
                self.post.remove_section(head.section)?;
                match prev {
                    Some(prev) => Ok(Some(Position::tail(self.post, prev)?)),
                    None => Ok(Some(Position::head(self.post, tail.section)?)),
                }
            }
            (false, true) => {
                self.post.remove_section(tail.section)?;
                Ok(Some(head))
            }
            (true, true) => {
                let prev = self.post.prev_leaf(head.section);
                let next = self.post.next_leaf(tail.section);
                self.post.remove_section(head.section)?;
                self.post.remove_section(tail.section)?;
                self.neighbour_position(prev, next)
            }
        }
    }

    /// Single-unit backspace (`Backward`) or forward delete (`Forward`)
    pub fn delete_at_position(
        &mut self,
        position: Position,
        direction: Direction,
    ) -> EditorResult<Option<Position>> {
        position.validate(self.post)?;
        let section = position.section;
        let len = self.post.section_len(section)?;

        if !self.post.is_markerable(section) {
            return self.delete_at_opaque(position, direction);
        }

        match direction {
            Direction::Backward => {
                if position.offset > 0 {
                    let from = position.offset - 1;
                    self.delete_in_section(section, from, position.offset)?;
                    return Ok(Some(Position { section, offset: from }));
                }
                if self.post.parent(section).is_some() {
                    let paragraph = self.list_item_to_markup(section)?;
                    return Ok(Some(Position::head(self.post, paragraph)?));
                }
                let Some(prev) = self.post.prev_leaf(section) else {
                    return Ok(Some(position));
                };
                if self.post.is_markerable(prev) {
                    return Ok(Some(self.post.join_sections(prev, section)?));
                }
                if self.post.is_section_blank(section) {
                    self.post.remove_section(section)?;
                    return Ok(Some(Position::tail(self.post, prev)?));
                }
                self.post.remove_section(prev)?;
                Ok(Some(position))
            }
            Direction::Forward => {
                if position.offset < len {
                    self.delete_in_section(section, position.offset, position.offset + 1)?;
                    return Ok(Some(position));
                }
                let Some(next) = self.post.next_leaf(section) else {
                    return Ok(Some(position));
                };
                if self.post.is_markerable(next) {
                    return Ok(Some(self.post.join_sections(section, next)?));
                }
                if self.post.is_section_blank(section) {
                    self.post.remove_section(section)?;
                    return Ok(Some(Position::head(self.post, next)?));
                }
                self.post.remove_section(next)?;
                Ok(Some(position))
            }
        }
    }

    fn delete_at_opaque(&mut self, position: Position, direction: Direction) -> EditorResult<Option<Position>> {
        let section = position.section;
        let covers = matches!(
            (direction, position.offset),
            (Direction::Backward, 1) | (Direction::Forward, 0)
        );
        if covers {
            let paragraph = self.builder.paragraph(Vec::new());
            let replaced = self.post.replace_section(section, paragraph)?;
            return Ok(Some(Position::head(self.post, replaced)?));
        }

        // moving away from the card: swallow a blank neighbour on that side
        let neighbour = match direction {
            Direction::Backward => self.post.prev_leaf(section),
            Direction::Forward => self.post.next_leaf(section),
        };
        if let Some(neighbour) = neighbour {
            if self.post.is_section_blank(neighbour) {
                self.post.remove_section(neighbour)?;
            }
        }
        Ok(Some(position))
    }

    /// Remove characters `from..to` of a markerable section
    fn delete_in_section(&mut self, section: SectionId, from: usize, to: usize) -> EditorResult<()> {
        if from >= to {
            return Ok(());
        }
        for id in self.covered_inlines(section, from, to)? {
            self.post.remove_inline(id)?;
        }
        self.post.normalize_section(section)?;
        Ok(())
    }

    /// Split at `from` and `to`, returning the inlines strictly between
    fn covered_inlines(&mut self, section: SectionId, from: usize, to: usize) -> EditorResult<Vec<InlineId>> {
        self.post.split_at(Position { section, offset: to })?;
        self.post.split_at(Position { section, offset: from })?;

        let mut covered = Vec::new();
        let mut start = 0;
        for (id, inline) in self.post.inlines(section) {
            let end = start + inline.len();
            if start >= from && end <= to && end > start {
                covered.push(id);
            }
            start = end;
        }
        Ok(covered)
    }

    /// Remove an opaque leaf, landing on the content around it
    fn remove_leaf_with_neighbour(&mut self, section: SectionId) -> EditorResult<Option<Position>> {
        let prev = self.post.prev_leaf(section);
        let next = self.post.next_leaf(section);
        self.post.remove_section(section)?;
        self.neighbour_position(prev, next)
    }

    fn neighbour_position(
        &self,
        prev: Option<SectionId>,
        next: Option<SectionId>,
    ) -> EditorResult<Option<Position>> {
        if let Some(prev) = prev.filter(|s| self.post.contains_section(*s)) {
            return Ok(Some(Position::tail(self.post, prev)?));
        }
        if let Some(next) = next.filter(|s| self.post.contains_section(*s)) {
            return Ok(Some(Position::head(self.post, next)?));
        }
        Ok(None)
    }

    // -----------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------

    /// Insert text, splitting sections at newlines. Typed text inherits
    /// the markups of the inline the caret is attached to.
    pub fn insert_text(&mut self, position: Position, text: &str) -> EditorResult<Position> {
        position.validate(self.post)?;
        let mut position = self.markerable_target(position)?;
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                position = self.split_section(position)?;
            }
            if !line.is_empty() {
                let markups = self.post.markups_at(&position);
                let marker = self.builder.marker(line, markups);
                position = self.insert_markers(position, vec![marker])?;
            }
        }
        Ok(position)
    }

    /// Splice `inlines` in at `position`; returns the position after them
    pub fn insert_markers(&mut self, position: Position, inlines: Vec<Inline>) -> EditorResult<Position> {
        position.validate(self.post)?;
        let position = self.markerable_target(position)?;
        let section = position.section;
        if inlines.is_empty() {
            return Ok(position);
        }

        let inlines: Vec<Inline> = inlines
            .into_iter()
            .map(|inline| self.builder.adopt_inline(inline))
            .collect();
        let inserted: usize = inlines.iter().map(Inline::len).sum();

        let before = if self.post.is_section_blank(section) {
            for id in self.post.inline_ids(section) {
                self.post.remove_inline(id)?;
            }
            None
        } else {
            self.post.split_at(position)?.1
        };
        for inline in inlines {
            self.post.insert_inline(section, inline, before)?;
        }
        self.post.normalize_section(section)?;

        Ok(Position {
            section,
            offset: position.offset + inserted,
        })
    }

    /// Merge a standalone fragment into the post at `position`
    pub fn insert_post(&mut self, position: Position, fragment: &Post) -> EditorResult<Position> {
        position.validate(self.post)?;
        let units = flatten(fragment);
        let Some(first) = units.first() else {
            return Ok(position);
        };
        if units.len() == 1 {
            if let Some(inlines) = first.inlines() {
                return self.insert_markers(position, inlines.to_vec());
            }
        }

        let position = self.markerable_target(position)?;
        let (head_half, tail_half) = self.post.split_section(position)?;
        let last_index = units.len() - 1;
        let mut cursor = head_half;
        let mut landing = None;

        for (index, unit) in units.iter().enumerate() {
            let inlines = unit.inlines().map(<[Inline]>::to_vec);
            match inlines {
                Some(inlines) if index == 0 => {
                    let tail = Position::tail(self.post, head_half)?;
                    self.insert_markers(tail, inlines)?;
                }
                Some(inlines) if index == last_index => {
                    let head = Position::head(self.post, tail_half)?;
                    landing = Some(self.insert_markers(head, inlines)?);
                }
                _ => {
                    let unit = self.adopt_unit(unit.clone());
                    cursor = self.insert_after_leaf(cursor, unit)?;
                }
            }
        }

        let first_opaque = matches!(units.first(), Some(Unit::Opaque(_)));
        let last_opaque = matches!(units.last(), Some(Unit::Opaque(_)));
        if first_opaque && self.post.is_section_blank(head_half) {
            self.post.remove_section(head_half)?;
        }
        if last_opaque && self.post.is_section_blank(tail_half) && self.post.next_leaf(tail_half).is_some() {
            self.post.remove_section(tail_half)?;
            return Ok(Position::tail(self.post, cursor)?);
        }
        match landing {
            Some(position) => Ok(position),
            None => Ok(Position::head(self.post, tail_half)?),
        }
    }

    fn adopt_unit(&mut self, unit: Unit) -> Unit {
        let mut adopt = |inlines: Vec<Inline>| -> Vec<Inline> {
            inlines.into_iter().map(|i| self.builder.adopt_inline(i)).collect()
        };
        match unit {
            Unit::Markup(NewSection::Markup {
                tag,
                attributes,
                inlines,
            }) => Unit::Markup(NewSection::Markup {
                tag,
                attributes,
                inlines: adopt(inlines),
            }),
            Unit::Item {
                tag,
                attributes,
                inlines,
            } => Unit::Item {
                tag,
                attributes,
                inlines: adopt(inlines),
            },
            other => other,
        }
    }

    /// Place `unit` right after the leaf `after`, splitting the surrounding
    /// list when the unit cannot live inside it. Returns the new leaf.
    fn insert_after_leaf(&mut self, after: SectionId, unit: Unit) -> EditorResult<SectionId> {
        if let Some(list) = self.post.parent(after) {
            let list_tag = self.post.get_section(list)?.tag().to_string();
            if let Unit::Item { tag, inlines, .. } = &unit {
                if *tag == list_tag {
                    let item = NewSection::ListItem {
                        inlines: inlines.clone(),
                    };
                    return Ok(self.post.insert_section_after(after, item)?);
                }
            }

            let rest: Vec<SectionId> = self
                .post
                .items(list)
                .into_iter()
                .skip_while(|item| *item != after)
                .skip(1)
                .collect();
            let inserted = self.insert_top_level(list, unit)?;
            if !rest.is_empty() {
                self.split_list_after(list, inserted, &rest)?;
            }
            return Ok(inserted);
        }
        self.insert_top_level(after, unit)
    }

    /// Insert a unit as a top-level section after `after`; returns its leaf
    fn insert_top_level(&mut self, after: SectionId, unit: Unit) -> EditorResult<SectionId> {
        let section = match unit {
            Unit::Markup(section) | Unit::Opaque(section) => section,
            Unit::Item {
                tag,
                attributes,
                inlines,
            } => NewSection::List {
                tag,
                attributes,
                items: vec![inlines],
            },
        };
        let id = self.post.insert_section_after(after, section)?;
        Ok(self.post.items(id).first().copied().unwrap_or(id))
    }

    /// Move `rest` of `list` into a twin list placed after `anchor`
    fn split_list_after(&mut self, list: SectionId, anchor: SectionId, rest: &[SectionId]) -> EditorResult<()> {
        let (tag, attributes) = match self.post.get_section(list)? {
            Section::List(l) => (l.tag.clone(), l.attributes.clone()),
            _ => return Err(ModelError::invalid_structure(format!("{} is not a list", list)).into()),
        };
        let top = self.post.parent(anchor).unwrap_or(anchor);
        let twin = self.post.insert_section_after(
            top,
            NewSection::List {
                tag,
                attributes,
                items: Vec::new(),
            },
        )?;
        for item in rest {
            self.post.move_list_item(*item, twin, None)?;
        }
        Ok(())
    }

    /// Redirect a position on a card or image to a blank paragraph beside it
    fn markerable_target(&mut self, position: Position) -> EditorResult<Position> {
        if self.post.is_markerable(position.section) {
            return Ok(position);
        }
        let paragraph = self.builder.paragraph(Vec::new());
        let id = if position.offset == 0 {
            let parent = self.post.parent(position.section);
            self.post.insert_section(parent, paragraph, Some(position.section))?
        } else {
            self.post.insert_section_after(position.section, paragraph)?
        };
        Ok(Position::head(self.post, id)?)
    }

    // -----------------------------------------------------------------
    // Splitting and section kinds
    // -----------------------------------------------------------------

    /// Split the section at `position`; returns where the caret goes
    pub fn split_section(&mut self, position: Position) -> EditorResult<Position> {
        position.validate(self.post)?;
        let section = position.section;

        if !self.post.is_markerable(section) {
            let paragraph = self.builder.paragraph(Vec::new());
            if position.offset == 0 {
                let parent = self.post.parent(section);
                self.post.insert_section(parent, paragraph, Some(section))?;
                return Ok(position);
            }
            let after = self.post.insert_section_after(section, paragraph)?;
            return Ok(Position::head(self.post, after)?);
        }

        if self.post.parent(section).is_some() && self.post.is_section_blank(section) {
            let paragraph = self.list_item_to_markup(section)?;
            return Ok(Position::head(self.post, paragraph)?);
        }

        let (_, second) = self.post.split_section(position)?;
        Ok(Position::head(self.post, second)?)
    }

    /// Convert the markerable sections of `range` to `tag`, or back to
    /// paragraphs when they all have it already. Returns the remapped range.
    pub fn toggle_section(&mut self, tag: &str, range: Range) -> EditorResult<Range> {
        range.validate(self.post)?;
        let tag = tag.to_ascii_lowercase();
        let is_list = LIST_SECTION_TAGS.contains(&tag.as_str());
        if !is_list && !MARKUP_SECTION_TAGS.contains(&tag.as_str()) {
            return Err(ModelError::invalid_tag("section", tag).into());
        }

        let leaves: Vec<SectionId> = range
            .leaf_sections(self.post)?
            .into_iter()
            .filter(|s| self.post.is_markerable(*s))
            .collect();
        if leaves.is_empty() {
            return Ok(range);
        }

        let all_tagged = leaves.iter().all(|s| self.effective_tag(*s) == tag);
        let target = if all_tagged { "p".to_string() } else { tag };
        let to_list = LIST_SECTION_TAGS.contains(&target.as_str());

        let mut remapped: HashMap<SectionId, SectionId> = HashMap::new();
        for leaf in leaves {
            match (self.post.parent(leaf), to_list) {
                (None, false) => self.post.set_section_tag(leaf, &target)?,
                (None, true) => {
                    let item = self.markup_to_list_item(leaf, &target)?;
                    remapped.insert(leaf, item);
                }
                (Some(list), true) => {
                    if self.post.get_section(list)?.tag() != target {
                        self.post.set_section_tag(list, &target)?;
                    }
                }
                (Some(_), false) => {
                    let paragraph = self.list_item_to_markup(leaf)?;
                    if target != "p" {
                        self.post.set_section_tag(paragraph, &target)?;
                    }
                    remapped.insert(leaf, paragraph);
                }
            }
        }

        let remap = |p: Position| Position {
            section: remapped.get(&p.section).copied().unwrap_or(p.section),
            offset: p.offset,
        };
        Ok(Range::new(remap(range.head), remap(range.tail), range.direction))
    }

    /// Tag a markerable section displays with: its own, or its list's
    fn effective_tag(&self, section: SectionId) -> String {
        let id = self.post.parent(section).unwrap_or(section);
        self.post
            .section(id)
            .map(|s| s.tag().to_string())
            .unwrap_or_default()
    }

    /// Pull a list item out of its list as a paragraph, splitting the list
    /// around it. Returns the paragraph.
    fn list_item_to_markup(&mut self, item: SectionId) -> EditorResult<SectionId> {
        let list = self
            .post
            .parent(item)
            .ok_or_else(|| ModelError::invalid_structure(format!("{} is not a list item", item)))?;
        let items = self.post.items(list);
        let index = items.iter().position(|i| *i == item).unwrap_or(0);
        let inlines = self
            .post
            .extract_section(item)?
            .into_inlines()
            .unwrap_or_default();
        let paragraph = self.builder.paragraph(inlines);

        let id = if index == 0 {
            self.post.insert_section(None, paragraph, Some(list))?
        } else {
            let id = self.post.insert_section_after(list, paragraph)?;
            let rest = &items[index + 1..];
            if !rest.is_empty() {
                self.split_list_after(list, id, rest)?;
            }
            id
        };

        self.post.remove_section(item)?;
        if self.post.items(list).is_empty() {
            self.post.remove_section(list)?;
        }
        Ok(id)
    }

    /// Turn a top-level markerable section into a list item, joining a
    /// neighbouring list of the same tag. Returns the item.
    fn markup_to_list_item(&mut self, section: SectionId, tag: &str) -> EditorResult<SectionId> {
        let inlines = self
            .post
            .extract_section(section)?
            .into_inlines()
            .unwrap_or_default();
        let same_list = |post: &Post, id: Option<SectionId>| {
            id.filter(|s| matches!(post.section(*s), Some(Section::List(l)) if l.tag == tag))
        };
        let post: &Post = self.post;
        let prev = same_list(post, post.prev_sibling(section));
        let next = same_list(post, post.next_sibling(section));
        let item = NewSection::ListItem { inlines };

        let id = match (prev, next) {
            (Some(prev), next) => {
                let id = self.post.insert_section(Some(prev), item, None)?;
                if let Some(next) = next {
                    for moved in self.post.items(next) {
                        self.post.move_list_item(moved, prev, None)?;
                    }
                    self.post.remove_section(next)?;
                }
                id
            }
            (None, Some(next)) => {
                let first = self.post.items(next).first().copied();
                self.post.insert_section(Some(next), item, first)?
            }
            (None, None) => {
                let list = self.post.insert_section(
                    None,
                    NewSection::List {
                        tag: tag.to_string(),
                        attributes: BTreeMap::new(),
                        items: Vec::new(),
                    },
                    Some(section),
                )?;
                self.post.insert_section(Some(list), item, None)?
            }
        };
        self.post.remove_section(section)?;
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Markups
    // -----------------------------------------------------------------

    /// Add `markup` over `range`, or strip it if the range is fully covered
    pub fn toggle_markup(&mut self, markup: &MarkupRef, range: Range) -> EditorResult<()> {
        if range.is_collapsed() {
            return Ok(());
        }
        let covered = self.split_range(range)?;
        let all = !covered.is_empty()
            && covered
                .iter()
                .all(|id| self.post.inline(*id).is_some_and(|i| carries(i, markup)));
        self.apply_markup(&covered, markup, !all)
    }

    pub fn add_markup_to_range(&mut self, markup: &MarkupRef, range: Range) -> EditorResult<()> {
        if range.is_collapsed() {
            return Ok(());
        }
        let covered = self.split_range(range)?;
        self.apply_markup(&covered, markup, true)
    }

    pub fn remove_markup_from_range(&mut self, markup: &MarkupRef, range: Range) -> EditorResult<()> {
        if range.is_collapsed() {
            return Ok(());
        }
        let covered = self.split_range(range)?;
        self.apply_markup(&covered, markup, false)
    }

    fn apply_markup(&mut self, covered: &[InlineId], markup: &MarkupRef, add: bool) -> EditorResult<()> {
        for id in covered {
            let inline = self.post.get_inline(*id)?;
            let mut markups = inline.markups().to_vec();
            if add {
                if carries(inline, markup) {
                    continue;
                }
                markups.push(markup.clone());
            } else {
                if !carries(inline, markup) {
                    continue;
                }
                markups.retain(|m| **m != **markup);
            }
            self.post.set_inline_markups(*id, markups)?;
        }
        Ok(())
    }

    /// Split markers at both ends of `range` and collect what lies inside
    fn split_range(&mut self, range: Range) -> EditorResult<Vec<InlineId>> {
        range.validate(self.post)?;
        let mut covered = Vec::new();
        for leaf in range.leaf_sections(self.post)? {
            if !self.post.is_markerable(leaf) {
                continue;
            }
            let (from, to) = range.offsets_in(self.post, leaf)?;
            if from < to {
                covered.extend(self.covered_inlines(leaf, from, to)?);
            }
        }
        Ok(covered)
    }

    // -----------------------------------------------------------------
    // Whole sections
    // -----------------------------------------------------------------

    /// Insert a top-level section before `before`, or at the end
    pub fn insert_section(&mut self, section: NewSection, before: Option<SectionId>) -> EditorResult<SectionId> {
        let section = self.adopt_section(section);
        Ok(self.post.insert_section(None, section, before)?)
    }

    pub fn insert_section_at_end(&mut self, section: NewSection) -> EditorResult<SectionId> {
        self.insert_section(section, None)
    }

    pub fn remove_section(&mut self, section: SectionId) -> EditorResult<NewSection> {
        Ok(self.post.remove_section(section)?)
    }

    pub fn replace_section(&mut self, section: SectionId, with: NewSection) -> EditorResult<SectionId> {
        let with = self.adopt_section(with);
        Ok(self.post.replace_section(section, with)?)
    }

    /// Swap a section with its previous sibling; false at the top
    pub fn move_section_up(&mut self, section: SectionId) -> EditorResult<bool> {
        match self.post.prev_sibling(section) {
            Some(prev) => {
                self.post.move_section(section, Some(prev))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Swap a section with its next sibling; false at the bottom
    pub fn move_section_down(&mut self, section: SectionId) -> EditorResult<bool> {
        match self.post.next_sibling(section) {
            Some(next) => {
                let before = self.post.next_sibling(next);
                self.post.move_section(section, before)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_attribute(&mut self, section: SectionId, name: &str, value: impl Into<String>) -> EditorResult<()> {
        Ok(self.post.set_section_attribute(section, name, Some(value.into()))?)
    }

    pub fn remove_attribute(&mut self, section: SectionId, name: &str) -> EditorResult<()> {
        Ok(self.post.set_section_attribute(section, name, None)?)
    }

    pub fn set_card_payload(&mut self, section: SectionId, payload: Value) -> EditorResult<()> {
        match self.post.section(section) {
            Some(Section::Card(_)) => Ok(self.post.set_card_payload(section, payload)?),
            _ => Err(EditorError::CardNotFound(section)),
        }
    }

    fn adopt_section(&mut self, section: NewSection) -> NewSection {
        let mut adopt = |inlines: Vec<Inline>| -> Vec<Inline> {
            inlines.into_iter().map(|i| self.builder.adopt_inline(i)).collect()
        };
        match section {
            NewSection::Markup {
                tag,
                attributes,
                inlines,
            } => NewSection::Markup {
                tag,
                attributes,
                inlines: adopt(inlines),
            },
            NewSection::List {
                tag,
                attributes,
                items,
            } => NewSection::List {
                tag,
                attributes,
                items: items.into_iter().map(&mut adopt).collect(),
            },
            NewSection::ListItem { inlines } => NewSection::ListItem {
                inlines: adopt(inlines),
            },
            other => other,
        }
    }

    // -----------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------

    /// Restore steady-state invariants and settle the range to restore
    pub fn complete(self) -> EditorResult<Option<Range>> {
        self.post.normalize_changed()?;

        if self.post.is_blank() && self.blank_policy == BlankPolicy::KeepOneSection {
            let paragraph = self.builder.paragraph(Vec::new());
            self.post.insert_section(None, paragraph, None)?;
        }

        let range = self
            .range
            .filter(|r| r.validate(self.post).is_ok())
            .or_else(|| Position::post_tail(self.post).map(Range::collapsed));
        Ok(range)
    }
}

fn carries(inline: &Inline, markup: &MarkupRef) -> bool {
    inline.markups().iter().any(|m| **m == **markup)
}

/// Leaves of a fragment in document order
fn flatten(fragment: &Post) -> Vec<Unit> {
    let mut units = Vec::new();
    for section in fragment.to_sections() {
        match section {
            NewSection::Markup { .. } => units.push(Unit::Markup(section)),
            NewSection::List {
                tag,
                attributes,
                items,
            } => {
                for inlines in items {
                    units.push(Unit::Item {
                        tag: tag.clone(),
                        attributes: attributes.clone(),
                        inlines,
                    });
                }
            }
            NewSection::ListItem { inlines } => units.push(Unit::Item {
                tag: "ul".to_string(),
                attributes: BTreeMap::new(),
                inlines,
            }),
            NewSection::Card { .. } | NewSection::Image { .. } => units.push(Unit::Opaque(section)),
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(builder: &Builder, texts: &[&str]) -> Post {
        Post::from_sections(
            texts
                .iter()
                .map(|t| builder.paragraph(vec![builder.marker(*t, vec![])]))
                .collect(),
        )
        .unwrap()
    }

    fn at(post: &Post, index: usize, offset: usize) -> Position {
        let section = post.leaf_sections()[index];
        Position::new(post, section, offset).unwrap()
    }

    #[test]
    fn test_delete_within_marker() {
        let mut builder = Builder::new();
        let mut post = paragraphs(&builder, &["hello"]);
        let range = Range::new(at(&post, 0, 1), at(&post, 0, 4), None);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        let pos = tx.delete_range(range).unwrap().unwrap();
        assert_eq!(pos.offset, 1);
        tx.complete().unwrap();
        assert_eq!(post.text(), "ho");
    }

    #[test]
    fn test_delete_across_sections_joins_boundaries() {
        let mut builder = Builder::new();
        let mut post = paragraphs(&builder, &["abc", "mid", "def"]);
        let range = Range::new(at(&post, 0, 1), at(&post, 2, 1), None);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        tx.delete_range(range).unwrap();
        tx.complete().unwrap();
        assert_eq!(post.section_count(), 1);
        assert_eq!(post.text(), "aef");
    }

    #[test]
    fn test_backspace_joins_with_previous_section() {
        let mut builder = Builder::new();
        let mut post = paragraphs(&builder, &["ab", "cd"]);
        let head = at(&post, 1, 0);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        let pos = tx.delete_at_position(head, Direction::Backward).unwrap().unwrap();
        tx.complete().unwrap();
        assert_eq!(post.text(), "abcd");
        assert_eq!(pos.offset, 2);
    }

    #[test]
    fn test_insert_text_inherits_markups_and_splits_lines() {
        let mut builder = Builder::new();
        let bold = builder.simple_markup("b").unwrap();
        let mut post = Post::from_sections(vec![builder.paragraph(vec![builder.marker("ab", vec![bold.clone()])])]).unwrap();
        let pos = at(&post, 0, 2);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        let end = tx.insert_text(pos, "c\nd").unwrap();
        tx.complete().unwrap();
        assert_eq!(post.text(), "abc\nd");
        assert_eq!(end.offset, 1);
        let first = post.first_section().unwrap();
        assert_eq!(post.inline_ids(first).len(), 1);
        assert!(post.inlines(first).all(|(_, i)| i.has_markup(&bold)));
    }

    #[test]
    fn test_toggle_section_to_list_and_back() {
        let mut builder = Builder::new();
        let mut post = paragraphs(&builder, &["one", "two"]);
        let range = Range::new(at(&post, 0, 0), at(&post, 1, 3), None);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        let listed = tx.toggle_section("ul", range).unwrap();
        tx.complete().unwrap();
        assert_eq!(post.section_count(), 1);
        let list = post.first_section().unwrap();
        assert_eq!(post.items(list).len(), 2);
        assert_eq!(post.parent(listed.head.section), Some(list));

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        tx.toggle_section("ul", listed).unwrap();
        tx.complete().unwrap();
        assert_eq!(post.section_count(), 2);
        assert!(post.sections().all(|s| post.section(s).unwrap().tag() == "p"));
        assert_eq!(post.text(), "one\ntwo");
    }

    #[test]
    fn test_blank_policy_allow_empty() {
        let mut builder = Builder::new();
        let mut post = Post::from_sections(vec![builder.card_section("embed", Value::Null)]).unwrap();
        let card = post.first_section().unwrap();
        let range = Range::new(Position::head(&post, card).unwrap(), Position::tail(&post, card).unwrap(), None);

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        tx.set_blank_policy(BlankPolicy::AllowEmpty);
        assert_eq!(tx.delete_range(range).unwrap(), None);
        assert_eq!(tx.complete().unwrap(), None);
        assert!(post.is_blank());
    }

    #[test]
    fn test_move_section_down() {
        let mut builder = Builder::new();
        let mut post = paragraphs(&builder, &["a", "b", "c"]);
        let first = post.first_section().unwrap();

        let mut tx = PostEditor::new(&mut post, &mut builder, None);
        assert!(tx.move_section_down(first).unwrap());
        tx.complete().unwrap();
        assert_eq!(post.text(), "b\na\nc");
    }
}

//! # Reconciler
//!
//! Phase two of foreign-edit absorption. The platform has already changed
//! the view; the post is a stale cache. Each queued [`ViewMutation`] names
//! a view node, which is mapped back through the render tree to the
//! smallest document subtree that must be re-derived:
//!
//! | target lands in | action |
//! |-----------------|--------|
//! | a markerable section or one of its markers | diff that section's inlines |
//! | a list element | align the list's items |
//! | the placeholder text beside a card | new paragraph before / after the card |
//! | a card's own content or an atom's holder | ignored |
//! | the root, an image, or anything unmapped | whole-root reparse |
//!
//! Re-derivation issues the same primitives a transaction would, so the
//! render pass that follows has nothing left to change in the view.
//! Reparsing always reads the view as it is now, never the mutation
//! record, which makes repeated mutations on one node harmless.
//!
//! With deferred rendering a commit can still be waiting for its render
//! when the platform edits the view. The view then shows neither the
//! commit nor the truth, so sections the commit touched are merged rather
//! than re-derived: each marker's edit is taken relative to the text last
//! rendered for it and replayed onto the committed text. When the two
//! edits overlap, or the platform reshaped the section, the commit wins
//! and the render pass redraws the section.

use crate::config::EditorConfig;
use crate::errors::EditorResult;
use crate::render_tree::{RenderParts, RenderTree};
use crate::section_parser::{Known, ParserPlugin, SectionParser};
use crate::view::{ViewId, ViewMutation, ViewTree};
use quire_model::markup::equal_markups;
use quire_model::{Builder, ChangeLog, Inline, NewSection, NodeRef, Position, Post, Range, Section, SectionId};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// What one reconcile call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReparseOutcome {
    /// Sections re-derived from the view
    pub sections: usize,
    /// True when the whole root was reparsed
    pub full: bool,
    /// Where the caret belongs when the view selection cannot say
    pub range_hint: Option<Range>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Root,
    List(SectionId),
    Section(SectionId),
    CardCursor(SectionId),
    Ignore,
}

/// Absorb `mutations` into `post`
#[instrument(skip_all)]
pub(crate) fn reconcile(
    post: &mut Post,
    builder: &mut Builder,
    view: &ViewTree,
    tree: &RenderTree,
    mutations: &[ViewMutation],
    pending: &ChangeLog,
    config: &EditorConfig,
    plugins: &[Box<dyn ParserPlugin>],
) -> EditorResult<ReparseOutcome> {
    let targets: BTreeSet<Target> = mutations
        .iter()
        .map(|m| classify(post, view, tree, pending, m.target()))
        .filter(|t| *t != Target::Ignore)
        .collect();

    if targets.is_empty() {
        return Ok(ReparseOutcome::default());
    }

    let mut reconciler = Reconciler {
        post,
        builder,
        view,
        tree,
        pending,
        config,
        plugins,
        outcome: ReparseOutcome::default(),
    };

    if targets.contains(&Target::Root) {
        reconciler.reparse_root()?;
        return Ok(reconciler.outcome);
    }

    let lists: Vec<SectionId> = targets
        .iter()
        .filter_map(|t| match t {
            Target::List(id) => Some(*id),
            _ => None,
        })
        .collect();

    for target in &targets {
        let done = match *target {
            Target::List(id) => reconciler.reparse_list(id)?,
            Target::Section(id) => {
                // a dirty list re-derives its items anyway
                let covered = reconciler.post.parent(id).is_some_and(|l| lists.contains(&l));
                covered || reconciler.reparse_section(id)?
            }
            Target::CardCursor(id) => reconciler.absorb_card_cursor(id)?,
            Target::Root | Target::Ignore => true,
        };
        if !done {
            warn!(?target, "view no longer matches the render tree, reparsing root");
            reconciler.outcome = ReparseOutcome::default();
            reconciler.reparse_root()?;
            break;
        }
    }

    Ok(reconciler.outcome)
}

/// Smallest document subtree a mutated view node belongs to. Nodes an
/// unrendered commit removed are ignored; the next render drops them.
fn classify(post: &Post, view: &ViewTree, tree: &RenderTree, pending: &ChangeLog, target: ViewId) -> Target {
    if !view.contains(target) || !view.is_attached(target) {
        return Target::Ignore;
    }
    if target == view.root() {
        return Target::Root;
    }

    match tree.nearest(view, target) {
        None | Some(NodeRef::Post) => Target::Root,
        Some(NodeRef::Section(id)) => match post.section(id) {
            None if pending.removed().contains(&NodeRef::Section(id)) => Target::Ignore,
            None => Target::Root,
            Some(Section::Markup(_)) | Some(Section::ListItem(_)) => Target::Section(id),
            Some(Section::List(_)) => Target::List(id),
            Some(Section::Image(_)) => Target::Root,
            Some(Section::Card(_)) => match tree.parts(NodeRef::Section(id)) {
                RenderParts::Card { content, .. } if view.is_inclusive_ancestor(content, target) => {
                    Target::Ignore
                }
                _ => Target::CardCursor(id),
            },
        },
        Some(NodeRef::Inline(id)) => {
            if let RenderParts::Atom { holder, .. } = tree.parts(NodeRef::Inline(id)) {
                if view.is_inclusive_ancestor(holder, target) {
                    return Target::Ignore;
                }
            }
            let rendered_in = match tree.get(NodeRef::Inline(id)).and_then(|n| n.parent) {
                Some(NodeRef::Section(section)) => Some(section),
                _ => None,
            };
            match post.inline_section(id).or(rendered_in) {
                Some(section) if post.contains_section(section) => Target::Section(section),
                Some(section) if pending.removed().contains(&NodeRef::Section(section)) => Target::Ignore,
                _ => Target::Root,
            }
        }
    }
}

struct Reconciler<'a> {
    post: &'a mut Post,
    builder: &'a mut Builder,
    view: &'a ViewTree,
    tree: &'a RenderTree,
    /// Committed changes the view does not show yet
    pending: &'a ChangeLog,
    config: &'a EditorConfig,
    plugins: &'a [Box<dyn ParserPlugin>],
    outcome: ReparseOutcome,
}

fn parser<'p>(
    view: &'p ViewTree,
    config: &'p EditorConfig,
    plugins: &'p [Box<dyn ParserPlugin>],
    post: &'p Post,
    tree: &'p RenderTree,
) -> SectionParser<'p> {
    SectionParser::new(view, config)
        .with_plugins(plugins)
        .with_known(Known { post, tree })
}

impl Reconciler<'_> {
    /// Re-derive one markerable section; false when its element is gone
    fn reparse_section(&mut self, id: SectionId) -> EditorResult<bool> {
        let Some(element) = self.attached_element(NodeRef::Section(id)) else {
            return Ok(false);
        };
        if self.section_touched(id) {
            self.merge_section(id, element)?;
            return Ok(true);
        }
        let parsed = parser(self.view, self.config, self.plugins, self.post, self.tree)
            .parse_inlines(element, self.builder)?;
        self.sync_inlines(id, parsed)?;
        debug!(section = %id, "reparsed section");
        self.outcome.sections += 1;
        Ok(true)
    }

    /// Align a list's items with the `li` children of its element
    fn reparse_list(&mut self, id: SectionId) -> EditorResult<bool> {
        let Some(element) = self.attached_element(NodeRef::Section(id)) else {
            return Ok(false);
        };
        if self.list_touched(id) {
            return self.merge_list(id, element);
        }
        let items_parser = parser(self.view, self.config, self.plugins, self.post, self.tree);
        let mut lis: Vec<ViewId> = Vec::new();
        let mut parsed: Vec<Vec<Inline>> = Vec::new();
        for child in self.view.children(element) {
            if self.view.tag(*child) == Some("li") {
                lis.push(*child);
                parsed.push(items_parser.parse_inlines(*child, self.builder)?);
            }
        }

        let items = self.post.items(id);
        for (index, inlines) in parsed.iter().enumerate() {
            match items.get(index) {
                Some(item) if self.section_touched(*item) => self.merge_section(*item, lis[index])?,
                Some(item) => self.sync_inlines(*item, inlines.clone())?,
                None => {
                    self.post
                        .insert_section(Some(id), NewSection::ListItem { inlines: inlines.clone() }, None)?;
                }
            }
        }
        for extra in items.iter().skip(parsed.len()) {
            self.post.remove_section(*extra)?;
        }

        debug!(list = %id, items = parsed.len(), "reparsed list");
        self.outcome.sections += 1;
        Ok(true)
    }

    /// Text typed into a card's placeholder becomes a paragraph beside it
    fn absorb_card_cursor(&mut self, id: SectionId) -> EditorResult<bool> {
        let RenderParts::Card {
            cursor_before,
            cursor_after,
            ..
        } = self.tree.parts(NodeRef::Section(id))
        else {
            return Ok(false);
        };

        let typed = |cursor: ViewId| {
            self.view
                .text(cursor)
                .map(|t| t.replace(self.config.cursor_placeholder.as_str(), ""))
                .unwrap_or_default()
        };
        let before = typed(cursor_before);
        let after = typed(cursor_after);

        if !before.is_empty() {
            let paragraph = self.builder.paragraph(vec![self.builder.marker(before, Vec::new())]);
            let parent = self.post.parent(id);
            let inserted = self.post.insert_section(parent, paragraph, Some(id))?;
            self.outcome.range_hint = Some(Range::collapsed(Position::tail(self.post, inserted)?));
            self.outcome.sections += 1;
        }
        if !after.is_empty() {
            let paragraph = self.builder.paragraph(vec![self.builder.marker(after, Vec::new())]);
            let inserted = self.post.insert_section_after(id, paragraph)?;
            self.outcome.range_hint = Some(Range::collapsed(Position::tail(self.post, inserted)?));
            self.outcome.sections += 1;
        }

        // the placeholders must go back to their pristine text
        self.post.mark_dirty(NodeRef::Section(id));
        Ok(true)
    }

    /// Replace the post's top-level sections with what the root now shows,
    /// keeping every section that still matches at its index
    fn reparse_root(&mut self) -> EditorResult<()> {
        if !self.pending.is_empty() {
            return self.reparse_mapped_sections();
        }
        let parsed = parser(self.view, self.config, self.plugins, self.post, self.tree)
            .parse(self.view.root(), self.builder)?;
        let existing: Vec<SectionId> = self.post.sections().collect();

        let mut replaced = 0;
        for (index, section) in parsed.iter().enumerate() {
            let section = with_blank_markers(section.clone());
            match existing.get(index) {
                Some(id) => {
                    if self.post.extract_section(*id)? != section {
                        self.post.replace_section(*id, section)?;
                        replaced += 1;
                    }
                }
                None => {
                    self.post.insert_section(None, section, None)?;
                    replaced += 1;
                }
            }
        }
        for extra in existing.iter().skip(parsed.len()) {
            self.post.remove_section(*extra)?;
            replaced += 1;
        }

        info!(sections = parsed.len(), replaced, "reparsed whole root");
        // the root's child list may hold foreign nodes even when no section changed
        self.post.mark_dirty(NodeRef::Post);
        self.outcome.sections = replaced;
        self.outcome.full = true;
        Ok(())
    }

    /// Root reparse while a commit is unrendered: only sections the root
    /// still maps are re-derived, and foreign nodes go on the next render
    fn reparse_mapped_sections(&mut self) -> EditorResult<()> {
        let mapped: Vec<SectionId> = self
            .view
            .children(self.view.root())
            .iter()
            .filter_map(|child| match self.tree.node_for(*child) {
                Some(NodeRef::Section(id)) => Some(id),
                _ => None,
            })
            .collect();
        warn!(mapped = mapped.len(), "root edit during an unrendered commit, keeping the commit");

        for id in mapped {
            match self.post.section(id) {
                Some(Section::Markup(_)) => {
                    self.reparse_section(id)?;
                }
                Some(Section::List(_)) => {
                    self.reparse_list(id)?;
                }
                _ => {}
            }
        }
        self.post.mark_dirty(NodeRef::Post);
        self.outcome.full = true;
        Ok(())
    }

    /// True when an unrendered commit changed `section` or its inlines
    fn section_touched(&self, section: SectionId) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let node = NodeRef::Section(section);
        self.pending.is_dirty(node)
            || self
                .post
                .inline_ids(section)
                .iter()
                .any(|id| self.pending.is_dirty(NodeRef::Inline(*id)))
            || self
                .tree
                .children(node)
                .iter()
                .any(|child| self.pending.removed().contains(child))
    }

    /// True when an unrendered commit changed which items `list` holds
    fn list_touched(&self, list: SectionId) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let rendered: Vec<NodeRef> = self.tree.children(NodeRef::Section(list));
        let current: Vec<NodeRef> = self.post.items(list).into_iter().map(NodeRef::Section).collect();
        self.pending.is_dirty(NodeRef::Section(list)) || rendered != current
    }

    /// Items the list element still maps are merged one by one; the item
    /// structure is left as committed
    fn merge_list(&mut self, list: SectionId, element: ViewId) -> EditorResult<bool> {
        let items: Vec<(SectionId, ViewId)> = self
            .view
            .children(element)
            .iter()
            .filter_map(|li| match self.tree.node_for(*li) {
                Some(NodeRef::Section(item)) if self.post.parent(item) == Some(list) => Some((item, *li)),
                _ => None,
            })
            .collect();
        for (item, li) in items {
            if self.section_touched(item) {
                self.merge_section(item, li)?;
            } else {
                let parsed = parser(self.view, self.config, self.plugins, self.post, self.tree)
                    .parse_inlines(li, self.builder)?;
                self.sync_inlines(item, parsed)?;
            }
        }
        self.post.mark_dirty(NodeRef::Section(list));
        debug!(list = %list, "merged list with unrendered commit");
        self.outcome.sections += 1;
        Ok(true)
    }

    /// Replay the view's text edits onto a section an unrendered commit
    /// also changed. The section is redrawn either way.
    fn merge_section(&mut self, section: SectionId, element: ViewId) -> EditorResult<()> {
        let parsed = parser(self.view, self.config, self.plugins, self.post, self.tree)
            .parse_inlines(element, self.builder)?;
        let parsed = if parsed.is_empty() {
            vec![self.builder.blank_marker()]
        } else {
            parsed
        };
        let rendered = self.tree.children(NodeRef::Section(section));
        self.post.mark_dirty(NodeRef::Section(section));
        self.outcome.sections += 1;

        if parsed.len() != rendered.len() {
            warn!(section = %section, "view reshaped a section with an unrendered commit, keeping the commit");
            return Ok(());
        }

        for (node, inline) in rendered.iter().zip(&parsed) {
            let (NodeRef::Inline(id), Inline::Marker(typed)) = (*node, inline) else {
                continue;
            };
            let Some(base) = self.tree.rendered_text(*node).map(str::to_string) else {
                continue;
            };
            if base == typed.value {
                continue;
            }
            let current = match self.post.inline(id) {
                Some(Inline::Marker(marker)) => marker.value.clone(),
                _ => {
                    warn!(section = %section, "view edited a marker the commit removed, keeping the commit");
                    continue;
                }
            };
            match rebase_text(&base, &typed.value, &current) {
                Some((value, caret)) => {
                    let start = self.post.inline_offset(id).unwrap_or(0);
                    self.post.set_marker_value(id, value)?;
                    let position = Position::new(self.post, section, start + caret)?;
                    self.outcome.range_hint = Some(Range::collapsed(position));
                }
                None => {
                    warn!(section = %section, "view edit overlaps an unrendered commit, keeping the commit");
                }
            }
        }
        debug!(section = %section, "merged section with unrendered commit");
        Ok(())
    }

    /// Bring `section`'s inlines in line with `parsed`, editing marker text
    /// in place when only text changed
    fn sync_inlines(&mut self, section: SectionId, parsed: Vec<Inline>) -> EditorResult<()> {
        let parsed = if parsed.is_empty() {
            vec![self.builder.blank_marker()]
        } else {
            parsed
        };
        let existing: Vec<(quire_model::InlineId, Inline)> = self
            .post
            .inlines(section)
            .map(|(id, inline)| (id, inline.clone()))
            .collect();

        let same_shape = existing.len() == parsed.len()
            && existing.iter().zip(&parsed).all(|((_, old), new)| match (old, new) {
                (Inline::Marker(a), Inline::Marker(b)) => equal_markups(&a.markups, &b.markups),
                (Inline::Atom(_), Inline::Atom(_)) => old == new,
                _ => false,
            });

        if same_shape {
            for ((id, old), new) in existing.iter().zip(parsed) {
                if let (Inline::Marker(a), Inline::Marker(b)) = (old, new) {
                    if a.value != b.value {
                        self.post.set_marker_value(*id, b.value)?;
                    }
                }
            }
            return Ok(());
        }

        for (id, _) in &existing {
            self.post.remove_inline(*id)?;
        }
        for inline in parsed {
            let inline = self.builder.adopt_inline(inline);
            self.post.insert_inline(section, inline, None)?;
        }
        Ok(())
    }

    fn attached_element(&self, node: NodeRef) -> Option<ViewId> {
        self.tree
            .element(node)
            .filter(|el| self.view.contains(*el) && self.view.is_attached(*el))
    }
}

/// `(from, to, inserted)`: the chars of `base` in `from..to` were replaced
/// by `inserted` to give `changed`
fn splice(base: &[char], changed: &[char]) -> (usize, usize, Vec<char>) {
    let prefix = base.iter().zip(changed).take_while(|(a, b)| a == b).count();
    let room = base.len().min(changed.len()) - prefix;
    let suffix = base
        .iter()
        .rev()
        .zip(changed.iter().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();
    (prefix, base.len() - suffix, changed[prefix..changed.len() - suffix].to_vec())
}

/// Apply the edit that turned `base` into `typed` to `current`, which is
/// `base` with an edit of its own. Returns the text and the char offset
/// just past the replayed edit, or `None` when the two edits overlap.
/// Insertions at the same point land after the committed one.
fn rebase_text(base: &str, typed: &str, current: &str) -> Option<(String, usize)> {
    let base: Vec<char> = base.chars().collect();
    let typed: Vec<char> = typed.chars().collect();
    let current: Vec<char> = current.chars().collect();

    let (from, to, inserted) = splice(&base, &typed);
    let at = if base == current {
        from
    } else {
        let (c_from, c_to, c_inserted) = splice(&base, &current);
        let same_point = from == to && c_from == c_to && from == c_from;
        if to <= c_from && !same_point {
            from
        } else if from >= c_to {
            from - c_to + c_from + c_inserted.len()
        } else {
            return None;
        }
    };

    let removed = to - from;
    let mut out: Vec<char> = current[..at].to_vec();
    out.extend(&inserted);
    out.extend(&current[at + removed..]);
    Some((out.into_iter().collect(), at + inserted.len()))
}

/// Parsed markerable content with no inlines stands for one blank marker
fn with_blank_markers(section: NewSection) -> NewSection {
    let blank = || {
        vec![Inline::Marker(quire_model::Marker {
            value: String::new(),
            markups: Vec::new(),
        })]
    };
    match section {
        NewSection::Markup {
            tag,
            attributes,
            inlines,
        } if inlines.is_empty() => NewSection::Markup {
            tag,
            attributes,
            inlines: blank(),
        },
        NewSection::List {
            tag,
            attributes,
            items,
        } => NewSection::List {
            tag,
            attributes,
            items: items
                .into_iter()
                .map(|inlines| if inlines.is_empty() { blank() } else { inlines })
                .collect(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{ActionQueue, Registry};
    use crate::renderer::render;

    struct Fixture {
        post: Post,
        builder: Builder,
        view: ViewTree,
        tree: RenderTree,
        config: EditorConfig,
    }

    impl Fixture {
        fn new(sections: impl FnOnce(&mut Builder) -> Vec<NewSection>) -> Self {
            let mut builder = Builder::new();
            let post = Post::from_sections(sections(&mut builder)).unwrap();
            let mut fixture = Self {
                post,
                builder,
                view: ViewTree::new(),
                tree: RenderTree::new(),
                config: EditorConfig::default(),
            };
            fixture.render();
            fixture
        }

        fn render(&mut self) {
            let changes = self.post.take_changes();
            render(
                &self.post,
                &changes,
                &mut self.view,
                &mut self.tree,
                &Registry::with_placeholders(),
                &self.config,
                &ActionQueue::default(),
            )
            .unwrap();
        }

        fn absorb(&mut self) -> ReparseOutcome {
            self.absorb_with(&ChangeLog::default())
        }

        /// Absorb while `pending` is committed but not yet rendered
        fn absorb_with(&mut self, pending: &ChangeLog) -> ReparseOutcome {
            let mutations = self.view.take_mutations();
            reconcile(
                &mut self.post,
                &mut self.builder,
                &self.view,
                &self.tree,
                &mutations,
                pending,
                &self.config,
                &[],
            )
            .unwrap()
        }
    }

    #[test]
    fn test_typing_in_marker_updates_text_in_place() {
        let mut fx = Fixture::new(|b| vec![b.paragraph(vec![b.marker("hello", vec![])])]);
        let section = fx.post.first_section().unwrap();
        let (marker, _) = fx.post.inlines(section).next().map(|(id, i)| (id, i.clone())).unwrap();
        let text = fx.tree.element(NodeRef::Inline(marker)).unwrap();

        fx.view.set_text(text, "hello!");
        let outcome = fx.absorb();

        assert_eq!(outcome.sections, 1);
        assert!(!outcome.full);
        assert_eq!(fx.post.text(), "hello!");
        assert!(fx.post.changes().is_dirty(NodeRef::Inline(marker)));
    }

    #[test]
    fn test_rebase_text_replays_view_edit_onto_committed_text() {
        assert_eq!(rebase_text("abc", "abcx", "abcd"), Some(("abcdx".to_string(), 5)));
        assert_eq!(rebase_text("abc", "xabc", "abcd"), Some(("xabcd".to_string(), 1)));
        assert_eq!(rebase_text("abc", "abcx", "abc"), Some(("abcx".to_string(), 4)));
        assert_eq!(
            rebase_text("hello", "hllo", "hello world"),
            Some(("hllo world".to_string(), 1))
        );
        // both sides rewrote the "b"
        assert_eq!(rebase_text("abc", "ac", "aZc"), None);
    }

    #[test]
    fn test_view_edit_merges_with_unrendered_commit() {
        let mut fx = Fixture::new(|b| vec![b.paragraph(vec![b.marker("abc", vec![])])]);
        let section = fx.post.first_section().unwrap();
        let marker = fx.post.inline_ids(section)[0];
        let text = fx.tree.element(NodeRef::Inline(marker)).unwrap();

        fx.post.set_marker_value(marker, "abcd".to_string()).unwrap();
        let pending = fx.post.take_changes();
        fx.view.set_text(text, "abcx");
        let outcome = fx.absorb_with(&pending);

        assert_eq!(fx.post.text(), "abcdx");
        assert_eq!(outcome.range_hint.unwrap().head, Position { section, offset: 5 });
        assert!(fx.post.changes().is_dirty(NodeRef::Section(section)));
    }

    #[test]
    fn test_overlapping_view_edit_yields_to_unrendered_commit() {
        let mut fx = Fixture::new(|b| vec![b.paragraph(vec![b.marker("abc", vec![])])]);
        let section = fx.post.first_section().unwrap();
        let marker = fx.post.inline_ids(section)[0];
        let text = fx.tree.element(NodeRef::Inline(marker)).unwrap();

        fx.post.set_marker_value(marker, "aZc".to_string()).unwrap();
        let pending = fx.post.take_changes();
        fx.view.set_text(text, "ac");
        let outcome = fx.absorb_with(&pending);

        assert_eq!(fx.post.text(), "aZc");
        assert_eq!(outcome.range_hint, None);
        fx.render();
        assert_eq!(fx.view.to_markup(fx.view.root()), r#"<div contenteditable="true"><p>aZc</p></div>"#);
    }

    #[test]
    fn test_view_edit_in_section_removed_by_unrendered_commit_is_ignored() {
        let mut fx = Fixture::new(|b| {
            vec![
                b.paragraph(vec![b.marker("one", vec![])]),
                b.paragraph(vec![b.marker("two", vec![])]),
            ]
        });
        let second = fx.post.last_section().unwrap();
        let marker = fx.post.inline_ids(second)[0];
        let text = fx.tree.element(NodeRef::Inline(marker)).unwrap();

        fx.post.remove_section(second).unwrap();
        let pending = fx.post.take_changes();
        fx.view.set_text(text, "twox");

        assert_eq!(fx.absorb_with(&pending), ReparseOutcome::default());
        assert_eq!(fx.post.text(), "one");
    }

    #[test]
    fn test_card_content_is_ignored() {
        let mut fx = Fixture::new(|b| vec![b.card_section("embed", serde_json::json!({}))]);
        let card = fx.post.first_section().unwrap();
        let RenderParts::Card { content, .. } = fx.tree.parts(NodeRef::Section(card)) else {
            panic!("card not rendered");
        };
        let inner = fx.view.create_text("scratch");
        fx.view.append_child(content, inner);

        assert_eq!(fx.absorb(), ReparseOutcome::default());
        assert!(fx.post.changes().is_empty());
    }

    #[test]
    fn test_text_beside_card_becomes_paragraph() {
        let mut fx = Fixture::new(|b| vec![b.card_section("embed", serde_json::json!({}))]);
        let card = fx.post.first_section().unwrap();
        let RenderParts::Card { cursor_after, .. } = fx.tree.parts(NodeRef::Section(card)) else {
            panic!("card not rendered");
        };
        fx.view.set_text(cursor_after, "\u{200C}x");

        let outcome = fx.absorb();
        assert_eq!(fx.post.section_count(), 2);
        assert_eq!(fx.post.text(), "\nx");
        let hint = outcome.range_hint.unwrap();
        assert_eq!(hint.head.offset, 1);
        assert_eq!(fx.post.section_text(hint.head.section), "x");
    }

    #[test]
    fn test_unmapped_root_child_triggers_full_reparse() {
        let mut fx = Fixture::new(|b| {
            vec![
                b.paragraph(vec![b.marker("one", vec![])]),
                b.paragraph(vec![b.marker("two", vec![])]),
            ]
        });
        let first = fx.post.first_section().unwrap();
        let root = fx.view.root();
        let p = fx.view.create_element("p");
        let t = fx.view.create_text("three");
        fx.view.append_child(p, t);
        fx.view.append_child(root, p);

        let outcome = fx.absorb();
        assert!(outcome.full);
        assert_eq!(outcome.sections, 1);
        assert_eq!(fx.post.text(), "one\ntwo\nthree");
        // unchanged sections keep their identity
        assert_eq!(fx.post.first_section(), Some(first));
    }

    #[test]
    fn test_list_items_align_with_view() {
        let mut fx = Fixture::new(|b| vec![b.list_section("ul", vec![vec![b.marker("a", vec![])]]).unwrap()]);
        let list = fx.post.first_section().unwrap();
        let ul = fx.tree.element(NodeRef::Section(list)).unwrap();
        let li = fx.view.create_element("li");
        let t = fx.view.create_text("b");
        fx.view.append_child(li, t);
        fx.view.append_child(ul, li);

        fx.absorb();
        assert_eq!(fx.post.items(list).len(), 2);
        assert_eq!(fx.post.text(), "a\nb");
        fx.render();
        assert_eq!(fx.view.to_markup(fx.view.root()), r#"<div contenteditable="true"><ul><li>a</li><li>b</li></ul></div>"#);
    }
}

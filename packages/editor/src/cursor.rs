//! # Cursor mapping
//!
//! Conversion between model positions and view points.
//!
//! Going to the view is exact: a position lands in the text node of the
//! marker before it, in a blank section's element, or in the placeholder
//! text beside an atom or card.
//!
//! Coming back from the view resolves ambiguous points toward the nearest
//! content: offsets are counted over the section's rendered text, where
//! the configured cursor placeholder counts zero, a non-editable atom holder counts one
//! unit, and text typed beside an atom counts as the characters it is. A
//! point on a structural container resolves to the head of the child after
//! it, or to the tail of the last child.

use crate::render_tree::{RenderParts, RenderTree};
use crate::view::{ViewId, ViewPoint, ViewSelection, ViewTree};
use quire_model::{char_len, Inline, NodeRef, Position, Post, Range, Section, SectionId};

/// View point for a model position; `None` if it has not been rendered
pub fn to_view(post: &Post, tree: &RenderTree, view: &ViewTree, position: &Position) -> Option<ViewPoint> {
    let section = post.section(position.section)?;
    let node = NodeRef::Section(position.section);

    match section {
        Section::Markup(_) | Section::ListItem(_) => {
            if post.is_section_blank(position.section) {
                return tree.element(node).map(|el| ViewPoint::new(el, 0));
            }
            if let Some((inline, inner)) = post.inline_before(position.section, position.offset) {
                return inline_point(post, tree, view, inline, inner, true);
            }
            let (inline, inner) = post.inline_after(position.section, position.offset)?;
            inline_point(post, tree, view, inline, inner, false)
        }
        Section::Card(_) => match tree.parts(node) {
            RenderParts::Card {
                cursor_before,
                cursor_after,
                ..
            } => {
                if position.offset == 0 {
                    Some(ViewPoint::new(cursor_before, 0))
                } else {
                    let len = view.text(cursor_after).map(char_len).unwrap_or(0);
                    Some(ViewPoint::new(cursor_after, len))
                }
            }
            _ => None,
        },
        Section::Image(_) => {
            let element = tree.element(node)?;
            let parent = view.parent(element)?;
            let index = view.index_of(element)?;
            Some(ViewPoint::new(parent, index + position.offset.min(1)))
        }
        Section::List(_) => None,
    }
}

fn inline_point(
    post: &Post,
    tree: &RenderTree,
    view: &ViewTree,
    inline: quire_model::InlineId,
    inner: usize,
    after: bool,
) -> Option<ViewPoint> {
    let node = NodeRef::Inline(inline);
    match post.inline(inline)? {
        Inline::Marker(_) => tree.element(node).map(|text| ViewPoint::new(text, inner)),
        Inline::Atom(_) => match tree.parts(node) {
            RenderParts::Atom {
                cursor_before,
                cursor_after,
                ..
            } => {
                if after {
                    let len = view.text(cursor_after).map(char_len).unwrap_or(0);
                    Some(ViewPoint::new(cursor_after, len))
                } else {
                    Some(ViewPoint::new(cursor_before, 0))
                }
            }
            _ => None,
        },
    }
}

/// Model position for a view point; `None` when the point cannot be
/// mapped onto a live section or falls past its end. `placeholder` is the
/// cursor placeholder text the view was rendered with.
pub fn from_view(
    post: &Post,
    tree: &RenderTree,
    view: &ViewTree,
    point: &ViewPoint,
    placeholder: &str,
) -> Option<Position> {
    let mapped = tree.nearest(view, point.node)?;

    let section = match mapped {
        NodeRef::Post => return container_point(post, tree, view, view.root(), point, &post_children(post)),
        NodeRef::Section(id) => id,
        NodeRef::Inline(id) => post.inline_section(id)?,
    };
    if !post.contains_section(section) {
        return None;
    }

    match post.section(section)? {
        Section::Markup(_) | Section::ListItem(_) => {
            let element = tree.element(NodeRef::Section(section))?;
            let offset = offset_in(view, element, point, placeholder)?;
            Position::new(post, section, offset).ok()
        }
        Section::List(_) => {
            let element = tree.element(NodeRef::Section(section))?;
            container_point(post, tree, view, element, point, &post.items(section))
        }
        Section::Card(_) => {
            let offset = match tree.parts(NodeRef::Section(section)) {
                RenderParts::Card {
                    cursor_before,
                    cursor_after,
                    ..
                } => {
                    if view.is_inclusive_ancestor(cursor_after, point.node) {
                        1
                    } else if view.is_inclusive_ancestor(cursor_before, point.node) {
                        0
                    } else if Some(point.node) == tree.element(NodeRef::Section(section)) {
                        usize::from(point.offset > 0)
                    } else {
                        // inside the card's own content
                        0
                    }
                }
                _ => 0,
            };
            Some(Position { section, offset })
        }
        Section::Image(_) => Some(Position { section, offset: 0 }),
    }
}

fn post_children(post: &Post) -> Vec<SectionId> {
    post.sections().collect()
}

/// A point on a container element (the root or a list): the child index
/// picks the head of that child, or the tail of the last one
fn container_point(
    post: &Post,
    tree: &RenderTree,
    view: &ViewTree,
    container: ViewId,
    point: &ViewPoint,
    children: &[SectionId],
) -> Option<Position> {
    if point.node != container {
        return None;
    }
    let child = view
        .children(container)
        .get(point.offset)
        .and_then(|el| tree.node_for(*el));
    match child {
        Some(NodeRef::Section(id)) => {
            let leaf = match post.section(id)? {
                Section::List(_) => post.items(id).first().copied()?,
                _ => id,
            };
            Position::head(post, leaf).ok()
        }
        _ => {
            let last = *children.last()?;
            let leaf = match post.section(last)? {
                Section::List(_) => post.items(last).last().copied()?,
                _ => last,
            };
            Position::tail(post, leaf).ok()
        }
    }
}

/// Units before `point` inside `container`
fn offset_in(view: &ViewTree, container: ViewId, point: &ViewPoint, placeholder: &str) -> Option<usize> {
    if !view.is_inclusive_ancestor(container, point.node) {
        return None;
    }
    let mut total = 0;
    let mut node = container;
    loop {
        if node == point.node {
            if let Some(text) = view.text(node) {
                let before: String = text.chars().take(point.offset).collect();
                total += content_len(&before, placeholder);
            } else if is_holder(view, node) {
                total += 1;
            } else {
                for child in view.children(node).iter().take(point.offset) {
                    total += units_of(view, *child, placeholder);
                }
            }
            return Some(total);
        }
        if is_holder(view, node) {
            // anywhere inside an atom counts as just past it
            return Some(total + 1);
        }
        let next = view
            .children(node)
            .iter()
            .copied()
            .find(|child| view.is_inclusive_ancestor(*child, point.node))?;
        for child in view.children(node) {
            if *child == next {
                break;
            }
            total += units_of(view, *child, placeholder);
        }
        node = next;
    }
}

fn is_holder(view: &ViewTree, node: ViewId) -> bool {
    view.attribute(node, "contenteditable") == Some("false")
}

fn units_of(view: &ViewTree, node: ViewId, placeholder: &str) -> usize {
    if let Some(text) = view.text(node) {
        return content_len(text, placeholder);
    }
    if is_holder(view, node) {
        return 1;
    }
    view.children(node)
        .iter()
        .map(|c| units_of(view, *c, placeholder))
        .sum()
}

/// Chars of `text` left once every placeholder is taken out
fn content_len(text: &str, placeholder: &str) -> usize {
    if placeholder.is_empty() {
        char_len(text)
    } else {
        char_len(&text.replace(placeholder, ""))
    }
}

pub fn range_to_view(post: &Post, tree: &RenderTree, view: &ViewTree, range: &Range) -> Option<ViewSelection> {
    Some(ViewSelection {
        anchor: to_view(post, tree, view, &range.anchor())?,
        focus: to_view(post, tree, view, &range.focus())?,
    })
}

pub fn range_from_view(
    post: &Post,
    tree: &RenderTree,
    view: &ViewTree,
    selection: &ViewSelection,
    placeholder: &str,
) -> Option<Range> {
    let anchor = from_view(post, tree, view, &selection.anchor, placeholder)?;
    let focus = from_view(post, tree, view, &selection.focus, placeholder)?;
    Some(Range::from_positions(post, anchor, focus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{ActionQueue, Registry};
    use crate::config::EditorConfig;
    use crate::renderer::render;
    use quire_model::{Builder, NewSection};
    use serde_json::json;

    struct Rendered {
        post: Post,
        view: ViewTree,
        tree: RenderTree,
        config: EditorConfig,
    }

    impl Rendered {
        fn new(config: EditorConfig, sections: impl FnOnce(&mut Builder) -> Vec<NewSection>) -> Self {
            let mut builder = Builder::new();
            let mut post = Post::from_sections(sections(&mut builder)).unwrap();
            let changes = post.take_changes();
            let mut view = ViewTree::new();
            let mut tree = RenderTree::new();
            render(
                &post,
                &changes,
                &mut view,
                &mut tree,
                &Registry::with_placeholders(),
                &config,
                &ActionQueue::default(),
            )
            .unwrap();
            Self {
                post,
                view,
                tree,
                config,
            }
        }

        fn from_view(&self, node: ViewId, offset: usize) -> Option<Position> {
            from_view(
                &self.post,
                &self.tree,
                &self.view,
                &ViewPoint::new(node, offset),
                &self.config.cursor_placeholder,
            )
        }

        fn element(&self, node: NodeRef) -> ViewId {
            self.tree.element(node).unwrap()
        }

        fn leaf(&self, index: usize) -> SectionId {
            self.post.leaf_sections()[index]
        }
    }

    /// "ab" + mention atom + "cd"
    fn with_atom(config: EditorConfig) -> Rendered {
        Rendered::new(config, |b| {
            vec![b.paragraph(vec![
                b.marker("ab", vec![]),
                b.atom("mention", "@x", json!({}), vec![]),
                b.marker("cd", vec![]),
            ])]
        })
    }

    fn atom_parts(r: &Rendered) -> (ViewId, ViewId, ViewId) {
        let atom = r.post.inline_ids(r.leaf(0))[1];
        match r.tree.parts(NodeRef::Inline(atom)) {
            RenderParts::Atom {
                cursor_before,
                holder,
                cursor_after,
            } => (cursor_before, holder, cursor_after),
            other => panic!("atom rendered as {other:?}"),
        }
    }

    #[test]
    fn test_text_node_offsets_count_atom_as_one_unit() {
        let r = with_atom(EditorConfig::default());
        let section = r.leaf(0);
        let cd = r.post.inline_ids(section)[2];
        let text = r.element(NodeRef::Inline(cd));

        assert_eq!(r.from_view(text, 1), Some(Position { section, offset: 4 }));
        assert_eq!(r.from_view(text, 2), Some(Position { section, offset: 5 }));
    }

    #[test]
    fn test_custom_placeholder_counts_zero() {
        let config = EditorConfig {
            cursor_placeholder: "\u{FEFF}".to_string(),
            ..EditorConfig::default()
        };
        let r = with_atom(config);
        let section = r.leaf(0);
        let cd = r.post.inline_ids(section)[2];
        let (_, _, cursor_after) = atom_parts(&r);

        assert_eq!(
            r.from_view(r.element(NodeRef::Inline(cd)), 1),
            Some(Position { section, offset: 4 })
        );
        assert_eq!(r.from_view(cursor_after, 1), Some(Position { section, offset: 3 }));
    }

    #[test]
    fn test_points_around_an_atom() {
        let r = with_atom(EditorConfig::default());
        let section = r.leaf(0);
        let (cursor_before, holder, cursor_after) = atom_parts(&r);

        assert_eq!(r.from_view(cursor_before, 1), Some(Position { section, offset: 2 }));
        assert_eq!(r.from_view(holder, 0), Some(Position { section, offset: 3 }));
        assert_eq!(r.from_view(cursor_after, 1), Some(Position { section, offset: 3 }));
    }

    #[test]
    fn test_container_points_on_root_and_list() {
        let r = Rendered::new(EditorConfig::default(), |b| {
            vec![
                b.paragraph(vec![b.marker("abc", vec![])]),
                b.list_section("ul", vec![vec![b.marker("one", vec![])], vec![b.marker("two", vec![])]])
                    .unwrap(),
            ]
        });
        let root = r.view.root();
        let list = r.post.last_section().unwrap();
        let ul = r.element(NodeRef::Section(list));
        let (first_item, last_item) = (r.leaf(1), r.leaf(2));

        assert_eq!(r.from_view(root, 0), Some(Position { section: r.leaf(0), offset: 0 }));
        // a list child resolves into its first item
        assert_eq!(r.from_view(root, 1), Some(Position { section: first_item, offset: 0 }));
        // past the last child: tail of the last leaf
        assert_eq!(r.from_view(root, 2), Some(Position { section: last_item, offset: 3 }));
        assert_eq!(r.from_view(ul, 1), Some(Position { section: last_item, offset: 0 }));
        assert_eq!(r.from_view(ul, 2), Some(Position { section: last_item, offset: 3 }));
    }

    #[test]
    fn test_card_boundaries() {
        let r = Rendered::new(EditorConfig::default(), |b| vec![b.card_section("embed", json!({}))]);
        let card = r.leaf(0);
        let wrapper = r.element(NodeRef::Section(card));
        let RenderParts::Card {
            cursor_before,
            content,
            cursor_after,
            ..
        } = r.tree.parts(NodeRef::Section(card))
        else {
            panic!("card not rendered");
        };

        assert_eq!(r.from_view(cursor_before, 1), Some(Position { section: card, offset: 0 }));
        assert_eq!(r.from_view(cursor_after, 0), Some(Position { section: card, offset: 1 }));
        assert_eq!(r.from_view(wrapper, 0), Some(Position { section: card, offset: 0 }));
        assert_eq!(r.from_view(wrapper, 3), Some(Position { section: card, offset: 1 }));
        assert_eq!(r.from_view(content, 0), Some(Position { section: card, offset: 0 }));
    }

    #[test]
    fn test_blank_section_maps_to_its_element() {
        let r = Rendered::new(EditorConfig::default(), |b| vec![b.paragraph(Vec::new())]);
        let section = r.leaf(0);
        let p = r.element(NodeRef::Section(section));
        let head = Position { section, offset: 0 };

        assert_eq!(to_view(&r.post, &r.tree, &r.view, &head), Some(ViewPoint::new(p, 0)));
        assert_eq!(r.from_view(p, 0), Some(head));
    }

    #[test]
    fn test_every_position_round_trips_through_the_view() {
        let r = Rendered::new(EditorConfig::default(), |b| {
            let bold = b.simple_markup("b").unwrap();
            vec![
                b.paragraph(vec![
                    b.marker("ab", vec![]),
                    b.marker("cd", vec![bold.clone()]),
                    b.atom("mention", "@x", json!({}), vec![bold]),
                    b.marker("😀e", vec![]),
                ]),
                b.card_section("embed", json!({})),
                b.list_section("ol", vec![vec![b.marker("one", vec![])], Vec::new()]).unwrap(),
                b.paragraph(Vec::new()),
            ]
        });

        for section in r.post.leaf_sections() {
            let len = r.post.section_len(section).unwrap();
            for offset in 0..=len {
                let position = Position { section, offset };
                let point = to_view(&r.post, &r.tree, &r.view, &position)
                    .unwrap_or_else(|| panic!("{position:?} has no view point"));
                assert_eq!(r.from_view(point.node, point.offset), Some(position), "{point:?}");
            }
        }
    }

    #[test]
    fn test_selection_orders_anchor_and_focus() {
        let r = Rendered::new(EditorConfig::default(), |b| {
            vec![
                b.paragraph(vec![b.marker("abc", vec![])]),
                b.paragraph(vec![b.marker("def", vec![])]),
            ]
        });
        let first = r.post.inline_ids(r.leaf(0))[0];
        let second = r.post.inline_ids(r.leaf(1))[0];
        let selection = ViewSelection {
            anchor: ViewPoint::new(r.element(NodeRef::Inline(second)), 2),
            focus: ViewPoint::new(r.element(NodeRef::Inline(first)), 1),
        };

        let range = range_from_view(&r.post, &r.tree, &r.view, &selection, &r.config.cursor_placeholder).unwrap();
        assert_eq!(range.head, Position { section: r.leaf(0), offset: 1 });
        assert_eq!(range.tail, Position { section: r.leaf(1), offset: 2 });
        assert_eq!(range.focus(), range.head);

        let back = range_to_view(&r.post, &r.tree, &r.view, &range).unwrap();
        assert_eq!(back, selection);
    }
}

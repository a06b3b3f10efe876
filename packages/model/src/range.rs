//! # Range
//!
//! An ordered `(head, tail)` pair of positions. `head` never comes after
//! `tail` in document order; `direction` records which end the user is
//! moving (the focus), which matters when a selection is extended.

use crate::error::{ModelError, ModelResult};
use crate::ids::SectionId;
use crate::inline::Inline;
use crate::position::{Direction, Position};
use crate::post::Post;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub head: Position,
    pub tail: Position,
    pub direction: Option<Direction>,
}

impl Range {
    pub fn new(head: Position, tail: Position, direction: Option<Direction>) -> Self {
        Self {
            head,
            tail,
            direction,
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self::new(position, position, None)
    }

    /// Range between an anchor and a focus in either order
    pub fn from_positions(post: &Post, anchor: Position, focus: Position) -> Self {
        match post.compare(&anchor, &focus) {
            Ordering::Less => Self::new(anchor, focus, Some(Direction::Forward)),
            Ordering::Greater => Self::new(focus, anchor, Some(Direction::Backward)),
            Ordering::Equal => Self::collapsed(anchor),
        }
    }

    /// Whole content of one addressable section
    pub fn of_section(post: &Post, section: SectionId) -> ModelResult<Self> {
        Ok(Self::new(
            Position::head(post, section)?,
            Position::tail(post, section)?,
            None,
        ))
    }

    pub fn is_collapsed(&self) -> bool {
        self.head == self.tail
    }

    /// End of the range the user is moving
    pub fn focus(&self) -> Position {
        match self.direction {
            Some(Direction::Backward) => self.head,
            _ => self.tail,
        }
    }

    /// Fixed end of the range
    pub fn anchor(&self) -> Position {
        match self.direction {
            Some(Direction::Backward) => self.tail,
            _ => self.head,
        }
    }

    pub fn head_section(&self) -> SectionId {
        self.head.section
    }

    pub fn tail_section(&self) -> SectionId {
        self.tail.section
    }

    /// Both ends are valid and `head` does not come after `tail`
    pub fn validate(&self, post: &Post) -> ModelResult<()> {
        self.head.validate(post)?;
        self.tail.validate(post)?;
        if post.compare(&self.head, &self.tail) == Ordering::Greater {
            return Err(ModelError::InvertedRange {
                head: self.head,
                tail: self.tail,
            });
        }
        Ok(())
    }

    /// Move the focus by `units`, keeping the anchor
    pub fn extend(&self, post: &Post, units: isize) -> ModelResult<Self> {
        let focus = if self.is_collapsed() {
            self.head.move_by(post, units)?
        } else {
            self.focus().move_by(post, units)?
        };
        let anchor = if self.is_collapsed() {
            self.head
        } else {
            self.anchor()
        };
        Ok(Self::from_positions(post, anchor, focus))
    }

    /// The part of this range inside `section`, clamped to its bounds
    pub fn trim_to(&self, post: &Post, section: SectionId) -> ModelResult<Self> {
        let head = if self.head.section == section {
            self.head
        } else {
            Position::head(post, section)?
        };
        let tail = if self.tail.section == section {
            self.tail
        } else {
            Position::tail(post, section)?
        };
        Ok(Self::new(head, tail, self.direction))
    }

    /// Addressable sections touched by the range, in document order
    pub fn leaf_sections(&self, post: &Post) -> ModelResult<Vec<SectionId>> {
        self.validate(post)?;
        let mut out = vec![self.head.section];
        let mut cursor = self.head.section;
        while cursor != self.tail.section {
            let next = post.next_leaf(cursor).ok_or(ModelError::InvertedRange {
                head: self.head,
                tail: self.tail,
            })?;
            out.push(next);
            cursor = next;
        }
        Ok(out)
    }

    /// `(from, to)` offsets the range covers inside one of its sections
    pub fn offsets_in(&self, post: &Post, section: SectionId) -> ModelResult<(usize, usize)> {
        let from = if section == self.head.section {
            self.head.offset
        } else {
            0
        };
        let to = if section == self.tail.section {
            self.tail.offset
        } else {
            post.section_len(section)?
        };
        Ok((from, to))
    }

    /// Grow the range over neighbouring inlines for which `matches` holds,
    /// staying inside the head and tail sections
    pub fn expand_by_marker<F>(&self, post: &Post, mut matches: F) -> Self
    where
        F: FnMut(&Inline) -> bool,
    {
        let mut head = self.head;
        while let Some((id, inner)) = post.inline_before(head.section, head.offset) {
            match post.inline(id) {
                Some(inline) if matches(inline) => head.offset -= inner,
                _ => break,
            }
        }

        let mut tail = self.tail;
        while let Some((id, inner)) = post.inline_after(tail.section, tail.offset) {
            match post.inline(id) {
                Some(inline) if matches(inline) => tail.offset += inline.len() - inner,
                _ => break,
            }
        }

        Self::new(head, tail, self.direction)
    }

    pub fn contains(&self, post: &Post, position: &Position) -> bool {
        post.compare(&self.head, position) != Ordering::Greater
            && post.compare(position, &self.tail) != Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn three_paragraphs() -> (Post, Vec<SectionId>) {
        let b = Builder::new();
        let post = Post::from_sections(vec![
            b.paragraph(vec![b.marker("abc", vec![])]),
            b.paragraph(vec![b.marker("def", vec![])]),
            b.paragraph(vec![b.marker("ghi", vec![])]),
        ])
        .unwrap();
        let ids = post.sections().collect();
        (post, ids)
    }

    #[test]
    fn test_from_positions_orders_and_records_direction() {
        let (post, ids) = three_paragraphs();
        let a = Position::new(&post, ids[2], 1).unwrap();
        let b = Position::new(&post, ids[0], 2).unwrap();
        let range = Range::from_positions(&post, a, b);

        assert_eq!(range.head, b);
        assert_eq!(range.tail, a);
        assert_eq!(range.direction, Some(Direction::Backward));
        assert_eq!(range.focus(), b);
        assert_eq!(range.anchor(), a);
    }

    #[test]
    fn test_trim_to_clamps_both_ends() {
        let (post, ids) = three_paragraphs();
        let range = Range::new(
            Position::new(&post, ids[0], 1).unwrap(),
            Position::new(&post, ids[2], 2).unwrap(),
            Some(Direction::Forward),
        );

        let middle = range.trim_to(&post, ids[1]).unwrap();
        assert_eq!(middle.head, Position { section: ids[1], offset: 0 });
        assert_eq!(middle.tail, Position { section: ids[1], offset: 3 });

        let first = range.trim_to(&post, ids[0]).unwrap();
        assert_eq!(first.head.offset, 1);
        assert_eq!(first.tail.offset, 3);
    }

    #[test]
    fn test_extend_moves_focus_across_sections() {
        let (post, ids) = three_paragraphs();
        let start = Range::collapsed(Position::new(&post, ids[0], 3).unwrap());
        let extended = start.extend(&post, 2).unwrap();

        assert_eq!(extended.head, Position { section: ids[0], offset: 3 });
        assert_eq!(extended.tail, Position { section: ids[1], offset: 1 });
        assert_eq!(extended.direction, Some(Direction::Forward));

        let shrunk = extended.extend(&post, -2).unwrap();
        assert!(shrunk.is_collapsed());
    }

    #[test]
    fn test_leaf_sections_and_offsets() {
        let (post, ids) = three_paragraphs();
        let range = Range::new(
            Position::new(&post, ids[0], 1).unwrap(),
            Position::new(&post, ids[2], 2).unwrap(),
            None,
        );
        assert_eq!(range.leaf_sections(&post).unwrap(), ids);
        assert_eq!(range.offsets_in(&post, ids[0]).unwrap(), (1, 3));
        assert_eq!(range.offsets_in(&post, ids[1]).unwrap(), (0, 3));
        assert_eq!(range.offsets_in(&post, ids[2]).unwrap(), (0, 2));
        assert!(range.contains(&post, &Position { section: ids[1], offset: 0 }));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let (post, ids) = three_paragraphs();
        let range = Range::new(
            Position::new(&post, ids[2], 1).unwrap(),
            Position::new(&post, ids[0], 1).unwrap(),
            None,
        );
        assert!(matches!(range.validate(&post), Err(ModelError::InvertedRange { .. })));
        assert!(matches!(range.leaf_sections(&post), Err(ModelError::InvertedRange { .. })));
        assert!(post.slice(&range).is_err());

        let same_section = Range::new(
            Position::new(&post, ids[1], 2).unwrap(),
            Position::new(&post, ids[1], 1).unwrap(),
            None,
        );
        assert!(same_section.validate(&post).is_err());
    }

    #[test]
    fn test_expand_by_marker_covers_whole_link() {
        let mut b = Builder::new();
        let link = b.markup("a", [("href", "https://example.com")]).unwrap();
        let post = Post::from_sections(vec![b.paragraph(vec![
            b.marker("see ", vec![]),
            b.marker("the ", vec![link.clone()]),
            b.marker("docs", vec![link]),
            b.marker(" now", vec![]),
        ])])
        .unwrap();
        let s = post.first_section().unwrap();

        let caret = Range::collapsed(Position::new(&post, s, 9).unwrap());
        let expanded = caret.expand_by_marker(&post, |i| i.has_markup_tag("a"));
        assert_eq!(expanded.head.offset, 4);
        assert_eq!(expanded.tail.offset, 12);
    }

    #[test]
    fn test_slice_copies_partial_sections() {
        let (post, ids) = three_paragraphs();
        let range = Range::new(
            Position::new(&post, ids[0], 1).unwrap(),
            Position::new(&post, ids[1], 2).unwrap(),
            None,
        );
        let fragment = post.slice(&range).unwrap();
        assert_eq!(fragment.text(), "bc\nde");
        assert_eq!(post.text(), "abc\ndef\nghi");
    }
}

//! # Position
//!
//! A `(section, offset)` coordinate into the document tree. Offsets count
//! Unicode scalar values in markerable sections (an atom is one unit) and
//! run `0..=1` in cards and images. List sections are containers and cannot
//! be addressed; constructing a position on one fails.
//!
//! Movement crosses section boundaries onto the adjacent addressable
//! section, skipping list containers. Crossing a card gives three stable
//! stops: the tail of the section before it, the card itself (offset 0 when
//! approached from the left, 1 from the right) and the head of the section
//! after it.

use crate::error::{ModelError, ModelResult};
use crate::ids::SectionId;
use crate::post::Post;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub section: SectionId,
    pub offset: usize,
}

impl Position {
    /// Validated constructor
    pub fn new(post: &Post, section: SectionId, offset: usize) -> ModelResult<Self> {
        let position = Position { section, offset };
        position.validate(post)?;
        Ok(position)
    }

    pub fn head(post: &Post, section: SectionId) -> ModelResult<Self> {
        Self::new(post, section, 0)
    }

    pub fn tail(post: &Post, section: SectionId) -> ModelResult<Self> {
        let len = post.section_len(section)?;
        Ok(Position {
            section,
            offset: len,
        })
    }

    /// Head of the first addressable section, if any
    pub fn post_head(post: &Post) -> Option<Self> {
        post.first_leaf().map(|section| Position { section, offset: 0 })
    }

    /// Tail of the last addressable section, if any
    pub fn post_tail(post: &Post) -> Option<Self> {
        post.last_leaf()
            .and_then(|section| Self::tail(post, section).ok())
    }

    /// Fail unless this position names an addressable section within bounds
    pub fn validate(&self, post: &Post) -> ModelResult<()> {
        let len = post.section_len(self.section)?;
        if self.offset > len {
            return Err(ModelError::InvalidPosition {
                section: self.section,
                offset: self.offset,
                len,
            });
        }
        Ok(())
    }

    pub fn is_head(&self) -> bool {
        self.offset == 0
    }

    pub fn is_tail(&self, post: &Post) -> bool {
        post.section_len(self.section)
            .map(|len| self.offset == len)
            .unwrap_or(false)
    }

    /// One unit towards the start of the post; stays put at the very head
    pub fn move_left(&self, post: &Post) -> ModelResult<Self> {
        self.validate(post)?;
        if self.offset > 0 {
            return Ok(Position {
                section: self.section,
                offset: self.offset - 1,
            });
        }
        match post.prev_leaf(self.section) {
            Some(prev) => Self::tail(post, prev),
            None => Ok(*self),
        }
    }

    /// One unit towards the end of the post; stays put at the very tail
    pub fn move_right(&self, post: &Post) -> ModelResult<Self> {
        let len = post.section_len(self.section)?;
        self.validate(post)?;
        if self.offset < len {
            return Ok(Position {
                section: self.section,
                offset: self.offset + 1,
            });
        }
        match post.next_leaf(self.section) {
            Some(next) => Ok(Position {
                section: next,
                offset: 0,
            }),
            None => Ok(*self),
        }
    }

    pub fn move_in(&self, post: &Post, direction: Direction) -> ModelResult<Self> {
        match direction {
            Direction::Forward => self.move_right(post),
            Direction::Backward => self.move_left(post),
        }
    }

    /// Move `units` steps; negative moves left
    pub fn move_by(&self, post: &Post, units: isize) -> ModelResult<Self> {
        let direction = if units < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let mut position = *self;
        for _ in 0..units.unsigned_abs() {
            position = position.move_in(post, direction)?;
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::section::SectionKind;
    use serde_json::json;

    fn card_post() -> Post {
        let b = Builder::new();
        Post::from_sections(vec![
            b.paragraph(vec![b.marker("ab", vec![])]),
            b.card_section("embed", json!({"url": "x"})),
            b.paragraph(vec![b.marker("cd", vec![])]),
        ])
        .unwrap()
    }

    #[test]
    fn test_move_over_supplementary_char_is_symmetric() {
        let b = Builder::new();
        let post = Post::from_sections(vec![b.paragraph(vec![b.marker("x😀y", vec![])])]).unwrap();
        let s = post.first_section().unwrap();
        let p = Position::new(&post, s, 1).unwrap();

        let right = p.move_right(&post).unwrap();
        assert_eq!(right.offset, 2);
        assert_eq!(right.move_left(&post).unwrap(), p);
    }

    #[test]
    fn test_crossing_a_card_has_three_stops() {
        let post = card_post();
        let ids: Vec<_> = post.sections().collect();
        let start = Position::tail(&post, ids[0]).unwrap();

        let on_card = start.move_right(&post).unwrap();
        assert_eq!(on_card, Position { section: ids[1], offset: 0 });
        let past_card = on_card.move_right(&post).unwrap();
        assert_eq!(past_card, Position { section: ids[1], offset: 1 });
        let after = past_card.move_right(&post).unwrap();
        assert_eq!(after, Position { section: ids[2], offset: 0 });

        // approaching from the right lands on the card's tail first
        let back = after.move_left(&post).unwrap();
        assert_eq!(back, Position { section: ids[1], offset: 1 });
    }

    #[test]
    fn test_movement_skips_list_containers() {
        let b = Builder::new();
        let post = Post::from_sections(vec![
            b.paragraph(vec![b.marker("a", vec![])]),
            b.list_section("ul", vec![vec![b.marker("1", vec![])]]).unwrap(),
        ])
        .unwrap();
        let first = post.first_section().unwrap();
        let list = post.last_section().unwrap();
        let item = post.items(list)[0];

        let p = Position::tail(&post, first).unwrap().move_right(&post).unwrap();
        assert_eq!(p, Position { section: item, offset: 0 });
    }

    #[test]
    fn test_position_on_list_section_fails_fast() {
        let b = Builder::new();
        let post = Post::from_sections(vec![b
            .list_section("ul", vec![vec![b.marker("1", vec![])]])
            .unwrap()])
        .unwrap();
        let list = post.first_section().unwrap();

        let err = Position::new(&post, list, 0).unwrap_err();
        assert_eq!(err, ModelError::NotAddressable { section: list, kind: SectionKind::List });
    }

    #[test]
    fn test_out_of_bounds_offset_is_not_clamped() {
        let post = card_post();
        let card = post.sections().nth(1).unwrap();
        assert!(Position::new(&post, card, 1).is_ok());
        assert!(matches!(
            Position::new(&post, card, 2),
            Err(ModelError::InvalidPosition { offset: 2, len: 1, .. })
        ));
    }

    #[test]
    fn test_movement_stops_at_post_edges() {
        let post = card_post();
        let head = Position::post_head(&post).unwrap();
        let tail = Position::post_tail(&post).unwrap();
        assert_eq!(head.move_left(&post).unwrap(), head);
        assert_eq!(tail.move_right(&post).unwrap(), tail);
        assert_eq!(head.move_by(&post, 4).unwrap().section, post.sections().nth(1).unwrap());
    }
}

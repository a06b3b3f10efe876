//! Node identities.
//!
//! Every section and inline inside a [`Post`](crate::Post) is addressed by a
//! small copyable id handed out by the post's own [`IdGenerator`]. Ids are
//! never reused within a post, so a stale id is detected rather than aliased.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a section (markup, list, list item, card or image)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(u64);

/// Identity of an inline node (marker or atom)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InlineId(u64);

impl SectionId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl InlineId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for InlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Any node of the document tree, used as a key by view-side tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Post,
    Section(SectionId),
    Inline(InlineId),
}

impl From<SectionId> for NodeRef {
    fn from(id: SectionId) -> Self {
        NodeRef::Section(id)
    }
}

impl From<InlineId> for NodeRef {
    fn from(id: InlineId) -> Self {
        NodeRef::Inline(id)
    }
}

/// Sequential id generator, one per post
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    count: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_section(&mut self) -> SectionId {
        self.count += 1;
        SectionId(self.count)
    }

    pub fn next_inline(&mut self) -> InlineId {
        self.count += 1;
        InlineId(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut ids = IdGenerator::new();
        let a = ids.next_section();
        let b = ids.next_inline();
        let c = ids.next_section();

        assert_ne!(a.raw(), b.raw());
        assert_ne!(b.raw(), c.raw());
        assert_eq!(a.to_string(), "s1");
        assert_eq!(b.to_string(), "i2");
    }

    #[test]
    fn test_cloned_generator_continues_sequence() {
        let mut ids = IdGenerator::new();
        ids.next_section();
        let mut copy = ids.clone();
        assert_eq!(ids.next_section(), copy.next_section());
    }
}

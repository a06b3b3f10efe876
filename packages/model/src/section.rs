//! # Sections
//!
//! Block-level nodes of a post. The kinds form a closed set:
//!
//! | kind | content | addressable |
//! |------|---------|-------------|
//! | `Markup` | inlines (markers, atoms) | yes, 0..=len |
//! | `List` | list items | no |
//! | `ListItem` | inlines | yes, 0..=len |
//! | `Card` | opaque name + payload | yes, 0..=1 |
//! | `Image` | opaque src | yes, 0..=1 |
//!
//! Sections stored in a [`Post`](crate::Post) refer to their children by id.
//! [`NewSection`] is the detached, id-less form the builder produces and the
//! post adopts.

use crate::error::{ModelError, ModelResult};
use crate::ids::{InlineId, SectionId};
use crate::inline::Inline;
use crate::linked_list::LinkedList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Block tags a markup section may use
pub const MARKUP_SECTION_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "aside",
    "pull-quote",
];

/// Tags a list section may use
pub const LIST_SECTION_TAGS: &[&str] = &["ul", "ol"];

pub const DEFAULT_MARKUP_SECTION_TAG: &str = "p";

pub fn normalize_tag(kind: &'static str, tag: &str, allowed: &[&str]) -> ModelResult<String> {
    let tag = tag.to_ascii_lowercase();
    if allowed.contains(&tag.as_str()) {
        Ok(tag)
    } else {
        Err(ModelError::invalid_tag(kind, tag))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    Markup,
    List,
    ListItem,
    Card,
    Image,
}

#[derive(Debug, Clone)]
pub struct MarkupSection {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub(crate) inlines: LinkedList<InlineId>,
}

#[derive(Debug, Clone)]
pub struct ListSection {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub(crate) items: LinkedList<SectionId>,
}

#[derive(Debug, Clone)]
pub struct ListItem {
    pub(crate) list: SectionId,
    pub(crate) inlines: LinkedList<InlineId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardSection {
    pub name: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSection {
    pub src: String,
}

#[derive(Debug, Clone)]
pub enum Section {
    Markup(MarkupSection),
    List(ListSection),
    ListItem(ListItem),
    Card(CardSection),
    Image(ImageSection),
}

impl Section {
    pub fn kind(&self) -> SectionKind {
        match self {
            Section::Markup(_) => SectionKind::Markup,
            Section::List(_) => SectionKind::List,
            Section::ListItem(_) => SectionKind::ListItem,
            Section::Card(_) => SectionKind::Card,
            Section::Image(_) => SectionKind::Image,
        }
    }

    /// Sections whose content is a run of markers and atoms
    pub fn is_markerable(&self) -> bool {
        matches!(self, Section::Markup(_) | Section::ListItem(_))
    }

    /// Sections a position may point into
    pub fn is_addressable(&self) -> bool {
        !matches!(self, Section::List(_))
    }

    /// Cards and images: addressable but with no inner content
    pub fn is_opaque(&self) -> bool {
        matches!(self, Section::Card(_) | Section::Image(_))
    }

    pub fn tag(&self) -> &str {
        match self {
            Section::Markup(s) => &s.tag,
            Section::List(s) => &s.tag,
            Section::ListItem(_) => "li",
            Section::Card(_) => "card",
            Section::Image(_) => "img",
        }
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Section::Markup(s) => Some(&s.attributes),
            Section::List(s) => Some(&s.attributes),
            _ => None,
        }
    }

    pub(crate) fn inline_list(&self) -> Option<&LinkedList<InlineId>> {
        match self {
            Section::Markup(s) => Some(&s.inlines),
            Section::ListItem(s) => Some(&s.inlines),
            _ => None,
        }
    }

    pub(crate) fn inline_list_mut(&mut self) -> Option<&mut LinkedList<InlineId>> {
        match self {
            Section::Markup(s) => Some(&mut s.inlines),
            Section::ListItem(s) => Some(&mut s.inlines),
            _ => None,
        }
    }

    pub(crate) fn item_list(&self) -> Option<&LinkedList<SectionId>> {
        match self {
            Section::List(s) => Some(&s.items),
            _ => None,
        }
    }

    pub(crate) fn item_list_mut(&mut self) -> Option<&mut LinkedList<SectionId>> {
        match self {
            Section::List(s) => Some(&mut s.items),
            _ => None,
        }
    }
}

/// Detached section content, not yet adopted by a post
#[derive(Debug, Clone, PartialEq)]
pub enum NewSection {
    Markup {
        tag: String,
        attributes: BTreeMap<String, String>,
        inlines: Vec<Inline>,
    },
    List {
        tag: String,
        attributes: BTreeMap<String, String>,
        items: Vec<Vec<Inline>>,
    },
    ListItem {
        inlines: Vec<Inline>,
    },
    Card {
        name: String,
        payload: serde_json::Value,
    },
    Image {
        src: String,
    },
}

impl NewSection {
    pub fn kind(&self) -> SectionKind {
        match self {
            NewSection::Markup { .. } => SectionKind::Markup,
            NewSection::List { .. } => SectionKind::List,
            NewSection::ListItem { .. } => SectionKind::ListItem,
            NewSection::Card { .. } => SectionKind::Card,
            NewSection::Image { .. } => SectionKind::Image,
        }
    }

    pub fn is_markerable(&self) -> bool {
        matches!(self, NewSection::Markup { .. } | NewSection::ListItem { .. })
    }

    pub fn inlines(&self) -> Option<&[Inline]> {
        match self {
            NewSection::Markup { inlines, .. } | NewSection::ListItem { inlines } => Some(inlines),
            _ => None,
        }
    }

    pub fn into_inlines(self) -> Option<Vec<Inline>> {
        match self {
            NewSection::Markup { inlines, .. } | NewSection::ListItem { inlines } => Some(inlines),
            _ => None,
        }
    }
}

//! Inline content of markerable sections: text markers and atoms.

use crate::markup::{contains_markup, equal_markups, same_markups, MarkupRef};
use std::rc::Rc;

/// Number of offset units in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the `offset`-th char, clamped to the end of `text`
pub fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Split `text` at a char offset
pub fn split_chars(text: &str, offset: usize) -> (&str, &str) {
    text.split_at(byte_index(text, offset))
}

/// A run of text sharing one set of markups
#[derive(Debug, Clone)]
pub struct Marker {
    pub value: String,
    pub markups: Vec<MarkupRef>,
}

/// A single-unit inline widget rendered by a pluggable renderer
#[derive(Debug, Clone)]
pub struct Atom {
    pub name: String,
    pub value: String,
    pub payload: serde_json::Value,
    pub markups: Vec<MarkupRef>,
}

#[derive(Debug, Clone)]
pub enum Inline {
    Marker(Marker),
    Atom(Atom),
}

impl Inline {
    /// Offset units this inline contributes to its section
    pub fn len(&self) -> usize {
        match self {
            Inline::Marker(m) => char_len(&m.value),
            Inline::Atom(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Inline::Atom(_))
    }

    pub fn is_blank_marker(&self) -> bool {
        matches!(self, Inline::Marker(m) if m.value.is_empty())
    }

    /// Text as it reads in plain-text output
    pub fn text(&self) -> &str {
        match self {
            Inline::Marker(m) => &m.value,
            Inline::Atom(a) => &a.value,
        }
    }

    pub fn markups(&self) -> &[MarkupRef] {
        match self {
            Inline::Marker(m) => &m.markups,
            Inline::Atom(a) => &a.markups,
        }
    }

    pub fn markups_mut(&mut self) -> &mut Vec<MarkupRef> {
        match self {
            Inline::Marker(m) => &mut m.markups,
            Inline::Atom(a) => &mut a.markups,
        }
    }

    pub fn has_markup(&self, markup: &MarkupRef) -> bool {
        contains_markup(self.markups(), markup)
    }

    pub fn has_markup_tag(&self, tag: &str) -> bool {
        self.markups().iter().any(|m| m.has_tag(tag))
    }

    pub fn add_markup(&mut self, markup: MarkupRef) {
        if !self.has_markup(&markup) {
            self.markups_mut().push(markup);
        }
    }

    pub fn remove_markup(&mut self, markup: &MarkupRef) {
        self.markups_mut().retain(|m| !Rc::ptr_eq(m, markup));
    }

    /// True when `self` and `other` may be merged into a single marker
    pub fn can_join(&self, other: &Inline) -> bool {
        match (self, other) {
            (Inline::Marker(a), Inline::Marker(b)) => same_markups(&a.markups, &b.markups),
            _ => false,
        }
    }

    /// Split a marker at a char offset into two markers with the same markups
    pub fn split(&self, offset: usize) -> Option<(Inline, Inline)> {
        let Inline::Marker(m) = self else {
            return None;
        };
        let (left, right) = split_chars(&m.value, offset);
        Some((
            Inline::Marker(Marker {
                value: left.to_string(),
                markups: m.markups.clone(),
            }),
            Inline::Marker(Marker {
                value: right.to_string(),
                markups: m.markups.clone(),
            }),
        ))
    }
}

/// Structural equality: text, atom fields and markup sets compared by value
impl PartialEq for Inline {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Inline::Marker(a), Inline::Marker(b)) => {
                a.value == b.value && equal_markups(&a.markups, &b.markups)
            }
            (Inline::Atom(a), Inline::Atom(b)) => {
                a.name == b.name
                    && a.value == b.value
                    && a.payload == b.payload
                    && equal_markups(&a.markups, &b.markups)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::MarkupCache;

    fn marker(value: &str, markups: Vec<MarkupRef>) -> Inline {
        Inline::Marker(Marker {
            value: value.to_string(),
            markups,
        })
    }

    #[test]
    fn test_supplementary_char_is_one_unit() {
        let m = marker("a😀b", vec![]);
        assert_eq!(m.len(), 3);
        let (left, right) = m.split(2).unwrap();
        assert_eq!(left.text(), "a😀");
        assert_eq!(right.text(), "b");
    }

    #[test]
    fn test_atoms_never_join() {
        let atom = Inline::Atom(Atom {
            name: "mention".into(),
            value: "@bob".into(),
            payload: serde_json::Value::Null,
            markups: vec![],
        });
        assert_eq!(atom.len(), 1);
        assert!(!atom.can_join(&atom.clone()));
        assert!(atom.split(0).is_none());
    }

    #[test]
    fn test_join_requires_identical_markups() {
        let mut cache = MarkupCache::new();
        let b = cache.intern("b", Vec::<(String, String)>::new()).unwrap();
        let plain = marker("a", vec![]);
        let bold = marker("b", vec![b.clone()]);

        assert!(plain.can_join(&marker("c", vec![])));
        assert!(!plain.can_join(&bold));
        assert!(bold.can_join(&marker("d", vec![b])));
    }

    #[test]
    fn test_add_markup_is_idempotent() {
        let mut cache = MarkupCache::new();
        let b = cache.intern("b", Vec::<(String, String)>::new()).unwrap();
        let mut m = marker("x", vec![]);
        m.add_markup(b.clone());
        m.add_markup(b.clone());
        assert_eq!(m.markups().len(), 1);
        m.remove_markup(&b);
        assert!(m.markups().is_empty());
    }
}

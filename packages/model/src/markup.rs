//! # Markups
//!
//! A markup is an immutable `(tag, attributes)` value applied to inline
//! content (bold, italic, links). Markups are interned per editor through a
//! [`MarkupCache`], so two markers carry "the same" markup exactly when they
//! hold the same `Rc`.

use crate::error::{ModelError, ModelResult};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Inline tags a markup may use
pub const MARKUP_TAGS: &[&str] = &["a", "b", "code", "em", "i", "s", "strong", "sub", "sup", "u"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Markup {
    tag: String,
    attributes: BTreeMap<String, String>,
}

/// Shared handle to an interned markup
pub type MarkupRef = Rc<Markup>;

impl Markup {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }
}

/// Content-keyed intern table for markups
#[derive(Debug, Default)]
pub struct MarkupCache {
    entries: HashMap<Markup, MarkupRef>,
}

impl MarkupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the interned markup for `tag` + `attributes`, creating it once
    pub fn intern<I, K, V>(&mut self, tag: &str, attributes: I) -> ModelResult<MarkupRef>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tag = tag.to_ascii_lowercase();
        if !MARKUP_TAGS.contains(&tag.as_str()) {
            return Err(ModelError::invalid_tag("markup", tag));
        }

        let key = Markup {
            tag,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };

        if let Some(existing) = self.entries.get(&key) {
            return Ok(existing.clone());
        }

        let markup = Rc::new(key.clone());
        self.entries.insert(key, markup.clone());
        Ok(markup)
    }

    /// Re-home a markup from another cache into this one
    pub fn adopt(&mut self, markup: &Markup) -> MarkupRef {
        if let Some(existing) = self.entries.get(markup) {
            return existing.clone();
        }
        let interned = Rc::new(markup.clone());
        self.entries.insert(markup.clone(), interned.clone());
        interned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Set equality over markup lists, by interned identity
pub fn same_markups(a: &[MarkupRef], b: &[MarkupRef]) -> bool {
    a.len() == b.len() && a.iter().all(|m| contains_markup(b, m))
}

/// Set equality over markup lists, by value
pub fn equal_markups(a: &[MarkupRef], b: &[MarkupRef]) -> bool {
    a.len() == b.len() && a.iter().all(|m| b.iter().any(|o| **o == **m))
}

pub fn contains_markup(list: &[MarkupRef], markup: &MarkupRef) -> bool {
    list.iter().any(|m| Rc::ptr_eq(m, markup))
}

/// Open/close bookkeeping for one inline in a nested markup rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Nesting {
    /// Markups opened just before this inline, outermost first
    pub opened: Vec<MarkupRef>,
    /// Number of markups closed just after this inline
    pub closed: usize,
}

/// Lay out a run of markup sets as properly nested open/close events.
///
/// Markups stay open across neighbours that share them; an inner markup that
/// a neighbour lacks forces everything opened after it to close as well.
/// Markups open in the order each inline lists them, which is the order they
/// were applied.
pub fn nest_markups(runs: &[&[MarkupRef]]) -> Vec<Nesting> {
    let mut out: Vec<Nesting> = Vec::with_capacity(runs.len());
    let mut stack: Vec<MarkupRef> = Vec::new();

    for markups in runs {
        let keep = stack
            .iter()
            .take_while(|open| markups.iter().any(|m| **m == ***open))
            .count();
        if let Some(prev) = out.last_mut() {
            prev.closed = stack.len() - keep;
        }
        stack.truncate(keep);

        let opened: Vec<MarkupRef> = markups
            .iter()
            .filter(|m| !stack.iter().any(|open| **open == ***m))
            .cloned()
            .collect();
        stack.extend(opened.iter().cloned());
        out.push(Nesting { opened, closed: 0 });
    }

    if let Some(last) = out.last_mut() {
        last.closed = stack.len();
    }
    out
}

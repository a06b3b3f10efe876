//! # Builder
//!
//! Factory for every node type. Markups go through the builder's
//! [`MarkupCache`], so everything one builder creates shares interned markup
//! instances. Sections come out detached ([`NewSection`]) and are adopted by
//! a [`Post`] on insertion.

use crate::error::ModelResult;
use crate::inline::{Atom, Inline, Marker};
use crate::markup::{Markup, MarkupCache, MarkupRef};
use crate::post::Post;
use crate::section::{
    normalize_tag, NewSection, DEFAULT_MARKUP_SECTION_TAG, LIST_SECTION_TAGS, MARKUP_SECTION_TAGS,
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Builder {
    markups: MarkupCache,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markup_cache(&self) -> &MarkupCache {
        &self.markups
    }

    /// Interned markup for `tag` and `attributes`
    pub fn markup<I, K, V>(&mut self, tag: &str, attributes: I) -> ModelResult<MarkupRef>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.markups.intern(tag, attributes)
    }

    /// Attribute-less markup, e.g. `b` or `em`
    pub fn simple_markup(&mut self, tag: &str) -> ModelResult<MarkupRef> {
        self.markups.intern(tag, Vec::<(String, String)>::new())
    }

    /// Bring a markup created elsewhere into this builder's cache
    pub fn adopt_markup(&mut self, markup: &Markup) -> MarkupRef {
        self.markups.adopt(markup)
    }

    /// Re-intern every markup in an inline against this builder's cache
    pub fn adopt_inline(&mut self, mut inline: Inline) -> Inline {
        let adopted: Vec<MarkupRef> = inline
            .markups()
            .iter()
            .map(|m| self.markups.adopt(m))
            .collect();
        *inline.markups_mut() = adopted;
        inline
    }

    pub fn marker(&self, value: impl Into<String>, markups: Vec<MarkupRef>) -> Inline {
        Inline::Marker(Marker {
            value: value.into(),
            markups,
        })
    }

    pub fn blank_marker(&self) -> Inline {
        self.marker(String::new(), Vec::new())
    }

    pub fn atom(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
        payload: serde_json::Value,
        markups: Vec<MarkupRef>,
    ) -> Inline {
        Inline::Atom(Atom {
            name: name.into(),
            value: value.into(),
            payload,
            markups,
        })
    }

    pub fn markup_section(&self, tag: &str, inlines: Vec<Inline>) -> ModelResult<NewSection> {
        Ok(NewSection::Markup {
            tag: normalize_tag("markup section", tag, MARKUP_SECTION_TAGS)?,
            attributes: BTreeMap::new(),
            inlines,
        })
    }

    pub fn paragraph(&self, inlines: Vec<Inline>) -> NewSection {
        NewSection::Markup {
            tag: DEFAULT_MARKUP_SECTION_TAG.to_string(),
            attributes: BTreeMap::new(),
            inlines,
        }
    }

    pub fn list_section(&self, tag: &str, items: Vec<Vec<Inline>>) -> ModelResult<NewSection> {
        Ok(NewSection::List {
            tag: normalize_tag("list section", tag, LIST_SECTION_TAGS)?,
            attributes: BTreeMap::new(),
            items,
        })
    }

    pub fn list_item(&self, inlines: Vec<Inline>) -> NewSection {
        NewSection::ListItem { inlines }
    }

    pub fn card_section(&self, name: impl Into<String>, payload: serde_json::Value) -> NewSection {
        NewSection::Card {
            name: name.into(),
            payload,
        }
    }

    pub fn image_section(&self, src: impl Into<String>) -> NewSection {
        NewSection::Image { src: src.into() }
    }

    pub fn post(&self, sections: Vec<NewSection>) -> ModelResult<Post> {
        Post::from_sections(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::rc::Rc;

    #[test]
    fn test_builder_interns_markups() {
        let mut b = Builder::new();
        let one = b.simple_markup("strong").unwrap();
        let two = b.simple_markup("strong").unwrap();
        assert!(Rc::ptr_eq(&one, &two));
        assert_eq!(b.markup_cache().len(), 1);
    }

    #[test]
    fn test_section_tags_are_validated() {
        let b = Builder::new();
        assert!(b.markup_section("H2", vec![]).is_ok());
        assert!(matches!(
            b.markup_section("table", vec![]),
            Err(ModelError::InvalidTag { kind: "markup section", .. })
        ));
        assert!(b.list_section("dl", vec![]).is_err());
    }

    #[test]
    fn test_adopt_inline_rehomes_markups() {
        let mut source = Builder::new();
        let mut target = Builder::new();
        let em = source.simple_markup("em").unwrap();
        let inline = source.marker("x", vec![em.clone()]);

        let adopted = target.adopt_inline(inline);
        let target_em = target.simple_markup("em").unwrap();
        assert!(!Rc::ptr_eq(&adopted.markups()[0], &em));
        assert!(Rc::ptr_eq(&adopted.markups()[0], &target_em));
    }

    #[test]
    fn test_post_from_builder() {
        let b = Builder::new();
        let post = b
            .post(vec![
                b.paragraph(vec![b.marker("hello", vec![])]),
                b.image_section("/a.png"),
            ])
            .unwrap();
        assert_eq!(post.section_count(), 2);
        assert_eq!(post.text(), "hello\n");
    }
}

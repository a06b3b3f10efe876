//! # Section Parser
//!
//! Reads view subtrees back into detached sections. Used when a foreign
//! edit cannot be mapped to a known node (whole-root reparse) and for
//! importing view fragments.
//!
//! Parsing drives a [`ParseContext`] through the callback contract
//! `add_section` / `add_markerable` / `node_finished`. A [`ParserPlugin`]
//! sees every element first and may claim it, overriding the default
//! element-to-section mapping:
//!
//! | view | section |
//! |------|---------|
//! | `p`, `h1`..`h6`, `blockquote`, `aside`, `pull-quote` | markup section |
//! | `ul` / `ol` with `li` children | list section |
//! | `img` | image section |
//! | card wrapper (rendered or `data-card`) | card section |
//! | loose text and inline elements | markers of an implicit `p` |
//!
//! Cursor placeholder characters are stripped everywhere.

use crate::config::EditorConfig;
use crate::errors::EditorResult;
use crate::render_tree::{RenderParts, RenderTree};
use crate::view::{ViewId, ViewKind, ViewTree};
use quire_model::section::{LIST_SECTION_TAGS, MARKUP_SECTION_TAGS};
use quire_model::{Builder, Inline, MarkupRef, NewSection, NodeRef, Post, Section};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attributes that belong to the editing surface, not to the document
const SURFACE_ATTRIBUTES: &[&str] = &["class", "style", "contenteditable", "data-placeholder"];

/// Receives sections as the parser walks a view tree
pub struct ParseContext<'b> {
    builder: &'b mut Builder,
    sections: Vec<NewSection>,
    current: Option<NewSection>,
}

impl<'b> ParseContext<'b> {
    pub fn new(builder: &'b mut Builder) -> Self {
        Self {
            builder,
            sections: Vec::new(),
            current: None,
        }
    }

    pub fn builder(&mut self) -> &mut Builder {
        self.builder
    }

    /// Emit a complete section, closing any implicit paragraph first
    pub fn add_section(&mut self, section: NewSection) {
        self.node_finished();
        self.sections.push(section);
    }

    /// Append an inline to the open markerable section, opening a
    /// paragraph when none is open
    pub fn add_markerable(&mut self, inline: Inline) {
        let current = self
            .current
            .get_or_insert_with(|| NewSection::Markup {
                tag: "p".to_string(),
                attributes: BTreeMap::new(),
                inlines: Vec::new(),
            });
        if let NewSection::Markup { inlines, .. } | NewSection::ListItem { inlines } = current {
            inlines.push(inline);
        }
    }

    /// Close the open markerable section
    pub fn node_finished(&mut self) {
        if let Some(section) = self.current.take() {
            self.sections.push(section);
        }
    }

    pub fn finish(mut self) -> Vec<NewSection> {
        self.node_finished();
        self.sections
    }
}

/// Override for the default element-to-section mapping
pub trait ParserPlugin {
    /// Return true when `node` was handled and must not be parsed further
    fn parse(&self, view: &ViewTree, node: ViewId, ctx: &mut ParseContext<'_>) -> bool;
}

/// What the editor already knows about rendered nodes
#[derive(Clone, Copy)]
pub struct Known<'a> {
    pub post: &'a Post,
    pub tree: &'a RenderTree,
}

pub struct SectionParser<'a> {
    view: &'a ViewTree,
    plugins: &'a [Box<dyn ParserPlugin>],
    config: &'a EditorConfig,
    known: Option<Known<'a>>,
}

impl<'a> SectionParser<'a> {
    pub fn new(view: &'a ViewTree, config: &'a EditorConfig) -> Self {
        Self {
            view,
            plugins: &[],
            config,
            known: None,
        }
    }

    pub fn with_plugins(mut self, plugins: &'a [Box<dyn ParserPlugin>]) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_known(mut self, known: Known<'a>) -> Self {
        self.known = Some(known);
        self
    }

    /// Sections for every child of `container`
    pub fn parse(&self, container: ViewId, builder: &mut Builder) -> EditorResult<Vec<NewSection>> {
        let mut ctx = ParseContext::new(builder);
        for child in self.view.children(container) {
            self.parse_node(*child, &mut ctx)?;
        }
        Ok(ctx.finish())
    }

    fn parse_node(&self, node: ViewId, ctx: &mut ParseContext<'_>) -> EditorResult<()> {
        if self.plugins.iter().any(|p| p.parse(self.view, node, ctx)) {
            return Ok(());
        }

        let Some(kind) = self.view.kind(node) else {
            return Ok(());
        };
        let tag = match kind {
            ViewKind::Text(text) => {
                let text = self.strip(text);
                if !text.is_empty() {
                    ctx.add_markerable(ctx.builder.marker(text, Vec::new()));
                }
                return Ok(());
            }
            ViewKind::Element { tag, .. } => tag.to_ascii_lowercase(),
        };

        if self.parse_card(node, ctx)? {
            return Ok(());
        }

        match tag.as_str() {
            t if MARKUP_SECTION_TAGS.contains(&t) => {
                let inlines = self.parse_inlines(node, ctx.builder)?;
                let mut section = ctx.builder.markup_section(t, inlines)?;
                if let NewSection::Markup { attributes, .. } = &mut section {
                    *attributes = self.document_attributes(node);
                }
                ctx.add_section(section);
            }
            t if LIST_SECTION_TAGS.contains(&t) => {
                let mut items = Vec::new();
                for child in self.view.children(node) {
                    let inlines = self.parse_inlines(*child, ctx.builder)?;
                    if !inlines.is_empty() || self.view.tag(*child) == Some("li") {
                        items.push(inlines);
                    }
                }
                let mut section = ctx.builder.list_section(t, items)?;
                if let NewSection::List { attributes, .. } = &mut section {
                    *attributes = self.document_attributes(node);
                }
                ctx.add_section(section);
            }
            "li" => {
                let inlines = self.parse_inlines(node, ctx.builder)?;
                let section = ctx.builder.list_section("ul", vec![inlines])?;
                ctx.add_section(section);
            }
            "img" => {
                let src = self.view.attribute(node, "src").unwrap_or_default();
                ctx.add_section(ctx.builder.image_section(src));
            }
            "br" => ctx.node_finished(),
            t if t == "span" || self.config.is_markup_tag(t) || self.is_atom(node) => {
                for inline in self.parse_inlines_of(node, ctx.builder)? {
                    ctx.add_markerable(inline);
                }
            }
            _ => {
                ctx.node_finished();
                for child in self.view.children(node) {
                    self.parse_node(*child, ctx)?;
                }
                ctx.node_finished();
            }
        }
        Ok(())
    }

    /// Card wrappers: rendered ones keep their section content and turn text
    /// typed beside them into paragraphs; foreign ones need `data-card`
    fn parse_card(&self, node: ViewId, ctx: &mut ParseContext<'_>) -> EditorResult<bool> {
        if let Some(Known { post, tree }) = self.known {
            if let Some(NodeRef::Section(id)) = tree.node_for(node) {
                if let (Some(Section::Card(_)), RenderParts::Card {
                    cursor_before,
                    cursor_after,
                    ..
                }) = (post.section(id), tree.parts(NodeRef::Section(id)))
                {
                    self.typed_paragraph(cursor_before, ctx);
                    ctx.add_section(post.extract_section(id)?);
                    self.typed_paragraph(cursor_after, ctx);
                    return Ok(true);
                }
            }
        }

        let Some(name) = self.view.attribute(node, "data-card") else {
            return Ok(false);
        };
        let payload = self
            .view
            .attribute(node, "data-payload")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);
        ctx.add_section(ctx.builder.card_section(name, payload));
        Ok(true)
    }

    fn typed_paragraph(&self, cursor: ViewId, ctx: &mut ParseContext<'_>) {
        let typed = self.view.text(cursor).map(|t| self.strip(t)).unwrap_or_default();
        if !typed.is_empty() {
            let section = ctx.builder.paragraph(vec![ctx.builder.marker(typed, Vec::new())]);
            ctx.add_section(section);
        }
    }

    /// Inline content of the children of `element`
    pub fn parse_inlines(&self, element: ViewId, builder: &mut Builder) -> EditorResult<Vec<Inline>> {
        let mut out = Vec::new();
        let mut markups = Vec::new();
        for child in self.view.children(element) {
            self.collect_inlines(*child, builder, &mut markups, &mut out)?;
        }
        Ok(out)
    }

    /// Inline content of `node` itself, including any markup it carries
    fn parse_inlines_of(&self, node: ViewId, builder: &mut Builder) -> EditorResult<Vec<Inline>> {
        let mut out = Vec::new();
        self.collect_inlines(node, builder, &mut Vec::new(), &mut out)?;
        Ok(out)
    }

    fn collect_inlines(
        &self,
        node: ViewId,
        builder: &mut Builder,
        markups: &mut Vec<MarkupRef>,
        out: &mut Vec<Inline>,
    ) -> EditorResult<()> {
        let tag = match self.view.kind(node) {
            Some(ViewKind::Text(text)) => {
                let text = self.strip(text);
                if !text.is_empty() {
                    out.push(builder.marker(text, markups.clone()));
                }
                return Ok(());
            }
            Some(ViewKind::Element { tag, .. }) => tag.to_ascii_lowercase(),
            None => return Ok(()),
        };

        if self.is_atom(node) {
            return self.collect_atom(node, builder, markups, out);
        }
        if tag == "br" {
            return Ok(());
        }

        let markup = if self.config.is_markup_tag(&tag) {
            builder.markup(&tag, self.document_attributes(node)).ok()
        } else {
            None
        };
        if let Some(m) = &markup {
            markups.push(m.clone());
        }
        for child in self.view.children(node) {
            self.collect_inlines(*child, builder, markups, out)?;
        }
        if markup.is_some() {
            markups.pop();
        }
        Ok(())
    }

    fn collect_atom(
        &self,
        node: ViewId,
        builder: &mut Builder,
        markups: &[MarkupRef],
        out: &mut Vec<Inline>,
    ) -> EditorResult<()> {
        let known = self.known.and_then(|Known { post, tree }| match tree.node_for(node) {
            Some(NodeRef::Inline(id)) => match (post.inline(id), tree.parts(NodeRef::Inline(id))) {
                (Some(inline @ Inline::Atom(_)), RenderParts::Atom {
                    cursor_before,
                    cursor_after,
                    ..
                }) => Some((inline.clone(), cursor_before, cursor_after)),
                _ => None,
            },
            _ => None,
        });

        match known {
            Some((mut atom, cursor_before, cursor_after)) => {
                let typed = |cursor: ViewId| {
                    self.view
                        .text(cursor)
                        .map(|t| self.strip(t))
                        .unwrap_or_default()
                };
                let before = typed(cursor_before);
                let after = typed(cursor_after);
                if !before.is_empty() {
                    out.push(builder.marker(before, markups.to_vec()));
                }
                *atom.markups_mut() = markups.to_vec();
                out.push(atom);
                if !after.is_empty() {
                    out.push(builder.marker(after, markups.to_vec()));
                }
            }
            None => {
                let name = self.view.attribute(node, "data-atom").unwrap_or_default();
                let payload = self
                    .view
                    .attribute(node, "data-payload")
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(Value::Null);
                let value = self.strip(&self.view.text_content(node));
                out.push(builder.atom(name, value, payload, markups.to_vec()));
            }
        }
        Ok(())
    }

    fn is_atom(&self, node: ViewId) -> bool {
        self.view.attribute(node, "data-atom").is_some()
    }

    fn document_attributes(&self, node: ViewId) -> BTreeMap<String, String> {
        self.view
            .attributes(node)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|(k, _)| !SURFACE_ATTRIBUTES.contains(&k.as_str()) && !k.starts_with("data-"))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn strip(&self, text: &str) -> String {
        text.replace(self.config.cursor_placeholder.as_str(), "")
    }
}

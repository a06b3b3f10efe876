//! `0.3.x` documents: markups, atoms and cards each live in their own table.

use super::{
    flatten_attributes, nesting_for, parse_markup_table, str_at, tuple_of, unflatten_attributes,
    usize_at, value_at, MarkupStack, MarkupTable, WireError, WireResult, WireVersion,
    ATOM_MARKER_TYPE, CARD_SECTION_TYPE, IMAGE_SECTION_TYPE, LIST_SECTION_TYPE, MARKER_TYPE,
    MARKUP_SECTION_TYPE,
};
use crate::builder::Builder;
use crate::error::ModelError;
use crate::inline::Inline;
use crate::markup::MarkupRef;
use crate::post::Post;
use crate::section::NewSection;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

struct Tables {
    markups: MarkupTable,
    atoms: Vec<Value>,
    cards: Vec<Value>,
}

fn dedup(table: &mut Vec<Value>, entry: Value) -> usize {
    if let Some(i) = table.iter().position(|e| *e == entry) {
        return i;
    }
    table.push(entry);
    table.len() - 1
}

pub(super) fn render(post: &Post, version: WireVersion) -> WireResult<Value> {
    let mut tables = Tables {
        markups: MarkupTable::default(),
        atoms: Vec::new(),
        cards: Vec::new(),
    };

    let mut sections = Vec::with_capacity(post.section_count());
    for section in post.to_sections() {
        let rendered = match section {
            NewSection::Markup {
                tag,
                attributes,
                inlines,
            } => {
                let mut tuple = vec![
                    json!(MARKUP_SECTION_TYPE),
                    json!(tag),
                    render_markers(&inlines, &mut tables),
                ];
                push_attributes(&mut tuple, &attributes, version);
                Value::Array(tuple)
            }
            NewSection::List {
                tag,
                attributes,
                items,
            } => {
                let items: Vec<Value> = items
                    .iter()
                    .map(|item| render_markers(item, &mut tables))
                    .collect();
                let mut tuple = vec![json!(LIST_SECTION_TYPE), json!(tag), Value::Array(items)];
                push_attributes(&mut tuple, &attributes, version);
                Value::Array(tuple)
            }
            NewSection::Card { name, payload } => {
                let index = dedup(&mut tables.cards, json!([name, payload]));
                json!([CARD_SECTION_TYPE, index])
            }
            NewSection::Image { src } => json!([IMAGE_SECTION_TYPE, src]),
            NewSection::ListItem { .. } => {
                return Err(ModelError::invalid_structure("list item outside of a list").into())
            }
        };
        sections.push(rendered);
    }

    Ok(json!({
        "version": version.as_str(),
        "atoms": tables.atoms,
        "cards": tables.cards,
        "markups": tables.markups.to_value(),
        "sections": sections,
    }))
}

fn push_attributes(tuple: &mut Vec<Value>, attributes: &BTreeMap<String, String>, version: WireVersion) {
    if attributes.is_empty() {
        return;
    }
    if version.supports_section_attributes() {
        tuple.push(flatten_attributes(attributes));
    } else {
        debug!(%version, count = attributes.len(), "dropping section attributes");
    }
}

fn render_markers(inlines: &[Inline], tables: &mut Tables) -> Value {
    let nesting = nesting_for(inlines);
    Value::Array(
        inlines
            .iter()
            .zip(nesting)
            .map(|(inline, nest)| {
                let opened: Vec<usize> = nest
                    .opened
                    .iter()
                    .map(|m| tables.markups.index_of(m))
                    .collect();
                match inline {
                    Inline::Marker(m) => json!([MARKER_TYPE, opened, nest.closed, m.value]),
                    Inline::Atom(a) => {
                        let index = dedup(&mut tables.atoms, json!([a.name, a.value, a.payload]));
                        json!([ATOM_MARKER_TYPE, opened, nest.closed, index])
                    }
                }
            })
            .collect(),
    )
}

fn table<'a>(doc: &'a Value, key: &str) -> WireResult<&'a [Value]> {
    match doc.get(key) {
        None => Ok(&[]),
        Some(value) => value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| WireError::MalformedDocument(format!("\"{key}\" must be an array"))),
    }
}

pub(super) fn parse(doc: &Value, version: WireVersion, builder: &mut Builder) -> WireResult<Post> {
    let markups = match doc.get("markups") {
        Some(t) => parse_markup_table(t, builder)?,
        None => Vec::new(),
    };
    let atoms = table(doc, "atoms")?;
    let cards = table(doc, "cards")?;
    let sections = doc
        .get("sections")
        .and_then(Value::as_array)
        .ok_or_else(|| WireError::MalformedDocument("\"sections\" must be an array".into()))?;

    let mut parser = SectionReader {
        version,
        markups: &markups,
        atoms,
        cards,
        builder,
    };
    let parsed = sections
        .iter()
        .enumerate()
        .map(|(index, section)| parser.section(index, section))
        .collect::<WireResult<Vec<_>>>()?;

    Ok(Post::from_sections(parsed)?)
}

struct SectionReader<'a> {
    version: WireVersion,
    markups: &'a [MarkupRef],
    atoms: &'a [Value],
    cards: &'a [Value],
    builder: &'a mut Builder,
}

impl SectionReader<'_> {
    fn section(&mut self, index: usize, value: &Value) -> WireResult<NewSection> {
        let malformed = move |reason: String| WireError::MalformedSection { index, reason };
        let tuple = tuple_of(value).map_err(malformed)?;
        let kind = usize_at(tuple, 0, "section type").map_err(malformed)? as u64;

        match kind {
            MARKUP_SECTION_TYPE => {
                let tag = str_at(tuple, 1, "tag").map_err(malformed)?;
                let inlines = self.markers(index, value_at(tuple, 2, "markers").map_err(malformed)?)?;
                let section = self.builder.markup_section(tag, inlines)?;
                self.attributes(section, tuple.get(3)).map_err(malformed)
            }
            LIST_SECTION_TYPE => {
                let tag = str_at(tuple, 1, "tag").map_err(malformed)?;
                let items = tuple_of(value_at(tuple, 2, "list items").map_err(malformed)?)
                    .map_err(malformed)?
                    .iter()
                    .map(|item| self.markers(index, item))
                    .collect::<WireResult<Vec<_>>>()?;
                let section = self.builder.list_section(tag, items)?;
                self.attributes(section, tuple.get(3)).map_err(malformed)
            }
            IMAGE_SECTION_TYPE => {
                let src = str_at(tuple, 1, "image src").map_err(malformed)?;
                Ok(self.builder.image_section(src))
            }
            CARD_SECTION_TYPE => {
                let card_index = usize_at(tuple, 1, "card index").map_err(malformed)?;
                let card = self
                    .cards
                    .get(card_index)
                    .ok_or(WireError::UnknownCard(card_index))?;
                let card = tuple_of(card).map_err(malformed)?;
                let name = str_at(card, 0, "card name").map_err(malformed)?;
                let payload = card.get(1).cloned().unwrap_or(Value::Null);
                Ok(self.builder.card_section(name, payload))
            }
            other => Err(malformed(format!("unknown section type {other}"))),
        }
    }

    fn attributes(&self, mut section: NewSection, value: Option<&Value>) -> Result<NewSection, String> {
        let Some(value) = value else {
            return Ok(section);
        };
        if !self.version.supports_section_attributes() {
            return Err(format!("section attributes require 0.3.2, document is {}", self.version));
        }
        let parsed = unflatten_attributes(value)?;
        if let NewSection::Markup { attributes, .. } | NewSection::List { attributes, .. } = &mut section {
            *attributes = parsed;
        }
        Ok(section)
    }

    fn markers(&mut self, section: usize, value: &Value) -> WireResult<Vec<Inline>> {
        let markers = value.as_array().ok_or_else(|| WireError::MalformedSection {
            index: section,
            reason: "markers must be an array".into(),
        })?;

        let mut stack = MarkupStack::default();
        let mut inlines = Vec::with_capacity(markers.len());
        for (marker, value) in markers.iter().enumerate() {
            let bad = move |reason: String| WireError::MalformedMarker {
                section,
                marker,
                reason,
            };
            let tuple = tuple_of(value).map_err(bad)?;
            let kind = usize_at(tuple, 0, "marker type").map_err(bad)? as u64;
            let active = stack.open(self.markups, value_at(tuple, 1, "opened markups").map_err(bad)?)?;
            let closed = usize_at(tuple, 2, "closed count").map_err(bad)?;

            let inline = match kind {
                MARKER_TYPE => {
                    let text = str_at(tuple, 3, "marker value").map_err(bad)?;
                    self.builder.marker(text, active)
                }
                ATOM_MARKER_TYPE => {
                    let atom_index = usize_at(tuple, 3, "atom index").map_err(bad)?;
                    let atom = self
                        .atoms
                        .get(atom_index)
                        .ok_or(WireError::UnknownAtom(atom_index))?;
                    let atom = tuple_of(atom).map_err(bad)?;
                    let name = str_at(atom, 0, "atom name").map_err(bad)?;
                    let text = str_at(atom, 1, "atom value").map_err(bad)?;
                    let payload = atom.get(2).cloned().unwrap_or(Value::Null);
                    self.builder.atom(name, text, payload, active)
                }
                other => return Err(bad(format!("unknown marker type {other}"))),
            };

            stack.close(closed).map_err(bad)?;
            inlines.push(inline);
        }
        Ok(inlines)
    }
}

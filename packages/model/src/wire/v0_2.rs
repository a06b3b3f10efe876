//! `0.2.0` documents: `sections` is a `[markupTable, sections]` pair and
//! cards are stored inline. Markers are `[openedMarkupIndexes, closedCount, value]`.

use super::{
    nesting_for, parse_markup_table, str_at, tuple_of, usize_at, value_at, MarkupStack,
    MarkupTable, WireError, WireResult, WireVersion, CARD_SECTION_TYPE, IMAGE_SECTION_TYPE,
    LIST_SECTION_TYPE, MARKUP_SECTION_TYPE,
};
use crate::builder::Builder;
use crate::error::ModelError;
use crate::inline::Inline;
use crate::markup::MarkupRef;
use crate::post::Post;
use crate::section::NewSection;
use serde_json::{json, Value};
use tracing::debug;

pub(super) fn render(post: &Post) -> WireResult<Value> {
    let mut markups = MarkupTable::default();
    let mut sections = Vec::with_capacity(post.section_count());

    for section in post.to_sections() {
        let rendered = match section {
            NewSection::Markup {
                tag,
                attributes,
                inlines,
            } => {
                if !attributes.is_empty() {
                    debug!(count = attributes.len(), "dropping section attributes for 0.2.0");
                }
                json!([MARKUP_SECTION_TYPE, tag, render_markers(&inlines, &mut markups)?])
            }
            NewSection::List { tag, items, .. } => {
                let items = items
                    .iter()
                    .map(|item| render_markers(item, &mut markups))
                    .collect::<WireResult<Vec<_>>>()?;
                json!([LIST_SECTION_TYPE, tag, items])
            }
            NewSection::Card { name, payload } => json!([CARD_SECTION_TYPE, name, payload]),
            NewSection::Image { src } => json!([IMAGE_SECTION_TYPE, src]),
            NewSection::ListItem { .. } => {
                return Err(ModelError::invalid_structure("list item outside of a list").into())
            }
        };
        sections.push(rendered);
    }

    Ok(json!({
        "version": WireVersion::V0_2_0.as_str(),
        "sections": [markups.to_value(), sections],
    }))
}

fn render_markers(inlines: &[Inline], markups: &mut MarkupTable) -> WireResult<Value> {
    let nesting = nesting_for(inlines);
    inlines
        .iter()
        .zip(nesting)
        .map(|(inline, nest)| match inline {
            Inline::Marker(m) => {
                let opened: Vec<usize> = nest.opened.iter().map(|mk| markups.index_of(mk)).collect();
                Ok(json!([opened, nest.closed, m.value]))
            }
            Inline::Atom(_) => Err(WireError::Unrepresentable {
                version: WireVersion::V0_2_0,
                feature: "atoms",
            }),
        })
        .collect::<WireResult<Vec<_>>>()
        .map(Value::Array)
}

pub(super) fn parse(doc: &Value, builder: &mut Builder) -> WireResult<Post> {
    let pair = doc
        .get("sections")
        .and_then(Value::as_array)
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| {
            WireError::MalformedDocument("\"sections\" must be [markupTable, sections]".into())
        })?;

    let markups = parse_markup_table(&pair[0], builder)?;
    let sections = pair[1]
        .as_array()
        .ok_or_else(|| WireError::MalformedDocument("section list must be an array".into()))?;

    let parsed = sections
        .iter()
        .enumerate()
        .map(|(index, section)| parse_section(index, section, &markups, builder))
        .collect::<WireResult<Vec<_>>>()?;

    Ok(Post::from_sections(parsed)?)
}

fn parse_section(
    index: usize,
    value: &Value,
    markups: &[MarkupRef],
    builder: &mut Builder,
) -> WireResult<NewSection> {
    let malformed = move |reason: String| WireError::MalformedSection { index, reason };
    let tuple = tuple_of(value).map_err(malformed)?;
    let kind = usize_at(tuple, 0, "section type").map_err(malformed)? as u64;

    match kind {
        MARKUP_SECTION_TYPE => {
            let tag = str_at(tuple, 1, "tag").map_err(malformed)?;
            let inlines = parse_markers(
                index,
                value_at(tuple, 2, "markers").map_err(malformed)?,
                markups,
                builder,
            )?;
            Ok(builder.markup_section(tag, inlines)?)
        }
        LIST_SECTION_TYPE => {
            let tag = str_at(tuple, 1, "tag").map_err(malformed)?;
            let items = tuple_of(value_at(tuple, 2, "list items").map_err(malformed)?)
                .map_err(malformed)?
                .iter()
                .map(|item| parse_markers(index, item, markups, builder))
                .collect::<WireResult<Vec<_>>>()?;
            Ok(builder.list_section(tag, items)?)
        }
        IMAGE_SECTION_TYPE => {
            let src = str_at(tuple, 1, "image src").map_err(malformed)?;
            Ok(builder.image_section(src))
        }
        CARD_SECTION_TYPE => {
            let name = str_at(tuple, 1, "card name").map_err(malformed)?;
            let payload = tuple.get(2).cloned().unwrap_or(Value::Null);
            Ok(builder.card_section(name, payload))
        }
        other => Err(malformed(format!("unknown section type {other}"))),
    }
}

fn parse_markers(
    section: usize,
    value: &Value,
    markups: &[MarkupRef],
    builder: &Builder,
) -> WireResult<Vec<Inline>> {
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
        let active = stack.open(markups, value_at(tuple, 0, "opened markups").map_err(bad)?)?;
        let closed = usize_at(tuple, 1, "closed count").map_err(bad)?;
        let text = str_at(tuple, 2, "marker value").map_err(bad)?;
        inlines.push(builder.marker(text, active));
        stack.close(closed).map_err(bad)?;
    }
    Ok(inlines)
}

//! # Wire format
//!
//! Versioned JSON documents for persisting a [`Post`].
//!
//! ## Versions
//!
//! - `0.2.0`: `{"version", "sections": [markupTable, sections]}`. Cards sit
//!   inline as `[10, name, payload]`; atoms cannot be represented.
//! - `0.3.0` / `0.3.1`: separate `markups`, `atoms` and `cards` tables.
//!   Markers are `[kind, openedMarkupIndexes, closedCount, value]` where
//!   `kind` is `0` for text and `1` for an atom (value = atom index).
//! - `0.3.2`: markup and list sections may carry a trailing flat
//!   attribute list `[name, value, ...]`.
//!
//! Markups are nested: each marker lists the markups it opens and how many
//! open markups close after it. Parsing re-interns every markup through the
//! caller's [`Builder`], so a round trip yields identical shared instances.

mod v0_2;
mod v0_3;

use crate::builder::Builder;
use crate::error::ModelError;
use crate::inline::Inline;
use crate::markup::{nest_markups, MarkupRef, Nesting};
use crate::post::Post;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MARKUP_SECTION_TYPE: u64 = 1;
pub const IMAGE_SECTION_TYPE: u64 = 2;
pub const LIST_SECTION_TYPE: u64 = 3;
pub const CARD_SECTION_TYPE: u64 = 10;

pub const MARKER_TYPE: u64 = 0;
pub const ATOM_MARKER_TYPE: u64 = 1;

pub type WireResult<T> = Result<T, WireError>;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Malformed section at index {index}: {reason}")]
    MalformedSection { index: usize, reason: String },

    #[error("Malformed marker {marker} in section {section}: {reason}")]
    MalformedMarker {
        section: usize,
        marker: usize,
        reason: String,
    },

    #[error("Unknown markup index: {0}")]
    UnknownMarkup(usize),

    #[error("Unknown atom index: {0}")]
    UnknownAtom(usize),

    #[error("Unknown card index: {0}")]
    UnknownCard(usize),

    #[error("Version {version} cannot represent {feature}")]
    Unrepresentable {
        version: WireVersion,
        feature: &'static str,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireVersion {
    #[serde(rename = "0.2.0")]
    V0_2_0,
    #[serde(rename = "0.3.0")]
    V0_3_0,
    #[serde(rename = "0.3.1")]
    V0_3_1,
    #[serde(rename = "0.3.2")]
    V0_3_2,
}

impl WireVersion {
    pub const ALL: [WireVersion; 4] = [
        WireVersion::V0_2_0,
        WireVersion::V0_3_0,
        WireVersion::V0_3_1,
        WireVersion::V0_3_2,
    ];

    pub fn latest() -> Self {
        WireVersion::V0_3_2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireVersion::V0_2_0 => "0.2.0",
            WireVersion::V0_3_0 => "0.3.0",
            WireVersion::V0_3_1 => "0.3.1",
            WireVersion::V0_3_2 => "0.3.2",
        }
    }

    pub fn supports_atoms(self) -> bool {
        self != WireVersion::V0_2_0
    }

    pub fn supports_section_attributes(self) -> bool {
        self == WireVersion::V0_3_2
    }
}

impl Default for WireVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for WireVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireVersion {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WireVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| WireError::UnsupportedVersion(s.to_string()))
    }
}

/// Render `post` as a wire document of the given version
pub fn render(post: &Post, version: WireVersion) -> WireResult<Value> {
    match version {
        WireVersion::V0_2_0 => v0_2::render(post),
        v => v0_3::render(post, v),
    }
}

/// Parse a wire document, interning markups through `builder`
pub fn parse(doc: &Value, builder: &mut Builder) -> WireResult<Post> {
    let version = doc
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::MalformedDocument("missing \"version\"".into()))?;

    match version.parse::<WireVersion>()? {
        WireVersion::V0_2_0 => v0_2::parse(doc, builder),
        v => v0_3::parse(doc, v, builder),
    }
}

pub fn to_string(post: &Post, version: WireVersion) -> WireResult<String> {
    Ok(serde_json::to_string_pretty(&render(post, version)?)?)
}

pub fn from_str(source: &str, builder: &mut Builder) -> WireResult<Post> {
    let doc: Value = serde_json::from_str(source)?;
    parse(&doc, builder)
}

/// Version string of a document without parsing the rest of it
pub fn sniff_version(doc: &Value) -> WireResult<WireVersion> {
    doc.get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::MalformedDocument("missing \"version\"".into()))?
        .parse()
}

// ---------------------------------------------------------------------------
// Shared encoding helpers
// ---------------------------------------------------------------------------

/// Deduplicated markup table, keyed by value
#[derive(Default)]
pub(crate) struct MarkupTable {
    entries: Vec<MarkupRef>,
}

impl MarkupTable {
    pub(crate) fn index_of(&mut self, markup: &MarkupRef) -> usize {
        if let Some(i) = self.entries.iter().position(|m| **m == **markup) {
            return i;
        }
        self.entries.push(markup.clone());
        self.entries.len() - 1
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|m| {
                    if m.attributes().is_empty() {
                        serde_json::json!([m.tag()])
                    } else {
                        serde_json::json!([m.tag(), flatten_attributes(m.attributes())])
                    }
                })
                .collect(),
        )
    }
}

/// Per-inline open/close layout for a section's inlines
pub(crate) fn nesting_for(inlines: &[Inline]) -> Vec<Nesting> {
    let runs: Vec<&[MarkupRef]> = inlines.iter().map(Inline::markups).collect();
    nest_markups(&runs)
}

pub(crate) fn flatten_attributes(attributes: &BTreeMap<String, String>) -> Value {
    Value::Array(
        attributes
            .iter()
            .flat_map(|(k, v)| [Value::String(k.clone()), Value::String(v.clone())])
            .collect(),
    )
}

pub(crate) fn unflatten_attributes(value: &Value) -> Result<BTreeMap<String, String>, String> {
    let flat = value
        .as_array()
        .ok_or_else(|| "attributes must be an array".to_string())?;
    if flat.len() % 2 != 0 {
        return Err("attributes must be name/value pairs".into());
    }
    flat.chunks(2)
        .map(|pair| match (pair[0].as_str(), pair[1].as_str()) {
            (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
            _ => Err("attribute names and values must be strings".to_string()),
        })
        .collect()
}

/// Parse a `[[tag, attrs?], ...]` markup table into interned markups
pub(crate) fn parse_markup_table(table: &Value, builder: &mut Builder) -> WireResult<Vec<MarkupRef>> {
    let entries = table
        .as_array()
        .ok_or_else(|| WireError::MalformedDocument("markup table must be an array".into()))?;

    entries
        .iter()
        .map(|entry| {
            let tuple = entry
                .as_array()
                .ok_or_else(|| WireError::MalformedDocument("markup entry must be an array".into()))?;
            let tag = tuple
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| WireError::MalformedDocument("markup entry is missing its tag".into()))?;
            let attributes = match tuple.get(1) {
                Some(attrs) => unflatten_attributes(attrs).map_err(WireError::MalformedDocument)?,
                None => BTreeMap::new(),
            };
            Ok(builder.markup(tag, attributes)?)
        })
        .collect()
}

/// Rebuilds marker markups from the open/close encoding
#[derive(Default)]
pub(crate) struct MarkupStack {
    open: Vec<MarkupRef>,
}

impl MarkupStack {
    /// Open the indexed markups and return the set active for this marker
    pub(crate) fn open(&mut self, table: &[MarkupRef], indexes: &Value) -> WireResult<Vec<MarkupRef>> {
        let indexes = indexes
            .as_array()
            .ok_or_else(|| WireError::MalformedDocument("opened markups must be an array".into()))?;
        for index in indexes {
            let index = index
                .as_u64()
                .ok_or_else(|| WireError::MalformedDocument("markup index must be an integer".into()))?
                as usize;
            let markup = table.get(index).ok_or(WireError::UnknownMarkup(index))?;
            self.open.push(markup.clone());
        }
        Ok(self.open.clone())
    }

    pub(crate) fn close(&mut self, count: usize) -> Result<(), String> {
        if count > self.open.len() {
            return Err(format!(
                "closes {count} markups but only {} are open",
                self.open.len()
            ));
        }
        self.open.truncate(self.open.len() - count);
        Ok(())
    }
}

pub(crate) fn tuple_of<'a>(value: &'a Value) -> Result<&'a [Value], String> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| "expected an array".to_string())
}

pub(crate) fn str_at<'a>(tuple: &'a [Value], i: usize, what: &str) -> Result<&'a str, String> {
    tuple
        .get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{what} must be a string"))
}

pub(crate) fn usize_at(tuple: &[Value], i: usize, what: &str) -> Result<usize, String> {
    tuple
        .get(i)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| format!("{what} must be a non-negative integer"))
}

pub(crate) fn value_at<'a>(tuple: &'a [Value], i: usize, what: &str) -> Result<&'a Value, String> {
    tuple.get(i).ok_or_else(|| format!("missing {what}"))
}

use crate::ids::{InlineId, SectionId};
use crate::position::Position;
use crate::section::SectionKind;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Offset {offset} is out of bounds for section {section} (length {len})")]
    InvalidPosition {
        section: SectionId,
        offset: usize,
        len: usize,
    },

    #[error("Range head {head:?} comes after its tail {tail:?}")]
    InvertedRange { head: Position, tail: Position },

    #[error("Section {section} ({kind:?}) is not addressable by a position")]
    NotAddressable { section: SectionId, kind: SectionKind },

    #[error("Section not found: {0}")]
    UnknownSection(SectionId),

    #[error("Inline not found: {0}")]
    UnknownInline(InlineId),

    #[error("Invalid {kind} tag: {tag}")]
    InvalidTag { kind: &'static str, tag: String },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
}

impl ModelError {
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure(message.into())
    }

    pub fn invalid_tag(kind: &'static str, tag: impl Into<String>) -> Self {
        Self::InvalidTag {
            kind,
            tag: tag.into(),
        }
    }
}

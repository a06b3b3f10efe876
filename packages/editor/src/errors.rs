//! Error types for the editor

use quire_model::{ModelError, SectionId, WireError};
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No selection to edit")]
    NoSelection,

    #[error("Card section not found: {0}")]
    CardNotFound(SectionId),
}

/// Failures while building the view for a card or atom
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("No card renderer registered for \"{name}\"")]
    UnknownCard { name: String },

    #[error("No atom renderer registered for \"{name}\"")]
    UnknownAtom { name: String },

    #[error("Card \"{name}\" broke its render contract: {reason}")]
    CardContract { name: String, reason: String },

    #[error("Atom \"{name}\" broke its render contract: {reason}")]
    AtomContract { name: String, reason: String },
}

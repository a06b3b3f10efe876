//! # Quire Editor
//!
//! Keeps a live, platform-editable view in sync with a quire post.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: Post, Position, Range, wire format   │
//! └─────────────────────────────────────────────┘
//!          ↑ transactions          ↓ change log
//! ┌─────────────────────────────────────────────┐
//! │ editor: one instance per surface            │
//! │  - PostEditor transactions, atomic commit   │
//! │  - Renderer: dirty subtrees → view          │
//! │  - Reconciler: foreign view edits → post    │
//! │  - Cursor: Position ⇄ view point            │
//! │  - History: snapshots, undo/redo            │
//! └─────────────────────────────────────────────┘
//!          ↓ render                ↑ mutations
//! ┌─────────────────────────────────────────────┐
//! │ view: element/text tree the platform edits  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **The post is the source of truth** except between a platform edit
//!    and its absorption, when the view is
//! 2. **One gateway**: every programmatic edit is a transaction
//! 3. **Minimal renders**: only nodes in the change log are touched
//! 4. **Opaque widgets**: card and atom content belongs to their renderers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quire_editor::{Editor, EditorConfig};
//!
//! let mut editor = Editor::from_json(source, EditorConfig::default())?;
//! editor.render()?;
//!
//! editor.run(|tx| {
//!     let head = quire_model::Position::post_head(tx.post()).unwrap();
//!     let end = tx.insert_text(head, "Hello ")?;
//!     tx.set_position(end);
//!     Ok(())
//! })?;
//! editor.tick()?;
//!
//! let doc = editor.serialize(None)?;
//! ```

mod cards;
mod config;
mod cursor;
mod editor;
mod errors;
mod history;
mod post_editor;
mod reconciler;
mod render_tree;
mod renderer;
mod section_parser;
mod view;

pub use cards::{
    AtomArgs, AtomEnv, AtomRenderer, CardAction, CardActionKind, CardArgs, CardEnv, CardHooks, CardMode,
    CardRenderer, PlaceholderAtom, PlaceholderCard, Registry, Teardown,
};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME, DEFAULT_CURSOR_PLACEHOLDER};
pub use cursor::{from_view, range_from_view, range_to_view, to_view};
pub use editor::{Editor, Task, TaskQueue};
pub use errors::{EditorError, EditorResult, RenderError};
pub use history::{History, Snapshot};
pub use post_editor::{BlankPolicy, PostEditor};
pub use reconciler::ReparseOutcome;
pub use render_tree::{RenderNode, RenderParts, RenderTree};
pub use renderer::{RenderStats, ATOM_CLASS, CARD_CLASS};
pub use section_parser::{Known, ParseContext, ParserPlugin, SectionParser};
pub use view::{ViewId, ViewKind, ViewMutation, ViewPoint, ViewSelection, ViewTree};

// Re-export the model for convenience
pub use quire_model;

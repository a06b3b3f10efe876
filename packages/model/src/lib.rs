//! # Quire Model
//!
//! The document tree of a rich-text post and everything needed to address
//! and persist it.
//!
//! ## Layout
//!
//! ```text
//! Post
//!  ├─ MarkupSection (p, h1..h6, blockquote, ...)
//!  │   └─ Marker | Atom        inline content, markups interned by Builder
//!  ├─ ListSection (ul, ol)
//!  │   └─ ListItem
//!  │       └─ Marker | Atom
//!  ├─ CardSection              opaque, payload only
//!  └─ ImageSection             opaque, src only
//! ```
//!
//! Nodes are stored in an id-keyed arena owned by the [`Post`]; sibling
//! order is kept in [`LinkedList`]s of ids. Every structural primitive on
//! `Post` records what it touched in a [`ChangeLog`] so that a renderer can
//! redraw only dirty nodes.
//!
//! ## Usage
//!
//! ```rust
//! use quire_model::{wire, Builder, Position, WireVersion};
//!
//! let mut b = Builder::new();
//! let bold = b.simple_markup("b").unwrap();
//! let post = b
//!     .post(vec![b.paragraph(vec![b.marker("hi ", vec![]), b.marker("there", vec![bold])])])
//!     .unwrap();
//!
//! let section = post.first_section().unwrap();
//! let pos = Position::new(&post, section, 3).unwrap();
//! assert_eq!(post.markups_at(&pos).len(), 0);
//!
//! let doc = wire::render(&post, WireVersion::latest()).unwrap();
//! let back = wire::parse(&doc, &mut b).unwrap();
//! assert!(back.same_content(&post));
//! ```

pub mod builder;
pub mod error;
pub mod ids;
pub mod inline;
pub mod linked_list;
pub mod markup;
pub mod position;
pub mod post;
pub mod range;
pub mod section;
pub mod wire;

pub use builder::Builder;
pub use error::{ModelError, ModelResult};
pub use ids::{IdGenerator, InlineId, NodeRef, SectionId};
pub use inline::{char_len, Atom, Inline, Marker};
pub use linked_list::{LinkedList, ListHooks};
pub use markup::{Markup, MarkupCache, MarkupRef, Nesting, MARKUP_TAGS};
pub use position::{Direction, Position};
pub use post::{ChangeLog, Post};
pub use range::Range;
pub use section::{NewSection, Section, SectionKind};
pub use wire::{WireError, WireResult, WireVersion};

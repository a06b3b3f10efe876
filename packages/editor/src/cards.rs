//! # Cards and atoms
//!
//! Cards (block widgets) and atoms (single-unit inline widgets) are drawn by
//! pluggable renderers. The engine hands a renderer `{env, options, payload}`
//! and only keeps the detached view node it returns; whatever happens inside
//! that node belongs to the renderer.
//!
//! Cards may ask the editor to change mode or edit the document through
//! [`CardHooks`]. Hook calls are queued as [`CardAction`]s and applied by the
//! editor on its next [`tick`](crate::Editor::tick), never re-entrantly.

use crate::errors::RenderError;
use crate::view::{ViewId, ViewTree};
use quire_model::SectionId;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardMode {
    #[default]
    Display,
    Edit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardActionKind {
    Edit,
    Save(Value),
    Cancel,
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardAction {
    pub section: SectionId,
    pub kind: CardActionKind,
}

/// Shared queue the hooks push into and the editor drains
#[derive(Debug, Clone, Default)]
pub(crate) struct ActionQueue(Rc<RefCell<VecDeque<CardAction>>>);

impl ActionQueue {
    fn push(&self, action: CardAction) {
        self.0.borrow_mut().push_back(action);
    }

    pub(crate) fn drain(&self) -> Vec<CardAction> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Mode-transition hooks handed to a card renderer
#[derive(Debug, Clone)]
pub struct CardHooks {
    section: SectionId,
    queue: ActionQueue,
}

impl CardHooks {
    pub(crate) fn new(section: SectionId, queue: ActionQueue) -> Self {
        Self { section, queue }
    }

    pub fn section(&self) -> SectionId {
        self.section
    }

    pub fn edit(&self) {
        self.send(CardActionKind::Edit);
    }

    /// Replace the payload and return to display mode
    pub fn save(&self, payload: Value) {
        self.send(CardActionKind::Save(payload));
    }

    pub fn cancel(&self) {
        self.send(CardActionKind::Cancel);
    }

    pub fn remove(&self) {
        self.send(CardActionKind::Remove);
    }

    fn send(&self, kind: CardActionKind) {
        self.queue.push(CardAction {
            section: self.section,
            kind,
        });
    }
}

/// Callback run when a rendered card or atom is torn down
pub struct Teardown(Box<dyn FnOnce()>);

impl Teardown {
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown")
    }
}

/// Per-render environment for a card
#[derive(Debug)]
pub struct CardEnv<'a> {
    pub name: &'a str,
    pub section: SectionId,
    pub hooks: CardHooks,
    pub(crate) teardowns: Vec<Teardown>,
}

impl CardEnv<'_> {
    pub fn on_teardown(&mut self, callback: impl FnOnce() + 'static) {
        self.teardowns.push(Teardown(Box::new(callback)));
    }
}

#[derive(Debug)]
pub struct CardArgs<'a> {
    pub env: CardEnv<'a>,
    pub options: &'a Value,
    pub payload: &'a Value,
}

/// Per-render environment for an atom
#[derive(Debug)]
pub struct AtomEnv<'a> {
    pub name: &'a str,
    pub(crate) teardowns: Vec<Teardown>,
}

impl AtomEnv<'_> {
    pub fn on_teardown(&mut self, callback: impl FnOnce() + 'static) {
        self.teardowns.push(Teardown(Box::new(callback)));
    }
}

#[derive(Debug)]
pub struct AtomArgs<'a> {
    pub env: AtomEnv<'a>,
    pub options: &'a Value,
    pub value: &'a str,
    pub payload: &'a Value,
}

/// Draws a card section.
///
/// Both methods must return a freshly created, detached view node. `None`
/// from `display`, or from `edit` when the card is put into edit mode, is a
/// contract violation reported on that render.
pub trait CardRenderer {
    fn display(&self, view: &mut ViewTree, args: &mut CardArgs<'_>) -> Option<ViewId>;

    fn edit(&self, _view: &mut ViewTree, _args: &mut CardArgs<'_>) -> Option<ViewId> {
        None
    }
}

/// Draws an atom; same contract as [`CardRenderer::display`]
pub trait AtomRenderer {
    fn render(&self, view: &mut ViewTree, args: &mut AtomArgs<'_>) -> Option<ViewId>;
}

/// Named card and atom renderers with optional fallbacks for unknown names
#[derive(Default)]
pub struct Registry {
    cards: HashMap<String, Rc<dyn CardRenderer>>,
    atoms: HashMap<String, Rc<dyn AtomRenderer>>,
    unknown_card: Option<Rc<dyn CardRenderer>>,
    unknown_atom: Option<Rc<dyn AtomRenderer>>,
    options: Value,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cards: Vec<_> = self.cards.keys().collect();
        let mut atoms: Vec<_> = self.atoms.keys().collect();
        cards.sort();
        atoms.sort();
        f.debug_struct("Registry")
            .field("cards", &cards)
            .field("atoms", &atoms)
            .field("unknown_card", &self.unknown_card.is_some())
            .field("unknown_atom", &self.unknown_atom.is_some())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose fallbacks draw placeholders for every card and atom
    pub fn with_placeholders() -> Self {
        let mut registry = Self::new();
        registry.set_unknown_card(PlaceholderCard);
        registry.set_unknown_atom(PlaceholderAtom);
        registry
    }

    pub fn register_card(&mut self, name: impl Into<String>, renderer: impl CardRenderer + 'static) -> &mut Self {
        self.cards.insert(name.into(), Rc::new(renderer));
        self
    }

    pub fn register_atom(&mut self, name: impl Into<String>, renderer: impl AtomRenderer + 'static) -> &mut Self {
        self.atoms.insert(name.into(), Rc::new(renderer));
        self
    }

    pub fn set_unknown_card(&mut self, renderer: impl CardRenderer + 'static) -> &mut Self {
        self.unknown_card = Some(Rc::new(renderer));
        self
    }

    pub fn set_unknown_atom(&mut self, renderer: impl AtomRenderer + 'static) -> &mut Self {
        self.unknown_atom = Some(Rc::new(renderer));
        self
    }

    /// Options passed through to every renderer
    pub fn set_options(&mut self, options: Value) -> &mut Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn card(&self, name: &str) -> Result<Rc<dyn CardRenderer>, RenderError> {
        self.cards
            .get(name)
            .or(self.unknown_card.as_ref())
            .cloned()
            .ok_or_else(|| RenderError::UnknownCard { name: name.to_string() })
    }

    pub fn atom(&self, name: &str) -> Result<Rc<dyn AtomRenderer>, RenderError> {
        self.atoms
            .get(name)
            .or(self.unknown_atom.as_ref())
            .cloned()
            .ok_or_else(|| RenderError::UnknownAtom { name: name.to_string() })
    }
}

/// Draws any card as a labelled box; edit mode shows the raw payload
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCard;

impl CardRenderer for PlaceholderCard {
    fn display(&self, view: &mut ViewTree, args: &mut CardArgs<'_>) -> Option<ViewId> {
        let figure = view.create_element("figure");
        view.set_attribute(figure, "class", "quire-card-placeholder");
        let label = view.create_text(format!("[{}]", args.env.name));
        view.append_child(figure, label);
        Some(figure)
    }

    fn edit(&self, view: &mut ViewTree, args: &mut CardArgs<'_>) -> Option<ViewId> {
        let pre = view.create_element("pre");
        let source = view.create_text(args.payload.to_string());
        view.append_child(pre, source);
        Some(pre)
    }
}

/// Draws an atom as its text value
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderAtom;

impl AtomRenderer for PlaceholderAtom {
    fn render(&self, view: &mut ViewTree, args: &mut AtomArgs<'_>) -> Option<ViewId> {
        let span = view.create_element("span");
        let text = view.create_text(args.value);
        view.append_child(span, text);
        Some(span)
    }
}

//! # Editor
//!
//! One editor instance owns a post, the view it is rendered into, the render
//! tree between them, and the markup cache every node was built from. None
//! of these are shared with other instances.
//!
//! ## Lifecycle
//!
//! ```text
//! Editor::new / from_post / from_wire
//!         ↓
//! render()             initial full render into the view
//!         ↓
//! run(|tx| ...)        transaction on a working copy → commit
//! view edits           queued by the view, absorbed on the next run/tick
//! tick()               drains the task queue: Reparse → CardActions → Render
//! ```
//!
//! With `deferRender` on, commits only schedule a render, so several
//! transactions in one turn share a single render pass.

use crate::cards::{ActionQueue, CardActionKind, CardHooks, CardMode, Registry};
use crate::config::EditorConfig;
use crate::cursor::{range_from_view, range_to_view};
use crate::errors::{EditorError, EditorResult};
use crate::history::{History, Snapshot};
use crate::post_editor::PostEditor;
use crate::reconciler::{reconcile, ReparseOutcome};
use crate::render_tree::RenderTree;
use crate::renderer::{render, RenderStats};
use crate::section_parser::ParserPlugin;
use crate::view::ViewTree;
use quire_model::wire::{self, WireVersion};
use quire_model::{Builder, ChangeLog, Direction, NodeRef, Position, Post, Range, Section, SectionId};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Deferred work, drained in this order by [`Editor::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    Reparse,
    CardActions,
    Render,
}

/// Pending tasks; scheduling the same task twice is a no-op
#[derive(Debug, Default)]
pub struct TaskQueue(BTreeSet<Task>);

impl TaskQueue {
    pub fn schedule(&mut self, task: Task) {
        self.0.insert(task);
    }

    pub fn contains(&self, task: Task) -> bool {
        self.0.contains(&task)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn pop(&mut self) -> Option<Task> {
        self.0.pop_first()
    }

    fn cancel(&mut self, task: Task) {
        self.0.remove(&task);
    }
}

pub struct Editor {
    post: Post,
    builder: Builder,
    view: ViewTree,
    render_tree: RenderTree,
    registry: Registry,
    config: EditorConfig,
    range: Option<Range>,
    queue: TaskQueue,
    history: History,
    /// Changes committed but not yet rendered
    pending: ChangeLog,
    card_actions: ActionQueue,
    plugins: Vec<Box<dyn ParserPlugin>>,
    rendered: bool,
}

impl Editor {
    /// Editor over a post holding one blank paragraph
    pub fn new(config: EditorConfig) -> Self {
        let builder = Builder::new();
        let post = Post::from_sections(vec![builder.paragraph(Vec::new())]).unwrap_or_default();
        Self::from_post(post, builder, config)
    }

    /// `builder` must be the one `post` was built with, so markups stay interned
    pub fn from_post(mut post: Post, builder: Builder, config: EditorConfig) -> Self {
        post.take_changes();
        let range = Position::post_head(&post).map(Range::collapsed);
        Self {
            post,
            builder,
            view: ViewTree::new(),
            render_tree: RenderTree::new(),
            registry: Registry::with_placeholders(),
            history: History::with_max_levels(config.undo_depth),
            config,
            range,
            queue: TaskQueue::default(),
            pending: ChangeLog::default(),
            card_actions: ActionQueue::default(),
            plugins: Vec::new(),
            rendered: false,
        }
    }

    /// Editor over a parsed wire document
    pub fn from_wire(doc: &Value, config: EditorConfig) -> EditorResult<Self> {
        let mut builder = Builder::new();
        let post = wire::parse(doc, &mut builder)?;
        Ok(Self::from_post(post, builder, config))
    }

    pub fn from_json(source: &str, config: EditorConfig) -> EditorResult<Self> {
        let mut builder = Builder::new();
        let post = wire::from_str(source, &mut builder)?;
        Ok(Self::from_post(post, builder, config))
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn add_parser_plugin(&mut self, plugin: impl ParserPlugin + 'static) {
        self.plugins.push(Box::new(plugin));
    }

    // -----------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------

    /// Initial render into the view
    pub fn render(&mut self) -> EditorResult<RenderStats> {
        let stats = self.render_pending()?;
        info!(sections = self.post.section_count(), "initial render");
        Ok(stats)
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    fn render_pending(&mut self) -> EditorResult<RenderStats> {
        self.queue.cancel(Task::Render);
        let changes = std::mem::take(&mut self.pending);
        let result = render(
            &self.post,
            &changes,
            &mut self.view,
            &mut self.render_tree,
            &self.registry,
            &self.config,
            &self.card_actions,
        );
        match result {
            Ok(stats) => {
                self.rendered = true;
                self.restore_selection();
                Ok(stats)
            }
            Err(err) => {
                self.pending = changes;
                Err(err)
            }
        }
    }

    fn schedule_render(&mut self) -> EditorResult<()> {
        if !self.rendered {
            return Ok(());
        }
        if self.config.defer_render {
            self.queue.schedule(Task::Render);
            Ok(())
        } else {
            self.render_pending().map(|_| ())
        }
    }

    fn restore_selection(&mut self) {
        let selection = self
            .range
            .and_then(|range| range_to_view(&self.post, &self.render_tree, &self.view, &range));
        self.view.set_selection(selection);
    }

    /// Run every queued task
    pub fn tick(&mut self) -> EditorResult<()> {
        if self.view.has_pending_mutations() {
            self.queue.schedule(Task::Reparse);
        }
        if !self.card_actions.is_empty() {
            self.queue.schedule(Task::CardActions);
        }
        while let Some(task) = self.queue.pop() {
            debug!(?task, "tick");
            match task {
                Task::Reparse => {
                    self.absorb_view_mutations()?;
                }
                Task::CardActions => self.process_card_actions()?,
                Task::Render => {
                    self.render_pending()?;
                }
            }
        }
        Ok(())
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.queue.is_empty() || self.view.has_pending_mutations() || !self.card_actions.is_empty()
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Run `edit` as one transaction. The closure works on a copy of the
    /// post; nothing is committed if it returns an error.
    pub fn run<T>(&mut self, edit: impl FnOnce(&mut PostEditor<'_>) -> EditorResult<T>) -> EditorResult<T> {
        self.absorb_view_mutations()?;

        let mut working = self.post.snapshot();
        let (value, range) = {
            let mut tx = PostEditor::new(&mut working, &mut self.builder, self.range);
            let value = edit(&mut tx)?;
            (value, tx.complete()?)
        };
        self.commit(working, range)?;
        Ok(value)
    }

    fn commit(&mut self, mut working: Post, range: Option<Range>) -> EditorResult<()> {
        let changes = working.take_changes();
        if changes.is_empty() {
            if range != self.range {
                self.range = range;
                if self.rendered {
                    self.restore_selection();
                }
            }
            return Ok(());
        }

        debug!(dirty = changes.dirty().count(), removed = changes.removed().len(), "commit");
        self.history.record(Snapshot::new(&self.post, self.range));
        self.post = working;
        self.range = range;
        self.pending.merge(changes);
        self.schedule_render()
    }

    /// Fold queued view mutations back into the post. Returns `None` when
    /// the view had not changed.
    pub fn absorb_view_mutations(&mut self) -> EditorResult<Option<ReparseOutcome>> {
        self.queue.cancel(Task::Reparse);
        if !self.view.has_pending_mutations() {
            return Ok(None);
        }
        let mutations = self.view.take_mutations();
        let selection = self.view.selection();

        let mut working = self.post.snapshot();
        let outcome = reconcile(
            &mut working,
            &mut self.builder,
            &self.view,
            &self.render_tree,
            &mutations,
            &self.pending,
            &self.config,
            &self.plugins,
        )?;

        let fallback = outcome
            .range_hint
            .or_else(|| self.range.filter(|r| r.validate(&working).is_ok()))
            .or_else(|| Position::post_tail(&working).map(Range::collapsed));
        self.commit(working, fallback)?;

        // the view already shows the new content; render now so the render
        // tree maps it before the selection is read back
        self.render_pending()?;
        if outcome.range_hint.is_none() {
            let from_view = selection.and_then(|s| {
                range_from_view(&self.post, &self.render_tree, &self.view, &s, &self.config.cursor_placeholder)
            });
            if let Some(range) = from_view {
                self.range = Some(range);
                self.restore_selection();
            }
        }
        Ok(Some(outcome))
    }

    // -----------------------------------------------------------------
    // Cards
    // -----------------------------------------------------------------

    /// Hooks for driving a card from outside its renderer
    pub fn card_hooks(&self, section: SectionId) -> EditorResult<CardHooks> {
        match self.post.section(section) {
            Some(Section::Card(_)) => Ok(CardHooks::new(section, self.card_actions.clone())),
            _ => Err(EditorError::CardNotFound(section)),
        }
    }

    pub fn card_mode(&self, section: SectionId) -> CardMode {
        self.render_tree.card_mode(section)
    }

    fn process_card_actions(&mut self) -> EditorResult<()> {
        for action in self.card_actions.drain() {
            let section = action.section;
            if !matches!(self.post.section(section), Some(Section::Card(_))) {
                warn!(%section, "card action for a missing section");
                continue;
            }
            match action.kind {
                CardActionKind::Edit => self.set_card_mode(section, CardMode::Edit)?,
                CardActionKind::Cancel => self.set_card_mode(section, CardMode::Display)?,
                CardActionKind::Save(payload) => {
                    self.render_tree.set_card_mode(section, CardMode::Display);
                    self.run(|tx| tx.set_card_payload(section, payload))?;
                }
                CardActionKind::Remove => {
                    self.run(|tx| tx.remove_section(section).map(|_| ()))?;
                }
            }
        }
        Ok(())
    }

    fn set_card_mode(&mut self, section: SectionId, mode: CardMode) -> EditorResult<()> {
        if self.render_tree.card_mode(section) == mode {
            return Ok(());
        }
        self.render_tree.set_card_mode(section, mode);
        self.post.mark_dirty(NodeRef::Section(section));
        let changes = self.post.take_changes();
        self.pending.merge(changes);
        self.schedule_render()
    }

    // -----------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------

    pub fn range(&self) -> Option<Range> {
        self.range
    }

    pub fn set_range(&mut self, range: Range) -> EditorResult<()> {
        range.validate(&self.post)?;
        self.range = Some(range);
        if self.rendered {
            self.restore_selection();
        }
        Ok(())
    }

    /// Adopt the view's selection as the editor range
    pub fn selection_from_view(&mut self) -> EditorResult<Option<Range>> {
        self.absorb_view_mutations()?;
        let range = self.view.selection().and_then(|s| {
            range_from_view(&self.post, &self.render_tree, &self.view, &s, &self.config.cursor_placeholder)
        });
        if range.is_some() {
            self.range = range;
        }
        Ok(self.range)
    }

    // -----------------------------------------------------------------
    // Snapshots and history
    // -----------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(&self.post, self.range)
    }

    /// Replace the document with `snapshot`; undoable
    pub fn restore(&mut self, snapshot: Snapshot) -> EditorResult<()> {
        self.absorb_view_mutations()?;
        self.history.record(self.snapshot());
        self.replace_state(snapshot)
    }

    /// Step back one commit; false when there is nothing to undo
    pub fn undo(&mut self) -> EditorResult<bool> {
        self.absorb_view_mutations()?;
        match self.history.undo(self.snapshot()) {
            Some(snapshot) => self.replace_state(snapshot).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> EditorResult<bool> {
        self.absorb_view_mutations()?;
        match self.history.redo(self.snapshot()) {
            Some(snapshot) => self.replace_state(snapshot).map(|_| true),
            None => Ok(false),
        }
    }

    fn replace_state(&mut self, snapshot: Snapshot) -> EditorResult<()> {
        let Snapshot { mut post, range } = snapshot;
        post.take_changes();
        self.range = range.filter(|r| r.validate(&post).is_ok());
        self.post = post;
        self.pending = ChangeLog::default();
        if !self.rendered {
            return Ok(());
        }

        info!(sections = self.post.section_count(), "restoring snapshot");
        self.view.pause_observer();
        self.render_tree.clear(&mut self.view);
        self.view.resume_observer();
        self.render_pending().map(|_| ())
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    // -----------------------------------------------------------------
    // Convenience edits on the current range
    // -----------------------------------------------------------------

    /// Replace the selection with `text`
    pub fn insert_text(&mut self, text: &str) -> EditorResult<()> {
        let range = self.range.ok_or(EditorError::NoSelection)?;
        self.run(|tx| {
            let position = tx.delete_range(range)?;
            let position = landing(tx, position)?;
            let end = tx.insert_text(position, text)?;
            tx.set_position(end);
            Ok(())
        })
    }

    /// Delete the selection, or one unit before the caret
    pub fn delete_selection(&mut self) -> EditorResult<()> {
        let range = self.range.ok_or(EditorError::NoSelection)?;
        self.run(|tx| {
            let position = if range.is_collapsed() {
                tx.delete_at_position(range.head, Direction::Backward)?
            } else {
                tx.delete_range(range)?
            };
            if let Some(position) = position {
                tx.set_position(position);
            }
            Ok(())
        })
    }

    /// Toggle an inline markup such as `b` or `em` over the selection
    pub fn toggle_markup(&mut self, tag: &str) -> EditorResult<()> {
        let range = self.range.ok_or(EditorError::NoSelection)?;
        self.run(|tx| {
            let markup = tx.builder().simple_markup(tag)?;
            tx.toggle_markup(&markup, range)?;
            tx.set_range(range);
            Ok(())
        })
    }

    /// Toggle the selected sections between `tag` and paragraphs
    pub fn toggle_section(&mut self, tag: &str) -> EditorResult<()> {
        let range = self.range.ok_or(EditorError::NoSelection)?;
        self.run(|tx| {
            let range = tx.toggle_section(tag, range)?;
            tx.set_range(range);
            Ok(())
        })
    }

    /// Enter key: split the section at the caret
    pub fn split_at_cursor(&mut self) -> EditorResult<()> {
        let range = self.range.ok_or(EditorError::NoSelection)?;
        self.run(|tx| {
            let position = tx.delete_range(range)?;
            let position = landing(tx, position)?;
            let next = tx.split_section(position)?;
            tx.set_position(next);
            Ok(())
        })
    }

    // -----------------------------------------------------------------
    // Serialization and accessors
    // -----------------------------------------------------------------

    /// Wire document for the post; `None` uses the configured version
    pub fn serialize(&self, version: Option<WireVersion>) -> EditorResult<Value> {
        Ok(wire::render(&self.post, version.unwrap_or(self.config.wire_version))?)
    }

    pub fn to_json(&self, version: Option<WireVersion>) -> EditorResult<String> {
        Ok(wire::to_string(&self.post, version.unwrap_or(self.config.wire_version))?)
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    /// The view as the platform sees it; changes made here are absorbed later
    pub fn view_mut(&mut self) -> &mut ViewTree {
        &mut self.view
    }

    pub fn render_tree(&self) -> &RenderTree {
        &self.render_tree
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Root markup of the view
    pub fn to_markup(&self) -> String {
        self.view.to_markup(self.view.root())
    }
}

/// Where to continue after a delete that may have emptied the post
fn landing(tx: &mut PostEditor<'_>, position: Option<Position>) -> EditorResult<Position> {
    if let Some(position) = position {
        return Ok(position);
    }
    let paragraph = tx.builder().paragraph(Vec::new());
    let section = tx.insert_section_at_end(paragraph)?;
    Ok(Position::head(tx.post(), section)?)
}

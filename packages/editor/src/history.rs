//! # Undo/Redo History
//!
//! Snapshot-based history for an editor instance.
//!
//! ## Design
//!
//! - Every committed transaction records the post and range that were
//!   current *before* it ran
//! - Undo swaps the current state for the newest snapshot and moves the
//!   current state to the redo stack
//! - New commits clear the redo stack
//! - Commits inside a group collapse into one undo step (the state before
//!   the group began)

use quire_model::{Post, Range};

/// A restorable document state: the tree plus the range active at the time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub post: Post,
    pub range: Option<Range>,
}

impl Snapshot {
    pub fn new(post: &Post, range: Option<Range>) -> Self {
        Self {
            post: post.snapshot(),
            range,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    snapshot: Snapshot,
    description: Option<String>,
}

#[derive(Debug)]
struct Group {
    description: Option<String>,
    recorded: bool,
}

#[derive(Debug)]
pub struct History {
    /// Most recent last
    undo_stack: Vec<Entry>,

    /// Most recent last
    redo_stack: Vec<Entry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    group: Option<Group>,
}

impl History {
    /// History with the default depth (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            group: None,
        }
    }

    /// Record the state that a commit is about to replace
    pub fn record(&mut self, snapshot: Snapshot) {
        let description = match &mut self.group {
            Some(group) if group.recorded => {
                // the group's first snapshot already covers this commit
                self.redo_stack.clear();
                return;
            }
            Some(group) => {
                group.recorded = true;
                group.description.clone()
            }
            None => None,
        };

        self.undo_stack.push(Entry {
            snapshot,
            description,
        });
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Start collapsing commits into one undo step
    pub fn begin_group(&mut self) {
        self.group = Some(Group {
            description: None,
            recorded: false,
        });
    }

    pub fn end_group(&mut self) {
        self.group = None;
    }

    pub fn set_group_description(&mut self, description: impl Into<String>) {
        if let Some(group) = &mut self.group {
            group.description = Some(description.into());
            if group.recorded {
                if let Some(entry) = self.undo_stack.last_mut() {
                    entry.description = group.description.clone();
                }
            }
        }
    }

    /// Step back: returns the snapshot to restore, storing `current` for redo
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let entry = self.undo_stack.pop()?;
        self.redo_stack.push(Entry {
            snapshot: current,
            description: entry.description.clone(),
        });
        Some(entry.snapshot)
    }

    /// Step forward again after an undo
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push(Entry {
            snapshot: current,
            description: entry.description.clone(),
        });
        Some(entry.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.group = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

//! # Linked List
//!
//! Ordered container used for every child sequence in the document tree
//! (post sections, list items, section inlines) and in the render tree.
//!
//! Items are small copyable keys (node ids). Links live in a hash map keyed by
//! the item itself, so insertion next to a known item and removal of a known
//! item are O(1) without intrusive pointers.
//!
//! ## Lifecycle hooks
//!
//! A list can carry a [`ListHooks`] value that is told whenever an item is
//! adopted (inserted) or freed (removed). The render tree uses this to
//! collect render nodes that must be torn down after a child list changes.

use crate::error::{ModelError, ModelResult};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Callbacks invoked as items enter and leave a list
pub trait ListHooks<T> {
    fn adopted(&mut self, _item: T) {}

    fn freed(&mut self, _item: T) {}
}

impl<T> ListHooks<T> for () {}

#[derive(Debug, Clone)]
struct Links<T> {
    prev: Option<T>,
    next: Option<T>,
}

/// Doubly linked list of copyable keys
#[derive(Debug, Clone)]
pub struct LinkedList<T, H = ()> {
    head: Option<T>,
    tail: Option<T>,
    links: HashMap<T, Links<T>>,
    hooks: H,
}

impl<T, H> Default for LinkedList<T, H>
where
    T: Copy + Eq + Hash + Debug,
    H: ListHooks<T> + Default,
{
    fn default() -> Self {
        Self::with_hooks(H::default())
    }
}

impl<T> LinkedList<T>
where
    T: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::with_hooks(())
    }
}

impl<T, H> LinkedList<T, H>
where
    T: Copy + Eq + Hash + Debug,
    H: ListHooks<T>,
{
    pub fn with_hooks(hooks: H) -> Self {
        Self {
            head: None,
            tail: None,
            links: HashMap::new(),
            hooks,
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn head(&self) -> Option<T> {
        self.head
    }

    pub fn tail(&self) -> Option<T> {
        self.tail
    }

    pub fn contains(&self, item: T) -> bool {
        self.links.contains_key(&item)
    }

    pub fn next(&self, item: T) -> Option<T> {
        self.links.get(&item).and_then(|l| l.next)
    }

    pub fn prev(&self, item: T) -> Option<T> {
        self.links.get(&item).and_then(|l| l.prev)
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn append(&mut self, item: T) -> ModelResult<()> {
        self.insert_before(item, None)
    }

    pub fn prepend(&mut self, item: T) -> ModelResult<()> {
        let head = self.head;
        self.insert_before(item, head)
    }

    /// Insert `item` before `before`, or at the end when `before` is `None`
    pub fn insert_before(&mut self, item: T, before: Option<T>) -> ModelResult<()> {
        if self.links.contains_key(&item) {
            return Err(ModelError::invalid_structure(format!(
                "{:?} is already in the list",
                item
            )));
        }

        let prev = match before {
            Some(b) => {
                let links = self.links.get(&b).ok_or_else(|| {
                    ModelError::invalid_structure(format!("{:?} is not in the list", b))
                })?;
                links.prev
            }
            None => self.tail,
        };

        self.links.insert(item, Links { prev, next: before });

        match prev {
            Some(p) => {
                if let Some(l) = self.links.get_mut(&p) {
                    l.next = Some(item);
                }
            }
            None => self.head = Some(item),
        }
        match before {
            Some(b) => {
                if let Some(l) = self.links.get_mut(&b) {
                    l.prev = Some(item);
                }
            }
            None => self.tail = Some(item),
        }

        self.hooks.adopted(item);
        Ok(())
    }

    /// Insert `item` after `after`, or at the start when `after` is `None`
    pub fn insert_after(&mut self, item: T, after: Option<T>) -> ModelResult<()> {
        let before = match after {
            Some(a) => {
                if !self.links.contains_key(&a) {
                    return Err(ModelError::invalid_structure(format!(
                        "{:?} is not in the list",
                        a
                    )));
                }
                self.next(a)
            }
            None => self.head,
        };
        self.insert_before(item, before)
    }

    /// Unlink `item`; returns false if it was not a member
    pub fn remove(&mut self, item: T) -> bool {
        let Some(links) = self.links.remove(&item) else {
            return false;
        };

        match links.prev {
            Some(p) => {
                if let Some(l) = self.links.get_mut(&p) {
                    l.next = links.next;
                }
            }
            None => self.head = links.next,
        }
        match links.next {
            Some(n) => {
                if let Some(l) = self.links.get_mut(&n) {
                    l.prev = links.prev;
                }
            }
            None => self.tail = links.prev,
        }

        self.hooks.freed(item);
        true
    }

    /// Remove every item, freeing them head to tail
    pub fn clear(&mut self) {
        while let Some(head) = self.head {
            self.remove(head);
        }
    }

    /// Remove and return every item that follows `item`
    pub fn split_off_after(&mut self, item: T) -> Vec<T> {
        let mut removed = Vec::new();
        while let Some(next) = self.next(item) {
            self.remove(next);
            removed.push(next);
        }
        removed
    }

    pub fn position_of(&self, item: T) -> Option<usize> {
        self.iter().position(|i| i == item)
    }

    pub fn nth(&self, index: usize) -> Option<T> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> Iter<'_, T, H> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

/// Head-to-tail iterator over a [`LinkedList`]
pub struct Iter<'a, T, H> {
    list: &'a LinkedList<T, H>,
    cursor: Option<T>,
}

impl<'a, T, H> Iterator for Iter<'a, T, H>
where
    T: Copy + Eq + Hash + Debug,
    H: ListHooks<T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let current = self.cursor?;
        self.cursor = self.list.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        adopted: Vec<u32>,
        freed: Vec<u32>,
    }

    impl ListHooks<u32> for Recorder {
        fn adopted(&mut self, item: u32) {
            self.adopted.push(item);
        }

        fn freed(&mut self, item: u32) {
            self.freed.push(item);
        }
    }

    #[test]
    fn test_append_and_prepend() {
        let mut list = LinkedList::new();
        list.append(2).unwrap();
        list.append(3).unwrap();
        list.prepend(1).unwrap();

        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert_eq!(list.head(), Some(1));
        assert_eq!(list.tail(), Some(3));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut list = LinkedList::new();
        list.append(1).unwrap();
        list.append(4).unwrap();
        list.insert_before(3, Some(4)).unwrap();
        list.insert_after(2, Some(1)).unwrap();
        list.insert_after(0, None).unwrap();

        assert_eq!(list.to_vec(), vec![0, 1, 2, 3, 4]);
        assert_eq!(list.prev(3), Some(2));
        assert_eq!(list.next(3), Some(4));
    }

    #[test]
    fn test_remove_relinks_neighbours() {
        let mut list = LinkedList::new();
        for i in 0..4 {
            list.append(i).unwrap();
        }
        assert!(list.remove(0));
        assert!(list.remove(2));
        assert!(list.remove(3));
        assert!(!list.remove(3));

        assert_eq!(list.to_vec(), vec![1]);
        assert_eq!(list.head(), Some(1));
        assert_eq!(list.tail(), Some(1));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut list = LinkedList::new();
        list.append(1).unwrap();
        assert!(list.append(1).is_err());
        assert!(list.insert_before(5, Some(9)).is_err());
    }

    #[test]
    fn test_split_off_after() {
        let mut list = LinkedList::new();
        for i in 0..5 {
            list.append(i).unwrap();
        }
        let rest = list.split_off_after(1);
        assert_eq!(rest, vec![2, 3, 4]);
        assert_eq!(list.to_vec(), vec![0, 1]);
        assert_eq!(list.tail(), Some(1));
    }

    #[test]
    fn test_hooks_observe_lifecycle() {
        let mut list: LinkedList<u32, Recorder> = LinkedList::default();
        list.append(1).unwrap();
        list.append(2).unwrap();
        list.remove(1);
        list.clear();

        assert_eq!(list.hooks().adopted, vec![1, 2]);
        assert_eq!(list.hooks().freed, vec![1, 2]);
        assert!(list.is_empty());
    }
}

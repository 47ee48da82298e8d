//! Key index plus recency order
//!
//! Uses a slab-backed doubly-linked list and an AHash map from key to slot,
//! so lookup, insertion at either end, removal and repositioning are all O(1).
//! Front is the most recently used end, back the least recently used.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

/// Position of a node in the list, stable until the node is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

/// Node in the doubly-linked list
struct Node<K, T> {
    key: K,
    item: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Hash index over a recency-ordered list
pub struct LruList<K, T> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, T>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
}

impl<K, T> LruList<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
        }
    }

    /// Find the slot holding `key`
    pub fn find<Q>(&self, key: &Q) -> Option<Slot>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|&idx| Slot(idx))
    }

    /// Insert at the front (most recent end). The key must not be present.
    pub fn insert_front(&mut self, key: K, item: T) -> Slot {
        let idx = self.link_new(key, item);
        self.link_front(idx);
        Slot(idx)
    }

    /// Insert at the back (least recent end). The key must not be present.
    pub fn insert_back(&mut self, key: K, item: T) -> Slot {
        let idx = self.link_new(key, item);
        self.link_back(idx);
        Slot(idx)
    }

    /// Unlink the node at `slot` and drop its key from the index
    pub fn remove(&mut self, slot: Slot) -> Option<(K, T)> {
        let idx = slot.0;
        if !self.is_live(idx) {
            return None;
        }

        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.map.remove(&node.key);
        self.free_node(idx);
        Some((node.key, node.item))
    }

    /// Make `slot` the most recently used node
    pub fn move_to_front(&mut self, slot: Slot) {
        if self.head == Some(slot.0) || !self.is_live(slot.0) {
            return;
        }
        self.unlink(slot.0);
        self.link_front(slot.0);
    }

    /// Make `slot` the least recently used node
    pub fn move_to_back(&mut self, slot: Slot) {
        if self.tail == Some(slot.0) || !self.is_live(slot.0) {
            return;
        }
        self.unlink(slot.0);
        self.link_back(slot.0);
    }

    /// Slot of the most recently used node
    pub fn front(&self) -> Option<Slot> {
        self.head.map(Slot)
    }

    /// Slot of the least recently used node
    pub fn back(&self) -> Option<Slot> {
        self.tail.map(Slot)
    }

    /// Item stored at `slot`
    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.nodes.get(slot.0)?.as_ref().map(|node| &node.item)
    }

    /// Iterate front to back
    pub fn iter(&self) -> Iter<'_, K, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Remove every node, returning them front to back
    pub fn drain(&mut self) -> Vec<(K, T)> {
        let mut out = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.nodes[idx].take() {
                Some(node) => {
                    cursor = node.next;
                    out.push((node.key, node.item));
                }
                None => break,
            }
        }

        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        out
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn is_live(&self, idx: usize) -> bool {
        matches!(self.nodes.get(idx), Some(Some(_)))
    }

    fn link_new(&mut self, key: K, item: T) -> usize {
        debug_assert!(!self.map.contains_key(&key), "key already linked");

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            item,
            prev: None,
            next: None,
        });
        self.map.insert(key, idx);
        idx
    }

    fn link_front(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn link_back(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = self.tail;
            node.next = None;
        }

        if let Some(tail_idx) = self.tail {
            if let Some(tail) = &mut self.nodes[tail_idx] {
                tail.next = Some(idx);
            }
        }

        self.tail = Some(idx);
        if self.head.is_none() {
            self.head = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

impl<K, T> Default for LruList<K, T>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Front-to-back iterator over an [`LruList`]
pub struct Iter<'a, K, T> {
    list: &'a LruList<K, T>,
    cursor: Option<usize>,
}

impl<'a, K, T> Iterator for Iter<'a, K, T> {
    type Item = (&'a K, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.nodes.get(idx)?.as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.item))
    }
}

//! LRU Module
//!
//! Byte-budgeted least-recently-used cache. Unlike [`CacheTable`] it has no
//! notion of time: entries leave only when the byte budget is exceeded or
//! they are removed explicitly.
//!
//! Recency is kept in a doubly-linked list threaded through a slab of nodes:
//! - Head = Most recently used
//! - Tail = Least recently used
//!
//! [`CacheTable`]: crate::cache::CacheTable

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::ByteView;

// == Byte Size ==
/// Values that can report how many bytes they occupy.
pub trait ByteSize {
    fn byte_len(&self) -> usize;
}

impl ByteSize for String {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

// == Byte LRU ==
/// LRU cache bounded by the summed byte length of keys and values.
///
/// A `max_bytes` of zero means unbounded.
pub struct ByteLru<V> {
    max_bytes: usize,
    used_bytes: usize,
    nodes: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: ByteSize> ByteLru<V> {
    // == Constructor ==
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted: None,
        }
    }

    /// Sets a callback fired for every entry evicted to honour the byte budget.
    pub fn with_eviction_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &V) + Send + 'static,
    {
        self.on_evicted = Some(Box::new(callback));
        self
    }

    // == Get ==
    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.node(idx).map(|node| &node.value)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.node(idx).map(|node| &node.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Add ==
    /// Inserts or replaces `key`, marks it most recently used, then evicts
    /// from the tail until the byte budget holds.
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(&idx) = self.index.get(&key) {
            self.move_to_front(idx);
            if let Some(node) = self.nodes[idx].as_mut() {
                let old = std::mem::replace(&mut node.value, value);
                self.used_bytes = self.used_bytes + node.value.byte_len() - old.byte_len();
            }
        } else {
            self.used_bytes += key.len() + value.byte_len();
            let node = Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            };
            let idx = match self.free.pop() {
                Some(idx) => {
                    self.nodes[idx] = Some(node);
                    idx
                }
                None => {
                    self.nodes.push(Some(node));
                    self.nodes.len() - 1
                }
            };
            self.index.insert(key, idx);
            self.push_front(idx);
        }

        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            let Some((key, value)) = self.remove_oldest() else {
                break;
            };
            trace!("LRU evicted key '{}' ({} bytes)", key, key.len() + value.byte_len());
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(&key, &value);
            }
        }
    }

    // == Remove ==
    /// Removes and returns the least recently used entry.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        self.take(idx)
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.take(idx).map(|(_, value)| value)
    }

    /// Key of the least recently used entry.
    pub fn peek_oldest(&self) -> Option<&str> {
        let idx = self.tail?;
        self.node(idx).map(|node| node.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted to keys and values.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    // == List Plumbing ==
    fn node(&self, idx: usize) -> Option<&Node<V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn take(&mut self, idx: usize) -> Option<(String, V)> {
        self.detach(idx);
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&node.key);
        self.used_bytes -= node.key.len() + node.value.byte_len();
        Some((node.key, node.value))
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
            return;
        };
        match prev {
            Some(p) => self.with_node(p, |node| node.next = next),
            None => self.head = next,
        }
        match next {
            Some(n) => self.with_node(n, |node| node.prev = prev),
            None => self.tail = prev,
        }
        self.with_node(idx, |node| {
            node.prev = None;
            node.next = None;
        });
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        self.with_node(idx, |node| {
            node.prev = None;
            node.next = old_head;
        });
        match old_head {
            Some(h) => self.with_node(h, |node| node.prev = Some(idx)),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn with_node(&mut self, idx: usize, update: impl FnOnce(&mut Node<V>)) {
        if let Some(node) = self.nodes.get_mut(idx).and_then(Option::as_mut) {
            update(node);
        }
    }
}

impl<V> fmt::Debug for ByteLru<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteLru")
            .field("len", &self.index.len())
            .field("used_bytes", &self.used_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

// == LRU Store ==
/// Thread-safe, lazily allocated [`ByteLru`] of [`ByteView`] values.
///
/// Every lookup reorders the recency list, so a plain mutex guards it.
#[derive(Debug)]
pub struct LruStore {
    max_bytes: usize,
    lru: Mutex<Option<ByteLru<ByteView>>>,
}

impl LruStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(None),
        }
    }

    pub fn add(&self, key: impl Into<String>, value: ByteView) {
        self.lru
            .lock()
            .get_or_insert_with(|| ByteLru::new(self.max_bytes))
            .add(key, value);
    }

    /// Returns a cheap clone of the cached view.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.lru.lock().as_mut()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lru.lock().as_ref().map_or(0, ByteLru::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn used_bytes(&self) -> usize {
        self.lru.lock().as_ref().map_or(0, ByteLru::used_bytes)
    }
}

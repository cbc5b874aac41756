//! Byte View Module
//!
//! Immutable byte payload stored by the LRU store.

use std::borrow::Cow;
use std::sync::Arc;

use crate::cache::lru::ByteSize;

/// Read-only view over cached bytes. Clones share the same buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Arc<[u8]>,
}

impl ByteView {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns an owned copy of the bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl ByteSize for ByteView {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for ByteView {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for ByteView {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

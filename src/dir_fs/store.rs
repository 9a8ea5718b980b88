//! The operation sets of the mapping and queue views, so that other
//! storage backends can offer the same contracts.

use super::{dir_map::DirMap, error::DirError};

/// What a mapping lookup produces: the text stored for a key, or a
/// nested mapping when the key names a sub-collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N = DirMap> {
    Text(String),
    Nested(N),
}

impl<N> Value<N> {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Nested(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s),
            Value::Nested(_) => None,
        }
    }

    pub fn into_nested(self) -> Option<N> {
        match self {
            Value::Text(_) => None,
            Value::Nested(n) => Some(n),
        }
    }
}

/// A mutable mapping from string keys to text values (or nested
/// mappings). Every call reflects the current state of the backing
/// storage.
pub trait MapStore {
    type Nested;

    fn get(&self, key: &str) -> Result<Value<Self::Nested>, DirError>;

    /// Replace the value for `key` (creating the mapping if absent).
    fn set(&self, key: &str, value: &str) -> Result<(), DirError>;

    fn delete(&self, key: &str) -> Result<(), DirError>;

    fn len(&self) -> Result<usize, DirError>;

    fn is_empty(&self) -> Result<bool, DirError> {
        Ok(self.len()? == 0)
    }

    /// A fresh snapshot of the keys, in no particular order.
    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, DirError>> + '_>, DirError>;

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }
}

/// The primitives a blocking queue wrapper needs; none of them
/// blocks.
pub trait QueueStore {
    fn size(&self) -> Result<usize, DirError>;

    /// Remove and return the front element.
    fn get(&self) -> Result<String, DirError>;

    fn put(&self, value: &str) -> Result<(), DirError>;

    /// Capacity bound, 0 meaning unbounded.
    fn max_size(&self) -> usize {
        0
    }
}

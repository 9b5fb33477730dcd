//! Deep merge of partial configuration
//!
//! Rules for `base.merge(incoming)`:
//! - mappings merge key-wise, recursively
//! - absence (`None`, JSON `null`) never erases what `base` has
//! - everything else, arrays and callables included, is replaced wholesale
//! - [`IndexMerge`] arrays merge element by element instead

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

/// Accumulates partial configuration
pub trait Merge {
    /// Merge `incoming` into `self`; `incoming` wins on conflicts
    fn merge(&mut self, incoming: Self);
}

/// Merged copy of `base` and `incoming`
pub fn deep_merge<T: Merge>(mut base: T, incoming: T) -> T {
    base.merge(incoming);
    base
}

/// Whether a JSON value is a scalar (number, string or bool)
pub fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_) | Value::Bool(_))
}

// ============================================================================
// JSON
// ============================================================================

impl Merge for Value {
    fn merge(&mut self, incoming: Value) {
        match (self, incoming) {
            (_, Value::Null) => {}
            (Value::Object(base), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    match base.get_mut(&key) {
                        Some(slot) => slot.merge(value),
                        None if value.is_null() => {}
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (slot, value) => *slot = value,
        }
    }
}

// ============================================================================
// Std types
// ============================================================================

impl<T: Merge> Merge for Option<T> {
    fn merge(&mut self, incoming: Option<T>) {
        let Some(value) = incoming else {
            return;
        };
        match self {
            Some(base) => base.merge(value),
            None => *self = Some(value),
        }
    }
}

macro_rules! replace_merge {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Merge for $ty {
                fn merge(&mut self, incoming: $ty) {
                    *self = incoming;
                }
            }
        )*
    };
}

replace_merge!(
    bool, char, String, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32,
    f64, std::path::PathBuf,
);

impl Merge for () {
    fn merge(&mut self, _incoming: ()) {}
}

impl<T> Merge for Vec<T> {
    fn merge(&mut self, incoming: Vec<T>) {
        *self = incoming;
    }
}

/// Callables and other shared values are replaced, never merged
impl<T: ?Sized> Merge for Arc<T> {
    fn merge(&mut self, incoming: Arc<T>) {
        *self = incoming;
    }
}

impl<K: Ord, V: Merge> Merge for BTreeMap<K, V> {
    fn merge(&mut self, incoming: BTreeMap<K, V>) {
        for (key, value) in incoming {
            match self.get_mut(&key) {
                Some(slot) => slot.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

impl<K: Eq + Hash, V: Merge> Merge for HashMap<K, V> {
    fn merge(&mut self, incoming: HashMap<K, V>) {
        for (key, value) in incoming {
            match self.get_mut(&key) {
                Some(slot) => slot.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

// ============================================================================
// IndexMerge
// ============================================================================

/// Array merged by index: element `i` of the incoming array merges into
/// element `i` of the base, extra incoming elements are appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMerge<T>(pub Vec<T>);

impl<T> IndexMerge<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self(items)
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> std::ops::Deref for IndexMerge<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T: Merge> Merge for IndexMerge<T> {
    fn merge(&mut self, incoming: IndexMerge<T>) {
        let mut incoming = incoming.0.into_iter();
        for slot in self.0.iter_mut() {
            match incoming.next() {
                Some(value) => slot.merge(value),
                None => return,
            }
        }
        self.0.extend(incoming);
    }
}

impl<T> From<Vec<T>> for IndexMerge<T> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

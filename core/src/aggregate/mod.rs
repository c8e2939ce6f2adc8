//! Grouped aggregation: turns flat record sequences into nested
//! `key -> ... -> scalar` trees.
//!
//! Every upstream summary ("events by country by year", "funding by
//! country by type by month") is one call to [`aggregate`] with a
//! different set of key functions. The tree depth always equals the
//! number of key functions; sibling key sets only contain combinations
//! actually observed in the input.

mod flatten;
mod shape;

pub use flatten::{get_path, FlattenError, Flattener, DEFAULT_MAX_DEPTH, DEFAULT_SEPARATOR};
pub use shape::Shape;

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// A single grouping key.
///
/// `Null` is a first-class key: a record whose key function finds
/// nothing still lands in the tree, under `Null`. Callers that want
/// such records gone must pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl KeyValue {
    /// Key rendering used when the tree is serialized to JSON, where
    /// object keys must be strings.
    pub fn as_json_key(&self) -> String {
        match self {
            KeyValue::Null => "null".to_string(),
            KeyValue::Bool(b) => b.to_string(),
            KeyValue::Int(i) => i.to_string(),
            KeyValue::Str(s) => s.clone(),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Str(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        KeyValue::Int(value as i64)
    }
}

impl From<bool> for KeyValue {
    fn from(value: bool) -> Self {
        KeyValue::Bool(value)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => KeyValue::Null,
        }
    }
}

/// One node of an aggregate tree: every non-leaf level is a mapping
/// from [`KeyValue`] to child node, every leaf is the scalar aggregate
/// for that exact key combination.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(f64),
    Branch(BTreeMap<KeyValue, Node>),
}

impl Node {
    pub fn new_branch() -> Self {
        Node::Branch(BTreeMap::new())
    }

    pub fn get(&self, key: &KeyValue) -> Option<&Node> {
        match self {
            Node::Branch(children) => children.get(key),
            Node::Leaf(_) => None,
        }
    }

    /// Descend through one key per level. `None` if any key is absent
    /// or the path runs past a leaf.
    pub fn get_path(&self, keys: &[KeyValue]) -> Option<&Node> {
        let mut node = self;
        for key in keys {
            node = node.get(key)?;
        }
        Some(node)
    }

    /// The scalar held by a leaf node.
    pub fn value(&self) -> Option<f64> {
        match self {
            Node::Leaf(v) => Some(*v),
            Node::Branch(_) => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<KeyValue, Node>> {
        match self {
            Node::Branch(children) => Some(children),
            Node::Leaf(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Branch(children) => children.is_empty(),
            Node::Leaf(_) => false,
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Leaf(v) => {
                // Counts stay integers in the serialized tree.
                if v.fract() == 0.0 && v.abs() < (i64::MAX as f64) {
                    serializer.serialize_i64(*v as i64)
                } else {
                    serializer.serialize_f64(*v)
                }
            }
            Node::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (key, child) in children {
                    map.serialize_entry(&key.as_json_key(), child)?;
                }
                map.end()
            }
        }
    }
}

/// How leaf values are combined.
///
/// `Count` tallies records and never consults the value function.
/// `Sum` adds the value function's output. With either reducer a record
/// whose value function yields `None` still creates its group entry,
/// initialized to zero and contributing nothing. One consistent policy
/// instead of per-call-site improvisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Count,
    Sum,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("at least one grouping key function is required")]
    NoGroupingKeys,
    #[error("grouping tree shape conflict at depth {depth}")]
    ShapeConflict { depth: usize },
}

/// A key-extraction function: one per nesting level, applied in order.
pub type KeyFn<'a, R> = &'a (dyn Fn(&R) -> KeyValue + 'a);

/// Group `records` by `key_fns` (in order) and combine values at the
/// leaves with `reducer`. The result has exactly `key_fns.len()` levels
/// of nesting on every populated path; the number of levels is not
/// limited.
pub fn aggregate<R>(
    records: &[R],
    key_fns: &[KeyFn<'_, R>],
    value_fn: &dyn Fn(&R) -> Option<f64>,
    reducer: Reducer,
) -> Result<Node, AggregateError> {
    let Some((last_fn, inner_fns)) = key_fns.split_last() else {
        return Err(AggregateError::NoGroupingKeys);
    };

    let mut root = Node::new_branch();
    for record in records {
        let mut node = &mut root;
        for (depth, key_fn) in inner_fns.iter().enumerate() {
            let key = key_fn(record);
            let Node::Branch(children) = node else {
                return Err(AggregateError::ShapeConflict { depth });
            };
            node = children.entry(key).or_insert_with(Node::new_branch);
        }

        let Node::Branch(children) = node else {
            return Err(AggregateError::ShapeConflict {
                depth: inner_fns.len(),
            });
        };
        let leaf = children.entry(last_fn(record)).or_insert(Node::Leaf(0.0));
        if let Node::Leaf(total) = leaf {
            *total += match reducer {
                Reducer::Count => 1.0,
                Reducer::Sum => value_fn(record).unwrap_or(0.0),
            };
        }
    }
    Ok(root)
}

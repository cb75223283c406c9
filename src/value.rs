//! Tagged-map value type for dynamically-shaped message fields.
//!
//! `data`/`metadata` on a [`crate::message::Message`] are not fixed schemas; transformers,
//! routers and filters need a shared tree to walk. `Value` is that tree, and [`Value::get_by_path`]
//! is the uniform dotted-path accessor so those consumers never diverge on how they read it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dynamically-typed value in a [`crate::message::Message`]'s `data`/metadata tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// Resolve a dotted path (`"meta.region"`, `"after.0.id"`) against this value.
    ///
    /// List segments must parse as a plain base-10 index; anything else is treated as a
    /// map key. Returns `None` on the first missing or type-mismatched segment.
    pub fn get_by_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }
            current = match current {
                Value::Map(m) => m.get(segment)?,
                Value::List(l) => {
                    let index: usize = segment.parse().ok()?;
                    l.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

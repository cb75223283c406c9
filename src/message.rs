//! The transport unit flowing through the pipeline, plus a pool for reusing instances.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The kind of change a [`Message`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Snapshot,
}

/// One record flowing through the pipeline.
///
/// `acquire`/`release` through a [`MessagePool`] are an optimization; constructing a
/// `Message` directly is always correct. `clone()` deep-copies so the same logical record
/// can be fanned out to multiple sinks without aliasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub operation: Option<Operation>,
    pub schema: String,
    pub table: String,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub payload: Vec<u8>,
    pub data: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for Operation {
    fn default() -> Self {
        Operation::Create
    }
}

impl Message {
    /// A zeroed message suitable for reuse from a pool.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The idempotency key: `metadata["idempotency_key"]` if present, else `id`.
    pub fn idempotency_key(&self) -> &str {
        self.metadata
            .get("idempotency_key")
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    /// Reset this message's fields to their zero value in place, for pool reuse.
    fn reset(&mut self) {
        self.id.clear();
        self.operation = None;
        self.schema.clear();
        self.table.clear();
        self.before.clear();
        self.after.clear();
        self.payload.clear();
        self.data.clear();
        self.metadata.clear();
    }

    /// Uniform virtual-field accessor shared by transformers, routers and filters.
    ///
    /// Recognizes `operation`, `table`, `schema`, `meta.<key>`, and `after.<path>` (the
    /// latter only when `after` was populated via [`Message::set_after_value`]); any other
    /// prefix is looked up in `data`.
    pub fn get_by_path(&self, path: &str) -> Option<Value> {
        match path {
            "operation" => self.operation.map(|op| {
                Value::String(
                    match op {
                        Operation::Create => "create",
                        Operation::Update => "update",
                        Operation::Delete => "delete",
                        Operation::Snapshot => "snapshot",
                    }
                    .to_string(),
                )
            }),
            "table" => Some(Value::String(self.table.clone())),
            "schema" => Some(Value::String(self.schema.clone())),
            _ => {
                if let Some(rest) = path.strip_prefix("meta.") {
                    self.metadata.get(rest).map(|v| Value::String(v.clone()))
                } else {
                    let root = Value::Map(self.data.clone());
                    root.get_by_path(path).cloned()
                }
            }
        }
    }
}

/// A simple free-list pool for [`Message`] instances.
///
/// Per the spec's own framing, pooling is an optimization; this is a naive `Mutex<Vec<_>>`
/// free list, not an arena. Ownership discipline (don't touch a message after it's handed to
/// a sink writer until `done` signals) is enforced by callers, not by the pool itself.
#[derive(Debug, Default)]
pub struct MessagePool {
    free: Mutex<Vec<Message>>,
}

impl MessagePool {
    pub fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    /// Acquire a zeroed message, reusing a freed instance if one is available.
    pub fn acquire(&self) -> Message {
        let mut free = self.free.lock().unwrap_or_else(|p| p.into_inner());
        free.pop().unwrap_or_default()
    }

    /// Return a message to the pool. The caller must not reference it afterward.
    pub fn release(&self, mut message: Message) {
        message.reset();
        let mut free = self.free.lock().unwrap_or_else(|p| p.into_inner());
        free.push(message);
    }

    /// Number of instances currently held for reuse.
    pub fn len(&self) -> usize {
        self.free.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

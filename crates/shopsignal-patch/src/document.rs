use crate::apply::{apply, apply_all};
use serde_json::{Map, Value};
use shopsignal_core::types::PatchOp;

/// Reconstructed partial state for one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn new() -> Self {
        Self { root: Value::Object(Map::new()) }
    }

    pub fn apply(&mut self, op: &PatchOp) {
        apply(&mut self.root, op);
    }

    pub fn apply_all<'a>(&mut self, ops: impl IntoIterator<Item = &'a PatchOp>) {
        apply_all(&mut self.root, ops);
    }

    /// Look up a value by slash path, e.g. `/data/0/title`.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        self.root.pointer(path)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

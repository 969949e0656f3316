//! Applier for the streamed `{p, o, v}` patch dialect.
//!
//! Operators: add, replace, append, remove, truncate. Malformed operations are
//! ignored; the applier never fails.

pub mod apply;
pub mod document;

pub use apply::{apply, apply_all};
pub use document::Document;
pub use shopsignal_core::types::{PatchKind, PatchOp};

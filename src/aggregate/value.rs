use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{ListView, ObjectView};
use crate::types::{ChunkId, FieldKey, NodeKey};

/// Merged state of one (node, field) across every contributing chunk.
///
/// The kind is decided by the raw data the chunks hold, never by the
/// selection being read.
#[derive(Clone, Debug)]
pub enum AggregateValue<'f> {
    /// Leaf value from the most recent defining chunk.
    Scalar(&'f JsonValue),
    /// Composite object, possibly merged from several path-scoped records.
    Object(ObjectView<'f>),
    /// Composite list aggregated per index.
    CompositeList(ListView<'f>),
    /// Composite field written as `null` by the most recent defining chunk.
    CompositeNull,
    /// Selected, but no chunk ever wrote the field.
    CompositeUndefined(Provenance),
}

impl AggregateValue<'_> {
    /// Short name of the kind, for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregateValue::Scalar(_) => "scalar",
            AggregateValue::Object(_) => "object",
            AggregateValue::CompositeList(_) => "list",
            AggregateValue::CompositeNull => "null",
            AggregateValue::CompositeUndefined(_) => "undefined",
        }
    }

    /// Returns `true` for [`AggregateValue::CompositeUndefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, AggregateValue::CompositeUndefined(_))
    }
}

/// Where an undefined field was looked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    /// Node the field was read from.
    pub node: NodeKey,
    /// Store key of the missing field.
    pub field: FieldKey,
    /// Chunks consulted, oldest first.
    pub chunks: Vec<ChunkId>,
    /// Names of the operations that wrote those chunks, deduplicated.
    pub operations: Vec<Arc<str>>,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.field)?;
        if self.chunks.is_empty() {
            return f.write_str(" (no chunk holds the node)");
        }
        write!(f, " (not written by {} chunk", self.chunks.len())?;
        if self.chunks.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(" from ")?;
        for (idx, name) in self.operations.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

use crate::types::{ChunkId, FieldKey, NodeKey, OperationId};

/// Raw field value as written by one chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    /// Leaf value, including JSON `null` and scalar lists.
    Scalar(JsonValue),
    /// Composite field written as `null`.
    Null,
    /// Composite field pointing at a node record.
    Ref(NodeKey),
    /// Composite list.
    List(Vec<RawValue>),
}

impl RawValue {
    /// Visits every node reference inside the value.
    pub fn for_each_ref(&self, f: &mut impl FnMut(&NodeKey)) {
        match self {
            RawValue::Ref(key) => f(key),
            RawValue::List(items) => {
                for item in items {
                    item.for_each_ref(f);
                }
            }
            RawValue::Scalar(_) | RawValue::Null => {}
        }
    }
}

/// Field values one chunk holds for one node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeRecord {
    /// `__typename` observed in the result, if any.
    pub typename: Option<Arc<str>>,
    /// Values by store key.
    pub fields: FxHashMap<FieldKey, RawValue>,
}

impl NodeRecord {
    /// Empty record of a known type.
    pub fn typed(typename: Option<Arc<str>>) -> Self {
        Self {
            typename,
            fields: FxHashMap::default(),
        }
    }
}

/// Chunk contents produced by the write engine before admission.
#[derive(Clone, Debug)]
pub struct ChunkDraft {
    /// Node the chunk was written from.
    pub root: NodeKey,
    /// One record per node reachable from the root.
    pub nodes: FxHashMap<NodeKey, NodeRecord>,
}

impl ChunkDraft {
    /// Empty draft rooted at `root`.
    pub fn new(root: NodeKey) -> Self {
        Self {
            root,
            nodes: FxHashMap::default(),
        }
    }
}

/// One write's immutable contribution to the forest.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub(crate) id: ChunkId,
    pub(crate) sequence: u64,
    pub(crate) operation: OperationId,
    pub(crate) operation_name: Arc<str>,
    pub(crate) root: NodeKey,
    pub(crate) nodes: FxHashMap<NodeKey, NodeRecord>,
}

impl Chunk {
    /// Arena handle.
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Global write sequence; larger is more recent.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Operation that wrote the chunk.
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    /// Name of the writing operation, for diagnostics.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Node the chunk was written from.
    pub fn root(&self) -> &NodeKey {
        &self.root
    }

    /// Record for `key`, if the chunk mentions the node.
    pub fn record(&self, key: &NodeKey) -> Option<&NodeRecord> {
        self.nodes.get(key)
    }

    /// Iterates the node records.
    pub fn records(&self) -> impl Iterator<Item = (&NodeKey, &NodeRecord)> {
        self.nodes.iter()
    }

    /// Number of node records.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

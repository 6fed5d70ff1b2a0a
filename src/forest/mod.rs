//! Forest store: arena of immutable chunks plus the node and operation
//! indices.
//!
//! Writes never merge into existing chunks. Aggregation happens at read time,
//! which lets the store forget one write (an evicted operation) without
//! recomputing anything that depended on it.

mod chunk;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value as JsonValue;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::canonical::sorted_json;
use crate::descriptor::OperationDescriptor;
use crate::types::{ChunkId, NodeKey, OperationId};

pub use chunk::{Chunk, ChunkDraft, NodeRecord, RawValue};

/// Chunk handles ordered by write sequence (oldest first).
pub type ChunkList = SmallVec<[ChunkId; 2]>;

/// Result of a garbage-collection sweep over the forest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Node keys dropped from the index.
    pub reclaimed: Vec<NodeKey>,
    /// Chunks released because no record survived.
    pub released_chunks: usize,
}

/// Chunk arena with node → chunks and operation → chunks indices.
#[derive(Debug, Default)]
pub struct Forest {
    slots: Vec<Option<Chunk>>,
    free: Vec<u32>,
    next_sequence: u64,
    nodes: FxHashMap<NodeKey, ChunkList>,
    operations: FxHashMap<OperationId, ChunkList>,
}

impl Forest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty forest sized for roughly `operations` operations.
    pub fn with_capacity(operations: usize) -> Self {
        Self {
            slots: Vec::with_capacity(operations),
            free: Vec::new(),
            next_sequence: 0,
            nodes: FxHashMap::with_capacity_and_hasher(operations * 4, Default::default()),
            operations: FxHashMap::with_capacity_and_hasher(operations, Default::default()),
        }
    }

    /// Appends a chunk for `descriptor` and indexes every node it touches.
    ///
    /// # Panics
    /// Panics if the draft references a node it has no record for, or does not
    /// contain a record for its own root; both indicate a decomposition bug.
    pub fn admit(&mut self, descriptor: &OperationDescriptor, draft: ChunkDraft) -> ChunkId {
        assert!(
            draft.nodes.contains_key(&draft.root),
            "chunk for {} has no record for its root {}",
            descriptor.id(),
            draft.root
        );
        for record in draft.nodes.values() {
            for value in record.fields.values() {
                value.for_each_ref(&mut |target| {
                    assert!(
                        draft.nodes.contains_key(target),
                        "chunk for {} references {target} without a record",
                        descriptor.id()
                    );
                });
            }
        }

        let id = match self.free.pop() {
            Some(slot) => ChunkId(slot),
            None => {
                self.slots.push(None);
                ChunkId((self.slots.len() - 1) as u32)
            }
        };
        self.next_sequence += 1;
        for key in draft.nodes.keys() {
            self.nodes.entry(key.clone()).or_default().push(id);
        }
        self.operations.entry(descriptor.id()).or_default().push(id);
        let chunk = Chunk {
            id,
            sequence: self.next_sequence,
            operation: descriptor.id(),
            operation_name: Arc::from(descriptor.display_name()),
            root: draft.root,
            nodes: draft.nodes,
        };
        trace!(
            chunk = %id,
            operation = %chunk.operation,
            sequence = chunk.sequence,
            nodes = chunk.nodes.len(),
            "forest.store.admit"
        );
        self.slots[id.0 as usize] = Some(chunk);
        id
    }

    /// Chunks mentioning `key`, oldest first.
    pub fn lookup(&self, key: &NodeKey) -> &[ChunkId] {
        self.nodes.get(key).map(|list| list.as_slice()).unwrap_or(&[])
    }

    /// Chunks written by `operation`, oldest first.
    pub fn chunks_for(&self, operation: OperationId) -> &[ChunkId] {
        self.operations
            .get(&operation)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Resolves a chunk handle.
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Every record of `key`, oldest first.
    ///
    /// # Panics
    /// Panics if the node index points at a chunk that does not hold a record
    /// for `key`.
    pub fn records<'f>(
        &'f self,
        key: &NodeKey,
    ) -> impl Iterator<Item = (&'f Chunk, &'f NodeRecord)> + 'f {
        let key = key.clone();
        self.lookup(&key).iter().map(move |id| {
            let chunk = self
                .chunk(*id)
                .unwrap_or_else(|| panic!("forest index lists released {id} for {key}"));
            let record = chunk
                .record(&key)
                .unwrap_or_else(|| panic!("forest index lists {id} for {key} without a record"));
            (chunk, record)
        })
    }

    /// Returns `true` when any chunk holds a record for `key`.
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Indexed node keys.
    pub fn node_keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    /// Number of indexed node keys.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live chunks.
    pub fn chunk_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Operations with at least one live chunk.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Releases every chunk written by `operation`.
    ///
    /// Returns the node keys the released chunks touched.
    pub fn remove_operation(&mut self, operation: OperationId) -> FxHashSet<NodeKey> {
        let mut touched = FxHashSet::default();
        let Some(chunks) = self.operations.remove(&operation) else {
            return touched;
        };
        for id in chunks {
            touched.extend(self.release(id));
        }
        debug!(
            operation = %operation,
            nodes = touched.len(),
            "forest.store.remove_operation"
        );
        touched
    }

    /// Releases one chunk. Returns the node keys it touched.
    pub fn remove_chunk(&mut self, id: ChunkId) -> Vec<NodeKey> {
        let Some(operation) = self.chunk(id).map(Chunk::operation) else {
            return Vec::new();
        };
        if let Some(list) = self.operations.get_mut(&operation) {
            list.retain(|c| *c != id);
            if list.is_empty() {
                self.operations.remove(&operation);
            }
        }
        self.release(id)
    }

    /// Drops every record of `key`. Returns the number of records removed.
    pub fn remove_node(&mut self, key: &NodeKey) -> usize {
        let Some(chunks) = self.nodes.remove(key) else {
            return 0;
        };
        let mut removed = 0;
        for id in chunks {
            let emptied = match self.slot_mut(id) {
                Some(chunk) => {
                    if chunk.nodes.remove(key).is_some() {
                        removed += 1;
                    }
                    chunk.nodes.is_empty()
                }
                None => false,
            };
            if emptied {
                self.remove_chunk(id);
            }
        }
        removed
    }

    /// Removes `field_name` from the records of `key`.
    ///
    /// With `args = None` the field is removed under every argument set;
    /// otherwise only the entry whose canonical arguments match. An empty
    /// object or `null` matches the argument-less entry. Returns the number of
    /// field entries removed.
    pub fn remove_by_node_key_and_field(
        &mut self,
        key: &NodeKey,
        field_name: &str,
        args: Option<&JsonValue>,
    ) -> usize {
        let wanted: Option<Option<String>> = args.map(|args| match args {
            JsonValue::Null => None,
            JsonValue::Object(map) if map.is_empty() => None,
            other => Some(sorted_json(other)),
        });
        let chunks: ChunkList = self.nodes.get(key).cloned().unwrap_or_default();
        let mut removed = 0;
        for id in chunks {
            let Some(record) = self.slot_mut(id).and_then(|chunk| chunk.nodes.get_mut(key)) else {
                continue;
            };
            let before = record.fields.len();
            record.fields.retain(|field, _| {
                if &*field.name != field_name {
                    return true;
                }
                match &wanted {
                    None => false,
                    Some(expected) => expected.as_deref() != field.args.as_deref(),
                }
            });
            removed += before - record.fields.len();
        }
        removed
    }

    /// Keeps only records whose key is in `reachable`.
    pub fn retain_nodes(&mut self, reachable: &FxHashSet<NodeKey>) -> SweepOutcome {
        let doomed: Vec<NodeKey> = self
            .nodes
            .keys()
            .filter(|key| !reachable.contains(*key))
            .cloned()
            .collect();
        let mut outcome = SweepOutcome::default();
        let before = self.chunk_count();
        for key in doomed {
            self.remove_node(&key);
            outcome.reclaimed.push(key);
        }
        outcome.released_chunks = before - self.chunk_count();
        outcome
    }

    fn slot_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn release(&mut self, id: ChunkId) -> Vec<NodeKey> {
        let Some(chunk) = self.slots.get_mut(id.0 as usize).and_then(Option::take) else {
            return Vec::new();
        };
        self.free.push(id.0);
        let mut touched = Vec::with_capacity(chunk.nodes.len());
        for key in chunk.nodes.into_keys() {
            if let Some(list) = self.nodes.get_mut(&key) {
                list.retain(|c| *c != id);
                if list.is_empty() {
                    self.nodes.remove(&key);
                }
            }
            touched.push(key);
        }
        touched
    }
}

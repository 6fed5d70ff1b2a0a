//! Value resolution across chunks.
//!
//! Nothing is merged eagerly. An [`ObjectView`] borrows every record the
//! forest holds for a node (or for several path-scoped nodes standing in the
//! same position) and answers per-field questions on demand:
//!
//! * a leaf field takes the value of the most recent chunk that defines it;
//! * a list takes its length from the most recent defining chunk and
//!   aggregates each index over every chunk whose list reaches that index;
//! * an object field recurses into the referenced node's own chunk set, which
//!   may include chunks of other operations;
//! * a field no chunk defines is [`AggregateValue::CompositeUndefined`].

mod value;

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::forest::{Chunk, Forest, NodeRecord, RawValue};
use crate::types::{ChunkId, FieldKey, NodeKey};

pub use value::{AggregateValue, Provenance};

type Candidates<'f> = SmallVec<[(&'f Chunk, &'f RawValue); 4]>;

/// Lazily aggregated view of one logical object.
#[derive(Clone, Debug)]
pub struct ObjectView<'f> {
    forest: &'f Forest,
    keys: SmallVec<[NodeKey; 1]>,
    records: Vec<(&'f Chunk, &'f NodeRecord)>,
}

impl<'f> ObjectView<'f> {
    /// View of a single node.
    pub fn for_node(forest: &'f Forest, key: &NodeKey) -> Self {
        let mut keys = SmallVec::new();
        keys.push(key.clone());
        Self::merged(forest, keys)
    }

    fn merged(forest: &'f Forest, keys: SmallVec<[NodeKey; 1]>) -> Self {
        let mut records: Vec<(&'f Chunk, &'f NodeRecord)> = Vec::new();
        for key in &keys {
            records.extend(forest.records(key));
        }
        if keys.len() > 1 {
            records.sort_by_key(|(chunk, _)| chunk.sequence());
        }
        Self {
            forest,
            keys,
            records,
        }
    }

    /// Primary key: the node referenced by the most recent chunk.
    pub fn key(&self) -> &NodeKey {
        &self.keys[0]
    }

    /// Every node key merged into this view.
    pub fn keys(&self) -> &[NodeKey] {
        &self.keys
    }

    /// Returns `true` when no chunk holds a record for the view's nodes.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Chunks contributing to the view, oldest first.
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.records.iter().map(|(chunk, _)| chunk.id())
    }

    /// Concrete type: most recent observed `__typename`, else the type the
    /// key implies.
    pub fn typename(&self) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .find_map(|(_, record)| record.typename.as_deref())
            .or_else(|| self.keys[0].implied_typename())
    }

    /// Aggregated value of `field`.
    pub fn field(&self, field: &FieldKey) -> AggregateValue<'f> {
        let candidates: Candidates<'f> = self
            .records
            .iter()
            .rev()
            .filter_map(|&(chunk, record)| record.fields.get(field).map(|value| (chunk, value)))
            .collect();
        aggregate(self.forest, &candidates)
            .unwrap_or_else(|| AggregateValue::CompositeUndefined(self.provenance(field)))
    }

    /// Every store key any contributing record defines.
    pub fn field_keys(&self) -> Vec<&'f FieldKey> {
        let mut seen: FxHashSet<&'f FieldKey> = FxHashSet::default();
        let mut out = Vec::new();
        for &(_, record) in &self.records {
            for key in record.fields.keys() {
                if seen.insert(key) {
                    out.push(key);
                }
            }
        }
        out
    }

    pub(crate) fn provenance(&self, field: &FieldKey) -> Provenance {
        let mut operations: Vec<Arc<str>> = Vec::new();
        for (chunk, _) in &self.records {
            if !operations.iter().any(|name| **name == *chunk.operation_name()) {
                operations.push(Arc::from(chunk.operation_name()));
            }
        }
        Provenance {
            node: self.keys[0].clone(),
            field: field.clone(),
            chunks: self.chunk_ids().collect(),
            operations,
        }
    }
}

/// Lazily aggregated composite list.
#[derive(Clone, Debug)]
pub struct ListView<'f> {
    forest: &'f Forest,
    lists: SmallVec<[(&'f Chunk, &'f [RawValue]); 2]>,
}

impl<'f> ListView<'f> {
    /// Length asserted by the most recent defining chunk.
    pub fn len(&self) -> usize {
        self.lists.first().map_or(0, |(_, items)| items.len())
    }

    /// Returns `true` for an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregated item at `index`, or `None` past the asserted length.
    pub fn get(&self, index: usize) -> Option<AggregateValue<'f>> {
        if index >= self.len() {
            return None;
        }
        let candidates: Candidates<'f> = self
            .lists
            .iter()
            .filter_map(|&(chunk, items)| items.get(index).map(|item| (chunk, item)))
            .collect();
        aggregate(self.forest, &candidates)
    }

    /// Fresh iterator; every call aggregates again from the start.
    pub fn iter(&self) -> ListIter<'f, '_> {
        ListIter {
            view: self,
            next: 0,
        }
    }
}

impl<'f, 'v> IntoIterator for &'v ListView<'f> {
    type Item = AggregateValue<'f>;
    type IntoIter = ListIter<'f, 'v>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ListView`], aggregating one item per step.
#[derive(Debug)]
pub struct ListIter<'f, 'v> {
    view: &'v ListView<'f>,
    next: usize,
}

impl<'f> Iterator for ListIter<'f, '_> {
    type Item = AggregateValue<'f>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.view.get(self.next)?;
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ListIter<'_, '_> {}

/// Combines the candidates for one position, newest first.
///
/// Returns `None` when there is no candidate at all.
fn aggregate<'f>(
    forest: &'f Forest,
    candidates: &[(&'f Chunk, &'f RawValue)],
) -> Option<AggregateValue<'f>> {
    let &(_, newest) = candidates.first()?;
    let value = match newest {
        RawValue::Scalar(value) => AggregateValue::Scalar(value),
        RawValue::Null => AggregateValue::CompositeNull,
        RawValue::Ref(key) => {
            let mut keys: SmallVec<[NodeKey; 1]> = SmallVec::new();
            keys.push(key.clone());
            if key.is_scoped() {
                for (_, older) in &candidates[1..] {
                    match older {
                        RawValue::Ref(other) if other.is_scoped() => {
                            if !keys.contains(other) {
                                keys.push(other.clone());
                            }
                        }
                        _ => break,
                    }
                }
            }
            AggregateValue::Object(ObjectView::merged(forest, keys))
        }
        RawValue::List(_) => AggregateValue::CompositeList(ListView {
            forest,
            lists: candidates
                .iter()
                .map_while(|&(chunk, value)| match value {
                    RawValue::List(items) => Some((chunk, items.as_slice())),
                    _ => None,
                })
                .collect(),
        }),
    };
    Some(value)
}

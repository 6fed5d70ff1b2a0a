//! Decomposition of raw results into chunks.
//!
//! A raw result is walked along the operation's selections. Every object
//! becomes one node record; objects the key policy identifies are stored
//! under their entity key, the rest under a path-scoped key private to the
//! writing operation. Fields missing from the result are simply not written,
//! which leaves any older value in place for readers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::descriptor::{OperationDescriptor, ResolvedField};
use crate::document::{SelectionSetId, TYPENAME_FIELD};
use crate::error::{CacheError, Result};
use crate::forest::{ChunkDraft, NodeRecord, RawValue};
use crate::identity::{KeyPolicy, PossibleTypes};
use crate::types::{ChunkId, FieldKey, NodeKey, OperationId, PathStep};

/// Outcome of a write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Operation the result was written for.
    pub operation: OperationId,
    /// Chunk admitted to the forest, `None` when the operation is not cached.
    pub chunk: Option<ChunkId>,
    /// Whether the operation participates in caching.
    pub cached: bool,
    /// Node records in the new chunk.
    pub nodes_written: usize,
    /// Whether the result supplied every selected field.
    pub complete: bool,
    /// Operations whose cached read results were dropped.
    pub invalidated: Vec<OperationId>,
    /// Operations evicted by the admission.
    pub evicted: Vec<OperationId>,
}

/// A decomposed result, ready for admission.
#[derive(Debug)]
pub struct Decomposed {
    /// Chunk contents.
    pub draft: ChunkDraft,
    /// Whether every selected field was present.
    pub complete: bool,
}

/// Splits `result` into one record per object reachable from the root.
///
/// Fails with [`CacheError::MalformedResult`] when the result is not an
/// object.
pub fn decompose(
    descriptor: &OperationDescriptor,
    result: &JsonValue,
    policy: &dyn KeyPolicy,
    possible_types: &PossibleTypes,
) -> Result<Decomposed> {
    let JsonValue::Object(data) = result else {
        return Err(CacheError::MalformedResult {
            operation: descriptor.display_name().to_owned(),
            reason: format!("expected an object at the root, got {}", json_kind(result)),
        });
    };
    let root = descriptor.root_node_key().clone();
    let hint: Arc<str> = match root.implied_typename() {
        Some(typename) => Arc::from(typename),
        None => descriptor.root_type().clone(),
    };
    let mut decomposer = Decomposer {
        descriptor,
        policy,
        possible_types,
        draft: ChunkDraft::new(root.clone()),
        complete: true,
    };
    let sets = [descriptor.document().root()];
    decomposer.object(root, Some(hint), &sets, data, &[]);
    Ok(Decomposed {
        draft: decomposer.draft,
        complete: decomposer.complete,
    })
}

struct Decomposer<'a> {
    descriptor: &'a OperationDescriptor,
    policy: &'a dyn KeyPolicy,
    possible_types: &'a PossibleTypes,
    draft: ChunkDraft,
    complete: bool,
}

impl Decomposer<'_> {
    fn object(
        &mut self,
        key: NodeKey,
        hint: Option<Arc<str>>,
        sets: &[SelectionSetId],
        object: &Map<String, JsonValue>,
        path: &[PathStep],
    ) {
        let typename = observed_typename(object).map(Arc::from).or(hint);
        let fields = self
            .descriptor
            .resolve(sets, typename.as_deref(), self.possible_types);

        // Registered before descending so self references stay resolvable.
        let record = self.draft.nodes.entry(key.clone()).or_default();
        if typename.is_some() {
            record.typename = typename;
        }

        let mut values: Vec<(FieldKey, RawValue)> = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            if field.is_typename() {
                continue;
            }
            let Some(value) = object.get(&*field.response_key) else {
                self.complete = false;
                continue;
            };
            let raw = if field.is_leaf() {
                RawValue::Scalar(value.clone())
            } else {
                let mut child_path = path.to_vec();
                child_path.push(PathStep::Field(field.store_key.clone()));
                self.composite(field, value, child_path)
            };
            values.push((field.store_key.clone(), raw));
        }

        let record: &mut NodeRecord = self.draft.nodes.entry(key).or_default();
        record.fields.extend(values);
    }

    fn composite(&mut self, field: &ResolvedField, value: &JsonValue, path: Vec<PathStep>) -> RawValue {
        match value {
            JsonValue::Null => RawValue::Null,
            JsonValue::Array(items) => RawValue::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        let mut item_path = path.clone();
                        item_path.push(PathStep::Index(idx as u32));
                        self.composite(field, item, item_path)
                    })
                    .collect(),
            ),
            JsonValue::Object(object) => {
                let hint: Option<Arc<str>> = observed_typename(object)
                    .map(Arc::from)
                    .or_else(|| field.type_name.clone());
                let key = self
                    .policy
                    .identify(hint.as_deref(), object)
                    .unwrap_or_else(|| NodeKey::Scoped {
                        operation: self.descriptor.id(),
                        path: Arc::from(path.as_slice()),
                    });
                self.object(key.clone(), hint, &field.selections, object, &path);
                RawValue::Ref(key)
            }
            // Shape mismatch; readers treat it as missing.
            other => RawValue::Scalar(other.clone()),
        }
    }
}

fn observed_typename(object: &Map<String, JsonValue>) -> Option<&str> {
    object.get(TYPENAME_FIELD).and_then(JsonValue::as_str)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

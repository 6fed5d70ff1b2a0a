//! Read/diff engine.
//!
//! Walks an operation's selections depth-first against the forest through
//! the aggregation engine. Fields no chunk defines are left out of the data
//! and reported as missing; in a non-null position they fail the read.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::aggregate::{AggregateValue, ObjectView, Provenance};
use crate::descriptor::{OperationDescriptor, ResolvedField};
use crate::document::SelectionSetId;
use crate::error::{CacheError, Result};
use crate::forest::Forest;
use crate::identity::PossibleTypes;
use crate::types::{FieldKey, NodeKey, Path};

/// Diagnostic attached to a missing path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingField {
    /// Response path of the field.
    pub path: Path,
    /// Where the field was looked for.
    pub provenance: Provenance,
}

/// Outcome of a read.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    /// Selected data; missing fields are omitted.
    pub data: JsonValue,
    /// `true` iff nothing is missing.
    pub complete: bool,
    /// Paths of selected fields no chunk defines, in traversal order.
    pub missing: Vec<Path>,
    /// One diagnostic per missing path.
    pub diagnostics: Vec<MissingField>,
    pub(crate) touched: FxHashSet<NodeKey>,
}

impl ReadResult {
    /// Node keys the read visited.
    pub fn touched(&self) -> impl Iterator<Item = &NodeKey> {
        self.touched.iter()
    }
}

/// Reads `descriptor` from `forest`.
///
/// Fails with [`CacheError::MissingRequiredField`] at the first non-null
/// field that resolves to nothing.
pub fn read(
    forest: &Forest,
    descriptor: &OperationDescriptor,
    possible_types: &PossibleTypes,
) -> Result<ReadResult> {
    let mut reader = Reader {
        descriptor,
        possible_types,
        missing: Vec::new(),
        diagnostics: Vec::new(),
        touched: FxHashSet::default(),
    };
    let root = ObjectView::for_node(forest, descriptor.root_node_key());
    let hint: Option<Arc<str>> = Some(descriptor.root_type().clone());
    let data = reader.object(&root, &[descriptor.document().root()], hint, &Path::root())?;
    Ok(ReadResult {
        data,
        complete: reader.missing.is_empty(),
        missing: reader.missing,
        diagnostics: reader.diagnostics,
        touched: reader.touched,
    })
}

struct Reader<'a> {
    descriptor: &'a OperationDescriptor,
    possible_types: &'a PossibleTypes,
    missing: Vec<Path>,
    diagnostics: Vec<MissingField>,
    touched: FxHashSet<NodeKey>,
}

impl Reader<'_> {
    fn object(
        &mut self,
        view: &ObjectView<'_>,
        sets: &[SelectionSetId],
        hint: Option<Arc<str>>,
        path: &Path,
    ) -> Result<JsonValue> {
        self.touched.extend(view.keys().iter().cloned());
        let typename: Option<Arc<str>> = view.typename().map(Arc::from).or(hint);
        let fields = self
            .descriptor
            .resolve(sets, typename.as_deref(), self.possible_types);

        let mut out = Map::new();
        for field in fields.iter() {
            let field_path = path.field(&*field.response_key);
            if field.is_typename() {
                match &typename {
                    Some(typename) => {
                        out.insert(field.response_key.to_string(), JsonValue::from(&**typename));
                    }
                    None => self.missing(field, view.provenance(&field.store_key), field_path)?,
                }
                continue;
            }
            let value = view.field(&field.store_key);
            if let Some(value) = self.value(view, field, value, &field_path)? {
                out.insert(field.response_key.to_string(), value);
            }
        }
        Ok(JsonValue::Object(out))
    }

    fn value(
        &mut self,
        parent: &ObjectView<'_>,
        field: &ResolvedField,
        value: AggregateValue<'_>,
        path: &Path,
    ) -> Result<Option<JsonValue>> {
        let out = match value {
            AggregateValue::CompositeUndefined(provenance) => {
                self.missing(field, provenance, path.clone())?;
                return Ok(None);
            }
            AggregateValue::CompositeNull => JsonValue::Null,
            AggregateValue::Scalar(value) if field.is_leaf() => value.clone(),
            AggregateValue::Object(view) if !field.is_leaf() => {
                self.object(&view, &field.selections, field.type_name.clone(), path)?
            }
            AggregateValue::CompositeList(list) if !field.is_leaf() => {
                let mut items = Vec::with_capacity(list.len());
                for (idx, item) in list.iter().enumerate() {
                    let item = self.value(parent, field, item, &path.index(idx))?;
                    items.push(item.unwrap_or(JsonValue::Null));
                }
                JsonValue::Array(items)
            }
            // Stored shape disagrees with the selection.
            _ => {
                self.missing(field, parent.provenance(&field.store_key), path.clone())?;
                return Ok(None);
            }
        };
        Ok(Some(out))
    }

    fn missing(&mut self, field: &ResolvedField, provenance: Provenance, path: Path) -> Result<()> {
        debug!(
            operation = %self.descriptor.id(),
            path = %path,
            field = %field.store_key,
            non_null = field.non_null,
            "forest.read.missing"
        );
        if field.non_null {
            return Err(CacheError::MissingRequiredField {
                operation: self.descriptor.display_name().to_owned(),
                path,
            });
        }
        self.missing.push(path.clone());
        self.diagnostics.push(MissingField { path, provenance });
        Ok(())
    }
}

/// Missing fields of `result` grouped by store key, for diagnostics.
pub fn missing_store_keys(result: &ReadResult) -> Vec<(NodeKey, FieldKey)> {
    let mut seen = FxHashSet::default();
    result
        .diagnostics
        .iter()
        .map(|d| (d.provenance.node.clone(), d.provenance.field.clone()))
        .filter(|pair| seen.insert(pair.clone()))
        .collect()
}

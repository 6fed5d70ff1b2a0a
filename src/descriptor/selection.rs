//! Flattening of selection sets into per-type field lists.
//!
//! Fragments, `@skip`/`@include` and duplicate response keys are resolved
//! once per (selection sets, concrete type) pair and memoized on the
//! operation descriptor.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value as JsonValue};
use smallvec::SmallVec;
use tracing::debug;

use crate::canonical::sorted_json;
use crate::document::{ArgValue, Directive, Document, Selection, SelectionSetId, TYPENAME_FIELD};
use crate::identity::PossibleTypes;
use crate::types::FieldKey;

/// Selection sets merged under one response key.
pub type SelectionSets = SmallVec<[SelectionSetId; 1]>;

/// Field selection after fragments and directives have been applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField {
    /// Key in raw results and read data.
    pub response_key: Arc<str>,
    /// Key in chunk records.
    pub store_key: FieldKey,
    /// Annotated named return type.
    pub type_name: Option<Arc<str>>,
    /// Whether any merged occurrence is non-null.
    pub non_null: bool,
    /// Sub-selections of every merged occurrence; empty for leaf fields.
    pub selections: SelectionSets,
}

impl ResolvedField {
    /// Returns `true` for fields without sub-selection.
    pub fn is_leaf(&self) -> bool {
        self.selections.is_empty()
    }

    /// Returns `true` for the `__typename` meta field.
    pub fn is_typename(&self) -> bool {
        &*self.store_key.name == TYPENAME_FIELD
    }
}

pub(crate) fn resolve_fields(
    document: &Document,
    sets: &[SelectionSetId],
    typename: Option<&str>,
    variables: &Map<String, JsonValue>,
    possible_types: &PossibleTypes,
) -> Vec<ResolvedField> {
    let mut out = Resolver {
        document,
        typename,
        variables,
        possible_types,
        fields: Vec::new(),
        by_response_key: FxHashMap::default(),
        spreads: FxHashSet::default(),
    };
    for set in sets {
        out.visit(*set);
    }
    out.fields
}

struct Resolver<'a> {
    document: &'a Document,
    typename: Option<&'a str>,
    variables: &'a Map<String, JsonValue>,
    possible_types: &'a PossibleTypes,
    fields: Vec<ResolvedField>,
    by_response_key: FxHashMap<Arc<str>, usize>,
    spreads: FxHashSet<&'a str>,
}

impl<'a> Resolver<'a> {
    fn visit(&mut self, set: SelectionSetId) {
        let document = self.document;
        for selection in &document.selection_set(set).selections {
            match selection {
                Selection::Field(field) => {
                    if !is_included(&field.directives, self.variables) {
                        continue;
                    }
                    let response_key: Arc<str> = Arc::from(field.response_key());
                    if let Some(&idx) = self.by_response_key.get(&response_key) {
                        let existing = &mut self.fields[idx];
                        existing.non_null |= field.non_null;
                        if let Some(child) = field.selection_set {
                            if !existing.selections.contains(&child) {
                                existing.selections.push(child);
                            }
                        }
                        continue;
                    }
                    let mut selections = SelectionSets::new();
                    if let Some(child) = field.selection_set {
                        selections.push(child);
                    }
                    self.by_response_key
                        .insert(response_key.clone(), self.fields.len());
                    self.fields.push(ResolvedField {
                        response_key,
                        store_key: store_key(&field.name, &field.arguments, self.variables),
                        type_name: field.type_name.as_deref().map(Arc::from),
                        non_null: field.non_null,
                        selections,
                    });
                }
                Selection::InlineFragment {
                    type_condition,
                    directives,
                    selection_set,
                } => {
                    if !is_included(directives, self.variables) {
                        continue;
                    }
                    let applies = type_condition
                        .as_deref()
                        .map_or(true, |cond| self.possible_types.matches(cond, self.typename));
                    if applies {
                        self.visit(*selection_set);
                    }
                }
                Selection::FragmentSpread { name, directives } => {
                    if !is_included(directives, self.variables) {
                        continue;
                    }
                    let Some(fragment) = document.fragment(name) else {
                        debug!(fragment = %name, "forest.selection.unknown_fragment");
                        continue;
                    };
                    if !self.spreads.insert(fragment.name.as_str()) {
                        continue;
                    }
                    if self
                        .possible_types
                        .matches(&fragment.type_condition, self.typename)
                    {
                        self.visit(fragment.selection_set);
                    }
                    self.spreads.remove(fragment.name.as_str());
                }
            }
        }
    }
}

/// Computes the store key of a field for the given variables.
///
/// Arguments bound to undefined variables are omitted; a field whose
/// arguments all resolve to nothing keys like an argument-less field.
pub fn store_key(
    name: &str,
    arguments: &[(String, ArgValue)],
    variables: &Map<String, JsonValue>,
) -> FieldKey {
    let mut resolved = Map::new();
    for (arg, value) in arguments {
        if let Some(value) = value.resolve(variables) {
            resolved.insert(arg.clone(), value);
        }
    }
    if resolved.is_empty() {
        FieldKey::plain(name)
    } else {
        FieldKey::with_args(name, sorted_json(&JsonValue::Object(resolved)))
    }
}

fn is_included(directives: &[Directive], variables: &Map<String, JsonValue>) -> bool {
    for directive in directives {
        let condition = || {
            directive
                .argument("if")
                .and_then(|value| value.resolve(variables))
                .and_then(|value| value.as_bool())
                .unwrap_or(false)
        };
        match directive.name.as_str() {
            "skip" if condition() => return false,
            "include" if !condition() => return false,
            _ => {}
        }
    }
    true
}

//! Already-parsed, type-annotated operation documents.
//!
//! Documents are produced by an external parser/validator (or by
//! [`DocumentBuilder`] in tests and embedding code). Selection sets live in an
//! arena owned by the [`Document`] and are addressed by [`SelectionSetId`], so
//! resolved selection metadata can be memoized per set without pointer
//! identity tricks.

mod builder;

use std::hash::Hasher;

use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use xxhash_rust::xxh64::Xxh64;

use crate::types::OperationKind;

pub use builder::{DocumentBuilder, FieldBuilder, SelectionSetBuilder};

/// Name of the operation-level directive controlling cache participation.
pub const CACHE_DIRECTIVE: &str = "cache";
/// Argument of [`CACHE_DIRECTIVE`] listing identity-defining variables.
pub const KEY_VARS_ARGUMENT: &str = "keyVars";
/// Meta field resolved from node identity instead of stored data.
pub const TYPENAME_FIELD: &str = "__typename";

/// Index of a selection set inside its document arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionSetId(pub u32);

/// Argument or directive value as written in the document.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// `null` literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Enum literal, stored by name.
    Enum(String),
    /// Reference to an operation variable.
    Variable(String),
    /// List literal.
    List(Vec<ArgValue>),
    /// Object literal in source order.
    Object(Vec<(String, ArgValue)>),
}

impl ArgValue {
    /// Shorthand for a variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        ArgValue::Variable(name.into())
    }

    /// Resolves the value against variables.
    ///
    /// Returns `None` when the value is (or, for composites, directly is) a
    /// reference to an undefined variable.
    pub fn resolve(&self, variables: &serde_json::Map<String, JsonValue>) -> Option<JsonValue> {
        match self {
            ArgValue::Null => Some(JsonValue::Null),
            ArgValue::Bool(v) => Some(JsonValue::Bool(*v)),
            ArgValue::Int(v) => Some(JsonValue::from(*v)),
            ArgValue::Float(v) => Some(
                serde_json::Number::from_f64(*v)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null),
            ),
            ArgValue::String(v) | ArgValue::Enum(v) => Some(JsonValue::String(v.clone())),
            ArgValue::Variable(name) => variables.get(name).cloned(),
            ArgValue::List(items) => Some(JsonValue::Array(
                items
                    .iter()
                    .map(|item| item.resolve(variables).unwrap_or(JsonValue::Null))
                    .collect(),
            )),
            ArgValue::Object(entries) => {
                let mut map = serde_json::Map::new();
                for (name, value) in entries {
                    if let Some(resolved) = value.resolve(variables) {
                        map.insert(name.clone(), resolved);
                    }
                }
                Some(JsonValue::Object(map))
            }
        }
    }

    fn hash_into(&self, hasher: &mut Xxh64) {
        match self {
            ArgValue::Null => hasher.write_u8(0),
            ArgValue::Bool(v) => {
                hasher.write_u8(1);
                hasher.write_u8(u8::from(*v));
            }
            ArgValue::Int(v) => {
                hasher.write_u8(2);
                hasher.write_i64(*v);
            }
            ArgValue::Float(v) => {
                hasher.write_u8(3);
                hasher.write_u64(v.to_bits());
            }
            ArgValue::String(v) => {
                hasher.write_u8(4);
                write_str(hasher, v);
            }
            ArgValue::Enum(v) => {
                hasher.write_u8(5);
                write_str(hasher, v);
            }
            ArgValue::Variable(v) => {
                hasher.write_u8(6);
                write_str(hasher, v);
            }
            ArgValue::List(items) => {
                hasher.write_u8(7);
                hasher.write_u64(items.len() as u64);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            ArgValue::Object(entries) => {
                hasher.write_u8(8);
                hasher.write_u64(entries.len() as u64);
                for (name, value) in entries {
                    write_str(hasher, name);
                    value.hash_into(hasher);
                }
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::String(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

/// Directive application, e.g. `@include(if: $withText)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    /// Directive name without the `@`.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<(String, ArgValue)>,
}

impl Directive {
    /// Creates a directive without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Adds an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    /// Looks up an argument by name.
    pub fn argument(&self, name: &str) -> Option<&ArgValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }

    /// `@skip(if: ...)`.
    pub fn skip(condition: impl Into<ArgValue>) -> Self {
        Self::new("skip").arg("if", condition)
    }

    /// `@include(if: ...)`.
    pub fn include(condition: impl Into<ArgValue>) -> Self {
        Self::new("include").arg("if", condition)
    }
}

/// Declared operation variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDefinition {
    /// Variable name without the `$`.
    pub name: String,
    /// Declared default, if any.
    pub default_value: Option<JsonValue>,
}

/// Field selection with its type annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldNode {
    /// Schema field name.
    pub name: String,
    /// Optional response alias.
    pub alias: Option<String>,
    /// Arguments in source order.
    pub arguments: Vec<(String, ArgValue)>,
    /// Field-level directives.
    pub directives: Vec<Directive>,
    /// Named return type (unwrapped from list/non-null wrappers), if known.
    pub type_name: Option<String>,
    /// Whether the field's type is non-null at this position.
    pub non_null: bool,
    /// Sub-selection for composite fields.
    pub selection_set: Option<SelectionSetId>,
}

impl FieldNode {
    /// Alias when present, field name otherwise.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Entry of a selection set.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Field selection.
    Field(FieldNode),
    /// Inline fragment `... on Type { ... }`.
    InlineFragment {
        /// Optional type condition.
        type_condition: Option<String>,
        /// Fragment-level directives.
        directives: Vec<Directive>,
        /// Nested selections.
        selection_set: SelectionSetId,
    },
    /// Named fragment spread `...Name`.
    FragmentSpread {
        /// Fragment name.
        name: String,
        /// Spread-level directives.
        directives: Vec<Directive>,
    },
}

/// Ordered list of selections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSet {
    /// Selections in source order.
    pub selections: Vec<Selection>,
}

/// Named fragment definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentDefinition {
    /// Fragment name.
    pub name: String,
    /// Type the fragment applies to.
    pub type_condition: String,
    /// Fragment body.
    pub selection_set: SelectionSetId,
}

/// One operation plus the fragments it uses.
#[derive(Debug, PartialEq)]
pub struct Document {
    kind: OperationKind,
    name: Option<String>,
    variables: Vec<VariableDefinition>,
    directives: Vec<Directive>,
    root: SelectionSetId,
    fragments: FxHashMap<String, FragmentDefinition>,
    sets: Vec<SelectionSet>,
    fingerprint: u64,
}

impl Document {
    pub(crate) fn from_parts(
        kind: OperationKind,
        name: Option<String>,
        variables: Vec<VariableDefinition>,
        directives: Vec<Directive>,
        root: SelectionSetId,
        fragments: FxHashMap<String, FragmentDefinition>,
        sets: Vec<SelectionSet>,
    ) -> Self {
        let mut doc = Self {
            kind,
            name,
            variables,
            directives,
            root,
            fragments,
            sets,
            fingerprint: 0,
        };
        doc.fingerprint = doc.compute_fingerprint();
        doc
    }

    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Operation name, if named.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for diagnostics.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Declared variables in declaration order.
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Operation-level directives.
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Looks up an operation-level directive by name.
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    /// Root selection set.
    pub fn root(&self) -> SelectionSetId {
        self.root
    }

    /// Resolves a selection set handle.
    ///
    /// # Panics
    /// Panics if the handle belongs to a different document.
    pub fn selection_set(&self, id: SelectionSetId) -> &SelectionSet {
        &self.sets[id.0 as usize]
    }

    /// Looks up a fragment definition.
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.get(name)
    }

    /// Deterministic structural hash of the document.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write_u8(match self.kind {
            OperationKind::Query => 0,
            OperationKind::Mutation => 1,
            OperationKind::Subscription => 2,
        });
        write_str(&mut hasher, self.name.as_deref().unwrap_or(""));
        hasher.write_u64(self.variables.len() as u64);
        for var in &self.variables {
            write_str(&mut hasher, &var.name);
            match &var.default_value {
                Some(value) => write_str(&mut hasher, &value.to_string()),
                None => hasher.write_u8(0xff),
            }
        }
        hash_directives(&mut hasher, &self.directives);
        self.hash_set(&mut hasher, self.root);
        let mut names: Vec<&String> = self.fragments.keys().collect();
        names.sort();
        for name in names {
            let fragment = &self.fragments[name];
            write_str(&mut hasher, &fragment.name);
            write_str(&mut hasher, &fragment.type_condition);
            self.hash_set(&mut hasher, fragment.selection_set);
        }
        hasher.finish()
    }

    fn hash_set(&self, hasher: &mut Xxh64, id: SelectionSetId) {
        let set = self.selection_set(id);
        hasher.write_u64(set.selections.len() as u64);
        for selection in &set.selections {
            match selection {
                Selection::Field(field) => {
                    hasher.write_u8(b'f');
                    write_str(hasher, &field.name);
                    write_str(hasher, field.alias.as_deref().unwrap_or(""));
                    hasher.write_u64(field.arguments.len() as u64);
                    for (name, value) in &field.arguments {
                        write_str(hasher, name);
                        value.hash_into(hasher);
                    }
                    hash_directives(hasher, &field.directives);
                    write_str(hasher, field.type_name.as_deref().unwrap_or(""));
                    hasher.write_u8(u8::from(field.non_null));
                    match field.selection_set {
                        Some(child) => self.hash_set(hasher, child),
                        None => hasher.write_u8(0xff),
                    }
                }
                Selection::InlineFragment {
                    type_condition,
                    directives,
                    selection_set,
                } => {
                    hasher.write_u8(b'i');
                    write_str(hasher, type_condition.as_deref().unwrap_or(""));
                    hash_directives(hasher, directives);
                    self.hash_set(hasher, *selection_set);
                }
                Selection::FragmentSpread { name, directives } => {
                    hasher.write_u8(b's');
                    write_str(hasher, name);
                    hash_directives(hasher, directives);
                }
            }
        }
    }
}

fn hash_directives(hasher: &mut Xxh64, directives: &[Directive]) {
    hasher.write_u64(directives.len() as u64);
    for directive in directives {
        write_str(hasher, &directive.name);
        hasher.write_u64(directive.arguments.len() as u64);
        for (name, value) in &directive.arguments {
            write_str(hasher, name);
            value.hash_into(hasher);
        }
    }
}

fn write_str(hasher: &mut Xxh64, value: &str) {
    hasher.write_u64(value.len() as u64);
    hasher.write(value.as_bytes());
}

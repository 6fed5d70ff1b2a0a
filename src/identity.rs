//! Entity identity extraction.
//!
//! A [`KeyPolicy`] decides which result objects participate in
//! cross-operation sharing. Objects without identity are stored under a
//! path-scoped key private to the operation that wrote them.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value as JsonValue};

use crate::canonical::sorted_json;
use crate::types::NodeKey;

/// Strategy mapping a result object to its normalized identity.
pub trait KeyPolicy: Send + Sync {
    /// Returns the entity key for `object`, or `None` when the object does not
    /// participate in identity.
    ///
    /// `typename` is the object's `__typename` when selected, otherwise the
    /// field's annotated return type.
    fn identify(&self, typename: Option<&str>, object: &Map<String, JsonValue>) -> Option<NodeKey>;
}

/// Default policy: `typename` plus the `id` field.
///
/// Types can override the identifying fields or opt out of identity
/// altogether.
#[derive(Clone, Debug)]
pub struct DefaultKeyPolicy {
    id_field: String,
    key_fields: FxHashMap<String, Vec<String>>,
    unidentified: FxHashSet<String>,
}

impl Default for DefaultKeyPolicy {
    fn default() -> Self {
        Self {
            id_field: "id".to_owned(),
            key_fields: FxHashMap::default(),
            unidentified: FxHashSet::default(),
        }
    }
}

impl DefaultKeyPolicy {
    /// Creates the default `typename + id` policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different default identifying field.
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Identifies `typename` by the given fields instead of the default one.
    pub fn key_fields<I, S>(mut self, typename: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields
            .insert(typename.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// Excludes `typename` from identity.
    pub fn without_identity(mut self, typename: impl Into<String>) -> Self {
        self.unidentified.insert(typename.into());
        self
    }
}

impl KeyPolicy for DefaultKeyPolicy {
    fn identify(&self, typename: Option<&str>, object: &Map<String, JsonValue>) -> Option<NodeKey> {
        let typename = typename?;
        if self.unidentified.contains(typename) {
            return None;
        }
        let id = match self.key_fields.get(typename) {
            Some(fields) => composite_id(fields, object)?,
            None => scalar_id(object.get(&self.id_field)?)?,
        };
        Some(NodeKey::entity(Arc::<str>::from(typename), id))
    }
}

fn scalar_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn composite_id(fields: &[String], object: &Map<String, JsonValue>) -> Option<String> {
    if let [single] = fields {
        return scalar_id(object.get(single)?);
    }
    let mut parts = Map::new();
    for field in fields {
        match object.get(field) {
            Some(JsonValue::Null) | None => return None,
            Some(value) => {
                parts.insert(field.clone(), value.clone());
            }
        }
    }
    Some(sorted_json(&JsonValue::Object(parts)))
}

/// Abstract type → possible concrete types, used for fragment matching.
#[derive(Clone, Debug, Default)]
pub struct PossibleTypes {
    map: FxHashMap<String, FxHashSet<String>>,
}

impl PossibleTypes {
    /// Creates an empty mapping; only exact type conditions match.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the concrete types of an interface or union.
    pub fn insert<I, S>(&mut self, abstract_type: impl Into<String>, concrete: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map
            .entry(abstract_type.into())
            .or_default()
            .extend(concrete.into_iter().map(Into::into));
    }

    /// Returns `true` when a fragment conditioned on `condition` applies to an
    /// object of type `typename`.
    ///
    /// Objects of unknown type match every condition.
    pub fn matches(&self, condition: &str, typename: Option<&str>) -> bool {
        match typename {
            None => true,
            Some(typename) if typename == condition => true,
            Some(typename) => self
                .map
                .get(condition)
                .is_some_and(|concrete| concrete.contains(typename)),
        }
    }
}

//! Operation descriptors: the canonical identity of one operation instance.
//!
//! A descriptor is built once per distinct (document, variables) pair. Its
//! variables key is canonical regardless of property insertion order, so two
//! requests that differ only in key order share one descriptor.

mod selection;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value as JsonValue};
use tracing::trace;

use crate::canonical::sorted_json;
use crate::document::{ArgValue, Document, SelectionSetId, CACHE_DIRECTIVE, KEY_VARS_ARGUMENT};
use crate::error::{CacheError, Result};
use crate::identity::PossibleTypes;
use crate::types::{NodeKey, OperationId, OperationKind};

pub use selection::{store_key, ResolvedField, SelectionSets};

/// Caller-facing description of an operation to read or write.
#[derive(Clone, Debug)]
pub struct OperationRequest {
    /// Parsed, type-annotated document.
    pub document: Arc<Document>,
    /// Variables as supplied; must be a JSON object or null.
    pub variables: JsonValue,
    /// Explicit variables-with-defaults, bypassing default application.
    pub variables_with_defaults: Option<Map<String, JsonValue>>,
    /// Explicit variables key, bypassing canonical rendering.
    pub variables_key: Option<String>,
    /// Explicit root type name.
    pub root_type: Option<String>,
    /// Explicit root node, e.g. an entity for fragment reads.
    pub root_node_key: Option<NodeKey>,
}

impl OperationRequest {
    /// Request without variables.
    pub fn new(document: Arc<Document>) -> Self {
        Self {
            document,
            variables: JsonValue::Null,
            variables_with_defaults: None,
            variables_key: None,
            root_type: None,
            root_node_key: None,
        }
    }

    /// Sets the supplied variables.
    pub fn variables(mut self, variables: JsonValue) -> Self {
        self.variables = variables;
        self
    }

    /// Overrides the computed variables-with-defaults.
    pub fn variables_with_defaults(mut self, variables: Map<String, JsonValue>) -> Self {
        self.variables_with_defaults = Some(variables);
        self
    }

    /// Overrides the computed variables key.
    pub fn variables_key(mut self, key: impl Into<String>) -> Self {
        self.variables_key = Some(key.into());
        self
    }

    /// Overrides the root type name.
    pub fn root_type(mut self, root_type: impl Into<String>) -> Self {
        self.root_type = Some(root_type.into());
        self
    }

    /// Overrides the root node key.
    pub fn root_node_key(mut self, key: NodeKey) -> Self {
        self.root_node_key = Some(key);
        self
    }
}

/// Identity of an operation instance used to find its descriptor.
///
/// Hashes the document by fingerprint but compares it structurally, so
/// documents whose fingerprints collide never share a descriptor.
#[derive(Clone, Debug)]
pub struct OperationKey {
    /// Source document.
    pub document: Arc<Document>,
    /// Root node the operation is read from.
    pub root: NodeKey,
    /// Variables key, restricted to key variables when declared.
    pub variables: String,
}

impl PartialEq for OperationKey {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.variables == other.variables
            && (Arc::ptr_eq(&self.document, &other.document)
                || (self.document.fingerprint() == other.document.fingerprint()
                    && *self.document == *other.document))
    }
}

impl Eq for OperationKey {}

impl Hash for OperationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.document.fingerprint().hash(state);
        self.root.hash(state);
        self.variables.hash(state);
    }
}

/// Monotonic generator of operation ids.
#[derive(Debug, Default)]
pub struct OperationIdGen {
    next: u64,
}

impl OperationIdGen {
    /// Starts at id 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> OperationId {
        let id = OperationId(self.next.max(1));
        self.next = id.0 + 1;
        id
    }
}

/// Descriptor fields computed before an id is assigned.
#[derive(Debug)]
pub struct PreparedOperation {
    document: Arc<Document>,
    root_type: Arc<str>,
    root_node_key: NodeKey,
    variables: Map<String, JsonValue>,
    variables_with_defaults: Map<String, JsonValue>,
    variables_key: String,
    key_variables: Option<Vec<String>>,
    cache: bool,
    key: OperationKey,
}

impl PreparedOperation {
    /// Computes everything except the id.
    ///
    /// Fails with [`CacheError::Configuration`] when the `@cache` annotation is
    /// malformed or the variables are not an object.
    pub fn prepare(request: &OperationRequest) -> Result<Self> {
        let document = request.document.clone();
        let variables = match &request.variables {
            JsonValue::Null => Map::new(),
            JsonValue::Object(map) => map.clone(),
            other => {
                return Err(CacheError::configuration(format!(
                    "variables of operation {} must be an object, got {other}",
                    document.display_name()
                )))
            }
        };
        let variables_with_defaults = match &request.variables_with_defaults {
            Some(explicit) => explicit.clone(),
            None => apply_defaults(&document, &variables),
        };
        let variables_key = match &request.variables_key {
            Some(explicit) => explicit.clone(),
            None => variables_key(&document, &variables_with_defaults),
        };
        let key_variables = key_variables(&document)?;
        let identity_key = match &key_variables {
            Some(names) => names
                .iter()
                .map(|name| render_pair(name, variables_with_defaults.get(name)))
                .collect::<String>(),
            None => variables_key.clone(),
        };
        let kind = document.kind();
        let cache = match kind {
            OperationKind::Query | OperationKind::Subscription => true,
            OperationKind::Mutation => document.directive(CACHE_DIRECTIVE).is_some(),
        };
        let root_type: Arc<str> = Arc::from(
            request
                .root_type
                .as_deref()
                .unwrap_or_else(|| kind.default_root_type()),
        );
        let root_node_key = request
            .root_node_key
            .clone()
            .unwrap_or(NodeKey::Root(kind));
        let key = OperationKey {
            document: document.clone(),
            root: root_node_key.clone(),
            variables: identity_key,
        };
        Ok(Self {
            document,
            root_type,
            root_node_key,
            variables,
            variables_with_defaults,
            variables_key,
            key_variables,
            cache,
            key,
        })
    }

    /// Identity used to look up an existing descriptor.
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Finalizes the descriptor with an id.
    pub fn into_descriptor(self, id: OperationId) -> OperationDescriptor {
        trace!(
            operation = %id,
            name = self.document.display_name(),
            variables_key = %self.variables_key,
            "forest.descriptor.created"
        );
        OperationDescriptor {
            id,
            document: self.document,
            root_type: self.root_type,
            root_node_key: self.root_node_key,
            variables: self.variables,
            variables_with_defaults: self.variables_with_defaults,
            variables_key: self.variables_key,
            key_variables: self.key_variables,
            cache: self.cache,
            key: self.key,
            selections: Mutex::new(FxHashMap::default()),
        }
    }
}

type SelectionCacheKey = (SelectionSets, Option<Arc<str>>);

/// Canonical description of one operation instance.
#[derive(Debug)]
pub struct OperationDescriptor {
    id: OperationId,
    document: Arc<Document>,
    root_type: Arc<str>,
    root_node_key: NodeKey,
    variables: Map<String, JsonValue>,
    variables_with_defaults: Map<String, JsonValue>,
    variables_key: String,
    key_variables: Option<Vec<String>>,
    cache: bool,
    key: OperationKey,
    selections: Mutex<FxHashMap<SelectionCacheKey, Arc<[ResolvedField]>>>,
}

impl OperationDescriptor {
    /// Builds a descriptor in one step.
    pub fn build(request: &OperationRequest, ids: &mut OperationIdGen) -> Result<Self> {
        let prepared = PreparedOperation::prepare(request)?;
        Ok(prepared.into_descriptor(ids.next_id()))
    }

    /// Monotonic id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Source document.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.document.kind()
    }

    /// Name for diagnostics.
    pub fn display_name(&self) -> &str {
        self.document.display_name()
    }

    /// Root object type name.
    pub fn root_type(&self) -> &Arc<str> {
        &self.root_type
    }

    /// Root store key.
    pub fn root_node_key(&self) -> &NodeKey {
        &self.root_node_key
    }

    /// Variables as supplied.
    pub fn variables(&self) -> &Map<String, JsonValue> {
        &self.variables
    }

    /// Variables merged with declared defaults.
    pub fn variables_with_defaults(&self) -> &Map<String, JsonValue> {
        &self.variables_with_defaults
    }

    /// Canonical variables key.
    pub fn variables_key(&self) -> &str {
        &self.variables_key
    }

    /// Explicit identity-defining variables, when declared.
    pub fn key_variables(&self) -> Option<&[String]> {
        self.key_variables.as_deref()
    }

    /// Whether the operation participates in caching.
    pub fn is_cached(&self) -> bool {
        self.cache
    }

    /// Identity of the operation instance.
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Resolved fields of `sets` for an object of type `typename`.
    ///
    /// Results are memoized per (sets, typename).
    pub fn resolve(
        &self,
        sets: &[SelectionSetId],
        typename: Option<&str>,
        possible_types: &PossibleTypes,
    ) -> Arc<[ResolvedField]> {
        let cache_key: SelectionCacheKey = (sets.iter().copied().collect(), typename.map(Arc::from));
        if let Some(hit) = self.selections.lock().get(&cache_key) {
            return hit.clone();
        }
        let fields: Arc<[ResolvedField]> = selection::resolve_fields(
            &self.document,
            sets,
            typename,
            &self.variables_with_defaults,
            possible_types,
        )
        .into();
        self.selections.lock().insert(cache_key, fields.clone());
        fields
    }

    /// Number of memoized selection entries.
    pub fn resolved_selection_count(&self) -> usize {
        self.selections.lock().len()
    }
}

fn apply_defaults(document: &Document, variables: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut merged = variables.clone();
    for definition in document.variables() {
        if merged.contains_key(&definition.name) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            merged.insert(definition.name.clone(), default.clone());
        }
    }
    merged
}

fn variables_key(document: &Document, variables: &Map<String, JsonValue>) -> String {
    if document.variables().is_empty() {
        return sorted_json(&JsonValue::Object(variables.clone()));
    }
    document
        .variables()
        .iter()
        .map(|definition| render_pair(&definition.name, variables.get(&definition.name)))
        .collect()
}

fn render_pair(name: &str, value: Option<&JsonValue>) -> String {
    match value {
        Some(value) => format!("{name}:{}", sorted_json(value)),
        None => format!("{name}:undefined"),
    }
}

fn key_variables(document: &Document) -> Result<Option<Vec<String>>> {
    let Some(directive) = document.directive(CACHE_DIRECTIVE) else {
        return Ok(None);
    };
    let Some(value) = directive.argument(KEY_VARS_ARGUMENT) else {
        return Ok(None);
    };
    let ArgValue::List(items) = value else {
        return Err(CacheError::configuration(format!(
            "@{CACHE_DIRECTIVE}({KEY_VARS_ARGUMENT}:) of operation {} must be a list of variable names",
            document.display_name()
        )));
    };
    items
        .iter()
        .map(|item| match item {
            ArgValue::String(name) => Ok(name.clone()),
            other => Err(CacheError::configuration(format!(
                "@{CACHE_DIRECTIVE}({KEY_VARS_ARGUMENT}:) of operation {} contains a non-string entry {other:?}",
                document.display_name()
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

//! Identifiers and keys shared by every layer of the cache.
//!
//! [`NodeKey`] is the normalized identity under which the forest indexes
//! records. It is a tagged union so that an entity key, a root key and a
//! path-scoped key can never collide, whatever strings they carry.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Monotonic identifier of an operation descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Handle of a chunk inside the forest arena.
///
/// Handles are slot indices and may be reused after the chunk is released;
/// recency is carried by the chunk's own sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub u32);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// Kind of a graph query operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read-only query.
    Query,
    /// Mutation; cached only when explicitly annotated.
    Mutation,
    /// Subscription event stream.
    Subscription,
}

impl OperationKind {
    /// Default root object type name for the operation kind.
    pub fn default_root_type(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

/// Canonical store key of a field: its name plus sorted-JSON arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// Schema field name.
    pub name: Arc<str>,
    /// Sorted-JSON rendering of the resolved arguments, if any were supplied.
    pub args: Option<Arc<str>>,
}

impl FieldKey {
    /// Key of a field without arguments.
    pub fn plain(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            args: None,
        }
    }

    /// Key of a field with a pre-rendered argument string.
    pub fn with_args(name: impl Into<Arc<str>>, args: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            args: Some(args.into()),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{}({})", self.name, args),
            None => f.write_str(&self.name),
        }
    }
}

/// One step of a path-scoped node key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Descend into a field by store key.
    Field(FieldKey),
    /// Descend into a list item.
    Index(u32),
}

/// Normalized identity of a node in the forest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// Well-known root of an operation kind (`ROOT_QUERY` and friends).
    Root(OperationKind),
    /// Object whose type participates in identity.
    Entity {
        /// Concrete type name.
        typename: Arc<str>,
        /// Identifier rendered as a string.
        id: Arc<str>,
    },
    /// Object without identity, private to one operation.
    Scoped {
        /// Operation that wrote the object.
        operation: OperationId,
        /// Store-key path from the operation root.
        path: Arc<[PathStep]>,
    },
}

impl NodeKey {
    /// Builds an entity key.
    pub fn entity(typename: impl Into<Arc<str>>, id: impl Into<Arc<str>>) -> Self {
        NodeKey::Entity {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// Returns `true` for path-scoped keys.
    pub fn is_scoped(&self) -> bool {
        matches!(self, NodeKey::Scoped { .. })
    }

    /// Typename implied by the key itself, when it carries one.
    pub fn implied_typename(&self) -> Option<&str> {
        match self {
            NodeKey::Entity { typename, .. } => Some(typename),
            NodeKey::Root(_) | NodeKey::Scoped { .. } => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Root(OperationKind::Query) => f.write_str("ROOT_QUERY"),
            NodeKey::Root(OperationKind::Mutation) => f.write_str("ROOT_MUTATION"),
            NodeKey::Root(OperationKind::Subscription) => f.write_str("ROOT_SUBSCRIPTION"),
            NodeKey::Entity { typename, id } => write!(f, "{typename}:{id}"),
            NodeKey::Scoped { operation, path } => {
                write!(f, "{operation}")?;
                for step in path.iter() {
                    match step {
                        PathStep::Field(key) => write!(f, ".{key}")?,
                        PathStep::Index(idx) => write!(f, ".{idx}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// One step of a response path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Response key (alias or field name).
    Field(String),
    /// List index.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Field(value.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        PathSegment::Field(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        PathSegment::Index(value)
    }
}

/// Ordered field-name/list-index steps from the operation root.
///
/// Serializes as a plain array, e.g. `["chat", "messages", 1, "text"]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    /// The empty path, denoting the operation root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a copy of this path extended by a field step.
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.push(PathSegment::Field(name.into()));
        Self(next)
    }

    /// Returns a copy of this path extended by an index step.
    pub fn index(&self, idx: usize) -> Self {
        let mut next = self.0.clone();
        next.push(PathSegment::Index(idx));
        Self(next)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (idx, segment) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Field(name) => f.write_str(name)?,
                PathSegment::Index(i) => write!(f, "{i}")?,
            }
        }
        Ok(())
    }
}
